// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Registration patching.
//!
//! Each registration whose service trait has decorators is rewritten in place
//! to build the original instance, wrap it through the decorator chain and
//! hand the outermost wrapper to the registry. The edits never move a
//! statement, so lifetime and insertion order are untouched:
//!
//! ```text
//! services.add_singleton::<dyn Orders, OrderBook>()
//!   → services.add_singleton_factory::<dyn Orders>(|__r| { .. })
//! services.add_scoped_factory::<dyn Orders>(build)
//!   → services.add_scoped_factory::<dyn Orders>({ let __factory = build; move |__r| { .. } })
//! services.add_singleton_instance::<dyn Orders>(expr)
//!   → services.add_singleton_instance::<dyn Orders>({ let inner = expr; .. inner })
//! ```
//!
//! Chains are ordered by where each decorator is declared (file path, then
//! byte offset). Element 0 wraps the original instance; the last element is
//! the outermost wrapper and the first to see a call.
//!
//! Every patched construction checks `registrations::enabled()` and hands
//! out the original instance while decoration is switched off.

use std::collections::BTreeMap;

use crate::model::{
    ConstructionStrategy, Diagnostic, DiagnosticKind, Lifetime, RegistrationEntry, SymbolGraph,
};
use crate::rewrite::{Edit, FileEdits};

use super::decorator::DecoratorOutput;
use super::render::{header, string_literal, CodeWriter};
use super::SynthOptions;

/// Ordered decorators for one service trait, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratorChain {
    pub service: String,
    pub decorators: Vec<String>,
}

/// A registration the patcher rewrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedRegistration {
    pub index: usize,
    pub service: String,
    pub lifetime: Lifetime,
    pub file: String,
    pub line: u32,
}

/// Output of registration patching.
#[derive(Debug, Clone, Default)]
pub struct RegistrationOutput {
    /// Chains in service path order.
    pub chains: Vec<DecoratorChain>,
    /// Registrations that were patched, in insertion order.
    pub patched: Vec<PatchedRegistration>,
    /// Source edits, keyed by relative path.
    pub edits: FileEdits,
    /// Content of `registrations.rs`.
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl RegistrationOutput {
    pub fn chain(&self, service: &str) -> Option<&DecoratorChain> {
        self.chains.iter().find(|c| c.service == service)
    }
}

/// Compute decorator chains for every service trait.
pub fn decorator_chains(graph: &SymbolGraph, decorators: &DecoratorOutput) -> Vec<DecoratorChain> {
    // (file, offset, type path) per service
    let mut declared: BTreeMap<&str, Vec<(&str, usize, String)>> = BTreeMap::new();

    for generated in &decorators.decorators {
        if let Some(iface) = graph.interface(&generated.interface) {
            declared.entry(iface.path.as_str()).or_default().push((
                iface.location.file.as_str(),
                iface.offset,
                generated.type_path.clone(),
            ));
        }
    }
    for user in &graph.decorators {
        declared.entry(user.service.as_str()).or_default().push((
            user.location.file.as_str(),
            user.offset,
            user.type_path.clone(),
        ));
    }

    declared
        .into_iter()
        .map(|(service, mut entries)| {
            entries.sort();
            DecoratorChain {
                service: service.to_string(),
                decorators: entries.into_iter().map(|(_, _, path)| path).collect(),
            }
        })
        .collect()
}

/// Patch every registration of a decorated service.
pub fn patch_registrations(
    graph: &SymbolGraph,
    decorators: &DecoratorOutput,
    options: &SynthOptions,
) -> RegistrationOutput {
    let mut output = RegistrationOutput {
        chains: decorator_chains(graph, decorators),
        ..Default::default()
    };

    for entry in &graph.registrations {
        let Some(service) = entry.service.as_deref() else { continue };
        let Some(chain) = output.chain(service).cloned() else { continue };
        if chain.decorators.is_empty() {
            continue;
        }

        let file = entry.site.location.file.clone();
        match patch_edits(entry, &chain, options) {
            Some(edits) => {
                for edit in edits {
                    output.edits.push(&file, edit);
                }
                output.patched.push(PatchedRegistration {
                    index: entry.index,
                    service: service.to_string(),
                    lifetime: entry.lifetime,
                    file,
                    line: entry.site.location.line,
                });
            }
            None => output.diagnostics.push(Diagnostic::warning(
                DiagnosticKind::AmbiguousConstruction,
                format!(
                    "registration of '{}' via '{}' has no instance, factory or implementation type; left undecorated",
                    service, entry.site.method
                ),
                Some(entry.site.location.clone()),
            )),
        }
    }

    output.source = render_table(&output, options);
    tracing::debug!(
        chains = output.chains.len(),
        patched = output.patched.len(),
        "Patched registrations"
    );
    output
}

/// Edits for one registration, or `None` when its strategy is undetermined.
fn patch_edits(
    entry: &RegistrationEntry,
    chain: &DecoratorChain,
    options: &SynthOptions,
) -> Option<Vec<Edit>> {
    let site = &entry.site;
    let object = options.pointer.wrap(&site.service_type);
    let pointer = options.pointer.type_path();

    let mut wraps = String::new();
    for decorator in &chain.decorators {
        wraps.push_str(&format!(
            " let inner: {} = {}::new({}::new(inner));",
            object, pointer, decorator
        ));
    }
    let wraps = format!(
        " if {}::registrations::enabled() {{{} inner }} else {{ inner }}",
        options.generated_module, wraps
    );

    match &entry.strategy {
        ConstructionStrategy::Implementation { type_name } => {
            let method = format!("{}_factory", site.method);
            let activate = format!(
                "{}::new(<{} as {}>::activate(__r))",
                pointer, type_name, options.activate_trait
            );
            Some(vec![
                Edit::replace(site.method_range, method),
                Edit::replace(site.type_args_range, format!("<{}>", site.service_type)),
                Edit::replace(
                    site.args_range,
                    format!("(|__r| {{ let inner: {} = {};{} }})", object, activate, wraps),
                ),
            ])
        }
        ConstructionStrategy::Factory { .. } => {
            let arg = site.arg_range?;
            Some(vec![
                Edit::insert(arg.start, "{ let __factory = "),
                Edit::insert(
                    arg.end,
                    format!(
                        "; move |__r| {{ let inner: {} = (__factory)(__r);{} }} }}",
                        object, wraps
                    ),
                ),
            ])
        }
        ConstructionStrategy::Instance { .. } => {
            let arg = site.arg_range?;
            Some(vec![
                Edit::insert(arg.start, format!("{{ let inner: {} = ", object)),
                Edit::insert(arg.end, format!(";{} }}", wraps)),
            ])
        }
        ConstructionStrategy::Undetermined => None,
    }
}

fn render_table(output: &RegistrationOutput, options: &SynthOptions) -> String {
    let mut w = CodeWriter::new();
    w.block(&header());
    w.line("//! Decorator chains per service trait, innermost first, and the");
    w.line("//! registrations patched to install them.");
    w.blank();
    w.line("/// `(service trait, decorator types)`; element 0 wraps the original instance.");
    w.open("pub static DECORATORS: &[(&str, &[&str])] = &[");
    for chain in &output.chains {
        let types: Vec<String> = chain.decorators.iter().map(|d| string_literal(d)).collect();
        w.line(format!(
            "({}, &[{}]),",
            string_literal(&chain.service),
            types.join(", ")
        ));
    }
    w.close("];");
    w.blank();
    w.line("/// `(insertion index, service trait, lifetime)` of every patched registration.");
    w.open("pub static PATCHED: &[(usize, &str, &str)] = &[");
    for patched in &output.patched {
        w.line(format!(
            "({}, {}, {}),",
            patched.index,
            string_literal(&patched.service),
            string_literal(patched.lifetime.as_str())
        ));
    }
    w.close("];");
    w.blank();
    w.line(format!(
        "pub const POINTER: &str = {};",
        string_literal(options.pointer.type_path())
    ));
    w.blank();
    w.line("static ENABLED: ::std::sync::atomic::AtomicBool = ::std::sync::atomic::AtomicBool::new(true);");
    w.blank();
    w.line("/// Switch decoration of patched registrations on or off. Instances");
    w.line("/// constructed afterwards follow the new setting.");
    w.open("pub fn set_enabled(enabled: bool) {");
    w.line("ENABLED.store(enabled, ::std::sync::atomic::Ordering::SeqCst);");
    w.close("}");
    w.blank();
    w.line("/// Whether patched registrations currently decorate what they build.");
    w.open("pub fn enabled() -> bool {");
    w.line("ENABLED.load(::std::sync::atomic::Ordering::SeqCst)");
    w.close("}");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::apply_edits;
    use crate::scanner::{build_graph, ResolveOptions, ScanOptions, SourceScanner};
    use crate::synth::decorator::synthesize_decorators;
    use crate::synth::naming::NameRegistry;

    const SHOP: &str = "#[traced]\npub trait Orders { fn place(&self, id: u64); }\npub trait Plain { fn noop(&self); }\n";

    fn run(files: &[(&str, &str)]) -> (SymbolGraph, RegistrationOutput) {
        let mut scanner = SourceScanner::new(ScanOptions::default()).unwrap();
        let facts: Vec<_> = files
            .iter()
            .map(|(p, s)| scanner.scan_file(p, &format!("/project/{}", p), s).unwrap())
            .collect();
        let graph = build_graph(&facts, &ResolveOptions::default());
        let options = SynthOptions::default();
        let decorators = synthesize_decorators(&graph, &options, &mut NameRegistry::new()).unwrap();
        let output = patch_registrations(&graph, &decorators, &options);
        (graph, output)
    }

    fn patched(output: &RegistrationOutput, file: &str, source: &str) -> String {
        apply_edits(file, source, output.edits.get(file)).unwrap()
    }

    #[test]
    fn test_factory_registration_wraps_result() {
        let main = "use crate::shop::Orders;\nfn configure(s: &mut Services) {\n    s.add_singleton_factory::<dyn Orders>(build_orders);\n}\n";
        let (_, output) = run(&[("src/shop.rs", SHOP), ("src/main.rs", main)]);

        assert_eq!(
            patched(&output, "src/main.rs", main),
            "use crate::shop::Orders;\nfn configure(s: &mut Services) {\n    s.add_singleton_factory::<dyn Orders>({ let __factory = build_orders; move |__r| { let inner: Box<dyn Orders> = (__factory)(__r); if crate::traced::registrations::enabled() { let inner: Box<dyn Orders> = Box::new(crate::traced::decorators::shop_Orders::OrdersTraced::new(inner)); inner } else { inner } } });\n}\n"
        );
        assert_eq!(
            output.patched,
            vec![PatchedRegistration {
                index: 0,
                service: "crate::shop::Orders".to_string(),
                lifetime: Lifetime::Singleton,
                file: "src/main.rs".to_string(),
                line: 3,
            }]
        );
    }

    #[test]
    fn test_implementation_registration_becomes_factory() {
        let main = "fn configure(s: &mut Services) {\n    s.add_scoped::<dyn crate::shop::Orders, OrderBook>();\n}\n";
        let (_, output) = run(&[("src/shop.rs", SHOP), ("src/main.rs", main)]);

        assert_eq!(
            patched(&output, "src/main.rs", main),
            "fn configure(s: &mut Services) {\n    s.add_scoped_factory::<dyn crate::shop::Orders>(|__r| { let inner: Box<dyn crate::shop::Orders> = Box::new(<OrderBook as crate::di::Activate>::activate(__r)); if crate::traced::registrations::enabled() { let inner: Box<dyn crate::shop::Orders> = Box::new(crate::traced::decorators::shop_Orders::OrdersTraced::new(inner)); inner } else { inner } });\n}\n"
        );
        assert_eq!(output.patched[0].lifetime, Lifetime::Scoped);
    }

    #[test]
    fn test_instance_registration_is_decorated_eagerly() {
        let main = "fn configure(s: &mut Services) {\n    s.add_singleton_instance::<dyn crate::shop::Orders>(Box::new(Book));\n}\n";
        let (_, output) = run(&[("src/shop.rs", SHOP), ("src/main.rs", main)]);

        assert!(patched(&output, "src/main.rs", main).contains(
            "s.add_singleton_instance::<dyn crate::shop::Orders>({ let inner: Box<dyn crate::shop::Orders> = Box::new(Book); if crate::traced::registrations::enabled() { let inner: Box<dyn crate::shop::Orders> = Box::new(crate::traced::decorators::shop_Orders::OrdersTraced::new(inner)); inner } else { inner } });"
        ));
    }

    #[test]
    fn test_undecorated_and_undetermined_entries() {
        let main = "fn configure(s: &mut Services) {\n    s.add_singleton::<dyn crate::shop::Plain, P>();\n    s.add_transient::<dyn crate::shop::Orders>();\n    s.add_singleton::<dyn Logger, L>();\n}\n";
        let (graph, output) = run(&[("src/shop.rs", SHOP), ("src/main.rs", main)]);

        assert_eq!(graph.registrations.len(), 3);
        assert!(output.edits.is_empty());
        assert!(output.patched.is_empty());
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::AmbiguousConstruction);
        assert_eq!(output.diagnostics[0].location.as_ref().unwrap().line, 3);
    }

    #[test]
    fn test_chain_follows_declaration_order() {
        let audit = "#[decorates(crate::shop::Orders)]\npub struct AuditOrders;\n";
        let retry = "#[decorates(crate::shop::Orders)]\npub struct RetryOrders;\n#[decorates(crate::shop::Orders)]\npub struct CacheOrders;\n";
        let (_, output) = run(&[
            ("src/shop.rs", SHOP),
            ("src/z_retry.rs", retry),
            ("src/audit.rs", audit),
        ]);

        assert_eq!(
            output.chain("crate::shop::Orders").unwrap().decorators,
            vec![
                "crate::audit::AuditOrders".to_string(),
                "crate::traced::decorators::shop_Orders::OrdersTraced".to_string(),
                "crate::z_retry::RetryOrders".to_string(),
                "crate::z_retry::CacheOrders".to_string(),
            ]
        );
        assert!(output.source.contains("(\"crate::shop::Orders\", &[\"crate::audit::AuditOrders\", \"crate::traced::decorators::shop_Orders::OrdersTraced\", \"crate::z_retry::RetryOrders\", \"crate::z_retry::CacheOrders\"]),"));
    }

    #[test]
    fn test_table_exposes_enable_switch() {
        let (_, output) = run(&[("src/shop.rs", SHOP)]);
        assert!(output.source.contains("static ENABLED: ::std::sync::atomic::AtomicBool = ::std::sync::atomic::AtomicBool::new(true);"));
        assert!(output.source.contains("pub fn set_enabled(enabled: bool) {\n    ENABLED.store(enabled, ::std::sync::atomic::Ordering::SeqCst);\n}"));
        assert!(output.source.contains("pub fn enabled() -> bool {"));
    }

    #[test]
    fn test_intercept_mode_chains_only_user_decorators() {
        let audit = "#[decorates(crate::shop::Orders)]\npub struct AuditOrders;\n";
        let main = "fn c(s: &mut S) { s.add_singleton::<dyn crate::shop::Orders, B>(); }\n";
        let mut scanner = SourceScanner::new(ScanOptions::default()).unwrap();
        let facts: Vec<_> = [("src/shop.rs", SHOP), ("src/audit.rs", audit), ("src/main.rs", main)]
            .iter()
            .map(|(p, s)| scanner.scan_file(p, &format!("/project/{}", p), s).unwrap())
            .collect();
        let graph = build_graph(&facts, &ResolveOptions::default());
        let options = SynthOptions {
            mode: crate::model::InstrumentationMode::Intercept,
            ..Default::default()
        };
        let decorators = synthesize_decorators(&graph, &options, &mut NameRegistry::new()).unwrap();
        let output = patch_registrations(&graph, &decorators, &options);

        assert_eq!(
            output.chain("crate::shop::Orders").unwrap().decorators,
            vec!["crate::audit::AuditOrders".to_string()]
        );
        let patched = patched(&output, "src/main.rs", main);
        assert!(patched.contains("Box::new(crate::audit::AuditOrders::new(inner))"));
        assert!(!patched.contains("OrdersTraced"));
    }

    #[test]
    fn test_patching_is_byte_identical_across_runs() {
        let main = "fn c(s: &mut S) { s.add_singleton::<dyn crate::shop::Orders, B>(); }\n";
        let (_, a) = run(&[("src/shop.rs", SHOP), ("src/main.rs", main)]);
        let (_, b) = run(&[("src/main.rs", main), ("src/shop.rs", SHOP)]);
        assert_eq!(a.edits, b.edits);
        assert_eq!(a.source, b.source);
    }
}
