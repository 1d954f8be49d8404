// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code synthesis from a resolved [`SymbolGraph`].
//!
//! A single pass produces the generated module tree and the edits to apply
//! to the scanned sources:
//!
//! - [`decorator`] - one tracing wrapper per instrumented trait
//! - [`registration`] - decorator chains and registry patches
//! - [`interceptor`] - position-keyed call-site interceptors
//! - [`tracer`] - the shared `TRACER` static
//!
//! Decorators and interceptors are exclusive: [`InstrumentationMode`] picks
//! one of them per pass. All names are claimed in one [`NameRegistry`]; a
//! clash aborts the pass before anything is written.

pub mod decorator;
pub mod interceptor;
pub mod naming;
pub mod registration;
pub mod render;
pub mod tracer;

use std::time::Instant;

use crate::error::GenerateError;
use crate::model::{Diagnostic, InstrumentationMode, Pointer, SymbolGraph};
use crate::rewrite::FileEdits;

pub use decorator::{synthesize_decorators, DecoratorOutput, GeneratedDecorator};
pub use interceptor::{synthesize_interceptors, InterceptionTable, InterceptorOutput};
pub use naming::NameRegistry;
pub use registration::{decorator_chains, patch_registrations, DecoratorChain, RegistrationOutput};
pub use tracer::{render_tracer, TracerIdentity};

/// Settings for code synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthOptions {
    /// Path of the generated module inside the target crate.
    pub generated_module: String,
    /// Path of the tracing runtime (`Tracer`, `Instrument`).
    pub runtime_path: String,
    pub pointer: Pointer,
    /// Trait providing reflection-free activation of implementation types.
    pub activate_trait: String,
    pub tracer: TracerIdentity,
    pub mode: InstrumentationMode,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            generated_module: "crate::traced".to_string(),
            runtime_path: "::traceweave::runtime".to_string(),
            pointer: Pointer::Box,
            activate_trait: "crate::di::Activate".to_string(),
            tracer: TracerIdentity::default(),
            mode: InstrumentationMode::Decorate,
        }
    }
}

impl SynthOptions {
    /// Path of the generated `TRACER` static.
    pub fn tracer_path(&self) -> String {
        format!("{}::tracer::TRACER", self.generated_module)
    }

    /// Directory and `mod` name of the generated module (`traced`).
    pub fn module_name(&self) -> &str {
        self.generated_module
            .rsplit("::")
            .next()
            .unwrap_or(&self.generated_module)
    }
}

/// Everything one synthesis pass produced.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub decorators: DecoratorOutput,
    pub registrations: RegistrationOutput,
    pub interceptors: InterceptorOutput,
    /// Content of `tracer.rs`.
    pub tracer: String,
    /// Content of the generated `mod.rs`.
    pub module: String,
    /// All source edits, registration patches before call-site redirects.
    pub edits: FileEdits,
    /// Resolver and synthesis diagnostics, in that order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Synthesis {
    /// Generated files relative to the generated module directory.
    pub fn files(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("mod.rs", self.module.as_str()),
            ("tracer.rs", self.tracer.as_str()),
            ("decorators.rs", self.decorators.source.as_str()),
            ("registrations.rs", self.registrations.source.as_str()),
            ("interceptors.rs", self.interceptors.source.as_str()),
        ]
    }
}

/// Run decorator, registration, interceptor and tracer synthesis.
pub fn synthesize(graph: &SymbolGraph, options: &SynthOptions) -> Result<Synthesis, GenerateError> {
    let start = Instant::now();
    let mut names = NameRegistry::new();

    let decorators = synthesize_decorators(graph, options, &mut names)?;
    let registrations = patch_registrations(graph, &decorators, options);
    let interceptors = synthesize_interceptors(graph, options, &mut names)?;

    let mut edits = FileEdits::new();
    edits.extend(registrations.edits.clone());
    edits.extend(interceptors.edits.clone());

    let mut diagnostics = graph.diagnostics.clone();
    diagnostics.extend(registrations.diagnostics.iter().cloned());
    diagnostics.extend(interceptors.diagnostics.iter().cloned());

    let synthesis = Synthesis {
        tracer: render_tracer(options),
        module: render_module_root(),
        decorators,
        registrations,
        interceptors,
        edits,
        diagnostics,
    };

    #[cfg(feature = "telemetry")]
    crate::telemetry::metrics::GLOBAL_METRICS.record_operation("synth.synthesize", start.elapsed());

    tracing::info!(
        decorators = synthesis.decorators.decorators.len(),
        patched = synthesis.registrations.patched.len(),
        interceptors = synthesis.interceptors.entries.len(),
        edits = synthesis.edits.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Synthesis complete"
    );
    Ok(synthesis)
}

fn render_module_root() -> String {
    let mut w = render::CodeWriter::new();
    w.block(&render::header());
    w.line("//! Generated tracing instrumentation.");
    w.blank();
    w.line("pub mod decorators;");
    w.line("pub mod interceptors;");
    w.line("pub mod registrations;");
    w.line("pub mod tracer;");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerateError;
    use crate::scanner::{build_graph, ResolveOptions, ScanOptions, SourceScanner};

    fn graph(files: &[(&str, &str)]) -> SymbolGraph {
        let mut scanner = SourceScanner::new(ScanOptions::default()).unwrap();
        let facts: Vec<_> = files
            .iter()
            .map(|(p, s)| scanner.scan_file(p, &format!("/project/{}", p), s).unwrap())
            .collect();
        build_graph(&facts, &ResolveOptions::default())
    }

    #[test]
    fn test_options_paths() {
        let options = SynthOptions::default();
        assert_eq!(options.tracer_path(), "crate::traced::tracer::TRACER");
        assert_eq!(options.module_name(), "traced");
    }

    const SHOP: &str = "#[traced]\npub trait Orders { fn place(&self, id: u64); }\n\nfn run(o: &dyn Orders) {\n    o.place(1);\n}\n\nfn configure(s: &mut Services) {\n    s.add_singleton::<dyn Orders, Book>();\n}\n";

    #[test]
    fn test_synthesis_produces_every_file() {
        let graph = graph(&[("src/shop.rs", SHOP)]);
        let synthesis = synthesize(&graph, &SynthOptions::default()).unwrap();

        let files = synthesis.files();
        assert_eq!(files.len(), 5);
        assert!(files.iter().all(|(_, src)| src.starts_with("// @generated by traceweave")));
        assert!(synthesis.module.contains("pub mod tracer;"));
        assert_eq!(synthesis.decorators.decorators.len(), 1);
        assert_eq!(synthesis.registrations.patched.len(), 1);
        assert!(synthesis.interceptors.entries.is_empty());
        // method, type arguments and arguments of the registration
        assert_eq!(synthesis.edits.len(), 3);
    }

    #[test]
    fn test_modes_never_instrument_a_call_twice() {
        let graph = graph(&[("src/shop.rs", SHOP)]);

        let decorate = synthesize(&graph, &SynthOptions::default()).unwrap();
        assert!(!decorate.decorators.decorators.is_empty());
        assert!(decorate.interceptors.entries.is_empty());

        let options = SynthOptions {
            mode: InstrumentationMode::Intercept,
            ..Default::default()
        };
        let intercept = synthesize(&graph, &options).unwrap();
        assert!(intercept.decorators.decorators.is_empty());
        assert!(intercept.registrations.patched.is_empty());
        assert_eq!(intercept.interceptors.entries.len(), 1);
        // token rename and trait import
        assert_eq!(intercept.edits.len(), 2);
    }

    #[test]
    fn test_same_trait_name_in_similar_modules() {
        let graph = graph(&[
            ("src/a_b.rs", "#[traced]\npub trait C { fn f(&self); }\n"),
            ("src/a/b.rs", "#[traced]\npub trait C { fn g(&self); }\n"),
        ]);
        let synthesis = synthesize(&graph, &SynthOptions::default()).unwrap();

        let paths: Vec<&str> = synthesis
            .decorators
            .decorators
            .iter()
            .map(|d| d.type_path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec![
                "crate::traced::decorators::a_b_C::CTraced",
                "crate::traced::decorators::a_0b_C::CTraced",
            ]
        );
    }

    #[test]
    fn test_collision_error_names_both_owners() {
        let mut names = NameRegistry::new();
        names.claim("X", "crate::a::X").unwrap();
        let err = names.claim("X", "crate::b::X").unwrap_err();
        assert!(matches!(err, GenerateError::NameCollision { .. }));
        assert!(err.to_string().contains("crate::a::X"));
    }
}
