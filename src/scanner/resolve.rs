// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cross-file resolution of scanned facts into a [`SymbolGraph`].

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use crate::model::{
    CallSite, DeclaredDecorator, DecoratedMember, Diagnostic, DiagnosticKind, FileFacts,
    Interface, MemberMarker, MethodSig, Pointer, Receiver, RegistrationEntry, SymbolGraph,
    TraitDecl, UseDecl,
};

use super::typetext::{dispatch_candidates, split_top_level, strip_generics};

/// Resolution settings that come from configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Traits marked by path instead of by attribute.
    pub instrument: Vec<String>,
    /// Pointer the generated decorators hold their inner instance in.
    pub pointer: Pointer,
}

/// SHA-256 of a method's normalized signature, hex encoded.
pub fn signature_hash(method: &MethodSig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.normalized().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve per-file facts into the graph consumed by the synthesizers.
///
/// `files` may come in any order; they are processed sorted by path.
pub fn build_graph(files: &[FileFacts], options: &ResolveOptions) -> SymbolGraph {
    let mut sorted: Vec<&FileFacts> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let resolver = Resolver::new(&sorted);
    let mut graph = SymbolGraph::default();

    resolver.interfaces(options, &mut graph);
    resolver.decorators(&mut graph);
    resolver.registrations(&mut graph);
    resolver.call_sites(&mut graph);

    graph.diagnostics.sort();
    graph.diagnostics.dedup();

    tracing::debug!(
        interfaces = graph.interfaces.len(),
        members = graph.members.len(),
        decorators = graph.decorators.len(),
        registrations = graph.registrations.len(),
        call_sites = graph.call_sites.len(),
        diagnostics = graph.diagnostics.len(),
        "Resolved symbol graph"
    );

    graph
}

struct Resolver<'a> {
    files: &'a [&'a FileFacts],
    /// Qualified trait path → declaration.
    traits: BTreeMap<String, &'a TraitDecl>,
    /// Qualified paths of structs.
    structs: BTreeSet<String>,
    /// Every module path known from files and inline `mod` items.
    modules: BTreeSet<String>,
    /// `use` items per module scope.
    uses: BTreeMap<&'a str, Vec<&'a UseDecl>>,
}

impl<'a> Resolver<'a> {
    fn new(files: &'a [&'a FileFacts]) -> Self {
        let mut traits = BTreeMap::new();
        let mut structs = BTreeSet::new();
        let mut modules = BTreeSet::new();
        let mut uses: BTreeMap<&str, Vec<&UseDecl>> = BTreeMap::new();

        for file in files {
            modules.insert(file.module_path.clone());
            modules.extend(file.modules.iter().cloned());
            for decl in &file.traits {
                traits.entry(decl.qualified()).or_insert(decl);
            }
            for decl in &file.structs {
                structs.insert(format!("{}::{}", decl.module_path, decl.name));
            }
            for decl in &file.uses {
                uses.entry(decl.module_path.as_str()).or_default().push(decl);
            }
        }

        Self {
            files,
            traits,
            structs,
            modules,
            uses,
        }
    }

    fn is_item(&self, path: &str) -> bool {
        self.traits.contains_key(path) || self.structs.contains(path)
    }

    /// Resolve a path as written in `module` to a qualified item path.
    fn resolve(&self, module: &str, text: &str) -> Option<String> {
        let text = strip_generics(text.trim().trim_start_matches("dyn ").trim());
        if text.is_empty() {
            return None;
        }

        if let Some(path) = self.absolute(module, text) {
            if self.is_item(&path) {
                return Some(path);
            }
        }

        let (head, rest) = match text.split_once("::") {
            Some((head, rest)) => (head, Some(rest)),
            None => (text, None),
        };

        if let Some(scope_uses) = self.uses.get(module) {
            for decl in scope_uses {
                match decl.alias.as_deref() {
                    Some(alias) if alias == head => {
                        // an explicit import owns the name, even when it
                        // points outside the crate
                        let base = self.absolute_use(module, &decl.path);
                        let path = match rest {
                            Some(rest) => format!("{}::{}", base, rest),
                            None => base,
                        };
                        return self.is_item(&path).then_some(path);
                    }
                    None => {
                        let base = self.absolute_use(module, &decl.path);
                        let path = format!("{}::{}", base, text);
                        if self.is_item(&path) {
                            return Some(path);
                        }
                    }
                    _ => {}
                }
            }
        }

        let local = format!("{}::{}", module, text);
        if self.is_item(&local) {
            return Some(local);
        }

        // last resort: a unique item with that simple name anywhere
        if rest.is_none() {
            let suffix = format!("::{}", text);
            let mut matches = self
                .traits
                .keys()
                .chain(self.structs.iter())
                .filter(|p| p.ends_with(&suffix));
            if let (Some(only), None) = (matches.next(), matches.next()) {
                return Some(only.clone());
            }
        }

        None
    }

    /// Expand `crate::`, `self::` and `super::` prefixes.
    fn absolute(&self, module: &str, text: &str) -> Option<String> {
        if text == "crate" || text.starts_with("crate::") {
            return Some(text.to_string());
        }
        let mut base = module.to_string();
        let mut rest = text;
        let mut relative = false;
        loop {
            if let Some(r) = rest.strip_prefix("self::") {
                rest = r;
                relative = true;
            } else if let Some(r) = rest.strip_prefix("super::") {
                base = parent_module(&base)?;
                rest = r;
                relative = true;
            } else {
                break;
            }
        }
        if relative {
            Some(format!("{}::{}", base, rest))
        } else {
            None
        }
    }

    /// Absolute form of a `use` path written in `module`.
    ///
    /// Paths whose first segment is a child module of `module` are rooted
    /// there; anything else that is not `crate`-relative is an extern path.
    fn absolute_use(&self, module: &str, path: &str) -> String {
        if let Some(abs) = self.absolute(module, path) {
            return abs;
        }
        if path == "self" {
            return module.to_string();
        }
        if path == "super" {
            return parent_module(module).unwrap_or_else(|| module.to_string());
        }
        let path = path.trim_start_matches("::");
        let head = path.split("::").next().unwrap_or(path);
        let child = format!("{}::{}", module, head);
        if self.modules.contains(&child) || self.is_item(&child) {
            format!("{}::{}", module, path)
        } else {
            format!("::{}", path)
        }
    }

    /// `use` items of a scope, made absolute, in the form they are re-emitted.
    fn imports(&self, module: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .uses
            .get(module)
            .map(|decls| {
                decls
                    .iter()
                    .map(|d| {
                        let path = self.absolute_use(module, &d.path);
                        match d.alias.as_deref() {
                            None => format!("{}::*", path),
                            Some(alias) if path.rsplit("::").next() == Some(alias) => path,
                            Some(alias) => format!("{} as {}", path, alias),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.sort();
        out.dedup();
        out
    }

    // Interfaces and members

    fn interfaces(&self, options: &ResolveOptions, graph: &mut SymbolGraph) {
        let mut configured = BTreeSet::new();
        for entry in &options.instrument {
            match self.resolve("crate", entry).filter(|p| self.traits.contains_key(p)) {
                Some(path) => {
                    configured.insert(path);
                }
                None => graph.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::UnresolvedReference,
                    format!("configured trait '{}' does not resolve to a trait", entry),
                    None,
                )),
            }
        }

        for (path, decl) in &self.traits {
            let trait_marked = decl.marker.is_some() || configured.contains(path);
            let methods: Vec<MethodSig> = decl
                .methods
                .iter()
                .map(|m| {
                    let mut method = m.clone();
                    method.marker = match (trait_marked, m.marker) {
                        (_, MemberMarker::Skip) => MemberMarker::Skip,
                        (true, _) | (false, MemberMarker::Traced) => MemberMarker::Traced,
                        (false, MemberMarker::Unmarked) => MemberMarker::Unmarked,
                    };
                    method
                })
                .collect();

            if !methods.iter().any(|m| m.marker == MemberMarker::Traced) {
                continue;
            }

            if let Some(reason) = unsupported_reason(decl, options.pointer) {
                graph.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::UnsupportedInterface,
                    format!("trait '{}' cannot be decorated: {}", path, reason),
                    Some(decl.location.clone()),
                ));
                continue;
            }

            let span_prefix = decl
                .marker
                .as_ref()
                .and_then(|m| m.alias.clone())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| decl.name.clone());

            let interface = Interface {
                path: path.clone(),
                name: decl.name.clone(),
                span_prefix,
                module_path: decl.module_path.clone(),
                is_async_trait: decl.is_async_trait,
                async_trait_args: decl.async_trait_args.clone(),
                methods,
                imports: self.imports(&decl.module_path),
                location: decl.location.clone(),
                offset: decl.offset,
            };

            for method in interface.instrumented() {
                graph.members.push(DecoratedMember {
                    interface: interface.path.clone(),
                    method: method.clone(),
                    span_name: format!("{}.{}", interface.span_prefix, method.name),
                    signature_hash: signature_hash(method),
                });
            }
            graph.interfaces.push(interface);
        }
    }

    // Decorators

    fn decorators(&self, graph: &mut SymbolGraph) {
        for file in self.files {
            for decl in &file.decorators {
                let service = self
                    .resolve(&decl.module_path, &decl.target)
                    .filter(|p| self.traits.contains_key(p));
                match service {
                    Some(service) => graph.decorators.push(DeclaredDecorator {
                        service,
                        type_path: format!("{}::{}", decl.module_path, decl.type_name),
                        location: decl.location.clone(),
                        offset: decl.offset,
                    }),
                    None => graph.diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::UnresolvedReference,
                        format!(
                            "decorator '{}' targets '{}', which does not resolve to a trait",
                            decl.type_name, decl.target
                        ),
                        Some(decl.location.clone()),
                    )),
                }
            }
        }
        graph
            .decorators
            .sort_by(|a, b| (&a.location.file, a.offset).cmp(&(&b.location.file, b.offset)));
    }

    // Registrations

    fn registrations(&self, graph: &mut SymbolGraph) {
        let mut index = 0;
        for file in self.files {
            let mut sites: Vec<_> = file.registrations.iter().collect();
            sites.sort_by_key(|s| s.ordinal);
            for site in sites {
                let service = dispatch_candidates(&site.service_type)
                    .first()
                    .and_then(|name| self.resolve(&site.module_path, name))
                    .filter(|p| self.traits.contains_key(p));
                graph.registrations.push(RegistrationEntry {
                    service,
                    lifetime: site.lifetime,
                    strategy: site.strategy.clone(),
                    index,
                    site: site.clone(),
                });
                index += 1;
            }
        }
    }

    // Call sites

    fn call_sites(&self, graph: &mut SymbolGraph) {
        let instrumented: BTreeMap<&str, &Interface> = graph
            .interfaces
            .iter()
            .map(|i| (i.path.as_str(), i))
            .collect();
        let mut sites = Vec::new();
        let mut diagnostics = Vec::new();

        for file in self.files {
            for call in &file.calls {
                let mut owners = BTreeSet::new();
                for candidate in dispatch_candidates(&call.receiver_type) {
                    let resolved = self.resolve(&call.module_path, &candidate);
                    if let Some(path) = resolved.as_deref().filter(|p| self.traits.contains_key(*p)) {
                        if let Some(iface) = instrumented.get(path) {
                            if iface.instrumented().any(|m| m.name == call.method) {
                                owners.insert(path.to_string());
                            }
                        }
                        continue;
                    }
                    let concrete = resolved.unwrap_or(candidate);
                    owners.extend(self.implemented_owners(&concrete, &call.method, &instrumented));
                }

                match owners.len() {
                    0 => {}
                    1 => {
                        if let Some(owner) = owners.into_iter().next() {
                            sites.push(CallSite {
                                interface: owner,
                                method: call.method.clone(),
                                file: file.absolute_path.clone(),
                                location: call.location.clone(),
                                token_range: call.token_range,
                                scope_insert: call.scope_insert,
                            });
                        }
                    }
                    _ => diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::AmbiguousReceiver,
                        format!(
                            "call to '{}' on '{}' matches several instrumented traits: {}",
                            call.method,
                            call.receiver,
                            owners.into_iter().collect::<Vec<_>>().join(", ")
                        ),
                        Some(call.location.clone()),
                    )),
                }
            }
        }

        sites.sort_by(|a, b| a.key().cmp(&b.key()));
        graph.call_sites = sites;
        graph.diagnostics.extend(diagnostics);
    }

    /// Instrumented traits implemented by `concrete` that declare `method`.
    fn implemented_owners(
        &self,
        concrete: &str,
        method: &str,
        instrumented: &BTreeMap<&str, &Interface>,
    ) -> Vec<String> {
        let mut owners = Vec::new();
        for file in self.files {
            for imp in &file.impls {
                let self_type = self
                    .resolve(&imp.module_path, &imp.self_type)
                    .unwrap_or_else(|| strip_generics(&imp.self_type).to_string());
                if self_type != concrete {
                    continue;
                }
                let Some(trait_path) = self.resolve(&imp.module_path, &imp.trait_name) else {
                    continue;
                };
                if let Some(iface) = instrumented.get(trait_path.as_str()) {
                    if iface.instrumented().any(|m| m.name == method) {
                        owners.push(trait_path);
                    }
                }
            }
        }
        owners
    }
}

/// Why a trait cannot be wrapped behind a trait object, if it cannot.
fn unsupported_reason(decl: &TraitDecl, pointer: Pointer) -> Option<String> {
    if decl.generics.is_some() {
        return Some("generic traits are not supported".to_string());
    }
    if decl.has_associated_items {
        return Some("associated types and constants are not supported".to_string());
    }
    if let Some(bounds) = decl.supertraits.as_deref() {
        let extra = dispatch_candidates(bounds);
        if !extra.is_empty() {
            return Some(format!(
                "supertraits other than auto traits are not supported ({})",
                extra.join(", ")
            ));
        }
    }
    for method in &decl.methods {
        match method.receiver {
            Receiver::None => {
                return Some(format!("method '{}' has no receiver", method.name));
            }
            Receiver::Value => {
                return Some(format!("method '{}' takes self by value", method.name));
            }
            Receiver::RefMut if pointer == Pointer::Arc => {
                return Some(format!(
                    "method '{}' takes &mut self, which a shared pointer cannot forward",
                    method.name
                ));
            }
            _ => {}
        }
        if method.is_async && !decl.is_async_trait {
            return Some(format!(
                "async method '{}' requires #[async_trait] to be object safe",
                method.name
            ));
        }
        if has_type_params(method.generics.as_deref()) {
            return Some(format!("method '{}' is generic", method.name));
        }
    }
    None
}

fn has_type_params(generics: Option<&str>) -> bool {
    let Some(text) = generics else { return false };
    let inner = text
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>');
    split_top_level(inner, ',')
        .iter()
        .any(|p| !p.starts_with('\''))
}

fn parent_module(module: &str) -> Option<String> {
    module.rsplit_once("::").map(|(parent, _)| parent.to_string())
}
