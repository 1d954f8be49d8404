// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Call-site interception.
//!
//! Every call of an instrumented method through a statically typed receiver
//! is redirected to a generated interceptor. Interceptors are methods of an
//! extension trait with a blanket impl over the owning trait, so the rewritten
//! call `repo.__traced_save_l42c10(item)` resolves for trait objects, concrete
//! implementors and generic receivers alike. The redirect pass only renames
//! the method token and adds an anonymous import of the extension trait to
//! the enclosing module.
//!
//! Each interceptor is keyed by the absolute file, line and column of the
//! method token. Two call sites on the same coordinate keep only the first
//! and produce a diagnostic.
//!
//! Call sites are only redirected in [`InstrumentationMode::Intercept`];
//! decorated instances would otherwise open a second span per call.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::GenerateError;
use crate::model::{
    CallSite, Diagnostic, DiagnosticKind, InstrumentationMode, InterceptionEntry, Interface, MethodSig,
    SymbolGraph,
};
use crate::rewrite::{Edit, FileEdits};

use super::decorator::{instrumented_span, unsafe_wrapped};
use super::naming::{
    decorator_module_name, extension_trait_name, interceptor_file_module, interceptor_method_name,
    NameRegistry,
};
use super::render::{
    forward_call, header, module_preamble, params_list, return_type, string_literal, CodeWriter,
};
use super::SynthOptions;

/// Serialized form of the interception table (`interceptions.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptionTable {
    /// Generator version that produced the table.
    pub generator: String,
    pub entries: Vec<InterceptionEntry>,
}

impl InterceptionTable {
    pub fn to_json(&self) -> Result<String, GenerateError> {
        serde_json::to_string_pretty(self).map_err(|e| GenerateError::Serialize {
            what: "interception table".to_string(),
            message: e.to_string(),
        })
    }
}

/// Output of interceptor synthesis.
#[derive(Debug, Clone, Default)]
pub struct InterceptorOutput {
    /// Entries sorted by coordinate.
    pub entries: Vec<InterceptionEntry>,
    /// Redirect edits, keyed by relative path.
    pub edits: FileEdits,
    /// Content of `interceptors.rs`.
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl InterceptorOutput {
    pub fn table(&self) -> InterceptionTable {
        InterceptionTable {
            generator: env!("CARGO_PKG_VERSION").to_string(),
            entries: self.entries.clone(),
        }
    }
}

/// Emit interceptors and redirect edits for every call site in `graph`.
pub fn synthesize_interceptors(
    graph: &SymbolGraph,
    options: &SynthOptions,
    names: &mut NameRegistry,
) -> Result<InterceptorOutput, GenerateError> {
    let mut output = InterceptorOutput::default();
    let intercepting = options.mode == InstrumentationMode::Intercept;

    // keep the first call site per coordinate
    let mut by_key: BTreeMap<(String, u32, u32), &CallSite> = BTreeMap::new();
    for site in graph.call_sites.iter().filter(|_| intercepting) {
        let key = site.key();
        if let Some(kept) = by_key.get(&key) {
            output.diagnostics.push(Diagnostic::error(
                DiagnosticKind::PositionCollision,
                format!(
                    "call sites '{}::{}' and '{}::{}' share redirection coordinate {}:{}:{}; only the first is intercepted",
                    kept.interface, kept.method, site.interface, site.method, key.0, key.1, key.2
                ),
                Some(site.location.clone()),
            ));
            continue;
        }
        by_key.insert(key, site);
    }

    // one module per (source file, trait)
    let mut groups: BTreeMap<(&str, &str), Vec<&CallSite>> = BTreeMap::new();
    for site in by_key.values() {
        groups
            .entry((site.location.file.as_str(), site.interface.as_str()))
            .or_default()
            .push(site);
    }

    let mut w = CodeWriter::new();
    w.block(&header());
    w.line("//! Call-site interceptors, one module per source file and trait.");
    w.line("#![allow(non_snake_case)]");

    let mut imports: BTreeSet<(String, usize, String)> = BTreeSet::new();
    let mut open_file: Option<&str> = None;
    for ((file, interface), sites) in groups {
        let Some(iface) = graph.interface(interface) else { continue };
        let file_module = interceptor_file_module(file);
        let module = decorator_module_name(interface);
        let module_path = format!("{}::{}", file_module, module);
        names.claim(&format!("interceptors::{}", file_module), file)?;
        names.claim(&format!("interceptors::{}", module_path), &format!("{} in {}", interface, file))?;
        let ext = extension_trait_name(&iface.name);
        let ext_path = format!("{}::interceptors::{}::{}", options.generated_module, module_path, ext);

        let mut methods = Vec::new();
        for site in sites {
            let Some(member) = graph.member(interface, &site.method) else { continue };
            let name = interceptor_method_name(&site.method, site.location.line, site.location.column);

            output.edits.push(file, Edit::replace(site.token_range, name.clone()));
            imports.insert((file.to_string(), site.scope_insert, ext_path.clone()));
            output.entries.push(InterceptionEntry {
                file: site.file.clone(),
                line: site.location.line,
                column: site.location.column,
                interface: interface.to_string(),
                method: site.method.clone(),
                interceptor: format!("{}::{}", ext_path, name),
                signature_hash: member.signature_hash.clone(),
            });
            methods.push((name, &member.method));
        }

        if methods.is_empty() {
            continue;
        }
        if open_file != Some(file) {
            if open_file.is_some() {
                w.close("}");
            }
            w.blank();
            w.open(format!("pub mod {} {{", file_module));
            open_file = Some(file);
        } else {
            w.blank();
        }
        render_module(&mut w, iface, &module, &ext, &methods, options);
    }
    if open_file.is_some() {
        w.close("}");
    }

    for (file, offset, path) in imports {
        output
            .edits
            .push(&file, Edit::insert(offset, format!("\nuse {} as _;\n", path)));
    }

    output.entries.sort();
    render_table(&mut w, &output.entries);
    output.source = w.finish();

    tracing::debug!(
        entries = output.entries.len(),
        collisions = output.diagnostics.len(),
        "Synthesized interceptors"
    );
    Ok(output)
}

fn render_module(
    w: &mut CodeWriter,
    iface: &Interface,
    module: &str,
    ext: &str,
    methods: &[(String, &MethodSig)],
    options: &SynthOptions,
) {
    w.open(format!("pub mod {} {{", module));
    module_preamble(w, iface, &options.tracer_path());
    if methods.iter().any(|(_, m)| m.is_async) {
        w.line(format!("use {}::Instrument as _;", options.runtime_path));
    }
    w.blank();

    w.line(format!("/// Interceptors for calls of [`{}`] methods.", iface.path));
    w.open(format!("pub trait {} {{", ext));
    for (name, method) in methods {
        w.line(format!("{};", interceptor_signature(iface, method, name)));
    }
    w.close("}");
    w.blank();

    w.open(format!("impl<T: {} + ?Sized> {} for T {{", iface.path, ext));
    let mut first = true;
    for (name, method) in methods {
        if !first {
            w.blank();
        }
        first = false;
        let call = forward_call(&iface.path, method, "self");
        let span = instrumented_span(iface, method).unwrap_or_else(|| string_literal(&method.name));
        w.open(format!("{} {{", interceptor_signature(iface, method, name)));
        if method.is_async {
            w.line(format!("{}.instrument(TRACER.span({}))", call, span));
        } else {
            w.line(format!("let _span = TRACER.start_span({});", span));
            w.line(unsafe_wrapped(method, call));
        }
        w.close("}");
    }
    w.close("}");
    w.close("}");
}

/// Interceptor signature. Async methods return the instrumented future.
fn interceptor_signature(iface: &Interface, method: &MethodSig, name: &str) -> String {
    let mut sig = String::new();
    if method.is_unsafe {
        sig.push_str("unsafe ");
    }
    sig.push_str("fn ");
    sig.push_str(name);
    if let Some(ref generics) = method.generics {
        sig.push_str(generics);
    }
    sig.push('(');
    sig.push_str(&params_list(method));
    sig.push(')');
    if method.is_async {
        sig.push_str(&format!(
            " -> impl ::std::future::Future<Output = {}>",
            return_type(method)
        ));
        if iface.futures_are_send() {
            sig.push_str(" + Send");
        }
    } else if let Some(ref ret) = method.return_type {
        sig.push_str(" -> ");
        sig.push_str(ret);
    }
    if let Some(ref clause) = method.where_clause {
        sig.push(' ');
        sig.push_str(clause);
    }
    sig
}

fn render_table(w: &mut CodeWriter, entries: &[InterceptionEntry]) {
    w.blank();
    w.line("/// `(file, line, column, interceptor)` of every redirected call site.");
    w.open("pub static INTERCEPTIONS: &[(&str, u32, u32, &str)] = &[");
    for entry in entries {
        w.line(format!(
            "({}, {}, {}, {}),",
            string_literal(&entry.file),
            entry.line,
            entry.column,
            string_literal(&entry.interceptor)
        ));
    }
    w.close("];");
}
