// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Text emission helpers shared by the synthesizers.
//!
//! Generated sources are built with [`CodeWriter`], an indentation-aware line
//! buffer.

use crate::model::{Interface, MethodSig, Receiver};

/// First line of every generated file.
pub fn header() -> String {
    format!(
        "// @generated by traceweave {}. Do not edit.\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Indentation-aware source buffer.
#[derive(Debug, Default)]
pub struct CodeWriter {
    buf: String,
    indent: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if text.is_empty() {
            self.buf.push('\n');
        } else {
            for _ in 0..self.indent {
                self.buf.push_str("    ");
            }
            self.buf.push_str(text);
            self.buf.push('\n');
        }
        self
    }

    /// Write a multi-line block, re-indenting each line.
    pub fn block(&mut self, text: &str) -> &mut Self {
        for line in text.lines() {
            self.line(line);
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        if !self.buf.is_empty() && !self.buf.ends_with("\n\n") {
            self.buf.push('\n');
        }
        self
    }

    /// Write `text` and indent the following lines.
    pub fn open(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.line(text);
        self.indent += 1;
        self
    }

    /// Dedent and write `text`.
    pub fn close(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self.line(text)
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Signature of a forwarding method with parameters renamed to `__argN`.
///
/// `fn place(&self, __arg0: OrderId) -> Result<(), Error>`
pub fn method_signature(method: &MethodSig, name: &str) -> String {
    let mut sig = String::new();
    if method.is_unsafe {
        sig.push_str("unsafe ");
    }
    if method.is_async {
        sig.push_str("async ");
    }
    sig.push_str("fn ");
    sig.push_str(name);
    if let Some(ref generics) = method.generics {
        sig.push_str(generics);
    }
    sig.push('(');
    sig.push_str(&params_list(method));
    sig.push(')');
    if let Some(ref ret) = method.return_type {
        sig.push_str(" -> ");
        sig.push_str(ret);
    }
    if let Some(ref clause) = method.where_clause {
        sig.push(' ');
        sig.push_str(clause);
    }
    sig
}

/// Receiver plus renamed parameters: `&self, __arg0: OrderId`.
pub fn params_list(method: &MethodSig) -> String {
    let mut parts = Vec::new();
    if method.receiver != Receiver::None {
        parts.push(method.receiver.as_param().to_string());
    }
    for (i, ty) in method.params.iter().enumerate() {
        parts.push(format!("__arg{}: {}", i, ty));
    }
    parts.join(", ")
}

/// Renamed argument names: `__arg0, __arg1`.
pub fn arg_names(method: &MethodSig) -> Vec<String> {
    (0..method.params.len()).map(|i| format!("__arg{}", i)).collect()
}

/// UFCS call forwarding to `receiver` through `trait_path`.
///
/// `crate::shop::Orders::place(&*self.inner, __arg0)`
pub fn forward_call(trait_path: &str, method: &MethodSig, receiver: &str) -> String {
    let mut args = vec![receiver.to_string()];
    args.extend(arg_names(method));
    format!("{}::{}({})", trait_path, method.name, args.join(", "))
}

/// Return type text, `()` when omitted.
pub fn return_type(method: &MethodSig) -> &str {
    method.return_type.as_deref().unwrap_or("()")
}

/// Imports shared by every generated module that implements or calls a
/// trait: the trait's module, the `use` items of its declaring scope, and the
/// process tracer.
pub fn module_preamble(w: &mut CodeWriter, iface: &Interface, tracer_path: &str) {
    w.line("#![allow(unused_imports, non_snake_case, clippy::all)]");
    w.line(format!("use {}::*;", iface.module_path));
    for import in &iface.imports {
        w.line(format!("use {};", import));
    }
    w.line(format!("use {};", tracer_path));
}

/// Escape a string for a Rust string literal.
pub fn string_literal(value: &str) -> String {
    format!("{:?}", value)
}
