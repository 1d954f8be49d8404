// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Decorator synthesis.
//!
//! For every instrumented trait, emits a wrapper type that holds the inner
//! instance behind the configured pointer, implements the trait by forwarding
//! every method, and opens a span around the instrumented ones. Synchronous
//! methods hold a [`SpanGuard`](crate::runtime::SpanGuard) for the duration
//! of the call, so the span closes on return and on unwind alike; futures
//! returned through `#[async_trait]` are wrapped with `Instrument`.

use crate::error::GenerateError;
use crate::model::{InstrumentationMode, Interface, MethodSig, Receiver, SymbolGraph};

use super::naming::{decorator_module_name, decorator_type_name, NameRegistry};
use super::render::{
    forward_call, header, method_signature, module_preamble, string_literal, CodeWriter,
};
use super::SynthOptions;

/// A decorator emitted for one trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDecorator {
    /// Fully qualified trait path.
    pub interface: String,
    /// Decorator type name (`OrdersTraced`).
    pub type_name: String,
    /// Module the decorator lives in (`shop_Orders`).
    pub module: String,
    /// Fully qualified decorator path.
    pub type_path: String,
}

/// Output of decorator synthesis.
#[derive(Debug, Clone, Default)]
pub struct DecoratorOutput {
    /// Decorators in trait path order.
    pub decorators: Vec<GeneratedDecorator>,
    /// Content of `decorators.rs`.
    pub source: String,
}

impl DecoratorOutput {
    /// Generated decorator for a trait, if one was emitted.
    pub fn for_interface(&self, interface: &str) -> Option<&GeneratedDecorator> {
        self.decorators.iter().find(|d| d.interface == interface)
    }
}

/// Emit one decorator per instrumented trait. Nothing is emitted when call
/// sites are intercepted instead.
pub fn synthesize_decorators(
    graph: &SymbolGraph,
    options: &SynthOptions,
    names: &mut NameRegistry,
) -> Result<DecoratorOutput, GenerateError> {
    let mut output = DecoratorOutput::default();
    let mut w = CodeWriter::new();
    w.block(&header());
    w.line("//! Tracing decorators, one module per instrumented trait.");
    w.line("#![allow(non_snake_case)]");

    let decorating = options.mode == InstrumentationMode::Decorate;
    for iface in graph.interfaces.iter().filter(|_| decorating) {
        if iface.instrumented().next().is_none() {
            continue;
        }

        let type_name = decorator_type_name(&iface.path);
        let module = decorator_module_name(&iface.path);
        names.claim(&format!("decorators::{}", module), &iface.path)?;

        w.blank();
        render_decorator(&mut w, iface, &type_name, &module, options);

        output.decorators.push(GeneratedDecorator {
            interface: iface.path.clone(),
            type_path: format!(
                "{}::decorators::{}::{}",
                options.generated_module, module, type_name
            ),
            type_name,
            module,
        });
    }

    output.source = w.finish();
    tracing::debug!(decorators = output.decorators.len(), "Synthesized decorators");
    Ok(output)
}

fn render_decorator(
    w: &mut CodeWriter,
    iface: &Interface,
    type_name: &str,
    module: &str,
    options: &SynthOptions,
) {
    let object = options.pointer.wrap(&format!("dyn {}", iface.path));

    w.open(format!("pub mod {} {{", module));
    module_preamble(w, iface, &options.tracer_path());
    if iface.is_async_trait {
        w.line(format!("use {}::Instrument as _;", options.runtime_path));
    }
    w.blank();

    w.line(format!("/// Tracing decorator for [`{}`].", iface.path));
    w.open(format!("pub struct {} {{", type_name));
    w.line(format!("inner: {},", object));
    w.close("}");
    w.blank();

    w.open(format!("impl {} {{", type_name));
    w.line("/// Wrap `inner`; every call is forwarded to it.");
    w.open(format!("pub fn new(inner: {}) -> Self {{", object));
    w.line("Self { inner }");
    w.close("}");
    w.close("}");
    w.blank();

    if iface.is_async_trait {
        w.line(async_trait_attribute(iface));
    }
    w.open(format!("impl {} for {} {{", iface.path, type_name));
    let mut first = true;
    for method in &iface.methods {
        if !first {
            w.blank();
        }
        first = false;
        render_method(w, iface, method);
    }
    w.close("}");
    w.close("}");
}

fn render_method(w: &mut CodeWriter, iface: &Interface, method: &MethodSig) {
    let receiver = match method.receiver {
        Receiver::RefMut => "&mut *self.inner",
        _ => "&*self.inner",
    };
    let call = forward_call(&iface.path, method, receiver);
    let span = instrumented_span(iface, method);

    w.open(format!("{} {{", method_signature(method, &method.name)));
    match (span, method.is_async) {
        (Some(span), true) => {
            w.line(format!("{}.instrument(TRACER.span({})).await", call, span));
        }
        (None, true) => {
            w.line(format!("{}.await", call));
        }
        (Some(span), false) => {
            w.line(format!("let _span = TRACER.start_span({});", span));
            w.line(unsafe_wrapped(method, call));
        }
        (None, false) => {
            w.line(unsafe_wrapped(method, call));
        }
    }
    w.close("}");
}

/// Quoted span name if `method` is instrumented.
pub(crate) fn instrumented_span(iface: &Interface, method: &MethodSig) -> Option<String> {
    iface
        .instrumented()
        .any(|m| m.name == method.name)
        .then(|| string_literal(&format!("{}.{}", iface.span_prefix, method.name)))
}

pub(crate) fn unsafe_wrapped(method: &MethodSig, call: String) -> String {
    if method.is_unsafe {
        format!("unsafe {{ {} }}", call)
    } else {
        call
    }
}

fn async_trait_attribute(iface: &Interface) -> String {
    match iface.async_trait_args.as_deref() {
        Some(args) => format!("#[::async_trait::async_trait({})]", args),
        None => "#[::async_trait::async_trait]".to_string(),
    }
}
