// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The tracer handed to generated decorators and interceptors.

use tracing::span::EnteredSpan;
use tracing::{info_span, Span};

/// Target of every instrumented span.
pub const TARGET: &str = "traceweave";

/// Static name of every instrumented span; the instrumented name is carried
/// in the `otel.name` field.
pub const SPAN_NAME: &str = "traced";

/// Named, versioned span factory.
///
/// Built once per process and never mutated, so it can be shared freely
/// between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracer {
    name: &'static str,
    version: &'static str,
}

impl Tracer {
    pub const fn new(name: &'static str, version: &'static str) -> Self {
        Self { name, version }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Create a span named `name` without entering it.
    ///
    /// Used for futures, which enter and exit the span on every poll.
    pub fn span(&self, name: &'static str) -> Span {
        info_span!(
            target: "traceweave",
            "traced",
            otel.name = name,
            tracer.name = self.name,
            tracer.version = self.version,
        )
    }

    /// Create and enter a span named `name`.
    ///
    /// The span ends when the returned guard is dropped, on return and on
    /// unwind alike.
    pub fn start_span(&self, name: &'static str) -> SpanGuard {
        SpanGuard {
            name,
            entered: self.span(name).entered(),
        }
    }
}

/// An entered span; dropping it exits and closes the span.
#[must_use = "the span ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SpanGuard {
    name: &'static str,
    entered: EnteredSpan,
}

impl SpanGuard {
    /// Instrumented name of the span (`Orders.place`).
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn span(&self) -> &Span {
        &self.entered
    }

    /// Close the span now.
    pub fn end(self) {}
}
