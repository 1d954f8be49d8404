// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span helpers for the generator's own instrumentation.

use std::time::Instant;
use tracing::{info_span, Span};

/// Extension trait for enhanced span functionality.
pub trait SpanExt {
    /// Record the result of an operation (success/error).
    fn record_result<T, E>(&self, result: &Result<T, E>);

    /// Record a count.
    fn record_count(&self, name: &'static str, value: usize);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>) {
        self.record("success", result.is_ok());
    }

    fn record_count(&self, name: &'static str, value: usize) {
        self.record(name, value as u64);
    }
}

/// RAII guard for one generator phase (scan, resolve, synthesize, write).
///
/// Records the phase duration to metrics when finished or dropped.
pub struct PhaseSpan {
    phase: &'static str,
    start: Instant,
    span: Span,
    finished: bool,
}

impl PhaseSpan {
    /// Start a new phase span.
    pub fn start(phase: &'static str) -> Self {
        let span = info_span!(
            "phase",
            phase = phase,
            items = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
        );

        Self {
            phase,
            start: Instant::now(),
            span,
            finished: false,
        }
    }

    /// Get the underlying tracing span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record the number of items the phase produced.
    pub fn record_items(&self, items: usize) {
        self.span.record_count("items", items);
    }

    /// Finish the span, recording duration and success.
    pub fn finish(mut self, success: bool) {
        self.span.record("success", success);
        self.close();
        tracing::debug!(parent: &self.span, phase = self.phase, "Phase complete");
    }

    /// Finish with a result, automatically determining success.
    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) {
        self.finish(result.is_ok());
    }

    fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_secs_f64() * 1000.0);
        super::metrics::GLOBAL_METRICS.record_operation(self.phase, duration);
    }
}

impl Drop for PhaseSpan {
    fn drop(&mut self) {
        // early returns and panics still record timing
        self.close();
    }
}

/// Macro for timing a generator phase.
///
/// # Example
///
/// ```rust,ignore
/// use traceweave::phase;
///
/// fn resolve() {
///     let _phase = phase!("generator.resolve");
///     // ... work happens ...
/// } // Timing recorded on drop
/// ```
#[macro_export]
macro_rules! phase {
    ($name:expr) => {
        $crate::telemetry::PhaseSpan::start($name)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::metrics::GLOBAL_METRICS;

    #[test]
    fn test_phase_span_lifecycle() {
        let span = PhaseSpan::start("test.phase.lifecycle");
        span.record_items(3);
        span.finish(true);

        let metrics = GLOBAL_METRICS.operation_metrics("test.phase.lifecycle").unwrap();
        assert_eq!(metrics.count, 1);
    }

    #[test]
    fn test_phase_span_records_on_drop() {
        {
            let _phase = crate::phase!("test.phase.drop");
        }
        assert!(GLOBAL_METRICS.operation_metrics("test.phase.drop").is_some());
    }

    #[test]
    fn test_phase_span_with_result() {
        let span = PhaseSpan::start("test.phase.result");
        let result: Result<(), &str> = Err("failed");
        span.finish_with_result(&result);
        assert_eq!(
            GLOBAL_METRICS.operation_metrics("test.phase.result").unwrap().count,
            1
        );
    }

    #[test]
    fn test_span_ext() {
        let span = info_span!("test", success = tracing::field::Empty);
        let result: Result<i32, &str> = Ok(42);
        span.record_result(&result);
    }
}
