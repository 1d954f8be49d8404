// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and metrics for the generator itself.
//!
//! - **Logging**: `tracing` with an `EnvFilter` + fmt subscriber
//! - **Metrics**: phase timings and per-file scan outcomes
//!
//! # Usage
//!
//! Initialize telemetry at application startup:
//!
//! ```rust,ignore
//! use traceweave::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! Spans emitted by *generated* code live in [`crate::runtime`]; this module
//! only covers the generator.

mod init;
pub mod metrics;
mod spans;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    FileOutcome, Histogram, Metrics, MetricsSnapshot, OperationMetrics, GLOBAL_METRICS,
};
pub use spans::{PhaseSpan, SpanExt};
