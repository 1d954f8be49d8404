// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! traceweave - trait instrumentation for Rust, generated at build time.
//!
//! Marks on traits (`#[traced]`) or trait paths in the configuration select
//! methods to instrument. The generator scans the crate and emits, under a
//! separate output directory, a copy of the sources in which:
//!
//! - every instrumented trait has a decorator type that opens a `tracing`
//!   span around each instrumented method and forwards to the wrapped value,
//! - service registrations (`add_singleton::<dyn S, Impl>()` and friends) are
//!   patched to install the decorator chain without changing their lifetime
//!   or position,
//! - direct calls of instrumented methods are redirected to interceptors
//!   keyed by the exact line and column of the call.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`model`] - Facts, symbol graph and diagnostics
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Logging and metrics for the generator
//! - [`scanner`] - Tree-sitter based symbol scanning and name resolution
//! - [`cache`] - Incremental scan cache
//! - [`synth`] - Decorator, registration, interceptor and tracer synthesis
//! - [`rewrite`] - Source edits
//! - [`generator`] - The end-to-end pipeline
//! - [`runtime`] - What generated code links against
//!
//! The [`traced`] and [`decorates`] attributes come from `traceweave-macros`.
//! They leave the item unchanged so the unmodified crate builds; the
//! generator drops them from its copy.
//!
//! # Example
//!
//! ```rust,ignore
//! use traceweave::config::{load_config, CliOptions};
//! use traceweave::generator::{GenerateOptions, Generator};
//!
//! let config = load_config(root, CliOptions::default())?;
//! let options = GenerateOptions::from_config(root, &config)?;
//! let report = Generator::new(options).run().await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod model;
pub mod rewrite;
pub mod runtime;
pub mod scanner;
pub mod synth;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use error::{CacheError, ConfigError, GenerateError, Result, ScanError};
pub use generator::{GenerateOptions, GenerationReport, Generator};
pub use model::{Diagnostic, DiagnosticKind, Severity, SymbolGraph};
pub use traceweave_macros::{decorates, traced};

/// traceweave version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
