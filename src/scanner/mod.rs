// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Symbol scanner.
//!
//! Discovers instrumented traits, user decorators, registration calls and
//! method calls in a Rust crate, and resolves them into a [`SymbolGraph`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐     ┌──────────────────┐
//! │  ProjectScanner  │ ──▶ │ SourceScanner │ ──▶ │   build_graph    │
//! │ (walk + workers) │     │ (tree-sitter) │     │ (name resolution)│
//! └──────────────────┘     └───────────────┘     └──────────────────┘
//!          │                                               │
//!          ▼                                               ▼
//!     FactCache (SQLite)                              SymbolGraph
//! ```
//!
//! [`SymbolGraph`]: crate::model::SymbolGraph

pub mod parser;
pub mod project;
pub mod resolve;
pub mod typetext;

pub use parser::{content_hash, module_path_for, ScanOptions, SourceScanner, SCANNER_VERSION};
pub use project::{ProjectScanOptions, ProjectScanner, ScanOutcome, ScannedFile};
pub use resolve::{build_graph, signature_hash, ResolveOptions};
