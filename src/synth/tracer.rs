// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide tracer emission.
//!
//! The generated crate gets exactly one `TRACER` static, named and versioned
//! after the package being instrumented.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

use super::render::{header, string_literal, CodeWriter};
use super::SynthOptions;

/// Name and version the tracer reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerIdentity {
    pub name: String,
    pub version: String,
}

impl Default for TracerIdentity {
    fn default() -> Self {
        Self {
            name: "traced".to_string(),
            version: "0.0.0".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Manifest {
    package: Option<ManifestPackage>,
}

#[derive(Deserialize)]
struct ManifestPackage {
    name: String,
    #[serde(default)]
    version: Option<toml::Value>,
}

impl TracerIdentity {
    /// Read `[package]` name and version from a `Cargo.toml`.
    ///
    /// A workspace-inherited version (`version.workspace = true`) falls back
    /// to `0.0.0`.
    pub fn from_manifest(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_manifest(&content)
    }

    pub fn parse_manifest(content: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = toml::from_str(content)?;
        let package = manifest.package.ok_or_else(|| ConfigError::InvalidValue {
            field: "package".to_string(),
            message: "manifest has no [package] table".to_string(),
        })?;
        let version = match package.version {
            Some(toml::Value::String(v)) => v,
            _ => Self::default().version,
        };
        Ok(Self {
            name: package.name,
            version,
        })
    }
}

/// Content of `tracer.rs`.
pub fn render_tracer(options: &SynthOptions) -> String {
    let runtime = &options.runtime_path;
    let mut w = CodeWriter::new();
    w.block(&header());
    w.line("//! The process-wide tracer shared by every decorator and interceptor.");
    w.blank();
    w.open(format!(
        "pub static TRACER: ::std::sync::LazyLock<{}::Tracer> = ::std::sync::LazyLock::new(|| {{",
        runtime
    ));
    w.line(format!(
        "{}::Tracer::new({}, {})",
        runtime,
        string_literal(&options.tracer.name),
        string_literal(&options.tracer.version)
    ));
    w.close("});");
    w.finish()
}
