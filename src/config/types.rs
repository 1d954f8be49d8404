// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use serde::{Deserialize, Serialize};

use crate::model::{InstrumentationMode, Pointer};

/// Default generated output directory, relative to the workspace root.
pub const DEFAULT_OUT_DIR: &str = "target/traceweave";

/// Workspace configuration for traceweave.
/// Can be defined in .traceweave.json or .traceweave.yaml in the project root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Glob patterns of source files to scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,

    /// Glob patterns of source files to skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    /// Directory generated sources are written to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,

    /// Module path of the generated code inside the crate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_module: Option<String>,

    /// Path of the tracing runtime generated code links against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_path: Option<String>,

    /// Smart pointer services are held in (box, arc)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<Pointer>,

    /// Activation trait for implementation registrations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activate_trait: Option<String>,

    /// Span source: patched registrations or redirected call sites
    /// (decorate, intercept)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<InstrumentationMode>,

    /// Trait paths to instrument without a marker attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers: Option<MarkersConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracer: Option<TracerConfig>,

    /// Number of parallel scan workers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_jobs: Option<usize>,

    /// Reuse facts of unchanged files between runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,

    /// Treat every diagnostic as an error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_warnings: Option<bool>,
}

/// Attribute and method naming conventions the scanner recognizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkersConfig {
    /// Instrumentation attribute (`traced`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traced: Option<String>,

    /// User decorator attribute (`decorates`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decorates: Option<String>,

    /// Prefix of registry registration methods (`add_`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_prefix: Option<String>,
}

/// Tracer identity overrides. Defaults come from `Cargo.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Fully resolved configuration with all defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub out_dir: String,
    pub generated_module: String,
    pub runtime_path: String,
    pub pointer: Pointer,
    pub activate_trait: String,
    pub mode: InstrumentationMode,
    pub instrument: Vec<String>,
    pub traced_marker: String,
    pub decorates_marker: String,
    pub registration_prefix: String,
    pub tracer_name: Option<String>,
    pub tracer_version: Option<String>,
    pub parallel_jobs: Option<usize>,
    pub cache: bool,
    pub deny_warnings: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            include: vec!["src/**/*.rs".to_string()],
            exclude: vec!["target/**".to_string(), "src/bin/**".to_string()],
            out_dir: DEFAULT_OUT_DIR.to_string(),
            generated_module: "crate::traced".to_string(),
            runtime_path: "::traceweave::runtime".to_string(),
            pointer: Pointer::Box,
            activate_trait: "crate::di::Activate".to_string(),
            mode: InstrumentationMode::Decorate,
            instrument: Vec::new(),
            traced_marker: "traced".to_string(),
            decorates_marker: "decorates".to_string(),
            registration_prefix: "add_".to_string(),
            tracer_name: None,
            tracer_version: None,
            parallel_jobs: None,
            cache: true,
            deny_warnings: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_config_camel_case() {
        let config: WorkspaceConfig = serde_json::from_str(
            r#"{
                "outDir": "gen",
                "generatedModule": "crate::instrumented",
                "pointer": "arc",
                "mode": "intercept",
                "markers": { "registrationPrefix": "register_" },
                "tracer": { "name": "shop" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.out_dir.as_deref(), Some("gen"));
        assert_eq!(config.generated_module.as_deref(), Some("crate::instrumented"));
        assert_eq!(config.pointer, Some(Pointer::Arc));
        assert_eq!(config.mode, Some(InstrumentationMode::Intercept));
        assert_eq!(
            config.markers.unwrap().registration_prefix.as_deref(),
            Some("register_")
        );
        assert_eq!(config.tracer.unwrap().name.as_deref(), Some("shop"));
    }

    #[test]
    fn test_workspace_config_yaml() {
        let config: WorkspaceConfig =
            serde_yaml::from_str("instrument:\n  - crate::shop::Orders\ncache: false\n").unwrap();
        assert_eq!(config.instrument.unwrap(), vec!["crate::shop::Orders"]);
        assert_eq!(config.cache, Some(false));
    }

    #[test]
    fn test_empty_config_serializes_empty() {
        let json = serde_json::to_string(&WorkspaceConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_resolved_defaults() {
        let config = ResolvedConfig::default();
        assert_eq!(config.out_dir, DEFAULT_OUT_DIR);
        assert_eq!(config.pointer, Pointer::Box);
        assert_eq!(config.mode, InstrumentationMode::Decorate);
        assert!(config.cache);
        assert!(!config.deny_warnings);
    }
}
