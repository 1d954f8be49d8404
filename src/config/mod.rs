// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for traceweave.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.traceweave/config.json
//! - Workspace config: .traceweave.json, .traceweave.yaml, or traceweave.config.json
//! - Local config: .traceweave.local.json (gitignored, for personal overrides)
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

// Re-export public types
pub use loader::{
    find_workspace_root, get_example_config, get_global_config_dir, get_global_config_path,
    init_config, load_config_file, load_global_config, load_local_config, load_workspace_config,
    save_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{MarkersConfig, ResolvedConfig, TracerConfig, WorkspaceConfig, DEFAULT_OUT_DIR};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
///
/// This is the main entry point for configuration loading.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let local = load_local_config(workspace_root)?;

    let config = merge_config(global, workspace, local, cli_options);
    validate(&config)?;
    Ok(config)
}

/// Reject settings that would produce unusable output.
pub fn validate(config: &ResolvedConfig) -> Result<(), ConfigError> {
    if !config.generated_module.starts_with("crate::") {
        return Err(ConfigError::InvalidValue {
            field: "generatedModule".to_string(),
            message: format!("'{}' must be a path below crate::", config.generated_module),
        });
    }
    if config.generated_module.trim_start_matches("crate::").contains("::") {
        return Err(ConfigError::InvalidValue {
            field: "generatedModule".to_string(),
            message: "nested generated modules are not supported".to_string(),
        });
    }
    if config.out_dir.trim().is_empty() || config.out_dir.trim() == "." {
        return Err(ConfigError::InvalidValue {
            field: "outDir".to_string(),
            message: "output directory must differ from the workspace root".to_string(),
        });
    }
    if config.parallel_jobs == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: "parallelJobs".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
