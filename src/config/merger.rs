// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use crate::model::{InstrumentationMode, Pointer};

use super::types::{ResolvedConfig, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub out_dir: Option<String>,
    pub generated_module: Option<String>,
    pub pointer: Option<Pointer>,
    pub mode: Option<InstrumentationMode>,
    pub parallel_jobs: Option<usize>,
    pub no_cache: Option<bool>,
    pub deny_warnings: Option<bool>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.traceweave.local.json)
/// 3. Workspace config (.traceweave.json)
/// 4. Global config (~/.traceweave/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    // Apply global config
    if let Some(config) = global {
        apply_workspace_config(&mut result, &config);
    }

    // Apply workspace config
    if let Some(config) = workspace {
        apply_workspace_config(&mut result, &config);
    }

    // Apply local config
    if let Some(config) = local {
        apply_workspace_config(&mut result, &config);
    }

    // Apply CLI options (highest precedence)
    apply_cli_options(&mut result, &cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ref include) = config.include {
        result.include = include.clone();
    }

    if let Some(ref exclude) = config.exclude {
        // Merge exclusions
        for pattern in exclude {
            if !result.exclude.contains(pattern) {
                result.exclude.push(pattern.clone());
            }
        }
    }

    if let Some(ref out_dir) = config.out_dir {
        result.out_dir = out_dir.clone();
    }

    if let Some(ref module) = config.generated_module {
        result.generated_module = module.clone();
    }

    if let Some(ref runtime) = config.runtime_path {
        result.runtime_path = runtime.clone();
    }

    if let Some(pointer) = config.pointer {
        result.pointer = pointer;
    }

    if let Some(ref activate) = config.activate_trait {
        result.activate_trait = activate.clone();
    }

    if let Some(mode) = config.mode {
        result.mode = mode;
    }

    if let Some(ref instrument) = config.instrument {
        for path in instrument {
            if !result.instrument.contains(path) {
                result.instrument.push(path.clone());
            }
        }
    }

    if let Some(ref markers) = config.markers {
        if let Some(ref traced) = markers.traced {
            result.traced_marker = traced.clone();
        }
        if let Some(ref decorates) = markers.decorates {
            result.decorates_marker = decorates.clone();
        }
        if let Some(ref prefix) = markers.registration_prefix {
            result.registration_prefix = prefix.clone();
        }
    }

    if let Some(ref tracer) = config.tracer {
        if tracer.name.is_some() {
            result.tracer_name = tracer.name.clone();
        }
        if tracer.version.is_some() {
            result.tracer_version = tracer.version.clone();
        }
    }

    if config.parallel_jobs.is_some() {
        result.parallel_jobs = config.parallel_jobs;
    }

    if let Some(cache) = config.cache {
        result.cache = cache;
    }

    if let Some(deny) = config.deny_warnings {
        result.deny_warnings = deny;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref out_dir) = cli.out_dir {
        result.out_dir = out_dir.clone();
    }

    if let Some(ref module) = cli.generated_module {
        result.generated_module = module.clone();
    }

    if let Some(pointer) = cli.pointer {
        result.pointer = pointer;
    }

    if let Some(mode) = cli.mode {
        result.mode = mode;
    }

    if cli.parallel_jobs.is_some() {
        result.parallel_jobs = cli.parallel_jobs;
    }

    if let Some(true) = cli.no_cache {
        result.cache = false;
    }

    if let Some(deny) = cli.deny_warnings {
        result.deny_warnings = deny;
    }
}
