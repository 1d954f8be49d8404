// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging setup for the generator.
//!
//! Logs always go to stderr: stdout carries reports and symbol graphs that
//! other tools parse.

use std::io::{self, IsTerminal};
use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How much the generator says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Level used when `RUST_LOG` is not set.
    pub default_level: Level,

    /// Log phase span closes with file and line, in the full format.
    pub detailed: bool,

    /// Log the metrics report when the guard drops.
    pub report_metrics: bool,
}

impl Default for TelemetryConfig {
    /// Progress logs (`--verbose`).
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            detailed: false,
            report_metrics: false,
        }
    }
}

impl TelemetryConfig {
    /// Debug output, phase timings and the metrics report (`--debug`).
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            detailed: true,
            report_metrics: true,
        }
    }

    /// Warnings and errors only; diagnostics are printed by the CLI itself.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }
}

/// Keep alive for the duration of the program. With `report_metrics` set,
/// the metrics report is logged when it drops.
pub struct TelemetryGuard {
    report_metrics: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.report_metrics {
            let report = super::metrics::GLOBAL_METRICS.snapshot().format_report();
            tracing::debug!("{}", report);
        }
    }
}

/// `RUST_LOG` when set, otherwise the configured level.
fn filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let installed = if config.detailed {
        tracing_subscriber::registry()
            .with(filter(config))
            .with(
                layer
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter(config))
            .with(layer.with_target(false).compact())
            .try_init()
    };
    installed.map_err(|e| io::Error::other(e.to_string()))?;

    Ok(TelemetryGuard {
        report_metrics: config.report_metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_by_flag() {
        assert_eq!(TelemetryConfig::default().default_level, Level::INFO);
        assert_eq!(TelemetryConfig::production().default_level, Level::WARN);
        assert_eq!(
            TelemetryConfig::production().with_level(Level::ERROR).default_level,
            Level::ERROR
        );
    }

    #[test]
    fn test_only_debug_reports_metrics() {
        let debug = TelemetryConfig::development();
        assert!(debug.detailed);
        assert!(debug.report_metrics);
        assert!(!TelemetryConfig::default().report_metrics);
        assert!(!TelemetryConfig::production().detailed);
    }

    #[test]
    fn test_filter_falls_back_to_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            let filter = filter(&TelemetryConfig::production());
            assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::WARN));
        }
    }
}
