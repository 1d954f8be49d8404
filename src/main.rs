// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! traceweave main entry point - CLI and commands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use traceweave::config::{self, CliOptions};
use traceweave::generator::{GenerateOptions, GenerationReport, Generator};
use traceweave::model::{Diagnostic, InstrumentationMode, Pointer, Severity};
use traceweave::telemetry::{init_telemetry, TelemetryConfig};

/// traceweave version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// traceweave - instrument trait methods with tracing spans at build time.
#[derive(Parser)]
#[command(name = "traceweave")]
#[command(author, version, about = "Instrument trait methods with tracing spans at build time", long_about = None)]
struct Cli {
    /// Project root (defaults to the nearest directory with Cargo.toml)
    #[arg(short = 'C', long, global = true, env = "TRACEWEAVE_ROOT")]
    root: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show progress logs
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show debug output and the metrics report
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Smart pointer for decorated services.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PointerArg {
    Box,
    Arc,
}

impl From<PointerArg> for Pointer {
    fn from(pointer: PointerArg) -> Self {
        match pointer {
            PointerArg::Box => Pointer::Box,
            PointerArg::Arc => Pointer::Arc,
        }
    }
}

/// Where spans are opened.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Decorators installed by patched registrations
    Decorate,
    /// Interceptors at redirected call sites
    Intercept,
}

impl From<ModeArg> for InstrumentationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Decorate => InstrumentationMode::Decorate,
            ModeArg::Intercept => InstrumentationMode::Intercept,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Options shared by commands that scan.
#[derive(clap::Args)]
struct ScanArgs {
    /// Number of parallel scan workers
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Ignore and rebuild the scan cache
    #[arg(long)]
    no_cache: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Subcommands for traceweave.
#[derive(Subcommand)]
enum Commands {
    /// Scan the project and write instrumented sources
    Generate {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output directory
        #[arg(short, long)]
        out_dir: Option<String>,

        /// Generated module path (crate::traced)
        #[arg(long)]
        module: Option<String>,

        /// Pointer type services are held in
        #[arg(long, value_enum)]
        pointer: Option<PointerArg>,

        /// Instrument through registrations or call sites
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Read a serialized symbol graph instead of scanning
        #[arg(long)]
        facts: Option<PathBuf>,

        /// Compute everything but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Fail on any diagnostic
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Scan the project and print or save the symbol graph
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Write the symbol graph as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize a new configuration file
    Init,

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let telemetry = if cli.debug {
        TelemetryConfig::development()
    } else if cli.verbose {
        TelemetryConfig::default()
    } else if cli.quiet {
        TelemetryConfig::production().with_level(tracing::Level::ERROR)
    } else {
        TelemetryConfig::production()
    };
    let guard = match init_telemetry(&telemetry) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{} logging unavailable: {}", "warning:".yellow().bold(), e);
            None
        }
    };

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            2
        }
    };
    drop(guard);
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let root = match cli.root {
        Some(root) => root,
        None => {
            let cwd = std::env::current_dir()?;
            config::find_workspace_root(&cwd).unwrap_or(cwd)
        }
    };

    match cli.command {
        Commands::Generate {
            scan,
            out_dir,
            module,
            pointer,
            mode,
            facts,
            dry_run,
            deny_warnings,
        } => {
            let cli_options = CliOptions {
                out_dir,
                generated_module: module,
                pointer: pointer.map(Pointer::from),
                mode: mode.map(InstrumentationMode::from),
                parallel_jobs: scan.jobs,
                no_cache: scan.no_cache.then_some(true),
                deny_warnings: deny_warnings.then_some(true),
            };
            let config = config::load_config(&root, cli_options)?;
            let mut options = GenerateOptions::from_config(&root, &config)?;
            options.dry_run = dry_run;
            options.facts = facts;

            let report = Generator::new(options).run().await?;
            print_report(&report, scan.format, cli.quiet)?;
            Ok(if report.is_failure(config.deny_warnings) { 1 } else { 0 })
        }
        Commands::Scan { scan, output } => {
            let cli_options = CliOptions {
                parallel_jobs: scan.jobs,
                no_cache: scan.no_cache.then_some(true),
                ..Default::default()
            };
            let config = config::load_config(&root, cli_options)?;
            let options = GenerateOptions::from_config(&root, &config)?;
            let (graph, report) = Generator::new(options).graph().await?;

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&graph)?)?;
                if !cli.quiet {
                    println!("Wrote symbol graph to {}", path.display());
                }
            }
            match scan.format {
                OutputFormat::Json if !cli.quiet => {
                    println!("{}", serde_json::to_string_pretty(&graph)?);
                }
                _ => {
                    if !cli.quiet {
                        println!(
                            "{} {} traits, {} instrumented methods, {} user decorators, {} registrations, {} call sites",
                            "Scanned:".bright_blue().bold(),
                            graph.interfaces.len(),
                            graph.members.len(),
                            graph.decorators.len(),
                            graph.registrations.len(),
                            graph.call_sites.len()
                        );
                        print_scan_counts(&report);
                    }
                    print_diagnostics(&report.diagnostics);
                }
            }
            Ok(0)
        }
        Commands::Config { action } => {
            match action {
                Some(ConfigAction::Show) | None => {
                    let config = config::load_config(&root, CliOptions::default())?;
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
            }
            Ok(0)
        }
        Commands::Init => {
            let path = config::init_config(&root, None)?;
            println!("Created config file: {}", path.display());
            Ok(0)
        }
        Commands::Version => {
            println!("traceweave {}", VERSION);
            println!("scanner {}", traceweave::scanner::SCANNER_VERSION);
            Ok(0)
        }
    }
}

fn print_report(report: &GenerationReport, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if !quiet {
        print_scan_counts(report);
        println!(
            "{} {} decorators, {} registrations patched of {}, {} call sites intercepted",
            "Generated:".bright_blue().bold(),
            report.decorators,
            report.registrations_patched,
            report.registrations,
            report.interceptions
        );
    }
    print_diagnostics(&report.diagnostics);

    if !quiet {
        let status = if report.dry_run {
            format!("Dry run: {} files would be written", report.files_written.len()).yellow()
        } else {
            format!("Wrote {} files in {}ms", report.files_written.len(), report.duration_ms).green()
        };
        println!("{}", status);
    }
    Ok(())
}

fn print_scan_counts(report: &GenerationReport) {
    println!(
        "{} {} files ({} from cache)",
        "Scanned:".bright_blue().bold(),
        report.files_scanned + report.files_cached,
        report.files_cached
    );
    for (path, error) in &report.scan_errors {
        eprintln!("{} {}: {}", "skipped".yellow(), path, error);
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let line = diagnostic.to_string();
        match diagnostic.severity {
            Severity::Warning => eprintln!("{}", line.yellow()),
            Severity::Error => eprintln!("{}", line.red()),
        }
    }
}
