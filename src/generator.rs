// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The generation pipeline.
//!
//! ```text
//! collect ─▶ scan (cache) ─▶ build_graph ─▶ synthesize ─▶ rewrite ─▶ write
//! ```
//!
//! Output layout under `out_dir`:
//!
//! ```text
//! src/**.rs                    scanned sources with edits applied
//! src/<module>/mod.rs          generated module root
//! src/<module>/tracer.rs       the TRACER static
//! src/<module>/decorators.rs
//! src/<module>/registrations.rs
//! src/<module>/interceptors.rs
//! Cargo.toml                   the project manifest, buildable in place
//! Cargo.lock                   copied when the project has one
//! interceptions.json
//! facts.db                     scan cache
//! ```
//!
//! Marker attributes are removed from mirrored sources. Nothing is written when synthesis fails, so a naming collision leaves a
//! previous output untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::cache::FactCache;
use crate::config::ResolvedConfig;
use crate::error::{ConfigError, GenerateError};
use crate::model::{ByteRange, Diagnostic, FileFacts, Severity, SymbolGraph};
use crate::rewrite::{apply_edits, Edit, FileEdits};
use crate::scanner::{
    build_graph, ProjectScanOptions, ProjectScanner, ResolveOptions, ScanOptions, SourceScanner,
};
use crate::synth::{synthesize, Synthesis, SynthOptions, TracerIdentity};
use crate::telemetry::PhaseSpan;

/// File the interception table is written to.
pub const INTERCEPTIONS_FILE: &str = "interceptions.json";

/// Settings for one generation pass.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Project root (the directory holding `Cargo.toml`).
    pub root: PathBuf,
    /// Output directory; relative paths are resolved against `root`.
    pub out_dir: PathBuf,
    pub project: ProjectScanOptions,
    pub resolve: ResolveOptions,
    pub synth: SynthOptions,
    /// Reuse facts of unchanged files.
    pub use_cache: bool,
    /// Compute everything, write nothing.
    pub dry_run: bool,
    /// Read a serialized symbol graph instead of scanning.
    pub facts: Option<PathBuf>,
}

impl GenerateOptions {
    /// Options with defaults; the tracer is named after `root/Cargo.toml`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tracer = package_tracer(&root).unwrap_or_else(|e| {
            tracing::warn!("Unreadable Cargo.toml, using default tracer name: {}", e);
            TracerIdentity::default()
        });
        Self::with_tracer(root, tracer)
    }

    fn with_tracer(root: PathBuf, tracer: TracerIdentity) -> Self {
        Self {
            out_dir: PathBuf::from(crate::config::DEFAULT_OUT_DIR),
            project: ProjectScanOptions::new(root.clone()),
            root,
            resolve: ResolveOptions::default(),
            synth: SynthOptions {
                tracer,
                ..Default::default()
            },
            use_cache: true,
            dry_run: false,
            facts: None,
        }
    }

    /// Build options from resolved configuration.
    ///
    /// The tracer is named after the `[package]` of `root/Cargo.toml` unless
    /// the configuration overrides it.
    pub fn from_config(root: impl Into<PathBuf>, config: &ResolvedConfig) -> Result<Self, ConfigError> {
        let root = root.into();
        let mut tracer = package_tracer(&root)?;
        if let Some(ref name) = config.tracer_name {
            tracer.name = name.clone();
        }
        if let Some(ref version) = config.tracer_version {
            tracer.version = version.clone();
        }
        let mut options = Self::with_tracer(root, tracer.clone());

        options.out_dir = PathBuf::from(&config.out_dir);
        options.project.include = config.include.clone();
        options.project.exclude = config.exclude.clone();
        if let Some(jobs) = config.parallel_jobs {
            options.project.parallel_jobs = jobs;
        }
        options.project.scan = ScanOptions {
            marker: config.traced_marker.clone(),
            decorates_marker: config.decorates_marker.clone(),
            registration_prefix: config.registration_prefix.clone(),
        };
        options.resolve = ResolveOptions {
            instrument: config.instrument.clone(),
            pointer: config.pointer,
        };
        options.synth = SynthOptions {
            generated_module: config.generated_module.clone(),
            runtime_path: config.runtime_path.clone(),
            pointer: config.pointer,
            activate_trait: config.activate_trait.clone(),
            mode: config.mode,
            tracer,
        };
        options.use_cache = config.cache;
        Ok(options)
    }

    /// Absolute output directory.
    pub fn out_path(&self) -> PathBuf {
        if self.out_dir.is_absolute() {
            self.out_dir.clone()
        } else {
            self.root.join(&self.out_dir)
        }
    }
}

/// Summary of a generation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub files_scanned: usize,
    pub files_cached: usize,
    /// Files that could not be scanned: `(path, error)`.
    pub scan_errors: Vec<(String, String)>,
    pub interfaces: usize,
    pub instrumented_methods: usize,
    pub decorators: usize,
    pub registrations: usize,
    pub registrations_patched: usize,
    pub interceptions: usize,
    /// Written files, relative to the output directory.
    pub files_written: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn warnings(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn errors(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Whether the pass should fail the build.
    pub fn is_failure(&self, deny_warnings: bool) -> bool {
        self.errors() > 0 || (deny_warnings && !self.diagnostics.is_empty())
    }
}

/// Sources the pass reads and rewrites.
struct SourceSet {
    /// Relative path → content, for every file to mirror.
    contents: BTreeMap<String, String>,
    /// Crate root and its item insertion offset.
    crate_root: Option<(String, usize)>,
    /// Marker attributes to drop, per file.
    markers: BTreeMap<String, Vec<ByteRange>>,
}

/// Tracer identity from `root/Cargo.toml`; a missing manifest gives the default.
fn package_tracer(root: &Path) -> Result<TracerIdentity, ConfigError> {
    let manifest = root.join("Cargo.toml");
    match TracerIdentity::from_manifest(&manifest) {
        Err(ConfigError::NotFound(_)) => {
            tracing::warn!("No Cargo.toml at {}, using default tracer name", manifest.display());
            Ok(TracerIdentity::default())
        }
        other => other,
    }
}

const DEPENDENCY_TABLES: &[&str] = &[
    "dependencies",
    "dev-dependencies",
    "dev_dependencies",
    "build-dependencies",
    "build_dependencies",
];

fn absolute_string(root: &Path, path: &str) -> Option<toml::Value> {
    Path::new(path)
        .is_relative()
        .then(|| toml::Value::String(root.join(path).to_string_lossy().into_owned()))
}

/// Rewrite relative `path = ".."` entries of a dependency table.
fn absolutize_paths(deps: &mut toml::Table, root: &Path) {
    for (_, spec) in deps.iter_mut() {
        let toml::Value::Table(spec) = spec else { continue };
        if let Some(absolute) = spec.get("path").and_then(|p| p.as_str()).and_then(|p| absolute_string(root, p)) {
            spec.insert("path".to_string(), absolute);
        }
    }
}

fn absolutize_dependencies(table: &mut toml::Table, root: &Path) {
    for key in DEPENDENCY_TABLES {
        if let Some(toml::Value::Table(deps)) = table.get_mut(*key) {
            absolutize_paths(deps, root);
        }
    }
}

/// The project manifest rewritten to build from the output directory.
///
/// Relative dependency paths and the build script point back into `root`.
/// Test, bench and example targets are dropped because their sources are
/// not mirrored, and the mirror is its own workspace.
pub fn mirror_manifest(root: &Path, content: &str) -> Result<String, GenerateError> {
    let invalid = |message: String| GenerateError::Serialize {
        what: "mirrored Cargo.toml".to_string(),
        message,
    };
    let mut manifest: toml::Table = content.parse().map_err(|e: toml::de::Error| invalid(e.to_string()))?;

    absolutize_dependencies(&mut manifest, root);
    if let Some(toml::Value::Table(targets)) = manifest.get_mut("target") {
        for (_, platform) in targets.iter_mut() {
            if let toml::Value::Table(platform) = platform {
                absolutize_dependencies(platform, root);
            }
        }
    }
    if let Some(toml::Value::Table(patches)) = manifest.get_mut("patch") {
        for (_, registry) in patches.iter_mut() {
            if let toml::Value::Table(registry) = registry {
                absolutize_paths(registry, root);
            }
        }
    }
    if let Some(toml::Value::Table(package)) = manifest.get_mut("package") {
        let build = match package.get("build") {
            Some(toml::Value::String(build)) => absolute_string(root, build),
            None if root.join("build.rs").exists() => absolute_string(root, "build.rs"),
            _ => None,
        };
        if let Some(build) = build {
            package.insert("build".to_string(), build);
        }
    }
    for target in ["test", "bench", "example"] {
        manifest.remove(target);
    }

    match manifest.get_mut("workspace") {
        Some(toml::Value::Table(workspace)) => {
            for key in ["members", "default-members", "exclude"] {
                workspace.remove(key);
            }
            if let Some(toml::Value::Table(deps)) = workspace.get_mut("dependencies") {
                absolutize_paths(deps, root);
            }
        }
        _ => {
            manifest.insert("workspace".to_string(), toml::Value::Table(toml::Table::new()));
        }
    }

    toml::to_string(&manifest).map_err(|e| invalid(e.to_string()))
}

/// Runs the pipeline.
pub struct Generator {
    options: GenerateOptions,
}

impl Generator {
    pub fn new(options: GenerateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Scan and resolve without synthesizing.
    pub async fn graph(&self) -> Result<(SymbolGraph, GenerationReport), GenerateError> {
        let (graph, _, report) = self.load().await?;
        Ok((graph, report))
    }

    /// Run the whole pipeline.
    pub async fn run(&self) -> Result<GenerationReport, GenerateError> {
        let start = Instant::now();
        let (graph, sources, mut report) = self.load().await?;

        let phase = PhaseSpan::start("generator.synthesize");
        let synthesis = synthesize(&graph, &self.options.synth);
        phase.finish_with_result(&synthesis);
        let synthesis = synthesis?;

        let outputs = self.render_outputs(&synthesis, &sources)?;

        report.decorators = synthesis.decorators.decorators.len();
        report.registrations_patched = synthesis.registrations.patched.len();
        report.interceptions = synthesis.interceptors.entries.len();
        report.diagnostics = synthesis.diagnostics.clone();
        report.files_written = outputs.keys().cloned().collect();
        report.dry_run = self.options.dry_run;

        for diagnostic in &report.diagnostics {
            match diagnostic.severity {
                Severity::Warning => tracing::warn!("{}", diagnostic),
                Severity::Error => tracing::error!("{}", diagnostic),
            }
        }

        if self.options.dry_run {
            tracing::info!(files = outputs.len(), "Dry run, nothing written");
        } else {
            let phase = PhaseSpan::start("generator.write");
            let written = self.write_outputs(&outputs).await;
            phase.finish_with_result(&written);
            written?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        #[cfg(feature = "telemetry")]
        crate::telemetry::metrics::GLOBAL_METRICS.record_operation("generator.run", start.elapsed());
        tracing::info!(
            decorators = report.decorators,
            patched = report.registrations_patched,
            interceptions = report.interceptions,
            diagnostics = report.diagnostics.len(),
            duration_ms = report.duration_ms,
            "Generation complete"
        );
        Ok(report)
    }

    /// Produce the symbol graph and the sources to mirror.
    async fn load(&self) -> Result<(SymbolGraph, SourceSet, GenerationReport), GenerateError> {
        let mut report = GenerationReport::default();

        let (graph, sources) = match self.options.facts {
            Some(ref path) => self.load_facts(path)?,
            None => {
                let (facts, sources) = self.scan(&mut report).await?;
                let phase = PhaseSpan::start("generator.resolve");
                let graph = build_graph(&facts, &self.options.resolve);
                phase.record_items(graph.interfaces.len());
                phase.finish(true);
                (graph, sources)
            }
        };

        report.interfaces = graph.interfaces.len();
        report.instrumented_methods = graph.members.len();
        report.registrations = graph.registrations.len();
        report.diagnostics = graph.diagnostics.clone();
        Ok((graph, sources, report))
    }

    async fn scan(&self, report: &mut GenerationReport) -> Result<(Vec<FileFacts>, SourceSet), GenerateError> {
        let mut project = self.options.project.clone();
        project.root = self.options.root.clone();
        if let Ok(relative) = self.options.out_path().strip_prefix(&self.options.root) {
            let pattern = format!("{}/**", relative.to_string_lossy().replace('\\', "/"));
            if !project.exclude.contains(&pattern) {
                project.exclude.push(pattern);
            }
        }
        project.force = project.force || !self.options.use_cache;

        let cache = if self.options.use_cache && !self.options.dry_run {
            match FactCache::open(&self.options.out_path()) {
                Ok(cache) => Some(Arc::new(Mutex::new(cache))),
                Err(e) => {
                    tracing::warn!("Scan cache unavailable, scanning everything: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let phase = PhaseSpan::start("generator.scan");
        let outcome = ProjectScanner::new(project)?.scan(cache).await?;
        phase.record_items(outcome.files.len());
        phase.finish(true);

        report.files_scanned = outcome.files_scanned();
        report.files_cached = outcome.files_cached();
        report.scan_errors = outcome.errors.clone();

        // a binary next to a library is a separate crate that uses the
        // library through its public API; mirror it unchanged
        let has_lib = outcome.files.iter().any(|f| f.facts.path == "src/lib.rs");
        let mut facts = Vec::new();
        let mut contents = BTreeMap::new();
        let mut markers = BTreeMap::new();
        let mut crate_root = None;
        for file in outcome.files {
            let path = file.facts.path.clone();
            let is_binary = has_lib && path == "src/main.rs";
            if file.facts.is_crate_root && !is_binary {
                crate_root = Some((path.clone(), file.facts.item_insert));
            }
            if !file.facts.marker_ranges.is_empty() {
                markers.insert(path.clone(), file.facts.marker_ranges.clone());
            }
            if !is_binary {
                facts.push(file.facts);
            }
            contents.insert(path, file.content);
        }

        Ok((
            facts,
            SourceSet {
                contents,
                crate_root,
                markers,
            },
        ))
    }

    /// Read a serialized graph. Only the files it edits and the crate root
    /// are mirrored.
    fn load_facts(&self, path: &Path) -> Result<(SymbolGraph, SourceSet), GenerateError> {
        let content = std::fs::read_to_string(path)?;
        let graph: SymbolGraph = serde_json::from_str(&content).map_err(|e| GenerateError::Serialize {
            what: format!("symbol graph {}", path.display()),
            message: e.to_string(),
        })?;
        tracing::info!(
            interfaces = graph.interfaces.len(),
            registrations = graph.registrations.len(),
            call_sites = graph.call_sites.len(),
            "Loaded symbol graph from {}",
            path.display()
        );

        let mut files: Vec<&str> = Vec::new();
        files.extend(graph.registrations.iter().map(|r| r.site.location.file.as_str()));
        files.extend(graph.call_sites.iter().map(|c| c.location.file.as_str()));

        let mut contents = BTreeMap::new();
        for file in files {
            if !contents.contains_key(file) {
                let source = std::fs::read_to_string(self.options.root.join(file))?;
                contents.insert(file.to_string(), source);
            }
        }

        let mut scanner = SourceScanner::new(self.options.project.scan.clone())?;
        let mut crate_root = None;
        for candidate in ["src/lib.rs", "src/main.rs"] {
            let absolute = self.options.root.join(candidate);
            if !absolute.exists() {
                continue;
            }
            let source = std::fs::read_to_string(&absolute)?;
            let facts = scanner.scan_file(candidate, &absolute.to_string_lossy(), &source)?;
            crate_root = Some((candidate.to_string(), facts.item_insert));
            contents.insert(candidate.to_string(), source);
            break;
        }

        let mut markers = BTreeMap::new();
        for (file, source) in &contents {
            let absolute = self.options.root.join(file);
            let facts = scanner.scan_file(file, &absolute.to_string_lossy(), source)?;
            if !facts.marker_ranges.is_empty() {
                markers.insert(file.clone(), facts.marker_ranges);
            }
        }

        Ok((
            graph,
            SourceSet {
                contents,
                crate_root,
                markers,
            },
        ))
    }

    /// Every output file, keyed by path relative to the output directory.
    fn render_outputs(
        &self,
        synthesis: &Synthesis,
        sources: &SourceSet,
    ) -> Result<BTreeMap<String, String>, GenerateError> {
        let module = self.options.synth.module_name();
        let mut edits = FileEdits::new();
        match sources.crate_root {
            Some((ref root, offset)) => {
                edits.push(root, Edit::insert(offset, format!("\nmod {};\n", module)));
            }
            None => tracing::warn!("No crate root found; declare `mod {};` yourself", module),
        }
        edits.extend(synthesis.edits.clone());
        for (file, ranges) in &sources.markers {
            for range in ranges {
                edits.push(file, Edit::replace(*range, ""));
            }
        }

        let mut outputs = BTreeMap::new();
        for (path, content) in &sources.contents {
            let rewritten = apply_edits(path, content, edits.get(path))?;
            outputs.insert(path.clone(), rewritten);
        }
        for file in edits.files() {
            if !sources.contents.contains_key(file) {
                tracing::warn!("Edits for {} dropped: file was not scanned", file);
            }
        }

        for (name, source) in synthesis.files() {
            outputs.insert(format!("src/{}/{}", module, name), source.to_string());
        }
        let mut table = synthesis.interceptors.table().to_json()?;
        table.push('\n');
        outputs.insert(INTERCEPTIONS_FILE.to_string(), table);

        let root = std::path::absolute(&self.options.root)?;
        match std::fs::read_to_string(root.join("Cargo.toml")) {
            Ok(manifest) => {
                outputs.insert("Cargo.toml".to_string(), mirror_manifest(&root, &manifest)?);
                if let Ok(lock) = std::fs::read_to_string(root.join("Cargo.lock")) {
                    outputs.insert("Cargo.lock".to_string(), lock);
                }
            }
            Err(e) => tracing::warn!("Manifest not mirrored, the output will not build alone: {}", e),
        }
        Ok(outputs)
    }

    async fn write_outputs(&self, outputs: &BTreeMap<String, String>) -> Result<(), GenerateError> {
        let out = self.options.out_path();
        if out == self.options.root || self.options.root.starts_with(&out) {
            return Err(GenerateError::IoError(format!(
                "refusing to write into {}: it contains the project",
                out.display()
            )));
        }

        // stale mirrors of deleted sources must not survive
        let src = out.join("src");
        if src.exists() {
            tokio::fs::remove_dir_all(&src).await?;
        }

        for (relative, content) in outputs {
            let path = out.join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await?;
        }
        tracing::debug!(files = outputs.len(), "Wrote outputs to {}", out.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"shop\"\nversion = \"0.3.0\"\n",
        )
        .unwrap();
        for (path, content) in files {
            let full = temp.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        temp
    }

    #[test]
    fn test_from_config_reads_manifest() {
        let temp = project(&[]);
        let options = GenerateOptions::from_config(temp.path(), &ResolvedConfig::default()).unwrap();
        assert_eq!(options.synth.tracer.name, "shop");
        assert_eq!(options.synth.tracer.version, "0.3.0");
        assert_eq!(options.out_path(), temp.path().join("target/traceweave"));
    }

    #[test]
    fn test_from_config_tracer_override() {
        let temp = project(&[]);
        let config = ResolvedConfig {
            tracer_name: Some("orders".to_string()),
            ..Default::default()
        };
        let options = GenerateOptions::from_config(temp.path(), &config).unwrap();
        assert_eq!(options.synth.tracer.name, "orders");
        assert_eq!(options.synth.tracer.version, "0.3.0");
    }

    #[test]
    fn test_new_reads_manifest_identity() {
        let temp = project(&[]);
        let options = GenerateOptions::new(temp.path());
        assert_eq!(options.synth.tracer.name, "shop");
        assert_eq!(options.synth.tracer.version, "0.3.0");

        let bare = TempDir::new().unwrap();
        assert_eq!(GenerateOptions::new(bare.path()).synth.tracer, TracerIdentity::default());
    }

    #[test]
    fn test_from_config_carries_mode() {
        let temp = project(&[]);
        let config = ResolvedConfig {
            mode: crate::model::InstrumentationMode::Intercept,
            ..Default::default()
        };
        let options = GenerateOptions::from_config(temp.path(), &config).unwrap();
        assert_eq!(options.synth.mode, crate::model::InstrumentationMode::Intercept);
    }

    #[test]
    fn test_mirror_manifest_points_back_at_project() {
        let root = Path::new("/work/shop");
        let manifest = "[package]\nname = \"shop\"\nversion = \"0.3.0\"\n\n\
            [dependencies]\nserde = \"1\"\ntraceweave = { path = \"../traceweave\" }\n\
            pinned = { path = \"/opt/pinned\" }\n\n\
            [target.'cfg(unix)'.dependencies]\nunixy = { path = \"vendor/unixy\" }\n\n\
            [[bench]]\nname = \"load\"\nharness = false\n";
        let mirrored: toml::Table = mirror_manifest(root, manifest).unwrap().parse().unwrap();

        let deps = mirrored["dependencies"].as_table().unwrap();
        assert_eq!(deps["serde"].as_str(), Some("1"));
        assert_eq!(
            deps["traceweave"]["path"].as_str().map(PathBuf::from),
            Some(root.join("../traceweave"))
        );
        assert_eq!(deps["pinned"]["path"].as_str(), Some("/opt/pinned"));
        let unixy = &mirrored["target"]["cfg(unix)"]["dependencies"]["unixy"]["path"];
        assert_eq!(unixy.as_str().map(PathBuf::from), Some(root.join("vendor/unixy")));
        assert!(mirrored.get("bench").is_none());
        assert!(mirrored["workspace"].as_table().unwrap().is_empty());
        assert_eq!(mirrored["package"]["name"].as_str(), Some("shop"));
    }

    #[test]
    fn test_mirror_manifest_keeps_workspace_dependencies() {
        let root = Path::new("/work/shop");
        let manifest = "[package]\nname = \"shop\"\nversion = \"0.3.0\"\n\n\
            [workspace]\nmembers = [\"macros\"]\n\n\
            [workspace.dependencies]\nshop-macros = { path = \"macros\" }\n";
        let mirrored: toml::Table = mirror_manifest(root, manifest).unwrap().parse().unwrap();

        let workspace = mirrored["workspace"].as_table().unwrap();
        assert!(workspace.get("members").is_none());
        assert_eq!(
            workspace["dependencies"]["shop-macros"]["path"].as_str().map(PathBuf::from),
            Some(root.join("macros"))
        );
    }

    #[tokio::test]
    async fn test_mirror_drops_marker_attributes() {
        let shop = "#[traced(name = \"Shop\")]\npub trait Orders {\n    fn place(&self);\n    #[traced(skip)]\n    fn count(&self) -> usize;\n}\n\n#[decorates(Orders)]\npub struct Audit;\n";
        let temp = project(&[
            ("src/lib.rs", "#[traced]\npub trait Clock { fn now(&self) -> u64; }\n\npub mod shop;\n"),
            ("src/shop.rs", shop),
        ]);
        let report = Generator::new(GenerateOptions::new(temp.path())).run().await.unwrap();
        assert_eq!(report.decorators, 2);

        let out = temp.path().join("target/traceweave");
        let mirrored = std::fs::read_to_string(out.join("src/shop.rs")).unwrap();
        assert_eq!(
            mirrored,
            "pub trait Orders {\n    fn place(&self);\n    fn count(&self) -> usize;\n}\n\npub struct Audit;\n"
        );
        let lib = std::fs::read_to_string(out.join("src/lib.rs")).unwrap();
        assert!(!lib.contains("#[traced"));
        assert!(lib.contains("mod traced;"));
        assert!(lib.contains("pub trait Clock"));
        assert!(out.join("Cargo.toml").exists());
    }

    #[tokio::test]
    async fn test_crate_root_gets_module_declaration() {
        let temp = project(&[
            ("src/lib.rs", "//! Shop.\n\npub mod shop;\n"),
            ("src/shop.rs", "#[traced]\npub trait Orders { fn place(&self); }\n"),
        ]);
        let report = Generator::new(GenerateOptions::new(temp.path())).run().await.unwrap();
        assert_eq!(report.decorators, 1);

        let lib = std::fs::read_to_string(temp.path().join("target/traceweave/src/lib.rs")).unwrap();
        let declared = lib.find("mod traced;").unwrap();
        assert!(lib.find("//! Shop.").unwrap() < declared);
        assert!(declared < lib.find("pub mod shop;").unwrap());
        assert!(temp.path().join("target/traceweave/src/traced/mod.rs").exists());
        assert!(temp.path().join("target/traceweave/interceptions.json").exists());
    }

    #[tokio::test]
    async fn test_binary_next_to_library_is_mirrored_unchanged() {
        let main = "use shop::Orders;\n\nfn main() {}\n";
        let temp = project(&[
            ("src/lib.rs", "pub mod shop;\n"),
            ("src/main.rs", main),
            ("src/shop.rs", "#[traced]\npub trait Orders { fn place(&self); }\n"),
        ]);
        Generator::new(GenerateOptions::new(temp.path())).run().await.unwrap();

        let mirrored = std::fs::read_to_string(temp.path().join("target/traceweave/src/main.rs")).unwrap();
        assert_eq!(mirrored, main);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let temp = project(&[("src/lib.rs", "#[traced]\npub trait Clock { fn now(&self) -> u64; }\n")]);
        let mut options = GenerateOptions::new(temp.path());
        options.dry_run = true;

        let report = Generator::new(options).run().await.unwrap();
        assert!(report.dry_run);
        assert!(report.files_written.contains(&"src/traced/decorators.rs".to_string()));
        assert!(!temp.path().join("target").exists());
    }

    #[test]
    fn test_report_failure_policy() {
        let mut report = GenerationReport::default();
        assert!(!report.is_failure(true));

        report.diagnostics.push(Diagnostic::warning(
            crate::model::DiagnosticKind::AmbiguousConstruction,
            "x",
            None,
        ));
        assert!(!report.is_failure(false));
        assert!(report.is_failure(true));
        assert_eq!(report.warnings(), 1);
    }
}
