// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Parallel scanning of a project's source tree.
//!
//! Files are collected with `walkdir` and filtered through include/exclude
//! glob sets, then fanned out to a pool of tokio workers that each own a
//! tree-sitter parser. Results come back over a channel and are merged in
//! path order, so the outcome never depends on worker scheduling.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::{mpsc, Mutex};
use walkdir::WalkDir;

use crate::cache::FactCache;
use crate::error::ScanError;
use crate::model::FileFacts;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::{FileOutcome, GLOBAL_METRICS};

use super::parser::{content_hash, ScanOptions, SourceScanner};

/// Settings for a project scan.
#[derive(Debug, Clone)]
pub struct ProjectScanOptions {
    /// Project root (the directory holding `Cargo.toml`).
    pub root: PathBuf,
    /// Glob patterns of files to scan, relative to the root.
    pub include: Vec<String>,
    /// Glob patterns to skip, relative to the root.
    pub exclude: Vec<String>,
    /// Number of scanning workers.
    pub parallel_jobs: usize,
    /// Marker conventions.
    pub scan: ScanOptions,
    /// Ignore cached facts.
    pub force: bool,
}

impl ProjectScanOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: vec!["src/**/*.rs".to_string()],
            exclude: vec!["target/**".to_string()],
            parallel_jobs: default_jobs(),
            scan: ScanOptions::default(),
            force: false,
        }
    }
}

/// Default worker count: available parallelism, capped at 8.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4)
}

/// One scanned source file.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub facts: FileFacts,
    /// File content the facts were extracted from.
    pub content: String,
    /// Whether the facts came from the cache.
    pub cached: bool,
}

/// Result of a project scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Scanned files, sorted by relative path.
    pub files: Vec<ScannedFile>,
    /// Files that could not be read or parsed: `(path, error)`.
    pub errors: Vec<(String, String)>,
    /// Scan duration in milliseconds.
    pub duration_ms: u64,
}

impl ScanOutcome {
    pub fn facts(&self) -> Vec<FileFacts> {
        self.files.iter().map(|f| f.facts.clone()).collect()
    }

    pub fn files_scanned(&self) -> usize {
        self.files.iter().filter(|f| !f.cached).count()
    }

    pub fn files_cached(&self) -> usize {
        self.files.iter().filter(|f| f.cached).count()
    }
}

#[derive(Debug, Clone)]
struct FileToScan {
    path: PathBuf,
    relative_path: String,
}

/// Project-wide scanner.
pub struct ProjectScanner {
    options: ProjectScanOptions,
    include_globs: GlobSet,
    exclude_globs: GlobSet,
}

impl ProjectScanner {
    pub fn new(options: ProjectScanOptions) -> Result<Self, ScanError> {
        let include_globs = build_globset(&options.include)?;
        let exclude_globs = build_globset(&options.exclude)?;
        Ok(Self {
            options,
            include_globs,
            exclude_globs,
        })
    }

    /// Collect the files to scan, sorted by relative path.
    pub fn collect_files(&self) -> Result<Vec<String>, ScanError> {
        Ok(self
            .collect()?
            .into_iter()
            .map(|f| f.relative_path)
            .collect())
    }

    fn collect(&self) -> Result<Vec<FileToScan>, ScanError> {
        let start = Instant::now();
        let root = self.options.root.as_path();
        let mut files = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.path() == root {
                    return true;
                }
                let relative = e.path().strip_prefix(root).unwrap_or(e.path());
                !self.is_excluded(relative)
            })
        {
            let entry = entry.map_err(|e| ScanError::WalkFailed(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if relative.extension().and_then(|e| e.to_str()) != Some("rs") {
                continue;
            }
            if self.include_globs.is_match(relative) {
                files.push(FileToScan {
                    path: path.to_path_buf(),
                    relative_path: relative_key(relative),
                });
            }
        }
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("scanner.project.collect_files", start.elapsed());
        tracing::debug!(files = files.len(), "Collected source files");

        Ok(files)
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        let hidden = relative.components().any(|c| match c {
            std::path::Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        });
        hidden || self.exclude_globs.is_match(relative)
    }

    /// Scan every collected file, reusing cached facts where possible.
    pub async fn scan(&self, cache: Option<Arc<Mutex<FactCache>>>) -> Result<ScanOutcome, ScanError> {
        let start = Instant::now();
        let files = self.collect()?;
        let jobs = self.options.parallel_jobs.max(1);

        let (tx, rx) = mpsc::channel::<FileToScan>(jobs * 2);
        let rx = Arc::new(Mutex::new(rx));
        let (result_tx, mut result_rx) =
            mpsc::unbounded_channel::<(String, Result<ScannedFile, ScanError>)>();

        let mut handles = Vec::new();
        for _ in 0..jobs {
            let rx = rx.clone();
            let result_tx = result_tx.clone();
            let cache = cache.clone();
            let scan_options = self.options.scan.clone();
            let force = self.options.force;

            let handle = tokio::spawn(async move {
                let mut scanner = match SourceScanner::new(scan_options) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!("Failed to create scanner: {}", e);
                        return;
                    }
                };

                loop {
                    let file = {
                        let mut rx_lock = rx.lock().await;
                        rx_lock.recv().await
                    };
                    let Some(file) = file else { break };

                    let result = Self::scan_one(&file, &mut scanner, cache.as_ref(), force).await;
                    if result_tx.send((file.relative_path, result)).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }
        drop(result_tx);

        for file in files {
            if tx.send(file).await.is_err() {
                break;
            }
        }
        drop(tx);

        let mut results = BTreeMap::new();
        while let Some((path, result)) = result_rx.recv().await {
            results.insert(path, result);
        }
        for handle in handles {
            let _ = handle.await;
        }

        let mut outcome = ScanOutcome::default();
        for (path, result) in results {
            match result {
                Ok(file) => {
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.record_file(if file.cached {
                        FileOutcome::Cached
                    } else {
                        FileOutcome::Scanned
                    });
                    outcome.files.push(file);
                }
                Err(e) => {
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.record_file(FileOutcome::Failed);
                    tracing::warn!("Error scanning {}: {}", path, e);
                    outcome.errors.push((path, e.to_string()));
                }
            }
        }

        if let Some(cache) = cache {
            let paths: Vec<String> = outcome.files.iter().map(|f| f.facts.path.clone()).collect();
            if let Err(e) = cache.lock().await.retain(&paths) {
                tracing::warn!("Failed to prune scan cache: {}", e);
            }
        }

        let duration = start.elapsed();
        outcome.duration_ms = duration.as_millis() as u64;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("scanner.project.scan", duration);
        tracing::info!(
            scanned = outcome.files_scanned(),
            cached = outcome.files_cached(),
            errors = outcome.errors.len(),
            duration_ms = outcome.duration_ms,
            "Scan complete"
        );

        Ok(outcome)
    }

    async fn scan_one(
        file: &FileToScan,
        scanner: &mut SourceScanner,
        cache: Option<&Arc<Mutex<FactCache>>>,
        force: bool,
    ) -> Result<ScannedFile, ScanError> {
        let content = tokio::fs::read_to_string(&file.path).await?;
        let absolute = std::fs::canonicalize(&file.path)
            .unwrap_or_else(|_| file.path.clone())
            .to_string_lossy()
            .replace('\\', "/");

        if let (Some(cache), false) = (cache, force) {
            let hash = content_hash(&content);
            let conventions = scanner.options().fingerprint();
            let cached = cache.lock().await.get(&file.relative_path, &hash, &conventions);
            match cached {
                // the project may have moved since the facts were cached
                Ok(Some(facts)) if facts.absolute_path == absolute => {
                    return Ok(ScannedFile {
                        facts,
                        content,
                        cached: true,
                    });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Ignoring cache entry for {}: {}", file.relative_path, e),
            }
        }

        let facts = scanner.scan_file(&file.relative_path, &absolute, &content)?;
        if let Some(cache) = cache {
            if let Err(e) = cache.lock().await.put(&facts, &scanner.options().fingerprint()) {
                tracing::warn!("Failed to cache facts for {}: {}", file.relative_path, e);
            }
        }

        Ok(ScannedFile {
            facts,
            content,
            cached: false,
        })
    }
}

/// `/`-separated form of a relative path.
fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidGlob {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScanError::InvalidGlob {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn project() -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/lib.rs", "mod shop;\n");
        write(temp.path(), "src/shop.rs", "#[traced]\npub trait Orders { fn place(&self); }\n");
        write(temp.path(), "src/bin/tool.rs", "fn main() {}\n");
        write(temp.path(), "target/debug/build.rs", "fn main() {}\n");
        write(temp.path(), ".hidden/src/x.rs", "fn x() {}\n");
        write(temp.path(), "README.md", "# readme\n");
        temp
    }

    #[test]
    fn test_collect_files_applies_globs() {
        let temp = project();
        let mut options = ProjectScanOptions::new(temp.path());
        options.exclude.push("src/bin/**".to_string());
        let scanner = ProjectScanner::new(options).unwrap();

        assert_eq!(
            scanner.collect_files().unwrap(),
            vec!["src/lib.rs".to_string(), "src/shop.rs".to_string()]
        );
    }

    #[test]
    fn test_invalid_glob() {
        let mut options = ProjectScanOptions::new("/tmp");
        options.include = vec!["src/[".to_string()];
        assert!(matches!(
            ProjectScanner::new(options),
            Err(ScanError::InvalidGlob { .. })
        ));
    }

    #[tokio::test]
    async fn test_scan_merges_in_path_order() {
        let temp = project();
        let mut options = ProjectScanOptions::new(temp.path());
        options.parallel_jobs = 3;
        let scanner = ProjectScanner::new(options).unwrap();

        let outcome = scanner.scan(None).await.unwrap();
        let paths: Vec<&str> = outcome.files.iter().map(|f| f.facts.path.as_str()).collect();
        assert_eq!(paths, vec!["src/bin/tool.rs", "src/lib.rs", "src/shop.rs"]);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.files[2].facts.traits.len(), 1);
        assert!(outcome.files[2].facts.absolute_path.ends_with("src/shop.rs"));
    }

    #[tokio::test]
    async fn test_scan_reuses_cache() {
        let temp = project();
        let cache = Arc::new(Mutex::new(FactCache::open_in_memory().unwrap()));
        let scanner = ProjectScanner::new(ProjectScanOptions::new(temp.path())).unwrap();

        let first = scanner.scan(Some(cache.clone())).await.unwrap();
        assert_eq!(first.files_cached(), 0);

        write(temp.path(), "src/lib.rs", "mod shop;\nmod extra;\n");
        let second = scanner.scan(Some(cache.clone())).await.unwrap();
        assert_eq!(second.files_cached(), 2);
        assert_eq!(second.files_scanned(), 1);
        assert_eq!(first.facts()[2], second.facts()[2]);
    }

    #[tokio::test]
    async fn test_changed_marker_rescans_cached_files() {
        let temp = project();
        write(temp.path(), "src/shop.rs", "#[instrument]\npub trait Orders { fn place(&self); }\n");
        let cache = Arc::new(Mutex::new(FactCache::open_in_memory().unwrap()));

        let default = ProjectScanner::new(ProjectScanOptions::new(temp.path())).unwrap();
        let first = default.scan(Some(cache.clone())).await.unwrap();
        assert_eq!(first.files[2].facts.traits[0].marker, None);

        let mut options = ProjectScanOptions::new(temp.path());
        options.scan.marker = "instrument".to_string();
        let renamed = ProjectScanner::new(options).unwrap();
        let second = renamed.scan(Some(cache.clone())).await.unwrap();
        assert_eq!(second.files_cached(), 0);
        assert!(second.files[2].facts.traits[0].marker.is_some());
    }
}
