// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed incremental cache of per-file scan facts.
//!
//! Facts are keyed by relative path and reused only while the content hash,
//! the scanner version and the fingerprint of the scan conventions all match. Resolution always runs over the full
//! fact set, so a cache hit can never hide a cross-file change.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CacheError;
use crate::model::FileFacts;
use crate::scanner::SCANNER_VERSION;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// File name of the cache database inside the output directory.
pub const CACHE_FILE: &str = "facts.db";

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached files.
    pub files: u32,
    /// Last time facts were stored (RFC 3339).
    pub last_update: Option<String>,
}

/// Incremental fact cache.
pub struct FactCache {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl FactCache {
    /// Open or create the cache database in `dir`.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        let start = Instant::now();

        std::fs::create_dir_all(dir).map_err(|e| {
            CacheError::OpenFailed(format!("Failed to create cache directory: {}", e))
        })?;
        let db_path = dir.join(CACHE_FILE);

        let conn = Connection::open(&db_path)
            .map_err(|e| CacheError::OpenFailed(format!("{}: {}", db_path.display(), e)))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        let cache = Self {
            conn,
            db_path: Some(db_path),
        };
        cache.create_schema()?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("cache.open", start.elapsed());

        Ok(cache)
    }

    /// Open a throwaway in-memory cache.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CacheError::OpenFailed(e.to_string()))?;
        let cache = Self {
            conn,
            db_path: None,
        };
        cache.create_schema()?;
        Ok(cache)
    }

    /// Path of the database file, if on disk.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        // databases from before the conventions column are rebuilt
        let has_conventions: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('files') WHERE name = 'conventions'",
            [],
            |row| row.get(0),
        )?;
        if has_conventions == 0 {
            self.conn.execute_batch("DROP TABLE IF EXISTS files;")?;
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY NOT NULL,
                hash TEXT NOT NULL,
                scanner_version TEXT NOT NULL,
                conventions TEXT NOT NULL,
                facts TEXT NOT NULL,
                scanned_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Cached facts for `path`, if they were scanned from content with `hash`
    /// by the current scanner version under the conventions fingerprinted by
    /// `conventions`.
    pub fn get(&self, path: &str, hash: &str, conventions: &str) -> Result<Option<FileFacts>, CacheError> {
        let start = Instant::now();

        let row: Option<(String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT hash, scanner_version, conventions, facts FROM files WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let result = match row {
            Some((cached_hash, version, cached_conventions, facts))
                if cached_hash == hash
                    && version == SCANNER_VERSION
                    && cached_conventions == conventions =>
            {
                let facts: FileFacts = serde_json::from_str(&facts)
                    .map_err(|e| CacheError::Corrupted(format!("{}: {}", path, e)))?;
                Some(facts)
            }
            _ => None,
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("cache.get", start.elapsed());

        Ok(result)
    }

    /// Store the facts of one file, scanned under `conventions`.
    pub fn put(&self, facts: &FileFacts, conventions: &str) -> Result<(), CacheError> {
        let start = Instant::now();

        let json = serde_json::to_string(facts)
            .map_err(|e| CacheError::Corrupted(format!("{}: {}", facts.path, e)))?;
        self.conn.execute(
            "INSERT INTO files (path, hash, scanner_version, conventions, facts, scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path) DO UPDATE SET
                hash = excluded.hash,
                scanner_version = excluded.scanner_version,
                conventions = excluded.conventions,
                facts = excluded.facts,
                scanned_at = excluded.scanned_at",
            params![
                facts.path,
                facts.hash,
                SCANNER_VERSION,
                conventions,
                json,
                Utc::now().to_rfc3339()
            ],
        )?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("cache.put", start.elapsed());

        Ok(())
    }

    /// Drop entries for files no longer part of the scan.
    pub fn retain(&self, paths: &[String]) -> Result<usize, CacheError> {
        let mut stmt = self.conn.prepare("SELECT path FROM files")?;
        let cached = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut removed = 0;
        for path in cached {
            if !paths.contains(&path) {
                removed += self
                    .conn
                    .execute("DELETE FROM files WHERE path = ?1", params![path])?;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Pruned stale cache entries");
        }
        Ok(removed)
    }

    /// Remove every cached entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.conn.execute("DELETE FROM files", [])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let files: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let last_update: Option<String> = self
            .conn
            .query_row("SELECT MAX(scanned_at) FROM files", [], |row| row.get(0))?;
        Ok(CacheStats { files, last_update })
    }
}
