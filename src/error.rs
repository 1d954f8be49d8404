// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the traceweave generator.
//!
//! Recoverable problems found in user code (unresolved markers, ambiguous
//! registrations, colliding call sites) are not errors: they are reported as
//! [`Diagnostic`](crate::model::Diagnostic)s and generation continues. The
//! types below cover failures that stop an operation outright, using
//! `thiserror` for definitions and `anyhow` for propagation at the edges.

use thiserror::Error;

/// Errors that can occur while scanning source files.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to initialize parser: {0}")]
    ParserInit(String),

    #[error("Failed to parse file: {0}")]
    ParseFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("Failed to walk directory: {0}")]
    WalkFailed(String),
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Errors that abort a generation pass.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// Two distinct symbols derived the same generated name.
    ///
    /// Silently picking one would emit code that refers to the wrong type,
    /// so this is the only fatal generation error.
    #[error("Generated name '{name}' collides: {first} and {second}")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("Overlapping edits in {file} at bytes {start}..{end}")]
    OverlappingEdits {
        file: String,
        start: usize,
        end: usize,
    },

    #[error("Failed to serialize {what}: {message}")]
    Serialize { what: String, message: String },

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error writing output: {0}")]
    IoError(String),
}

impl GenerateError {
    /// Create a naming collision error.
    pub fn collision(
        name: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::NameCollision {
            name: name.into(),
            first: first.into(),
            second: second.into(),
        }
    }

    /// Check if this error is a naming collision.
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::NameCollision { .. })
    }
}

impl From<std::io::Error> for GenerateError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors from the incremental scan cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to open cache: {0}")]
    OpenFailed(String),

    #[error("Cache query failed: {0}")]
    QueryFailed(String),

    #[error("Cached facts are corrupted: {0}")]
    Corrupted(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::TomlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
