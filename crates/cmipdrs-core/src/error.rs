//! Error types shared by the scan and analysis passes.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while scanning or persisting an inventory.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Path does not resolve to a regular file.
    #[error("Not a regular file: {path}")]
    NotAFile { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Inventory or index JSON could not be read or written.
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file could not be parsed.
    #[error("Invalid configuration file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Era name not in the era table.
    #[error("Unknown era: {name}")]
    UnknownEra { name: String },
}

impl ArchiveError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
