//! Streaming content hashing and basic file statistics.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local};
use sha2::{Digest, Sha256};

use cmipdrs_core::{ArchiveError, ContentHash, RecoveredDate, Result};

/// Chunk size for reading files (8MB).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Size and modification date of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub size_bytes: u64,
    pub modified: Option<RecoveredDate>,
}

impl FileStats {
    /// Stats reported for a path that is not a regular file.
    pub const MISSING: FileStats = FileStats {
        size_bytes: 0,
        modified: None,
    };
}

/// Content hash plus stats for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub content_hash: ContentHash,
    pub stats: FileStats,
}

/// Computes SHA-256 digests over whole files.
#[derive(Debug, Clone)]
pub struct ContentFingerprinter {
    chunk_size: usize,
}

impl ContentFingerprinter {
    pub fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Use a smaller read buffer. Mostly useful in tests.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Size and modification date of a path.
    ///
    /// A path that does not resolve to a regular file yields zero size and no
    /// date instead of an error.
    pub fn stats(&self, path: &Path) -> FileStats {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => FileStats {
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(modification_date),
            },
            _ => {
                tracing::warn!(path = %path.display(), "not a valid file");
                FileStats::MISSING
            }
        }
    }

    /// Hash the full byte stream of a file.
    pub fn hash(&self, path: &Path) -> Result<ContentHash> {
        let mut file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
        let mut hasher = Sha256::new();

        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| ArchiveError::io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentHash::new(hasher.finalize().into()))
    }

    /// Hash and stat a regular file.
    ///
    /// Fails with [`ArchiveError::NotAFile`] when the path is not a regular
    /// file; callers record that outcome and keep going.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "not a valid file");
            return Err(ArchiveError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let stats = self.stats(path);
        let content_hash = self.hash(path)?;
        Ok(Fingerprint {
            content_hash,
            stats,
        })
    }
}

impl Default for ContentFingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

fn modification_date(time: SystemTime) -> RecoveredDate {
    let local: DateTime<Local> = time.into();
    RecoveredDate::new(local.year(), local.month(), local.day())
}
