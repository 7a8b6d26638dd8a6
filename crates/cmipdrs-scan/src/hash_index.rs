//! Hash-only pass: every file under the roots keyed by content digest.

use std::path::Path;

use chrono::Local;

use cmipdrs_core::{HashIndex, IndexedFile, Result, ScanConfig, write_json};

use crate::fingerprint::ContentFingerprinter;
use crate::scanner::collect_directories;

/// Format of the `!_timeBegin` / `!_timeEnd` markers.
pub const MARKER_FORMAT: &str = "%y%m%d_%H%M%S";

fn now_marker() -> String {
    Local::now().format(MARKER_FORMAT).to_string()
}

/// Builds a [`HashIndex`] without opening any file as a dataset.
///
/// Uses the same roots, pruning and `skip_files` as the full scan, but
/// every regular file is indexed regardless of extension.
#[derive(Debug, Clone)]
pub struct HashIndexer {
    config: ScanConfig,
    fingerprinter: ContentFingerprinter,
}

impl HashIndexer {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            fingerprinter: ContentFingerprinter::new(),
        }
    }

    pub fn with_fingerprinter(mut self, fingerprinter: ContentFingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Index every root in memory.
    pub fn index(&self) -> Result<HashIndex> {
        self.run(|_| Ok(()))
    }

    /// Index every root, rewriting `output` every `checkpoint_every`
    /// directories and once more when done.
    pub fn index_to(&self, output: &Path) -> Result<HashIndex> {
        let every = self.config.checkpoint_every.max(1);
        let mut dirs = 0usize;
        let index = self.run(|index| {
            dirs += 1;
            if dirs % every == 0 {
                write_json(output, index)?;
                tracing::info!(path = %output.display(), files = index.file_count(), "hash index written");
            }
            Ok(())
        })?;
        write_json(output, &index)?;
        tracing::info!(path = %output.display(), files = index.file_count(), "hash index complete");
        Ok(index)
    }

    fn run(&self, mut on_directory: impl FnMut(&HashIndex) -> Result<()>) -> Result<HashIndex> {
        let mut index = HashIndex::new(now_marker());

        for root in &self.config.roots {
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "root is not a directory, skipping");
                continue;
            }
            tracing::info!(root = %root.display(), "indexing root");

            for (dir, names) in collect_directories(&self.config, root) {
                for name in &names {
                    let path = dir.join(name);
                    match self.fingerprinter.fingerprint(&path) {
                        Ok(fp) => index.insert(
                            fp.content_hash,
                            path.to_string_lossy(),
                            IndexedFile {
                                modified: fp.stats.modified,
                                size_bytes: fp.stats.size_bytes,
                            },
                        ),
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "cannot hash file");
                        }
                    }
                }
                tracing::debug!(directory = %dir.display(), files = names.len(), "directory indexed");
                on_directory(&index)?;
            }
        }

        index.finish(now_marker());
        Ok(index)
    }
}
