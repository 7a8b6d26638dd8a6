//! Archive walker: fingerprints every file and reads data-file metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::broadcast;

use cmipdrs_core::{ArchiveError, FileRecord, Inventory, OverrideAction, Result, ScanConfig};

use crate::checkpoint::Checkpointer;
use crate::date::DateExtractor;
use crate::fingerprint::{ContentFingerprinter, FileStats};
use crate::netcdf::{MetadataReader, NetcdfReader};
use crate::progress::{ProgressTracker, ScanProgress};

/// How one file ended up in the inventory.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Data file read successfully, with or without a metadata date.
    Record(FileRecord),
    /// Not a data file.
    Malformed,
    /// Known-bad data file, not opened.
    Skipped { reason: String },
    /// Data file that could not be fingerprinted or read. A path that is not
    /// a regular file carries zero size and no date.
    ReadError { message: String, stats: FileStats },
}

/// Walks archive roots and builds an [`Inventory`].
///
/// Directories are visited in sorted order and files within a directory are
/// processed in sorted order. With `threads != 1` the files of one directory
/// are processed on a rayon pool; results are still merged in file order, so
/// the inventory does not depend on the thread count.
pub struct ArchiveScanner<R: MetadataReader = NetcdfReader> {
    config: ScanConfig,
    fingerprinter: ContentFingerprinter,
    extractor: DateExtractor,
    reader: R,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl ArchiveScanner {
    /// Create a scanner reading netCDF files.
    pub fn new(config: ScanConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            extractor: DateExtractor::from_config(&config),
            fingerprinter: ContentFingerprinter::new(),
            reader: NetcdfReader::new(),
            config,
            progress_tx,
        }
    }
}

impl<R: MetadataReader> ArchiveScanner<R> {
    /// Swap the metadata reader.
    pub fn with_reader<T: MetadataReader>(self, reader: T) -> ArchiveScanner<T> {
        ArchiveScanner {
            config: self.config,
            fingerprinter: self.fingerprinter,
            extractor: self.extractor,
            reader,
            progress_tx: self.progress_tx,
        }
    }

    pub fn with_fingerprinter(mut self, fingerprinter: ContentFingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Subscribe to per-directory progress snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan every root without persisting anything.
    pub fn scan(&self) -> Result<Inventory> {
        self.run(|_| Ok(()))
    }

    /// Scan every root, handing each finished directory to `checkpointer`.
    ///
    /// With sharding enabled the returned inventory only holds the directories
    /// of the last shard; use [`crate::load_inventories`] to recombine.
    pub fn scan_with_checkpoints(&self, checkpointer: &mut Checkpointer) -> Result<Inventory> {
        let inventory = self.run(|inventory| checkpointer.directory_done(inventory))?;
        checkpointer.finish(&inventory)?;
        Ok(inventory)
    }

    fn run(&self, mut on_directory: impl FnMut(&mut Inventory) -> Result<()>) -> Result<Inventory> {
        let pool = self.build_pool()?;
        let mut inventory = Inventory::new();
        let mut tracker = ProgressTracker::new();

        for root in &self.config.roots {
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "root is not a directory, skipping");
                continue;
            }
            tracing::info!(root = %root.display(), era = %self.config.era, "scanning root");

            for (dir, names) in collect_directories(&self.config, root) {
                let dir_key = dir.to_string_lossy().into_owned();
                let outcomes = self.scan_directory(pool.as_ref(), &dir, &dir_key, &names);
                self.merge_outcomes(&mut inventory, &mut tracker, &dir_key, outcomes);

                tracker.record_dir(dir);
                tracing::info!(directory = %dir_key, files = names.len(), "directory done");
                let _ = self.progress_tx.send(tracker.snapshot());

                on_directory(&mut inventory)?;
            }
        }

        let summary = tracker.snapshot();
        tracing::info!(
            files = summary.files_scanned,
            directories = summary.dirs_scanned,
            read_errors = summary.read_errors,
            elapsed_secs = summary.elapsed.as_secs(),
            "scan complete"
        );
        Ok(inventory)
    }

    fn build_pool(&self) -> Result<Option<ThreadPool>> {
        if self.config.threads == 1 {
            return Ok(None);
        }
        ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map(Some)
            .map_err(|e| ArchiveError::InvalidConfig {
                message: format!("cannot start worker pool: {e}"),
            })
    }

    fn scan_directory(
        &self,
        pool: Option<&ThreadPool>,
        dir: &Path,
        dir_key: &str,
        names: &[String],
    ) -> Vec<(String, FileOutcome)> {
        let process = |name: &String| {
            let outcome = self.scan_file(dir, dir_key, name);
            (name.clone(), outcome)
        };
        match pool {
            Some(pool) => pool.install(|| names.par_iter().map(process).collect()),
            None => names.iter().map(process).collect(),
        }
    }

    fn merge_outcomes(
        &self,
        inventory: &mut Inventory,
        tracker: &mut ProgressTracker,
        dir_key: &str,
        outcomes: Vec<(String, FileOutcome)>,
    ) {
        let has_data = outcomes
            .iter()
            .any(|(name, _)| self.config.is_data_file(name));
        if has_data {
            inventory.visit_directory(dir_key);
        }

        for (name, outcome) in outcomes {
            let path = join_path(dir_key, &name);
            match outcome {
                FileOutcome::Record(record) => {
                    tracker.record_file(record.size_bytes);
                    inventory.record_file(dir_key, &name, record);
                }
                FileOutcome::Malformed => {
                    tracker.record_file(0);
                    inventory.record_malformed(path);
                }
                FileOutcome::Skipped { reason } => {
                    tracing::warn!(path = %path, reason = %reason, "skipping known-bad file");
                    tracker.record_file(0);
                    inventory.record_skipped(path);
                }
                FileOutcome::ReadError { message, stats } => {
                    tracing::warn!(
                        path = %path,
                        error = %message,
                        size_bytes = stats.size_bytes,
                        "cannot read file"
                    );
                    tracker.record_file(stats.size_bytes);
                    tracker.record_error();
                    inventory.record_read_error(path);
                }
            }
        }
    }

    /// Classify one file. Never fails: every problem becomes an outcome.
    pub fn scan_file(&self, dir: &Path, dir_key: &str, name: &str) -> FileOutcome {
        let path = dir.join(name);
        let is_data = self.config.is_data_file(name);

        let action = self
            .config
            .override_for(dir_key)
            .map_or(OverrideAction::None, |o| o.action_for(name));
        if let (true, OverrideAction::Skip { reason }) = (is_data, &action) {
            return FileOutcome::Skipped {
                reason: reason.to_string(),
            };
        }

        if !is_data {
            match self.fingerprinter.fingerprint(&path) {
                Ok(fp) => tracing::debug!(
                    path = %path.display(),
                    sha256 = %fp.content_hash,
                    "not a data file"
                ),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "not a data file"),
            }
            return FileOutcome::Malformed;
        }

        let fingerprint = match self.fingerprinter.fingerprint(&path) {
            Ok(fp) => fp,
            Err(e @ ArchiveError::NotAFile { .. }) => {
                return FileOutcome::ReadError {
                    message: e.to_string(),
                    stats: self.fingerprinter.stats(&path),
                };
            }
            Err(e) => {
                return FileOutcome::ReadError {
                    message: e.to_string(),
                    stats: FileStats::MISSING,
                };
            }
        };

        let fix = match action {
            OverrideAction::Apply(fix) => Some(fix),
            _ => None,
        };
        let metadata = match self.reader.read(&path, fix) {
            Ok(metadata) => metadata,
            Err(e) => {
                return FileOutcome::ReadError {
                    message: e.to_string(),
                    stats: fingerprint.stats,
                };
            }
        };

        let date = self.extractor.extract(&metadata);
        if date.is_none() {
            tracing::debug!(path = %path.display(), "no metadata date");
        }
        let time_range = metadata.time_range;

        FileOutcome::Record(FileRecord {
            tool_version: metadata.tool_version(),
            date,
            path: path.to_string_lossy().into_owned(),
            size_bytes: fingerprint.stats.size_bytes,
            content_hash: fingerprint.content_hash,
            time_start: time_range.map(|r| r.start),
            time_end: time_range.map(|r| r.end),
        })
    }
}

fn join_path(dir: &str, name: &str) -> String {
    Path::new(dir).join(name).to_string_lossy().into_owned()
}

/// Files of every directory under `root`, grouped by directory.
///
/// Pruned directories are removed before descent. Directories without files
/// are left out, as are names listed in `skip_files`. Symlinks to directories
/// are not followed.
pub(crate) fn collect_directories(
    config: &ScanConfig,
    root: &Path,
) -> BTreeMap<PathBuf, Vec<String>> {
    let pruner = config.clone();
    let walker = WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .sort(true)
        .skip_hidden(false)
        .follow_links(false)
        .process_read_dir(move |_depth, path, _state, children| {
            children.retain(|child| match child {
                Ok(entry) if entry.file_type().is_dir() => {
                    !pruner.should_prune(path, &entry.file_name().to_string_lossy())
                }
                _ => true,
            });
        });

    let mut directories: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                tracing::warn!(path = %path.display(), error = %err, "walk error");
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let path = entry.path();
        if file_type.is_symlink() && path.is_dir() {
            tracing::debug!(path = %path.display(), "not following directory symlink");
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if config.should_skip_file(&name) {
            tracing::debug!(path = %path.display(), "skipping listed file");
            continue;
        }
        if let Some(parent) = path.parent() {
            directories.entry(parent.to_path_buf()).or_default().push(name);
        }
    }

    for names in directories.values_mut() {
        names.sort();
    }
    directories
}
