//! Scan progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of files processed so far.
    pub files_scanned: u64,
    /// Number of directories with files processed so far.
    pub dirs_scanned: u64,
    /// Total bytes hashed so far.
    pub bytes_scanned: u64,
    /// Directory just completed.
    pub current_path: PathBuf,
    /// Files sent to the read-error bucket.
    pub read_errors: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_scanned: 0,
            dirs_scanned: 0,
            bytes_scanned: 0,
            current_path: PathBuf::new(),
            read_errors: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate hashing throughput in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.bytes_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters behind [`ScanProgress`] snapshots.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    files_scanned: u64,
    dirs_scanned: u64,
    bytes_scanned: u64,
    read_errors: u64,
    current_path: PathBuf,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_scanned: 0,
            dirs_scanned: 0,
            bytes_scanned: 0,
            read_errors: 0,
            current_path: PathBuf::new(),
        }
    }

    pub fn record_file(&mut self, size: u64) {
        self.files_scanned += 1;
        self.bytes_scanned += size;
    }

    pub fn record_dir(&mut self, path: PathBuf) {
        self.dirs_scanned += 1;
        self.current_path = path;
    }

    pub fn record_error(&mut self) {
        self.read_errors += 1;
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            files_scanned: self.files_scanned,
            dirs_scanned: self.dirs_scanned,
            bytes_scanned: self.bytes_scanned,
            current_path: self.current_path.clone(),
            read_errors: self.read_errors,
            elapsed: self.start_time.elapsed(),
        }
    }
}
