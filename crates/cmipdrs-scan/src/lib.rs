//! Archive scanning engine for cmipdrs.
//!
//! Walks archive roots, fingerprints every file with SHA-256, reads netCDF
//! global attributes and time axes, and recovers a creation date from the
//! free-text metadata.
//!
//! # Example
//!
//! ```rust,no_run
//! use cmipdrs_scan::{ArchiveScanner, Checkpointer, Era, ScanConfig};
//!
//! let config = ScanConfig::for_era(Era::Cmip3);
//! let mut checkpointer = Checkpointer::new(".", config.era, config.checkpoint_every, None);
//! let scanner = ArchiveScanner::new(config);
//! let inventory = scanner.scan_with_checkpoints(&mut checkpointer).unwrap();
//!
//! println!("Files: {}", inventory.file_count());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use cmipdrs_scan::{ArchiveScanner, Era, ScanConfig};
//!
//! let scanner = ArchiveScanner::new(ScanConfig::for_era(Era::Cmip5));
//! let mut progress_rx = scanner.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//! ```

mod calendar;
mod checkpoint;
mod date;
mod error;
mod fingerprint;
mod hash_index;
mod netcdf;
mod progress;
mod scanner;

pub use calendar::{Calendar, TimeUnit, TimeUnits, decode_time};
pub use checkpoint::{Checkpointer, find_shards, load_inventories, shard_path};
pub use date::{
    AttributeSource, CMOR_REWRITE_PHRASE, Candidate, DATE_ATTRIBUTE, DEFAULT_RULES, DateExtractor,
    DateRule, Matcher, Parser,
};
pub use error::ReadError;
pub use fingerprint::{ContentFingerprinter, FileStats, Fingerprint};
pub use hash_index::{HashIndexer, MARKER_FORMAT};
pub use netcdf::{AttributeValue, DatasetMetadata, MetadataReader, NetcdfReader};
pub use progress::ScanProgress;
pub use scanner::{ArchiveScanner, FileOutcome};

// Re-export core types for convenience
pub use cmipdrs_core::{
    ArchiveError, DateStamp, Era, FileRecord, HashIndex, Inventory, RecoveredDate, ScanConfig,
};
