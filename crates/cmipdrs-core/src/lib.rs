//! Core types for cmipdrs.
//!
//! This crate provides the data model shared by the scan and analysis
//! passes: file records, the persisted inventory and hash index, the
//! legacy JSON layout, and configuration.

mod config;
mod error;
mod index;
mod inventory;
mod json;
mod record;

pub use config::{
    ActivityRule, AppConfig, DEFAULT_ATTRIBUTE_PRIORITY, DEFAULT_EXCLUDE_DIRS,
    DEFAULT_NESTED_EXCLUDE_DIRS, DirectoryOverride, DrsSettings, Era, EraSettings, FileFix,
    OverrideAction, ScanConfig, ScanConfigBuilder,
};
pub use error::{ArchiveError, Result};
pub use index::{HashIndex, IndexedFile, KEY_TIME_BEGIN, KEY_TIME_END};
pub use inventory::{Inventory, RESERVED_KEYS, is_reserved_key};
pub use json::{LegacyFormatter, read_json, to_legacy_string, write_json};
pub use record::{
    ContentHash, DateStamp, DirectoryEntry, FileRecord, NoDateEntry, ParseDateError,
    RecoveredDate, TimeRange,
};
