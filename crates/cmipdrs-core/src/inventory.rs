//! The scan inventory: directory entries plus bookkeeping buckets.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::record::{DirectoryEntry, FileRecord, NoDateEntry};

pub const KEY_TOOL_VERSION_COUNT: &str = "!_cmorCount";
pub const KEY_FILE_COUNT: &str = "!_fileCount";
pub const KEY_MALFORMED: &str = "!badFile";
pub const KEY_MALFORMED_COUNT: &str = "!badFileCount";
pub const KEY_READ_ERROR: &str = "!fileReadError";
pub const KEY_READ_ERROR_COUNT: &str = "!fileReadErrorCount";
pub const KEY_NO_DATE: &str = "!noDateFile";
pub const KEY_NO_DATE_COUNT: &str = "!noDateFileCount";

/// Bookkeeping keys of the persisted inventory, in sorted order.
pub const RESERVED_KEYS: [&str; 8] = [
    KEY_TOOL_VERSION_COUNT,
    KEY_FILE_COUNT,
    KEY_MALFORMED,
    KEY_MALFORMED_COUNT,
    KEY_READ_ERROR,
    KEY_READ_ERROR_COUNT,
    KEY_NO_DATE,
    KEY_NO_DATE_COUNT,
];

/// Whether a top-level key is bookkeeping rather than a directory path.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('!')
}

/// Accumulated result of a scan pass.
///
/// Every scanned file lands in exactly one of: a directory entry, the
/// malformed bucket, or the read-error bucket. Files without a metadata date
/// stay in their directory entry and are also listed in the no-date bucket.
/// Buckets are keyed by a 1-based running counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    directories: BTreeMap<String, DirectoryEntry>,
    malformed: BTreeMap<u64, String>,
    read_errors: BTreeMap<u64, String>,
    no_date: BTreeMap<u64, NoDateEntry>,
    file_count: u64,
    tool_version_count: u64,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a directory as visited, creating an empty entry if needed.
    pub fn visit_directory(&mut self, directory: impl Into<String>) -> &mut DirectoryEntry {
        self.directories.entry(directory.into()).or_default()
    }

    /// Add a successfully read data file.
    pub fn record_file(&mut self, directory: &str, file_name: &str, record: FileRecord) {
        self.file_count += 1;
        if record.tool_version.is_some() {
            self.tool_version_count += 1;
        }
        if record.date.is_none() {
            let index = next_index(&self.no_date);
            self.no_date.insert(
                index,
                NoDateEntry {
                    path: record.path.clone(),
                    content_hash: record.content_hash,
                    size_bytes: record.size_bytes,
                },
            );
        }
        self.visit_directory(directory).insert(file_name, record);
    }

    /// Add a file without the data-file extension.
    pub fn record_malformed(&mut self, path: impl Into<String>) {
        let index = next_index(&self.malformed);
        self.malformed.insert(index, path.into());
    }

    /// Add a data file that was deliberately not opened (known-bad override).
    pub fn record_skipped(&mut self, path: impl Into<String>) {
        self.file_count += 1;
        self.record_malformed(path);
    }

    /// Add a data file whose read failed.
    pub fn record_read_error(&mut self, path: impl Into<String>) {
        self.file_count += 1;
        let index = next_index(&self.read_errors);
        self.read_errors.insert(index, path.into());
    }

    pub fn directories(&self) -> &BTreeMap<String, DirectoryEntry> {
        &self.directories
    }

    pub fn directory(&self, path: &str) -> Option<&DirectoryEntry> {
        self.directories.get(path)
    }

    pub fn has_visited(&self, path: &str) -> bool {
        self.directories.contains_key(path)
    }

    /// All file records as `(directory, file name, record)`, in key order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &str, &FileRecord)> {
        self.directories.iter().flat_map(|(dir, entry)| {
            entry
                .files
                .iter()
                .map(move |(name, record)| (dir.as_str(), name.as_str(), record))
        })
    }

    pub fn malformed(&self) -> &BTreeMap<u64, String> {
        &self.malformed
    }

    pub fn read_errors(&self) -> &BTreeMap<u64, String> {
        &self.read_errors
    }

    pub fn no_date(&self) -> &BTreeMap<u64, NoDateEntry> {
        &self.no_date
    }

    /// Data files attempted (read, failed or skipped).
    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    /// Files carrying a recognized tool version.
    pub fn tool_version_count(&self) -> u64 {
        self.tool_version_count
    }

    /// Number of records with a metadata date.
    pub fn dated_count(&self) -> usize {
        self.records().filter(|(_, _, r)| r.has_date()).count()
    }

    /// Drop directory entries, keeping counters and buckets.
    ///
    /// Used when rotating output shards: the next shard starts with an empty
    /// directory map but cumulative bookkeeping.
    pub fn take_directories(&mut self) -> BTreeMap<String, DirectoryEntry> {
        std::mem::take(&mut self.directories)
    }

    /// Fold a later shard of the same scan pass into this inventory.
    ///
    /// Buckets are cumulative across shards, so they are unioned by index and
    /// counters take the larger value. Directory entries from `other` replace
    /// entries of the same path.
    pub fn merge(&mut self, other: Inventory) {
        self.directories.extend(other.directories);
        self.malformed.extend(other.malformed);
        self.read_errors.extend(other.read_errors);
        self.no_date.extend(other.no_date);
        self.file_count = self.file_count.max(other.file_count);
        self.tool_version_count = self.tool_version_count.max(other.tool_version_count);
    }
}

fn next_index<V>(bucket: &BTreeMap<u64, V>) -> u64 {
    bucket.keys().next_back().map_or(1, |last| last + 1)
}

#[derive(Serialize)]
#[serde(untagged)]
enum EntryRef<'a> {
    Directory(&'a DirectoryEntry),
    Count(u64),
    Paths(&'a BTreeMap<u64, String>),
    NoDate(&'a BTreeMap<u64, NoDateEntry>),
}

impl Serialize for Inventory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: BTreeMap<&str, EntryRef<'_>> = self
            .directories
            .iter()
            .map(|(k, v)| (k.as_str(), EntryRef::Directory(v)))
            .collect();

        entries.insert(KEY_TOOL_VERSION_COUNT, EntryRef::Count(self.tool_version_count));
        entries.insert(KEY_FILE_COUNT, EntryRef::Count(self.file_count));
        entries.insert(KEY_MALFORMED, EntryRef::Paths(&self.malformed));
        entries.insert(KEY_MALFORMED_COUNT, EntryRef::Count(self.malformed.len() as u64));
        entries.insert(KEY_READ_ERROR, EntryRef::Paths(&self.read_errors));
        entries.insert(KEY_READ_ERROR_COUNT, EntryRef::Count(self.read_errors.len() as u64));
        entries.insert(KEY_NO_DATE, EntryRef::NoDate(&self.no_date));
        entries.insert(KEY_NO_DATE_COUNT, EntryRef::Count(self.no_date.len() as u64));

        serializer.collect_map(entries)
    }
}

impl<'de> Deserialize<'de> for Inventory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(InventoryVisitor)
    }
}

struct InventoryVisitor;

impl<'de> Visitor<'de> for InventoryVisitor {
    type Value = Inventory;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an inventory object keyed by directory path")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Inventory, A::Error> {
        let mut inventory = Inventory::new();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                KEY_TOOL_VERSION_COUNT => inventory.tool_version_count = map.next_value()?,
                KEY_FILE_COUNT => inventory.file_count = map.next_value()?,
                KEY_MALFORMED => inventory.malformed = map.next_value()?,
                KEY_READ_ERROR => inventory.read_errors = map.next_value()?,
                KEY_NO_DATE => inventory.no_date = map.next_value()?,
                // Derived from the bucket sizes.
                KEY_MALFORMED_COUNT | KEY_READ_ERROR_COUNT | KEY_NO_DATE_COUNT => {
                    map.next_value::<IgnoredAny>()?;
                }
                other if is_reserved_key(other) => {
                    tracing::debug!(key = other, "ignoring unknown bookkeeping key");
                    map.next_value::<IgnoredAny>()?;
                }
                _ => {
                    let entry: DirectoryEntry = map.next_value()?;
                    if inventory.directories.insert(key.clone(), entry).is_some() {
                        return Err(de::Error::custom(format!("duplicate directory key {key}")));
                    }
                }
            }
        }
        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::to_legacy_string;
    use crate::record::{ContentHash, DateStamp, RecoveredDate};

    fn record(path: &str, hash: u8, dated: bool) -> FileRecord {
        FileRecord {
            tool_version: None,
            date: dated.then(|| DateStamp::new(RecoveredDate::new(2005, 6, 28), "history")),
            path: path.to_string(),
            size_bytes: 100,
            content_hash: ContentHash::new([hash; 32]),
            time_start: None,
            time_end: None,
        }
    }

    #[test]
    fn test_dateless_file_stays_in_directory() {
        let mut inv = Inventory::new();
        inv.record_file("/a", "x.nc", record("/a/x.nc", 1, false));
        inv.record_file("/a", "y.nc", record("/a/y.nc", 2, true));

        assert_eq!(inv.directory("/a").unwrap().len(), 2);
        assert_eq!(inv.no_date().len(), 1);
        assert_eq!(inv.no_date()[&1].path, "/a/x.nc");
        assert_eq!(inv.dated_count(), 1);
        assert_eq!(inv.file_count(), 2);
    }

    #[test]
    fn test_empty_directory_distinct_from_unvisited() {
        let mut inv = Inventory::new();
        inv.visit_directory("/empty");
        assert!(inv.has_visited("/empty"));
        assert!(inv.directory("/empty").unwrap().is_empty());
        assert!(!inv.has_visited("/never"));
    }

    #[test]
    fn test_bucket_counters() {
        let mut inv = Inventory::new();
        inv.record_malformed("/a/listing.txt");
        inv.record_read_error("/a/broken.nc");
        inv.record_skipped("/a/pr_CF3.nc");
        assert_eq!(inv.malformed().len(), 2);
        assert_eq!(inv.malformed()[&2], "/a/pr_CF3.nc");
        assert_eq!(inv.read_errors()[&1], "/a/broken.nc");
        assert_eq!(inv.file_count(), 2);
    }

    #[test]
    fn test_reserved_keys_written_first() {
        let mut inv = Inventory::new();
        inv.record_file("/a", "x.nc", record("/a/x.nc", 1, true));
        let text = to_legacy_string(&inv).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 9);
        for key in RESERVED_KEYS {
            assert!(keys.iter().any(|k| k == key), "missing {key}");
        }
        assert!(text.starts_with("{\n    \"!_cmorCount\":0,"));
    }

    #[test]
    fn test_json_roundtrip_and_unknown_keys() {
        let mut inv = Inventory::new();
        inv.record_file("/a", "x.nc", record("/a/x.nc", 1, false));
        inv.record_read_error("/a/broken.nc");
        inv.visit_directory("/b");

        let text = to_legacy_string(&inv).unwrap();
        let back: Inventory = serde_json::from_str(&text).unwrap();
        assert_eq!(back, inv);

        let legacy = r#"{"!_timeBegin":"230723_101010","!badFileList":{},"/c":{}}"#;
        let old: Inventory = serde_json::from_str(legacy).unwrap();
        assert!(old.has_visited("/c"));
        assert_eq!(old.file_count(), 0);
    }

    #[test]
    fn test_merge_shards() {
        let mut first = Inventory::new();
        first.record_file("/a", "x.nc", record("/a/x.nc", 1, true));
        first.record_read_error("/a/bad.nc");

        let mut second = first.clone();
        second.take_directories();
        second.record_file("/b", "y.nc", record("/b/y.nc", 2, true));

        first.merge(second);
        assert!(first.has_visited("/a"));
        assert!(first.has_visited("/b"));
        assert_eq!(first.read_errors().len(), 1);
        assert_eq!(first.file_count(), 3);
    }
}
