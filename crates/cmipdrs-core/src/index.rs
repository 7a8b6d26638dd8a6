//! Hash-only index: every path seen for each content digest.

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::record::{ContentHash, RecoveredDate, lenient_size};

pub const KEY_TIME_BEGIN: &str = "!_timeBegin";
pub const KEY_TIME_END: &str = "!_timeEnd";

/// Size and modification date of one indexed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    #[serde(rename = "fileModTime", deserialize_with = "lenient_mod_time")]
    pub modified: Option<RecoveredDate>,

    #[serde(rename = "fileSizeBytes", deserialize_with = "lenient_size")]
    pub size_bytes: u64,
}

/// Files that vanished during indexing were written with `0.0`.
fn lenient_mod_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RecoveredDate>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(|s| s.parse().ok()))
}

/// Content digest to `{path: stats}` map, bracketed by wall-clock markers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HashIndex {
    #[serde(rename = "!_timeBegin", default)]
    pub time_begin: Option<String>,

    #[serde(rename = "!_timeEnd", default)]
    pub time_end: Option<String>,

    #[serde(flatten)]
    pub entries: BTreeMap<ContentHash, BTreeMap<String, IndexedFile>>,
}

impl HashIndex {
    pub fn new(time_begin: impl Into<String>) -> Self {
        Self {
            time_begin: Some(time_begin.into()),
            ..Self::default()
        }
    }

    /// Record a path under its digest. Paths sharing a digest accumulate.
    pub fn insert(&mut self, hash: ContentHash, path: impl Into<String>, file: IndexedFile) {
        self.entries.entry(hash).or_default().insert(path.into(), file);
    }

    pub fn file_count(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Digests seen at more than one path.
    pub fn duplicates(&self) -> impl Iterator<Item = (&ContentHash, &BTreeMap<String, IndexedFile>)> {
        self.entries.iter().filter(|(_, paths)| paths.len() > 1)
    }

    pub fn finish(&mut self, time_end: impl Into<String>) {
        self.time_end = Some(time_end.into());
    }
}

impl Serialize for HashIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let markers = usize::from(self.time_begin.is_some()) + usize::from(self.time_end.is_some());
        let mut map = serializer.serialize_map(Some(self.entries.len() + markers))?;
        // '!' sorts before any hex digit.
        if let Some(ref begin) = self.time_begin {
            map.serialize_entry(KEY_TIME_BEGIN, begin)?;
        }
        if let Some(ref end) = self.time_end {
            map.serialize_entry(KEY_TIME_END, end)?;
        }
        for (hash, paths) in &self.entries {
            map.serialize_entry(hash, paths)?;
        }
        map.end()
    }
}
