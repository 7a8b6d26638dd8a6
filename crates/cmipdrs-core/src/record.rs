//! Per-file and per-directory records produced by a scan pass.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

/// SHA-256 content hash used as the identity key for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| de::Error::custom(format!("invalid sha256 digest: {s}")))
    }
}

/// A calendar date recovered from file metadata or a time axis.
///
/// Dates are not tied to a particular calendar: a `360_day` time axis can
/// legitimately produce February 30th, so no day-of-month check happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecoveredDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl RecoveredDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Whether the date passes the plausibility checks applied to metadata
    /// dates: year in `[start_year, end_year]`, month in `[1, 12]`, day in `[1, 31]`.
    pub fn is_plausible(&self, start_year: i32, end_year: i32) -> bool {
        (start_year..=end_year).contains(&self.year)
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
    }

    /// `YYYYMMDD`, as used by DRS version directories.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for RecoveredDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Error returned when a `Y-M-D` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDateError(pub String);

impl fmt::Display for ParseDateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid date: {}", self.0)
    }
}

impl std::error::Error for ParseDateError {}

impl FromStr for RecoveredDate {
    type Err = ParseDateError;

    /// Accepts both padded (`2005-06-28`) and unpadded (`2005-6-28`) forms,
    /// since older inventories were written without zero padding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDateError(s.to_string());
        let mut parts = s.trim().splitn(3, '-');
        let year = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let month = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let day = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        Ok(Self { year, month, day })
    }
}

impl Serialize for RecoveredDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecoveredDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A metadata date together with the attribute it was extracted from.
///
/// Persisted as a two element array: `["2005-06-28", "history"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateStamp {
    pub date: RecoveredDate,
    pub attribute: String,
}

impl DateStamp {
    pub fn new(date: RecoveredDate, attribute: impl Into<String>) -> Self {
        Self {
            date,
            attribute: attribute.into(),
        }
    }
}

impl Serialize for DateStamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.date)?;
        tup.serialize_element(&self.attribute)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for DateStamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (date, attribute) = <(RecoveredDate, String)>::deserialize(deserializer)?;
        Ok(Self { date, attribute })
    }
}

/// First and last dates of a file's internal time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: RecoveredDate,
    pub end: RecoveredDate,
}

/// One successfully scanned data file.
///
/// Field order matches the sorted key order of the persisted inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Processing-tool (CMOR) version, if present in metadata.
    #[serde(
        rename = "cmorVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_version: Option<String>,

    /// Metadata date, absent when no heuristic matched.
    pub date: Option<DateStamp>,

    /// Absolute source location.
    #[serde(rename = "filePath")]
    pub path: String,

    #[serde(rename = "fileSizeBytes", deserialize_with = "lenient_size")]
    pub size_bytes: u64,

    #[serde(rename = "sha256")]
    pub content_hash: ContentHash,

    #[serde(rename = "time0", default)]
    pub time_start: Option<RecoveredDate>,

    #[serde(rename = "timeN", default)]
    pub time_end: Option<RecoveredDate>,
}

impl FileRecord {
    /// The internal time axis range, when both ends are known.
    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.time_start, self.time_end) {
            (Some(start), Some(end)) => Some(TimeRange { start, end }),
            _ => None,
        }
    }

    pub fn has_date(&self) -> bool {
        self.date.is_some()
    }
}

/// Older inventories wrote `0.0` for files that vanished mid-scan.
pub(crate) fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = serde_json::Number::deserialize(deserializer)?;
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 => Ok(f as u64),
        _ => Err(de::Error::custom(format!("invalid file size: {value}"))),
    }
}

/// Files found in one source directory, keyed by file name.
///
/// The legacy layout uses the directory to imply model, experiment and run,
/// so it is the unit of grouping. A visited directory with no data files is
/// kept as an empty entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryEntry {
    pub files: BTreeMap<String, FileRecord>,
}

impl DirectoryEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, record: FileRecord) {
        self.files.insert(file_name.into(), record);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// First file in name order.
    pub fn first(&self) -> Option<(&str, &FileRecord)> {
        self.files.iter().next().map(|(k, v)| (k.as_str(), v))
    }
}

/// A file that was read but yielded no metadata date.
///
/// Persisted as `[path, sha256, sizeBytes]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoDateEntry {
    pub path: String,
    pub content_hash: ContentHash,
    pub size_bytes: u64,
}

impl Serialize for NoDateEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(3)?;
        tup.serialize_element(&self.path)?;
        tup.serialize_element(&self.content_hash)?;
        tup.serialize_element(&self.size_bytes)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for NoDateEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (path, content_hash, size) =
            <(String, ContentHash, serde_json::Number)>::deserialize(deserializer)?;
        let size_bytes = size
            .as_u64()
            .or_else(|| size.as_f64().map(|f| f as u64))
            .unwrap_or(0);
        Ok(Self {
            path,
            content_hash,
            size_bytes,
        })
    }
}
