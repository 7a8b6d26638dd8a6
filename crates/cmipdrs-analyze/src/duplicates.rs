//! Duplicate resolution over a scanned inventory.
//!
//! Files are grouped by the SHA-256 recorded during the scan; nothing is
//! re-read from disk. Each digest gets exactly one canonical file:
//!
//! 1. A digest seen once is its own canonical file.
//! 2. A digest seen several times picks the file whose directory path is
//!    shortest, ties going to the first directory in sorted order.
//!
//! Rule 2 is a heuristic tuned to the legacy archive, where staging and
//! scratch copies (`data7/`, `*_deleteme_*`) sit in longer paths than the
//! published tree. It can pick the wrong copy, so every group keeps its
//! full member list for review.

use std::collections::BTreeMap;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use cmipdrs_core::{ContentHash, Inventory};

/// Configuration for duplicate resolution.
#[derive(Debug, Clone, Default, Builder)]
#[builder(setter(into))]
pub struct DuplicateConfig {
    /// Directories whose path contains any of these substrings are ignored.
    #[builder(default)]
    pub exclude_patterns: Vec<String>,

    /// Minimum file size to consider.
    #[builder(default = "0")]
    pub min_size: u64,
}

impl DuplicateConfig {
    /// Create a new config builder.
    pub fn builder() -> DuplicateConfigBuilder {
        DuplicateConfigBuilder::default()
    }

    fn excludes(&self, directory: &str) -> bool {
        self.exclude_patterns.iter().any(|p| directory.contains(p.as_str()))
    }
}

/// A file in the inventory, addressed by its directory key and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileLocation {
    pub directory: String,
    pub file_name: String,
}

impl FileLocation {
    pub fn new(directory: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_name: file_name.into(),
        }
    }
}

/// Files sharing one content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Content hash shared by all files in this group.
    pub hash: ContentHash,

    /// Size of each file in bytes.
    pub size: u64,

    /// The copy kept.
    pub canonical: FileLocation,

    /// Every copy, canonical included, in directory order.
    pub members: Vec<FileLocation>,
}

impl DuplicateGroup {
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Copies other than the canonical one.
    pub fn redundant(&self) -> impl Iterator<Item = &FileLocation> {
        self.members.iter().filter(move |m| **m != self.canonical)
    }

    /// Space held by the redundant copies.
    pub fn wasted_bytes(&self) -> u64 {
        self.size * self.redundant().count() as u64
    }
}

/// Outcome of duplicate resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeduplicationReport {
    /// One canonical file per digest, in digest order.
    pub canonical: BTreeMap<ContentHash, FileLocation>,

    /// Digests seen more than once, in digest order.
    pub groups: Vec<DuplicateGroup>,

    /// Visited directories that hold no files.
    pub empty_directories: Vec<String>,

    /// Number of files considered.
    pub files_analyzed: u64,

    /// Total space held by redundant copies.
    pub total_wasted_space: u64,
}

impl DeduplicationReport {
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn unique_count(&self) -> usize {
        self.canonical.len()
    }

    /// Whether a location is the kept copy of its content.
    pub fn is_canonical(&self, location: &FileLocation) -> bool {
        self.canonical.values().any(|c| c == location)
    }

    pub fn group_for(&self, hash: &ContentHash) -> Option<&DuplicateGroup> {
        self.groups.iter().find(|g| g.hash == *hash)
    }
}

/// Groups inventory records by content and picks a canonical copy.
#[derive(Debug, Clone, Default)]
pub struct DeduplicationResolver {
    config: DuplicateConfig,
}

impl DeduplicationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DuplicateConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, inventory: &Inventory) -> DeduplicationReport {
        let mut report = DeduplicationReport::default();
        let mut by_hash: BTreeMap<ContentHash, Vec<(FileLocation, u64)>> = BTreeMap::new();

        for (directory, entry) in inventory.directories() {
            if entry.is_empty() {
                report.empty_directories.push(directory.clone());
                continue;
            }
            if self.config.excludes(directory) {
                tracing::debug!(directory = %directory, "excluded from deduplication");
                continue;
            }
            for (name, record) in &entry.files {
                if record.size_bytes < self.config.min_size {
                    continue;
                }
                report.files_analyzed += 1;
                by_hash
                    .entry(record.content_hash)
                    .or_default()
                    .push((FileLocation::new(directory.as_str(), name.as_str()), record.size_bytes));
            }
        }

        for (hash, copies) in by_hash {
            let Some(canonical) = pick_canonical(&copies) else {
                continue;
            };
            report.canonical.insert(hash, canonical.clone());

            if copies.len() > 1 {
                let group = DuplicateGroup {
                    hash,
                    size: copies[0].1,
                    canonical,
                    members: copies.into_iter().map(|(location, _)| location).collect(),
                };
                tracing::debug!(
                    sha256 = %hash,
                    copies = group.count(),
                    kept = %group.canonical.directory,
                    "duplicate content"
                );
                report.total_wasted_space += group.wasted_bytes();
                report.groups.push(group);
            }
        }

        tracing::info!(
            files = report.files_analyzed,
            unique = report.unique_count(),
            groups = report.groups.len(),
            "deduplication complete"
        );
        report
    }
}

/// Shortest directory path wins; `min_by_key` keeps the first of equals.
fn pick_canonical(copies: &[(FileLocation, u64)]) -> Option<FileLocation> {
    copies
        .iter()
        .min_by_key(|(location, _)| location.directory.len())
        .map(|(location, _)| location.clone())
}
