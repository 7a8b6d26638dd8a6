//! CMIP6-style DRS paths and file names for legacy archive directories.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cmipdrs_core::{ContentHash, DirectoryEntry, DrsSettings, FileRecord, Inventory, RecoveredDate};

use crate::classify::{ClassifyError, PathClassifier, match_table};
use crate::duplicates::DeduplicationReport;

/// Components of a DRS directory.
///
/// `<mip_era>/<activity>/<institution>/<source>/<experiment>/<member>/<table>/<variable>/<grid>/<version>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrsIdentifier {
    pub mip_era: String,
    pub activity: String,
    pub institution: String,
    pub source: String,
    pub experiment: String,
    pub member: String,
    pub table: String,
    pub variable: String,
    pub grid: String,
    pub version: String,
    /// Legacy frequency, drives the time-range format of file names.
    pub frequency: String,
}

impl DrsIdentifier {
    fn components(&self) -> [&str; 10] {
        [
            &self.mip_era,
            &self.activity,
            &self.institution,
            &self.source,
            &self.experiment,
            &self.member,
            &self.table,
            &self.variable,
            &self.grid,
            &self.version,
        ]
    }

    /// Relative destination directory.
    pub fn directory(&self) -> PathBuf {
        self.components().iter().collect()
    }

    /// `<variable>_<table>_<source>_<experiment>_<member>_<grid>[_<start>-<end>].nc`
    pub fn file_name(&self, record: &FileRecord) -> String {
        let mut name = [
            &self.variable,
            &self.table,
            &self.source,
            &self.experiment,
            &self.member,
            &self.grid,
        ]
        .map(String::as_str)
        .join("_");
        if let Some(range) = record.time_range() {
            if let Some(format) = TimeFormat::for_frequency(&self.frequency) {
                name.push('_');
                name.push_str(&format.render(range.start));
                name.push('-');
                name.push_str(&format.render(range.end));
            }
        }
        name.push_str(".nc");
        name
    }
}

impl fmt::Display for DrsIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components().join("/"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeFormat {
    Year,
    Month,
    Day,
}

impl TimeFormat {
    fn for_frequency(frequency: &str) -> Option<Self> {
        match frequency {
            "yr" => Some(Self::Year),
            "mo" => Some(Self::Month),
            "da" | "3h" => Some(Self::Day),
            _ => None,
        }
    }

    fn render(self, date: RecoveredDate) -> String {
        match self {
            Self::Year => format!("{:04}", date.year),
            Self::Month => format!("{:04}{:02}", date.year, date.month),
            Self::Day => date.compact(),
        }
    }
}

/// Derives DRS identifiers from directory paths and scan records.
#[derive(Debug, Clone, Default)]
pub struct DrsResolver {
    settings: DrsSettings,
    classifier: PathClassifier,
}

impl DrsResolver {
    pub fn new(settings: DrsSettings) -> Self {
        Self {
            classifier: PathClassifier::new(settings.activity_rule),
            settings,
        }
    }

    pub fn settings(&self) -> &DrsSettings {
        &self.settings
    }

    /// Whether a directory is excluded from DRS derivation.
    pub fn skips(&self, directory: &str) -> bool {
        self.settings.skip_directories.iter().any(|d| d == directory)
    }

    /// Identifier for one source directory.
    ///
    /// The version is the metadata date of the first dated file; the table id
    /// comes from the file names.
    pub fn resolve(&self, directory: &str, entry: &DirectoryEntry) -> Result<DrsIdentifier, ClassifyError> {
        let class = self.classifier.classify(directory)?;
        let names: Vec<&str> = entry.file_names().collect();
        let table = match_table(&names)?;
        let date = entry
            .files
            .values()
            .find_map(|r| r.date.as_ref())
            .ok_or_else(|| ClassifyError::MissingVersionDate {
                directory: directory.to_string(),
            })?;

        Ok(DrsIdentifier {
            mip_era: self.settings.mip_era.clone(),
            activity: class.activity,
            institution: class.institution,
            source: class.source,
            experiment: class.experiment,
            member: class.member,
            table,
            variable: class.variable,
            grid: self.settings.grid_label.clone(),
            version: format!("v{}", date.date.compact()),
            frequency: class.frequency,
        })
    }
}

/// One file copy to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMove {
    pub source: String,
    pub destination: PathBuf,
    pub content_hash: ContentHash,
}

/// A directory or file that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFailure {
    pub directory: String,
    pub file_name: Option<String>,
    pub reason: String,
}

/// File-to-destination mapping for the canonical copies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub moves: Vec<PlannedMove>,
    pub failures: Vec<MigrationFailure>,
    pub skipped_directories: Vec<String>,
}

/// Map every canonical file of `report` to its DRS destination.
///
/// Failures are collected per directory (or per file, for name collisions)
/// and never stop the pass.
pub fn plan_migration(
    inventory: &Inventory,
    report: &DeduplicationReport,
    resolver: &DrsResolver,
) -> MigrationPlan {
    let canonical: BTreeSet<(&str, &str)> = report
        .canonical
        .values()
        .map(|loc| (loc.directory.as_str(), loc.file_name.as_str()))
        .collect();

    let mut plan = MigrationPlan::default();
    let mut taken: BTreeSet<PathBuf> = BTreeSet::new();

    for (directory, entry) in inventory.directories() {
        let kept: Vec<(&String, &FileRecord)> = entry
            .files
            .iter()
            .filter(|(name, _)| canonical.contains(&(directory.as_str(), name.as_str())))
            .collect();
        if kept.is_empty() {
            continue;
        }
        if resolver.skips(directory) {
            tracing::debug!(directory = %directory, "skipping listed directory");
            plan.skipped_directories.push(directory.clone());
            continue;
        }

        let id = match resolver.resolve(directory, entry) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(directory = %directory, error = %e, "cannot derive DRS path");
                plan.failures.push(MigrationFailure {
                    directory: directory.clone(),
                    file_name: None,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let target_dir = id.directory();
        for (name, record) in kept {
            let destination = target_dir.join(id.file_name(record));
            if !taken.insert(destination.clone()) {
                tracing::warn!(
                    source = %record.path,
                    destination = %destination.display(),
                    "destination already planned"
                );
                plan.failures.push(MigrationFailure {
                    directory: directory.clone(),
                    file_name: Some(name.clone()),
                    reason: format!("destination collision: {}", destination.display()),
                });
                continue;
            }
            plan.moves.push(PlannedMove {
                source: record.path.clone(),
                destination,
                content_hash: record.content_hash,
            });
        }
    }

    tracing::info!(
        moves = plan.moves.len(),
        failures = plan.failures.len(),
        skipped = plan.skipped_directories.len(),
        "migration plan built"
    );
    plan
}
