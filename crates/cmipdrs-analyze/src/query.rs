//! Summary statistics over a scanned inventory.

use itertools::{Itertools, MinMaxResult};
use serde::Serialize;

use cmipdrs_core::{Inventory, RecoveredDate};

/// A date and the directory it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatedDirectory {
    pub date: RecoveredDate,
    pub directory: String,
}

/// Archive-wide figures for a scanned inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub directories: usize,
    pub empty_directories: usize,
    pub files: usize,
    pub total_bytes: u64,
    pub dated_files: usize,

    /// Oldest and newest metadata dates, one per directory (its first dated file).
    pub earliest: Option<DatedDirectory>,
    pub latest: Option<DatedDirectory>,

    pub longest_directory: Option<String>,
    pub longest_file_name: Option<String>,
    pub longest_path: Option<String>,
}

/// Walk an inventory once and collect its summary.
pub fn summarize(inventory: &Inventory) -> InventorySummary {
    let mut summary = InventorySummary {
        directories: inventory.directories().len(),
        ..InventorySummary::default()
    };

    let mut per_directory = Vec::new();
    for (directory, entry) in inventory.directories() {
        if entry.is_empty() {
            summary.empty_directories += 1;
            continue;
        }
        if let Some(stamp) = entry.files.values().find_map(|r| r.date.as_ref()) {
            per_directory.push(DatedDirectory {
                date: stamp.date,
                directory: directory.clone(),
            });
        }
    }

    // Ties keep the first directory for the minimum and the last for the maximum.
    match per_directory.into_iter().minmax_by_key(|d| d.date) {
        MinMaxResult::NoElements => {}
        MinMaxResult::OneElement(only) => {
            summary.earliest = Some(only.clone());
            summary.latest = Some(only);
        }
        MinMaxResult::MinMax(min, max) => {
            summary.earliest = Some(min);
            summary.latest = Some(max);
        }
    }

    for (directory, name, record) in inventory.records() {
        summary.files += 1;
        summary.total_bytes += record.size_bytes;
        if record.has_date() {
            summary.dated_files += 1;
        }
        keep_longest(&mut summary.longest_directory, directory);
        keep_longest(&mut summary.longest_file_name, name);
        keep_longest(&mut summary.longest_path, &record.path);
    }

    summary
}

fn keep_longest(slot: &mut Option<String>, candidate: &str) {
    if slot.as_ref().is_none_or(|current| candidate.len() > current.len()) {
        *slot = Some(candidate.to_string());
    }
}
