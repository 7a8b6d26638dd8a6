//! End-to-end scans over generated netCDF archives.

mod common;

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use cmipdrs_core::{DirectoryOverride, FileFix, RecoveredDate, to_legacy_string};
use cmipdrs_scan::{
    ArchiveScanner, Checkpointer, Era, HashIndexer, ScanConfig, find_shards, load_inventories,
};
use common::{ClassicFile, NcVar};

fn dataset(creation_date: &str) -> ClassicFile {
    ClassicFile::new()
        .record_dim("time")
        .dim("lat", 2)
        .text("title", "NCAR CCSM3.0 20C3M run1")
        .text("creation_date", creation_date)
        .text("history", "created by NCAR CSM")
        .var(
            NcVar::double("time", &["time"], &[15.5, 45.0])
                .text("units", "days since 2000-01-01")
                .text("calendar", "noleap"),
        )
        .var(NcVar::float("pr", &["time", "lat"], &[1.0, 2.0, 3.0, 4.0]))
}

fn config_for(root: &Path) -> ScanConfig {
    ScanConfig::builder()
        .roots(vec![root.to_path_buf()])
        .era(Era::Cmip5)
        .start_year(2003)
        .end_year(2008)
        .build()
        .unwrap()
}

fn run_dir(root: &Path, run: &str) -> std::path::PathBuf {
    root.join("20c3m/atm/mo/pr/ncar_ccsm3_0").join(run)
}

#[test]
fn test_iso_creation_date_is_dated() {
    let temp = TempDir::new().unwrap();
    let dir = run_dir(temp.path(), "run1");
    dataset("2005-06-28T12:00:00Z").write(&dir.join("pr_A1.nc"));

    let inventory = ArchiveScanner::new(config_for(temp.path())).scan().unwrap();

    let entry = inventory.directory(&dir.to_string_lossy()).unwrap();
    let record = &entry.files["pr_A1.nc"];
    let stamp = record.date.as_ref().unwrap();
    assert_eq!(stamp.date, RecoveredDate::new(2005, 6, 28));
    assert_eq!(stamp.attribute, "creation_date");
    assert_eq!(record.time_start, Some(RecoveredDate::new(2000, 1, 16)));
    assert_eq!(record.time_end, Some(RecoveredDate::new(2000, 2, 15)));
    assert!(inventory.no_date().is_empty());
    assert_eq!(inventory.file_count(), 1);
}

#[test]
fn test_dated_or_no_date_exclusively() {
    let temp = TempDir::new().unwrap();
    let dir = run_dir(temp.path(), "run1");
    dataset("2005-06-28T12:00:00Z").write(&dir.join("pr_A1.nc"));
    dataset("sometime in 1999").write(&dir.join("pr_A1_old.nc"));

    let inventory = ArchiveScanner::new(config_for(temp.path())).scan().unwrap();

    let no_date: Vec<&str> = inventory.no_date().values().map(|e| e.path.as_str()).collect();
    for (_, _, record) in inventory.records() {
        assert_ne!(record.has_date(), no_date.contains(&record.path.as_str()));
    }
    assert_eq!(inventory.dated_count(), 1);
    assert_eq!(no_date.len(), 1);
}

#[test]
fn test_rescan_is_identical() {
    let temp = TempDir::new().unwrap();
    for run in ["run1", "run2"] {
        let dir = run_dir(temp.path(), run);
        dataset("2005-06-28T12:00:00Z").write(&dir.join("pr_A1.nc"));
        fs::write(dir.join("README"), "notes").unwrap();
    }

    let scanner = ArchiveScanner::new(config_for(temp.path()));
    let first = to_legacy_string(&scanner.scan().unwrap()).unwrap();
    let second = to_legacy_string(&scanner.scan().unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unreadable_files_recorded() {
    let temp = TempDir::new().unwrap();
    let dir = run_dir(temp.path(), "run1");
    dataset("2005-06-28T12:00:00Z").write(&dir.join("pr_A1.nc"));
    fs::write(dir.join("pr_A1_hdf.nc"), b"\x89HDF\r\n\x1a\n0000").unwrap();
    fs::write(dir.join("pr_A1_junk.nc"), "plain text").unwrap();
    fs::write(dir.join("pr_A1.nc.bad"), "moved aside").unwrap();

    let inventory = ArchiveScanner::new(config_for(temp.path())).scan().unwrap();

    assert_eq!(inventory.read_errors().len(), 2);
    assert!(inventory.read_errors()[&1].ends_with("pr_A1_hdf.nc"));
    assert!(inventory.read_errors()[&2].ends_with("pr_A1_junk.nc"));
    assert_eq!(inventory.malformed().len(), 1);
    assert!(inventory.malformed()[&1].ends_with("pr_A1.nc.bad"));
    assert_eq!(inventory.file_count(), 3);
    assert_eq!(inventory.directory(&dir.to_string_lossy()).unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn test_dangling_symlink_does_not_stop_scan() {
    let temp = TempDir::new().unwrap();
    let dir = run_dir(temp.path(), "run1");
    dataset("2005-06-28T12:00:00Z").write(&dir.join("pr_A1.nc"));
    std::os::unix::fs::symlink(dir.join("moved_away.nc"), dir.join("pr_A1_gone.nc")).unwrap();

    let scanner = ArchiveScanner::new(config_for(temp.path()));
    let mut rx = scanner.subscribe();
    let inventory = scanner.scan().unwrap();

    assert_eq!(inventory.read_errors().len(), 1);
    assert!(inventory.read_errors()[&1].ends_with("pr_A1_gone.nc"));
    let entry = inventory.directory(&dir.to_string_lossy()).unwrap();
    assert!(entry.files["pr_A1.nc"].has_date());

    // Only the real file contributes bytes.
    let progress = rx.try_recv().unwrap();
    let size = fs::metadata(dir.join("pr_A1.nc")).unwrap().len();
    assert_eq!(progress.files_scanned, 2);
    assert_eq!(progress.bytes_scanned, size);
}

#[test]
fn test_units_override_rescues_file() {
    let temp = TempDir::new().unwrap();
    let dir = run_dir(temp.path(), "run1");
    ClassicFile::new()
        .record_dim("time")
        .text("creation_date", "2005-06-28T12:00:00Z")
        .var(NcVar::double("time", &["time"], &[0.0, 31.0]).text("units", "days since 20O1-1-1"))
        .write(&dir.join("sic_A1.nc"));

    let mut config = config_for(temp.path());
    let broken = ArchiveScanner::new(config.clone()).scan().unwrap();
    assert_eq!(broken.read_errors().len(), 1);

    config.overrides = vec![DirectoryOverride {
        directory: dir.to_string_lossy().into_owned(),
        target_file: None,
        reason: "fix bad time:units".to_string(),
        fix: FileFix {
            dropped_fields: Vec::new(),
            time_units_override: Some("days since 2001-01-01".to_string()),
        },
    }];
    let fixed = ArchiveScanner::new(config).scan().unwrap();
    assert!(fixed.read_errors().is_empty());
    let record = &fixed.directory(&dir.to_string_lossy()).unwrap().files["sic_A1.nc"];
    assert_eq!(record.time_start, Some(RecoveredDate::new(2001, 1, 1)));
    assert_eq!(record.time_end, Some(RecoveredDate::new(2001, 2, 1)));
}

#[test]
fn test_sharded_checkpoints_recombine() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("archive");
    let output = temp.path().join("out");
    fs::create_dir_all(&output).unwrap();
    for run in ["run1", "run2", "run3"] {
        dataset("2005-06-28T12:00:00Z").write(&run_dir(&archive, run).join("pr_A1.nc"));
    }

    let config = config_for(&archive);
    let mut checkpointer = Checkpointer::new(&output, config.era, 1, Some(2));
    let last = ArchiveScanner::new(config)
        .scan_with_checkpoints(&mut checkpointer)
        .unwrap();
    assert_eq!(last.directories().len(), 1);
    assert_eq!(last.file_count(), 3);

    let shards = find_shards(&output, Era::Cmip5).unwrap();
    assert_eq!(shards.len(), 2);
    assert!(shards[0].ends_with("CMIP5_000.json"));

    let merged = load_inventories(&shards).unwrap();
    assert_eq!(merged.directories().len(), 3);
    assert_eq!(merged.dated_count(), 3);
}

#[test]
fn test_hash_index_finds_copies() {
    let temp = TempDir::new().unwrap();
    let bytes = dataset("2005-06-28T12:00:00Z").encode();
    let primary = run_dir(temp.path(), "run1");
    let staging = temp.path().join("staging/tmp/20c3m/run1");
    fs::create_dir_all(&primary).unwrap();
    fs::create_dir_all(&staging).unwrap();
    fs::write(primary.join("pr_A1.nc"), &bytes).unwrap();
    fs::write(staging.join("pr_A1.nc"), &bytes).unwrap();

    let index = HashIndexer::new(config_for(temp.path())).index().unwrap();
    let dups: Vec<_> = index.duplicates().collect();
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].1.len(), 2);
    assert!(dups[0].1.values().all(|f| f.size_bytes == bytes.len() as u64));
}
