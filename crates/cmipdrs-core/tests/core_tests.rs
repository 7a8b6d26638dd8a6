use cmipdrs_core::{
    AppConfig, ArchiveError, ContentHash, DateStamp, DirectoryOverride, Era, FileFix, FileRecord,
    HashIndex, IndexedFile, Inventory, OverrideAction, RESERVED_KEYS, RecoveredDate, ScanConfig,
    read_json, write_json,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_record(dir: &str, name: &str, hash: u8) -> FileRecord {
    FileRecord {
        tool_version: Some("1.0".to_string()),
        date: Some(DateStamp::new(RecoveredDate::new(2005, 6, 28), "history")),
        path: format!("{dir}/{name}"),
        size_bytes: 2048,
        content_hash: ContentHash::new([hash; 32]),
        time_start: Some(RecoveredDate::new(1860, 1, 16)),
        time_end: Some(RecoveredDate::new(1999, 12, 16)),
    }
}

#[test]
fn test_inventory_persists_and_reloads() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("CMIP3.json");

    let mut inventory = Inventory::new();
    inventory.record_file("/d/run1", "tas_A1.nc", sample_record("/d/run1", "tas_A1.nc", 1));
    inventory.visit_directory("/d/run2");
    inventory.record_malformed("/d/run1/README");

    write_json(&path, &inventory).unwrap();
    let back: Inventory = read_json(&path).unwrap();

    assert_eq!(back, inventory);
    assert_eq!(back.tool_version_count(), 1);
    assert!(back.directory("/d/run2").unwrap().is_empty());
}

#[test]
fn test_inventory_file_layout() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("CMIP3.json");

    let mut inventory = Inventory::new();
    inventory.record_file("/d/run1", "tas_A1.nc", sample_record("/d/run1", "tas_A1.nc", 1));
    write_json(&path, &inventory).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(!text.ends_with('\n'));
    assert!(text.contains("\"!noDateFileCount\":0"));
    assert!(text.contains("\"date\":[\n"));

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let object = value.as_object().unwrap();
    for key in RESERVED_KEYS {
        assert!(object.contains_key(key), "missing {key}");
    }
    let record = &object["/d/run1"]["tas_A1.nc"];
    assert_eq!(record["time0"], "1860-01-16");
    assert_eq!(record["cmorVersion"], "1.0");
    assert_eq!(record["sha256"], "01".repeat(32));
}

#[test]
fn test_hash_index_persists() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("CMIP3_hashes.json");

    let mut index = HashIndex::new("230807_142034");
    index.insert(
        ContentHash::new([9; 32]),
        "/d/run1/tas_A1.nc",
        IndexedFile {
            modified: Some(RecoveredDate::new(2006, 1, 2)),
            size_bytes: 42,
        },
    );
    index.finish("230807_142100");
    write_json(&path, &index).unwrap();

    let back: HashIndex = read_json(&path).unwrap();
    assert_eq!(back, index);
}

#[test]
fn test_read_json_missing_file() {
    let temp = TempDir::new().unwrap();
    let result: Result<Inventory, _> = read_json(&temp.path().join("absent.json"));
    assert!(matches!(result, Err(ArchiveError::NotFound { .. })));
}

#[test]
fn test_app_config_load_from_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cmipdrs.toml");
    fs::write(
        &path,
        r#"
[eras.CMIP3]
roots = ["/archive/cmip3"]
skip_files = ["listing_20080409.txt"]

[[eras.CMIP3.overrides]]
directory = "/archive/cmip3/data10/sresa1b/ocn/mo/sic/ingv_echam4/run1"
reason = "fix bad time:units"
time_units_override = "days since 2001-01-01"
"#,
    )
    .unwrap();

    let app = AppConfig::load(&path).unwrap();
    let config = app.scan_config(Era::Cmip3).unwrap();
    assert_eq!(config.roots, vec![PathBuf::from("/archive/cmip3")]);
    assert!(config.should_skip_file("listing_20080409.txt"));

    let dir = "/archive/cmip3/data10/sresa1b/ocn/mo/sic/ingv_echam4/run1";
    let over = config.override_for(dir).unwrap();
    match over.action_for("sic_O1.nc") {
        OverrideAction::Apply(fix) => {
            assert_eq!(fix.time_units_override.as_deref(), Some("days since 2001-01-01"));
        }
        other => panic!("unexpected action {other:?}"),
    }
}

#[test]
fn test_app_config_rejects_bad_toml() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    fs::write(&path, "[eras.CMIP3\nroots = 1").unwrap();
    assert!(matches!(
        AppConfig::load(&path),
        Err(ArchiveError::Toml { .. })
    ));
}

#[test]
fn test_skip_override_without_fix() {
    let over = DirectoryOverride {
        directory: "/d".to_string(),
        target_file: Some("pr_CF3.nc".to_string()),
        reason: "known bad".to_string(),
        fix: FileFix::default(),
    };
    let mut config = ScanConfig::for_era(Era::Cmip3);
    config.overrides.push(over);

    let found = config.override_for("/d").unwrap();
    assert!(matches!(found.action_for("pr_CF3.nc"), OverrideAction::Skip { .. }));
    assert!(config.override_for("/e").is_none());
}

#[test]
fn test_shipped_config_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/cmipdrs.toml");
    let app = AppConfig::load(&path).unwrap();

    let cmip3 = app.scan_config(Era::Cmip3).unwrap();
    assert_eq!(cmip3.overrides.len(), 5);
    let skip = cmip3
        .override_for("/p/css03/esgf_publish/cmip3/ipcc/cfmip/2xco2/atm/da/pr/ukmo_hadsm4/run1")
        .unwrap();
    assert!(matches!(skip.action_for("pr_CF3.nc"), OverrideAction::Skip { .. }));

    let cmip5 = app.scan_config(Era::Cmip5).unwrap();
    assert_eq!(cmip5.shard_every, Some(5000));
    assert_eq!(app.drs.skip_directories.len(), 9);
}
