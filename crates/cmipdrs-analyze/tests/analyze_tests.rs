use std::fs;
use std::path::Path;

use tempfile::TempDir;

use cmipdrs_analyze::{
    DeduplicationReport, DeduplicationResolver, DrsResolver, DuplicateConfig, FileLocation,
    MigrationPlan, plan_migration, summarize,
};
use cmipdrs_core::{ActivityRule, AppConfig, Inventory, read_json, write_json};

const PUBLISHED: &str = "/p/css03/esgf_publish/cmip3/ipcc/20c3m/atm/mo/pr/ncar_ccsm3_0/run1";
const STAGING: &str = "/p/css03/esgf_publish/cmip3/ipcc/data7/20c3m/atm/mo/pr/ncar_ccsm3_0/run1";
const CFMIP: &str = "/p/css03/esgf_publish/cmip3/ipcc/cfmip/2xco2/atm/mo/rsut/mpi_echam5/run1";

const SHA_PR: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const SHA_RSUT: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// An inventory as older scans wrote it: unpadded dates, float sizes and a
/// bookkeeping key that is no longer produced.
fn legacy_inventory() -> String {
    format!(
        r#"{{
    "!_cmorCount":0,
    "!_fileCount":3,
    "!badFileList":[],
    "!noDateFileCount":0,
    "{PUBLISHED}":{{
        "pr_A1.nc":{{
            "date":["2005-6-28","history"],
            "filePath":"{PUBLISHED}/pr_A1.nc",
            "fileSizeBytes":1000.0,
            "sha256":"{SHA_PR}",
            "time0":"1870-1-16",
            "timeN":"1999-12-16"
        }}
    }},
    "{STAGING}":{{
        "pr_A1.nc":{{
            "date":["2005-6-28","history"],
            "filePath":"{STAGING}/pr_A1.nc",
            "fileSizeBytes":1000,
            "sha256":"{SHA_PR}"
        }}
    }},
    "{CFMIP}":{{
        "rsut_A1.nc":{{
            "date":["2004-11-02","creation_date"],
            "filePath":"{CFMIP}/rsut_A1.nc",
            "fileSizeBytes":500,
            "sha256":"{SHA_RSUT}"
        }}
    }}
}}"#
    )
}

fn load(dir: &Path) -> Inventory {
    let path = dir.join("CMIP3_000.json");
    fs::write(&path, legacy_inventory()).unwrap();
    read_json(&path).unwrap()
}

#[test]
fn test_legacy_inventory_to_migration_plan() {
    let temp = TempDir::new().unwrap();
    let inventory = load(temp.path());
    assert_eq!(inventory.file_count(), 3);

    let report = DeduplicationResolver::new().resolve(&inventory);
    assert_eq!(report.unique_count(), 2);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].canonical, FileLocation::new(PUBLISHED, "pr_A1.nc"));
    assert_eq!(report.total_wasted_space, 1000);

    let plan = plan_migration(&inventory, &report, &DrsResolver::default());
    assert!(plan.failures.is_empty());
    let destinations: Vec<String> = plan
        .moves
        .iter()
        .map(|m| m.destination.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        destinations,
        [
            "CMIP3/CMIP/NCAR/NCAR-CCSM3-0/20c3m/r1i0p0f0/A1/pr/gn/v20050628/pr_A1_NCAR-CCSM3-0_20c3m_r1i0p0f0_gn_187001-199912.nc",
            "CMIP3/CMIP/MPI-M/MPI-ECHAM5/2xco2/r1i0p0f0/A1/rsut/gn/v20041102/rsut_A1_MPI-ECHAM5_2xco2_r1i0p0f0_gn.nc",
        ]
    );
}

#[test]
fn test_activity_rule_from_config_file() {
    let temp = TempDir::new().unwrap();
    let inventory = load(temp.path());
    let config = AppConfig::parse(
        r#"
[drs]
activity_rule = "by_experiment"
skip_directories = ["/p/css03/esgf_publish/cmip3/ipcc/20c3m/atm/mo/pr/ncar_ccsm3_0/run1"]
"#,
    )
    .unwrap();
    assert_eq!(config.drs.activity_rule, ActivityRule::ByExperiment);

    let report = DeduplicationResolver::new().resolve(&inventory);
    let plan = plan_migration(&inventory, &report, &DrsResolver::new(config.drs));
    assert_eq!(plan.skipped_directories, [PUBLISHED]);
    assert_eq!(plan.moves.len(), 1);
    assert!(plan.moves[0].destination.starts_with("CMIP3/CFMIP/MPI-M"));
}

#[test]
fn test_reports_persist() {
    let temp = TempDir::new().unwrap();
    let inventory = load(temp.path());
    let report = DeduplicationResolver::new().resolve(&inventory);
    let plan = plan_migration(&inventory, &report, &DrsResolver::default());

    let report_path = temp.path().join("out/dedupe.json");
    let plan_path = temp.path().join("out/drs.json");
    write_json(&report_path, &report).unwrap();
    write_json(&plan_path, &plan).unwrap();

    let report_back: DeduplicationReport = read_json(&report_path).unwrap();
    assert_eq!(report_back.canonical, report.canonical);
    let plan_back: MigrationPlan = read_json(&plan_path).unwrap();
    assert_eq!(plan_back.moves, plan.moves);
}

#[test]
fn test_excluding_staging_trees() {
    let temp = TempDir::new().unwrap();
    let inventory = load(temp.path());

    let config = DuplicateConfig::builder()
        .exclude_patterns(vec!["/data7/".to_string()])
        .build()
        .unwrap();
    assert_eq!(config.min_size, 0);

    let report = DeduplicationResolver::with_config(config).resolve(&inventory);
    assert_eq!(report.files_analyzed, 2);
    assert!(!report.has_duplicates());
}

#[test]
fn test_summary_of_legacy_inventory() {
    let temp = TempDir::new().unwrap();
    let summary = summarize(&load(temp.path()));
    assert_eq!(summary.directories, 3);
    assert_eq!(summary.files, 3);
    assert_eq!(summary.total_bytes, 2500);
    assert_eq!(summary.earliest.unwrap().directory, CFMIP);
    assert_eq!(summary.longest_directory.as_deref(), Some(STAGING));
}
