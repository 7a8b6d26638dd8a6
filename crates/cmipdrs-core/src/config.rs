//! Scan configuration, era table and per-directory overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ArchiveError, Result};

/// Archive generation being scanned.
///
/// Each era maps to a CMOR generation with its own date-stamp convention.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Era {
    #[strum(to_string = "CMIP3", serialize = "3")]
    #[serde(rename = "CMIP3")]
    Cmip3,
    #[strum(to_string = "CMIP5", serialize = "5")]
    #[serde(rename = "CMIP5")]
    Cmip5,
    #[strum(to_string = "CMIP6", serialize = "6")]
    #[serde(rename = "CMIP6")]
    Cmip6,
}

impl Era {
    /// Plausible metadata years for files of this era.
    pub fn default_years(self) -> (i32, i32) {
        match self {
            Era::Cmip3 => (2003, 2008),
            Era::Cmip5 => (2008, 2017),
            Era::Cmip6 => (2018, 2026),
        }
    }

    /// Archive roots on the original publication filesystem.
    pub fn default_roots(self) -> Vec<PathBuf> {
        let roots: &[&str] = match self {
            Era::Cmip3 => &[
                "/p/css03/esgf_publish/cmip3",
                "/p/css03/scratch/ipcc2_deleteme_July2020",
            ],
            Era::Cmip5 => &[
                "/p/css03/cmip5_css01/data/cmip5/output1",
                "/p/css03/cmip5_css02/data/cmip5/output1",
                "/p/css03/cmip5_css02/data/cmip5/output2",
                "/p/css03/esgf_publish/cmip5",
            ],
            Era::Cmip6 => &["/p/css03/esgf_publish/CMIP6", "/p/css03/scratch/CMIP6/"],
        };
        roots.iter().map(PathBuf::from).collect()
    }
}

/// Global attributes searched for a creation date, highest priority first.
pub const DEFAULT_ATTRIBUTE_PRIORITY: &[&str] = &[
    "cmor_version",
    "creation_date",
    "comment",
    "contact",
    "date",
    "experiment_id",
    "forcing",
    "history",
    "institution",
    "realization",
    "source",
];

/// Directory names pruned wherever they appear.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &["summer", "cam3.3", "T4031qt"];

/// Directory names pruned only directly below a directory of the same name.
pub const DEFAULT_NESTED_EXCLUDE_DIRS: &[&str] = &["ipcc"];

/// Structural fixes applied to a dataset before its metadata is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFix {
    /// Variables and global attributes removed before reading.
    #[serde(default)]
    pub dropped_fields: Vec<String>,

    /// Replacement for the time coordinate's `units` attribute.
    #[serde(default)]
    pub time_units_override: Option<String>,
}

impl FileFix {
    pub fn is_empty(&self) -> bool {
        self.dropped_fields.is_empty() && self.time_units_override.is_none()
    }

    pub fn drops(&self, name: &str) -> bool {
        self.dropped_fields.iter().any(|f| f == name)
    }
}

/// Declared workaround for a known-bad directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryOverride {
    /// Directory the override applies to (exact path match).
    pub directory: String,

    /// File the override targets; `None` targets every file in the directory.
    #[serde(default)]
    pub target_file: Option<String>,

    /// Why the override exists.
    #[serde(default)]
    pub reason: String,

    #[serde(flatten)]
    pub fix: FileFix,
}

/// What to do with one file in an overridden directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideAction<'a> {
    /// The override does not concern this file.
    None,
    /// Known-bad file: record it as malformed without opening it.
    Skip { reason: &'a str },
    /// Open the file with these fixes applied.
    Apply(&'a FileFix),
}

impl DirectoryOverride {
    pub fn applies_to(&self, file_name: &str) -> bool {
        self.target_file.as_deref().is_none_or(|t| t == file_name)
    }

    pub fn action_for(&self, file_name: &str) -> OverrideAction<'_> {
        if !self.applies_to(file_name) {
            OverrideAction::None
        } else if self.fix.is_empty() {
            OverrideAction::Skip {
                reason: &self.reason,
            }
        } else {
            OverrideAction::Apply(&self.fix)
        }
    }
}

/// Configuration for one archive scan.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root directories to walk, in order.
    pub roots: Vec<PathBuf>,

    /// Archive generation, selects the CMOR date convention.
    #[builder(default = "Era::Cmip3")]
    pub era: Era,

    /// First plausible metadata year. Defaults to the era's range.
    #[builder(default = "self.years().0")]
    pub start_year: i32,

    /// Last plausible metadata year. Defaults to the era's range.
    #[builder(default = "self.years().1")]
    pub end_year: i32,

    /// Extension of files treated as data files.
    #[builder(default = "\".nc\".to_string()")]
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Directory names pruned before descent.
    #[builder(default = "defaults(DEFAULT_EXCLUDE_DIRS)")]
    #[serde(default)]
    pub exclude_dirs: Vec<String>,

    /// Directory names pruned only when nested under a same-named parent.
    #[builder(default = "defaults(DEFAULT_NESTED_EXCLUDE_DIRS)")]
    #[serde(default)]
    pub nested_exclude_dirs: Vec<String>,

    /// File names never processed.
    #[builder(default)]
    #[serde(default)]
    pub skip_files: Vec<String>,

    /// Per-directory overrides.
    #[builder(default)]
    #[serde(default)]
    pub overrides: Vec<DirectoryOverride>,

    /// Global attributes searched for a date, highest priority first.
    #[builder(default = "defaults(DEFAULT_ATTRIBUTE_PRIORITY)")]
    #[serde(default = "default_attribute_priority")]
    pub attribute_priority: Vec<String>,

    /// Persist the inventory after this many directories.
    #[builder(default = "10")]
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// Rotate to a new output shard after this many directories.
    #[builder(default)]
    #[serde(default)]
    pub shard_every: Option<usize>,

    /// Worker threads per directory (1 = sequential, 0 = rayon default).
    #[builder(default = "1")]
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn defaults(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_extension() -> String {
    ".nc".to_string()
}

fn default_attribute_priority() -> Vec<String> {
    defaults(DEFAULT_ATTRIBUTE_PRIORITY)
}

fn default_checkpoint_every() -> usize {
    10
}

fn default_threads() -> usize {
    1
}

impl ScanConfigBuilder {
    /// Year range after filling unset bounds from the era.
    fn years(&self) -> (i32, i32) {
        let (start, end) = self.era.unwrap_or(Era::Cmip3).default_years();
        (self.start_year.unwrap_or(start), self.end_year.unwrap_or(end))
    }

    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if !roots.is_empty() => {}
            _ => return Err("At least one root path is required".to_string()),
        }
        let (start, end) = self.years();
        if start > end {
            return Err(format!("start_year {start} is after end_year {end}"));
        }
        if self.checkpoint_every == Some(0) {
            return Err("checkpoint_every must be positive".to_string());
        }
        if self.shard_every == Some(Some(0)) {
            return Err("shard_every must be positive".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Config with the built-in roots and year range of an era.
    pub fn for_era(era: Era) -> Self {
        let (start_year, end_year) = era.default_years();
        Self {
            roots: era.default_roots(),
            era,
            start_year,
            end_year,
            extension: default_extension(),
            exclude_dirs: defaults(DEFAULT_EXCLUDE_DIRS),
            nested_exclude_dirs: defaults(DEFAULT_NESTED_EXCLUDE_DIRS),
            skip_files: Vec::new(),
            overrides: Vec::new(),
            attribute_priority: default_attribute_priority(),
            checkpoint_every: default_checkpoint_every(),
            shard_every: None,
            threads: default_threads(),
        }
    }

    /// Whether a child directory should be pruned before descending into it.
    pub fn should_prune(&self, parent: &Path, name: &str) -> bool {
        if self.exclude_dirs.iter().any(|d| d == name) {
            return true;
        }
        let parent_name = parent.file_name().and_then(|n| n.to_str());
        parent_name == Some(name) && self.nested_exclude_dirs.iter().any(|d| d == name)
    }

    /// Whether a file name carries the data-file extension.
    pub fn is_data_file(&self, name: &str) -> bool {
        name.ends_with(&self.extension)
    }

    pub fn should_skip_file(&self, name: &str) -> bool {
        self.skip_files.iter().any(|f| f == name)
    }

    /// Override declared for a directory, if any.
    pub fn override_for(&self, directory: &str) -> Option<&DirectoryOverride> {
        self.overrides.iter().find(|o| o.directory == directory)
    }
}

/// How experiments map to CMIP6 activity ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityRule {
    /// Every experiment maps to `CMIP`, as the legacy scripts did.
    #[default]
    Legacy,
    /// CFMIP and ScenarioMIP experiments map to their own activities.
    ByExperiment,
}

/// Settings for DRS path derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrsSettings {
    #[serde(default = "default_mip_era")]
    pub mip_era: String,

    #[serde(default = "default_grid_label")]
    pub grid_label: String,

    /// Directories excluded from DRS derivation (known bad indexing).
    #[serde(default)]
    pub skip_directories: Vec<String>,

    #[serde(default)]
    pub activity_rule: ActivityRule,
}

fn default_mip_era() -> String {
    "CMIP3".to_string()
}

fn default_grid_label() -> String {
    "gn".to_string()
}

impl Default for DrsSettings {
    fn default() -> Self {
        Self {
            mip_era: default_mip_era(),
            grid_label: default_grid_label(),
            skip_directories: Vec::new(),
            activity_rule: ActivityRule::default(),
        }
    }
}

/// Per-era values read from the configuration file. Unset values fall back
/// to the built-in era defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EraSettings {
    pub roots: Option<Vec<PathBuf>>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub extension: Option<String>,
    pub exclude_dirs: Option<Vec<String>>,
    pub nested_exclude_dirs: Option<Vec<String>>,
    pub skip_files: Option<Vec<String>>,
    pub attribute_priority: Option<Vec<String>>,
    pub checkpoint_every: Option<usize>,
    pub shard_every: Option<usize>,
    pub threads: Option<usize>,
    pub overrides: Vec<DirectoryOverride>,
}

/// Contents of the TOML configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub eras: BTreeMap<Era, EraSettings>,
    pub drs: DrsSettings,
}

impl AppConfig {
    /// Load and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;
        Self::parse(&text).map_err(|source| ArchiveError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolve the scan configuration for an era.
    pub fn scan_config(&self, era: Era) -> Result<ScanConfig> {
        let mut config = ScanConfig::for_era(era);
        let Some(settings) = self.eras.get(&era) else {
            return Ok(config);
        };
        let settings = settings.clone();

        if let Some(roots) = settings.roots {
            config.roots = roots;
        }
        if let Some(start) = settings.start_year {
            config.start_year = start;
        }
        if let Some(end) = settings.end_year {
            config.end_year = end;
        }
        if let Some(ext) = settings.extension {
            config.extension = ext;
        }
        if let Some(dirs) = settings.exclude_dirs {
            config.exclude_dirs = dirs;
        }
        if let Some(dirs) = settings.nested_exclude_dirs {
            config.nested_exclude_dirs = dirs;
        }
        if let Some(files) = settings.skip_files {
            config.skip_files = files;
        }
        if let Some(atts) = settings.attribute_priority {
            config.attribute_priority = atts;
        }
        if let Some(n) = settings.checkpoint_every {
            config.checkpoint_every = n;
        }
        if settings.shard_every.is_some() {
            config.shard_every = settings.shard_every;
        }
        if let Some(n) = settings.threads {
            config.threads = n;
        }
        config.overrides = settings.overrides;

        if config.roots.is_empty() {
            return Err(ArchiveError::InvalidConfig {
                message: format!("{era}: no roots configured"),
            });
        }
        if config.start_year > config.end_year {
            return Err(ArchiveError::InvalidConfig {
                message: format!(
                    "{era}: start_year {} is after end_year {}",
                    config.start_year, config.end_year
                ),
            });
        }
        if config.checkpoint_every == 0 || config.shard_every == Some(0) {
            return Err(ArchiveError::InvalidConfig {
                message: format!("{era}: checkpoint and shard intervals must be positive"),
            });
        }
        Ok(config)
    }
}
