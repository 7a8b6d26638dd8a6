//! Analysis passes for cmipdrs.
//!
//! These passes consume a scanned [`Inventory`] and never touch the archive:
//!
//! - **Deduplication** - group files by SHA-256 and pick one canonical copy
//! - **Path classification** - map legacy directory segments onto the
//!   experiment, realm, frequency, variable, source and run vocabularies
//! - **DRS derivation** - build CMIP6-style destination paths and plan the
//!   migration of every canonical file
//! - **Queries** - archive-wide summary figures
//!
//! # Planning a migration
//!
//! ```no_run
//! use cmipdrs_analyze::{DeduplicationResolver, DrsResolver, plan_migration};
//! use cmipdrs_core::{DrsSettings, Inventory, read_json};
//! use std::path::Path;
//!
//! let inventory: Inventory = read_json(Path::new("CMIP3_000.json")).unwrap();
//! let report = DeduplicationResolver::new().resolve(&inventory);
//! let plan = plan_migration(&inventory, &report, &DrsResolver::new(DrsSettings::default()));
//!
//! for step in &plan.moves {
//!     println!("{} -> {}", step.source, step.destination.display());
//! }
//! ```

pub mod classify;
mod drs;
mod duplicates;
mod query;
pub mod vocab;

pub use classify::{Category, ClassifyError, PathClassification, PathClassifier};
pub use drs::{DrsIdentifier, DrsResolver, MigrationFailure, MigrationPlan, PlannedMove, plan_migration};
pub use duplicates::{
    DeduplicationReport, DeduplicationResolver, DuplicateConfig, DuplicateConfigBuilder,
    DuplicateGroup, FileLocation,
};
pub use query::{DatedDirectory, InventorySummary, summarize};

// Re-export core types
pub use cmipdrs_core::{ContentHash, Inventory};
