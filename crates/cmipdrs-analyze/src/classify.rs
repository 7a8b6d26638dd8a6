//! Mapping legacy archive paths onto controlled vocabularies.

use itertools::Itertools;
use strum::Display;
use thiserror::Error;

use cmipdrs_core::ActivityRule;

use crate::vocab::{
    CFMIP_EXPERIMENTS, EXPERIMENTS, FREQUENCIES, INSTITUTIONS, REALMS, SCENARIOMIP_EXPERIMENTS,
    SOURCE_CASE_FIXES, TABLE_IDS, UNKNOWN_INSTITUTION,
};

/// Path component categories the classifier looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Experiment,
    Realm,
    Frequency,
    Variable,
    Source,
    Member,
}

/// A directory that does not fit the expected archive layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("No {category} found in {path}")]
    NoMatch { category: Category, path: String },

    #[error("No table id in file names: {files}")]
    NoTableId { files: String },

    #[error("No dated file to derive a version from in {directory}")]
    MissingVersionDate { directory: String },
}

/// Upper-case, restore institutional mixed case, then hyphenate.
///
/// `CCCMA_AGCM4_0` becomes `CCCma-AGCM4-0`.
pub fn fix_source(raw: &str) -> String {
    let mut source = raw.to_uppercase();
    for (from, to) in SOURCE_CASE_FIXES {
        source = source.replace(from, to);
    }
    source.replace('_', "-")
}

/// Owning institution of a normalized source id.
pub fn match_institution(source: &str) -> &'static str {
    INSTITUTIONS
        .iter()
        .find(|(id, _)| *id == source)
        .map_or(UNKNOWN_INSTITUTION, |&(_, inst)| inst)
}

/// First `_`/`.` separated token of any file name that is a table id.
pub fn match_table<S: AsRef<str>>(file_names: &[S]) -> Result<String, ClassifyError> {
    file_names
        .iter()
        .flat_map(|name| name.as_ref().split(['_', '.']))
        .map(str::to_uppercase)
        .find(|token| TABLE_IDS.contains(&token.as_str()))
        .ok_or_else(|| ClassifyError::NoTableId {
            files: file_names.iter().map(|n| n.as_ref()).join(", "),
        })
}

fn first_in<'a>(segments: &[&'a str], vocabulary: &[&str]) -> Option<&'a str> {
    segments.iter().copied().find(|s| vocabulary.contains(s))
}

fn no_match(category: Category, segments: &[&str]) -> ClassifyError {
    ClassifyError::NoMatch {
        category,
        path: segments.join("/"),
    }
}

/// Experiment and activity id.
///
/// Under [`ActivityRule::Legacy`] every experiment maps to `CMIP`, as the
/// original tooling did; a warning is logged when the per-experiment rule
/// would have chosen a different activity.
pub fn match_experiment(
    segments: &[&str],
    rule: ActivityRule,
) -> Result<(String, &'static str), ClassifyError> {
    let experiment =
        first_in(segments, EXPERIMENTS).ok_or_else(|| no_match(Category::Experiment, segments))?;

    let by_experiment = if CFMIP_EXPERIMENTS.contains(&experiment) {
        "CFMIP"
    } else if SCENARIOMIP_EXPERIMENTS.contains(&experiment) {
        "ScenarioMIP"
    } else {
        "CMIP"
    };

    let activity = match rule {
        ActivityRule::ByExperiment => by_experiment,
        ActivityRule::Legacy => {
            if by_experiment != "CMIP" {
                tracing::warn!(
                    experiment,
                    activity = by_experiment,
                    "legacy rule maps experiment to CMIP"
                );
            }
            "CMIP"
        }
    };
    Ok((experiment.to_string(), activity))
}

pub fn match_realm(segments: &[&str]) -> Result<String, ClassifyError> {
    first_in(segments, REALMS)
        .map(str::to_string)
        .ok_or_else(|| no_match(Category::Realm, segments))
}

/// Frequency segment plus the variable and raw source id that follow it.
pub fn match_frequency(segments: &[&str]) -> Result<(String, String, String), ClassifyError> {
    let index = segments
        .iter()
        .position(|s| FREQUENCIES.contains(s))
        .ok_or_else(|| no_match(Category::Frequency, segments))?;
    let variable = segments
        .get(index + 1)
        .ok_or_else(|| no_match(Category::Variable, segments))?;
    let source = segments
        .get(index + 2)
        .ok_or_else(|| no_match(Category::Source, segments))?;
    Ok((
        segments[index].to_string(),
        variable.to_string(),
        source.to_string(),
    ))
}

/// `run2` becomes `r2i0p0f0`.
pub fn match_run(segments: &[&str]) -> Result<String, ClassifyError> {
    segments
        .iter()
        .find_map(|s| {
            let n = s.strip_prefix("run")?;
            (!n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())).then(|| format!("r{n}i0p0f0"))
        })
        .ok_or_else(|| no_match(Category::Member, segments))
}

/// Everything a directory path says about its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathClassification {
    pub experiment: String,
    pub activity: String,
    pub realm: String,
    pub frequency: String,
    pub variable: String,
    pub source: String,
    pub institution: String,
    pub member: String,
}

/// Classifies legacy archive directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathClassifier {
    rule: ActivityRule,
}

impl PathClassifier {
    pub fn new(rule: ActivityRule) -> Self {
        Self { rule }
    }

    pub fn classify(&self, directory: &str) -> Result<PathClassification, ClassifyError> {
        let segments: Vec<&str> = directory.split('/').filter(|s| !s.is_empty()).collect();

        let (experiment, activity) = match_experiment(&segments, self.rule)?;
        let realm = match_realm(&segments)?;
        let (frequency, variable, raw_source) = match_frequency(&segments)?;
        let member = match_run(&segments)?;
        let source = fix_source(&raw_source);
        let institution = match_institution(&source);
        if institution == UNKNOWN_INSTITUTION {
            tracing::debug!(source = %source, "no institution for source id");
        }

        Ok(PathClassification {
            experiment,
            activity: activity.to_string(),
            realm,
            frequency,
            variable,
            institution: institution.to_string(),
            source,
            member,
        })
    }
}
