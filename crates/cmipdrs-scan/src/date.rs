//! Recovery of a creation date from free-text metadata attributes.
//!
//! Archive files record when they were written in many inconsistent ways.
//! [`DateExtractor`] looks at the `date` attribute first, then walks the
//! configured attributes in priority order and, for each one, tries an
//! ordered list of [`DateRule`]s. The first rule that yields a candidate
//! decides the outcome: a plausible candidate is the file's date, an
//! implausible one leaves the file dateless. No later rule or attribute is
//! consulted as a fallback.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use cmipdrs_core::{DateStamp, Era, RecoveredDate, ScanConfig};

/// Phrase CMOR appends to `history` when it rewrites a file.
pub const CMOR_REWRITE_PHRASE: &str = "CMOR rewrote data to comply";

/// Characters searched before `"Z <phrase>"` for a CMOR2/3 timestamp.
const CMOR_LOOKBACK: usize = 19;

/// Timezones seen in NCAR `ctime`-style stamps.
const CTIME_ZONES: [&str; 6] = ["EDT", "EST", "MDT", "MST", "PDT", "PST"];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

static DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})-([A-Za-z]{3})-(\d{4})").expect("day-month-name regex must compile")
});
static CMOR1_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{2,4})").expect("CMOR1 stamp regex must compile")
});
static YMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,4})-(\d{1,2})-(\d{1,2})").expect("ymd regex must compile")
});
static SLASH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-3][0-9])/([0-3][0-9])/((?:[0-9][0-9])?[0-9][0-9])")
        .expect("slash date regex must compile")
});
static COLON_FIELDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"year:([0-9]{4}):month:([0-9]{2}):day:([0-9]{2})")
        .expect("colon fields regex must compile")
});
static CTIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[a-zA-Z]{3}\s([a-zA-Z]{3})\s{1,2}(\d{1,2})\s\d{1,2}.\d{2}.\d{2}\s([A-Z]{3})\s(\d{4})",
    )
    .expect("ctime regex must compile")
});
static ISO_8601: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,4})-(\d{1,2})-(\d{1,2})T\d{1,2}:\d{1,2}:\d{1,2}Z")
        .expect("iso 8601 regex must compile")
});

/// Read access to text-valued metadata attributes.
///
/// Non-text attributes must report `None`; only text is searched for dates.
pub trait AttributeSource {
    fn text(&self, name: &str) -> Option<&str>;
}

impl AttributeSource for BTreeMap<String, String> {
    fn text(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl AttributeSource for HashMap<String, String> {
    fn text(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl AttributeSource for [(&str, &str)] {
    fn text(&self, name: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

/// Decides whether a rule should run for `(attribute, text)`.
pub type Matcher = fn(attribute: &str, text: &str) -> bool;

/// Turns matching text into a candidate date.
pub type Parser = fn(era: Era, text: &str) -> Option<RecoveredDate>;

/// One date heuristic: a matcher and the parser run when it fires.
#[derive(Clone, Copy)]
pub struct DateRule {
    pub name: &'static str,
    pub matches: Matcher,
    pub parse: Parser,
}

impl std::fmt::Debug for DateRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DateRule").field("name", &self.name).finish()
    }
}

/// Built-in rules, highest priority first.
pub const DEFAULT_RULES: [DateRule; 6] = [
    DateRule {
        name: "day-month-name",
        matches: |attribute, text| attribute == DATE_ATTRIBUTE && DAY_MONTH_NAME.is_match(text),
        parse: parse_day_month_name,
    },
    DateRule {
        name: "cmor-rewrite",
        matches: |_, text| text.contains(CMOR_REWRITE_PHRASE),
        parse: parse_cmor_rewrite,
    },
    DateRule {
        name: "dd/mm/yy",
        matches: |_, text| SLASH_DATE.is_match(text),
        parse: parse_slash_date,
    },
    DateRule {
        name: "colon-fields",
        matches: |_, text| COLON_FIELDS.is_match(text),
        parse: parse_colon_fields,
    },
    DateRule {
        name: "ctime",
        matches: |_, text| CTIME.is_match(text),
        parse: parse_ctime,
    },
    DateRule {
        name: "iso-8601",
        matches: |_, text| ISO_8601.is_match(text),
        parse: parse_iso_8601,
    },
];

/// Attribute consulted before the configured priority list.
pub const DATE_ATTRIBUTE: &str = "date";

/// What the rules made of one attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// A rule parsed a date inside the plausible range.
    Found(RecoveredDate),
    /// A rule parsed a date outside the plausible range.
    Invalid(RecoveredDate),
    /// No rule produced a date.
    Unmatched,
}

/// Priority-ordered date recovery over metadata attributes.
#[derive(Debug, Clone)]
pub struct DateExtractor {
    era: Era,
    start_year: i32,
    end_year: i32,
    attribute_priority: Vec<String>,
    rules: Vec<DateRule>,
}

impl DateExtractor {
    pub fn new(era: Era, start_year: i32, end_year: i32, attribute_priority: Vec<String>) -> Self {
        Self {
            era,
            start_year,
            end_year,
            attribute_priority,
            rules: DEFAULT_RULES.to_vec(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.era,
            config.start_year,
            config.end_year,
            config.attribute_priority.clone(),
        )
    }

    /// Replace the rule list.
    pub fn with_rules(mut self, rules: Vec<DateRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &[DateRule] {
        &self.rules
    }

    /// Date of a file from its attributes, tagged with the attribute it came
    /// from. `None` when nothing matched or the first candidate was invalid.
    pub fn extract<A: AttributeSource + ?Sized>(&self, attributes: &A) -> Option<DateStamp> {
        let order = std::iter::once(DATE_ATTRIBUTE).chain(
            self.attribute_priority
                .iter()
                .map(String::as_str)
                .filter(|a| *a != DATE_ATTRIBUTE),
        );
        for attribute in order {
            let Some(text) = attributes.text(attribute) else {
                continue;
            };
            match self.candidate(attribute, text) {
                Candidate::Found(date) => return Some(DateStamp::new(date, attribute)),
                Candidate::Invalid(_) => return None,
                Candidate::Unmatched => {}
            }
        }
        None
    }

    /// Plausible date in a single attribute value.
    pub fn extract_from(&self, attribute: &str, text: &str) -> Option<RecoveredDate> {
        match self.candidate(attribute, text) {
            Candidate::Found(date) => Some(date),
            Candidate::Invalid(_) | Candidate::Unmatched => None,
        }
    }

    /// Outcome of the first rule that parses a candidate from `text`.
    pub fn candidate(&self, attribute: &str, text: &str) -> Candidate {
        for rule in &self.rules {
            if !(rule.matches)(attribute, text) {
                continue;
            }
            let Some(date) = (rule.parse)(self.era, text) else {
                tracing::debug!(attribute, rule = rule.name, "rule matched but did not parse");
                continue;
            };
            if date.is_plausible(self.start_year, self.end_year) {
                tracing::debug!(attribute, rule = rule.name, %date, "date found");
                return Candidate::Found(date);
            }
            tracing::debug!(
                attribute,
                rule = rule.name,
                %date,
                start_year = self.start_year,
                end_year = self.end_year,
                "discarding implausible date, file is dateless"
            );
            return Candidate::Invalid(date);
        }
        Candidate::Unmatched
    }
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<RecoveredDate> {
    Some(RecoveredDate::new(
        year.parse().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    ))
}

/// `23-Jul-2003`
fn parse_day_month_name(_era: Era, text: &str) -> Option<RecoveredDate> {
    let caps = DAY_MONTH_NAME.captures(text)?;
    let month = month_number(&caps[2])?;
    Some(RecoveredDate::new(caps[3].parse().ok()?, month, caps[1].parse().ok()?))
}

/// CMOR1 writes `At 20:53:22 on 06/28/2005, CMOR rewrote ...` (month first).
/// CMOR2 and CMOR3 write `2013-03-12T17:53:48Z CMOR rewrote ...`, searched
/// in a fixed window ending at the `Z`.
fn parse_cmor_rewrite(era: Era, text: &str) -> Option<RecoveredDate> {
    match era {
        Era::Cmip3 => {
            let start = text.find(" At ")?;
            let caps = CMOR1_STAMP.captures(&text[start..])?;
            ymd(&caps[3], &caps[1], &caps[2])
        }
        Era::Cmip5 | Era::Cmip6 => {
            let anchor = format!("Z {CMOR_REWRITE_PHRASE}");
            let end = text.find(&anchor)?;
            let mut start = end.saturating_sub(CMOR_LOOKBACK);
            while !text.is_char_boundary(start) {
                start += 1;
            }
            let caps = YMD.captures(&text[start..end])?;
            ymd(&caps[1], &caps[2], &caps[3])
        }
    }
}

/// `28/06/05` or `28/06/2005`, day first. Two digit years are 20xx.
fn parse_slash_date(_era: Era, text: &str) -> Option<RecoveredDate> {
    let caps = SLASH_DATE.captures(text)?;
    let mut year: i32 = caps[3].parse().ok()?;
    if caps[3].len() == 2 {
        year += 2000;
    }
    Some(RecoveredDate::new(year, caps[2].parse().ok()?, caps[1].parse().ok()?))
}

/// `year:2005:month:06:day:28`
fn parse_colon_fields(_era: Era, text: &str) -> Option<RecoveredDate> {
    let caps = COLON_FIELDS.captures(text)?;
    ymd(&caps[1], &caps[2], &caps[3])
}

/// `Fri Aug  5 19:23:54 MDT 2005`, North American zones only.
fn parse_ctime(_era: Era, text: &str) -> Option<RecoveredDate> {
    let caps = CTIME.captures(text)?;
    if !CTIME_ZONES.contains(&&caps[3]) {
        return None;
    }
    let month = month_number(&caps[1])?;
    Some(RecoveredDate::new(caps[4].parse().ok()?, month, caps[2].parse().ok()?))
}

/// `2021-05-06T18:58:51Z`
fn parse_iso_8601(_era: Era, text: &str) -> Option<RecoveredDate> {
    let caps = ISO_8601.captures(text)?;
    ymd(&caps[1], &caps[2], &caps[3])
}
