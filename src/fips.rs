// 🗺️ Geographic Key Normalizer
//
// Every table joins on a 5-digit county FIPS code. Spreadsheet sources drop the
// leading zero or render the code as a float, and the price and population
// files carry only a county name. All keys pass through here before a join.

use crate::records::County;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// FIPS CODE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FipsError {
    #[error("empty FIPS code")]
    Empty,

    #[error("FIPS code '{0}' is not numeric")]
    NonNumeric(String),

    #[error("FIPS code '{0}' has more than 5 significant digits")]
    TooLong(String),

    #[error("FIPS part '{0}' is too long")]
    InvalidPart(String),
}

/// Canonical county key: exactly 5 ASCII digits, zero-padded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fips(String);

impl Fips {
    pub const WIDTH: usize = 5;

    /// Parse a raw code from any source
    ///
    /// Accepts `1001`, `"01001"`, `" 1001 "` and `1001.0`. All yield `01001`.
    pub fn parse(raw: &str) -> Result<Self, FipsError> {
        let digits = code_digits(raw)?;
        pad(digits, Self::WIDTH)
            .map(Fips)
            .ok_or_else(|| FipsError::TooLong(raw.trim().to_string()))
    }

    /// Compose a code from separate state (2) and county (3) parts
    pub fn from_parts(state: &str, county: &str) -> Result<Self, FipsError> {
        let state_part = pad(code_digits(state)?, 2)
            .ok_or_else(|| FipsError::InvalidPart(state.trim().to_string()))?;
        let county_part = pad(code_digits(county)?, 3)
            .ok_or_else(|| FipsError::InvalidPart(county.trim().to_string()))?;

        Ok(Fips(format!("{state_part}{county_part}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn state_code(&self) -> &str {
        &self.0[..2]
    }

    pub fn county_code(&self) -> &str {
        &self.0[2..]
    }

    /// State and national totals end in 000
    pub fn is_summary(&self) -> bool {
        self.0.ends_with("000")
    }
}

/// Digits of a code, with a float's all-zero fraction dropped
fn code_digits(raw: &str) -> Result<&str, FipsError> {
    let trimmed = raw.trim();
    let digits = match trimmed.split_once('.') {
        Some((int, frac)) if frac.chars().all(|c| c == '0') => int,
        _ => trimmed,
    };

    if digits.is_empty() {
        return Err(FipsError::Empty);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FipsError::NonNumeric(trimmed.to_string()));
    }

    Ok(digits)
}

fn pad(digits: &str, width: usize) -> Option<String> {
    let significant = if digits.len() > width {
        digits.trim_start_matches('0')
    } else {
        digits
    };

    if significant.len() > width {
        return None;
    }

    Some(format!("{significant:0>width$}"))
}

impl fmt::Display for Fips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fips {
    type Err = FipsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fips::parse(s)
    }
}

impl TryFrom<String> for Fips {
    type Error = FipsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fips::parse(&value)
    }
}

impl From<Fips> for String {
    fn from(fips: Fips) -> Self {
        fips.0
    }
}

// ============================================================================
// STATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsState {
    /// 2-digit FIPS prefix
    pub fips: &'static str,
    pub abbr: &'static str,
    pub name: &'static str,
}

const fn state(fips: &'static str, abbr: &'static str, name: &'static str) -> UsState {
    UsState { fips, abbr, name }
}

/// 50 states, DC and Puerto Rico
pub const STATES: &[UsState] = &[
    state("01", "AL", "Alabama"),
    state("02", "AK", "Alaska"),
    state("04", "AZ", "Arizona"),
    state("05", "AR", "Arkansas"),
    state("06", "CA", "California"),
    state("08", "CO", "Colorado"),
    state("09", "CT", "Connecticut"),
    state("10", "DE", "Delaware"),
    state("11", "DC", "District of Columbia"),
    state("12", "FL", "Florida"),
    state("13", "GA", "Georgia"),
    state("15", "HI", "Hawaii"),
    state("16", "ID", "Idaho"),
    state("17", "IL", "Illinois"),
    state("18", "IN", "Indiana"),
    state("19", "IA", "Iowa"),
    state("20", "KS", "Kansas"),
    state("21", "KY", "Kentucky"),
    state("22", "LA", "Louisiana"),
    state("23", "ME", "Maine"),
    state("24", "MD", "Maryland"),
    state("25", "MA", "Massachusetts"),
    state("26", "MI", "Michigan"),
    state("27", "MN", "Minnesota"),
    state("28", "MS", "Mississippi"),
    state("29", "MO", "Missouri"),
    state("30", "MT", "Montana"),
    state("31", "NE", "Nebraska"),
    state("32", "NV", "Nevada"),
    state("33", "NH", "New Hampshire"),
    state("34", "NJ", "New Jersey"),
    state("35", "NM", "New Mexico"),
    state("36", "NY", "New York"),
    state("37", "NC", "North Carolina"),
    state("38", "ND", "North Dakota"),
    state("39", "OH", "Ohio"),
    state("40", "OK", "Oklahoma"),
    state("41", "OR", "Oregon"),
    state("42", "PA", "Pennsylvania"),
    state("44", "RI", "Rhode Island"),
    state("45", "SC", "South Carolina"),
    state("46", "SD", "South Dakota"),
    state("47", "TN", "Tennessee"),
    state("48", "TX", "Texas"),
    state("49", "UT", "Utah"),
    state("50", "VT", "Vermont"),
    state("51", "VA", "Virginia"),
    state("53", "WA", "Washington"),
    state("54", "WV", "West Virginia"),
    state("55", "WI", "Wisconsin"),
    state("56", "WY", "Wyoming"),
    state("72", "PR", "Puerto Rico"),
];

pub fn state_by_abbr(abbr: &str) -> Option<&'static UsState> {
    let abbr = abbr.trim();
    STATES.iter().find(|s| s.abbr.eq_ignore_ascii_case(abbr))
}

pub fn state_by_name(name: &str) -> Option<&'static UsState> {
    let name = name.trim();
    STATES.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

pub fn state_by_fips(code: &str) -> Option<&'static UsState> {
    let code = pad(code_digits(code).ok()?, 2)?;
    STATES.iter().find(|s| s.fips == code)
}

/// Abbreviation or full name
pub fn resolve_state(text: &str) -> Option<&'static UsState> {
    state_by_abbr(text).or_else(|| state_by_name(text))
}

// ============================================================================
// COUNTY NAMES
// ============================================================================

/// Matching form of a county name: "St. Louis County, MO" → "st louis county"
pub fn normalize_county_name(name: &str) -> String {
    let without_state = match name.split_once(',') {
        Some((head, _)) => head,
        None => name,
    };

    without_state
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split a Census area label into county and state parts
///
/// `".Autauga County, Alabama"` → `("Autauga County", Some("Alabama"))`
pub fn split_area_name(area: &str) -> (&str, Option<&str>) {
    let area = area.trim().trim_start_matches('.').trim();

    match area.rsplit_once(',') {
        Some((county, state)) => {
            let state = state.trim();
            (county.trim(), (!state.is_empty()).then_some(state))
        }
        None => (area, None),
    }
}

// ============================================================================
// KEY RECONCILIATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyMiss {
    UnknownState,
    NoSuchCounty,
    /// Two counties share the normalized name within one state
    Ambiguous,
}

/// Name → FIPS lookup scoped by state
///
/// County names repeat across states, so every lookup needs the state too.
/// A (state, name) pair claimed by two different codes never resolves.
#[derive(Debug, Default, Clone)]
pub struct CountyKeyIndex {
    by_name: HashMap<(String, String), Fips>,
    ambiguous: HashSet<(String, String)>,
    known: HashSet<Fips>,
}

impl CountyKeyIndex {
    pub fn build<'a, I>(counties: I) -> Self
    where
        I: IntoIterator<Item = &'a County>,
    {
        let mut index = Self::default();

        for county in counties {
            index.known.insert(county.fips_code.clone());

            let Some(state) = resolve_state(&county.state) else {
                log::debug!(
                    "County {} has unrecognized state '{}', reachable by code only",
                    county.fips_code,
                    county.state
                );
                continue;
            };

            let key = (state.abbr.to_string(), normalize_county_name(&county.county_name));
            if index.ambiguous.contains(&key) {
                continue;
            }

            match index.by_name.get(&key).cloned() {
                Some(existing) if existing == county.fips_code => {}
                Some(existing) => {
                    log::warn!(
                        "'{}' in {} names both {} and {}; excluded from name matching",
                        key.1,
                        key.0,
                        existing,
                        county.fips_code
                    );
                    index.by_name.remove(&key);
                    index.ambiguous.insert(key);
                }
                None => {
                    index.by_name.insert(key, county.fips_code.clone());
                }
            }
        }

        index
    }

    /// Look up a county by state (abbreviation or name) and county name
    pub fn resolve(&self, state: &str, county_name: &str) -> Result<Fips, KeyMiss> {
        let state = resolve_state(state).ok_or(KeyMiss::UnknownState)?;
        let key = (state.abbr.to_string(), normalize_county_name(county_name));

        if self.ambiguous.contains(&key) {
            return Err(KeyMiss::Ambiguous);
        }

        self.by_name.get(&key).cloned().ok_or(KeyMiss::NoSuchCounty)
    }

    pub fn contains(&self, fips: &Fips) -> bool {
        self.known.contains(fips)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Outcome counts for one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MatchStats {
    pub matched: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub unmatched_labels: BTreeSet<String>,
}

impl MatchStats {
    pub fn record(&mut self, label: &str, outcome: &Result<Fips, KeyMiss>) {
        match outcome {
            Ok(_) => self.matched += 1,
            Err(KeyMiss::Ambiguous) => {
                self.ambiguous += 1;
                self.unmatched_labels.insert(label.to_string());
            }
            Err(_) => {
                self.unmatched += 1;
                self.unmatched_labels.insert(label.to_string());
            }
        }
    }

    pub fn total(&self) -> usize {
        self.matched + self.unmatched + self.ambiguous
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        self.matched as f64 / total as f64
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} matched ({:.1}%), {} unmatched, {} ambiguous",
            self.matched,
            self.total(),
            self.success_rate() * 100.0,
            self.unmatched,
            self.ambiguous
        )
    }
}
