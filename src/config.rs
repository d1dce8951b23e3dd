//! Run configuration.
//!
//! Defaults are overridden, in order, by an optional JSON file, by
//! `CENSUS_*` environment variables and finally by CLI flags:
//! ```json
//! {
//!   "max_files": 30,
//!   "highlight_threshold": 0.25,
//!   "period": "2025-03",
//!   "organization": "Glass House Recovery LLC",
//!   "group_aliases": { "SUD-PHP": "PHP" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reconcile::ConflictPolicy;

pub const DEFAULT_MAX_FILES: usize = 30;
pub const DEFAULT_HIGHLIGHT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CensusConfig {
    /// Upper bound on files per batch.
    pub max_files: usize,
    /// Non-attendance share above which a summary row is flagged.
    pub highlight_threshold: f64,
    pub conflict_policy: ConflictPolicy,
    /// Restricts the report to one calendar month.
    pub period: Option<ReportPeriod>,
    pub organization: Option<String>,
    /// Extra letterhead lines under the organization name.
    pub header_lines: Vec<String>,
    /// Group assigned when a file has no group column or a blank cell.
    pub default_group: String,
    /// Raw group code to canonical group id, matched case-insensitively.
    pub group_aliases: BTreeMap<String, String>,
    /// How many leading rows are searched for the header.
    pub header_scan_rows: usize,
    /// Parallel ingestion tasks.
    pub concurrency: usize,
    /// Individuals whose payer source contains this text (any case) are
    /// listed in their own section below the rest of each census grid.
    pub payer_partition: Option<String>,
}

impl Default for CensusConfig {
    fn default() -> Self {
        let group_aliases = [
            ("SUD-PHP", "PHP"),
            ("SUD-OP", "OP"),
            ("MH-PHP", "MHPHP"),
            ("MH-IOP", "MHIOP"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            max_files: DEFAULT_MAX_FILES,
            highlight_threshold: DEFAULT_HIGHLIGHT_THRESHOLD,
            conflict_policy: ConflictPolicy::default(),
            period: None,
            organization: None,
            header_lines: Vec::new(),
            default_group: "Ungrouped".to_string(),
            group_aliases,
            header_scan_rows: 10,
            concurrency: 4,
            payer_partition: Some("Medicaid".to_string()),
        }
    }
}

impl CensusConfig {
    /// Loads the config from a JSON file at `path`. Missing keys keep their defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Applies `CENSUS_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Applies `CENSUS_*` overrides from an arbitrary lookup.
    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("CENSUS_MAX_FILES") {
            self.max_files = parse_field("CENSUS_MAX_FILES", &v)?;
        }
        if let Some(v) = lookup("CENSUS_HIGHLIGHT_THRESHOLD") {
            self.highlight_threshold = parse_field("CENSUS_HIGHLIGHT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("CENSUS_PERIOD") {
            self.period = Some(parse_field("CENSUS_PERIOD", &v)?);
        }
        if let Some(v) = lookup("CENSUS_ORGANIZATION") {
            self.organization = Some(v);
        }
        if let Some(v) = lookup("CENSUS_CONFLICT_POLICY") {
            self.conflict_policy = parse_field("CENSUS_CONFLICT_POLICY", &v)?;
        }
        if let Some(v) = lookup("CENSUS_CONCURRENCY") {
            self.concurrency = parse_field("CENSUS_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("CENSUS_PAYER_PARTITION") {
            let v = v.trim();
            self.payer_partition = (!v.is_empty()).then(|| v.to_string());
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_files == 0 {
            return Err(ConfigError::Invalid {
                field: "max_files",
                reason: "must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.highlight_threshold) {
            return Err(ConfigError::Invalid {
                field: "highlight_threshold",
                reason: format!("{} is outside [0, 1]", self.highlight_threshold),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.default_group.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_group",
                reason: "must not be blank".into(),
            });
        }
        Ok(())
    }
}

fn parse_field<T>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: format!("'{raw}': {e}"),
    })
}

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportPeriod {
    year: i32,
    month: u32,
}

impl ReportPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn month_name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }

    /// "March 2025"
    pub fn label(&self) -> String {
        format!("{} {}", self.month_name(), self.year)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReportPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once(['-', '_', '/'])
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in '{s}'"))?;
        let month: u32 = month.parse().map_err(|_| format!("invalid month in '{s}'"))?;
        ReportPeriod::new(year, month).ok_or_else(|| format!("no such month: '{s}'"))
    }
}

impl TryFrom<String> for ReportPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportPeriod> for String {
    fn from(value: ReportPeriod) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = CensusConfig::default();
        assert_eq!(config.max_files, 30);
        assert_eq!(config.highlight_threshold, 0.3);
        assert_eq!(config.conflict_policy, ConflictPolicy::LastFileWins);
        assert_eq!(config.group_aliases.get("SUD-PHP").map(String::as_str), Some("PHP"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("census.json");
        std::fs::write(&path, r#"{"highlight_threshold": 0.5, "period": "2025-03"}"#).unwrap();

        let config = CensusConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.highlight_threshold, 0.5);
        assert_eq!(config.period, ReportPeriod::new(2025, 3));
        assert_eq!(config.max_files, 30);
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("census.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = CensusConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let vars: HashMap<&str, &str> = [
            ("CENSUS_MAX_FILES", "5"),
            ("CENSUS_HIGHLIGHT_THRESHOLD", "0.1"),
            ("CENSUS_CONFLICT_POLICY", "most_restrictive"),
            ("CENSUS_PERIOD", "2024-12"),
        ]
        .into_iter()
        .collect();

        let config = CensusConfig::default()
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_files, 5);
        assert_eq!(config.highlight_threshold, 0.1);
        assert_eq!(config.conflict_policy, ConflictPolicy::MostRestrictive);
        assert_eq!(config.period, ReportPeriod::new(2024, 12));
    }

    #[test]
    fn test_blank_payer_partition_env_disables_section() {
        assert_eq!(CensusConfig::default().payer_partition.as_deref(), Some("Medicaid"));
        let config = CensusConfig::default()
            .apply_vars(|k| (k == "CENSUS_PAYER_PARTITION").then(|| " ".to_string()))
            .unwrap();
        assert_eq!(config.payer_partition, None);
    }

    #[test]
    fn test_bad_env_value_names_the_variable() {
        let err = CensusConfig::default()
            .apply_vars(|k| (k == "CENSUS_MAX_FILES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CENSUS_MAX_FILES"));
    }

    #[test]
    fn test_threshold_outside_unit_interval_is_rejected() {
        let config = CensusConfig {
            highlight_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "highlight_threshold", .. })
        ));
    }

    #[test]
    fn test_period_parses_and_labels() {
        let period: ReportPeriod = "2025-03".parse().unwrap();
        assert_eq!(period.label(), "March 2025");
        assert_eq!(period.to_string(), "2025-03");
        assert!(period.contains(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()));
        assert!("2025-13".parse::<ReportPeriod>().is_err());
        assert!("March".parse::<ReportPeriod>().is_err());
    }
}
