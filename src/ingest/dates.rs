//! Date parsing for heterogeneous exports.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

/// Accepted formats, tried in order. US month-first beats day-first.
static DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

static FILENAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[-_]?(\d{2})[-_]?(\d{2})").expect("filename date pattern is valid")
});

/// Parses a date cell. A trailing time component (`2024-01-05 09:30`,
/// `2024-01-05T09:30:00`) is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(date) = parse_exact(s) {
        return Some(date);
    }
    let head = s.split(['T', ' ']).next().unwrap_or(s);
    if head != s {
        return parse_exact(head);
    }
    None
}

fn parse_exact(s: &str) -> Option<NaiveDate> {
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return compact(s);
    }
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            // %Y happily reads "24" as year 24
            .filter(|d| d.year() >= 1000)
    })
}

/// `YYYYMMDD`
fn compact(s: &str) -> Option<NaiveDate> {
    let year = s.get(0..4)?.parse().ok()?;
    let month = s.get(4..6)?.parse().ok()?;
    let day = s.get(6..8)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Extracts a date embedded in a filename, e.g. `census_2025-03-04.csv`,
/// `2025_03_04 export.csv` or `20250304.csv`.
pub fn date_from_filename(filename: &str) -> Option<NaiveDate> {
    FILENAME_DATE.captures_iter(filename).find_map(|caps| {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}
