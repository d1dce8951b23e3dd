//! XLSX rendering of the census report.
//!
//! One `Summary` sheet, one sheet per group and a `Notes` sheet. The
//! highlight threshold is a renderer setting fed from configuration; the
//! layout code only asks [`GroupDateSummary::exceeds`].

mod detail;
mod notes;
mod summary;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook};
use tracing::debug;

use crate::aggregate::types::{GroupDateSummary, IndividualTotals};
use crate::config::{CensusConfig, DEFAULT_HIGHLIGHT_THRESHOLD};
use crate::error::RenderError;
use crate::model::Status;
use crate::warning::Warning;

pub const SUMMARY_SHEET: &str = "Summary";
pub const NOTES_SHEET: &str = "Notes";

/// Excel's sheet-name limit.
const MAX_SHEET_NAME: usize = 31;

/// Excel's column limit per worksheet.
pub const MAX_COLUMNS: usize = 16_384;

/// Sheet names Excel keeps for itself.
const RESERVED_SHEET_NAMES: [&str; 1] = ["History"];

/// Shown wherever enrollment figures appear.
pub const ENROLLMENT_NOTE: &str = "Total Enrolled counts individuals with any record for the group on that date. \
     It is derived from the uploaded records; no enrollment roster is used.";

/// Builds the workbook bytes for one report.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    threshold: f64,
    title: String,
    organization: Option<String>,
    header_lines: Vec<String>,
    payer_partition: Option<String>,
    generated_at: DateTime<Utc>,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_THRESHOLD)
    }
}

impl ReportRenderer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            title: "Census Report".to_string(),
            organization: None,
            header_lines: Vec::new(),
            payer_partition: None,
            generated_at: Utc::now(),
        }
    }

    /// Renderer carrying the configured threshold and letterhead.
    pub fn from_config(config: &CensusConfig) -> Self {
        Self::new(config.highlight_threshold)
            .with_organization(config.organization.clone())
            .with_header_lines(config.header_lines.clone())
            .with_payer_partition(config.payer_partition.clone())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    pub fn with_header_lines(mut self, lines: Vec<String>) -> Self {
        self.header_lines = lines;
        self
    }

    /// Lists individuals whose payer source contains `keyword` in a
    /// separate section of each census grid.
    pub fn with_payer_partition(mut self, keyword: Option<String>) -> Self {
        self.payer_partition = keyword.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = at;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Renders the summary, one detail sheet per group and the notes sheet.
    pub fn render(
        &self,
        summaries: &[GroupDateSummary],
        details: &BTreeMap<String, Vec<IndividualTotals>>,
        warnings: &[Warning],
    ) -> Result<Vec<u8>, RenderError> {
        let mut workbook = Workbook::new();
        let formats = Formats::new();

        summary::write(&mut workbook, self, &formats, summaries)?;

        let names = sheet_names(details.keys().map(String::as_str));
        for ((group_id, individuals), name) in details.iter().zip(&names) {
            detail::write(
                &mut workbook,
                &formats,
                name,
                group_id,
                individuals,
                self.payer_partition.as_deref(),
            )?;
        }

        notes::write(&mut workbook, self, &formats, warnings)?;

        let bytes = workbook.save_to_buffer().map_err(RenderError::Workbook)?;
        debug!(
            rows = summaries.len(),
            groups = details.len(),
            bytes = bytes.len(),
            "Rendered workbook"
        );
        Ok(bytes)
    }
}

/// Reusable cell formats.
pub(crate) struct Formats {
    pub title: Format,
    pub subtitle: Format,
    pub header: Format,
    pub text: Format,
    pub integer: Format,
    pub percent: Format,
    pub flagged_text: Format,
    pub flagged_integer: Format,
    pub flagged_percent: Format,
    pub total_text: Format,
    pub total_integer: Format,
    pub total_percent: Format,
    pub note: Format,
    pub section: Format,
    status: [Format; 5],
}

impl Formats {
    fn new() -> Self {
        let bordered = Format::new().set_border(FormatBorder::Thin);
        let flagged = bordered.clone().set_background_color(0xFFC7CE).set_font_color(0x9C0006);
        let total = bordered.clone().set_bold().set_background_color(0xE2EFDA);

        Self {
            title: Format::new().set_bold().set_font_size(14),
            subtitle: Format::new().set_italic(),
            header: Format::new()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_text_wrap()
                .set_background_color(0x4472C4)
                .set_font_color(0xFFFFFF)
                .set_border(FormatBorder::Thin),
            text: bordered.clone(),
            integer: bordered.clone().set_num_format("0"),
            percent: bordered.clone().set_num_format("0.0%"),
            flagged_text: flagged.clone(),
            flagged_integer: flagged.clone().set_num_format("0"),
            flagged_percent: flagged.set_num_format("0.0%"),
            total_text: total.clone(),
            total_integer: total.clone().set_num_format("0"),
            total_percent: total.set_num_format("0.0%"),
            note: Format::new().set_italic().set_text_wrap(),
            section: Format::new()
                .set_bold()
                .set_font_color(0x0000FF)
                .set_background_color(0xDDEBF7)
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin),
            status: Status::ALL.map(|status| {
                bordered
                    .clone()
                    .set_align(FormatAlign::Center)
                    .set_background_color(status_fill(status))
            }),
        }
    }

    pub fn status(&self, status: Status) -> &Format {
        let idx = match status {
            Status::Present => 0,
            Status::Absent => 1,
            Status::Excused => 2,
            Status::Late => 3,
            Status::Unknown => 4,
        };
        &self.status[idx]
    }
}

fn status_fill(status: Status) -> u32 {
    match status {
        Status::Present => 0xC6EFCE,
        Status::Absent => 0xFFC7CE,
        Status::Excused => 0xFFEB9C,
        Status::Late => 0xF8CBAD,
        Status::Unknown => 0xD9D9D9,
    }
}

/// Excel-safe, unique sheet names for the given group ids, in order.
///
/// Forbidden characters become `_`, names are cut to 31 characters and
/// collisions (case-insensitive, including the fixed and reserved sheets)
/// get a ` (n)` suffix.
pub fn sheet_names<'a>(groups: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken: HashSet<String> = [SUMMARY_SHEET, NOTES_SHEET]
        .iter()
        .chain(RESERVED_SHEET_NAMES.iter())
        .map(|s| s.to_lowercase())
        .collect();
    let mut names = Vec::new();

    for group in groups {
        let base = sanitize_sheet_name(group);
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate.to_lowercase()) {
            let suffix = format!(" ({n})");
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            candidate = format!("{}{suffix}", truncate_chars(&base, keep));
            n += 1;
        }
        taken.insert(candidate.to_lowercase());
        names.push(candidate);
    }
    names
}

fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').trim();
    if cleaned.is_empty() {
        return "Group".to_string();
    }
    truncate_chars(cleaned, MAX_SHEET_NAME).trim_end().to_string()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
