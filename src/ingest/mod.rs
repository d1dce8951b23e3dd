//! CSV ingestion: one file's bytes in, validated attendance records and
//! row-level warnings out.
//!
//! A file is rejected outright only when its header lacks the individual-id
//! column, or lacks a date column while its filename carries no date either.
//! Everything else (bad dates, odd statuses, ragged rows) is
//! skipped or defaulted row by row and reported as a [`ParseWarning`].

pub mod columns;
pub mod dates;
pub mod status;

use std::collections::HashMap;
use std::sync::Arc;

use csv::{ReaderBuilder, Trim};
use tracing::debug;

use crate::config::{CensusConfig, ReportPeriod};
use crate::error::IngestError;
use crate::model::{AttendanceRecord, RecordDetails, RecordOrigin, Status};
use crate::warning::ParseWarning;

use columns::{ColumnMap, detect_header};
use dates::{date_from_filename, parse_date};
use status::normalize_status;

/// The subset of [`CensusConfig`] the ingestor needs.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub default_group: String,
    /// Lower-cased raw code to canonical group id.
    pub group_aliases: HashMap<String, String>,
    pub period: Option<ReportPeriod>,
    pub header_scan_rows: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions::from(&CensusConfig::default())
    }
}

impl From<&CensusConfig> for IngestOptions {
    fn from(config: &CensusConfig) -> Self {
        Self {
            default_group: config.default_group.clone(),
            group_aliases: config
                .group_aliases
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
                .collect(),
            period: config.period,
            header_scan_rows: config.header_scan_rows,
        }
    }
}

impl IngestOptions {
    fn canonical_group(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return self.default_group.clone();
        }
        self.group_aliases
            .get(&raw.to_lowercase())
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }
}

/// Result of ingesting one file.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub records: Vec<AttendanceRecord>,
    pub warnings: Vec<ParseWarning>,
}

/// One file as raw CSV rows plus the records the reader could not decode.
struct RawTable {
    rows: Vec<RawRow>,
    parse_errors: Vec<(u64, String)>,
}

struct RawRow {
    line: u64,
    fields: Vec<String>,
}

impl RawTable {
    fn read(content: &[u8], filename: &str) -> Result<Self, IngestError> {
        let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content);

        let mut rows = Vec::new();
        let mut parse_errors = Vec::new();

        for (idx, result) in reader.byte_records().enumerate() {
            match result {
                Ok(record) => {
                    let fields: Vec<String> = record
                        .iter()
                        .map(|f| String::from_utf8_lossy(f).into_owned())
                        .collect();
                    if fields.iter().all(|f| f.is_empty()) {
                        continue;
                    }
                    let line = record
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(idx as u64 + 1);
                    rows.push(RawRow { line, fields });
                }
                Err(err) if err.is_io_error() => {
                    return Err(IngestError::Csv {
                        filename: filename.to_string(),
                        source: err,
                    });
                }
                Err(err) => {
                    let line = err
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(idx as u64 + 1);
                    parse_errors.push((line, err.to_string()));
                }
            }
        }

        Ok(Self { rows, parse_errors })
    }
}

/// Parses one CSV file into attendance records.
///
/// # Errors
///
/// Returns [`IngestError::Schema`] if no row within the scan window carries
/// an individual-id column, or if it has no date column and the filename
/// carries no date to stand in for one.
pub fn ingest(
    content: &[u8],
    filename: &str,
    options: &IngestOptions,
) -> Result<IngestOutcome, IngestError> {
    let table = RawTable::read(content, filename)?;
    let filename_date = date_from_filename(filename);

    let header_cells = table.rows.iter().map(|r| r.fields.as_slice());
    let detected = detect_header(header_cells, options.header_scan_rows, filename_date.is_some());
    let (header_idx, columns) = match detected {
        Ok(found) => found,
        Err(best) => {
            return Err(IngestError::Schema {
                filename: filename.to_string(),
                missing: best.missing_required(),
            });
        }
    };

    let mut warnings: Vec<ParseWarning> = table
        .parse_errors
        .iter()
        .map(|(line, reason)| ParseWarning::row(filename, *line, format!("malformed row: {reason}")))
        .collect();

    if let (None, Some(date)) = (columns.date, filename_date) {
        warnings.push(ParseWarning::file(
            filename,
            format!("no date column; date {date} taken from filename"),
        ));
    }
    if columns.status.is_none() {
        warnings.push(ParseWarning::file(
            filename,
            "no status column; all rows recorded as Unknown",
        ));
    }

    let mut parser = RowParser {
        filename,
        origin_file: Arc::from(filename),
        columns: &columns,
        options,
        fallback_date: filename_date,
        out_of_period: 0,
    };

    let data_rows = &table.rows[header_idx + 1..];
    let mut records = Vec::with_capacity(data_rows.len());
    for row in data_rows {
        if let Some(record) = parser.parse(row, &mut warnings) {
            records.push(record);
        }
    }

    if data_rows.is_empty() {
        warnings.push(ParseWarning::file(filename, "no data rows"));
    }
    if parser.out_of_period > 0 {
        if let Some(period) = options.period {
            warnings.push(ParseWarning::file(
                filename,
                format!(
                    "{} row(s) outside reporting period {} excluded",
                    parser.out_of_period, period
                ),
            ));
        }
    }

    debug!(
        filename,
        header_line = table.rows[header_idx].line,
        records = records.len(),
        warnings = warnings.len(),
        "File ingested"
    );

    Ok(IngestOutcome { records, warnings })
}

struct RowParser<'a> {
    filename: &'a str,
    origin_file: Arc<str>,
    columns: &'a ColumnMap,
    options: &'a IngestOptions,
    fallback_date: Option<chrono::NaiveDate>,
    out_of_period: usize,
}

impl RowParser<'_> {
    fn cell<'r>(&self, row: &'r RawRow, idx: Option<usize>) -> &'r str {
        idx.and_then(|i| row.fields.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    fn optional(&self, row: &RawRow, idx: Option<usize>) -> Option<String> {
        Some(self.cell(row, idx))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn details(&self, row: &RawRow) -> RecordDetails {
        let ur_comments = match (
            self.optional(row, self.columns.ur_comments),
            self.optional(row, self.columns.next_review),
        ) {
            (Some(ur), Some(next)) => Some(format!("{ur} - next review {next}")),
            (None, Some(next)) => Some(format!("next review {next}")),
            (ur, None) => ur,
        };
        RecordDetails {
            admit_date: self.optional(row, self.columns.admit_date),
            payer_source: self.optional(row, self.columns.payer_source),
            ur_comments,
            billing_comments: self.optional(row, self.columns.billing_comments),
        }
    }

    fn name(&self, row: &RawRow) -> String {
        let full = self.cell(row, self.columns.name);
        if !full.is_empty() {
            return full.to_string();
        }
        let first = self.cell(row, self.columns.first_name);
        let last = self.cell(row, self.columns.last_name);
        [first, last]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn parse(&mut self, row: &RawRow, warnings: &mut Vec<ParseWarning>) -> Option<AttendanceRecord> {
        let line = row.line;

        let raw_date = self.cell(row, self.columns.date);
        let date = if raw_date.is_empty() {
            match self.fallback_date {
                Some(date) => date,
                None => {
                    warnings.push(ParseWarning::row(self.filename, line, "missing date; row skipped"));
                    return None;
                }
            }
        } else {
            match parse_date(raw_date) {
                Some(date) => date,
                None => {
                    warnings.push(ParseWarning::row(
                        self.filename,
                        line,
                        format!("unparsable date '{raw_date}'; row skipped"),
                    ));
                    return None;
                }
            }
        };

        if let Some(period) = self.options.period {
            if !period.contains(date) {
                self.out_of_period += 1;
                return None;
            }
        }

        let name = self.name(row);
        let raw_id = self.cell(row, self.columns.individual_id);
        let individual_id = if !raw_id.is_empty() {
            raw_id.to_string()
        } else if let Some(derived) = derive_id(&name) {
            derived
        } else {
            warnings.push(ParseWarning::row(
                self.filename,
                line,
                "missing individual id and name; row skipped",
            ));
            return None;
        };
        let individual_name = if name.is_empty() {
            individual_id.clone()
        } else {
            name
        };

        let group_id = self
            .options
            .canonical_group(self.cell(row, self.columns.group));

        let status = if self.columns.status.is_none() {
            Status::Unknown
        } else {
            let raw_status = self.cell(row, self.columns.status);
            match normalize_status(raw_status) {
                Some(status) => status,
                None => {
                    let reason = if raw_status.is_empty() {
                        "blank status recorded as Unknown".to_string()
                    } else {
                        format!("unrecognised status '{raw_status}' recorded as Unknown")
                    };
                    warnings.push(ParseWarning::row(self.filename, line, reason));
                    Status::Unknown
                }
            }
        };

        Some(AttendanceRecord::new(
            individual_id,
            individual_name,
            group_id,
            date,
            status,
            RecordOrigin {
                filename: self.origin_file.clone(),
                line,
            },
        )
        .with_details(self.details(row)))
    }
}

/// `Last_First` from a full name with at least two words.
fn derive_id(name: &str) -> Option<String> {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.split_last() {
        Some((last, first)) if !first.is_empty() => Some(format!("{}_{}", last, first.join(" "))),
        _ => None,
    }
}
