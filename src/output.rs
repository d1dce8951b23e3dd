//! Delivery of a finished report: the workbook file, an optional flat CSV of
//! the summary sheet, and log output for the run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::types::{GrandTotals, GroupDateSummary};
use crate::pipeline::{CensusReport, FileOutcome};
use crate::warning::Warning;

/// One summary-sheet row, flattened for CSV.
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    group_id: &'a str,
    date: String,
    present: usize,
    absent: usize,
    excused: usize,
    late: usize,
    unknown: usize,
    total_enrolled: usize,
    non_attendance_ratio: f64,
    flagged: bool,
}

/// What the CLI reports about a run.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub title: &'a str,
    pub file_name: String,
    pub totals: &'a GrandTotals,
    pub files: &'a [FileOutcome],
    pub warnings: &'a [Warning],
}

impl<'a> RunSummary<'a> {
    pub fn new(report: &'a CensusReport) -> Self {
        Self {
            title: report.title(),
            file_name: report.file_name(),
            totals: report.totals(),
            files: report.file_outcomes(),
            warnings: report.warnings(),
        }
    }
}

/// Writes the workbook into `dir` under the report's file name.
pub fn write_report(dir: &Path, report: &CensusReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    let path = dir.join(report.file_name());
    fs::write(&path, report.workbook())
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), bytes = report.workbook().len(), "Wrote workbook");
    Ok(path)
}

/// Writes the summary sheet as CSV, header included. Overwrites `path`.
pub fn export_summary_csv(path: &Path, summaries: &[GroupDateSummary], threshold: f64) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    for summary in summaries {
        writer.serialize(SummaryRow {
            group_id: &summary.group_id,
            date: summary.date.to_string(),
            present: summary.present_count(),
            absent: summary.absent_count(),
            excused: summary.excused_count(),
            late: summary.late_count(),
            unknown: summary.unknown_count(),
            total_enrolled: summary.total_enrolled,
            non_attendance_ratio: summary.non_attendance_ratio(),
            flagged: summary.exceeds(threshold),
        })?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = summaries.len(), "Exported summary CSV");
    Ok(())
}

/// Logs the run summary line by line.
pub fn print_pretty(summary: &RunSummary<'_>) {
    info!(
        title = summary.title,
        file = %summary.file_name,
        records = summary.totals.records,
        individuals = summary.totals.individuals,
        groups = summary.totals.groups,
        "Report ready"
    );
    for outcome in summary.files {
        match outcome {
            FileOutcome::Ingested {
                filename,
                records,
                warnings,
            } => info!(filename = %filename, records, warnings, "Ingested"),
            FileOutcome::Rejected { filename, reason } => {
                warn!(filename = %filename, reason = %reason, "Rejected")
            }
        }
    }
    for warning in summary.warnings {
        warn!("{warning}");
    }
}

/// Logs the run summary as pretty-printed JSON.
pub fn print_json(summary: &RunSummary<'_>) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
