//! Batch orchestration: ingest → reconcile → aggregate → render.
//!
//! [`Pipeline`] walks the stages of [`PipelineStage`] one way and keeps what
//! each stage produced, so a partially processed batch can be inspected.
//! [`process`] runs a whole batch in one call.

mod stage;

pub use stage::PipelineStage;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::aggregate::types::{GrandTotals, GroupDateSummary, IndividualTotals};
use crate::aggregate::{self, Aggregation, detail_sheets};
use crate::config::{CensusConfig, ReportPeriod};
use crate::error::{IngestError, PipelineError, Result};
use crate::ingest::{self, IngestOptions, IngestOutcome};
use crate::model::{AttendanceRecord, SourceFile};
use crate::reconcile::{self, CanonicalDataset};
use crate::render::ReportRenderer;
use crate::warning::Warning;

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Ingested {
        filename: String,
        records: usize,
        warnings: usize,
    },
    Rejected {
        filename: String,
        reason: String,
    },
}

impl FileOutcome {
    pub fn filename(&self) -> &str {
        match self {
            FileOutcome::Ingested { filename, .. } | FileOutcome::Rejected { filename, .. } => {
                filename
            }
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, FileOutcome::Rejected { .. })
    }
}

/// The finished report: the data behind every sheet plus the workbook bytes.
#[derive(Debug, Clone)]
pub struct CensusReport {
    summary_sheet: Vec<GroupDateSummary>,
    detail_sheets: BTreeMap<String, Vec<IndividualTotals>>,
    totals: GrandTotals,
    generated_at: DateTime<Utc>,
    period: Option<ReportPeriod>,
    title: String,
    warnings: Vec<Warning>,
    file_outcomes: Vec<FileOutcome>,
    workbook: Vec<u8>,
}

impl CensusReport {
    /// Ordered by (group, date).
    pub fn summary_sheet(&self) -> &[GroupDateSummary] {
        &self.summary_sheet
    }

    /// Group id to its individuals, ordered by (name, id).
    pub fn detail_sheets(&self) -> &BTreeMap<String, Vec<IndividualTotals>> {
        &self.detail_sheets
    }

    pub fn totals(&self) -> &GrandTotals {
        &self.totals
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn period(&self) -> Option<ReportPeriod> {
        self.period
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Warnings as display strings, in the order they were raised.
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    pub fn file_outcomes(&self) -> &[FileOutcome] {
        &self.file_outcomes
    }

    /// XLSX bytes.
    pub fn workbook(&self) -> &[u8] {
        &self.workbook
    }

    pub fn into_workbook(self) -> Vec<u8> {
        self.workbook
    }

    /// `Census_<Month>_<Year>_<timestamp>.xlsx`, or `Census_<timestamp>.xlsx`
    /// when the batch has no single reporting month.
    pub fn file_name(&self) -> String {
        let stamp = self.generated_at.format("%Y%m%dT%H%M%SZ");
        match self.period {
            Some(period) => format!("Census_{}_{}_{stamp}.xlsx", period.month_name(), period.year()),
            None => format!("Census_{stamp}.xlsx"),
        }
    }
}

/// One batch run. Stage methods must be called in order; each returns
/// [`PipelineError::InvalidTransition`] otherwise.
#[derive(Debug)]
pub struct Pipeline {
    config: CensusConfig,
    stage: PipelineStage,
    file_outcomes: Vec<FileOutcome>,
    warnings: Vec<Warning>,
}

impl Pipeline {
    pub fn new(config: CensusConfig) -> Self {
        Self {
            config,
            stage: PipelineStage::Idle,
            file_outcomes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn file_outcomes(&self) -> &[FileOutcome] {
        &self.file_outcomes
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn config(&self) -> &CensusConfig {
        &self.config
    }

    fn advance(&mut self, to: PipelineStage) -> Result<()> {
        if !self.stage.can_advance_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        debug!(from = %self.stage, to = %to, "Pipeline stage transition");
        self.stage = to;
        Ok(())
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!(stage = %self.stage, error = %err, "Pipeline failed");
        self.stage = PipelineStage::Failed;
        err
    }

    /// Runs every stage on `files`.
    pub async fn run(mut self, files: Vec<SourceFile>) -> Result<CensusReport> {
        let batches = self.ingest(files).await?;
        let dataset = self.reconcile(&batches)?;
        let aggregation = self.aggregate(&dataset)?;
        self.render(aggregation)
    }

    /// Ingests every file concurrently and returns the record batches of the
    /// files that parsed, in input order.
    ///
    /// Fails with [`PipelineError::InputCount`] before any work when the
    /// file count is outside `1..=max_files`, and with
    /// [`PipelineError::AllFilesInvalid`] when no file could be ingested.
    pub async fn ingest(&mut self, files: Vec<SourceFile>) -> Result<Vec<Vec<AttendanceRecord>>> {
        if self.stage != PipelineStage::Idle {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to: PipelineStage::Ingesting,
            });
        }
        let count = files.len();
        let max = self.config.max_files;
        if count == 0 || count > max {
            return Err(self.fail(PipelineError::InputCount { count, max }));
        }
        self.advance(PipelineStage::Ingesting)?;
        info!(files = count, concurrency = self.config.concurrency, "Ingesting files");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let options = Arc::new(IngestOptions::from(&self.config));
        let mut tasks = Vec::with_capacity(count);

        for file in files {
            let sem = semaphore.clone();
            let options = options.clone();
            let filename = file.filename.clone();
            let span = info_span!("ingest_file", filename = %file.filename, bytes = file.content.len());

            let task = tokio::spawn(
                async move {
                    // The semaphore is never closed, so a permit is always granted.
                    let _permit = sem.acquire_owned().await.ok();
                    let result = tokio::task::spawn_blocking(move || {
                        ingest::ingest(&file.content, &file.filename, &options)
                    })
                    .await;
                    match &result {
                        Ok(Ok(outcome)) => debug!(
                            records = outcome.records.len(),
                            warnings = outcome.warnings.len(),
                            "File ingested"
                        ),
                        Ok(Err(e)) => warn!(error = %e, "File rejected"),
                        Err(e) => error!(error = %e, "Ingestion task failed"),
                    }
                    result
                }
                .instrument(span),
            );
            tasks.push((filename, task));
        }

        let mut batches = Vec::with_capacity(count);
        let mut failures = Vec::new();

        // Awaiting in input order keeps reconciliation order independent of
        // completion order.
        for (filename, task) in tasks {
            match task_outcome(task.await) {
                Ok(outcome) => {
                    self.file_outcomes.push(FileOutcome::Ingested {
                        filename,
                        records: outcome.records.len(),
                        warnings: outcome.warnings.len(),
                    });
                    self.warnings
                        .extend(outcome.warnings.into_iter().map(Warning::from));
                    batches.push(outcome.records);
                }
                Err(reason) => {
                    failures.push(format!("{filename}: {reason}"));
                    self.warnings.push(Warning::FileRejected {
                        filename: filename.clone(),
                        reason: reason.clone(),
                    });
                    self.file_outcomes
                        .push(FileOutcome::Rejected { filename, reason });
                }
            }
        }

        if batches.is_empty() {
            return Err(self.fail(PipelineError::AllFilesInvalid { failures }));
        }

        info!(
            ingested = batches.len(),
            rejected = failures.len(),
            records = batches.iter().map(Vec::len).sum::<usize>(),
            "Ingestion complete"
        );
        Ok(batches)
    }

    /// Merges the batches returned by [`Pipeline::ingest`].
    pub fn reconcile(&mut self, batches: &[Vec<AttendanceRecord>]) -> Result<CanonicalDataset> {
        self.advance(PipelineStage::Reconciling)?;
        let outcome = reconcile::reconcile(batches, self.config.conflict_policy);
        if !outcome.conflicts.is_empty() {
            warn!(conflicts = outcome.conflicts.len(), "Conflicting records resolved");
        }
        info!(
            records = outcome.dataset.len(),
            conflicts = outcome.conflicts.len(),
            duplicates_merged = outcome.duplicates_merged,
            "Reconciliation complete"
        );
        self.warnings
            .extend(outcome.conflicts.into_iter().map(Warning::from));
        Ok(outcome.dataset)
    }

    pub fn aggregate(&mut self, dataset: &CanonicalDataset) -> Result<Aggregation> {
        self.advance(PipelineStage::Aggregating)?;
        let aggregation = aggregate::aggregate(dataset);
        self.warnings.extend(aggregation.warnings.iter().cloned());
        info!(
            summaries = aggregation.summaries.len(),
            individuals = aggregation.individuals.len(),
            "Aggregation complete"
        );
        Ok(aggregation)
    }

    /// Renders the workbook and finishes the run.
    pub fn render(&mut self, aggregation: Aggregation) -> Result<CensusReport> {
        self.advance(PipelineStage::Rendering)?;

        let generated_at = Utc::now();
        let period = self
            .config
            .period
            .or_else(|| single_period(&aggregation.summaries));
        let title = report_title(period, &aggregation.summaries);
        let details = detail_sheets(&aggregation.individuals);

        let renderer = ReportRenderer::from_config(&self.config)
            .with_title(title.clone())
            .generated_at(generated_at);
        let workbook = match renderer.render(&aggregation.summaries, &details, &self.warnings) {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.advance(PipelineStage::Done)?;
        info!(
            title = %title,
            bytes = workbook.len(),
            warnings = self.warnings.len(),
            "Report rendered"
        );

        Ok(CensusReport {
            summary_sheet: aggregation.summaries,
            detail_sheets: details,
            totals: aggregation.totals,
            generated_at,
            period,
            title,
            warnings: self.warnings.clone(),
            file_outcomes: self.file_outcomes.clone(),
            workbook,
        })
    }
}

/// Runs the full pipeline over `files`, in the given order.
pub async fn process(files: Vec<SourceFile>, config: &CensusConfig) -> Result<CensusReport> {
    Pipeline::new(config.clone()).run(files).await
}

type ParseResult = std::result::Result<IngestOutcome, IngestError>;

/// Collapses a finished ingestion task into its outcome or a rejection
/// reason. A task that panicked or was cancelled rejects its file.
fn task_outcome(
    joined: std::result::Result<std::result::Result<ParseResult, JoinError>, JoinError>,
) -> std::result::Result<IngestOutcome, String> {
    match joined {
        Ok(Ok(Ok(outcome))) => Ok(outcome),
        Ok(Ok(Err(e))) => Err(reject_reason(&e)),
        Ok(Err(e)) | Err(e) => Err(format!("ingestion task failed: {e}")),
    }
}

fn reject_reason(err: &IngestError) -> String {
    match err {
        IngestError::Schema { missing, .. } => {
            format!("missing required column(s): {}", missing.join(", "))
        }
        IngestError::Csv { source, .. } => format!("unreadable CSV: {source}"),
    }
}

/// The month every summarised date falls in, if there is exactly one.
fn single_period(summaries: &[GroupDateSummary]) -> Option<ReportPeriod> {
    let first = ReportPeriod::of(summaries.first()?.date);
    summaries
        .iter()
        .all(|s| first.contains(s.date))
        .then_some(first)
}

fn report_title(period: Option<ReportPeriod>, summaries: &[GroupDateSummary]) -> String {
    if let Some(period) = period {
        return format!("Census Report: {}", period.label());
    }
    let first = summaries.iter().map(|s| s.date).min();
    let last = summaries.iter().map(|s| s.date).max();
    match (first, last) {
        (Some(first), Some(last)) => format!(
            "Census Report: {} to {}",
            display_date(first),
            display_date(last)
        ),
        _ => "Census Report".to_string(),
    }
}

fn display_date(date: NaiveDate) -> String {
    format!("{} {}, {}", date.format("%B"), date.day(), date.year())
}
