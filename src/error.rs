//! Error types for the census pipeline.
//!
//! Row-level problems are never errors: they travel as [`crate::warning::Warning`]s.
//! What remains here is either file-scoped ([`IngestError`]) or fatal for the
//! whole batch ([`PipelineError`]).

use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Result type alias using the pipeline error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure to ingest one file. Recoverable: the file is dropped from the batch.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Required columns could not be located in the header.
    #[error("{filename}: missing required column(s): {}", .missing.join(", "))]
    Schema {
        filename: String,
        missing: Vec<&'static str>,
    },

    /// The content could not be read as CSV at all.
    #[error("{filename}: unreadable CSV: {source}")]
    Csv {
        filename: String,
        #[source]
        source: csv::Error,
    },
}

impl IngestError {
    pub fn filename(&self) -> &str {
        match self {
            IngestError::Schema { filename, .. } | IngestError::Csv { filename, .. } => filename,
        }
    }
}

/// Failure to produce the workbook.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A write into a specific sheet failed.
    #[error("sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// A sheet would need more columns than a worksheet holds.
    #[error("sheet '{sheet}': {columns} columns exceed the worksheet limit of {max}")]
    TooWide {
        sheet: String,
        columns: usize,
        max: usize,
    },

    /// Serializing the finished workbook failed.
    #[error("failed to assemble workbook: {0}")]
    Workbook(#[source] rust_xlsxwriter::XlsxError),
}

impl RenderError {
    pub(crate) fn sheet(sheet: &str) -> impl Fn(rust_xlsxwriter::XlsxError) -> RenderError + '_ {
        move |source| RenderError::Sheet {
            sheet: sheet.to_string(),
            source,
        }
    }
}

/// Batch-fatal pipeline errors. No report is produced alongside any of these.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fewer than one or more than the configured maximum of files.
    #[error("expected between 1 and {max} input files, got {count}")]
    InputCount { count: usize, max: usize },

    /// Every input file was rejected during ingestion.
    #[error("all {} input file(s) failed ingestion: {}", .failures.len(), .failures.join("; "))]
    AllFilesInvalid { failures: Vec<String> },

    /// Workbook rendering failed.
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    /// A stage was entered out of order.
    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition {
        from: PipelineStage,
        to: PipelineStage,
    },
}

impl PipelineError {
    /// The stage the pipeline was in when this error halted it.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::InputCount { .. } => PipelineStage::Idle,
            PipelineError::AllFilesInvalid { .. } => PipelineStage::Ingesting,
            PipelineError::Render(_) => PipelineStage::Rendering,
            PipelineError::InvalidTransition { from, .. } => *from,
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
