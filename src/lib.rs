//! Attendance census engine.
//!
//! Attendance CSV exports go in; a census workbook comes out. The stages are
//! [`ingest`], [`reconcile`], [`aggregate`] and [`render`], driven in order by
//! [`pipeline::Pipeline`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod warning;

pub use config::{CensusConfig, ReportPeriod};
pub use error::{IngestError, PipelineError, RenderError};
pub use model::{AttendanceRecord, SourceFile, Status};
pub use pipeline::{CensusReport, Pipeline, PipelineStage, process};
pub use warning::Warning;
