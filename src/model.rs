//! Core attendance data types shared by every pipeline stage.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

/// Canonical attendance status.
///
/// Raw status text is only ever turned into this enum by
/// [`crate::ingest::status::normalize_status`], so every later stage can
/// match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Present,
    Absent,
    Excused,
    Late,
    Unknown,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Present,
        Status::Absent,
        Status::Excused,
        Status::Late,
        Status::Unknown,
    ];

    /// Single-character code used in the census grid.
    pub fn code(self) -> &'static str {
        match self {
            Status::Present => "P",
            Status::Absent => "A",
            Status::Excused => "E",
            Status::Late => "L",
            Status::Unknown => "?",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Present => "Present",
            Status::Absent => "Absent",
            Status::Excused => "Excused",
            Status::Late => "Late",
            Status::Unknown => "Unknown",
        }
    }

    /// Rank used by the most-restrictive conflict policy. Higher wins.
    pub fn restrictiveness(self) -> u8 {
        match self {
            Status::Absent => 4,
            Status::Excused => 3,
            Status::Late => 2,
            Status::Present => 1,
            Status::Unknown => 0,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a record came from: the input file and its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOrigin {
    pub filename: Arc<str>,
    pub line: u64,
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} line {}", self.filename, self.line)
    }
}

/// Uniqueness key of the canonical dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordKey {
    pub individual_id: String,
    pub group_id: String,
    pub date: NaiveDate,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "individual {} in {} on {}",
            self.individual_id, self.group_id, self.date
        )
    }
}

/// Administrative columns carried through to the census grid untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admit_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ur_comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_comments: Option<String>,
}

impl RecordDetails {
    pub fn is_empty(&self) -> bool {
        self.admit_date.is_none()
            && self.payer_source.is_none()
            && self.ur_comments.is_none()
            && self.billing_comments.is_none()
    }

    /// Fills every field still unset from `other`.
    pub fn fill_from(&mut self, other: &RecordDetails) {
        fn fill(slot: &mut Option<String>, value: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
        fill(&mut self.admit_date, &other.admit_date);
        fill(&mut self.payer_source, &other.payer_source);
        fill(&mut self.ur_comments, &other.ur_comments);
        fill(&mut self.billing_comments, &other.billing_comments);
    }
}

/// One attendance fact parsed from one CSV row. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    individual_id: String,
    individual_name: String,
    group_id: String,
    date: NaiveDate,
    status: Status,
    origin: RecordOrigin,
    #[serde(skip_serializing_if = "RecordDetails::is_empty")]
    details: RecordDetails,
}

impl AttendanceRecord {
    pub fn new(
        individual_id: impl Into<String>,
        individual_name: impl Into<String>,
        group_id: impl Into<String>,
        date: NaiveDate,
        status: Status,
        origin: RecordOrigin,
    ) -> Self {
        Self {
            individual_id: individual_id.into(),
            individual_name: individual_name.into(),
            group_id: group_id.into(),
            date,
            status,
            origin,
            details: RecordDetails::default(),
        }
    }

    pub fn with_details(mut self, details: RecordDetails) -> Self {
        self.details = details;
        self
    }

    pub fn individual_id(&self) -> &str {
        &self.individual_id
    }

    pub fn individual_name(&self) -> &str {
        &self.individual_name
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn origin(&self) -> &RecordOrigin {
        &self.origin
    }

    pub fn details(&self) -> &RecordDetails {
        &self.details
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            individual_id: self.individual_id.clone(),
            group_id: self.group_id.clone(),
            date: self.date,
        }
    }
}

/// One uploaded input: a filename and its raw bytes, as handed over by the
/// upload layer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Reads a file from disk, keeping only its file name as the label.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, content })
    }
}
