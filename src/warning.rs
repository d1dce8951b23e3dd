//! Recoverable issues collected over a run and surfaced with the report.

use std::fmt;

use serde::Serialize;

use crate::reconcile::ConflictWarning;

/// A row- or file-level parsing note. `line` is `None` for file-level notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub filename: String,
    pub line: Option<u64>,
    pub reason: String,
}

impl ParseWarning {
    pub fn row(filename: &str, line: u64, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            line: Some(line),
            reason: reason.into(),
        }
    }

    pub fn file(filename: &str, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            line: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} line {}: {}", self.filename, line, self.reason),
            None => write!(f, "{}: {}", self.filename, self.reason),
        }
    }
}

/// Everything that went wrong without stopping the batch, in the order it
/// was observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    Parse(ParseWarning),
    Conflict(ConflictWarning),
    /// A whole file was excluded (schema error or failed task).
    FileRejected { filename: String, reason: String },
    /// Aggregation fallback, e.g. a rate over zero sessions.
    Aggregate { message: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Parse(w) => w.fmt(f),
            Warning::Conflict(w) => w.fmt(f),
            Warning::FileRejected { filename, reason } => {
                write!(f, "{filename}: file excluded: {reason}")
            }
            Warning::Aggregate { message } => f.write_str(message),
        }
    }
}

impl From<ParseWarning> for Warning {
    fn from(w: ParseWarning) -> Self {
        Warning::Parse(w)
    }
}

impl From<ConflictWarning> for Warning {
    fn from(w: ConflictWarning) -> Self {
        Warning::Conflict(w)
    }
}
