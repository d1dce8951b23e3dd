//! Data types produced by the aggregation stage.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::utility::ratio;
use crate::model::{RecordDetails, Status};

/// Per-status tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub present: usize,
    pub absent: usize,
    pub excused: usize,
    pub late: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Present => self.present += 1,
            Status::Absent => self.absent += 1,
            Status::Excused => self.excused += 1,
            Status::Late => self.late += 1,
            Status::Unknown => self.unknown += 1,
        }
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Present => self.present,
            Status::Absent => self.absent,
            Status::Excused => self.excused,
            Status::Late => self.late,
            Status::Unknown => self.unknown,
        }
    }

    /// Absent + excused + late.
    pub fn non_attendance(&self) -> usize {
        self.absent + self.excused + self.late
    }

    /// Every record, including unknown.
    pub fn total(&self) -> usize {
        self.present + self.non_attendance() + self.unknown
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.present += other.present;
        self.absent += other.absent;
        self.excused += other.excused;
        self.late += other.late;
        self.unknown += other.unknown;
    }
}

/// Attendance for one group on one date.
///
/// `total_enrolled` counts individuals observed with any record that day;
/// there is no external roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDateSummary {
    pub group_id: String,
    pub date: NaiveDate,
    pub counts: StatusCounts,
    pub total_enrolled: usize,
}

impl GroupDateSummary {
    pub fn present_count(&self) -> usize {
        self.counts.present
    }

    pub fn absent_count(&self) -> usize {
        self.counts.absent
    }

    pub fn excused_count(&self) -> usize {
        self.counts.excused
    }

    pub fn late_count(&self) -> usize {
        self.counts.late
    }

    pub fn unknown_count(&self) -> usize {
        self.counts.unknown
    }

    /// (absent + excused + late) / total_enrolled, 0 when nobody is enrolled.
    pub fn non_attendance_ratio(&self) -> f64 {
        ratio(self.counts.non_attendance(), self.total_enrolled)
    }

    pub fn exceeds(&self, threshold: f64) -> bool {
        self.non_attendance_ratio() > threshold
    }
}

/// One individual's record within one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupAttendance {
    /// Status per session date.
    pub sessions: BTreeMap<NaiveDate, Status>,
    pub counts: StatusCounts,
    /// Distinct dates with any record for the whole group.
    pub group_sessions: usize,
}

impl GroupAttendance {
    pub fn status_on(&self, date: NaiveDate) -> Option<Status> {
        self.sessions.get(&date).copied()
    }
}

/// Totals for one individual across every group they appear in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualTotals {
    pub individual_id: String,
    pub individual_name: String,
    /// present / sessions held by the group, in [0, 1].
    pub per_group_attendance_rate: BTreeMap<String, f64>,
    pub attendance: BTreeMap<String, GroupAttendance>,
    /// First value seen for each pass-through column.
    #[serde(skip_serializing_if = "RecordDetails::is_empty")]
    pub details: RecordDetails,
}

impl IndividualTotals {
    pub fn rate(&self, group_id: &str) -> f64 {
        self.per_group_attendance_rate
            .get(group_id)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn group(&self, group_id: &str) -> Option<&GroupAttendance> {
        self.attendance.get(group_id)
    }

    /// Surname is the last word of the name, as census sheets list it.
    pub fn last_name(&self) -> &str {
        self.individual_name
            .split_whitespace()
            .last()
            .unwrap_or(&self.individual_name)
    }

    /// Everything before the surname; empty for one-word names.
    pub fn first_name(&self) -> String {
        let parts: Vec<&str> = self.individual_name.split_whitespace().collect();
        match parts.split_last() {
            Some((_, first)) => first.join(" "),
            None => String::new(),
        }
    }
}

/// Batch-wide totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GrandTotals {
    pub counts: StatusCounts,
    pub records: usize,
    pub individuals: usize,
    pub groups: usize,
    /// Distinct (group, date) pairs.
    pub sessions: usize,
}

impl GrandTotals {
    /// Sums a summary sheet.
    pub fn from_summaries(summaries: &[GroupDateSummary]) -> Self {
        let mut totals = GrandTotals::default();
        let mut groups = BTreeSet::new();
        for summary in summaries {
            totals.counts.merge(&summary.counts);
            totals.records += summary.total_enrolled;
            groups.insert(summary.group_id.as_str());
        }
        totals.groups = groups.len();
        totals.sessions = summaries.len();
        totals
    }
}
