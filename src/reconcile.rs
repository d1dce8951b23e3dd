//! Merges per-file record batches into one canonical dataset.
//!
//! Batches are consumed strictly in input-file order and rows within a batch
//! in file order, so "later" is always well defined and the result is
//! reproducible for a given file ordering.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{AttendanceRecord, RecordKey, RecordOrigin, Status};

/// How two records with the same key but different statuses are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The later-ingested record wins.
    #[default]
    LastFileWins,
    /// The more restrictive status wins (Absent > Excused > Late > Present >
    /// Unknown); ties go to the later record.
    MostRestrictive,
}

impl ConflictPolicy {
    fn incoming_wins(self, current: Status, incoming: Status) -> bool {
        match self {
            ConflictPolicy::LastFileWins => true,
            ConflictPolicy::MostRestrictive => {
                incoming.restrictiveness() >= current.restrictiveness()
            }
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::LastFileWins => f.write_str("last_file_wins"),
            ConflictPolicy::MostRestrictive => f.write_str("most_restrictive"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "last_file_wins" | "last_wins" => Ok(ConflictPolicy::LastFileWins),
            "most_restrictive" => Ok(ConflictPolicy::MostRestrictive),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected last_file_wins or most_restrictive)"
            )),
        }
    }
}

/// A recorded decision between two records sharing one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictWarning {
    pub key: RecordKey,
    pub previous: Status,
    pub previous_origin: RecordOrigin,
    pub incoming: Status,
    pub incoming_origin: RecordOrigin,
    pub chosen: Status,
}

impl fmt::Display for ConflictWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conflict for {}: {} ({}) -> {} ({}); kept {}",
            self.key,
            self.previous,
            self.previous_origin,
            self.incoming,
            self.incoming_origin,
            self.chosen
        )
    }
}

/// Exactly one record per (individual, group, date).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalDataset {
    records: BTreeMap<RecordKey, AttendanceRecord>,
}

impl CanonicalDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&AttendanceRecord> {
        self.records.get(key)
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &AttendanceRecord> {
        self.records.values()
    }
}

impl FromIterator<AttendanceRecord> for CanonicalDataset {
    /// Builds a dataset where later records replace earlier ones silently.
    /// Use [`reconcile`] when conflicts must be reported.
    fn from_iter<T: IntoIterator<Item = AttendanceRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().map(|r| (r.key(), r)).collect(),
        }
    }
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub dataset: CanonicalDataset,
    pub conflicts: Vec<ConflictWarning>,
    /// Repeated rows with an identical status, folded into one.
    pub duplicates_merged: usize,
}

/// Merges batches given in input-file order.
///
/// Every input record is either included, folded into an identical
/// duplicate, or accounted for by a [`ConflictWarning`].
pub fn reconcile(batches: &[Vec<AttendanceRecord>], policy: ConflictPolicy) -> Reconciliation {
    let mut records: BTreeMap<RecordKey, AttendanceRecord> = BTreeMap::new();
    let mut conflicts = Vec::new();
    let mut duplicates_merged = 0;

    for record in batches.iter().flatten() {
        match records.entry(record.key()) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.status() == record.status() {
                    duplicates_merged += 1;
                    slot.insert(record.clone());
                    continue;
                }

                let incoming_wins = policy.incoming_wins(current.status(), record.status());
                let chosen = if incoming_wins {
                    record.status()
                } else {
                    current.status()
                };
                conflicts.push(ConflictWarning {
                    key: record.key(),
                    previous: current.status(),
                    previous_origin: current.origin().clone(),
                    incoming: record.status(),
                    incoming_origin: record.origin().clone(),
                    chosen,
                });
                if incoming_wins {
                    slot.insert(record.clone());
                }
            }
        }
    }

    debug!(
        records = records.len(),
        conflicts = conflicts.len(),
        duplicates_merged,
        %policy,
        "Reconciled batches"
    );

    Reconciliation {
        dataset: CanonicalDataset { records },
        conflicts,
        duplicates_merged,
    }
}
