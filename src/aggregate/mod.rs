//! Attendance aggregation.
//!
//! Turns the canonical dataset into the per-group/date summary sheet and the
//! per-individual totals shown on each group's detail sheet.

pub mod types;
pub mod utility;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::model::RecordDetails;
use crate::reconcile::CanonicalDataset;
use crate::warning::Warning;
use types::{GrandTotals, GroupAttendance, GroupDateSummary, IndividualTotals, StatusCounts};
use utility::attendance_rate;

/// Output of [`aggregate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// Sorted by (group, date).
    pub summaries: Vec<GroupDateSummary>,
    /// Sorted by name, case-insensitively, then id.
    pub individuals: Vec<IndividualTotals>,
    pub totals: GrandTotals,
    pub warnings: Vec<Warning>,
}

#[derive(Default)]
struct IndividualAccumulator {
    name: Option<String>,
    details: RecordDetails,
    groups: BTreeMap<String, GroupAttendance>,
}

/// Aggregates a reconciled dataset.
pub fn aggregate(dataset: &CanonicalDataset) -> Aggregation {
    let mut by_group_date: BTreeMap<(&str, NaiveDate), (StatusCounts, BTreeSet<&str>)> =
        BTreeMap::new();
    let mut sessions_per_group: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    let mut people: BTreeMap<&str, IndividualAccumulator> = BTreeMap::new();

    for record in dataset.iter() {
        let (counts, enrolled) = by_group_date
            .entry((record.group_id(), record.date()))
            .or_default();
        counts.record(record.status());
        enrolled.insert(record.individual_id());

        sessions_per_group
            .entry(record.group_id())
            .or_default()
            .insert(record.date());

        let person = people.entry(record.individual_id()).or_default();
        if person.name.is_none() {
            person.name = Some(record.individual_name().to_string());
        }
        person.details.fill_from(record.details());
        let group = person.groups.entry(record.group_id().to_string()).or_default();
        group.sessions.insert(record.date(), record.status());
        group.counts.record(record.status());
    }

    let mut warnings = Vec::new();

    let summaries: Vec<GroupDateSummary> = by_group_date
        .into_iter()
        .map(|((group_id, date), (counts, enrolled))| {
            if counts.unknown > 0 {
                warnings.push(Warning::Aggregate {
                    message: format!(
                        "{group_id} on {date}: {} record(s) with unknown status",
                        counts.unknown
                    ),
                });
            }
            GroupDateSummary {
                group_id: group_id.to_string(),
                date,
                counts,
                total_enrolled: enrolled.len(),
            }
        })
        .collect();

    let mut individuals: Vec<IndividualTotals> = people
        .into_iter()
        .map(|(id, acc)| {
            let mut rates = BTreeMap::new();
            let mut attendance = acc.groups;
            for (group_id, group) in attendance.iter_mut() {
                group.group_sessions = sessions_per_group
                    .get(group_id.as_str())
                    .map_or(0, BTreeSet::len);
                let rate = match attendance_rate(group.counts.present, group.group_sessions) {
                    Some(rate) => rate,
                    None => {
                        warnings.push(Warning::Aggregate {
                            message: format!(
                                "{group_id}: no sessions recorded; attendance rate for {id} set to 0"
                            ),
                        });
                        0.0
                    }
                };
                rates.insert(group_id.clone(), rate);
            }
            IndividualTotals {
                individual_id: id.to_string(),
                individual_name: acc.name.unwrap_or_else(|| id.to_string()),
                per_group_attendance_rate: rates,
                attendance,
                details: acc.details,
            }
        })
        .collect();

    individuals.sort_by_cached_key(|i| {
        (
            i.individual_name.to_lowercase(),
            i.individual_name.clone(),
            i.individual_id.clone(),
        )
    });

    let mut totals = GrandTotals::from_summaries(&summaries);
    totals.individuals = individuals.len();

    debug!(
        summaries = summaries.len(),
        individuals = individuals.len(),
        warnings = warnings.len(),
        "Aggregated dataset"
    );

    Aggregation {
        summaries,
        individuals,
        totals,
        warnings,
    }
}

/// Splits individuals into one ordered list per group they attended.
///
/// Order within each group follows the input order, which [`aggregate`]
/// already sorts by name.
pub fn detail_sheets(individuals: &[IndividualTotals]) -> BTreeMap<String, Vec<IndividualTotals>> {
    let mut sheets: BTreeMap<String, Vec<IndividualTotals>> = BTreeMap::new();
    for individual in individuals {
        for group_id in individual.attendance.keys() {
            sheets
                .entry(group_id.clone())
                .or_default()
                .push(individual.clone());
        }
    }
    sheets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceRecord, RecordOrigin, Status};
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(id: &str, name: &str, group: &str, d: u32, status: Status) -> AttendanceRecord {
        AttendanceRecord::new(
            id,
            name,
            group,
            day(d),
            status,
            RecordOrigin {
                filename: Arc::from("test.csv"),
                line: 2,
            },
        )
    }

    #[test]
    fn test_ten_present_individuals() {
        let dataset: CanonicalDataset = (0..10)
            .map(|i| record(&i.to_string(), &format!("P {i}"), "G1", 5, Status::Present))
            .collect();
        let agg = aggregate(&dataset);

        assert_eq!(agg.summaries.len(), 1);
        let s = &agg.summaries[0];
        assert_eq!(s.group_id, "G1");
        assert_eq!(s.date, day(5));
        assert_eq!(s.present_count(), 10);
        assert_eq!(s.total_enrolled, 10);
        assert_eq!(s.absent_count() + s.excused_count() + s.late_count(), 0);
        assert!(agg.warnings.is_empty());
    }

    #[test]
    fn test_summaries_sorted_by_group_then_date() {
        let dataset: CanonicalDataset = vec![
            record("1", "A", "G2", 3, Status::Present),
            record("1", "A", "G1", 9, Status::Present),
            record("1", "A", "G1", 2, Status::Absent),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let order: Vec<(&str, NaiveDate)> = agg
            .summaries
            .iter()
            .map(|s| (s.group_id.as_str(), s.date))
            .collect();
        assert_eq!(order, vec![("G1", day(2)), ("G1", day(9)), ("G2", day(3))]);
    }

    #[test]
    fn test_attendance_rate_uses_group_sessions() {
        let dataset: CanonicalDataset = vec![
            record("1", "Ann Lee", "G1", 1, Status::Present),
            record("1", "Ann Lee", "G1", 2, Status::Absent),
            record("2", "Bo Chan", "G1", 3, Status::Present),
            record("2", "Bo Chan", "G1", 4, Status::Late),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let ann = agg.individuals.iter().find(|i| i.individual_id == "1").unwrap();
        assert_eq!(ann.rate("G1"), 0.25);
        assert_eq!(ann.group("G1").unwrap().group_sessions, 4);
        let bo = agg.individuals.iter().find(|i| i.individual_id == "2").unwrap();
        assert_eq!(bo.rate("G1"), 0.25);
    }

    #[test]
    fn test_individuals_sorted_by_name_then_id() {
        let dataset: CanonicalDataset = vec![
            record("9", "Zed", "G1", 1, Status::Present),
            record("3", "Amy", "G1", 1, Status::Present),
            record("1", "Amy", "G1", 1, Status::Present),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let ids: Vec<&str> = agg.individuals.iter().map(|i| i.individual_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "9"]);
    }

    #[test]
    fn test_individuals_sort_ignores_case() {
        let dataset: CanonicalDataset = vec![
            record("1", "Zed Park", "G1", 1, Status::Present),
            record("2", "ann Lee", "G1", 1, Status::Present),
            record("3", "Bo Chan", "G1", 1, Status::Present),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let names: Vec<&str> = agg.individuals.iter().map(|i| i.individual_name.as_str()).collect();
        assert_eq!(names, vec!["ann Lee", "Bo Chan", "Zed Park"]);
    }

    #[test]
    fn test_details_merge_first_value_per_field() {
        let with = |r: AttendanceRecord, payer: Option<&str>, admit: Option<&str>| {
            r.with_details(RecordDetails {
                payer_source: payer.map(str::to_string),
                admit_date: admit.map(str::to_string),
                ..Default::default()
            })
        };
        let dataset: CanonicalDataset = vec![
            with(record("1", "Ann Lee", "G1", 1, Status::Present), None, Some("01/02/2024")),
            with(record("1", "Ann Lee", "G1", 2, Status::Present), Some("Medicaid"), None),
            with(record("1", "Ann Lee", "G2", 3, Status::Present), Some("Aetna"), None),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let ann = &agg.individuals[0].details;
        assert_eq!(ann.admit_date.as_deref(), Some("01/02/2024"));
        assert_eq!(ann.payer_source.as_deref(), Some("Medicaid"));
    }

    #[test]
    fn test_unknown_status_is_counted_and_flagged() {
        let dataset: CanonicalDataset = vec![
            record("1", "A", "G1", 1, Status::Unknown),
            record("2", "B", "G1", 1, Status::Present),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let s = &agg.summaries[0];
        assert_eq!(s.unknown_count(), 1);
        assert_eq!(s.total_enrolled, 2);
        assert_eq!(agg.warnings.len(), 1);
        assert!(agg.warnings[0].to_string().contains("unknown status"));
    }

    #[test]
    fn test_summary_matches_detail_sums() {
        let dataset: CanonicalDataset = vec![
            record("1", "A", "G1", 1, Status::Present),
            record("2", "B", "G1", 1, Status::Absent),
            record("3", "C", "G1", 1, Status::Excused),
            record("1", "A", "G2", 1, Status::Late),
            record("2", "B", "G1", 2, Status::Present),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let sheets = detail_sheets(&agg.individuals);

        for summary in &agg.summaries {
            let mut counts = StatusCounts::default();
            for person in &sheets[&summary.group_id] {
                if let Some(status) = person.group(&summary.group_id).unwrap().status_on(summary.date) {
                    counts.record(status);
                }
            }
            assert_eq!(counts, summary.counts);
        }
    }

    #[test]
    fn test_detail_sheets_list_only_group_members() {
        let dataset: CanonicalDataset = vec![
            record("1", "A", "G1", 1, Status::Present),
            record("2", "B", "G2", 1, Status::Present),
            record("3", "C", "G1", 1, Status::Present),
        ]
        .into_iter()
        .collect();
        let agg = aggregate(&dataset);
        let sheets = detail_sheets(&agg.individuals);
        assert_eq!(sheets.len(), 2);
        let g1: Vec<&str> = sheets["G1"].iter().map(|i| i.individual_id.as_str()).collect();
        assert_eq!(g1, vec!["1", "3"]);
        assert_eq!(agg.totals.individuals, 3);
        assert_eq!(agg.totals.groups, 2);
    }

    #[test]
    fn test_empty_dataset_aggregates_to_nothing() {
        let agg = aggregate(&CanonicalDataset::default());
        assert!(agg.summaries.is_empty());
        assert!(agg.individuals.is_empty());
        assert_eq!(agg.totals, GrandTotals::default());
    }
}
