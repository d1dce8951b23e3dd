use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_xlsxwriter::{Workbook, Worksheet};

use super::{Formats, MAX_COLUMNS};
use crate::aggregate::types::IndividualTotals;
use crate::error::RenderError;
use crate::model::{RecordDetails, Status};

const LEADING: [&str; 3] = ["Last Name", "First Name", "ID"];
const TRAILING: [&str; 7] = [
    "Present",
    "Absent",
    "Excused",
    "Late",
    "Unknown",
    "Sessions",
    "Attendance Rate",
];

/// Pass-through columns, shown only when some individual on the sheet has a
/// value for them.
#[derive(Debug, Clone, Copy)]
enum Passthrough {
    AdmitDate,
    PayerSource,
    UrComments,
    BillingComments,
}

impl Passthrough {
    const BEFORE_DATES: [Passthrough; 2] = [Passthrough::AdmitDate, Passthrough::PayerSource];
    const AFTER_TOTALS: [Passthrough; 2] = [Passthrough::UrComments, Passthrough::BillingComments];

    fn title(self) -> &'static str {
        match self {
            Passthrough::AdmitDate => "Admit Date",
            Passthrough::PayerSource => "Payer Source",
            Passthrough::UrComments => "UR Comments",
            Passthrough::BillingComments => "Billing Comments",
        }
    }

    fn width(self) -> f64 {
        match self {
            Passthrough::AdmitDate => 12.0,
            Passthrough::PayerSource => 20.0,
            Passthrough::UrComments | Passthrough::BillingComments => 30.0,
        }
    }

    fn value(self, details: &RecordDetails) -> Option<&str> {
        match self {
            Passthrough::AdmitDate => details.admit_date.as_deref(),
            Passthrough::PayerSource => details.payer_source.as_deref(),
            Passthrough::UrComments => details.ur_comments.as_deref(),
            Passthrough::BillingComments => details.billing_comments.as_deref(),
        }
    }

    fn in_use(candidates: &[Passthrough], individuals: &[&IndividualTotals]) -> Vec<Passthrough> {
        candidates
            .iter()
            .copied()
            .filter(|p| individuals.iter().any(|i| p.value(&i.details).is_some()))
            .collect()
    }
}

/// Column positions of one grid.
struct Layout {
    before_dates: Vec<Passthrough>,
    after_totals: Vec<Passthrough>,
    dates: Vec<NaiveDate>,
}

impl Layout {
    fn date_col(&self) -> u16 {
        (LEADING.len() + self.before_dates.len()) as u16
    }

    fn trailing_col(&self) -> u16 {
        self.date_col() + self.dates.len() as u16
    }

    fn comment_col(&self) -> u16 {
        self.trailing_col() + TRAILING.len() as u16
    }

    fn width(&self) -> usize {
        LEADING.len()
            + self.before_dates.len()
            + self.dates.len()
            + TRAILING.len()
            + self.after_totals.len()
    }
}

/// One group's census grid: a row per individual, a column per session date.
///
/// With a payer partition set, individuals whose payer source contains it are
/// listed under their own divider row after everyone else.
pub(super) fn write(
    workbook: &mut Workbook,
    formats: &Formats,
    sheet_name: &str,
    group_id: &str,
    individuals: &[IndividualTotals],
    payer_partition: Option<&str>,
) -> Result<(), RenderError> {
    let err = RenderError::sheet(sheet_name);

    let members: Vec<&IndividualTotals> = individuals
        .iter()
        .filter(|i| i.group(group_id).is_some())
        .collect();
    let layout = Layout {
        before_dates: Passthrough::in_use(&Passthrough::BEFORE_DATES, &members),
        after_totals: Passthrough::in_use(&Passthrough::AFTER_TOTALS, &members),
        dates: members
            .iter()
            .filter_map(|i| i.group(group_id))
            .flat_map(|g| g.sessions.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };
    if layout.width() > MAX_COLUMNS {
        return Err(RenderError::TooWide {
            sheet: sheet_name.to_string(),
            columns: layout.width(),
            max: MAX_COLUMNS,
        });
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name).map_err(&err)?;
    write_header(sheet, formats, &layout).map_err(&err)?;

    let (partitioned, standard): (Vec<&IndividualTotals>, Vec<&IndividualTotals>) =
        members.iter().copied().partition(|i| in_partition(i, payer_partition));

    let mut totals = Totals::new(layout.dates.len());
    let mut row: u32 = 1;
    for individual in &standard {
        write_individual(sheet, formats, &layout, row, group_id, individual, &mut totals)
            .map_err(&err)?;
        row += 1;
    }
    if let (Some(keyword), false) = (payer_partition, partitioned.is_empty()) {
        let label = format!("{keyword} Individuals Below");
        sheet
            .merge_range(row, 0, row, layout.width() as u16 - 1, label.as_str(), &formats.section)
            .map_err(&err)?;
        row += 1;
        for individual in &partitioned {
            write_individual(sheet, formats, &layout, row, group_id, individual, &mut totals)
                .map_err(&err)?;
            row += 1;
        }
    }

    write_totals(sheet, formats, &layout, row, &totals).map_err(&err)
}

fn in_partition(individual: &IndividualTotals, keyword: Option<&str>) -> bool {
    match (keyword, individual.details.payer_source.as_deref()) {
        (Some(keyword), Some(payer)) => payer.to_lowercase().contains(&keyword.to_lowercase()),
        _ => false,
    }
}

fn write_header(
    sheet: &mut Worksheet,
    formats: &Formats,
    layout: &Layout,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    let mut col: u16 = 0;
    for title in LEADING {
        sheet.write_with_format(0, col, title, &formats.header)?;
        col += 1;
    }
    for extra in &layout.before_dates {
        sheet.write_with_format(0, col, extra.title(), &formats.header)?;
        sheet.set_column_width(col, extra.width())?;
        col += 1;
    }
    for date in &layout.dates {
        let label = date.to_string();
        sheet.write_with_format(0, col, label.as_str(), &formats.header)?;
        sheet.set_column_width(col, 11)?;
        col += 1;
    }
    for title in TRAILING {
        sheet.write_with_format(0, col, title, &formats.header)?;
        col += 1;
    }
    for extra in &layout.after_totals {
        sheet.write_with_format(0, col, extra.title(), &formats.header)?;
        sheet.set_column_width(col, extra.width())?;
        col += 1;
    }

    sheet.set_column_width(0, 16)?;
    sheet.set_column_width(1, 16)?;
    sheet.set_column_width(2, 12)?;
    sheet.set_column_width(layout.trailing_col() + 6, 14)?;
    sheet.set_freeze_panes(1, layout.date_col())?;
    Ok(())
}

/// Running sums for the totals row.
struct Totals {
    present_per_date: Vec<usize>,
    /// Present, Absent, Excused, Late, Unknown.
    counts: [usize; 5],
}

impl Totals {
    fn new(dates: usize) -> Self {
        Self {
            present_per_date: vec![0; dates],
            counts: [0; 5],
        }
    }
}

fn write_individual(
    sheet: &mut Worksheet,
    formats: &Formats,
    layout: &Layout,
    row: u32,
    group_id: &str,
    individual: &IndividualTotals,
    totals: &mut Totals,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    let Some(attendance) = individual.group(group_id) else {
        return Ok(());
    };
    let first_name = individual.first_name();
    sheet.write_with_format(row, 0, individual.last_name(), &formats.text)?;
    sheet.write_with_format(row, 1, first_name.as_str(), &formats.text)?;
    sheet.write_with_format(row, 2, individual.individual_id.as_str(), &formats.text)?;
    write_passthrough(sheet, formats, row, LEADING.len() as u16, &layout.before_dates, &individual.details)?;

    let date_col = layout.date_col();
    for (offset, date) in layout.dates.iter().enumerate() {
        let col = date_col + offset as u16;
        match attendance.status_on(*date) {
            Some(status) => {
                if status == Status::Present {
                    totals.present_per_date[offset] += 1;
                }
                sheet.write_with_format(row, col, status.code(), formats.status(status))?;
            }
            None => {
                sheet.write_blank(row, col, &formats.text)?;
            }
        }
    }

    let counts = &attendance.counts;
    let tallies = [
        counts.present,
        counts.absent,
        counts.excused,
        counts.late,
        counts.unknown,
        attendance.group_sessions,
    ];
    for (total, value) in totals.counts.iter_mut().zip(&tallies) {
        *total += value;
    }
    let trailing_col = layout.trailing_col();
    for (offset, value) in tallies.iter().enumerate() {
        sheet.write_with_format(row, trailing_col + offset as u16, *value as f64, &formats.integer)?;
    }
    sheet.write_with_format(row, trailing_col + 6, individual.rate(group_id), &formats.percent)?;

    write_passthrough(sheet, formats, row, layout.comment_col(), &layout.after_totals, &individual.details)
}

fn write_passthrough(
    sheet: &mut Worksheet,
    formats: &Formats,
    row: u32,
    first_col: u16,
    columns: &[Passthrough],
    details: &RecordDetails,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    for (offset, extra) in columns.iter().enumerate() {
        let col = first_col + offset as u16;
        match extra.value(details) {
            Some(value) => sheet.write_with_format(row, col, value, &formats.text)?,
            None => sheet.write_blank(row, col, &formats.text)?,
        };
    }
    Ok(())
}

fn write_totals(
    sheet: &mut Worksheet,
    formats: &Formats,
    layout: &Layout,
    row: u32,
    totals: &Totals,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    sheet.write_with_format(row, 0, "Total", &formats.total_text)?;
    for col in 1..layout.date_col() {
        sheet.write_with_format(row, col, "", &formats.total_text)?;
    }
    let date_col = layout.date_col();
    for (offset, present) in totals.present_per_date.iter().enumerate() {
        sheet.write_with_format(row, date_col + offset as u16, *present as f64, &formats.total_integer)?;
    }
    let trailing_col = layout.trailing_col();
    for (offset, total) in totals.counts.iter().enumerate() {
        sheet.write_with_format(row, trailing_col + offset as u16, *total as f64, &formats.total_integer)?;
    }
    // Sessions the group held, not a sum over individuals.
    sheet.write_with_format(row, trailing_col + 5, layout.dates.len() as f64, &formats.total_integer)?;
    Ok(())
}
