use rust_xlsxwriter::{Format, Workbook};

use super::{ENROLLMENT_NOTE, Formats, ReportRenderer, SUMMARY_SHEET};
use crate::aggregate::types::{GrandTotals, GroupDateSummary};
use crate::aggregate::utility::ratio;
use crate::error::RenderError;

const COLUMNS: [&str; 10] = [
    "Group",
    "Date",
    "Present",
    "Absent",
    "Excused",
    "Late",
    "Unknown",
    "Total Enrolled",
    "Non-attendance",
    "Flag",
];

const WIDTHS: [f64; 10] = [18.0, 12.0, 9.0, 9.0, 9.0, 9.0, 10.0, 10.0, 14.0, 8.0];

struct RowStyle<'a> {
    text: &'a Format,
    integer: &'a Format,
    percent: &'a Format,
}

pub(super) fn write(
    workbook: &mut Workbook,
    renderer: &ReportRenderer,
    formats: &Formats,
    summaries: &[GroupDateSummary],
) -> Result<(), RenderError> {
    let err = RenderError::sheet(SUMMARY_SHEET);
    let sheet = workbook.add_worksheet();
    sheet.set_name(SUMMARY_SHEET).map_err(&err)?;

    let last_col = (COLUMNS.len() - 1) as u16;
    let mut row: u32 = 0;
    sheet
        .merge_range(row, 0, row, last_col, &renderer.title, &formats.title)
        .map_err(&err)?;
    row += 1;
    for line in renderer.organization.iter().chain(&renderer.header_lines) {
        sheet
            .merge_range(row, 0, row, last_col, line, &formats.subtitle)
            .map_err(&err)?;
        row += 1;
    }
    row += 1;

    let header_row = row;
    for (col, (title, width)) in COLUMNS.iter().zip(WIDTHS).enumerate() {
        sheet
            .write_with_format(header_row, col as u16, *title, &formats.header)
            .map_err(&err)?;
        sheet.set_column_width(col as u16, width).map_err(&err)?;
    }
    sheet.set_freeze_panes(header_row + 1, 0).map_err(&err)?;
    row += 1;

    let normal = RowStyle {
        text: &formats.text,
        integer: &formats.integer,
        percent: &formats.percent,
    };
    let flagged = RowStyle {
        text: &formats.flagged_text,
        integer: &formats.flagged_integer,
        percent: &formats.flagged_percent,
    };

    for summary in summaries {
        let is_flagged = summary.exceeds(renderer.threshold);
        let style = if is_flagged { &flagged } else { &normal };
        let counts = [
            summary.present_count(),
            summary.absent_count(),
            summary.excused_count(),
            summary.late_count(),
            summary.unknown_count(),
            summary.total_enrolled,
        ];

        sheet
            .write_with_format(row, 0, summary.group_id.as_str(), style.text)
            .map_err(&err)?;
        let date = summary.date.to_string();
        sheet
            .write_with_format(row, 1, date.as_str(), style.text)
            .map_err(&err)?;
        for (offset, count) in counts.iter().enumerate() {
            sheet
                .write_with_format(row, 2 + offset as u16, *count as f64, style.integer)
                .map_err(&err)?;
        }
        sheet
            .write_with_format(row, 8, summary.non_attendance_ratio(), style.percent)
            .map_err(&err)?;
        sheet
            .write_with_format(row, 9, if is_flagged { "HIGH" } else { "" }, style.text)
            .map_err(&err)?;
        row += 1;
    }

    let totals = GrandTotals::from_summaries(summaries);
    let total_counts = [
        totals.counts.present,
        totals.counts.absent,
        totals.counts.excused,
        totals.counts.late,
        totals.counts.unknown,
        totals.records,
    ];
    sheet
        .write_with_format(row, 0, "Total", &formats.total_text)
        .map_err(&err)?;
    let sessions = format!("{} session(s)", totals.sessions);
    sheet
        .write_with_format(row, 1, sessions.as_str(), &formats.total_text)
        .map_err(&err)?;
    for (offset, count) in total_counts.iter().enumerate() {
        sheet
            .write_with_format(row, 2 + offset as u16, *count as f64, &formats.total_integer)
            .map_err(&err)?;
    }
    sheet
        .write_with_format(
            row,
            8,
            ratio(totals.counts.non_attendance(), totals.records),
            &formats.total_percent,
        )
        .map_err(&err)?;
    sheet
        .write_with_format(row, 9, "", &formats.total_text)
        .map_err(&err)?;
    row += 2;

    sheet
        .merge_range(row, 0, row + 1, last_col, ENROLLMENT_NOTE, &formats.note)
        .map_err(&err)?;
    row += 2;
    let rule = format!(
        "Rows are flagged when (absent + excused + late) / total enrolled exceeds {:.0}%.",
        renderer.threshold * 100.0
    );
    sheet
        .merge_range(row, 0, row, last_col, &rule, &formats.note)
        .map_err(&err)?;

    Ok(())
}
