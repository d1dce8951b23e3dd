use rust_xlsxwriter::Workbook;

use super::{ENROLLMENT_NOTE, Formats, NOTES_SHEET, ReportRenderer};
use crate::error::RenderError;
use crate::model::Status;
use crate::warning::Warning;

/// Legend, settings, generation time and every warning of the run.
pub(super) fn write(
    workbook: &mut Workbook,
    renderer: &ReportRenderer,
    formats: &Formats,
    warnings: &[Warning],
) -> Result<(), RenderError> {
    let err = RenderError::sheet(NOTES_SHEET);
    let sheet = workbook.add_worksheet();
    sheet.set_name(NOTES_SHEET).map_err(&err)?;
    sheet.set_column_width(0, 22).map_err(&err)?;
    sheet.set_column_width(1, 90).map_err(&err)?;

    let mut row: u32 = 0;
    sheet
        .write_with_format(row, 0, "Status legend", &formats.header)
        .map_err(&err)?;
    sheet
        .write_with_format(row, 1, "", &formats.header)
        .map_err(&err)?;
    row += 1;
    for status in Status::ALL {
        sheet
            .write_with_format(row, 0, status.code(), formats.status(status))
            .map_err(&err)?;
        sheet
            .write_with_format(row, 1, status.label(), &formats.text)
            .map_err(&err)?;
        row += 1;
    }
    row += 1;

    let generated = renderer
        .generated_at
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string();
    let settings = [
        ("Report", renderer.title.clone()),
        ("Generated", generated),
        ("Highlight threshold", format!("{:.0}%", renderer.threshold * 100.0)),
        ("Total Enrolled", ENROLLMENT_NOTE.to_string()),
        (
            "Payer section",
            match &renderer.payer_partition {
                Some(keyword) => format!("payer source containing '{keyword}' listed separately"),
                None => "off".to_string(),
            },
        ),
    ];
    for (label, value) in &settings {
        sheet.write(row, 0, *label).map_err(&err)?;
        sheet
            .write_with_format(row, 1, value.as_str(), &formats.note)
            .map_err(&err)?;
        row += 1;
    }
    row += 1;

    let heading = format!("Warnings ({})", warnings.len());
    sheet
        .write_with_format(row, 0, heading.as_str(), &formats.header)
        .map_err(&err)?;
    sheet
        .write_with_format(row, 1, "", &formats.header)
        .map_err(&err)?;
    row += 1;
    if warnings.is_empty() {
        sheet.write(row, 1, "None").map_err(&err)?;
    }
    for (n, warning) in warnings.iter().enumerate() {
        let text = warning.to_string();
        sheet.write(row, 0, (n + 1) as f64).map_err(&err)?;
        sheet.write(row, 1, text.as_str()).map_err(&err)?;
        row += 1;
    }

    Ok(())
}
