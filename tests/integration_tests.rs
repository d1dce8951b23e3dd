use calamine::{Data, Range, Reader, open_workbook_auto};
use census_processor::aggregate::types::StatusCounts;
use census_processor::config::{CensusConfig, ReportPeriod};
use census_processor::output::{export_summary_csv, write_report};
use census_processor::pipeline::{Pipeline, PipelineStage, process};
use census_processor::reconcile::ConflictPolicy;
use census_processor::{CensusReport, PipelineError, SourceFile, Status, Warning};

fn fixture(name: &str, bytes: &[u8]) -> SourceFile {
    SourceFile::new(name, bytes.to_vec())
}

fn program_batch() -> Vec<SourceFile> {
    vec![
        fixture("program_week.csv", include_bytes!("fixtures/program_week.csv")),
        fixture(
            "program_week_update.csv",
            include_bytes!("fixtures/program_week_update.csv"),
        ),
    ]
}

fn text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn number(cell: &Data) -> f64 {
    match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        other => panic!("expected a number, got {other:?}"),
    }
}

fn find_row(range: &Range<Data>, first_cell: &str) -> Vec<Data> {
    range
        .rows()
        .find(|row| row.first().map(text).as_deref() == Some(first_cell))
        .map(<[Data]>::to_vec)
        .unwrap_or_else(|| panic!("no row starting with {first_cell}"))
}

fn read_back(report: &CensusReport) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_report(dir.path(), report).unwrap();
    (dir, path)
}

#[tokio::test]
async fn test_conflicting_files_later_file_wins() {
    let files = vec![
        fixture("file_a.csv", include_bytes!("fixtures/file_a.csv")),
        fixture("file_b.csv", include_bytes!("fixtures/file_b.csv")),
    ];
    let report = process(files, &CensusConfig::default()).await.unwrap();

    let summary = &report.summary_sheet()[0];
    assert_eq!(summary.group_id, "G1");
    assert_eq!(summary.present_count(), 1);
    assert_eq!(summary.absent_count(), 1);
    assert_eq!(summary.total_enrolled, 2);

    let ann = &report.detail_sheets()["G1"][0];
    assert_eq!(ann.individual_id, "1");
    let status = ann
        .group("G1")
        .unwrap()
        .status_on(summary.date)
        .unwrap();
    assert_eq!(status, Status::Absent);

    let conflicts: Vec<&Warning> = report
        .warnings()
        .iter()
        .filter(|w| matches!(w, Warning::Conflict(_)))
        .collect();
    assert_eq!(conflicts.len(), 1);
    let message = conflicts[0].to_string();
    assert!(message.contains("Present"), "{message}");
    assert!(message.contains("-> Absent"), "{message}");
    assert!(message.contains("kept Absent"), "{message}");
}

#[tokio::test]
async fn test_ten_present_individuals() {
    let files = vec![fixture("ten_present.csv", include_bytes!("fixtures/ten_present.csv"))];
    let report = process(files, &CensusConfig::default()).await.unwrap();

    assert_eq!(report.summary_sheet().len(), 1);
    let summary = &report.summary_sheet()[0];
    assert_eq!(summary.present_count(), 10);
    assert_eq!(summary.total_enrolled, 10);
    assert_eq!(summary.absent_count(), 0);
    assert_eq!(summary.excused_count(), 0);
    assert_eq!(summary.late_count(), 0);
    assert!(report.warnings().is_empty());
    assert_eq!(report.detail_sheets()["G1"].len(), 10);
}

#[tokio::test]
async fn test_missing_date_column_only_file() {
    let files = vec![fixture("missing_date.csv", include_bytes!("fixtures/missing_date.csv"))];
    let err = process(files, &CensusConfig::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::AllFilesInvalid { .. }));
    assert!(err.to_string().contains("missing_date.csv"));
}

#[tokio::test]
async fn test_missing_date_column_with_other_valid_file() {
    let files = vec![
        fixture("missing_date.csv", include_bytes!("fixtures/missing_date.csv")),
        fixture("file_a.csv", include_bytes!("fixtures/file_a.csv")),
    ];
    let report = process(files, &CensusConfig::default()).await.unwrap();
    assert_eq!(report.totals().records, 2);
    assert!(report.file_outcomes()[0].is_rejected());
    assert!(matches!(
        &report.warnings()[0],
        Warning::FileRejected { filename, .. } if filename == "missing_date.csv"
    ));
}

#[tokio::test]
async fn test_header_only_file() {
    let files = vec![fixture("header_only.csv", include_bytes!("fixtures/header_only.csv"))];
    let report = process(files, &CensusConfig::default()).await.unwrap();
    assert!(report.summary_sheet().is_empty());
    assert!(report.detail_sheets().is_empty());
    assert_eq!(report.warnings().len(), 1);
    assert!(report.warnings()[0].to_string().contains("no data rows"));
    assert!(report.workbook().starts_with(b"PK"));
}

#[tokio::test]
async fn test_input_count_bounds() {
    let err = process(Vec::new(), &CensusConfig::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InputCount { count: 0, .. }));

    let files: Vec<SourceFile> = (0..31)
        .map(|i| fixture(&format!("f{i}.csv"), include_bytes!("fixtures/file_a.csv")))
        .collect();
    let err = process(files, &CensusConfig::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InputCount { count: 31, max: 30 }));
    assert_eq!(err.stage(), PipelineStage::Idle);
}

#[tokio::test]
async fn test_program_batch_summary() {
    let report = process(program_batch(), &CensusConfig::default()).await.unwrap();

    let rows: Vec<(&str, String)> = report
        .summary_sheet()
        .iter()
        .map(|s| (s.group_id.as_str(), s.date.to_string()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("MHIOP", "2024-01-08".to_string()),
            ("MHIOP", "2024-01-10".to_string()),
            ("PHP", "2024-01-08".to_string()),
            ("PHP", "2024-01-09".to_string()),
            ("PHP", "2024-01-10".to_string()),
        ]
    );

    let php_monday = &report.summary_sheet()[2];
    assert_eq!(php_monday.present_count(), 1);
    assert_eq!(php_monday.excused_count(), 2);
    assert_eq!(php_monday.total_enrolled, 3);

    let mh_wednesday = &report.summary_sheet()[1];
    assert_eq!(mh_wednesday.present_count(), 2);
    assert_eq!(mh_wednesday.unknown_count(), 1);
    assert_eq!(mh_wednesday.total_enrolled, 3);

    for summary in report.summary_sheet() {
        let known = summary.present_count()
            + summary.absent_count()
            + summary.excused_count()
            + summary.late_count();
        assert!(known <= summary.total_enrolled);
    }

    assert_eq!(report.period(), ReportPeriod::new(2024, 1));
    assert!(report.file_name().starts_with("Census_January_2024_"));

    let messages = report.warning_messages();
    assert!(messages.iter().any(|m| m.contains("line 13") && m.contains("maybe")));
    assert!(messages.iter().any(|m| m.contains("line 15") && m.contains("not a date")));
    assert!(messages.iter().any(|m| m.contains("kept Excused")));
    assert!(messages.iter().any(|m| m.contains("unknown status")));
}

#[tokio::test]
async fn test_detail_sheets_and_rates() {
    let report = process(program_batch(), &CensusConfig::default()).await.unwrap();
    let details = report.detail_sheets();
    assert_eq!(details.keys().collect::<Vec<_>>(), vec!["MHIOP", "PHP"]);

    let php_names: Vec<&str> = details["PHP"]
        .iter()
        .map(|i| i.individual_name.as_str())
        .collect();
    assert_eq!(php_names, vec!["Ann Lee", "Bo Chan", "Cy Diaz", "Ivy Jones"]);

    let ann = &details["PHP"][0];
    assert!((ann.rate("PHP") - 2.0 / 3.0).abs() < 1e-9);

    let mh_ids: Vec<&str> = details["MHIOP"]
        .iter()
        .map(|i| i.individual_id.as_str())
        .collect();
    assert_eq!(mh_ids, vec!["1004", "1005", "Gray_Flo"]);
    assert_eq!(details["MHIOP"][0].rate("MHIOP"), 1.0);

    for individuals in details.values() {
        for individual in individuals {
            for rate in individual.per_group_attendance_rate.values() {
                assert!((0.0..=1.0).contains(rate));
            }
        }
    }
}

#[tokio::test]
async fn test_summary_equals_detail_sums() {
    let report = process(program_batch(), &CensusConfig::default()).await.unwrap();
    for summary in report.summary_sheet() {
        let mut counts = StatusCounts::default();
        let mut enrolled = 0;
        for individual in &report.detail_sheets()[&summary.group_id] {
            let group = individual.group(&summary.group_id).unwrap();
            if let Some(status) = group.status_on(summary.date) {
                counts.record(status);
                enrolled += 1;
            }
        }
        assert_eq!(counts, summary.counts, "{} {}", summary.group_id, summary.date);
        assert_eq!(enrolled, summary.total_enrolled);
    }
}

#[tokio::test]
async fn test_pipeline_is_idempotent() {
    let config = CensusConfig::default();
    let first = process(program_batch(), &config).await.unwrap();
    let second = process(program_batch(), &config).await.unwrap();

    assert_eq!(first.summary_sheet(), second.summary_sheet());
    assert_eq!(first.detail_sheets(), second.detail_sheets());
    assert_eq!(first.warnings(), second.warnings());
    assert_eq!(first.totals(), second.totals());
}

#[tokio::test]
async fn test_most_restrictive_policy() {
    let config = CensusConfig {
        conflict_policy: ConflictPolicy::MostRestrictive,
        ..CensusConfig::default()
    };
    let report = process(program_batch(), &config).await.unwrap();
    // Absent from the first file outranks the later Excused.
    let php_monday = &report.summary_sheet()[2];
    assert_eq!(php_monday.absent_count(), 1);
    assert_eq!(php_monday.excused_count(), 1);
    assert!(report.warning_messages().iter().any(|m| m.contains("kept Absent")));
}

#[tokio::test]
async fn test_period_filter_excludes_other_months() {
    let config = CensusConfig {
        period: ReportPeriod::new(2024, 2),
        ..CensusConfig::default()
    };
    let report = process(
        vec![fixture("file_a.csv", include_bytes!("fixtures/file_a.csv"))],
        &config,
    )
    .await
    .unwrap();
    assert!(report.summary_sheet().is_empty());
    assert!(report.file_name().starts_with("Census_February_2024_"));
    assert!(report.warning_messages()[0].contains("outside reporting period 2024-02"));
}

#[tokio::test]
async fn test_stepwise_pipeline_stages() {
    let mut pipeline = Pipeline::new(CensusConfig::default());
    assert_eq!(pipeline.stage(), PipelineStage::Idle);

    let batches = pipeline.ingest(program_batch()).await.unwrap();
    assert_eq!(pipeline.stage(), PipelineStage::Ingesting);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 11);
    assert_eq!(batches[1].len(), 3);

    let dataset = pipeline.reconcile(&batches).unwrap();
    assert_eq!(pipeline.stage(), PipelineStage::Reconciling);
    assert_eq!(dataset.len(), 12);

    let aggregation = pipeline.aggregate(&dataset).unwrap();
    assert_eq!(pipeline.stage(), PipelineStage::Aggregating);

    let report = pipeline.render(aggregation).unwrap();
    assert_eq!(pipeline.stage(), PipelineStage::Done);
    assert_eq!(report.totals().individuals, 7);

    let err = pipeline.aggregate(&dataset).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_workbook_summary_sheet() {
    let report = process(program_batch(), &CensusConfig::default()).await.unwrap();
    let (_dir, path) = read_back(&report);

    let mut workbook = open_workbook_auto(&path).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Summary", "MHIOP", "PHP", "Notes"]);

    let summary = workbook.worksheet_range("Summary").unwrap();
    let title = text(&summary.rows().next().unwrap()[0]);
    assert_eq!(title, "Census Report: January 2024");

    let header = find_row(&summary, "Group");
    let header: Vec<String> = header.iter().map(text).collect();
    assert_eq!(
        header,
        vec![
            "Group",
            "Date",
            "Present",
            "Absent",
            "Excused",
            "Late",
            "Unknown",
            "Total Enrolled",
            "Non-attendance",
            "Flag"
        ]
    );

    let rows: Vec<Vec<Data>> = summary
        .rows()
        .filter(|r| matches!(text(&r[0]).as_str(), "MHIOP" | "PHP"))
        .map(<[Data]>::to_vec)
        .collect();
    assert_eq!(rows.len(), 5);
    // MHIOP 2024-01-10 has no absences; every other row is above 30%.
    let flags: Vec<String> = rows.iter().map(|r| text(&r[9])).collect();
    assert_eq!(flags, vec!["HIGH", "", "HIGH", "HIGH", "HIGH"]);
    assert_eq!(text(&rows[2][1]), "2024-01-08");
    assert_eq!(number(&rows[2][4]), 2.0);
    assert_eq!(number(&rows[2][7]), 3.0);

    let totals = find_row(&summary, "Total");
    assert_eq!(number(&totals[7]), 12.0);
    assert_eq!(number(&totals[2]), report.totals().counts.present as f64);

    assert!(summary
        .rows()
        .any(|r| text(&r[0]).contains("no enrollment roster")));
}

#[tokio::test]
async fn test_workbook_detail_and_notes_sheets() {
    let report = process(program_batch(), &CensusConfig::default()).await.unwrap();
    let (_dir, path) = read_back(&report);
    let mut workbook = open_workbook_auto(&path).unwrap();

    let php = workbook.worksheet_range("PHP").unwrap();
    let mut rows = php.rows();
    let header: Vec<String> = rows.next().unwrap().iter().map(text).collect();
    assert_eq!(
        header,
        vec![
            "Last Name",
            "First Name",
            "ID",
            "2024-01-08",
            "2024-01-09",
            "2024-01-10",
            "Present",
            "Absent",
            "Excused",
            "Late",
            "Unknown",
            "Sessions",
            "Attendance Rate"
        ]
    );
    let ann: Vec<Data> = rows.next().unwrap().to_vec();
    assert_eq!(text(&ann[0]), "Lee");
    assert_eq!(text(&ann[1]), "Ann");
    assert_eq!(text(&ann[2]), "1001");
    assert_eq!(text(&ann[3]), "P");
    assert_eq!(text(&ann[4]), "P");
    assert_eq!(text(&ann[5]), "");
    assert_eq!(number(&ann[6]), 2.0);
    assert_eq!(number(&ann[11]), 3.0);
    assert!((number(&ann[12]) - 2.0 / 3.0).abs() < 1e-9);

    let bo: Vec<Data> = rows.next().unwrap().to_vec();
    assert_eq!(text(&bo[3]), "E");
    assert_eq!(text(&bo[4]), "L");

    let totals = find_row(&php, "Total");
    assert_eq!(number(&totals[3]), 1.0);
    assert_eq!(number(&totals[4]), 2.0);
    assert_eq!(number(&totals[5]), 0.0);
    assert_eq!(number(&totals[11]), 3.0);

    let notes = workbook.worksheet_range("Notes").unwrap();
    let warning_rows = notes
        .rows()
        .filter(|r| matches!(r.first(), Some(Data::Float(_))))
        .count();
    assert_eq!(warning_rows, report.warnings().len());
    assert!(notes.rows().any(|r| r.iter().any(|c| text(c) == "30%")));
}

#[tokio::test]
async fn test_custom_threshold_changes_flags() {
    let config = CensusConfig {
        highlight_threshold: 0.5,
        ..CensusConfig::default()
    };
    let report = process(program_batch(), &config).await.unwrap();
    let flagged: Vec<bool> = report
        .summary_sheet()
        .iter()
        .map(|s| s.exceeds(config.highlight_threshold))
        .collect();
    assert_eq!(flagged, vec![false, false, true, false, true]);

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("summary.csv");
    export_summary_csv(&csv_path, report.summary_sheet(), config.highlight_threshold).unwrap();
    let content = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(content.lines().count(), 6);
    assert_eq!(content.lines().filter(|l| l.ends_with(",true")).count(), 2);
}

#[tokio::test]
async fn test_dateless_export_with_payer_section() {
    let files = vec![fixture(
        "census_2024-01-11.csv",
        include_bytes!("fixtures/census_2024-01-11.csv"),
    )];
    let report = process(files, &CensusConfig::default()).await.unwrap();

    let summary = &report.summary_sheet()[0];
    assert_eq!(summary.group_id, "PHP");
    assert_eq!(summary.date.to_string(), "2024-01-11");
    assert_eq!(summary.present_count(), 2);
    assert_eq!(summary.absent_count(), 1);
    assert!(report
        .warning_messages()
        .iter()
        .any(|m| m.contains("date 2024-01-11 taken from filename")));

    let (_dir, path) = read_back(&report);
    let mut workbook = open_workbook_auto(&path).unwrap();
    let php = workbook.worksheet_range("PHP").unwrap();
    let mut rows = php.rows();
    let header: Vec<String> = rows.next().unwrap().iter().map(text).collect();
    assert_eq!(
        header,
        vec![
            "Last Name",
            "First Name",
            "ID",
            "Admit Date",
            "Payer Source",
            "2024-01-11",
            "Present",
            "Absent",
            "Excused",
            "Late",
            "Unknown",
            "Sessions",
            "Attendance Rate",
            "UR Comments",
            "Billing Comments"
        ]
    );

    let listed: Vec<String> = rows.map(|r| text(&r[0])).collect();
    assert_eq!(listed, vec!["Lee", "Diaz", "Medicaid Individuals Below", "Chan", "Total"]);

    let ann = find_row(&php, "Lee");
    assert_eq!(text(&ann[3]), "01/02/2024");
    assert_eq!(text(&ann[4]), "Aetna");
    assert_eq!(text(&ann[5]), "P");
    assert_eq!(text(&ann[13]), "PHP - next review 01/20/2024");

    let bo = find_row(&php, "Chan");
    assert_eq!(text(&bo[4]), "Medicaid");
    assert_eq!(text(&bo[14]), "auth pending");

    let totals = find_row(&php, "Total");
    assert_eq!(number(&totals[5]), 2.0);
    assert_eq!(number(&totals[11]), 1.0);
}

#[tokio::test]
async fn test_payer_section_can_be_disabled() {
    let config = CensusConfig {
        payer_partition: None,
        ..CensusConfig::default()
    };
    let files = vec![fixture(
        "census_2024-01-11.csv",
        include_bytes!("fixtures/census_2024-01-11.csv"),
    )];
    let report = process(files, &config).await.unwrap();
    let (_dir, path) = read_back(&report);
    let mut workbook = open_workbook_auto(&path).unwrap();
    let php = workbook.worksheet_range("PHP").unwrap();
    let listed: Vec<String> = php.rows().skip(1).map(|r| text(&r[0])).collect();
    assert_eq!(listed, vec!["Lee", "Chan", "Diaz", "Total"]);
}
