//! CLI entry point for the census processor.
//!
//! `process` turns a batch of attendance CSV exports into a census workbook;
//! `inspect` shows how a single file is parsed.

use anyhow::{Context, Result};
use census_processor::config::{CensusConfig, ReportPeriod};
use census_processor::ingest::{IngestOptions, ingest};
use census_processor::model::SourceFile;
use census_processor::output::{
    RunSummary, export_summary_csv, print_json, print_pretty, write_report,
};
use census_processor::pipeline::process;
use census_processor::reconcile::ConflictPolicy;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "census_processor")]
#[command(about = "Builds attendance census reports from CSV exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a batch of attendance CSV files into a census workbook
    Process {
        /// CSV files, in ingestion order (later files win conflicts)
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Directory the workbook is written to
        #[arg(short, long, env = "CENSUS_OUTPUT_DIR", default_value = "reports")]
        output_dir: PathBuf,

        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Non-attendance share above which summary rows are flagged
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum number of files per batch
        #[arg(long)]
        max_files: Option<usize>,

        /// Reporting month, YYYY-MM
        #[arg(long)]
        period: Option<ReportPeriod>,

        /// Conflict policy: last_file_wins or most_restrictive
        #[arg(long)]
        conflict_policy: Option<ConflictPolicy>,

        /// Also export the summary sheet as CSV
        #[arg(long)]
        summary_csv: Option<PathBuf>,

        /// Log the run summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Parse one CSV file and log its records and warnings
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log records as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/census_processor.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("census_processor.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info")));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::try_from_env("RUST_LOG_JSON").unwrap_or_else(|_| EnvFilter::new("debug")),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            files,
            output_dir,
            config,
            threshold,
            max_files,
            period,
            conflict_policy,
            summary_csv,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(threshold) = threshold {
                config.highlight_threshold = threshold;
            }
            if let Some(max_files) = max_files {
                config.max_files = max_files;
            }
            if period.is_some() {
                config.period = period;
            }
            if let Some(policy) = conflict_policy {
                config.conflict_policy = policy;
            }
            config.validate()?;

            run_process(&files, &output_dir, &config, summary_csv.as_deref(), json).await?;
        }
        Commands::Inspect { file, config, json } => {
            let config = load_config(config.as_deref())?;
            config.validate()?;
            inspect(&file, &config, json)?;
        }
    }

    Ok(())
}

/// Defaults, then the optional JSON file, then `CENSUS_*` variables.
fn load_config(path: Option<&Path>) -> Result<CensusConfig> {
    let config = match path {
        Some(path) => {
            let path = path.to_string_lossy();
            info!(path = %path, "Loading config");
            CensusConfig::load(&path)?
        }
        None => CensusConfig::default(),
    };
    let config = config.apply_env()?;
    debug!(?config, "Effective configuration");
    Ok(config)
}

#[tracing::instrument(skip_all, fields(files = files.len(), output_dir = %output_dir.display()))]
async fn run_process(
    files: &[PathBuf],
    output_dir: &Path,
    config: &CensusConfig,
    summary_csv: Option<&Path>,
    json: bool,
) -> Result<()> {
    let sources = files
        .iter()
        .map(|path| SourceFile::from_path(path))
        .collect::<Result<Vec<_>>>()?;

    let report = match process(sources, config).await {
        Ok(report) => report,
        Err(e) => {
            error!(stage = %e.stage(), error = %e, "Census processing failed");
            return Err(e).context("census processing failed");
        }
    };

    let path = write_report(output_dir, &report)?;
    info!(path = %path.display(), "Census workbook written");

    if let Some(csv_path) = summary_csv {
        export_summary_csv(csv_path, report.summary_sheet(), config.highlight_threshold)?;
        info!(path = %csv_path.display(), "Summary CSV exported");
    }

    let summary = RunSummary::new(&report);
    if json {
        print_json(&summary)?;
    } else {
        print_pretty(&summary);
    }
    Ok(())
}

#[tracing::instrument(skip(config, json), fields(file = %path.display()))]
fn inspect(path: &Path, config: &CensusConfig, json: bool) -> Result<()> {
    let source = SourceFile::from_path(path)?;
    let outcome = ingest(&source.content, &source.filename, &IngestOptions::from(config))?;

    if json {
        info!("{}", serde_json::to_string_pretty(&outcome.records)?);
    } else {
        for record in &outcome.records {
            info!(
                individual = record.individual_id(),
                name = record.individual_name(),
                group = record.group_id(),
                date = %record.date(),
                status = %record.status(),
                "Record"
            );
        }
    }
    for warning in &outcome.warnings {
        warn!("{warning}");
    }
    info!(
        records = outcome.records.len(),
        warnings = outcome.warnings.len(),
        "Inspection complete"
    );
    Ok(())
}
