//! CLI entry point for the AOL reports tool.
//!
//! Provides subcommands to consolidate the raw assessment workbooks, to
//! generate the per-program reports, to run both in sequence and to clean
//! up old run logs.

use anyhow::Result;
use aol_reports::consolidate::generate_consolidated_file;
use aol_reports::layout::DataLayout;
use aol_reports::logs::{LazyLogFile, delete_logs, log_file_name};
use aol_reports::report::{ReportOptions, generate_reports};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "aol_reports")]
#[command(about = "Consolidates AOL assessment data and generates program reports", long_about = None)]
struct Cli {
    /// Project root containing the `data/` directory
    #[arg(long, global = true, env = "AOL_ROOT", default_value = ".")]
    root: PathBuf,

    /// Directory for run logs
    #[arg(long, global = true, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ReportArgs {
    /// Maximum number of programs processed at the same time
    #[arg(short, long, default_value_t = 4)]
    concurrency: usize,

    /// Drop rows whose student is not mapped to the program
    #[arg(long, default_value_t = false)]
    validate_students: bool,
}

impl From<ReportArgs> for ReportOptions {
    fn from(args: ReportArgs) -> Self {
        Self {
            concurrency: args.concurrency,
            validate_students: args.validate_students,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge base.xlsx with admitidos.xlsx into the consolidated workbook
    Consolidate,
    /// Generate tables and figures for every program
    Report(ReportArgs),
    /// Consolidate, then report
    Run(ReportArgs),
    /// Delete run logs
    CleanLogs,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();

    // Cleaning logs must not open a new one in the same directory.
    let with_file_log = !matches!(cli.command, Commands::CleanLogs);
    let _file_guard = match init_logging(&cli.log_dir, with_file_log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Logging setup: colored stderr plus a JSON log file per run, created
/// only once something passes the file filter.
fn init_logging(log_dir: &Path, with_file: bool) -> Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info"));

    let (json_layer, guard) = if with_file {
        let log_file = LazyLogFile::new(log_dir.join(log_file_name(Local::now())));
        let (non_blocking_file, guard) = tracing_appender::non_blocking(log_file);

        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking_file)
            .with_filter(env_filter("RUST_LOG_FILE", "warn"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()?;

    Ok(guard)
}

fn env_filter(var: &str, default: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default))
}

async fn run(cli: Cli) -> Result<()> {
    let layout = DataLayout::new(&cli.root);

    match cli.command {
        Commands::Consolidate => {
            generate_consolidated_file(&layout)?;
        }
        Commands::Report(args) => {
            report(&layout, args.into()).await?;
        }
        Commands::Run(args) => {
            let summary = generate_consolidated_file(&layout)?;
            info!(
                consolidated_rows = summary.consolidated_rows,
                "Consolidation finished, generating reports"
            );
            report(&layout, args.into()).await?;
        }
        Commands::CleanLogs => {
            let deleted = delete_logs(&cli.log_dir)?;
            info!(deleted, "Log cleanup finished");
        }
    }

    Ok(())
}

async fn report(layout: &DataLayout, options: ReportOptions) -> Result<()> {
    let index = generate_reports(layout, &options).await?;

    let skipped = index.programs.iter().filter(|p| p.skipped).count();
    info!(
        programs = index.programs.len(),
        skipped,
        failures = index.failure_count(),
        reports_dir = %layout.reports_dir.display(),
        "Reports generated"
    );
    Ok(())
}
