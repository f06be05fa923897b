//! Access log ingester - runs one incremental pass of an access log into SQLite.
//!
//! Schedule it (cron, systemd timer) to keep the database in step with the log.

use access_ingest::diagnostics::TracingDiagnostics;
use access_ingest::runner::{self, IngestPaths};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about = "Ingest newly appended access-log lines into SQLite")]
struct Cli {
    /// Access log to tail.
    path_to_observed_log: PathBuf,
    /// SQLite database receiving the records.
    path_to_db_file: PathBuf,
    /// File holding the byte offset reached by the previous pass.
    path_to_cursor_position_file: PathBuf,
    /// Where diagnostics (malformed lines, failures) are appended.
    log_file: PathBuf,
    /// Optional TOML configuration.
    #[arg(long, env = runner::CONFIG_ENV)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_file)?;

    info!("starting log processing");
    println!("Log file: {}", cli.path_to_observed_log.display());
    println!("Database file: {}", cli.path_to_db_file.display());
    println!(
        "Cursor position file: {}",
        cli.path_to_cursor_position_file.display()
    );

    let config = runner::resolve_config(cli.config)?;
    let paths = IngestPaths {
        log: cli.path_to_observed_log,
        database: cli.path_to_db_file,
        cursor: cli.path_to_cursor_position_file,
    };

    let summary = runner::pass::run(&config, &paths, Arc::new(TracingDiagnostics))?;
    info!(
        outcome = ?summary.outcome,
        inserted = summary.inserted,
        end_offset = summary.end_offset,
        "finished log processing"
    );
    Ok(())
}

fn init_tracing(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open diagnostic log {}", log_file.display()))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}
