//! Wiring for a single ingest pass.
//!
//! Turns command-line paths plus the optional TOML configuration into a ready [`Pipeline`].

pub mod pass;

use crate::checkpoint::{CursorStore, FileCursorStore, SqliteCursorStore};
use crate::config::{CursorBackend, Config};
use crate::diagnostics::Diagnostics;
use crate::output_writer::SqliteRecordStore;
use crate::pipeline::Pipeline;
use crate::tailer::LogReader;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Environment variable naming the TOML configuration file when `--config` is absent.
pub const CONFIG_ENV: &str = "ACCESS_INGEST_CONFIG";

/// The files one pass works against.
#[derive(Debug, Clone)]
pub struct IngestPaths {
    pub log: PathBuf,
    pub database: PathBuf,
    pub cursor: PathBuf,
}

/// Build the cursor store selected by `[cursor] backend`.
pub fn build_cursor_store(config: &Config, paths: &IngestPaths) -> Result<Box<dyn CursorStore>> {
    match config.cursor.backend {
        CursorBackend::File => Ok(Box::new(FileCursorStore::new(&paths.cursor))),
        CursorBackend::Sqlite => {
            let store = SqliteCursorStore::new(&paths.cursor, &paths.log)
                .context("failed to open sqlite cursor store")?;
            info!(cursor_db = %paths.cursor.display(), "using sqlite cursor backend");
            Ok(Box::new(store))
        }
    }
}

pub fn build_record_store(config: &Config, paths: &IngestPaths) -> Result<SqliteRecordStore> {
    SqliteRecordStore::new(&paths.database, config.store.table.clone())
}

pub fn build_pipeline(
    config: &Config,
    paths: &IngestPaths,
    diagnostics: Arc<dyn Diagnostics>,
) -> Result<Pipeline> {
    let cursor = build_cursor_store(config, paths)?;
    let store = build_record_store(config, paths)?;

    Ok(Pipeline::new(
        LogReader::new(&paths.log),
        cursor,
        Box::new(store),
        diagnostics,
    )
    .with_filter(Box::new(config.importance_filter()))
    .with_partial_lines(config.reader.partial_lines))
}

/// Load configuration from `explicit`, falling back to [`CONFIG_ENV`], then to defaults.
pub fn resolve_config(explicit: Option<PathBuf>) -> Result<Config> {
    let path = explicit.or_else(|| {
        std::env::var(CONFIG_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    });

    match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}
