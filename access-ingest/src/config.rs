use crate::filter::{ImportanceFilter, DEFAULT_IGNORED_SUFFIXES, DEFAULT_MIN_ERROR_STATUS};
use crate::output_writer::DEFAULT_TABLE;
use crate::tailer::PartialLinePolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Optional tuning loaded from TOML. Every field has a default, so an empty file is valid.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub filter: FilterConfig,
    pub store: StoreConfig,
    pub cursor: CursorConfig,
    pub reader: ReaderConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// Request paths ending with any of these are dropped.
    #[serde(default = "default_ignored_suffixes")]
    pub ignored_suffixes: Vec<String>,
    /// Responses with a status at or above this are dropped.
    #[serde(default = "default_min_error_status")]
    pub min_error_status: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CursorConfig {
    #[serde(default)]
    pub backend: CursorBackend,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CursorBackend {
    /// Plain text file holding the offset.
    #[default]
    File,
    /// Row in a SQLite `cursors` table at the cursor path.
    Sqlite,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReaderConfig {
    #[serde(default)]
    pub partial_lines: PartialLinePolicy,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetricsConfig {
    /// When set, the Prometheus text exposition is written here after every pass.
    #[serde(default)]
    pub textfile: Option<String>,
}

fn default_ignored_suffixes() -> Vec<String> {
    DEFAULT_IGNORED_SUFFIXES
        .iter()
        .map(|suffix| suffix.to_string())
        .collect()
}

fn default_min_error_status() -> i64 {
    DEFAULT_MIN_ERROR_STATUS
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignored_suffixes: default_ignored_suffixes(),
            min_error_status: default_min_error_status(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        if config
            .filter
            .ignored_suffixes
            .iter()
            .any(|suffix| suffix.trim().is_empty())
        {
            anyhow::bail!("filter.ignored_suffixes cannot contain empty entries");
        }
        if config.filter.min_error_status <= 0 {
            anyhow::bail!("filter.min_error_status must be a positive HTTP status");
        }
        if config.store.table.trim().is_empty() {
            anyhow::bail!("store.table cannot be empty");
        }
        if let Some(textfile) = &config.metrics.textfile {
            if textfile.trim().is_empty() {
                anyhow::bail!("metrics.textfile cannot be blank; omit it instead");
            }
        }
        Ok(config)
    }

    pub fn importance_filter(&self) -> ImportanceFilter {
        ImportanceFilter::new(
            self.filter.ignored_suffixes.clone(),
            self.filter.min_error_status,
        )
    }

    pub fn metrics_textfile_path(&self) -> Option<PathBuf> {
        self.metrics.textfile.as_deref().map(expand_path)
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}
