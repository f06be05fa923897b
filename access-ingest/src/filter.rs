//! Importance policy applied to parsed records before they are persisted.

use crate::record::LogRecord;

/// Static-asset suffixes that are never worth storing.
pub const DEFAULT_IGNORED_SUFFIXES: &[&str] = &[
    ".ico", ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff", ".ttf", ".eot",
    ".otf", ".map",
];

/// Client and server errors start here.
pub const DEFAULT_MIN_ERROR_STATUS: i64 = 400;

/// Keep/drop decision over a parsed record. Must be free of side effects.
pub trait RecordFilter: Send + Sync {
    fn is_important(&self, record: &LogRecord) -> bool;
}

/// Drops static assets (by path suffix) and error responses (by status).
#[derive(Debug, Clone)]
pub struct ImportanceFilter {
    ignored_suffixes: Vec<String>,
    min_error_status: i64,
}

impl ImportanceFilter {
    pub fn new(ignored_suffixes: Vec<String>, min_error_status: i64) -> Self {
        Self {
            ignored_suffixes,
            min_error_status,
        }
    }
}

impl Default for ImportanceFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_IGNORED_SUFFIXES
                .iter()
                .map(|suffix| suffix.to_string())
                .collect(),
            DEFAULT_MIN_ERROR_STATUS,
        )
    }
}

impl RecordFilter for ImportanceFilter {
    fn is_important(&self, record: &LogRecord) -> bool {
        if self
            .ignored_suffixes
            .iter()
            .any(|suffix| record.path.ends_with(suffix.as_str()))
        {
            return false;
        }

        record.status < self.min_error_status
    }
}
