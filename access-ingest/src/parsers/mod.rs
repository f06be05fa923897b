use crate::record::LogRecord;
use anyhow::Result;

pub mod access_log;
mod utils;

pub use access_log::AccessLogParser;
pub use utils::{current_timestamp, line_preview, LINE_PREVIEW_LIMIT};
pub(crate) use utils::{drain_complete_lines, trim_line_bytes};

/// Converts one complete log line into a [`LogRecord`].
///
/// Implementations are pure apart from stamping the processing time: no I/O, no shared state.
/// An `Err` means the line is unparseable; the pipeline reports it and moves on, so errors
/// should describe what did not match rather than carry recovery hints.
///
/// # Examples
///
/// ```
/// use access_ingest::parsers::{AccessLogParser, LineParser};
///
/// let parser = AccessLogParser::new();
/// let line = r#"10.0.0.1 - example.com [10/Oct/2023:13:55:36 +0000] "GET /index.html HTTP/1.1" 200 512 0.042 "-" "curl/8.0""#;
/// let record = parser.parse_line(line).unwrap();
/// assert_eq!(record.path, "/index.html");
/// assert!(parser.parse_line("not an access log line").is_err());
/// ```
pub trait LineParser: Send + Sync {
    fn parse_line(&self, line: &str) -> Result<LogRecord>;
}
