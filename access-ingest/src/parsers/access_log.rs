//! Access-log line grammar.
//!
//! Lines look like the nginx combined format with the request duration spliced in after the
//! body size:
//!
//! ```text
//! $remote_addr - $host [$time_local] "$request" $status $bytes_sent $request_time "$http_referer" "$http_user_agent"
//! ```
//!
//! The match is anchored at the start of the line; anything after the user agent is ignored.

use crate::parsers::{current_timestamp, LineParser};
use crate::record::LogRecord;
use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// chrono format of the bracketed `time_local` field, including the UTC offset.
pub const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

pub const ACCESS_LOG_PATTERN: &str = r#"^(?P<ip>\S+) - (?P<host>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<method>\S+) (?P<path>\S+) \S+" (?P<status>\d+) (?P<bytes_sent>\d+) (?P<request_time>[\d.]+) "(?P<referer>[^"]*)" "(?P<user_agent>[^"]*)""#;

lazy_static! {
    static ref ACCESS_LOG_REGEX: Regex =
        Regex::new(ACCESS_LOG_PATTERN).expect("access log pattern is a valid regex");
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLogParser;

impl AccessLogParser {
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for AccessLogParser {
    fn parse_line(&self, line: &str) -> Result<LogRecord> {
        let caps = ACCESS_LOG_REGEX
            .captures(line)
            .ok_or_else(|| anyhow!("line does not match access log grammar"))?;

        let raw_timestamp = field(&caps, "timestamp");
        let timestamp = DateTime::parse_from_str(raw_timestamp, TIME_LOCAL_FORMAT)
            .with_context(|| format!("invalid timestamp {raw_timestamp:?}"))?
            .timestamp() as f64;

        let status = field(&caps, "status")
            .parse::<i64>()
            .with_context(|| format!("invalid status {:?}", field(&caps, "status")))?;
        let bytes_sent_raw = field(&caps, "bytes_sent");
        let bytes_sent = bytes_sent_raw
            .parse::<i64>()
            .with_context(|| format!("invalid bytes_sent {bytes_sent_raw:?}"))?;
        let request_time = field(&caps, "request_time")
            .parse::<f64>()
            .with_context(|| format!("invalid request_time {:?}", field(&caps, "request_time")))?;

        Ok(LogRecord {
            ip: field(&caps, "ip").to_string(),
            host: field(&caps, "host").to_string(),
            timestamp,
            method: field(&caps, "method").to_string(),
            path: field(&caps, "path").to_string(),
            status,
            bytes_sent,
            referer: field(&caps, "referer").to_string(),
            user_agent: field(&caps, "user_agent").to_string(),
            response_body_size: bytes_sent_raw.to_string(),
            request_time,
            processed_timestamp: current_timestamp(),
            session_id: None,
        })
    }
}

fn field<'a>(caps: &Captures<'a>, name: &str) -> &'a str {
    caps.name(name).map(|m| m.as_str()).unwrap_or_default()
}
