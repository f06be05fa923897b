/// One parsed access-log entry.
///
/// Built once by a line parser and never mutated afterwards; the orchestrator hands it to the
/// record store and drops it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub ip: String,
    pub host: String,
    /// Event time in seconds since the epoch, taken from the line's own bracketed timestamp.
    pub timestamp: f64,
    pub method: String,
    pub path: String,
    pub status: i64,
    pub bytes_sent: i64,
    pub referer: String,
    pub user_agent: String,
    /// Mirrors `bytes_sent` as text; the log format carries no separate body size.
    pub response_body_size: String,
    /// Request duration in fractional seconds.
    pub request_time: f64,
    /// Wall-clock seconds since the epoch at the moment the line was parsed.
    pub processed_timestamp: f64,
    /// Reserved; the access-log grammar has no session field yet.
    pub session_id: Option<String>,
}
