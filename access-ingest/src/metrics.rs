//! Prometheus metrics for ingest passes.
//!
//! All metrics use the default Prometheus registry and follow naming conventions:
//! - Histograms: *_seconds (for latency)
//! - Counters: *_total (for counts)
//!
//! A pass is a short-lived process, so instead of serving `/metrics` the runner can dump the
//! registry into a textfile for a node-exporter textfile collector.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};
use std::fs;
use std::path::Path;

lazy_static! {
    // ==================== LATENCY METRICS ====================
    pub static ref PASS_DURATION: Histogram = register_histogram!(
        "access_ingest_pass_duration_seconds",
        "Wall time of one ingest pass",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .unwrap();

    // ==================== THROUGHPUT METRICS ====================
    pub static ref LINES_READ_TOTAL: IntCounter = register_int_counter!(
        "access_ingest_lines_read_total",
        "Log lines read, blank ones included"
    )
    .unwrap();
    pub static ref RECORDS_FILTERED_TOTAL: IntCounter = register_int_counter!(
        "access_ingest_records_filtered_total",
        "Parsed records dropped by the importance filter"
    )
    .unwrap();
    pub static ref RECORDS_INSERTED_TOTAL: IntCounter = register_int_counter!(
        "access_ingest_records_inserted_total",
        "Records written to the record store"
    )
    .unwrap();

    // ==================== ERROR COUNTERS ====================
    pub static ref MALFORMED_LINES_TOTAL: IntCounter = register_int_counter!(
        "access_ingest_malformed_lines_total",
        "Lines dropped because they could not be parsed"
    )
    .unwrap();
    pub static ref TRUNCATIONS_TOTAL: IntCounter = register_int_counter!(
        "access_ingest_truncations_total",
        "Passes that found the log shorter than the stored cursor"
    )
    .unwrap();
    pub static ref MISSING_LOG_TOTAL: IntCounter = register_int_counter!(
        "access_ingest_missing_log_total",
        "Passes that found no log file"
    )
    .unwrap();

    // ==================== GAUGE METRICS ====================
    pub static ref CURSOR_OFFSET: IntGauge = register_int_gauge!(
        "access_ingest_cursor_offset",
        "Byte offset stored by the most recent pass"
    )
    .unwrap();
}

/// Renders the default registry in the Prometheus text exposition format.
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("failed to encode metrics")?;
    String::from_utf8(buffer).context("metrics encoding produced invalid UTF-8")
}

/// Atomically replaces `path` with the current registry contents.
pub fn write_textfile(path: &Path) -> Result<()> {
    let rendered = render()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create metrics directory {}", parent.display()))?;
    }

    let temp_path = path.with_extension("prom.tmp");
    fs::write(&temp_path, rendered)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })
}
