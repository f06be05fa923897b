//! One incremental ingest pass over the access log.
//!
//! A pass reads the stored cursor, works out which bytes of the log are new, parses and filters
//! the lines found there, stores the new cursor and finally appends the surviving records.
//!
//! The cursor is written *before* the records. A crash between the two loses that pass's records
//! but never inserts them twice: the next pass starts after the range already marked consumed.
//! The record store has no uniqueness constraint, so the cursor is the only guard against
//! duplicates.

use crate::checkpoint::CursorStore;
use crate::diagnostics::Diagnostics;
use crate::filter::{ImportanceFilter, RecordFilter};
use crate::metrics;
use crate::output_writer::RecordSink;
use crate::parsers::{AccessLogParser, LineParser};
use crate::record::LogRecord;
use crate::tailer::{LogReader, PartialLinePolicy};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The log did not exist; the cursor was reset to 0.
    LogMissing,
    /// New bytes (possibly none) after the stored cursor were processed.
    Ingested,
    /// The log was shorter than the stored cursor, so it was read again from offset 0.
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub outcome: PassOutcome,
    pub start_offset: u64,
    pub end_offset: u64,
    pub lines_read: usize,
    pub malformed: usize,
    pub filtered: usize,
    pub inserted: usize,
    pub held_back_bytes: u64,
}

impl PassSummary {
    fn log_missing() -> Self {
        Self {
            outcome: PassOutcome::LogMissing,
            start_offset: 0,
            end_offset: 0,
            lines_read: 0,
            malformed: 0,
            filtered: 0,
            inserted: 0,
            held_back_bytes: 0,
        }
    }
}

pub struct Pipeline {
    reader: LogReader,
    cursor: Box<dyn CursorStore>,
    parser: Box<dyn LineParser>,
    filter: Box<dyn RecordFilter>,
    sink: Box<dyn RecordSink>,
    diagnostics: Arc<dyn Diagnostics>,
    partial_lines: PartialLinePolicy,
}

impl Pipeline {
    /// Builds a pipeline with the access-log grammar, the default importance filter and
    /// unterminated tails held back.
    pub fn new(
        reader: LogReader,
        cursor: Box<dyn CursorStore>,
        sink: Box<dyn RecordSink>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            reader,
            cursor,
            parser: Box::new(AccessLogParser::new()),
            filter: Box::new(ImportanceFilter::default()),
            sink,
            diagnostics,
            partial_lines: PartialLinePolicy::default(),
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn LineParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_partial_lines(mut self, policy: PartialLinePolicy) -> Self {
        self.partial_lines = policy;
        self
    }

    /// Runs one full pass. Fatal errors are reported to diagnostics and returned.
    pub fn run_pass(&self) -> Result<PassSummary> {
        let started = Instant::now();
        let result = self.execute_pass();
        metrics::PASS_DURATION.observe(started.elapsed().as_secs_f64());

        if let Err(err) = &result {
            self.diagnostics.pass_failed(err);
        }
        result
    }

    fn execute_pass(&self) -> Result<PassSummary> {
        let path = self.reader.path();

        let Some(current_size) = self.reader.size()? else {
            return self.reset_for_missing_log();
        };

        let last_cursor = self.cursor.read().context("failed to read cursor")?;

        let (outcome, start_offset) = if current_size < last_cursor {
            warn!(
                path = %path.display(),
                previous_offset = last_cursor,
                current_size,
                "log truncated or rotated; reading from the beginning"
            );
            metrics::TRUNCATIONS_TOTAL.inc();
            (PassOutcome::Truncated, 0)
        } else {
            (PassOutcome::Ingested, last_cursor)
        };

        let Some(chunk) = self
            .reader
            .read_range(start_offset, current_size, self.partial_lines)?
        else {
            return self.reset_for_missing_log();
        };
        let read_end = start_offset + chunk.bytes_read;

        let end_offset = match (self.partial_lines, self.reader.size()?) {
            (PartialLinePolicy::Consume, Some(size_after_read)) => size_after_read,
            (_, size_after_read) => {
                if let Some(size) = size_after_read.filter(|size| *size > read_end) {
                    debug!(
                        path = %path.display(),
                        pending_bytes = size - read_end,
                        "log grew after read; remainder left for the next pass"
                    );
                }
                start_offset + chunk.consumed
            }
        };

        let lines_read = chunk.lines.len();
        metrics::LINES_READ_TOTAL.inc_by(lines_read as u64);

        let parsed = self.parse_lines(&chunk.lines);
        let malformed = lines_read - parsed.len();

        let parsed_count = parsed.len();
        let records: Vec<LogRecord> = parsed
            .into_iter()
            .filter(|record| self.filter.is_important(record))
            .collect();
        let filtered = parsed_count - records.len();
        metrics::RECORDS_FILTERED_TOTAL.inc_by(filtered as u64);

        self.store_cursor(end_offset)?;

        let inserted = self
            .sink
            .bulk_insert(&records)
            .context("failed to persist records")?;
        metrics::RECORDS_INSERTED_TOTAL.inc_by(inserted as u64);

        let summary = PassSummary {
            outcome,
            start_offset,
            end_offset,
            lines_read,
            malformed,
            filtered,
            inserted,
            held_back_bytes: chunk.held_back(),
        };

        info!(
            path = %path.display(),
            start_offset,
            end_offset,
            lines_read,
            malformed,
            filtered,
            inserted,
            held_back_bytes = summary.held_back_bytes,
            "ingest pass complete"
        );

        Ok(summary)
    }

    fn reset_for_missing_log(&self) -> Result<PassSummary> {
        self.diagnostics.log_missing(self.reader.path());
        metrics::MISSING_LOG_TOTAL.inc();
        self.store_cursor(0)?;
        Ok(PassSummary::log_missing())
    }

    /// Blank lines reach the parser like any other line and are reported when it rejects them.
    fn parse_lines(&self, lines: &[String]) -> Vec<LogRecord> {
        let mut records = Vec::with_capacity(lines.len());
        for line in lines {
            match self.parser.parse_line(line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    metrics::MALFORMED_LINES_TOTAL.inc();
                    self.diagnostics.malformed_line(line, &format!("{err:#}"));
                }
            }
        }
        records
    }

    fn store_cursor(&self, offset: u64) -> Result<()> {
        self.cursor
            .write(offset)
            .context("failed to persist cursor")?;
        metrics::CURSOR_OFFSET.set(i64::try_from(offset).unwrap_or(i64::MAX));
        Ok(())
    }
}
