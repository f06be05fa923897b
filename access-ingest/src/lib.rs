//! Incremental ingestion of a web-server access log into SQLite.
//!
//! Each call to [`pipeline::Pipeline::run_pass`] consumes the bytes appended to the log since the
//! previous pass, keeps the records the importance filter cares about and appends them to the
//! record store. Continuous tailing is the caller's job: run a pass on a schedule.

pub mod checkpoint;
pub mod config;
pub mod diagnostics;
pub mod filter;
pub mod metrics;
pub mod output_writer;
pub mod parsers;
pub mod pipeline;
pub mod record;
pub mod runner;
pub mod tailer;
