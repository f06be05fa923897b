use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::metrics;
use crate::output_writer::RecordSink;
use crate::pipeline::PassSummary;
use crate::runner::{build_pipeline, build_record_store, IngestPaths};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Run exactly one ingest pass.
///
/// The destination table is created up front so a fresh deployment has something to query even
/// before the first record arrives. Metrics are flushed to the configured textfile whether or
/// not the pass succeeded.
pub fn run(
    config: &Config,
    paths: &IngestPaths,
    diagnostics: Arc<dyn Diagnostics>,
) -> Result<PassSummary> {
    info!(
        log = %paths.log.display(),
        database = %paths.database.display(),
        cursor = %paths.cursor.display(),
        "starting ingest pass"
    );

    let result = prepare_and_run(config, paths, diagnostics.clone());

    if let Some(textfile) = config.metrics_textfile_path() {
        if let Err(err) = metrics::write_textfile(&textfile) {
            warn!(
                error = %err,
                path = %textfile.display(),
                "failed to write metrics textfile"
            );
        }
    }

    result
}

fn prepare_and_run(
    config: &Config,
    paths: &IngestPaths,
    diagnostics: Arc<dyn Diagnostics>,
) -> Result<PassSummary> {
    let setup = || -> Result<_> {
        build_record_store(config, paths)?
            .ensure_schema()
            .context("failed to prepare record store")?;
        build_pipeline(config, paths, diagnostics.clone())
    };

    let pipeline = match setup() {
        Ok(pipeline) => pipeline,
        Err(err) => {
            diagnostics.pass_failed(&err);
            return Err(err);
        }
    };

    pipeline.run_pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{RecordingDiagnostics, Report};
    use crate::pipeline::PassOutcome;
    use std::fs;

    const LINE: &str = r#"198.51.100.4 - api.example.net [01/Jan/2024:00:00:01 +0000] "POST /v1/orders HTTP/2.0" 201 88 0.310 "-" "okhttp/4.12""#;

    fn paths_in(dir: &tempfile::TempDir) -> IngestPaths {
        IngestPaths {
            log: dir.path().join("access.log"),
            database: dir.path().join("db").join("logs.db"),
            cursor: dir.path().join("state").join("cursor"),
        }
    }

    #[test]
    fn creates_schema_even_without_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(&dir);
        let summary = run(
            &Config::default(),
            &paths,
            Arc::new(RecordingDiagnostics::new()),
        )
        .expect("pass");

        assert_eq!(summary.outcome, PassOutcome::LogMissing);
        let store = build_record_store(&Config::default(), &paths).expect("store");
        assert!(paths.database.exists());
        assert_eq!(store.row_count().expect("count"), 0);
    }

    #[test]
    fn honours_configured_table_backend_and_metrics_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(&dir);
        fs::write(&paths.log, format!("{LINE}\n{LINE}\n")).expect("write log");
        let textfile = dir.path().join("metrics.prom");

        let config = Config::from_toml(&format!(
            "[store]\ntable = \"requests\"\n[cursor]\nbackend = \"sqlite\"\n[metrics]\ntextfile = \"{}\"\n",
            textfile.display()
        ))
        .expect("config");

        let summary = run(&config, &paths, Arc::new(RecordingDiagnostics::new())).expect("pass");
        assert_eq!(summary.inserted, 2);

        let store = build_record_store(&config, &paths).expect("store");
        assert_eq!(store.table(), "requests");
        assert_eq!(store.row_count().expect("count"), 2);
        assert!(fs::read_to_string(&textfile)
            .expect("metrics textfile")
            .contains("access_ingest_records_inserted_total"));

        let again = run(&config, &paths, Arc::new(RecordingDiagnostics::new())).expect("pass");
        assert_eq!(again.inserted, 0);
    }

    #[test]
    fn setup_failures_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(&dir);
        let mut config = Config::default();
        config.store.table = "bad name".to_string();
        let diagnostics = Arc::new(RecordingDiagnostics::new());

        assert!(run(&config, &paths, diagnostics.clone()).is_err());
        assert!(matches!(
            diagnostics.reports().as_slice(),
            [Report::PassFailed(message)] if message.contains("invalid table name")
        ));
    }
}
