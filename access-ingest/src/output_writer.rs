use crate::record::LogRecord;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_TABLE: &str = "logs";

/// Append-only destination for records that survived filtering.
pub trait RecordSink: Send + Sync {
    /// Creates the destination if absent. Safe to call repeatedly.
    fn ensure_schema(&self) -> Result<()>;

    /// Appends `records` in order as one all-or-nothing unit and returns how many were written.
    ///
    /// An empty slice is a no-op that touches nothing.
    fn bulk_insert(&self, records: &[LogRecord]) -> Result<usize>;
}

/// SQLite-backed record store. Opens a fresh connection per call.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
    table: String,
}

impl SqliteRecordStore {
    pub fn new(db_path: impl AsRef<Path>, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            db_path: db_path.as_ref().to_path_buf(),
            table,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of rows currently stored, 0 if the table does not exist yet.
    pub fn row_count(&self) -> Result<u64> {
        let conn = self.open_connection()?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![self.table],
                |row| row.get(0),
            )
            .context("failed to look up record table")?;
        if !exists {
            return Ok(0);
        }

        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .context("failed to count records")?;
        Ok(count as u64)
    }

    fn open_connection(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("failed to open record db {}", self.db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL mode for record db")?;
        Ok(conn)
    }

    fn create_table_sql(&self) -> String {
        format!(
            "
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT,
                host TEXT,
                timestamp REAL,
                method TEXT,
                path TEXT,
                status INTEGER,
                bytes_sent INTEGER,
                referer TEXT,
                user_agent TEXT,
                response_body_size TEXT,
                request_time REAL,
                processed_timestamp REAL
            )
            ",
            self.table
        )
    }

    fn insert_sql(&self) -> String {
        format!(
            "
            INSERT INTO {} (
                ip, host, timestamp, method, path, status, bytes_sent,
                referer, user_agent, response_body_size, request_time, processed_timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
            self.table
        )
    }
}

impl RecordSink for SqliteRecordStore {
    fn ensure_schema(&self) -> Result<()> {
        let conn = self.open_connection()?;
        conn.execute_batch(&self.create_table_sql())
            .with_context(|| format!("failed to create table {}", self.table))?;
        Ok(())
    }

    fn bulk_insert(&self, records: &[LogRecord]) -> Result<usize> {
        if records.is_empty() {
            debug!(table = %self.table, "no records to insert");
            return Ok(0);
        }

        let mut conn = self.open_connection()?;
        let tx = conn
            .transaction()
            .context("failed to begin insert transaction")?;

        tx.execute_batch(&self.create_table_sql())
            .with_context(|| format!("failed to create table {}", self.table))?;

        {
            let mut stmt = tx
                .prepare(&self.insert_sql())
                .context("failed to prepare insert statement")?;
            for (index, record) in records.iter().enumerate() {
                stmt.execute(params![
                    record.ip,
                    record.host,
                    record.timestamp,
                    record.method,
                    record.path,
                    record.status,
                    record.bytes_sent,
                    record.referer,
                    record.user_agent,
                    record.response_body_size,
                    record.request_time,
                    record.processed_timestamp,
                ])
                .with_context(|| format!("failed to insert record {index} into {}", self.table))?;
            }
        }

        tx.commit().context("failed to commit inserted records")?;

        info!(
            table = %self.table,
            record_count = records.len(),
            "inserted records into the database"
        );
        Ok(records.len())
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|ch| ch.is_ascii_alphabetic() || ch == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        bail!("invalid table name {table:?}; expected [A-Za-z_][A-Za-z0-9_]*");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, status: i64) -> LogRecord {
        LogRecord {
            ip: "10.1.2.3".to_string(),
            host: "example.org".to_string(),
            timestamp: 1_700_000_000.0,
            method: "POST".to_string(),
            path: path.to_string(),
            status,
            bytes_sent: 512,
            referer: "-".to_string(),
            user_agent: "curl/8.4.0".to_string(),
            response_body_size: "512".to_string(),
            request_time: 0.25,
            processed_timestamp: 1_700_000_100.5,
            session_id: None,
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> SqliteRecordStore {
        SqliteRecordStore::new(dir.path().join("logs.db"), DEFAULT_TABLE).expect("store")
    }

    #[test]
    fn empty_batch_does_not_create_the_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        assert_eq!(store.bulk_insert(&[]).expect("insert"), 0);
        assert!(!store.db_path().exists());
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store.ensure_schema().expect("first");
        store.ensure_schema().expect("second");
        assert_eq!(store.row_count().expect("count"), 0);
    }

    #[test]
    fn inserts_rows_in_input_order_with_all_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let records = vec![record("/first", 200), record("/second", 201)];

        assert_eq!(store.bulk_insert(&records).expect("insert"), 2);
        assert_eq!(store.bulk_insert(&records[..1]).expect("insert"), 1);

        let conn = Connection::open(store.db_path()).expect("open");
        let mut stmt = conn
            .prepare("SELECT id, path, status, bytes_sent, response_body_size, request_time FROM logs ORDER BY id")
            .expect("prepare");
        let rows: Vec<(i64, String, i64, i64, String, f64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .expect("query")
            .collect::<rusqlite::Result<_>>()
            .expect("rows");

        assert_eq!(
            rows,
            vec![
                (1, "/first".to_string(), 200, 512, "512".to_string(), 0.25),
                (2, "/second".to_string(), 201, 512, "512".to_string(), 0.25),
                (3, "/first".to_string(), 200, 512, "512".to_string(), 0.25),
            ]
        );
    }

    #[test]
    fn failed_insert_rolls_back_the_whole_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let conn = Connection::open(store.db_path()).expect("open");
        conn.execute_batch(
            "
            CREATE TABLE logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT, host TEXT, timestamp REAL, method TEXT, path TEXT,
                status INTEGER CHECK (status < 300),
                bytes_sent INTEGER, referer TEXT, user_agent TEXT,
                response_body_size TEXT, request_time REAL, processed_timestamp REAL
            );
            ",
        )
        .expect("seed constrained table");
        drop(conn);

        let err = store
            .bulk_insert(&[record("/ok", 200), record("/redirect", 302)])
            .expect_err("constraint violation must fail the batch");
        assert!(format!("{err:#}").contains("failed to insert record 1"));
        assert_eq!(store.row_count().expect("count"), 0);
    }

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(SqliteRecordStore::new("db.sqlite", "logs; DROP TABLE x").is_err());
        assert!(SqliteRecordStore::new("db.sqlite", "1logs").is_err());
        assert!(SqliteRecordStore::new("db.sqlite", "").is_err());
        assert!(SqliteRecordStore::new("db.sqlite", "access_logs_2").is_ok());
    }
}
