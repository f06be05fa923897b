//! Durable storage for the ingest cursor: the byte offset up to which the log has been consumed.

use crate::parsers::current_timestamp;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Single-writer cursor storage.
///
/// `read` must return 0 when nothing was ever written. `write` replaces the previous value
/// completely. No locking is performed.
pub trait CursorStore: Send + Sync {
    fn read(&self) -> Result<u64>;
    fn write(&self, offset: u64) -> Result<()>;
}

/// Cursor kept as a base-10 integer in a small text file.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "cursor".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CursorStore for FileCursorStore {
    fn read(&self) -> Result<u64> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read cursor {}", self.path.display()))
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            warn!(path = %self.path.display(), "cursor file is empty; starting from offset 0");
            return Ok(0);
        }

        trimmed.parse::<u64>().with_context(|| {
            format!(
                "cursor file {} does not hold a byte offset: {trimmed:?}",
                self.path.display()
            )
        })
    }

    fn write(&self, offset: u64) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cursor directory {}", parent.display())
            })?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("failed to create {}", temp_path.display()))?;
        file.write_all(offset.to_string().as_bytes())
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", temp_path.display()))?;
        drop(file);

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        debug!(path = %self.path.display(), offset, "cursor persisted");
        Ok(())
    }
}

/// Cursor kept as a row in a SQLite `cursors` table, keyed by the tailed log's path.
///
/// Lets several logs share one cursor database, one row each.
#[derive(Debug, Clone)]
pub struct SqliteCursorStore {
    db_path: PathBuf,
    log_key: String,
}

#[derive(Debug, Clone)]
pub struct CursorRecord {
    pub log_path: PathBuf,
    pub byte_offset: u64,
    pub updated_at: f64,
}

impl SqliteCursorStore {
    pub fn new(db_path: impl AsRef<Path>, log_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cursor directory {}", parent.display())
            })?;
        }

        let conn = open_connection(&db_path)?;
        initialize_schema(&conn)?;

        Ok(Self {
            db_path,
            log_key: normalize_path(log_path.as_ref()),
        })
    }

    pub fn get(&self) -> Result<Option<CursorRecord>> {
        let conn = open_connection(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "
                SELECT log_path, byte_offset, updated_at
                FROM cursors
                WHERE log_path = ?1
                ",
            )
            .context("failed to prepare cursor select statement")?;

        stmt.query_row(params![self.log_key], |row| {
            let log_path: String = row.get(0)?;
            Ok(CursorRecord {
                log_path: PathBuf::from(log_path),
                byte_offset: row.get::<_, i64>(1)? as u64,
                updated_at: row.get(2)?,
            })
        })
        .optional()
        .context("failed to query cursors table")
    }
}

impl CursorStore for SqliteCursorStore {
    fn read(&self) -> Result<u64> {
        Ok(self.get()?.map(|rec| rec.byte_offset).unwrap_or(0))
    }

    fn write(&self, offset: u64) -> Result<()> {
        let offset = i64::try_from(offset).context("cursor offset exceeds SQLite integer range")?;
        let conn = open_connection(&self.db_path)?;
        conn.execute(
            "
            INSERT INTO cursors (log_path, byte_offset, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(log_path) DO UPDATE SET
                byte_offset = excluded.byte_offset,
                updated_at = excluded.updated_at
            ",
            params![self.log_key, offset, current_timestamp()],
        )
        .context("failed to upsert cursor record")?;

        debug!(db = %self.db_path.display(), log = %self.log_key, offset, "cursor persisted");
        Ok(())
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open cursor db {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL mode for cursor db")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set cursor db synchronous mode")?;

    Ok(conn)
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cursors (
            log_path TEXT PRIMARY KEY,
            byte_offset INTEGER NOT NULL,
            updated_at REAL NOT NULL
        );
        ",
    )
    .context("failed to create cursors table")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_cursor_defaults_to_zero_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCursorStore::new(dir.path().join("cursor.txt"));
        assert_eq!(store.read().expect("read"), 0);
    }

    #[test]
    fn file_cursor_overwrites_previous_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("cursor.txt");
        let store = FileCursorStore::new(&path);

        store.write(123_456).expect("first write");
        store.write(7).expect("second write");

        assert_eq!(store.read().expect("read"), 7);
        assert_eq!(fs::read_to_string(&path).expect("raw cursor"), "7");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn file_cursor_tolerates_surrounding_whitespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cursor.txt");
        fs::write(&path, " 42\n").expect("seed cursor");
        assert_eq!(FileCursorStore::new(&path).read().expect("read"), 42);
    }

    #[test]
    fn empty_file_cursor_reads_as_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cursor.txt");
        fs::write(&path, "").expect("seed cursor");
        assert_eq!(FileCursorStore::new(&path).read().expect("read"), 0);
    }

    #[test]
    fn corrupt_file_cursor_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cursor.txt");
        fs::write(&path, "not-a-number").expect("seed cursor");
        let err = FileCursorStore::new(&path)
            .read()
            .expect_err("garbage must not read as an offset");
        assert!(format!("{err:#}").contains("does not hold a byte offset"));
    }

    #[test]
    fn file_cursor_write_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").expect("create blocker");
        let store = FileCursorStore::new(blocker.join("cursor.txt"));
        assert!(store.write(10).is_err());
    }

    #[test]
    fn sqlite_cursor_round_trips_per_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("cursors.db");
        let access = SqliteCursorStore::new(&db, "/var/log/access.log").expect("open");
        let other = SqliteCursorStore::new(&db, "/var/log/other.log").expect("open");

        assert_eq!(access.read().expect("read"), 0);
        access.write(512).expect("write");
        access.write(1024).expect("overwrite");

        assert_eq!(access.read().expect("read"), 1024);
        assert_eq!(other.read().expect("read"), 0);

        let record = access.get().expect("get").expect("row exists");
        assert_eq!(record.log_path, PathBuf::from("/var/log/access.log"));
        assert!(record.updated_at > 0.0);
    }
}
