use crate::parsers::{drain_complete_lines, trim_line_bytes};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What to do with bytes after the last newline when a read reaches end of file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialLinePolicy {
    /// Leave the unterminated tail unconsumed; it is read again once its newline arrives.
    #[default]
    HoldBack,
    /// Treat the tail as a complete line and consume it.
    Consume,
}

/// Lines read from one byte range of the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadChunk {
    /// Every line in the range, terminators and trailing whitespace stripped. Blank lines are
    /// kept as empty strings so the caller can report them.
    pub lines: Vec<String>,
    /// Bytes read from the start offset up to end of file.
    pub bytes_read: u64,
    /// Bytes accounted for by `lines`, terminators included.
    pub consumed: u64,
}

impl ReadChunk {
    /// Bytes read but left for a later pass.
    pub fn held_back(&self) -> u64 {
        self.bytes_read.saturating_sub(self.consumed)
    }
}

/// Read-only view over the tailed log file.
#[derive(Debug, Clone)]
pub struct LogReader {
    path: PathBuf,
}

impl LogReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length, or `None` when the file does not exist.
    pub fn size(&self) -> Result<Option<u64>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("failed to stat log file {}", self.path.display())),
        }
    }

    /// Reads from `from_offset` to end of file as it stands when the read runs.
    ///
    /// `expected_end` is the size observed before the read; reading never stops there, so bytes
    /// appended in the meantime are picked up in the same call.
    ///
    /// Returns `None` when the file disappeared after it was last stat'ed.
    pub fn read_range(
        &self,
        from_offset: u64,
        expected_end: u64,
        policy: PartialLinePolicy,
    ) -> Result<Option<ReadChunk>> {
        let Some(buffer) = self.read_from(from_offset)? else {
            debug!(path = %self.path.display(), "log vanished before it could be read");
            return Ok(None);
        };
        let bytes_read = buffer.len() as u64;

        if from_offset.saturating_add(bytes_read) != expected_end {
            debug!(
                path = %self.path.display(),
                from_offset,
                expected_end,
                bytes_read,
                "log size changed while reading"
            );
        }

        let (raw_lines, complete_len) = drain_complete_lines(&buffer);
        let mut lines: Vec<String> = raw_lines.into_iter().map(decode_line).collect();

        let consumed = match policy {
            PartialLinePolicy::HoldBack => complete_len as u64,
            PartialLinePolicy::Consume => {
                if complete_len < buffer.len() {
                    lines.push(decode_line(buffer[complete_len..].to_vec()));
                }
                bytes_read
            }
        };

        Ok(Some(ReadChunk {
            lines,
            bytes_read,
            consumed,
        }))
    }

    fn read_from(&self, offset: u64) -> Result<Option<Vec<u8>>> {
        let mut file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", self.path.display()))
            }
        };
        file.seek(SeekFrom::Start(offset)).with_context(|| {
            format!("failed to seek {} to offset {}", self.path.display(), offset)
        })?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .with_context(|| format!("failed to read from {}", self.path.display()))?;
        Ok(Some(buffer))
    }
}

fn decode_line(raw: Vec<u8>) -> String {
    String::from_utf8_lossy(&trim_line_bytes(raw)).into_owned()
}
