use std::time::{SystemTime, UNIX_EPOCH};

pub const LINE_PREVIEW_LIMIT: usize = 256;

/// Splits `buffer` at every `\n` and returns the complete lines (without terminators) plus the
/// number of bytes they covered. Bytes after the last newline are left untouched.
pub(crate) fn drain_complete_lines(buffer: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut lines = Vec::new();
    let mut start = 0usize;

    for (idx, byte) in buffer.iter().enumerate() {
        if *byte == b'\n' {
            lines.push(buffer[start..idx].to_vec());
            start = idx + 1;
        }
    }

    (lines, start)
}

pub(crate) fn trim_line_bytes(mut line: Vec<u8>) -> Vec<u8> {
    while line.last().map(|b| *b == b'\r' || *b == b' ') == Some(true) {
        line.pop();
    }
    line
}

/// Creates a preview string from a byte slice, truncating at `limit` characters with ellipsis.
pub fn line_preview(line: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(line);
    let mut preview = String::new();
    for (idx, ch) in text.chars().enumerate() {
        if idx >= limit {
            preview.push('…');
            return preview;
        }
        preview.push(ch);
    }
    preview
}

/// Wall-clock seconds since the epoch, with sub-second precision.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_only_newline_terminated_lines() {
        let (lines, consumed) = drain_complete_lines(b"first\nsecond\npartial");
        assert_eq!(lines, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(consumed, 13);
    }

    #[test]
    fn drain_without_newline_consumes_nothing() {
        let (lines, consumed) = drain_complete_lines(b"no newline yet");
        assert!(lines.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn trims_carriage_returns_and_trailing_spaces() {
        assert_eq!(trim_line_bytes(b"line \r".to_vec()), b"line".to_vec());
        assert_eq!(trim_line_bytes(b"\r".to_vec()), Vec::<u8>::new());
    }

    #[test]
    fn preview_truncates_long_lines() {
        let preview = line_preview("abcdef".as_bytes(), 3);
        assert_eq!(preview, "abc…");
        assert_eq!(line_preview(b"abc", 3), "abc");
    }
}
