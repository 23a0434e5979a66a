//! Byte-to-line framing shared by the serial and TCP sources
//!
//! Bytes arrive in arbitrary chunks; complete lines are split on `\n`, a
//! trailing `\r` is dropped and the bytes are decoded as UTF-8 (invalid
//! sequences are replaced rather than rejected).

use std::collections::VecDeque;

/// Longest partial line kept before it is emitted as-is
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024;

/// Accumulates raw bytes and yields complete lines in arrival order
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    lines: VecDeque<String>,
    max_line_len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a buffer that force-splits partial lines longer than `max_line_len`
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            pending: Vec::with_capacity(256),
            lines: VecDeque::new(),
            max_line_len: max_line_len.max(1),
        }
    }

    /// Feed a chunk of received bytes
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.complete_line();
            } else {
                self.pending.push(byte);
                if self.pending.len() >= self.max_line_len {
                    self.complete_line();
                }
            }
        }
    }

    /// Pop the oldest complete line
    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    /// Number of complete lines waiting
    pub fn ready(&self) -> usize {
        self.lines.len()
    }

    /// Bytes received since the last line break
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything, e.g. when the underlying handle is reopened
    pub fn clear(&mut self) {
        self.pending.clear();
        self.lines.clear();
    }

    fn complete_line(&mut self) {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.lines.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_chunked_input() {
        let mut buf = LineBuffer::new();
        buf.feed(b"23.");
        assert_eq!(buf.next_line(), None);
        buf.feed(b"4\r\n-1.2\n99");
        assert_eq!(buf.next_line().as_deref(), Some("23.4"));
        assert_eq!(buf.next_line().as_deref(), Some("-1.2"));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.pending_len(), 2);
        buf.feed(b".9\n");
        assert_eq!(buf.next_line().as_deref(), Some("99.9"));
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut buf = LineBuffer::new();
        buf.feed(b"\n\r\nx\n");
        assert_eq!(buf.ready(), 3);
        assert_eq!(buf.next_line().as_deref(), Some(""));
        assert_eq!(buf.next_line().as_deref(), Some(""));
        assert_eq!(buf.next_line().as_deref(), Some("x"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buf = LineBuffer::new();
        buf.feed(&[b'a', 0xFF, b'b', b'\n']);
        assert_eq!(buf.next_line().as_deref(), Some("a\u{FFFD}b"));
    }

    #[test]
    fn test_overlong_line_is_split() {
        let mut buf = LineBuffer::with_max_line_len(4);
        buf.feed(b"abcdefg\n");
        assert_eq!(buf.next_line().as_deref(), Some("abcd"));
        assert_eq!(buf.next_line().as_deref(), Some("efg"));
    }

    #[test]
    fn test_clear() {
        let mut buf = LineBuffer::new();
        buf.feed(b"done\npartial");
        buf.clear();
        assert_eq!(buf.ready(), 0);
        assert_eq!(buf.pending_len(), 0);
    }
}
