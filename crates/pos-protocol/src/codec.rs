//! Streaming line splitter
//!
//! Serial reads arrive in arbitrary chunks. [`LineCodec`] buffers them and
//! yields one complete line at a time with the terminator stripped.

use tracing::warn;

use crate::MAX_LINE_LEN;

/// Buffers raw bytes and yields complete lines
///
/// Lines end in `\n`; a preceding `\r` is stripped. Blank lines are
/// skipped. If the buffer grows past [`MAX_LINE_LEN`] without a
/// terminator, the buffered bytes are yielded as a line on their own so
/// the decoder can reject them instead of the buffer growing forever.
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete line, if available
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(term_pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > MAX_LINE_LEN {
                    warn!(
                        "Discarding {} buffered bytes with no line terminator",
                        self.buffer.len()
                    );
                    return Some(std::mem::take(&mut self.buffer));
                }
                return None;
            };

            let mut line: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            return Some(line);
        }
    }

    /// Number of bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"SUCCESS|Approved|TXN1\r\n");
        assert_eq!(codec.next_line().unwrap(), b"SUCCESS|Approved|TXN1");
        assert!(codec.next_line().is_none());
    }

    #[test]
    fn test_streaming_parse() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"DECL");
        assert!(codec.next_line().is_none());
        codec.push_bytes(b"INED|No|");
        assert!(codec.next_line().is_none());
        codec.push_bytes(b"\r");
        assert!(codec.next_line().is_none());
        codec.push_bytes(b"\nTEST\n");
        assert_eq!(codec.next_line().unwrap(), b"DECLINED|No|");
        assert_eq!(codec.next_line().unwrap(), b"TEST");
        assert_eq!(codec.pending(), 0);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"\r\n\r\n  \r\nOK\r\n");
        assert_eq!(codec.next_line().unwrap(), b"OK");
        assert!(codec.next_line().is_none());
    }

    #[test]
    fn test_overflow_is_flushed() {
        let mut codec = LineCodec::new();
        codec.push_bytes(&vec![b'X'; MAX_LINE_LEN + 10]);
        let line = codec.next_line().unwrap();
        assert_eq!(line.len(), MAX_LINE_LEN + 10);
        assert_eq!(codec.pending(), 0);
    }
}
