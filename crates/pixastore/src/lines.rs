//! Strict line-oriented reader for the journal
//!
//! A line ends with `\n` or `\r\n`; the terminator is not part of the result.
//! Clean end-of-input is reported as `Ok(None)`, distinct from I/O failure,
//! so the journal replay can tell a complete file from one that broke
//! mid-read. An unterminated trailing line is discarded; callers can detect
//! it through [`LineReader::has_unterminated_line`].

use std::io::{self, Read};

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// Default buffer capacity in bytes
const DEFAULT_CAPACITY: usize = 8192;

/// Buffered reader restricted to strictly line-structured ASCII input
pub(crate) struct LineReader<R> {
    input: R,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
    unterminated: bool,
}

impl<R: Read> LineReader<R> {
    /// Create a reader with the default buffer capacity
    pub(crate) fn new(input: R) -> Self {
        Self::with_capacity(input, DEFAULT_CAPACITY)
    }

    /// Create a reader with the given buffer capacity
    pub(crate) fn with_capacity(input: R, capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            input,
            buf: vec![0; capacity],
            pos: 0,
            end: 0,
            unterminated: false,
        }
    }

    /// Read the next line, or `None` at clean end of input
    pub(crate) fn read_line(&mut self) -> io::Result<Option<String>> {
        // Bytes carried over from previous buffer fills while searching for
        // the terminator of the current line.
        let mut pending: Vec<u8> = Vec::new();

        loop {
            if self.pos >= self.end {
                let read = self.input.read(&mut self.buf)?;
                if read == 0 {
                    if !pending.is_empty() {
                        self.unterminated = true;
                    }
                    return Ok(None);
                }
                self.pos = 0;
                self.end = read;
            }

            if let Some(at) = self.buf[self.pos..self.end]
                .iter()
                .position(|&b| b == LF)
            {
                pending.extend_from_slice(&self.buf[self.pos..self.pos + at]);
                self.pos += at + 1;
                if pending.last() == Some(&CR) {
                    pending.pop();
                }
                return Ok(Some(into_ascii(pending)?));
            }

            pending.extend_from_slice(&self.buf[self.pos..self.end]);
            self.pos = self.end;
        }
    }

    /// Whether the input ended with a line missing its terminator
    pub(crate) fn has_unterminated_line(&self) -> bool {
        self.unterminated
    }
}

fn into_ascii(bytes: Vec<u8>) -> io::Result<String> {
    if !bytes.is_ascii() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "journal line contains non-ASCII bytes",
        ));
    }
    // ASCII is valid UTF-8
    String::from_utf8(bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "journal line is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8]) -> LineReader<&[u8]> {
        LineReader::new(bytes)
    }

    #[test]
    fn test_read_lines_lf() {
        let mut r = reader(b"alpha\nbeta\n");

        assert_eq!(r.read_line().unwrap().as_deref(), Some("alpha"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("beta"));
        assert_eq!(r.read_line().unwrap(), None);
        assert!(!r.has_unterminated_line());
    }

    #[test]
    fn test_read_lines_crlf() {
        let mut r = reader(b"alpha\r\nbeta\r\n");

        assert_eq!(r.read_line().unwrap().as_deref(), Some("alpha"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("beta"));
        assert_eq!(r.read_line().unwrap(), None);
    }

    #[test]
    fn test_empty_lines() {
        let mut r = reader(b"\n\nx\n");

        assert_eq!(r.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(r.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("x"));
        assert_eq!(r.read_line().unwrap(), None);
    }

    #[test]
    fn test_unterminated_tail_is_discarded() {
        let mut r = reader(b"alpha\nbet");

        assert_eq!(r.read_line().unwrap().as_deref(), Some("alpha"));
        assert_eq!(r.read_line().unwrap(), None);
        assert!(r.has_unterminated_line());
    }

    #[test]
    fn test_line_spanning_buffer_fills() {
        let mut r = LineReader::with_capacity(&b"aaaaaaaaaabbbbb\ncc\n"[..], 4);

        assert_eq!(r.read_line().unwrap().as_deref(), Some("aaaaaaaaaabbbbb"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("cc"));
        assert_eq!(r.read_line().unwrap(), None);
    }

    #[test]
    fn test_cr_split_across_fills() {
        let mut r = LineReader::with_capacity(&b"abc\r\nd\n"[..], 4);

        assert_eq!(r.read_line().unwrap().as_deref(), Some("abc"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("d"));
    }

    #[test]
    fn test_non_ascii_is_an_error() {
        let mut r = reader(b"caf\xc3\xa9\n");

        assert!(r.read_line().is_err());
    }

    #[test]
    fn test_empty_input() {
        let mut r = reader(b"");

        assert_eq!(r.read_line().unwrap(), None);
        assert!(!r.has_unterminated_line());
    }
}
