//! Bounded line scanner
//!
//! Chunks from the HTTP body arrive at arbitrary boundaries. The scanner buffers
//! at most one partial line and refuses to grow past [`MAX_LINE_LENGTH`], so a
//! misbehaving device cannot make the bridge buffer unbounded data.

use super::StreamError;
use bytes::{Bytes, BytesMut};

/// Longest accepted line, terminator excluded
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Splits a byte stream into lines on `\n`, dropping one trailing `\r`
#[derive(Debug)]
pub struct LineScanner {
    buffer: BytesMut,
    /// Bytes of `buffer` already searched for a newline
    scanned: usize,
    max_line: usize,
}

impl Default for LineScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LineScanner {
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_LENGTH)
    }

    pub fn with_limit(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_line,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of bytes waiting for a line terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete line, or `None` until more input arrives
    pub fn next_line(&mut self) -> Result<Option<Bytes>, StreamError> {
        let newline = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| self.scanned + pos);

        match newline {
            Some(pos) => {
                self.scanned = 0;
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos - 1);
                }
                if line.len() > self.max_line {
                    return Err(StreamError::LineTooLong {
                        limit: self.max_line,
                    });
                }
                Ok(Some(line.freeze()))
            }
            None => {
                if self.buffer.len() > self.max_line {
                    return Err(StreamError::LineTooLong {
                        limit: self.max_line,
                    });
                }
                self.scanned = self.buffer.len();
                Ok(None)
            }
        }
    }

    /// Remaining unterminated line at end of stream
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = self.buffer.split();
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }
}
