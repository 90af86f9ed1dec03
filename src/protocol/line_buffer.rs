//! Line buffer for reassembling a reply from partial reads.
//!
//! Uses `bytes::BytesMut` so the finished line can be frozen without a copy.
//! Serial replies arrive one byte at a time, I2C replies in chunks of up to
//! `max_chunk` bytes; both feed the same buffer:
//! - `Empty`: nothing received yet
//! - `Partial`: bytes received, no terminator yet
//! - `Terminated`: a `\n` has been seen
//!
//! # Example
//!
//! ```
//! use notecard_link::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new(1024);
//! assert!(!buffer.push(b"{\"total\"").unwrap());
//! assert!(buffer.push(b":3}\r\n").unwrap());
//! assert_eq!(&buffer.take_line().unwrap()[..], b"{\"total\":3}\r\n");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::NEWLINE;
use crate::error::{NotecardError, Result};

/// Initial allocation; grown on demand up to the ceiling.
const INITIAL_CAPACITY: usize = 128;

/// Reassembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Empty,
    Partial,
    /// Terminator found; the line is `buffer[..end]`.
    Terminated { end: usize },
}

/// Buffer that accumulates bytes until a newline-terminated line is complete.
pub struct LineBuffer {
    buffer: BytesMut,
    state: State,
    max_len: usize,
}

impl LineBuffer {
    /// Create a buffer that refuses to grow past `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY.min(max_len)),
            state: State::Empty,
            max_len,
        }
    }

    /// Append received bytes.
    ///
    /// Returns `true` once the accumulated bytes contain a terminator.
    ///
    /// # Errors
    ///
    /// Returns `ResponseTooLarge` if the data would exceed the ceiling; the
    /// buffer is left unchanged in that case.
    pub fn push(&mut self, data: &[u8]) -> Result<bool> {
        if data.is_empty() {
            return Ok(self.is_terminated());
        }

        if self.buffer.len() + data.len() > self.max_len {
            return Err(NotecardError::ResponseTooLarge {
                limit: self.max_len,
            });
        }

        let start = self.buffer.len();
        self.buffer.extend_from_slice(data);

        match self.state {
            State::Terminated { .. } => {}
            State::Empty | State::Partial => {
                self.state = match data.iter().position(|b| *b == NEWLINE) {
                    Some(pos) => State::Terminated {
                        end: start + pos + 1,
                    },
                    None => State::Partial,
                };
            }
        }

        Ok(self.is_terminated())
    }

    /// Append a single byte (serial receive path).
    #[inline]
    pub fn push_byte(&mut self, byte: u8) -> Result<bool> {
        self.push(&[byte])
    }

    /// True once a terminator has been seen.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        matches!(self.state, State::Terminated { .. })
    }

    /// Remove and return the completed line, terminator included.
    ///
    /// Bytes that arrived after the terminator are discarded; they cannot
    /// belong to the current exchange. Returns `None` if no line is complete.
    pub fn take_line(&mut self) -> Option<Bytes> {
        let State::Terminated { end } = self.state else {
            return None;
        };

        let line = self.buffer.split_to(end).freeze();
        if !self.buffer.is_empty() {
            tracing::warn!(
                "Discarding {} bytes received after the reply terminator",
                self.buffer.len()
            );
            self.buffer.clear();
        }
        self.state = State::Empty;
        Some(line)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Empty;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Empty => "Empty",
            State::Partial => "Partial",
            State::Terminated { .. } => "Terminated",
        }
    }
}
