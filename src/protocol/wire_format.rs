//! Wire format shared by both transports.
//!
//! Messages on either transport are a single line of compact JSON ending in
//! `\n`. Total length is never announced; the newline is the only
//! end-of-message signal.
//!
//! The I2C link additionally wraps every transfer in a tiny chunk header:
//! ```text
//! host -> device (write):  ┌──────┬─────────────┐
//!                          │ len  │ data[len]   │
//!                          │ u8   │             │
//!                          └──────┴─────────────┘
//! host -> device (poll):   ┌──────┬──────┐
//!                          │ 0x00 │ want │
//!                          └──────┴──────┘
//! device -> host (reply):  ┌───────┬──────┬──────────────┐
//!                          │ avail │ got  │ data[got]    │
//!                          │ u8    │ u8   │              │
//!                          └───────┴──────┴──────────────┘
//! ```

use bytes::{BufMut, BytesMut};

/// Message terminator.
pub const NEWLINE: u8 = b'\n';

/// Carriage return, tolerated before the terminator.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Default 7-bit I2C address of the Notecard.
pub const DEFAULT_I2C_ADDRESS: u16 = 0x17;

/// Default maximum payload bytes per I2C transfer.
///
/// Many host I2C drivers buffer 32 bytes per transaction; the chunk header
/// consumes two of them on reads.
pub const DEFAULT_I2C_MAX_CHUNK: usize = 30;

/// Largest chunk the one-byte length header can describe.
pub const MAX_I2C_CHUNK: usize = 255;

/// Size of the write chunk header.
pub const I2C_WRITE_HEADER_SIZE: usize = 1;

/// Size of the reply header on an I2C read.
pub const I2C_READ_HEADER_SIZE: usize = 2;

/// Resolve a configured I2C address, mapping `0` to the default.
#[inline]
pub fn resolve_i2c_address(address: u16) -> u16 {
    if address == 0 {
        DEFAULT_I2C_ADDRESS
    } else {
        address
    }
}

/// Resolve a configured chunk size, mapping `0` to the default and clamping to
/// what the length header can express.
#[inline]
pub fn resolve_i2c_max_chunk(max_chunk: usize) -> usize {
    match max_chunk {
        0 => DEFAULT_I2C_MAX_CHUNK,
        n => n.min(MAX_I2C_CHUNK),
    }
}

/// Build the outbound line for a payload: the payload with any trailing
/// line ending removed, followed by exactly one `\n`.
///
/// # Example
///
/// ```
/// use notecard_link::protocol::frame_line;
///
/// assert_eq!(&frame_line(b"{}")[..], b"{}\n");
/// assert_eq!(&frame_line(b"{}\r\n")[..], b"{}\n");
/// ```
pub fn frame_line(payload: &[u8]) -> BytesMut {
    let body = trim_line_ending(payload);
    let mut line = BytesMut::with_capacity(body.len() + 1);
    line.put_slice(body);
    line.put_u8(NEWLINE);
    line
}

/// Strip trailing `\r` / `\n` bytes.
#[inline]
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !is_line_control(*b))
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// True for the bytes the device emits as blank-line padding.
#[inline]
pub fn is_line_control(byte: u8) -> bool {
    byte == NEWLINE || byte == CARRIAGE_RETURN
}

/// Encode an I2C write chunk (`[len, data...]`) into `out`.
///
/// Returns `false` without touching `out` if `data` is longer than the
/// length header can express.
pub fn encode_write_chunk(data: &[u8], out: &mut Vec<u8>) -> bool {
    let Ok(len) = u8::try_from(data.len()) else {
        return false;
    };
    out.reserve(I2C_WRITE_HEADER_SIZE + data.len());
    out.push(len);
    out.extend_from_slice(data);
    true
}

/// Encode the poll request asking the device for up to `want` bytes.
#[inline]
pub fn encode_read_request(want: u8) -> [u8; I2C_READ_HEADER_SIZE] {
    [0, want]
}

/// Header of a device reply to a poll request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHeader {
    /// Bytes still queued on the device after this transfer.
    pub available: u8,
    /// Payload bytes actually present in this transfer.
    pub returned: u8,
}

impl ReadHeader {
    /// Decode the two-byte reply header.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        match buf {
            [available, returned, ..] => Some(Self {
                available: *available,
                returned: *returned,
            }),
            _ => None,
        }
    }
}
