//! Protocol module - line framing, I2C chunk format, and error tags.
//!
//! This module implements the byte-level contract with the Notecard:
//! - Newline-terminated JSON lines on both transports
//! - The one-byte length header used by the I2C chunk protocol
//! - Line reassembly from byte-wise or chunked reads
//! - Bracketed error tags used for error classification

mod line_buffer;
pub mod tags;
mod wire_format;

pub use line_buffer::LineBuffer;
pub use wire_format::{
    encode_read_request, encode_write_chunk, frame_line, is_line_control, resolve_i2c_address,
    resolve_i2c_max_chunk, trim_line_ending, ReadHeader, CARRIAGE_RETURN, DEFAULT_I2C_ADDRESS,
    DEFAULT_I2C_MAX_CHUNK, I2C_READ_HEADER_SIZE, I2C_WRITE_HEADER_SIZE, MAX_I2C_CHUNK, NEWLINE,
};
