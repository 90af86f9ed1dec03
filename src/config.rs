//! Transaction timing and sizing.
//!
//! The defaults are tuned for current Notecard firmware. They are exposed as
//! configuration because device buffering behaviour differs between firmware
//! releases and host buses.

use std::time::Duration;

/// Default deadline for a complete request/response exchange.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling for a single reassembled response.
pub const DEFAULT_MAX_RESPONSE_LEN: usize = 64 * 1024;

/// Default serial segment size.
pub const DEFAULT_SERIAL_SEGMENT_MAX_LEN: usize = 250;

/// Default pause between serial segments.
pub const DEFAULT_SERIAL_SEGMENT_DELAY: Duration = Duration::from_millis(250);

/// Default interval between serial availability checks.
pub const DEFAULT_SERIAL_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default byte count after which the I2C transmitter pauses.
pub const DEFAULT_I2C_SEGMENT_MAX_LEN: usize = 250;

/// Default pause after every I2C segment.
pub const DEFAULT_I2C_SEGMENT_DELAY: Duration = Duration::from_millis(250);

/// Default pause after every I2C chunk.
pub const DEFAULT_I2C_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Default interval between I2C availability probes.
pub const DEFAULT_I2C_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default quiet period that ends a reset drain.
pub const DEFAULT_RESET_DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// Default number of handshake attempts per reset.
pub const DEFAULT_RESET_ATTEMPTS: u32 = 10;

/// Default pause between failed handshake attempts.
pub const DEFAULT_RESET_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Timing and sizing for both framers and the reset handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Receive deadline for one exchange.
    pub transaction_timeout: Duration,
    /// Memory ceiling for one response.
    pub max_response_len: usize,
    /// Serial transmit segment size.
    pub serial_segment_max_len: usize,
    /// Pause between serial segments.
    pub serial_segment_delay: Duration,
    /// Pause between serial availability checks.
    pub serial_poll_interval: Duration,
    /// I2C bytes sent before a segment pause.
    pub i2c_segment_max_len: usize,
    /// Segment pause on I2C.
    pub i2c_segment_delay: Duration,
    /// Pause after each I2C chunk.
    pub i2c_chunk_delay: Duration,
    /// Pause between I2C availability probes.
    pub i2c_poll_interval: Duration,
    /// Quiet period that ends a reset drain.
    pub reset_drain_window: Duration,
    /// Handshake attempts per reset.
    pub reset_attempts: u32,
    /// Pause between handshake attempts.
    pub reset_retry_delay: Duration,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            max_response_len: DEFAULT_MAX_RESPONSE_LEN,
            serial_segment_max_len: DEFAULT_SERIAL_SEGMENT_MAX_LEN,
            serial_segment_delay: DEFAULT_SERIAL_SEGMENT_DELAY,
            serial_poll_interval: DEFAULT_SERIAL_POLL_INTERVAL,
            i2c_segment_max_len: DEFAULT_I2C_SEGMENT_MAX_LEN,
            i2c_segment_delay: DEFAULT_I2C_SEGMENT_DELAY,
            i2c_chunk_delay: DEFAULT_I2C_CHUNK_DELAY,
            i2c_poll_interval: DEFAULT_I2C_POLL_INTERVAL,
            reset_drain_window: DEFAULT_RESET_DRAIN_WINDOW,
            reset_attempts: DEFAULT_RESET_ATTEMPTS,
            reset_retry_delay: DEFAULT_RESET_RETRY_DELAY,
        }
    }
}
