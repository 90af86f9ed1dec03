//! Transport module - the two physical links and the registry that holds one.
//!
//! Provides abstraction over:
//! - Byte-stream serial ([`SerialPort`], framed by newline)
//! - Addressed, chunked I2C ([`I2cPort`], polled for availability)
//!
//! Hardware adapters:
//! - [`HalI2c`] - any `embedded_hal::i2c::I2c` bus
//! - [`SystemSerial`] - a host serial port (feature `serialport`)

mod hal;
mod i2c;
#[cfg(feature = "serialport")]
mod port;
mod serial;

use bytes::Bytes;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::TransactionConfig;
use crate::debug::DebugChannel;
use crate::error::{NotecardError, Result};
use crate::lock::IoLock;
use crate::protocol::tags;

pub use hal::HalI2c;
pub(crate) use i2c::I2cFramer;
#[cfg(feature = "serialport")]
pub use port::SystemSerial;
pub(crate) use serial::SerialFramer;

/// Byte-stream link to the Notecard.
///
/// The four operations mirror what a UART driver offers: a resynchronizing
/// reset, a (possibly flushed) write, a non-blocking "is a byte waiting"
/// check and a single-byte read that is only called after `available()`
/// returned `true`.
pub trait SerialPort: Send {
    /// Re-initialize the port. Returns `false` if the port is unusable.
    fn reset(&mut self) -> bool;

    /// Write bytes; `flush` asks the driver to drain its transmit buffer.
    fn transmit(&mut self, data: &[u8], flush: bool);

    /// True if at least one received byte is waiting.
    fn available(&mut self) -> bool;

    /// Read one waiting byte.
    fn receive(&mut self) -> u8;
}

/// Failure reported by an [`I2cPort`].
///
/// The message always carries an error tag; `{io}` is appended when the
/// port did not supply one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct I2cError {
    message: String,
}

impl I2cError {
    /// Create an error from a port-supplied message.
    pub fn new(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if !message.contains('{') {
            message.push_str(" {");
            message.push_str(tags::IO);
            message.push('}');
        }
        Self { message }
    }

    /// The tagged message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Addressed, chunked link to the Notecard.
///
/// Each call moves at most one chunk. Implementations are responsible for
/// the device chunk header; see [`HalI2c`].
pub trait I2cPort: Send {
    /// Re-initialize the bus for `address`. Returns `false` if unusable.
    fn reset(&mut self, address: u16) -> bool;

    /// Write one chunk (at most the negotiated chunk size).
    fn transmit(&mut self, address: u16, data: &[u8]) -> std::result::Result<(), I2cError>;

    /// Fill `buf` completely from the device and return how many more bytes
    /// it still has queued. An empty `buf` is a pure availability probe.
    fn receive(&mut self, address: u16, buf: &mut [u8]) -> std::result::Result<u32, I2cError>;
}

/// Which transport is active, and with what parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// No usable transport; every transaction fails without I/O.
    Disabled,
    /// Serial at the given baud rate.
    Serial {
        /// Baud rate the port was opened with.
        speed: u32,
    },
    /// I2C at the given address and chunk size.
    I2c {
        /// 7-bit device address.
        address: u16,
        /// Maximum payload bytes per transfer.
        max_chunk: usize,
    },
}

/// Everything a framer needs besides its port.
pub(crate) struct LinkContext<'a> {
    pub(crate) config: &'a TransactionConfig,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) debug: &'a DebugChannel,
    pub(crate) io: &'a IoLock,
}

/// The transport registry entry: exactly one variant is active.
pub(crate) enum Transport {
    Disabled,
    Serial(SerialFramer),
    I2c(I2cFramer),
}

impl Transport {
    pub(crate) fn kind(&self) -> TransportKind {
        match self {
            Transport::Disabled => TransportKind::Disabled,
            Transport::Serial(framer) => TransportKind::Serial {
                speed: framer.speed(),
            },
            Transport::I2c(framer) => TransportKind::I2c {
                address: framer.address(),
                max_chunk: framer.max_chunk(),
            },
        }
    }

    /// Run the transport-specific resynchronization handshake.
    pub(crate) async fn reset(&mut self, cx: &LinkContext<'_>) -> Result<()> {
        match self {
            Transport::Disabled => Err(NotecardError::Disabled),
            Transport::Serial(framer) => framer.reset(cx).await,
            Transport::I2c(framer) => framer.reset(cx).await,
        }
    }

    /// Send one request line; the framer applies the terminator.
    pub(crate) async fn transmit(&mut self, payload: &[u8], cx: &LinkContext<'_>) -> Result<()> {
        match self {
            Transport::Disabled => Err(NotecardError::Disabled),
            Transport::Serial(framer) => framer.transmit(payload, cx).await,
            Transport::I2c(framer) => framer.transmit(payload, cx).await,
        }
    }

    /// Receive one reply line, terminator included.
    pub(crate) async fn receive(&mut self, cx: &LinkContext<'_>) -> Result<Bytes> {
        match self {
            Transport::Disabled => Err(NotecardError::Disabled),
            Transport::Serial(framer) => framer.receive(cx).await,
            Transport::I2c(framer) => framer.receive(cx).await,
        }
    }
}
