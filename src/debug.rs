//! Optional debug side channel.
//!
//! When a sink is installed, every outbound and inbound frame and every
//! library log line is mirrored to it. The channel is strictly best-effort:
//! write failures are swallowed and never change a transaction's outcome.
//! Independently of the sink, the same lines are emitted as `tracing` events.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::protocol::trim_line_ending;

/// Destination for mirrored debug output.
///
/// Implemented for every `std::io::Write + Send` type, so a serial port,
/// `std::io::stderr()` or a `Vec<u8>` can be installed directly.
pub trait DebugSink: Send {
    /// Write one chunk of debug text.
    fn write_text(&mut self, text: &str) -> std::io::Result<()>;
}

impl<W: Write + Send> DebugSink for W {
    fn write_text(&mut self, text: &str) -> std::io::Result<()> {
        self.write_all(text.as_bytes())?;
        self.flush()
    }
}

/// Direction of a mirrored frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    fn marker(self) -> &'static str {
        match self {
            Direction::Outbound => "> ",
            Direction::Inbound => "< ",
        }
    }
}

/// The sink plus the transaction-mirroring switch.
#[derive(Default)]
pub(crate) struct DebugChannel {
    sink: Mutex<Option<Box<dyn DebugSink>>>,
    suspended: AtomicBool,
}

impl DebugChannel {
    pub(crate) fn set_sink(&self, sink: Box<dyn DebugSink>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub(crate) fn clear_sink(&self) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[cfg(test)]
    pub(crate) fn has_sink(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop mirroring frames; log lines still go out.
    pub(crate) fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    pub(crate) fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Mirror a library log line.
    pub(crate) fn log(&self, message: &str) {
        tracing::debug!("{}", message);
        self.write_line("", message);
    }

    /// Mirror a frame exchanged with the device.
    pub(crate) fn frame(&self, direction: Direction, bytes: &[u8]) {
        if self.is_suspended() {
            return;
        }
        let text = String::from_utf8_lossy(trim_line_ending(bytes));
        tracing::trace!("{}{}", direction.marker(), text);
        self.write_line(direction.marker(), &text);
    }

    fn write_line(&self, prefix: &str, text: &str) {
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = guard.as_mut() else {
            return;
        };
        let line = format!("{prefix}{text}\n");
        if let Err(e) = sink.write_text(&line) {
            tracing::trace!("Debug sink write failed: {}", e);
        }
    }
}
