//! Serial framer: newline-terminated lines over a byte stream.

use bytes::Bytes;

use super::{LinkContext, SerialPort};
use crate::clock::Deadline;
use crate::error::{NotecardError, Result};
use crate::protocol::{is_line_control, trim_line_ending, LineBuffer, NEWLINE};

/// Serial transport state: the port plus the speed it was registered with.
pub(crate) struct SerialFramer {
    port: Box<dyn SerialPort>,
    speed: u32,
}

/// What a reset drain saw on the wire.
#[derive(Debug, Default, Clone, Copy)]
struct Drained {
    received: bool,
    unexpected: bool,
}

impl SerialFramer {
    pub(crate) fn new(port: Box<dyn SerialPort>, speed: u32) -> Self {
        Self { port, speed }
    }

    pub(crate) fn speed(&self) -> u32 {
        self.speed
    }

    /// Send `payload` followed by exactly one `\n`.
    ///
    /// Long payloads go out in segments with a pause in between so the
    /// device's receive buffer can keep up.
    pub(crate) async fn transmit(&mut self, payload: &[u8], cx: &LinkContext<'_>) -> Result<()> {
        let body = trim_line_ending(payload);
        let segment_len = cx.config.serial_segment_max_len.max(1);

        for (index, segment) in body.chunks(segment_len).enumerate() {
            if index > 0 {
                cx.clock.sleep(cx.config.serial_segment_delay).await;
            }
            self.port.transmit(segment, false);
        }
        self.port.transmit(&[NEWLINE], true);

        tracing::trace!("Serial transmit: {} bytes", body.len() + 1);
        Ok(())
    }

    /// Collect bytes until a `\n` arrives or the transaction deadline passes.
    pub(crate) async fn receive(&mut self, cx: &LinkContext<'_>) -> Result<Bytes> {
        let mut buffer = LineBuffer::new(cx.config.max_response_len);
        let deadline = Deadline::new(cx.clock, cx.config.transaction_timeout);

        loop {
            if self.port.available() {
                if buffer.push_byte(self.port.receive())? {
                    break;
                }
            } else {
                cx.clock.sleep(cx.config.serial_poll_interval).await;
            }

            if deadline.expired() {
                let err = if buffer.is_empty() {
                    NotecardError::Timeout
                } else {
                    NotecardError::Incomplete
                };
                cx.debug.log(&err.to_string());
                return Err(err);
            }
        }

        buffer.take_line().ok_or(NotecardError::Incomplete)
    }

    /// Resynchronize: reset the port, then send blank lines until the device
    /// answers with nothing but line endings.
    pub(crate) async fn reset(&mut self, cx: &LinkContext<'_>) -> Result<()> {
        if !self.port.reset() {
            cx.debug.log("serial port reset failed");
            return Err(NotecardError::ResetFailed);
        }

        for attempt in 1..=cx.config.reset_attempts.max(1) {
            self.port.transmit(&[NEWLINE], true);
            let drained = self.drain(cx).await;

            if drained.received && !drained.unexpected {
                tracing::debug!("Serial reset complete after {} attempt(s)", attempt);
                return Ok(());
            }

            cx.debug.log(if drained.received {
                "unrecognized data from notecard"
            } else {
                "notecard not responding"
            });
            cx.clock.sleep(cx.config.reset_retry_delay).await;
        }

        cx.debug.log(&NotecardError::ResetFailed.to_string());
        Err(NotecardError::ResetFailed)
    }

    /// Read until the line has been quiet for the drain window.
    async fn drain(&mut self, cx: &LinkContext<'_>) -> Drained {
        let mut drained = Drained::default();
        let mut quiet = Deadline::new(cx.clock, cx.config.reset_drain_window);
        let mut budget = cx.config.max_response_len;

        while !quiet.expired() {
            if !self.port.available() {
                cx.clock.sleep(cx.config.serial_poll_interval).await;
                continue;
            }

            let byte = self.port.receive();
            drained.received = true;
            if !is_line_control(byte) {
                drained.unexpected = true;
            }
            quiet.restart();

            budget = budget.saturating_sub(1);
            if budget == 0 {
                drained.unexpected = true;
                break;
            }
        }

        drained
    }
}
