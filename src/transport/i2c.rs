//! I2C framer: chunked writes and availability-polled reads.
//!
//! The device never pushes data; the host asks how much is queued and pulls
//! at most `max_chunk` bytes per transfer. A reply is complete once a `\n`
//! has arrived and the device reports nothing further queued. The shared
//! [`IoLock`](crate::IoLock) is held around each transfer only, so other bus
//! users are served between chunks.

use bytes::Bytes;

use super::{I2cPort, LinkContext};
use crate::clock::Deadline;
use crate::error::{NotecardError, Result};
use crate::protocol::{
    frame_line, is_line_control, resolve_i2c_address, resolve_i2c_max_chunk, LineBuffer, NEWLINE,
};

/// I2C transport state.
pub(crate) struct I2cFramer {
    port: Box<dyn I2cPort>,
    address: u16,
    max_chunk: usize,
}

impl I2cFramer {
    /// `0` for either parameter selects the default.
    pub(crate) fn new(port: Box<dyn I2cPort>, address: u16, max_chunk: usize) -> Self {
        Self {
            port,
            address: resolve_i2c_address(address),
            max_chunk: resolve_i2c_max_chunk(max_chunk),
        }
    }

    pub(crate) fn address(&self) -> u16 {
        self.address
    }

    pub(crate) fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    pub(crate) fn set_address(&mut self, address: u16) {
        self.address = resolve_i2c_address(address);
    }

    /// Send `payload` plus terminator in chunks of at most `max_chunk` bytes.
    ///
    /// Any failed chunk resets the bus and fails the whole transmit; the
    /// device is left holding a partial line which the next reset clears.
    pub(crate) async fn transmit(&mut self, payload: &[u8], cx: &LinkContext<'_>) -> Result<()> {
        let line = frame_line(payload);
        let segment_len = cx.config.i2c_segment_max_len.max(1);
        let mut segment_sent = 0;

        for chunk in line.chunks(self.max_chunk) {
            let sent = {
                let _bus = cx.io.lock().await;
                self.port
                    .transmit(self.address, chunk)
                    .map_err(|e| (e, self.port.reset(self.address)))
            };
            if let Err((e, bus_reset)) = sent {
                cx.debug.log(e.message());
                if !bus_reset {
                    cx.debug.log("i2c bus reset failed");
                }
                return Err(e.into());
            }

            segment_sent += chunk.len();
            if segment_sent >= segment_len {
                segment_sent = 0;
                cx.clock.sleep(cx.config.i2c_segment_delay).await;
            }
            cx.clock.sleep(cx.config.i2c_chunk_delay).await;
        }

        tracing::trace!(
            "I2C transmit: {} bytes to {:#04x}",
            line.len(),
            self.address
        );
        Ok(())
    }

    /// Poll the device until a complete reply has been pulled.
    pub(crate) async fn receive(&mut self, cx: &LinkContext<'_>) -> Result<Bytes> {
        let mut buffer = LineBuffer::new(cx.config.max_response_len);
        let mut chunk = vec![0u8; self.max_chunk];
        let deadline = Deadline::new(cx.clock, cx.config.transaction_timeout);
        // The first transfer is a zero-length probe.
        let mut want = 0;

        loop {
            let available = self.transfer(&mut chunk[..want], cx).await?;
            buffer.push(&chunk[..want])?;

            want = self.clamp(available);
            if want > 0 {
                continue;
            }
            if buffer.is_terminated() {
                break;
            }
            if deadline.expired() {
                let err = NotecardError::Lost;
                cx.debug.log(&err.to_string());
                return Err(err);
            }
            cx.clock.sleep(cx.config.i2c_poll_interval).await;
        }

        buffer.take_line().ok_or(NotecardError::Lost)
    }

    /// Resynchronize: reset the bus, send a blank line and discard whatever
    /// the device still has queued.
    pub(crate) async fn reset(&mut self, cx: &LinkContext<'_>) -> Result<()> {
        for attempt in 1..=cx.config.reset_attempts.max(1) {
            let ready = {
                let _bus = cx.io.lock().await;
                self.port.reset(self.address)
                    && self.port.transmit(self.address, &[NEWLINE]).is_ok()
            };
            if !ready {
                cx.debug.log("i2c bus reset failed");
                cx.clock.sleep(cx.config.reset_retry_delay).await;
                continue;
            }
            cx.clock.sleep(cx.config.i2c_chunk_delay).await;

            match self.drain(cx).await {
                Ok(false) => {
                    tracing::debug!("I2C reset complete after {} attempt(s)", attempt);
                    return Ok(());
                }
                Ok(true) => cx.debug.log("unrecognized data from notecard"),
                Err(e) => cx.debug.log(&e.to_string()),
            }
            cx.clock.sleep(cx.config.reset_retry_delay).await;
        }

        cx.debug.log(&NotecardError::ResetFailed.to_string());
        Err(NotecardError::ResetFailed)
    }

    /// Pull queued bytes until the device has been quiet for the drain window.
    ///
    /// Returns `true` if anything other than line endings came back.
    async fn drain(&mut self, cx: &LinkContext<'_>) -> Result<bool> {
        let mut chunk = vec![0u8; self.max_chunk];
        let mut quiet = Deadline::new(cx.clock, cx.config.reset_drain_window);
        let hard = Deadline::new(cx.clock, cx.config.transaction_timeout);
        let mut unexpected = false;
        let mut want = 0;

        loop {
            let available = self.transfer(&mut chunk[..want], cx).await?;
            if want > 0 {
                unexpected |= chunk[..want].iter().any(|b| !is_line_control(*b));
                quiet.restart();
            }

            want = self.clamp(available);
            if hard.expired() {
                // A device that never stops talking is not in sync.
                return Ok(true);
            }
            if want > 0 {
                continue;
            }
            if quiet.expired() {
                return Ok(unexpected);
            }
            cx.clock.sleep(cx.config.i2c_poll_interval).await;
        }
    }

    /// One bus transfer under the I/O lock; returns the device's queue depth.
    async fn transfer(&mut self, buf: &mut [u8], cx: &LinkContext<'_>) -> Result<u32> {
        let _bus = cx.io.lock().await;
        Ok(self.port.receive(self.address, buf)?)
    }

    fn clamp(&self, available: u32) -> usize {
        usize::try_from(available)
            .unwrap_or(usize::MAX)
            .min(self.max_chunk)
    }
}
