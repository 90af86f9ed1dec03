//! [`SerialPort`](super::SerialPort) over a host serial device.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::ClearBuffer;

/// Read/write timeout for the underlying device; polling never blocks longer.
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// A host serial port (USB CDC or UART adapter) talking to a Notecard.
pub struct SystemSerial {
    port: Box<dyn serialport::SerialPort>,
}

impl SystemSerial {
    /// Open `path` at `baud_rate`.
    pub fn open(path: &str, baud_rate: u32) -> serialport::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()?;
        Ok(Self { port })
    }

    /// Wrap an already opened port.
    pub fn from_port(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }

    /// Baud rate reported by the driver.
    pub fn baud_rate(&self) -> u32 {
        self.port.baud_rate().unwrap_or(0)
    }
}

impl super::SerialPort for SystemSerial {
    fn reset(&mut self) -> bool {
        match self.port.clear(ClearBuffer::All) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to clear serial buffers: {}", e);
                false
            }
        }
    }

    fn transmit(&mut self, data: &[u8], flush: bool) {
        if let Err(e) = self.port.write_all(data) {
            tracing::warn!("Serial write failed: {}", e);
            return;
        }
        if flush {
            if let Err(e) = self.port.flush() {
                tracing::warn!("Serial flush failed: {}", e);
            }
        }
    }

    fn available(&mut self) -> bool {
        self.port.bytes_to_read().map_or(false, |n| n > 0)
    }

    fn receive(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => byte[0],
            Err(e) => {
                tracing::warn!("Serial read failed: {}", e);
                0
            }
        }
    }
}
