//! [`I2cPort`] over any `embedded_hal::i2c::I2c` bus.
//!
//! Implements the Notecard chunk protocol on top of plain bus writes and
//! reads:
//!
//! ```text
//! write chunk:   [len:u8][data; len]
//! poll request:  [0x00][want:u8]
//! poll reply:    [available:u8][returned:u8][data; returned]
//! ```

use embedded_hal::i2c::{Error as _, I2c};

use super::{I2cError, I2cPort};
use crate::protocol::{encode_read_request, encode_write_chunk, ReadHeader, I2C_READ_HEADER_SIZE};

/// Notecard I2C port backed by an `embedded-hal` 1.0 bus.
///
/// The bus offers no recovery primitive, so [`I2cPort::reset`] only clears
/// the adapter's scratch state. Wrap the bus in your own type if the board
/// can power-cycle or re-init it.
pub struct HalI2c<B> {
    bus: B,
    scratch: Vec<u8>,
}

impl<B: I2c> HalI2c<B> {
    /// Wrap a bus.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            scratch: Vec::new(),
        }
    }

    /// Borrow the underlying bus.
    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Return the underlying bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    fn bus_error(op: &str, err: B::Error) -> I2cError {
        I2cError::new(format!("i2c: {op} failed: {:?}", err.kind()))
    }
}

fn seven_bit(address: u16) -> Result<u8, I2cError> {
    u8::try_from(address)
        .ok()
        .filter(|addr| *addr < 0x80)
        .ok_or_else(|| I2cError::new(format!("i2c: invalid address {address:#x}")))
}

impl<B: I2c + Send> I2cPort for HalI2c<B> {
    fn reset(&mut self, _address: u16) -> bool {
        self.scratch.clear();
        true
    }

    fn transmit(&mut self, address: u16, data: &[u8]) -> Result<(), I2cError> {
        let address = seven_bit(address)?;
        self.scratch.clear();
        if !encode_write_chunk(data, &mut self.scratch) {
            return Err(I2cError::new("i2c: chunk too large"));
        }
        self.bus
            .write(address, &self.scratch)
            .map_err(|e| Self::bus_error("write", e))
    }

    fn receive(&mut self, address: u16, buf: &mut [u8]) -> Result<u32, I2cError> {
        let address = seven_bit(address)?;
        let want = u8::try_from(buf.len()).map_err(|_| I2cError::new("i2c: read too large"))?;

        self.bus
            .write(address, &encode_read_request(want))
            .map_err(|e| Self::bus_error("poll", e))?;

        self.scratch.clear();
        self.scratch.resize(I2C_READ_HEADER_SIZE + buf.len(), 0);
        self.bus
            .read(address, &mut self.scratch)
            .map_err(|e| Self::bus_error("read", e))?;

        let header = ReadHeader::decode(&self.scratch)
            .ok_or_else(|| I2cError::new("i2c: short reply header"))?;
        if usize::from(header.returned) != buf.len() {
            return Err(I2cError::new("i2c: incorrect amount of data"));
        }

        buf.copy_from_slice(&self.scratch[I2C_READ_HEADER_SIZE..]);
        Ok(u32::from(header.available))
    }
}
