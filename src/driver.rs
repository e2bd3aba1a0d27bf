//! Low-level register bus primitives.
//!
//! The card speaks plain SMBus-style register addressing: a read is a
//! one-byte offset write followed by a repeated-start read, a write is a
//! single transaction of offset plus payload bytes. Multi-byte values are
//! little-endian.
//!
//! This module is crate-private — consumers interact with [`IoPlus`] in
//! `board.rs` instead.
//!
//! [`IoPlus`]: crate::IoPlus

use embedded_hal_async::i2c::I2c;

use crate::error::IoPlusError;

/// Register read/write primitives over a shared bus.
///
/// Owns the I2C peripheral; the device address is passed per call because it
/// varies with the requested stack level. Exclusive ownership plus `&mut`
/// methods serialize all transactions on the port, so a multi-step sequence
/// such as the edge-counter reconfiguration can never interleave with
/// another request on the same port.
pub(crate) struct RegisterBus<I2C> {
    i2c: I2C,
}

impl<I2C> RegisterBus<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Read `buffer.len()` bytes starting at `reg`.
    async fn read_block(
        &mut self,
        address: u8,
        reg: u8,
        buffer: &mut [u8],
    ) -> Result<(), IoPlusError<I2C::Error>> {
        self.i2c.write_read(address, &[reg], buffer).await?;
        Ok(())
    }

    /// Read a single register byte.
    pub async fn read_u8(
        &mut self,
        address: u8,
        reg: u8,
    ) -> Result<u8, IoPlusError<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.read_block(address, reg, &mut buf).await?;
        Ok(buf[0])
    }

    /// Read a 16-bit signed little-endian value.
    pub async fn read_i16_le(
        &mut self,
        address: u8,
        reg: u8,
    ) -> Result<i16, IoPlusError<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.read_block(address, reg, &mut buf).await?;
        Ok(i16::from_le_bytes(buf))
    }

    /// Read a 32-bit signed little-endian value.
    pub async fn read_i32_le(
        &mut self,
        address: u8,
        reg: u8,
    ) -> Result<i32, IoPlusError<I2C::Error>> {
        let mut buf = [0u8; 4];
        self.read_block(address, reg, &mut buf).await?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Write a single byte to a register.
    pub async fn write_u8(
        &mut self,
        address: u8,
        reg: u8,
        value: u8,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        self.i2c.write(address, &[reg, value]).await?;
        Ok(())
    }

    /// Write a 16-bit little-endian word to a register pair.
    pub async fn write_u16_le(
        &mut self,
        address: u8,
        reg: u8,
        value: u16,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        let bytes = value.to_le_bytes();
        self.i2c.write(address, &[reg, bytes[0], bytes[1]]).await?;
        Ok(())
    }

    /// Release the underlying bus handle.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = 0x28;

    #[test]
    fn word_read_is_little_endian_signed() {
        let expectations = [I2cTransaction::write_read(
            ADDR,
            vec![24],
            vec![0xFE, 0xFF],
        )];
        let mut bus = RegisterBus::new(I2cMock::new(&expectations));

        let raw = block_on(bus.read_i16_le(ADDR, 24)).unwrap();
        assert_eq!(raw, -2);

        bus.release().done();
    }

    #[test]
    fn word_write_is_little_endian() {
        let expectations = [I2cTransaction::write(ADDR, vec![40, 0x10, 0x27])];
        let mut bus = RegisterBus::new(I2cMock::new(&expectations));

        block_on(bus.write_u16_le(ADDR, 40, 10_000)).unwrap();

        bus.release().done();
    }
}
