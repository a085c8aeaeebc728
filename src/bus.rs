//! Register-level access to I²C peripherals.
//!
//! Every chip the logger talks to (touch controllers, RTC) is driven through
//! [`RegisterBus`], so drivers never see `rppal` directly and can be exercised
//! in tests against a scripted register map.

use rppal::i2c::I2c;
use std::fmt;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("No response from device at 0x{0:02X}")]
    NoResponse(u16),
}

// One device on one bus, addressed by register
pub trait RegisterBus: Send + fmt::Debug {
    fn address(&self) -> u16;

    fn read_register(&mut self, register: u8) -> Result<u8, BusError>;

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError>;

    // Sequential read starting at `register`, relying on the chip's auto-increment
    fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusError>;
}

/// A single slave device on a Linux I²C adapter (`/dev/i2c-<bus>`).
pub struct I2cBus {
    i2c: I2c,
    bus: u8,
    address: u16,
}

impl I2cBus {
    pub fn open(bus: u8, address: u16) -> Result<Self, BusError> {
        debug!("Opening /dev/i2c-{} for device 0x{:02X}", bus, address);
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;
        Ok(Self { i2c, bus, address })
    }
}

impl fmt::Debug for I2cBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("I2cBus")
            .field("bus", &self.bus)
            .field("address", &format_args!("0x{:02X}", self.address))
            .finish()
    }
}

impl RegisterBus for I2cBus {
    fn address(&self) -> u16 {
        self.address
    }

    fn read_register(&mut self, register: u8) -> Result<u8, BusError> {
        Ok(self.i2c.smbus_read_byte(register)?)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        Ok(self.i2c.smbus_write_byte(register, value)?)
    }

    fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        Ok(self.i2c.write_read(&[register], buffer)?)
    }
}
