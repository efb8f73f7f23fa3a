//! Driver for the TE Connectivity (MEAS) HTU21D-F digital humidity and
//! temperature sensor
//!
//! The driver talks to the sensor through the blocking `embedded-hal` I2C
//! traits and waits out conversions with an injected `DelayMs` provider.
//!
//! ```no_run
//! # fn demo<I2C, D, E>(i2c: I2C, delay: D) -> Result<(), htu21df::Error<E>>
//! # where
//! #     I2C: embedded_hal::blocking::i2c::Read<Error = E>
//! #         + embedded_hal::blocking::i2c::Write<Error = E>
//! #         + embedded_hal::blocking::i2c::WriteRead<Error = E>,
//! #     D: embedded_hal::blocking::delay::DelayMs<u8>,
//! # {
//! let mut htu = htu21df::Htu21df::new(delay);
//! htu.begin(i2c)?;
//! let temperature = htu.read_temperature()?;
//! let humidity = htu.read_humidity()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), no_std)]

extern crate byteorder;
extern crate embedded_hal;
#[macro_use]
extern crate log;

use core::fmt;

use byteorder::{BigEndian, ByteOrder};

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Read, Write, WriteRead};

/// Fixed 7-bit I2C address of the HTU21D-F
pub const I2C_ADDRESS: u8 = 0x40;

const CRC8_POLYNOMIAL: u8 = 0x31;

/// User register contents after a soft reset
const STATUS_AFTER_RESET: u8 = 0x02;

/// The two low bits of the LSB carry status, not data
const STATUS_MASK: u8 = 0b0000_0011;

const RESET_DELAY_MS: u8 = 15;
const CONVERSION_DELAY_MS: u8 = 50;

pub struct Htu21df<I2C, D> {
    i2c: Option<I2C>,
    delay: D,
    last_temperature: f32,
    last_humidity: f32,
}

impl<I2C, D, E> Htu21df<I2C, D>
where
    I2C: Read<Error = E> + Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u8>,
{
    /// Creates a new driver without a bus. Call [`begin`](Self::begin)
    /// before taking measurements.
    pub fn new(delay: D) -> Self {
        Htu21df {
            i2c: None,
            delay,
            last_temperature: 0.0,
            last_humidity: 0.0,
        }
    }

    /// Takes ownership of `i2c`, checks the sensor answers on its address,
    /// resets it and verifies the user register holds its reset value.
    ///
    /// A bus handed over by an earlier call is dropped first. When the
    /// address probe fails no reset is attempted.
    pub fn begin(&mut self, i2c: I2C) -> Result<(), Error<E>> {
        self.i2c = Some(i2c);

        self.bus()?
            .write(I2C_ADDRESS, &[])
            .map_err(Error::NotFound)?;

        self.reset()?;

        match self.read_user_register()? {
            STATUS_AFTER_RESET => Ok(()),
            status => {
                debug!("unexpected user register after reset: {:#04x}", status);
                Err(Error::Status(status))
            }
        }
    }

    /// Soft reset, followed by the 15 ms the sensor needs to come back up.
    ///
    /// The sensor may not acknowledge the command while it restarts, so a
    /// failed write is logged and otherwise ignored.
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        if self.command(Command::SoftReset).is_err() {
            warn!("soft reset command was not acknowledged");
        }
        self.delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    /// Read the user register
    pub fn read_user_register(&mut self) -> Result<u8, Error<E>> {
        let mut buf = [0; 1];
        self.bus()?
            .write_read(I2C_ADDRESS, &[Command::ReadUserRegister.value()], &mut buf)
            .map_err(Error::I2c)?;
        Ok(buf[0])
    }

    /// Take a temperature measurement in °C
    ///
    /// On error the value returned by [`last_temperature`](Self::last_temperature)
    /// is left as it was.
    pub fn read_temperature(&mut self) -> Result<f32, Error<E>> {
        let raw = self.read_raw_temperature()?;
        let temperature = convert_temperature(raw.value());
        self.last_temperature = temperature;
        Ok(temperature)
    }

    /// Take a relative humidity measurement in percent
    ///
    /// The result is not clamped, noise or a wiring fault can push it
    /// outside 0..=100.
    pub fn read_humidity(&mut self) -> Result<f32, Error<E>> {
        let raw = self.read_raw_humidity()?;
        let humidity = convert_humidity(raw.value());
        self.last_humidity = humidity;
        Ok(humidity)
    }

    /// Take a temperature measurement without converting it
    pub fn read_raw_temperature(&mut self) -> Result<RawReading, Error<E>> {
        self.measure_raw(Command::ReadTemperature)
    }

    /// Take a humidity measurement without converting it
    pub fn read_raw_humidity(&mut self) -> Result<RawReading, Error<E>> {
        self.measure_raw(Command::ReadHumidity)
    }

    /// Temperature from the last successful [`read_temperature`](Self::read_temperature)
    pub fn last_temperature(&self) -> f32 {
        self.last_temperature
    }

    /// Humidity from the last successful [`read_humidity`](Self::read_humidity)
    pub fn last_humidity(&self) -> f32 {
        self.last_humidity
    }

    pub fn release(self) -> Option<I2C> {
        self.i2c
    }

    fn bus(&mut self) -> Result<&mut I2C, Error<E>> {
        self.i2c.as_mut().ok_or(Error::NotInitialized)
    }

    /// Send an I2C command
    fn command(&mut self, command: Command) -> Result<(), Error<E>> {
        self.bus()?
            .write(I2C_ADDRESS, &[command.value()])
            .map_err(Error::I2c)
    }

    fn measure_raw(&mut self, command: Command) -> Result<RawReading, Error<E>> {
        self.command(command)?;
        self.delay.delay_ms(CONVERSION_DELAY_MS);
        let mut buf = [0; 3];
        self.bus()?
            .read(I2C_ADDRESS, &mut buf)
            .map_err(Error::I2c)?;
        let raw = RawReading::from_bytes(buf);
        debug!("{:?}: {:?}", command, raw);
        Ok(raw)
    }
}

/// One 3-byte measurement frame as sent by the sensor
///
/// The CRC byte is kept but never checked by the driver, use
/// [`crc_ok`](RawReading::crc_ok) to validate a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RawReading {
    msb: u8,
    lsb: u8,
    crc: u8,
}

impl RawReading {
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        RawReading {
            msb: bytes[0],
            lsb: bytes[1],
            crc: bytes[2],
        }
    }

    /// Raw count with the status bits cleared
    pub fn value(&self) -> u16 {
        BigEndian::read_u16(&[self.msb, self.lsb & !STATUS_MASK])
    }

    /// Status bits of the LSB. Bit 1 is set for humidity frames.
    pub fn status(&self) -> u8 {
        self.lsb & STATUS_MASK
    }

    pub fn crc(&self) -> u8 {
        self.crc
    }

    /// Whether the CRC byte matches the two data bytes as transmitted
    pub fn crc_ok(&self) -> bool {
        crc8(&[self.msb, self.lsb]) == self.crc
    }
}

/// Convert a raw count to °C
pub fn convert_temperature(raw: u16) -> f32 {
    raw as f32 * 175.72 / 65536.0 - 46.85
}

/// Convert a raw count to %RH
pub fn convert_humidity(raw: u16) -> f32 {
    raw as f32 * 125.0 / 65536.0 - 6.0
}

/// CRC-8, polynomial x^8 + x^5 + x^4 + 1, initial value 0
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if (crc & 0x80) > 0 {
                crc = (crc << 1) ^ CRC8_POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Errors
#[derive(Debug)]
pub enum Error<E> {
    /// I2C bus error during a command or read
    I2c(E),
    /// Nothing acknowledged the sensor's address
    NotFound(E),
    /// User register did not hold its reset value
    Status(u8),
    /// No bus yet, `begin` was never called
    NotInitialized,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C bus error: {:?}", e),
            Error::NotFound(e) => write!(f, "no HTU21D-F at {:#04x}: {:?}", I2C_ADDRESS, e),
            Error::Status(status) => write!(
                f,
                "user register is {:#04x} after reset, expected {:#04x}",
                status, STATUS_AFTER_RESET
            ),
            Error::NotInitialized => write!(f, "driver has no bus, call begin first"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum Command {
    ReadTemperature,
    ReadHumidity,
    ReadUserRegister,
    SoftReset,
}

impl Command {
    fn value(&self) -> u8 {
        match *self {
            // Table 7, hold master mode
            Command::ReadTemperature => 0xE3,
            Command::ReadHumidity => 0xE5,

            Command::ReadUserRegister => 0xE7,
            Command::SoftReset => 0xFE,
        }
    }
}
