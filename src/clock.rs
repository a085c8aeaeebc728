//! Time sources.
//!
//! Two unrelated clocks are involved in a recording: the wall clock, read
//! once per session to name the log file, and the device uptime clock that
//! every event timestamp is derived from.

use crate::bus::{BusError, I2cBus, RegisterBus};
use crate::config::{ClockConfig, ClockSource};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("Couldn't find RTC: {0}")]
    NotFound(BusError),

    #[error("RTC read failed: {0}")]
    Bus(#[from] BusError),

    #[error("RTC returned an invalid date: {0}")]
    InvalidDate(String),
}

pub trait WallClock: Send + fmt::Debug {
    fn now(&mut self) -> Result<NaiveDateTime, ClockError>;
}

pub trait Uptime: Send + fmt::Debug {
    fn millis(&self) -> u64;
}

/// Opens the wall clock selected in the configuration.
pub fn open_wall_clock(config: &ClockConfig) -> Result<Box<dyn WallClock>, ClockError> {
    match config.source {
        ClockSource::System => {
            info!("Using system clock for log file names");
            Ok(Box::new(SystemClock))
        }
        ClockSource::Pcf8523 => {
            let bus = I2cBus::open(config.i2c_bus, config.address).map_err(ClockError::NotFound)?;
            Ok(Box::new(Pcf8523::probe(bus)?))
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&mut self) -> Result<NaiveDateTime, ClockError> {
        Ok(Local::now().naive_local())
    }
}

const CONTROL_1: u8 = 0x00;
const SECONDS: u8 = 0x03;
const OSCILLATOR_STOPPED: u8 = 0x80;

/// NXP PCF8523 real-time clock.
#[derive(Debug)]
pub struct Pcf8523<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> Pcf8523<B> {
    pub fn probe(mut bus: B) -> Result<Self, ClockError> {
        bus.read_register(CONTROL_1).map_err(ClockError::NotFound)?;
        info!("PCF8523 RTC found at 0x{:02X}", bus.address());
        Ok(Self { bus })
    }
}

impl<B: RegisterBus> WallClock for Pcf8523<B> {
    fn now(&mut self) -> Result<NaiveDateTime, ClockError> {
        // seconds, minutes, hours, days, weekdays, months, years
        let mut raw = [0u8; 7];
        self.bus.read_registers(SECONDS, &mut raw)?;

        if raw[0] & OSCILLATOR_STOPPED != 0 {
            warn!("RTC oscillator was stopped, time may be invalid");
        }

        let second = bcd(raw[0] & 0x7F);
        let minute = bcd(raw[1] & 0x7F);
        let hour = bcd(raw[2] & 0x3F);
        let day = bcd(raw[3] & 0x3F);
        let month = bcd(raw[5] & 0x1F);
        let year = 2000 + bcd(raw[6]) as i32;

        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .ok_or_else(|| {
                ClockError::InvalidDate(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                ))
            })
    }
}

fn bcd(value: u8) -> u32 {
    (value >> 4) as u32 * 10 + (value & 0x0F) as u32
}

/// Milliseconds since the logger process started.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicUptime {
    boot: Instant,
}

impl MonotonicUptime {
    pub fn start() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Uptime for MonotonicUptime {
    fn millis(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }
}
