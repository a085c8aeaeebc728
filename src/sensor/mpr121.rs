use super::{SensorError, TouchSource};
use crate::bus::RegisterBus;
use tracing::{debug, info, warn};

// Application note for the MPR121 filter registers:
// https://www.nxp.com/docs/en/application-note/AN3892.pdf

pub const ELECTRODES: usize = 12;
const TOUCH_MASK: u16 = 0x0FFF;

const TOUCH_STATUS_L: u8 = 0x00;
const MHDR: u8 = 0x2B;
const NHDR: u8 = 0x2C;
const NCLR: u8 = 0x2D;
const FDLR: u8 = 0x2E;
const MHDF: u8 = 0x2F;
const NHDF: u8 = 0x30;
const NCLF: u8 = 0x31;
const FDLF: u8 = 0x32;
const NHDT: u8 = 0x33;
const NCLT: u8 = 0x34;
const FDLT: u8 = 0x35;
const TOUCH_THRESHOLD_0: u8 = 0x41;
const RELEASE_THRESHOLD_0: u8 = 0x42;
const DEBOUNCE: u8 = 0x5B;
const CONFIG1: u8 = 0x5C;
const CONFIG2: u8 = 0x5D;
const ECR: u8 = 0x5E;
const SOFT_RESET: u8 = 0x80;

const SOFT_RESET_KEY: u8 = 0x63;
const CONFIG2_AFTER_RESET: u8 = 0x24;
// Baseline tracking enabled, all 12 electrodes running
const ECR_RUN_ALL: u8 = 0x80 | ELECTRODES as u8;

// Baseline filter tuning for wet sipper contacts
const FILTER_SETTINGS: [(u8, u8); 11] = [
    (MHDR, 1),
    (NHDR, 10),
    (NCLR, 1),
    (FDLR, 2),
    (MHDF, 1),
    (NHDF, 5),
    (NCLF, 3),
    (FDLF, 1),
    (NHDT, 1),
    (NCLT, 5),
    (FDLT, 1),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub touch: u8,
    pub release: u8,
}

/// Driver for one NXP MPR121 12-channel capacitive touch controller.
#[derive(Debug)]
pub struct Mpr121<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> Mpr121<B> {
    /// Resets and configures the chip, returning a running driver.
    ///
    /// The chip only accepts configuration writes while stopped, so every
    /// register is programmed with ECR cleared and the electrodes are
    /// enabled last.
    pub fn begin(mut bus: B, thresholds: Thresholds) -> Result<Self, SensorError> {
        let address = bus.address();
        debug!("Resetting MPR121 at 0x{:02X}", address);

        bus.write_register(SOFT_RESET, SOFT_RESET_KEY)?;
        bus.write_register(ECR, 0x00)?;

        let config2 = bus.read_register(CONFIG2)?;
        if config2 != CONFIG2_AFTER_RESET {
            warn!(
                "Device at 0x{:02X} reported CONFIG2=0x{:02X}, expected 0x{:02X}",
                address, config2, CONFIG2_AFTER_RESET
            );
            return Err(SensorError::UnexpectedResponse { address, config2 });
        }

        for electrode in 0..ELECTRODES as u8 {
            bus.write_register(TOUCH_THRESHOLD_0 + 2 * electrode, thresholds.touch)?;
            bus.write_register(RELEASE_THRESHOLD_0 + 2 * electrode, thresholds.release)?;
        }

        // The classifier debounces in software
        bus.write_register(DEBOUNCE, 0)?;
        for (register, value) in FILTER_SETTINGS {
            bus.write_register(register, value)?;
        }

        // 16uA charge current, 0.5us encoding, 4 samples, 1ms period
        bus.write_register(CONFIG1, 0x10)?;
        bus.write_register(CONFIG2, 0x20)?;

        bus.write_register(ECR, ECR_RUN_ALL)?;
        info!(
            "MPR121 at 0x{:02X} running (touch={}, release={})",
            address, thresholds.touch, thresholds.release
        );
        Ok(Self { bus })
    }
}

impl<B: RegisterBus> TouchSource for Mpr121<B> {
    fn address(&self) -> u16 {
        self.bus.address()
    }

    fn sample(&mut self) -> Result<u16, SensorError> {
        let mut status = [0u8; 2];
        self.bus.read_registers(TOUCH_STATUS_L, &mut status)?;
        Ok(u16::from_le_bytes(status) & TOUCH_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::fake::FakeRegisters;

    fn chip() -> FakeRegisters {
        let mut regs = FakeRegisters::new(0x5A);
        regs.on_write.push((SOFT_RESET, CONFIG2, CONFIG2_AFTER_RESET));
        regs
    }

    const THRESHOLDS: Thresholds = Thresholds {
        touch: 120,
        release: 120,
    };

    #[test]
    fn begin_programs_thresholds_and_starts_last() {
        let sensor = Mpr121::begin(chip(), THRESHOLDS).unwrap();
        let writes = &sensor.bus.writes;

        assert_eq!(writes.first(), Some(&(SOFT_RESET, SOFT_RESET_KEY)));
        assert_eq!(writes.last(), Some(&(ECR, ECR_RUN_ALL)));
        for electrode in 0..ELECTRODES as u8 {
            assert!(writes.contains(&(TOUCH_THRESHOLD_0 + 2 * electrode, 120)));
            assert!(writes.contains(&(RELEASE_THRESHOLD_0 + 2 * electrode, 120)));
        }
        assert!(writes.contains(&(DEBOUNCE, 0)));
        assert!(writes.contains(&(NHDR, 10)));
        assert!(writes.contains(&(FDLT, 1)));
    }

    #[test]
    fn begin_rejects_device_that_does_not_reset() {
        let err = Mpr121::begin(FakeRegisters::new(0x5B), THRESHOLDS).unwrap_err();
        assert!(matches!(
            err,
            SensorError::UnexpectedResponse {
                address: 0x5B,
                config2: 0
            }
        ));
    }

    #[test]
    fn begin_fails_without_device() {
        let err = Mpr121::begin(FakeRegisters::absent(0x5C), THRESHOLDS).unwrap_err();
        assert!(matches!(err, SensorError::Bus(_)));
    }

    #[test]
    fn sample_masks_to_twelve_electrodes() {
        let mut sensor = Mpr121::begin(chip(), THRESHOLDS).unwrap();
        // Bits 12..15 carry the over-current flag and proximity channel
        sensor.bus.registers[0x00] = 0b0000_0101;
        sensor.bus.registers[0x01] = 0b1001_1000;
        assert_eq!(sensor.sample().unwrap(), 0b1000_0000_0101);
    }
}
