//! Raw touch sensing
//!
//! Each touch controller is a [`TouchSource`] yielding a bitmap of touched
//! pads. [`TouchArray`] owns all controllers of the rig in bus-address order;
//! the controller index used for sipper ids is the position in that order.

pub mod mpr121;

use crate::bus::{BusError, I2cBus};
use crate::config::SensorConfig;
use mpr121::{Mpr121, Thresholds};
use std::fmt;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Unexpected response from 0x{address:02X} (CONFIG2=0x{config2:02X})")]
    UnexpectedResponse { address: u16, config2: u8 },

    #[error("MPR121 #{} not found at 0x{address:02X}: {source}", .index + 1)]
    NotFound {
        index: usize,
        address: u16,
        #[source]
        source: Box<SensorError>,
    },
}

// Bitmap contract: bit i set iff pad i is currently touched
pub trait TouchSource: Send + fmt::Debug {
    fn address(&self) -> u16;

    fn sample(&mut self) -> Result<u16, SensorError>;
}

#[derive(Debug)]
pub struct TouchArray {
    controllers: Vec<Box<dyn TouchSource>>,
    pads_per_controller: usize,
}

impl TouchArray {
    pub fn new(controllers: Vec<Box<dyn TouchSource>>, pads_per_controller: usize) -> Self {
        Self {
            controllers,
            pads_per_controller,
        }
    }

    /// Brings up every configured MPR121. The first controller that does not
    /// answer aborts startup.
    pub fn open(config: &SensorConfig) -> Result<Self, SensorError> {
        let thresholds = Thresholds {
            touch: config.touch_threshold,
            release: config.release_threshold,
        };

        let mut controllers: Vec<Box<dyn TouchSource>> = Vec::with_capacity(config.addresses.len());
        for (index, &address) in config.addresses.iter().enumerate() {
            let sensor = I2cBus::open(config.i2c_bus, address)
                .map_err(SensorError::from)
                .and_then(|bus| Mpr121::begin(bus, thresholds))
                .map_err(|e| SensorError::NotFound {
                    index,
                    address,
                    source: Box::new(e),
                })
                .inspect_err(|e| error!("{}", e))?;
            controllers.push(Box::new(sensor));
        }

        let array = Self::new(controllers, config.pads_per_controller);
        info!(
            "Initialized {} touch controllers, {} sippers",
            array.controller_count(),
            array.pad_count()
        );
        Ok(array)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn pads_per_controller(&self) -> usize {
        self.pads_per_controller
    }

    pub fn pad_count(&self) -> usize {
        self.controllers.len() * self.pads_per_controller
    }

    pub fn sample(&mut self, controller: usize) -> Result<u16, SensorError> {
        self.controllers[controller].sample()
    }

    pub fn address(&self, controller: usize) -> u16 {
        self.controllers[controller].address()
    }
}
