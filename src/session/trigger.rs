use rppal::gpio::{Gpio, InputPin};
use std::fmt;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

// Operator start signal, sampled by the Idle state
pub trait Trigger: Send + fmt::Debug {
    fn is_active(&mut self) -> bool;
}

/// Push button between a GPIO pin and ground, read with the internal pull-up.
#[derive(Debug)]
pub struct GpioTrigger {
    pin: InputPin,
}

impl GpioTrigger {
    pub fn open(bcm_pin: u8) -> Result<Self, TriggerError> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_input_pullup();
        info!("Start button on GPIO {} (active low)", bcm_pin);
        Ok(Self { pin })
    }
}

impl Trigger for GpioTrigger {
    fn is_active(&mut self) -> bool {
        self.pin.is_low()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::Trigger;

    /// Inactive for `idle_polls` samples, active afterwards.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedTrigger {
        pub idle_polls: usize,
        pub polls: usize,
    }

    impl Trigger for ScriptedTrigger {
        fn is_active(&mut self) -> bool {
            self.polls += 1;
            self.polls > self.idle_polls
        }
    }
}
