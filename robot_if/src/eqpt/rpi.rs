//! # Raspberry Pi GPIO backend
//!
//! Implements [`DigitalIo`] with `rppal`. PWM is generated in software by `rppal` so any pin can
//! drive a servo.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use parking_lot::Mutex;
use rppal::gpio::{self, Gpio, InputPin, OutputPin, Trigger};
use std::collections::HashMap;

use super::gpio::{DigitalIo, EdgeCallback, IoError, Level, Pin, PinMode, PwmHandle};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// GPIO backend for the Raspberry Pi header.
pub struct RpiGpio {
    gpio: Gpio,

    pins: Mutex<HashMap<Pin, RpiPin>>,

    pwm_freq_hz: Mutex<HashMap<Pin, f64>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

enum RpiPin {
    Output(OutputPin),
    Input(InputPin),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RpiGpio {
    /// Open the GPIO peripheral.
    pub fn new() -> Result<Self, IoError> {
        let gpio = Gpio::new().map_err(|e| IoError::Backend(e.to_string()))?;

        Ok(Self {
            gpio,
            pins: Mutex::new(HashMap::new()),
            pwm_freq_hz: Mutex::new(HashMap::new()),
        })
    }

    fn get(&self, pin: Pin) -> Result<gpio::Pin, IoError> {
        self.gpio
            .get(pin)
            .map_err(|e| IoError::Unavailable(pin, e.to_string()))
    }
}

impl DigitalIo for RpiGpio {
    fn setup(&self, pin: Pin, mode: PinMode) -> Result<(), IoError> {
        let p = self.get(pin)?;
        let rpi_pin = match mode {
            PinMode::Output => {
                let mut out = p.into_output();
                out.set_reset_on_drop(true);
                RpiPin::Output(out)
            }
            PinMode::Input => RpiPin::Input(p.into_input()),
            PinMode::InputPullUp => RpiPin::Input(p.into_input_pullup()),
        };
        self.pins.lock().insert(pin, rpi_pin);
        Ok(())
    }

    fn read(&self, pin: Pin) -> Result<Level, IoError> {
        match self.pins.lock().get(&pin) {
            Some(RpiPin::Input(p)) => Ok(Level::from(p.is_high())),
            Some(RpiPin::Output(p)) => Ok(Level::from(p.is_set_high())),
            None => Err(IoError::Unavailable(pin, "pin has not been set up".into())),
        }
    }

    fn write(&self, pin: Pin, level: Level) -> Result<(), IoError> {
        match self.pins.lock().get_mut(&pin) {
            Some(RpiPin::Output(p)) => {
                match level {
                    Level::High => p.set_high(),
                    Level::Low => p.set_low(),
                }
                Ok(())
            }
            _ => Err(IoError::Unavailable(pin, "pin is not an output".into())),
        }
    }

    fn pwm_start(&self, pin: Pin, freq_hz: f64) -> Result<PwmHandle, IoError> {
        let mut pins = self.pins.lock();
        if !matches!(pins.get(&pin), Some(RpiPin::Output(_))) {
            let mut out = self.get(pin)?.into_output();
            out.set_reset_on_drop(true);
            pins.insert(pin, RpiPin::Output(out));
        }

        if let Some(RpiPin::Output(p)) = pins.get_mut(&pin) {
            p.set_pwm_frequency(freq_hz, 0.0)
                .map_err(|e| IoError::Backend(e.to_string()))?;
        }
        self.pwm_freq_hz.lock().insert(pin, freq_hz);

        Ok(PwmHandle { pin })
    }

    fn pwm_set_duty(&self, handle: PwmHandle, percent: f64) -> Result<(), IoError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(IoError::InvalidDutyCycle(percent));
        }

        let freq_hz = match self.pwm_freq_hz.lock().get(&handle.pin) {
            Some(f) => *f,
            None => return Err(IoError::NoPwm(handle.pin)),
        };

        match self.pins.lock().get_mut(&handle.pin) {
            Some(RpiPin::Output(p)) => p
                .set_pwm_frequency(freq_hz, percent / 100.0)
                .map_err(|e| IoError::Backend(e.to_string())),
            _ => Err(IoError::NoPwm(handle.pin)),
        }
    }

    fn pwm_stop(&self, handle: PwmHandle) -> Result<(), IoError> {
        self.pwm_freq_hz.lock().remove(&handle.pin);

        match self.pins.lock().get_mut(&handle.pin) {
            Some(RpiPin::Output(p)) => {
                p.clear_pwm().map_err(|e| IoError::Backend(e.to_string()))?;
                p.set_low();
                Ok(())
            }
            _ => Err(IoError::NoPwm(handle.pin)),
        }
    }

    fn register_rising_edge(&self, pin: Pin, callback: EdgeCallback) -> Result<(), IoError> {
        match self.pins.lock().get_mut(&pin) {
            Some(RpiPin::Input(p)) => p
                .set_async_interrupt(Trigger::RisingEdge, move |_| callback())
                .map_err(|e| IoError::Backend(e.to_string())),
            _ => Err(IoError::Unavailable(pin, "pin is not an input".into())),
        }
    }
}
