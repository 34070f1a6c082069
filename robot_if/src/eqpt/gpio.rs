//! # Digital I/O capability

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A BCM pin number.
pub type Pin = u8;

/// Callback fired on a rising edge of an input pin.
///
/// Callbacks run on the backend's interrupt thread, so they must be short and must not block on
/// anything held while calling into the backend.
pub type EdgeCallback = Box<dyn Fn() + Send + Sync + 'static>;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API over the GPIO backends.
///
/// All methods take `&self` so that a single backend can be shared between every controller
/// thread behind an `Arc<dyn DigitalIo>`. Implementations must be safe to call as a no-op, a
/// simulated backend may accept any pin.
pub trait DigitalIo: Send + Sync {
    /// Configure a pin for the given mode.
    fn setup(&self, pin: Pin, mode: PinMode) -> Result<(), IoError>;

    /// Read the current level of a pin.
    fn read(&self, pin: Pin) -> Result<Level, IoError>;

    /// Drive an output pin to the given level.
    fn write(&self, pin: Pin, level: Level) -> Result<(), IoError>;

    /// Start a PWM output on a pin with a 0% duty cycle.
    ///
    /// ## Arguments
    /// - `pin` - The output pin
    /// - `freq_hz` - PWM frequency in hertz
    fn pwm_start(&self, pin: Pin, freq_hz: f64) -> Result<PwmHandle, IoError>;

    /// Set the duty cycle of a running PWM output.
    ///
    /// ## Arguments
    /// - `handle` - Handle returned by [`DigitalIo::pwm_start`]
    /// - `percent` - The duty cycle, between 0.0 and 100.0. Values outside this range are
    ///   rejected.
    fn pwm_set_duty(&self, handle: PwmHandle, percent: f64) -> Result<(), IoError>;

    /// Stop a PWM output, leaving the pin low.
    fn pwm_stop(&self, handle: PwmHandle) -> Result<(), IoError>;

    /// Call `callback` on every rising edge of `pin`.
    fn register_rising_edge(&self, pin: Pin, callback: EdgeCallback) -> Result<(), IoError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to a running PWM output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PwmHandle {
    pub pin: Pin,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Logic level of a pin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

/// Direction and bias of a pin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    Output,
    Input,
    InputPullUp,
}

/// Errors raised by a digital I/O backend.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("Hardware fault on pin {0}")]
    Fault(Pin),

    #[error("Pin {0} is not available: {1}")]
    Unavailable(Pin, String),

    #[error("No PWM output is running on pin {0}")]
    NoPwm(Pin),

    #[error("Duty cycle must be between 0.0 and 100.0, found {0}")]
    InvalidDutyCycle(f64),

    #[error("Backend error: {0}")]
    Backend(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}
