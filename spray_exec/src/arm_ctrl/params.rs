//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use robot_if::eqpt::Pin;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Arm control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // ---- GEOMETRY ----
    /// Length of the first link, shoulder joint to elbow joint.
    ///
    /// Units: millimeters
    pub link_1_length_mm: f64,

    /// Length of the second link, elbow joint to nozzle.
    ///
    /// Units: millimeters
    pub link_2_length_mm: f64,

    // ---- SERVOS ----
    pub shoulder_pin: Pin,
    pub elbow_pin: Pin,

    /// Units: hertz
    pub pwm_freq_hz: f64,

    /// Duty cycle commanding a servo to 0 degrees.
    ///
    /// Units: percent
    pub duty_min_pct: f64,

    /// Duty cycle commanding a servo to 180 degrees.
    ///
    /// Units: percent
    pub duty_max_pct: f64,

    /// Time a servo is driven for before its signal is released.
    ///
    /// Units: seconds
    pub settle_s: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            link_1_length_mm: 120.0,
            link_2_length_mm: 120.0,
            shoulder_pin: 18,
            elbow_pin: 16,
            pwm_freq_hz: 50.0,
            duty_min_pct: 2.0,
            duty_max_pct: 12.0,
            settle_s: 0.3,
        }
    }
}
