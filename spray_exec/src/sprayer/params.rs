//! Parameters structure for the Sprayer

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use robot_if::eqpt::Pin;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the sprayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Pump relay output
    pub pump_pin: Pin,

    /// Units: milliliters/second
    pub flow_rate_ml_per_s: f64,

    /// Area treated by a single spray, recorded in the activity log.
    ///
    /// Units: square meters
    pub default_area_m2: f64,

    /// Longest the pump may run for in one spray.
    ///
    /// Units: seconds
    pub max_duration_s: f64,

    /// Duration used when a request gives neither a duration nor a volume.
    ///
    /// Units: seconds
    pub default_duration_s: f64,

    /// Interval at which a running spray checks for shutdown.
    ///
    /// Units: seconds
    pub stop_poll_s: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            pump_pin: 20,
            flow_rate_ml_per_s: 10.0,
            default_area_m2: 0.5,
            max_duration_s: 30.0,
            default_duration_s: 1.0,
            stop_poll_s: 0.05,
        }
    }
}
