//! Parameters structure for the battery monitor

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the battery monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Period between battery readings.
    ///
    /// Units: seconds
    pub poll_interval_s: f64,

    /// Readings below this raise a low battery error.
    ///
    /// Units: volts
    pub low_voltage_v: f64,

    /// Readings below this raise a critical battery error and fire the webhook.
    ///
    /// Units: volts
    pub critical_voltage_v: f64,

    /// Voltage reported when no reader is fitted.
    ///
    /// Units: volts
    pub simulated_voltage_v: f64,

    /// Plain HTTP endpoint notified of critical readings, e.g. `http://10.0.0.2:8080/alert`.
    pub webhook_url: Option<String>,

    /// Units: seconds
    pub webhook_timeout_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            poll_interval_s: 30.0,
            low_voltage_v: 11.0,
            critical_voltage_v: 10.5,
            simulated_voltage_v: 12.0,
            webhook_url: None,
            webhook_timeout_s: 2.0,
        }
    }
}
