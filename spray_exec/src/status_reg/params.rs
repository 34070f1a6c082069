//! Parameters structure for the StatusRegister

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use robot_if::eqpt::Pin;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the status register.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Path of the persisted status document. Relative paths are resolved against the software
    /// root at startup.
    pub status_path: String,

    /// Output driving the physical error indicator, high while an error is latched
    pub error_pin: Pin,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            status_path: String::from("data/robot_status.json"),
            error_pin: 21,
        }
    }
}
