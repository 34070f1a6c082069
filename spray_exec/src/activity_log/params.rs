//! Parameters structure for the ActivityLog

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Path of the SQLite database. Relative paths are resolved against the software root at
    /// startup.
    pub db_path: String,

    /// Maximum number of records waiting to be written. Records beyond this are dropped.
    pub queue_capacity: usize,

    /// Time a report query waits for the writer to release the database.
    ///
    /// Units: seconds
    pub busy_timeout_s: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            db_path: String::from("data/spray_log.db"),
            queue_capacity: 256,
            busy_timeout_s: 5.0,
        }
    }
}
