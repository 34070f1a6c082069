//! # Activity report structures

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single completed spray, as committed to the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Time at which the entry was committed
    pub timestamp: DateTime<Utc>,

    /// Units: milliliters
    pub ml_used: f64,

    /// Units: square meters
    pub area_m2: f64,

    pub x: Option<f64>,

    pub y: Option<f64>,

    /// Units: seconds
    pub duration_s: Option<f64>,
}

/// All sprays committed on a single UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,

    /// Sum of `ml_used` over all entries.
    ///
    /// Units: milliliters
    pub total_ml: f64,

    /// Entries in timestamp order
    pub entries: Vec<ActivityLogEntry>,
}
