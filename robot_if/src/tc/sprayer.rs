//! # Sprayer telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A request to spray, as issued by the API layer or the detection pipeline.
///
/// If neither a duration nor a volume is given the sprayer default duration is used. If only a
/// volume is given the duration is derived from the pump flow rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, StructOpt)]
pub struct SprayRequest {
    /// Time to run the pump for.
    ///
    /// Units: seconds
    #[structopt(short = "d", long)]
    pub duration_s: Option<f64>,

    /// Volume of liquid to dispense.
    ///
    /// Units: milliliters
    #[structopt(short = "v", long)]
    pub volume_ml: Option<f64>,

    /// X coordinate of the target, recorded in the activity log.
    #[structopt(short = "x", long)]
    pub x: Option<f64>,

    /// Y coordinate of the target, recorded in the activity log.
    #[structopt(short = "y", long)]
    pub y: Option<f64>,

    /// Identifier supplied by the requester, used for tracing only.
    #[structopt(short = "r", long)]
    pub request_id: Option<String>,
}

/// A resolved spray command, consumed by the sprayer worker loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprayCmd {
    /// Requested pump on-time, before any clamping.
    ///
    /// Units: seconds
    pub duration_s: f64,

    pub x: Option<f64>,

    pub y: Option<f64>,

    pub request_id: Option<String>,
}

/// Acknowledgement returned immediately by a spray request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprayAck {
    pub status: SprayStatus,

    /// The resolved duration of the queued spray.
    ///
    /// Units: seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,

    /// Reason for an error acknowledgement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Outcome of a spray request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprayStatus {
    /// The spray has been accepted and will run asynchronously
    Queued,

    /// The spray was rejected
    Error,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SprayAck {
    pub fn queued(duration_s: f64) -> Self {
        Self {
            status: SprayStatus::Queued,
            duration_s: Some(duration_s),
            message: None,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            status: SprayStatus::Error,
            duration_s: None,
            message: Some(message.into()),
        }
    }
}
