//! # Arm control module
//!
//! Drives the 2-link planar spray arm. Targets are given as a point in the arm plane relative to
//! the shoulder joint, inverse kinematics gives the joint angles, which are then sent to the
//! shoulder and elbow servos one after the other.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod inverse_kinematics;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::worker::WorkerError;
use robot_if::eqpt::IoError;

pub use inverse_kinematics::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Lowest angle a servo can be commanded to.
///
/// Units: degrees
pub const SERVO_MIN_DEG: f64 = 0.0;

/// Highest angle a servo can be commanded to.
///
/// Units: degrees
pub const SERVO_MAX_DEG: f64 = 180.0;

/// Centre of the servo range.
///
/// Units: degrees
pub const SERVO_CENTER_DEG: f64 = 90.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Joint angles of the arm in servo space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmPose {
    /// Units: degrees
    pub shoulder_deg: f64,

    /// Units: degrees
    pub elbow_deg: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A servo driven joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    Shoulder,
    Elbow,
}

/// Possible errors that can occur during ArmCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ArmCtrlError {
    #[error("Target ({0:.1}, {1:.1}) mm is unreachable, {2:.1} mm from the shoulder")]
    Unreachable(f64, f64, f64),

    #[error("Target ({0}, {1}) is not a finite point")]
    InvalidTarget(f64, f64),

    #[error("Could not drive the {0} servo: {1}")]
    ServoFault(Joint, IoError),

    #[error("The arm did not confirm the move in time")]
    Timeout,

    #[error(transparent)]
    WorkerError(#[from] WorkerError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmPose {
    /// Both joints at the centre of their range.
    pub const CENTER: ArmPose = ArmPose {
        shoulder_deg: SERVO_CENTER_DEG,
        elbow_deg: SERVO_CENTER_DEG,
    };
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Joint::Shoulder => write!(f, "shoulder"),
            Joint::Elbow => write!(f, "elbow"),
        }
    }
}
