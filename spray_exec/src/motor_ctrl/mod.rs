//! # Motor control module
//!
//! Open loop control of the two drive sides through an H-bridge driver. Each side has a forwards
//! and a backwards output, the driver as a whole has an enable line. Quadrature encoders on each
//! wheel are used to verify the drive actually moves: once as a self-test when the motors are
//! enabled, and after every movement command to detect stalls.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod encoders;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::worker::WorkerError;
use robot_if::eqpt::IoError;

pub use encoders::EncoderCounts;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Probable causes reported with a stall.
pub const STALL_CAUSES: [&str; 3] = ["mechanical jam", "driver fault", "low battery"];

/// Probable causes reported when the enable self-test fails.
pub const SELF_TEST_CAUSES: [&str; 3] = ["encoder wiring", "driver fault", "low battery"];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MotorCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MotorCtrlError {
    #[error("Could not set up the motor driver outputs: {0}")]
    SetupError(IoError),

    #[error("Enable self-test failed, no encoder response")]
    SelfTestFailed,

    #[error("The motor driver did not report enabled")]
    NotEnabled,

    #[error(transparent)]
    WorkerError(#[from] WorkerError),
}
