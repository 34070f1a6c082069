//! # Arm control telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command for the 2-link planar spray arm.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
pub enum ArmCmd {
    /// Place the nozzle at a point in the arm plane.
    ///
    /// Joint angles are found with inverse kinematics.
    #[structopt(name = "move")]
    MoveTo {
        /// Horizontal distance from the shoulder joint.
        ///
        /// Units: millimeters
        x_mm: f64,

        /// Vertical distance from the shoulder joint.
        ///
        /// Units: millimeters
        y_mm: f64,
    },

    /// Drive both joints to the centre of their range (90 degrees).
    #[structopt(name = "center")]
    Center,
}
