//! # Motor control telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command for the drive motors.
///
/// Drive control is open loop: each side is either driven forwards, backwards, or not at all.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
pub enum MotorCmd {
    /// Assert the motor driver enable line.
    #[structopt(name = "enable")]
    Enable,

    /// Stop all motion and release the motor driver enable line.
    #[structopt(name = "disable")]
    Disable,

    /// Drive both sides forwards.
    #[structopt(name = "fwd")]
    Forward,

    /// Drive both sides backwards.
    #[structopt(name = "bwd")]
    Backward,

    /// Turn on the spot to the left, left side backwards and right side forwards.
    #[structopt(name = "left")]
    Left,

    /// Turn on the spot to the right, left side forwards and right side backwards.
    #[structopt(name = "right")]
    Right,

    /// Release all direction outputs.
    #[structopt(name = "stop")]
    Stop,

    /// Drive forwards for a fixed time then stop.
    #[structopt(name = "fwd-for")]
    ForwardFor {
        /// Time to drive for.
        ///
        /// Units: seconds
        duration_s: f64,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorCmd {
    /// True if this command puts the wheels in motion.
    pub fn is_movement(&self) -> bool {
        matches!(
            self,
            MotorCmd::Forward
                | MotorCmd::Backward
                | MotorCmd::Left
                | MotorCmd::Right
                | MotorCmd::ForwardFor { .. }
        )
    }
}
