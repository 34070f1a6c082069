//! # Spray robot library.
//!
//! The hardware-control core of the spray robot. Each subsystem (drive motors, arm, sprayer,
//! battery monitor, activity log) runs its own serial worker thread fed by a bounded command
//! queue. The only state shared between workers is the [`status_reg::StatusRegister`] and the
//! drive encoder counters, each behind its own lock. The [`robot::Robot`] orchestrator owns every
//! subsystem and is the only object an API layer needs to talk to.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Executable parameters - the full configuration surface, fixed at startup
pub mod params;

/// Serial worker - dedicated thread consuming a bounded command queue
pub mod worker;

/// Status register - lock protected, persisted snapshot of power state and component health
pub mod status_reg;

/// Activity log - single writer append pipeline for completed sprays
pub mod activity_log;

/// Motor control - open loop drive with encoder based self-test and stall detection
pub mod motor_ctrl;

/// Arm control - inverse kinematics and servo driving for the 2-link spray arm
pub mod arm_ctrl;

/// Sprayer - pump timing and activity logging
pub mod sprayer;

/// Distance sensor - synchronous ultrasonic ranging
pub mod dist_sensor;

/// Battery monitor - periodic voltage classification and alerting
pub mod battery_mon;

/// Robot orchestrator - power sequencing and the operations exposed to the API layer
pub mod robot;

#[cfg(test)]
pub(crate) mod test_util;
