//! Parameters structure for MotorCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use robot_if::eqpt::Pin;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for motor control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // ---- PINS ----
    pub left_fwd_pin: Pin,
    pub left_bwd_pin: Pin,
    pub right_fwd_pin: Pin,
    pub right_bwd_pin: Pin,

    /// Motor driver enable line
    pub enable_pin: Pin,

    // ---- ENCODERS ----
    /// If false the robot has no wheel encoders, self-test and stall detection are skipped
    pub use_encoders: bool,

    pub enc_left_a_pin: Pin,
    pub enc_left_b_pin: Pin,
    pub enc_right_a_pin: Pin,
    pub enc_right_b_pin: Pin,

    // ---- STALL DETECTION ----
    /// Window over which wheel movement is sampled after a movement command.
    ///
    /// Units: seconds
    pub stall_timeout_s: f64,

    /// A wheel which ticks fewer times than this over the stall window is not moving
    pub stall_min_ticks: i64,

    // ---- ENABLE / DISABLE ----
    /// Time the worker waits after asserting the enable line before marking the motors enabled.
    ///
    /// Units: seconds
    pub enable_settle_s: f64,

    /// Time the caller of `enable` waits before sampling the encoders.
    ///
    /// Units: seconds
    pub self_test_delay_s: f64,

    /// Window over which the enable self-test samples the encoders.
    ///
    /// Units: seconds
    pub self_test_window_s: f64,

    /// Maximum time to wait for the worker to confirm the motors are disabled.
    ///
    /// Units: seconds
    pub disable_verify_timeout_s: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            left_fwd_pin: 17,
            left_bwd_pin: 27,
            right_fwd_pin: 22,
            right_bwd_pin: 23,
            enable_pin: 24,
            use_encoders: true,
            enc_left_a_pin: 5,
            enc_left_b_pin: 6,
            enc_right_a_pin: 13,
            enc_right_b_pin: 19,
            stall_timeout_s: 2.0,
            stall_min_ticks: 2,
            enable_settle_s: 0.05,
            self_test_delay_s: 0.2,
            self_test_window_s: 0.2,
            disable_verify_timeout_s: 3.0,
        }
    }
}
