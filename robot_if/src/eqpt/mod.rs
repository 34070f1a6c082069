//! # Equipment Interface
//!
//! This module defines the digital I/O capability that every hardware controller is written
//! against, plus the backends that implement it. The backend is chosen once at startup; nothing
//! above this interface knows whether it is talking to real pins or to the simulation.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Digital I/O, PWM and edge interrupt capability.
pub mod gpio;

/// In-memory simulated backend, used on the desktop and in tests.
pub mod sim;

/// Raspberry Pi backend built on `rppal`.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub mod rpi;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use gpio::*;
