//! # Robot interface crate.
//!
//! Provides the types shared between the spray robot executable and anything that drives it
//! (the operator console, an API layer): commands, status and report structures, and the
//! digital I/O capability the hardware controllers are written against.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Commands accepted by the subsystem controllers and the structured results returned to callers.
pub mod tc;

/// Status register snapshot types.
pub mod status;

/// Activity log entry and daily report types.
pub mod report;

/// Equipment interfaces (digital I/O, PWM, edge interrupts) and their backends.
pub mod eqpt;
