//! # Telecommand module
//!
//! Commands consumed by the subsystem worker loops, and the structured results handed back to
//! whoever issued them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod arm_ctrl;
pub mod motor_ctrl;
pub mod sprayer;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Result of a robot-level operation such as power on or power off.
///
/// Failures are always reported through this structure rather than as raw error text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    /// True if the operation completed successfully
    pub ok: bool,

    /// Human readable description of the outcome
    pub message: String,

    /// Probable causes of a failure, empty on success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OpResult {
    /// A successful result with the given message.
    pub fn ok<S: Into<String>>(message: S) -> Self {
        Self {
            ok: true,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// A failed result with the given message and no known causes.
    pub fn fail<S: Into<String>>(message: S) -> Self {
        Self {
            ok: false,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Attach a list of probable causes to this result.
    pub fn with_causes(mut self, causes: &[&str]) -> Self {
        self.causes = causes.iter().map(|c| c.to_string()).collect();
        self
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_op_result_serialisation() {
        let ok = serde_json::to_value(OpResult::ok("robot powered ON")).unwrap();
        assert_eq!(ok["ok"], true);
        assert!(ok.get("causes").is_none());

        let fail = OpResult::fail("motors not responding").with_causes(&["wiring"]);
        let val = serde_json::to_value(&fail).unwrap();
        assert_eq!(val["ok"], false);
        assert_eq!(val["causes"][0], "wiring");
    }
}
