//! # Status structures
//!
//! The snapshot type held by the status register and returned to the API layer.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Snapshot of the robot's power state and component health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub power: PowerState,

    /// Health of every known component
    pub components: BTreeMap<Component, Health>,

    /// The most recent error raised by any component, cleared on recovery
    pub last_error: Option<LastError>,

    /// Free-form description of the most recent hardware action
    pub last_operation: Option<String>,

    /// Last battery reading, or `None` if the battery couldn't be read.
    ///
    /// Units: volts
    pub battery_voltage: Option<f64>,

    /// Time at which the status register was created
    pub uptime_start: DateTime<Utc>,
}

/// An error raised against a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub component: Component,

    pub message: String,

    /// Probable causes of the error, may be empty
    pub causes: Vec<String>,

    pub timestamp: DateTime<Utc>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Robot power state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    Off,
    On,
}

/// Health of a single component.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Unknown,
    Ok,
    Error,
    NotPresent,
}

/// Components tracked by the status register.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Motors,
    Encoders,
    Arm,
    Servos,
    Sprayer,
    Ultrasonic,
    Battery,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StatusSnapshot {
    /// Create the power-on snapshot.
    ///
    /// All components start as `Unknown`, except the encoders which are `NotPresent` if the robot
    /// is configured without them.
    pub fn new(encoders_present: bool) -> Self {
        let mut components = BTreeMap::new();
        for c in Component::all() {
            components.insert(*c, Health::Unknown);
        }
        if !encoders_present {
            components.insert(Component::Encoders, Health::NotPresent);
        }

        Self {
            power: PowerState::Off,
            components,
            last_error: None,
            last_operation: None,
            battery_voltage: None,
            uptime_start: Utc::now(),
        }
    }

    /// Health of the given component, `Unknown` if it has never been reported.
    pub fn health(&self, component: Component) -> Health {
        self.components
            .get(&component)
            .copied()
            .unwrap_or(Health::Unknown)
    }
}

impl Component {
    pub fn all() -> &'static [Component] {
        &[
            Component::Motors,
            Component::Encoders,
            Component::Arm,
            Component::Servos,
            Component::Sprayer,
            Component::Ultrasonic,
            Component::Battery,
        ]
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::Motors => "motors",
            Component::Encoders => "encoders",
            Component::Arm => "arm",
            Component::Servos => "servos",
            Component::Sprayer => "sprayer",
            Component::Ultrasonic => "ultrasonic",
            Component::Battery => "battery",
        };
        write!(f, "{}", s)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
