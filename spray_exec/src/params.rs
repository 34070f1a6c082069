//! # Spray Executable Parameters
//!
//! This module provides parameters for the spray executable. Every section and field has a
//! default, so a parameter file only needs to list what differs from the robot as built.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use util::host;

use crate::{
    activity_log, arm_ctrl, battery_mon, dist_sensor, motor_ctrl, robot, sprayer, status_reg,
    worker::WorkerParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SprayExecParams {
    /// Queue and polling settings shared by the worker loops
    pub workers: WorkerParams,

    pub robot: robot::Params,

    pub status_reg: status_reg::Params,

    pub activity_log: activity_log::Params,

    pub motor_ctrl: motor_ctrl::Params,

    pub arm_ctrl: arm_ctrl::Params,

    pub sprayer: sprayer::Params,

    pub dist_sensor: dist_sensor::Params,

    pub battery_mon: battery_mon::Params,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SprayExecParams {
    /// Resolve the relative storage paths against the software root.
    pub fn resolve_paths(&mut self) -> Result<(), host::HostError> {
        self.status_reg.status_path = resolve(&self.status_reg.status_path)?;
        self.activity_log.db_path = resolve(&self.activity_log.db_path)?;
        Ok(())
    }
}

fn resolve(path: &str) -> Result<String, host::HostError> {
    Ok(host::resolve_path(path)?.to_string_lossy().into_owned())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let params: SprayExecParams = toml::from_str(
            r#"
            [motor_ctrl]
            stall_timeout_s = 1.5
            use_encoders = false

            [battery_mon]
            webhook_url = "http://10.0.0.2:8080/alert"
            "#,
        )
        .unwrap();

        assert_eq!(params.motor_ctrl.stall_timeout_s, 1.5);
        assert!(!params.motor_ctrl.use_encoders);
        assert_eq!(params.motor_ctrl.enable_pin, 24);
        assert_eq!(
            params.battery_mon.webhook_url.as_deref(),
            Some("http://10.0.0.2:8080/alert")
        );

        assert_eq!(params.sprayer.flow_rate_ml_per_s, 10.0);
        assert_eq!(params.sprayer.max_duration_s, 30.0);
        assert_eq!(params.arm_ctrl.link_1_length_mm, 120.0);
        assert_eq!(params.battery_mon.critical_voltage_v, 10.5);
    }

    #[test]
    fn test_shipped_file_matches_defaults() {
        let params: SprayExecParams =
            toml::from_str(include_str!("../../params/spray_exec.toml")).unwrap();
        let defaults = SprayExecParams::default();

        assert_eq!(
            toml::to_string(&params).unwrap(),
            toml::to_string(&defaults).unwrap()
        );
    }
}
