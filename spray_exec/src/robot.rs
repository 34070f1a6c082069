//! # Robot orchestrator
//!
//! Owns every subsystem and sequences power on and power off. This is the only object an API
//! layer needs: each operation it exposes either queues a command with the owning subsystem or
//! reads shared state, it never drives hardware itself.
//!
//! Power on enables the motors, which self-test against the encoders, then centres the arm.
//! Power off stops the wheels, discards sprays which have not started, and disables the motors,
//! checking that the enable line really was released.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::NaiveDate;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::{
    activity_log::{ActivityLog, ActivityLogError},
    arm_ctrl::{ArmCtrl, ArmCtrlError},
    battery_mon::{BatteryMon, BatteryMonError, VoltageReader},
    dist_sensor::DistSensor,
    motor_ctrl::{MotorCtrl, MotorCtrlError, SELF_TEST_CAUSES},
    params::SprayExecParams,
    sprayer::{Sprayer, SprayerError},
    status_reg::StatusRegister,
};
use robot_if::{
    eqpt::{DigitalIo, Level, Pin},
    report::DailyReport,
    status::{Component, PowerState, StatusSnapshot},
    tc::{
        arm_ctrl::ArmCmd,
        motor_ctrl::MotorCmd,
        sprayer::{SprayAck, SprayRequest},
        OpResult,
    },
};
use util::time::secs;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const ARM_CAUSES: [&str; 2] = ["servo wiring", "servo power"];

const DISABLE_CAUSES: [&str; 2] = ["enable line stuck", "driver fault"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Orchestrator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Time given to the workers to exit at cleanup.
    ///
    /// Units: seconds
    pub shutdown_grace_s: f64,

    /// Longest wait for the arm to centre during power on.
    ///
    /// Units: seconds
    pub arm_center_timeout_s: f64,
}

pub struct Robot {
    params: SprayExecParams,

    io: Arc<dyn DigitalIo>,

    status: Arc<StatusRegister>,

    activity_log: Arc<ActivityLog>,

    motors: MotorCtrl,

    arm: ArmCtrl,

    sprayer: Sprayer,

    dist_sensor: DistSensor,

    battery: BatteryMon,

    /// Serialises power on and power off
    power_lock: Mutex<()>,

    cleaned_up: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("Activity log error: {0}")]
    ActivityLogError(#[from] ActivityLogError),

    #[error("Motor control error: {0}")]
    MotorCtrlError(#[from] MotorCtrlError),

    #[error("Arm control error: {0}")]
    ArmCtrlError(#[from] ArmCtrlError),

    #[error("Sprayer error: {0}")]
    SprayerError(#[from] SprayerError),

    #[error("Battery monitor error: {0}")]
    BatteryMonError(#[from] BatteryMonError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            shutdown_grace_s: 0.5,
            arm_center_timeout_s: 3.0,
        }
    }
}

impl Robot {
    /// Bring up every subsystem against the given I/O backend.
    ///
    /// The robot starts powered off. `voltage_reader` reads the battery, without one a
    /// simulated voltage is reported.
    pub fn new(
        params: SprayExecParams,
        io: Arc<dyn DigitalIo>,
        voltage_reader: Option<VoltageReader>,
    ) -> Result<Self, RobotError> {
        let status = Arc::new(StatusRegister::new(
            &params.status_reg,
            io.clone(),
            params.motor_ctrl.use_encoders,
        ));

        let activity_log = Arc::new(ActivityLog::new(&params.activity_log, &params.workers)?);

        let motors = MotorCtrl::new(&params.motor_ctrl, &params.workers, io.clone(), status.clone())?;
        let arm = ArmCtrl::new(&params.arm_ctrl, &params.workers, io.clone(), status.clone())?;
        let sprayer = Sprayer::new(
            &params.sprayer,
            &params.workers,
            io.clone(),
            status.clone(),
            activity_log.clone(),
        )?;
        let dist_sensor = DistSensor::new(&params.dist_sensor, io.clone(), status.clone());
        let battery = BatteryMon::start(
            &params.battery_mon,
            params.workers.poll_period_s,
            status.clone(),
            voltage_reader,
        )?;

        info!("Robot initialised");

        Ok(Self {
            params,
            io,
            status,
            activity_log,
            motors,
            arm,
            sprayer,
            dist_sensor,
            battery,
            power_lock: Mutex::new(()),
            cleaned_up: AtomicBool::new(false),
        })
    }

    /// Power the robot on.
    ///
    /// If the motors fail their self-test the arm is left alone. If the arm cannot be centred
    /// the motors are disabled again, so a failed power on always leaves the robot off.
    pub fn start(&self) -> OpResult {
        let _guard = self.power_lock.lock();
        info!("Powering on");

        if let Err(e) = self.motors.enable() {
            if !matches!(e, MotorCtrlError::SelfTestFailed) {
                self.status.set_error(
                    Component::Motors,
                    &format!("enable failed: {}", e),
                    &SELF_TEST_CAUSES,
                );
            }
            return OpResult::fail("motors not responding; check connections")
                .with_causes(&SELF_TEST_CAUSES);
        }

        if let Err(e) = self.arm.center(secs(self.params.robot.arm_center_timeout_s)) {
            // Faults seen by the arm worker are already reported
            if matches!(e, ArmCtrlError::Timeout | ArmCtrlError::WorkerError(_)) {
                self.status.set_error(
                    Component::Arm,
                    &format!("servo move failed: {}", e),
                    &ARM_CAUSES,
                );
            }

            if self.motors.disable().is_err() || !self.wait_motors_disabled() {
                warn!("Motors still enabled after the arm failed to centre");
            }
            return OpResult::fail("arm not responding").with_causes(&ARM_CAUSES);
        }

        self.status.set_power(PowerState::On);
        OpResult::ok("robot powered ON")
    }

    /// Power the robot off.
    ///
    /// The power state is left unchanged if the motors cannot be shown to be disabled.
    pub fn stop(&self) -> OpResult {
        let _guard = self.power_lock.lock();
        info!("Powering off");

        if let Err(e) = self.motors.stop() {
            self.status
                .set_error(Component::Motors, &format!("stop failed: {}", e), &[]);
            return OpResult::fail(format!("stop failed: {}", e));
        }

        let dropped = self.sprayer.drain();
        if dropped > 0 {
            info!("Discarded {} queued sprays", dropped);
        }

        if let Err(e) = self.motors.disable() {
            self.status
                .set_error(Component::Motors, &format!("disable failed: {}", e), &[]);
            return OpResult::fail(format!("disable failed: {}", e));
        }

        if !self.wait_motors_disabled() {
            self.status
                .set_error(Component::Motors, "failed to disable", &DISABLE_CAUSES);
            return OpResult::fail("motors did not stop").with_causes(&DISABLE_CAUSES);
        }

        self.status.set_power(PowerState::Off);
        OpResult::ok("robot powered OFF")
    }

    /// Queue a spray.
    pub fn spray(&self, request: SprayRequest) -> SprayAck {
        self.sprayer.spray(request)
    }

    pub fn get_status(&self) -> StatusSnapshot {
        self.status.get_snapshot()
    }

    /// Sprays committed on `date`, today (UTC) if `None`.
    pub fn get_report(&self, date: Option<NaiveDate>) -> Result<DailyReport, RobotError> {
        Ok(self.activity_log.daily_report(date)?)
    }

    /// Read the battery voltage immediately, `None` if it could not be read.
    pub fn read_battery_now(&self) -> Option<f64> {
        self.battery.read_now()
    }

    /// Power off and release every subsystem.
    ///
    /// The outcome of the power off is returned, cleanup goes ahead regardless.
    pub fn manual_shutdown(&self) -> OpResult {
        let res = self.stop();
        self.cleanup();
        res
    }

    /// Queue a manual drive command.
    ///
    /// `Enable` and `Disable` are refused, the motors are only powered through [`Robot::start`]
    /// and [`Robot::stop`] so that the power state always matches them.
    pub fn drive(&self, cmd: MotorCmd) -> OpResult {
        if matches!(cmd, MotorCmd::Enable | MotorCmd::Disable) {
            warn!("Drive command {:?} refused, use start or stop", cmd);
            return OpResult::fail(format!("{:?} refused: use start or stop", cmd));
        }

        match self.motors.send(cmd) {
            Ok(()) => OpResult::ok(format!("{:?} accepted", cmd)),
            Err(e) => {
                warn!("Drive command {:?} failed: {}", cmd, e);
                OpResult::fail(e.to_string())
            }
        }
    }

    /// Queue a move of the spray nozzle to `(x_mm, y_mm)`.
    pub fn move_arm(&self, x_mm: f64, y_mm: f64) -> OpResult {
        self.arm_cmd(ArmCmd::MoveTo { x_mm, y_mm })
    }

    /// Queue any arm command.
    pub fn arm_cmd(&self, cmd: ArmCmd) -> OpResult {
        match self.arm.send(cmd) {
            Ok(()) => OpResult::ok(format!("{:?} queued", cmd)),
            Err(e) => {
                warn!("Arm command {:?} failed: {}", cmd, e);
                OpResult::fail(e.to_string())
            }
        }
    }

    /// Range to the nearest obstacle, blocking for up to twice the echo timeout.
    pub fn distance_cm(&self) -> Option<f64> {
        self.dist_sensor.get_distance_cm()
    }

    /// Change the simulated battery voltage, ignored if a voltage reader is fitted.
    pub fn set_simulated_voltage(&self, voltage: f64) {
        self.battery.set_simulated_voltage(voltage);
    }

    /// Stop every worker, wait for them up to the grace period and drive all outputs low.
    ///
    /// Calling this more than once has no further effect.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Robot cleanup initiated");

        let deadline = Instant::now() + secs(self.params.robot.shutdown_grace_s);

        self.motors.shutdown();
        self.arm.shutdown();
        self.sprayer.shutdown();
        self.battery.shutdown();

        let mut all_stopped = self.motors.join_until(deadline);
        all_stopped &= self.arm.join_until(deadline);
        all_stopped &= self.sprayer.join_until(deadline);
        all_stopped &= self.battery.join_until(deadline);

        // Stopped last so that a spray cut short above is still recorded
        self.activity_log.stop();
        all_stopped &= self.activity_log.join_until(deadline);

        if !all_stopped {
            warn!("Not all workers stopped within the grace period");
        }

        for pin in self.output_pins() {
            if let Err(e) = self.io.write(pin, Level::Low) {
                warn!("Could not drive pin {} low: {}", pin, e);
            }
        }

        info!("Robot cleanup complete");
    }

    fn wait_motors_disabled(&self) -> bool {
        self.motors
            .wait_disabled(secs(self.params.motor_ctrl.disable_verify_timeout_s))
    }

    fn output_pins(&self) -> Vec<Pin> {
        let m = &self.params.motor_ctrl;
        vec![
            m.left_fwd_pin,
            m.left_bwd_pin,
            m.right_fwd_pin,
            m.right_bwd_pin,
            m.enable_pin,
            self.params.sprayer.pump_pin,
            self.params.dist_sensor.trig_pin,
            self.params.status_reg.error_pin,
        ]
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{wait_until, TestRig};
    use robot_if::status::Health;
    use std::time::Duration;

    fn make_robot(rig: &TestRig) -> Robot {
        Robot::new(rig.params.clone(), rig.io.clone(), None).unwrap()
    }

    #[test]
    fn test_power_cycle() {
        let rig = TestRig::new();
        let robot = make_robot(&rig);
        assert_eq!(robot.get_status().power, PowerState::Off);

        let res = robot.start();
        assert!(res.ok, "{:?}", res);
        assert_eq!(res.message, "robot powered ON");

        let snap = robot.get_status();
        assert_eq!(snap.power, PowerState::On);
        assert_eq!(snap.health(Component::Motors), Health::Ok);
        assert_eq!(snap.health(Component::Arm), Health::Ok);
        assert_eq!(
            rig.sim.duty_history(rig.params.arm_ctrl.shoulder_pin),
            vec![7.0, 0.0]
        );

        let res = robot.stop();
        assert!(res.ok, "{:?}", res);
        assert_eq!(robot.get_status().power, PowerState::Off);
        assert_eq!(rig.sim.level(rig.params.motor_ctrl.enable_pin), Level::Low);
    }

    #[test]
    fn test_self_test_failure_leaves_arm_alone() {
        let rig = TestRig::new();
        rig.encoders.set_jammed(true);
        let robot = make_robot(&rig);

        let res = robot.start();
        assert!(!res.ok);
        assert_eq!(res.message, "motors not responding; check connections");
        assert!(res.causes.contains(&"encoder wiring".to_string()));

        // Give a stray arm command time to show up
        std::thread::sleep(Duration::from_millis(50));
        assert!(rig
            .sim
            .duty_history(rig.params.arm_ctrl.shoulder_pin)
            .is_empty());

        let snap = robot.get_status();
        assert_eq!(snap.power, PowerState::Off);
        assert_eq!(snap.health(Component::Motors), Health::Error);
    }

    #[test]
    fn test_arm_failure_disables_motors() {
        let rig = TestRig::new();
        rig.sim.inject_fault(rig.params.arm_ctrl.shoulder_pin);
        let robot = make_robot(&rig);

        let res = robot.start();
        assert!(!res.ok);
        assert_eq!(res.message, "arm not responding");

        assert!(wait_until(Duration::from_secs(1), || !robot
            .motors
            .is_enabled()));
        let snap = robot.get_status();
        assert_eq!(snap.power, PowerState::Off);
        assert_eq!(snap.health(Component::Servos), Health::Error);
    }

    #[test]
    fn test_stop_fails_if_motors_stay_enabled() {
        let rig = TestRig::new();
        let robot = make_robot(&rig);
        assert!(robot.start().ok);

        rig.sim.inject_fault(rig.params.motor_ctrl.enable_pin);
        let res = robot.stop();
        assert!(!res.ok);
        assert_eq!(res.message, "motors did not stop");

        let snap = robot.get_status();
        assert_eq!(snap.power, PowerState::On);
        assert_eq!(snap.health(Component::Motors), Health::Error);

        rig.sim.clear_fault(rig.params.motor_ctrl.enable_pin);
        assert!(robot.stop().ok);
        assert_eq!(robot.get_status().power, PowerState::Off);
    }

    #[test]
    fn test_stop_discards_queued_sprays() {
        let rig = TestRig::new();
        let robot = make_robot(&rig);

        for _ in 0..3 {
            let ack = robot.spray(SprayRequest {
                duration_s: Some(0.2),
                ..SprayRequest::default()
            });
            assert_eq!(ack.duration_s, Some(0.2));
        }
        assert!(wait_until(Duration::from_secs(1), || rig
            .sim
            .level(rig.params.sprayer.pump_pin)
            .is_high()));

        assert!(robot.stop().ok);

        // Only the spray already running completes
        std::thread::sleep(Duration::from_millis(500));
        assert!(robot.activity_log.flush(Duration::from_secs(1)));
        let report = robot.get_report(None).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert!((report.total_ml - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_drive_and_arm_commands() {
        let rig = TestRig::new();
        let robot = make_robot(&rig);

        // Power is only changed through start and stop
        assert!(!robot.drive(MotorCmd::Enable).ok);
        assert!(!robot.motors.is_enabled());
        assert_eq!(robot.get_status().power, PowerState::Off);

        assert!(robot.start().ok);
        let res = robot.drive(MotorCmd::Disable);
        assert!(!res.ok);
        assert!(res.message.contains("use start or stop"));
        assert!(robot.motors.is_enabled());
        assert_eq!(robot.get_status().power, PowerState::On);

        assert!(robot.drive(MotorCmd::Stop).ok);
        assert!(robot.move_arm(150.0, 60.0).ok);

        assert!(wait_until(Duration::from_secs(1), || rig
            .sim
            .duty_history(rig.params.arm_ctrl.elbow_pin)
            .len()
            == 2));
    }

    #[test]
    fn test_battery_and_distance() {
        let rig = TestRig::new();
        let robot = make_robot(&rig);

        assert_eq!(robot.read_battery_now(), Some(12.0));
        robot.set_simulated_voltage(11.5);
        assert_eq!(robot.read_battery_now(), Some(11.5));

        assert_eq!(robot.distance_cm(), None);
        assert_eq!(
            robot.get_status().health(Component::Ultrasonic),
            Health::Error
        );
    }

    #[test]
    fn test_failing_voltage_reader() {
        let rig = TestRig::new();
        let robot = Robot::new(
            rig.params.clone(),
            rig.io.clone(),
            Some(Box::new(|| Err(BatteryMonError::ReadFailed("adc".into())))),
        )
        .unwrap();

        assert_eq!(robot.read_battery_now(), None);
    }

    #[test]
    fn test_manual_shutdown() {
        let rig = TestRig::new();
        let robot = make_robot(&rig);
        assert!(robot.start().ok);

        let res = robot.manual_shutdown();
        assert!(res.ok, "{:?}", res);
        assert_eq!(robot.get_status().power, PowerState::Off);

        let p = &rig.params;
        for pin in [
            p.motor_ctrl.left_fwd_pin,
            p.motor_ctrl.enable_pin,
            p.sprayer.pump_pin,
        ] {
            assert_eq!(rig.sim.level(pin), Level::Low);
        }
        assert_eq!(rig.sim.duty(p.arm_ctrl.shoulder_pin), None);

        // Workers are gone, commands are refused rather than lost silently
        assert!(!robot.move_arm(150.0, 60.0).ok);
        assert_eq!(
            robot
                .spray(SprayRequest {
                    duration_s: Some(0.1),
                    ..SprayRequest::default()
                })
                .status,
            robot_if::tc::sprayer::SprayStatus::Error
        );

        // Idempotent
        robot.cleanup();
    }
}
