//! Shared fixtures for the unit tests: a simulated backend with wheel encoders, a status register
//! in a temporary directory and parameters with short timings.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;

use crate::{params::SprayExecParams, status_reg::StatusRegister};
use robot_if::eqpt::{
    sim::{EncoderSim, EncoderSimConfig, SimGpio, WheelSim},
    DigitalIo,
};

pub(crate) struct TestRig {
    pub sim: Arc<SimGpio>,

    pub io: Arc<dyn DigitalIo>,

    pub encoders: EncoderSim,

    pub status: Arc<StatusRegister>,

    pub params: SprayExecParams,

    /// Holds the status and log files, removed when the rig is dropped
    _dir: TempDir,
}

impl TestRig {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let params = fast_params(&dir);

        let sim = Arc::new(SimGpio::new());
        let io: Arc<dyn DigitalIo> = sim.clone();

        let m = &params.motor_ctrl;
        let encoders = sim.attach_encoders(EncoderSimConfig {
            enable_pin: m.enable_pin,
            wheels: vec![
                WheelSim {
                    enc_a: m.enc_left_a_pin,
                    enc_b: m.enc_left_b_pin,
                    bwd_pin: m.left_bwd_pin,
                },
                WheelSim {
                    enc_a: m.enc_right_a_pin,
                    enc_b: m.enc_right_b_pin,
                    bwd_pin: m.right_bwd_pin,
                },
            ],
            tick_period: Duration::from_millis(2),
        });

        let status = Arc::new(StatusRegister::new(
            &params.status_reg,
            io.clone(),
            params.motor_ctrl.use_encoders,
        ));

        Self {
            sim,
            io,
            encoders,
            status,
            params,
            _dir: dir,
        }
    }
}

/// Parameters with every delay cut down so that tests run in milliseconds.
pub(crate) fn fast_params(dir: &TempDir) -> SprayExecParams {
    let mut p = SprayExecParams::default();

    p.workers.queue_capacity = 16;
    p.workers.poll_period_s = 0.005;

    p.status_reg.status_path = dir
        .path()
        .join("robot_status.json")
        .to_string_lossy()
        .into_owned();
    p.activity_log.db_path = dir.path().join("spray_log.db").to_string_lossy().into_owned();

    p.motor_ctrl.stall_timeout_s = 0.1;
    p.motor_ctrl.enable_settle_s = 0.01;
    p.motor_ctrl.self_test_delay_s = 0.03;
    p.motor_ctrl.self_test_window_s = 0.08;
    p.motor_ctrl.disable_verify_timeout_s = 1.0;

    p.arm_ctrl.settle_s = 0.01;

    p.sprayer.stop_poll_s = 0.005;

    p.dist_sensor.echo_timeout_s = 0.02;
    p.dist_sensor.init_settle_s = 0.0;

    p.battery_mon.poll_interval_s = 0.02;

    p.robot.shutdown_grace_s = 0.5;
    p.robot.arm_center_timeout_s = 1.0;

    p
}

/// Poll `cond` until it holds or `timeout` expires.
pub(crate) fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}
