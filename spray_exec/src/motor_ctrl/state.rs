//! Implementations for the MotorCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use super::{
    encoders::Encoders, EncoderCounts, MotorCtrlError, Params, SELF_TEST_CAUSES, STALL_CAUSES,
};
use crate::{
    status_reg::StatusRegister,
    worker::{Worker, WorkerParams},
};
use robot_if::{
    eqpt::{DigitalIo, IoError, Level, PinMode},
    status::{Component, Health},
    tc::motor_ctrl::MotorCmd,
};
use util::time::secs;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Motor control handle.
///
/// Commands are executed one at a time by the motor worker. Only `enable` and `check_stall`
/// block the caller, for their sampling windows.
pub struct MotorCtrl {
    params: Params,

    shared: Arc<Shared>,

    worker: Worker<MotorCmd>,

    status: Arc<StatusRegister>,
}

/// State shared between the handle and the worker.
struct Shared {
    enabled: AtomicBool,

    encoders: Arc<Encoders>,
}

/// State owned by the motor worker.
struct Driver {
    params: Params,

    shared: Arc<Shared>,

    io: Arc<dyn DigitalIo>,

    status: Arc<StatusRegister>,
}

/// Levels of the four direction outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DriveOutputs {
    left_fwd: Level,
    left_bwd: Level,
    right_fwd: Level,
    right_bwd: Level,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotorCtrl {
    /// Set up the driver outputs and encoders and start the motor worker.
    ///
    /// A failure to set up the encoders is logged and the controller carries on, stall detection
    /// will then report the drive as stalled.
    pub fn new(
        params: &Params,
        worker_params: &WorkerParams,
        io: Arc<dyn DigitalIo>,
        status: Arc<StatusRegister>,
    ) -> Result<Self, MotorCtrlError> {
        let outputs = [
            params.left_fwd_pin,
            params.left_bwd_pin,
            params.right_fwd_pin,
            params.right_bwd_pin,
            params.enable_pin,
        ];
        for pin in outputs {
            io.setup(pin, PinMode::Output)
                .map_err(MotorCtrlError::SetupError)?;
            if let Err(e) = io.write(pin, Level::Low) {
                warn!("Could not drive pin {} low: {}", pin, e);
            }
        }

        let encoders = Arc::new(Encoders::default());
        if params.use_encoders {
            if let Err(e) = encoders.attach(&io, params) {
                warn!("Encoder setup failed: {}", e);
                status.update_component(Component::Encoders, Health::Error);
            }
        }

        let shared = Arc::new(Shared {
            enabled: AtomicBool::new(false),
            encoders,
        });

        let mut driver = Driver {
            params: params.clone(),
            shared: shared.clone(),
            io,
            status: status.clone(),
        };
        let worker = Worker::spawn("motor_ctrl", worker_params, move |cmd: MotorCmd, _| {
            driver.exec(cmd)
        })?;

        Ok(Self {
            params: params.clone(),
            shared,
            worker,
            status,
        })
    }

    /// Enable the motor driver and verify the wheels respond.
    ///
    /// Blocks for the self-test delay and window. If neither wheel ticks during the window the
    /// motors are disabled again, an error is raised and [`MotorCtrlError::SelfTestFailed`] is
    /// returned.
    pub fn enable(&self) -> Result<(), MotorCtrlError> {
        self.worker.send(MotorCmd::Enable)?;

        thread::sleep(secs(self.params.self_test_delay_s));

        if self.params.use_encoders {
            let (left, right) = self
                .shared
                .encoders
                .movement_over(secs(self.params.self_test_window_s));

            if left < 1 && right < 1 {
                self.shared.enabled.store(false, Ordering::Relaxed);
                self.worker.send(MotorCmd::Disable).ok();
                self.status.set_error(
                    Component::Motors,
                    "enable failed: no encoder response",
                    &SELF_TEST_CAUSES,
                );
                return Err(MotorCtrlError::SelfTestFailed);
            }
        }

        if !self.wait_enabled(secs(self.params.self_test_window_s)) {
            return Err(MotorCtrlError::NotEnabled);
        }

        info!("Motors enabled");
        Ok(())
    }

    /// Queue a disable, stopping all motion and releasing the enable line.
    pub fn disable(&self) -> Result<(), MotorCtrlError> {
        self.send(MotorCmd::Disable)
    }

    pub fn forward(&self) -> Result<(), MotorCtrlError> {
        self.send(MotorCmd::Forward)
    }

    pub fn backward(&self) -> Result<(), MotorCtrlError> {
        self.send(MotorCmd::Backward)
    }

    pub fn left(&self) -> Result<(), MotorCtrlError> {
        self.send(MotorCmd::Left)
    }

    pub fn right(&self) -> Result<(), MotorCtrlError> {
        self.send(MotorCmd::Right)
    }

    pub fn stop(&self) -> Result<(), MotorCtrlError> {
        self.send(MotorCmd::Stop)
    }

    /// Drive forwards for `duration` then stop. Blocks the motor worker, not the caller.
    pub fn forward_for(&self, duration: Duration) -> Result<(), MotorCtrlError> {
        self.send(MotorCmd::ForwardFor {
            duration_s: duration.as_secs_f64(),
        })
    }

    /// Queue any motor command.
    pub fn send(&self, cmd: MotorCmd) -> Result<(), MotorCtrlError> {
        self.worker.send(cmd).map_err(MotorCtrlError::from)
    }

    pub fn reset_encoders(&self) {
        self.shared.encoders.reset();
    }

    pub fn get_encoders(&self) -> EncoderCounts {
        self.shared.encoders.get()
    }

    /// Sample the encoders for `timeout` (the stall timeout if `None`) and report whether the
    /// drive is stalled.
    ///
    /// Always `false` if the robot has no encoders.
    pub fn check_stall(&self, timeout: Option<Duration>) -> bool {
        if !self.params.use_encoders {
            return false;
        }

        let window = timeout.unwrap_or_else(|| secs(self.params.stall_timeout_s));
        self.shared
            .encoders
            .stalled(window, self.params.stall_min_ticks)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// Wait up to `timeout` for the enabled flag to clear.
    pub fn wait_disabled(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, false)
    }

    fn wait_enabled(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, true)
    }

    fn wait_for(&self, timeout: Duration, enabled: bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_enabled() == enabled {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Discard queued commands which have not started yet.
    pub fn drain(&self) -> usize {
        self.worker.drain()
    }

    pub fn shutdown(&self) {
        self.worker.stop();
    }

    pub fn join_until(&self, deadline: Instant) -> bool {
        self.worker.join_until(deadline)
    }
}

impl Shared {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl Driver {
    fn exec(&mut self, cmd: MotorCmd) {
        debug!("MotorCtrl executing {:?}", cmd);

        if cmd.is_movement() && !self.shared.is_enabled() {
            warn!("Ignoring {:?}, motors are not enabled", cmd);
            return;
        }

        match cmd {
            MotorCmd::Enable => self.exec_enable(),
            MotorCmd::Disable => self.exec_disable(),
            MotorCmd::Forward => self.exec_move(DriveOutputs::FORWARD, "forward"),
            MotorCmd::Backward => self.exec_move(DriveOutputs::BACKWARD, "backward"),
            MotorCmd::Left => self.exec_move(DriveOutputs::LEFT, "left"),
            MotorCmd::Right => self.exec_move(DriveOutputs::RIGHT, "right"),
            MotorCmd::Stop => {
                self.apply(DriveOutputs::STOP, "stop");
            }
            MotorCmd::ForwardFor { duration_s } => self.exec_forward_for(duration_s),
        }
    }

    fn exec_enable(&mut self) {
        if let Err(e) = self.io.write(self.params.enable_pin, Level::High) {
            self.status.set_error(
                Component::Motors,
                &format!("enable failed: {}", e),
                &["driver fault", "wiring"],
            );
            return;
        }

        thread::sleep(secs(self.params.enable_settle_s));
        self.shared.enabled.store(true, Ordering::Relaxed);

        if self.params.use_encoders
            && self
                .shared
                .encoders
                .stalled(secs(self.params.self_test_window_s), self.params.stall_min_ticks)
        {
            self.release_enable();
            self.status.set_error(
                Component::Motors,
                "enable failed: no encoder response",
                &SELF_TEST_CAUSES,
            );
            return;
        }

        self.status.resolve(Component::Motors);
        if self.params.use_encoders {
            self.status.update_component(Component::Encoders, Health::Ok);
        }
        self.status.update_operation("motors enabled");
    }

    fn exec_disable(&mut self) {
        self.apply(DriveOutputs::STOP, "stop");

        if self.release_enable() {
            self.status.update_operation("motors disabled");
        } else {
            self.status.set_error(
                Component::Motors,
                "disable failed: enable line stuck",
                &["driver fault", "wiring"],
            );
        }
    }

    /// Deassert the enable line, clearing the enabled flag only if the write succeeded.
    fn release_enable(&mut self) -> bool {
        match self.io.write(self.params.enable_pin, Level::Low) {
            Ok(()) => {
                self.shared.enabled.store(false, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!("Could not release the motor enable line: {}", e);
                false
            }
        }
    }

    fn exec_forward_for(&mut self, duration_s: f64) {
        let stall_window = secs(self.params.stall_timeout_s);
        let duration = secs(duration_s);

        if !self.apply(DriveOutputs::FORWARD, "forward") {
            return;
        }

        // Only drives at least one stall window long are checked, shorter ones may legitimately
        // see too few ticks
        if self.params.use_encoders && duration >= stall_window {
            let stalled = self
                .shared
                .encoders
                .stalled(stall_window, self.params.stall_min_ticks);

            if stalled {
                self.apply(DriveOutputs::STOP, "stop");
                self.status
                    .set_error(Component::Motors, "stall detected", &STALL_CAUSES);
                return;
            }

            thread::sleep(duration - stall_window);
        } else {
            thread::sleep(duration);
        }

        self.apply(DriveOutputs::STOP, "stop");
    }

    /// Drive in a direction then check the wheels are actually turning.
    fn exec_move(&mut self, outputs: DriveOutputs, name: &str) {
        if !self.apply(outputs, name) || !self.params.use_encoders {
            return;
        }

        let stalled = self.shared.encoders.stalled(
            secs(self.params.stall_timeout_s),
            self.params.stall_min_ticks,
        );

        if stalled {
            self.apply(DriveOutputs::STOP, "stop");
            self.status
                .set_error(Component::Motors, "stall detected", &STALL_CAUSES);
        }
    }

    /// Write a set of direction outputs.
    ///
    /// An I/O failure is logged and the command treated as a no-op, returns false in that case.
    fn apply(&mut self, outputs: DriveOutputs, name: &str) -> bool {
        match self.write_outputs(outputs) {
            Ok(()) => {
                self.status.update_operation(format!("motors {}", name));
                true
            }
            Err(e) => {
                warn!("Motor {} not applied: {}", name, e);
                false
            }
        }
    }

    fn write_outputs(&self, outputs: DriveOutputs) -> Result<(), IoError> {
        self.io.write(self.params.left_fwd_pin, outputs.left_fwd)?;
        self.io.write(self.params.left_bwd_pin, outputs.left_bwd)?;
        self.io.write(self.params.right_fwd_pin, outputs.right_fwd)?;
        self.io.write(self.params.right_bwd_pin, outputs.right_bwd)
    }
}

impl DriveOutputs {
    const FORWARD: Self = Self::new(Level::High, Level::Low, Level::High, Level::Low);
    const BACKWARD: Self = Self::new(Level::Low, Level::High, Level::Low, Level::High);
    const LEFT: Self = Self::new(Level::Low, Level::High, Level::High, Level::Low);
    const RIGHT: Self = Self::new(Level::High, Level::Low, Level::Low, Level::High);
    const STOP: Self = Self::new(Level::Low, Level::Low, Level::Low, Level::Low);

    const fn new(left_fwd: Level, left_bwd: Level, right_fwd: Level, right_bwd: Level) -> Self {
        Self {
            left_fwd,
            left_bwd,
            right_fwd,
            right_bwd,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
