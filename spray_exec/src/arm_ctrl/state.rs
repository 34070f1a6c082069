//! Implementations for the ArmCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crossbeam::channel::{self, Sender};
use log::{debug, info, warn};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use super::{
    calc_inverse_kinematics, ArmCtrlError, ArmPose, Joint, Params, SERVO_MAX_DEG, SERVO_MIN_DEG,
};
use crate::{
    status_reg::StatusRegister,
    worker::{Worker, WorkerParams},
};
use robot_if::{
    eqpt::{DigitalIo, IoError, PwmHandle},
    status::{Component, Health},
    tc::arm_ctrl::ArmCmd,
};
use util::{maths::lin_map, time::secs};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Arm control handle.
pub struct ArmCtrl {
    worker: Worker<ArmMsg>,
}

/// A queued arm command, optionally with a channel to report the outcome on.
struct ArmMsg {
    cmd: ArmCmd,

    reply: Option<Sender<Result<ArmPose, ArmCtrlError>>>,
}

/// State owned by the arm worker.
///
/// The PWM outputs are stopped when this is dropped, which happens as the worker exits.
struct Servos {
    params: Params,

    io: Arc<dyn DigitalIo>,

    status: Arc<StatusRegister>,

    shoulder: Option<PwmHandle>,

    elbow: Option<PwmHandle>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmCtrl {
    /// Start the servo PWM outputs and the arm worker.
    ///
    /// A servo whose PWM cannot be started is reported as failed, moves involving it will raise
    /// a servo error.
    pub fn new(
        params: &Params,
        worker_params: &WorkerParams,
        io: Arc<dyn DigitalIo>,
        status: Arc<StatusRegister>,
    ) -> Result<Self, ArmCtrlError> {
        let start_pwm = |joint: Joint, pin| match io.pwm_start(pin, params.pwm_freq_hz) {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("Could not start the {} servo PWM: {}", joint, e);
                status.update_component(Component::Servos, Health::Error);
                None
            }
        };

        let shoulder = start_pwm(Joint::Shoulder, params.shoulder_pin);
        let elbow = start_pwm(Joint::Elbow, params.elbow_pin);

        let mut servos = Servos {
            params: params.clone(),
            io,
            status,
            shoulder,
            elbow,
        };
        let worker = Worker::spawn("arm_ctrl", worker_params, move |msg: ArmMsg, _| {
            servos.exec(msg)
        })?;

        Ok(Self { worker })
    }

    /// Queue a move of the nozzle to `(x_mm, y_mm)`.
    ///
    /// Only a failure to queue is returned, an unreachable target or servo fault is reported to
    /// the status register by the worker.
    pub fn move_to(&self, x_mm: f64, y_mm: f64) -> Result<(), ArmCtrlError> {
        self.send(ArmCmd::MoveTo { x_mm, y_mm })
    }

    /// Queue any arm command.
    pub fn send(&self, cmd: ArmCmd) -> Result<(), ArmCtrlError> {
        self.worker
            .send(ArmMsg { cmd, reply: None })
            .map_err(ArmCtrlError::from)
    }

    /// Centre both joints, blocking until the move completes or `timeout` expires.
    pub fn center(&self, timeout: Duration) -> Result<ArmPose, ArmCtrlError> {
        let (tx, rx) = channel::bounded(1);
        self.worker.send(ArmMsg {
            cmd: ArmCmd::Center,
            reply: Some(tx),
        })?;

        match rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(_) => Err(ArmCtrlError::Timeout),
        }
    }

    pub fn shutdown(&self) {
        self.worker.stop();
    }

    pub fn join_until(&self, deadline: Instant) -> bool {
        self.worker.join_until(deadline)
    }
}

impl Servos {
    fn exec(&mut self, msg: ArmMsg) {
        debug!("ArmCtrl executing {:?}", msg.cmd);

        let res = match msg.cmd {
            ArmCmd::MoveTo { x_mm, y_mm } => calc_inverse_kinematics(&self.params, x_mm, y_mm)
                .and_then(|sol| self.apply(sol.pose)),
            ArmCmd::Center => self.apply(ArmPose::CENTER),
        };

        match &res {
            Ok(pose) => {
                self.status.resolve(Component::Arm);
                self.status.resolve(Component::Servos);
                self.status.update_operation(format!(
                    "arm shoulder {:.1} deg, elbow {:.1} deg",
                    pose.shoulder_deg, pose.elbow_deg
                ));
            }
            Err(e) if matches!(e, ArmCtrlError::ServoFault(..)) => self.status.set_error(
                Component::Servos,
                &format!("servo move failed: {}", e),
                &["servo wiring", "servo power"],
            ),
            Err(e) => self.status.set_error(
                Component::Arm,
                &format!("IK error: {}", e),
                &["target out of reach"],
            ),
        }

        if let Some(reply) = msg.reply {
            reply.send(res).ok();
        }
    }

    /// Drive the shoulder then the elbow to the pose.
    fn apply(&mut self, pose: ArmPose) -> Result<ArmPose, ArmCtrlError> {
        self.move_joint(Joint::Shoulder, pose.shoulder_deg)?;
        self.move_joint(Joint::Elbow, pose.elbow_deg)?;
        Ok(pose)
    }

    /// Command a servo angle, hold it for the settle time, then release the signal.
    fn move_joint(&mut self, joint: Joint, angle_deg: f64) -> Result<(), ArmCtrlError> {
        let (handle, pin) = match joint {
            Joint::Shoulder => (self.shoulder, self.params.shoulder_pin),
            Joint::Elbow => (self.elbow, self.params.elbow_pin),
        };
        let handle = handle.ok_or(ArmCtrlError::ServoFault(joint, IoError::NoPwm(pin)))?;

        let duty_pct = lin_map(
            (SERVO_MIN_DEG, SERVO_MAX_DEG),
            (self.params.duty_min_pct, self.params.duty_max_pct),
            angle_deg,
        );

        self.io
            .pwm_set_duty(handle, duty_pct)
            .map_err(|e| ArmCtrlError::ServoFault(joint, e))?;
        thread::sleep(secs(self.params.settle_s));

        // Holding the signal makes the servo jitter and heat up
        if let Err(e) = self.io.pwm_set_duty(handle, 0.0) {
            warn!("Could not release the {} servo: {}", joint, e);
        }

        debug!("{} servo at {:.1} deg ({:.2}% duty)", joint, angle_deg, duty_pct);
        Ok(())
    }
}

impl Drop for Servos {
    fn drop(&mut self) {
        for handle in [self.shoulder.take(), self.elbow.take()].into_iter().flatten() {
            if let Err(e) = self.io.pwm_stop(handle) {
                warn!("Could not stop servo PWM on pin {}: {}", handle.pin, e);
            }
        }
        info!("Servo PWM stopped");
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::TestRig;

    fn make_arm(rig: &TestRig) -> ArmCtrl {
        ArmCtrl::new(
            &rig.params.arm_ctrl,
            &rig.params.workers,
            rig.io.clone(),
            rig.status.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_center_duty_cycles() {
        let rig = TestRig::new();
        let arm = make_arm(&rig);

        let pose = arm.center(Duration::from_secs(2)).unwrap();
        assert_eq!(pose, ArmPose::CENTER);

        // 90 degrees maps to 7% duty, then the signal is released
        let p = &rig.params.arm_ctrl;
        assert_eq!(rig.sim.duty_history(p.shoulder_pin), vec![7.0, 0.0]);
        assert_eq!(rig.sim.duty_history(p.elbow_pin), vec![7.0, 0.0]);
        assert_eq!(rig.sim.pwm_freq(p.shoulder_pin), Some(50.0));

        let snap = rig.status.get_snapshot();
        assert_eq!(snap.health(Component::Arm), Health::Ok);
        assert!(snap.last_operation.unwrap().starts_with("arm shoulder 90.0"));
    }

    #[test]
    fn test_unreachable_target_reported_and_loop_continues() {
        let rig = TestRig::new();
        let arm = make_arm(&rig);

        arm.move_to(1000.0, 0.0).unwrap();
        arm.center(Duration::from_secs(2)).unwrap();

        let snap = rig.status.get_snapshot();
        // Centring afterwards recovers the arm
        assert_eq!(snap.health(Component::Arm), Health::Ok);
        assert!(snap.last_error.is_none());

        let (tx, rx) = channel::bounded(1);
        arm.worker
            .send(ArmMsg {
                cmd: ArmCmd::MoveTo {
                    x_mm: 1000.0,
                    y_mm: 0.0,
                },
                reply: Some(tx),
            })
            .unwrap();
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Err(ArmCtrlError::Unreachable(..))
        ));

        let snap = rig.status.get_snapshot();
        assert_eq!(snap.health(Component::Arm), Health::Error);
        let err = snap.last_error.unwrap();
        assert_eq!(err.component, Component::Arm);
        assert!(err.message.starts_with("IK error"));
    }

    #[test]
    fn test_servo_fault() {
        let rig = TestRig::new();
        let arm = make_arm(&rig);

        rig.sim.inject_fault(rig.params.arm_ctrl.shoulder_pin);
        assert!(matches!(
            arm.center(Duration::from_secs(2)),
            Err(ArmCtrlError::ServoFault(Joint::Shoulder, _))
        ));

        // The elbow is never driven once the shoulder has failed
        assert!(rig.sim.duty_history(rig.params.arm_ctrl.elbow_pin).is_empty());
        assert_eq!(
            rig.status.get_snapshot().health(Component::Servos),
            Health::Error
        );
    }

    #[test]
    fn test_pwm_stopped_at_shutdown() {
        let rig = TestRig::new();
        let arm = make_arm(&rig);

        arm.shutdown();
        assert!(arm.join_until(Instant::now() + Duration::from_secs(1)));
        assert_eq!(rig.sim.duty(rig.params.arm_ctrl.shoulder_pin), None);
        assert_eq!(rig.sim.duty(rig.params.arm_ctrl.elbow_pin), None);
    }
}
