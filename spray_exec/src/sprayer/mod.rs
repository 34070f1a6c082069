//! # Sprayer
//!
//! Runs the pump for timed sprays. Requests are resolved to a duration and acknowledged
//! immediately, the spray itself runs on the sprayer worker. Every spray that switched the pump
//! on is recorded in the activity log, including sprays cut short by shutdown.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use std::{sync::Arc, time::Instant};

use crate::{
    activity_log::ActivityLog,
    status_reg::StatusRegister,
    worker::{StopFlag, Worker, WorkerError, WorkerParams},
};
use robot_if::{
    eqpt::{DigitalIo, IoError, Level, PinMode},
    status::Component,
    tc::sprayer::{SprayAck, SprayCmd, SprayRequest},
};
use util::{maths::clamp, time::secs};

pub use params::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Sprayer handle.
pub struct Sprayer {
    params: Params,

    status: Arc<StatusRegister>,

    worker: Worker<SprayCmd>,
}

/// State owned by the sprayer worker.
struct Pump {
    params: Params,

    io: Arc<dyn DigitalIo>,

    status: Arc<StatusRegister>,

    activity_log: Arc<ActivityLog>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SprayerError {
    #[error("Could not set up the pump output: {0}")]
    SetupError(IoError),

    #[error("invalid duration: {0} s")]
    InvalidDuration(f64),

    #[error(transparent)]
    WorkerError(#[from] WorkerError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Sprayer {
    pub fn new(
        params: &Params,
        worker_params: &WorkerParams,
        io: Arc<dyn DigitalIo>,
        status: Arc<StatusRegister>,
        activity_log: Arc<ActivityLog>,
    ) -> Result<Self, SprayerError> {
        io.setup(params.pump_pin, PinMode::Output)
            .map_err(SprayerError::SetupError)?;
        if let Err(e) = io.write(params.pump_pin, Level::Low) {
            warn!("Could not switch the pump off: {}", e);
        }

        let mut pump = Pump {
            params: params.clone(),
            io,
            status: status.clone(),
            activity_log,
        };
        let worker = Worker::spawn("sprayer", worker_params, move |cmd: SprayCmd, stop| {
            pump.exec(cmd, stop)
        })?;

        Ok(Self {
            params: params.clone(),
            status,
            worker,
        })
    }

    /// Resolve and queue a spray, returning immediately.
    ///
    /// The acknowledgement carries the resolved duration, before any clipping to the maximum
    /// duration.
    pub fn spray(&self, request: SprayRequest) -> SprayAck {
        let duration_s = match resolve_duration(&self.params, &request) {
            Ok(d) => d,
            Err(e) => return self.reject(e, &["bad command"]),
        };

        let cmd = SprayCmd {
            duration_s,
            x: request.x,
            y: request.y,
            request_id: request.request_id,
        };

        match self.worker.send(cmd) {
            Ok(()) => {
                info!("Spray of {:.2} s queued", duration_s);
                SprayAck::queued(duration_s)
            }
            Err(e) => {
                let cause = match e {
                    WorkerError::QueueFull(_) => "spray queue full",
                    _ => "sprayer stopped",
                };
                self.reject(e.into(), &[cause])
            }
        }
    }

    fn reject(&self, err: SprayerError, causes: &[&str]) -> SprayAck {
        warn!("Spray request rejected: {}", err);
        self.status
            .set_error(Component::Sprayer, &format!("spray failed: {}", err), causes);
        SprayAck::error(err.to_string())
    }

    /// Discard queued sprays which have not started yet.
    pub fn drain(&self) -> usize {
        self.worker.drain()
    }

    /// Signal the worker to exit. A running spray is cut short at its next stop check.
    pub fn shutdown(&self) {
        self.worker.stop();
    }

    pub fn join_until(&self, deadline: Instant) -> bool {
        self.worker.join_until(deadline)
    }
}

impl Pump {
    fn exec(&mut self, cmd: SprayCmd, stop: &StopFlag) {
        debug!("Sprayer executing {:?}", cmd);

        let (duration_s, clipped) = clamp(cmd.duration_s, 0.0, self.params.max_duration_s);
        if clipped {
            warn!(
                "Spray of {:.2} s clipped to {:.2} s",
                cmd.duration_s, duration_s
            );
            self.status.set_error(
                Component::Sprayer,
                "excessive duration clipped",
                &["bad command"],
            );
        }

        if let Err(e) = self.io.write(self.params.pump_pin, Level::High) {
            self.status.set_error(
                Component::Sprayer,
                &format!("pump failed: {}", e),
                &["pump wiring", "pump power"],
            );
            return;
        }
        self.status
            .update_operation(format!("spraying for {:.2} s", duration_s));

        let start = Instant::now();
        let completed = stop.sleep(secs(duration_s), secs(self.params.stop_poll_s));
        let sprayed_s = if completed {
            duration_s
        } else {
            start.elapsed().as_secs_f64().min(duration_s)
        };

        if let Err(e) = self.io.write(self.params.pump_pin, Level::Low) {
            self.status.set_error(
                Component::Sprayer,
                &format!("pump stuck on: {}", e),
                &["relay fault", "pump wiring"],
            );
        }

        let ml_used = sprayed_s * self.params.flow_rate_ml_per_s;
        match &cmd.request_id {
            Some(id) => info!("Spray {} done: {:.2} s, {:.1} ml", id, sprayed_s, ml_used),
            None => info!("Spray done: {:.2} s, {:.1} ml", sprayed_s, ml_used),
        }
        if !completed {
            warn!("Spray interrupted after {:.2} s of {:.2} s", sprayed_s, duration_s);
        }

        self.activity_log.record(
            ml_used,
            self.params.default_area_m2,
            cmd.x,
            cmd.y,
            Some(sprayed_s),
        );
        self.status
            .update_operation(format!("sprayed {:.1} ml", ml_used));

        if !clipped {
            self.status.resolve(Component::Sprayer);
        }
    }
}

/// Work out how long a request should run the pump for.
///
/// An explicit duration wins over a volume, a volume is converted with the pump flow rate, and
/// a request with neither gets the default duration.
pub fn resolve_duration(params: &Params, request: &SprayRequest) -> Result<f64, SprayerError> {
    let duration_s = match (request.duration_s, request.volume_ml) {
        (Some(d), _) => d,
        (None, Some(v)) => v / params.flow_rate_ml_per_s,
        (None, None) => params.default_duration_s,
    };

    if !duration_s.is_finite() || duration_s <= 0.0 {
        return Err(SprayerError::InvalidDuration(duration_s));
    }

    Ok(duration_s)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{wait_until, TestRig};
    use robot_if::{status::Health, tc::sprayer::SprayStatus};
    use std::time::Duration;

    fn make_sprayer(rig: &TestRig, params: &Params) -> (Sprayer, Arc<ActivityLog>) {
        let log = Arc::new(
            ActivityLog::new(&rig.params.activity_log, &rig.params.workers).unwrap(),
        );
        let sprayer = Sprayer::new(
            params,
            &rig.params.workers,
            rig.io.clone(),
            rig.status.clone(),
            log.clone(),
        )
        .unwrap();
        (sprayer, log)
    }

    fn request(duration_s: Option<f64>, volume_ml: Option<f64>) -> SprayRequest {
        SprayRequest {
            duration_s,
            volume_ml,
            ..SprayRequest::default()
        }
    }

    #[test]
    fn test_resolve_duration() {
        let params = Params::default();

        assert_eq!(resolve_duration(&params, &request(None, Some(50.0))).unwrap(), 5.0);
        assert_eq!(resolve_duration(&params, &request(None, None)).unwrap(), 1.0);
        assert_eq!(
            resolve_duration(&params, &request(Some(2.0), Some(50.0))).unwrap(),
            2.0
        );
        // Clipping happens on the worker, not here
        assert_eq!(resolve_duration(&params, &request(Some(100.0), None)).unwrap(), 100.0);

        assert!(matches!(
            resolve_duration(&params, &request(Some(0.0), None)),
            Err(SprayerError::InvalidDuration(_))
        ));
        assert!(matches!(
            resolve_duration(&params, &request(None, Some(-5.0))),
            Err(SprayerError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_spray_runs_and_is_logged() {
        let rig = TestRig::new();
        let (sprayer, log) = make_sprayer(&rig, &rig.params.sprayer);
        let pump_pin = rig.params.sprayer.pump_pin;

        let ack = sprayer.spray(SprayRequest {
            volume_ml: Some(0.5),
            x: Some(1.5),
            y: Some(-2.0),
            request_id: Some("det-17".into()),
            ..SprayRequest::default()
        });
        assert_eq!(ack.status, SprayStatus::Queued);
        assert_eq!(ack.duration_s, Some(0.05));

        assert!(wait_until(Duration::from_secs(1), || rig.sim.level(pump_pin)
            == Level::High));
        assert!(wait_until(Duration::from_secs(1), || rig.sim.level(pump_pin)
            == Level::Low));
        assert!(wait_until(Duration::from_secs(1), || {
            rig.status.get_snapshot().last_operation.as_deref() == Some("sprayed 0.5 ml")
        }));

        assert!(log.flush(Duration::from_secs(2)));
        let report = log.daily_report(None).unwrap();
        assert_eq!(report.entries.len(), 1);

        let entry = &report.entries[0];
        assert!((entry.ml_used - 0.5).abs() < 1e-9);
        assert_eq!(entry.area_m2, 0.5);
        assert_eq!((entry.x, entry.y), (Some(1.5), Some(-2.0)));
        assert_eq!(
            rig.status.get_snapshot().health(Component::Sprayer),
            Health::Ok
        );
    }

    #[test]
    fn test_invalid_request_rejected() {
        let rig = TestRig::new();
        let (sprayer, _log) = make_sprayer(&rig, &rig.params.sprayer);

        let ack = sprayer.spray(request(Some(-1.0), None));
        assert_eq!(ack.status, SprayStatus::Error);
        assert_eq!(ack.duration_s, None);
        assert!(ack.message.unwrap().contains("invalid duration"));

        let snap = rig.status.get_snapshot();
        assert_eq!(snap.health(Component::Sprayer), Health::Error);
        let err = snap.last_error.unwrap();
        assert_eq!(err.component, Component::Sprayer);
        assert_eq!(err.message, "spray failed: invalid duration: -1 s");
        assert_eq!(err.causes, vec!["bad command"]);
    }

    #[test]
    fn test_stopped_sprayer_rejects_request() {
        let rig = TestRig::new();
        let (sprayer, _log) = make_sprayer(&rig, &rig.params.sprayer);

        sprayer.shutdown();
        let ack = sprayer.spray(request(Some(0.1), None));
        assert_eq!(ack.status, SprayStatus::Error);

        let err = rig.status.get_snapshot().last_error.unwrap();
        assert_eq!(err.component, Component::Sprayer);
        assert!(err.message.starts_with("spray failed: "));
        assert_eq!(err.causes, vec!["sprayer stopped"]);
    }

    #[test]
    fn test_pump_pin_set_up_low() {
        let rig = TestRig::new();
        let (_sprayer, _log) = make_sprayer(&rig, &rig.params.sprayer);
        let pump_pin = rig.params.sprayer.pump_pin;

        assert_eq!(rig.sim.mode(pump_pin), Some(PinMode::Output));
        assert_eq!(rig.sim.level(pump_pin), Level::Low);
    }

    #[test]
    fn test_excessive_duration_clipped() {
        let rig = TestRig::new();
        let params = Params {
            max_duration_s: 0.05,
            ..rig.params.sprayer.clone()
        };
        let (sprayer, log) = make_sprayer(&rig, &params);

        let ack = sprayer.spray(request(Some(0.2), None));
        assert_eq!(ack.status, SprayStatus::Queued);
        assert_eq!(ack.duration_s, Some(0.2));

        assert!(wait_until(Duration::from_secs(1), || {
            log.flush(Duration::from_millis(100))
                && log.daily_report(None).unwrap().entries.len() == 1
        }));

        let entry = &log.daily_report(None).unwrap().entries[0];
        assert_eq!(entry.duration_s, Some(0.05));

        // Clipping is reported but the spray still happens
        let err = rig.status.get_snapshot().last_error.unwrap();
        assert_eq!(err.component, Component::Sprayer);
        assert_eq!(err.message, "excessive duration clipped");
        assert_eq!(err.causes, vec!["bad command"]);
    }

    #[test]
    fn test_drain_discards_waiting_sprays() {
        let rig = TestRig::new();
        let (sprayer, log) = make_sprayer(&rig, &rig.params.sprayer);
        let pump_pin = rig.params.sprayer.pump_pin;

        sprayer.spray(request(Some(0.3), None));
        assert!(wait_until(Duration::from_secs(1), || rig.sim.level(pump_pin)
            == Level::High));

        for _ in 0..3 {
            sprayer.spray(request(Some(0.3), None));
        }
        assert_eq!(sprayer.drain(), 3);

        // The running spray completes normally
        assert!(wait_until(Duration::from_secs(2), || {
            log.flush(Duration::from_millis(100))
                && log.daily_report(None).unwrap().entries.len() == 1
        }));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(rig.sim.level(pump_pin), Level::Low);
        assert_eq!(log.daily_report(None).unwrap().entries.len(), 1);
    }

    #[test]
    fn test_shutdown_interrupts_spray() {
        let rig = TestRig::new();
        let (sprayer, log) = make_sprayer(&rig, &rig.params.sprayer);
        let pump_pin = rig.params.sprayer.pump_pin;

        sprayer.spray(request(Some(5.0), None));
        assert!(wait_until(Duration::from_secs(1), || rig.sim.level(pump_pin)
            == Level::High));

        sprayer.shutdown();
        assert!(sprayer.join_until(Instant::now() + Duration::from_secs(1)));
        assert_eq!(rig.sim.level(pump_pin), Level::Low);

        // The partial spray is logged with the time the pump actually ran
        assert!(log.flush(Duration::from_secs(2)));
        let entry = &log.daily_report(None).unwrap().entries[0];
        let duration_s = entry.duration_s.unwrap();
        assert!(duration_s < 5.0);
        assert!((entry.ml_used - duration_s * 10.0).abs() < 1e-9);
    }
}
