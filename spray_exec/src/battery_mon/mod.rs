//! # Battery monitor
//!
//! Polls the battery voltage on a background thread, records each reading in the status register
//! and raises battery errors when the voltage drops below the configured thresholds. Critical
//! readings are also posted to an optional webhook.
//!
//! Voltage is read through an injectable [`VoltageReader`]. Without one the monitor reports a
//! held simulated voltage, which can be changed with [`BatteryMon::set_simulated_voltage`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
pub mod webhook;

pub use params::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

use crate::{
    status_reg::StatusRegister,
    worker::{self, StopFlag},
};
use robot_if::status::Component;
use util::time::secs;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Probable causes attached to battery errors.
pub const BATTERY_CAUSES: [&str; 2] = ["battery discharged", "voltage sense wiring"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Function reading the battery voltage from the hardware, in volts.
pub type VoltageReader = Box<dyn Fn() -> Result<f64, BatteryMonError> + Send + Sync>;

/// Battery monitor handle.
///
/// The polling thread is stopped when the handle is shut down or dropped.
pub struct BatteryMon {
    source: Arc<VoltageSource>,

    stop: StopFlag,

    jh: Mutex<Option<JoinHandle<()>>>,
}

/// Where readings come from, shared between the handle and the polling thread.
struct VoltageSource {
    reader: Option<VoltageReader>,

    /// Last good reading, or the simulated voltage if there is no reader.
    ///
    /// Units: volts
    held_v: Mutex<f64>,
}

#[derive(Serialize)]
struct CriticalAlert {
    voltage: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Classification of a battery reading, most severe first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatteryLevel {
    ReadFailed,
    Critical(f64),
    Low(f64),
    Ok(f64),
}

#[derive(Debug, thiserror::Error)]
pub enum BatteryMonError {
    #[error("Voltage read failed: {0}")]
    ReadFailed(String),

    #[error("Reader returned a non-finite voltage")]
    NotFinite,

    #[error("Could not start the monitor thread: {0}")]
    SpawnFailed(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BatteryMon {
    /// Start polling the battery.
    ///
    /// The first reading is taken immediately, then every `poll_interval_s`. The stop flag is
    /// checked every `stop_poll` so shutdown is not held up by the poll interval.
    pub fn start(
        params: &Params,
        stop_poll_s: f64,
        status: Arc<StatusRegister>,
        reader: Option<VoltageReader>,
    ) -> Result<Self, BatteryMonError> {
        let source = Arc::new(VoltageSource {
            reader,
            held_v: Mutex::new(params.simulated_voltage_v),
        });
        let stop = StopFlag::new();

        let thread_source = source.clone();
        let thread_stop = stop.clone();
        let params = params.clone();

        let jh = thread::Builder::new()
            .name("battery_mon".into())
            .spawn(move || {
                info!("Battery monitor started");
                let interval = secs(params.poll_interval_s);
                let poll = secs(stop_poll_s);

                loop {
                    let voltage = thread_source.read();
                    report(&params, &status, voltage);

                    if !thread_stop.sleep(interval, poll) {
                        break;
                    }
                }
                info!("Battery monitor stopped");
            })
            .map_err(BatteryMonError::SpawnFailed)?;

        Ok(Self {
            source,
            stop,
            jh: Mutex::new(Some(jh)),
        })
    }

    /// Read the voltage now, outside the polling cycle.
    ///
    /// Returns `None` if the reader fails. The status register is not updated.
    pub fn read_now(&self) -> Option<f64> {
        self.source.read()
    }

    /// Change the voltage reported when running without a reader.
    pub fn set_simulated_voltage(&self, voltage: f64) {
        if self.source.reader.is_some() {
            warn!("Simulated voltage ignored, a voltage reader is fitted");
            return;
        }
        *self.source.held_v.lock() = voltage;
    }

    pub fn shutdown(&self) {
        self.stop.set();
    }

    /// Wait for the polling thread to exit, giving up at `deadline`.
    pub fn join_until(&self, deadline: Instant) -> bool {
        worker::join_until(&self.jh, deadline)
    }
}

impl Drop for BatteryMon {
    fn drop(&mut self) {
        self.stop.set();
    }
}

impl VoltageSource {
    fn read(&self) -> Option<f64> {
        let reader = match &self.reader {
            Some(r) => r,
            None => return Some(*self.held_v.lock()),
        };

        match reader().and_then(|v| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(BatteryMonError::NotFinite)
            }
        }) {
            Ok(v) => {
                *self.held_v.lock() = v;
                Some(v)
            }
            Err(e) => {
                warn!("Battery read failed: {}", e);
                None
            }
        }
    }
}

/// Classify a reading against the thresholds.
pub fn classify(params: &Params, voltage: Option<f64>) -> BatteryLevel {
    match voltage {
        None => BatteryLevel::ReadFailed,
        Some(v) if v < params.critical_voltage_v => BatteryLevel::Critical(v),
        Some(v) if v < params.low_voltage_v => BatteryLevel::Low(v),
        Some(v) => BatteryLevel::Ok(v),
    }
}

/// Record a reading in the status register, raising or clearing the battery error.
fn report(params: &Params, status: &StatusRegister, voltage: Option<f64>) {
    status.update_battery(voltage);

    match classify(params, voltage) {
        BatteryLevel::ReadFailed => {
            status.set_error(Component::Battery, "read failed", &["voltage sense wiring"])
        }
        BatteryLevel::Critical(v) => {
            status.set_error(
                Component::Battery,
                &format!("critical voltage {:.2}", v),
                &BATTERY_CAUSES,
            );
            if let Some(url) = &params.webhook_url {
                send_alert(url, v, params.webhook_timeout_s);
            }
        }
        BatteryLevel::Low(v) => status.set_error(
            Component::Battery,
            &format!("low voltage {:.2}", v),
            &BATTERY_CAUSES,
        ),
        BatteryLevel::Ok(v) => {
            debug!("Battery at {:.2} V", v);
            status.resolve(Component::Battery);
        }
    }
}

/// Post a critical alert, logging rather than propagating any failure.
fn send_alert(url: &str, voltage: f64, timeout_s: f64) {
    match webhook::post_json(url, &CriticalAlert { voltage }, secs(timeout_s)) {
        Ok(_) => info!("Critical battery alert sent to {}", url),
        Err(e) => warn!("Critical battery alert to {} failed: {}", url, e),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
