//! # Status register
//!
//! The single source of truth for the robot's power state and component health. All mutators
//! take one exclusive lock around the whole snapshot, so a snapshot handed out by
//! [`StatusRegister::get_snapshot`] is never torn. After every mutation the full snapshot is
//! written to the status document. Persistence is best effort, a failure is logged and never
//! reaches the caller.
//!
//! The register also drives the physical error indicator: the pin is raised whenever an error is
//! latched and lowered once it has been cleared.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use robot_if::{
    eqpt::{DigitalIo, Level, PinMode},
    status::{Component, Health, LastError, PowerState, StatusSnapshot},
};

pub use params::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Lock protected, persisted robot status.
pub struct StatusRegister {
    params: Params,

    snapshot: Mutex<StatusSnapshot>,

    io: Arc<dyn DigitalIo>,
}

/// Errors which can occur while persisting the status document.
#[derive(Debug, thiserror::Error)]
pub enum StatusRegError {
    #[error("Could not serialise the status snapshot: {0}")]
    SerialiseError(serde_json::Error),

    #[error("Could not write the status document {0}: {1}")]
    WriteError(PathBuf, std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StatusRegister {
    /// Create the register with every component `Unknown` and power `Off`.
    ///
    /// The encoders are reported `NotPresent` when `encoders_present` is false.
    pub fn new(params: &Params, io: Arc<dyn DigitalIo>, encoders_present: bool) -> Self {
        if let Err(e) = io.setup(params.error_pin, PinMode::Output) {
            warn!("Could not set up the error indicator: {}", e);
        }

        let reg = Self {
            params: params.clone(),
            snapshot: Mutex::new(StatusSnapshot::new(encoders_present)),
            io,
        };

        reg.set_indicator(Level::Low);
        reg.persist(&reg.snapshot.lock());

        reg
    }

    /// Mark a component as failed and latch the error.
    ///
    /// ## Arguments
    /// - `component` - The failed component
    /// - `message` - Short description of the failure
    /// - `causes` - Probable causes, may be empty
    pub fn set_error(&self, component: Component, message: &str, causes: &[&str]) {
        let mut snap = self.snapshot.lock();

        snap.components.insert(component, Health::Error);
        snap.last_error = Some(LastError {
            component,
            message: message.to_string(),
            causes: causes.iter().map(|c| c.to_string()).collect(),
            timestamp: Utc::now(),
        });

        error!("[{}] {} (causes: {:?})", component, message, causes);

        self.set_indicator(Level::High);
        self.persist(&snap);
    }

    /// Clear the latched error, marking `component` healthy if one is given.
    pub fn clear_error(&self, component: Option<Component>) {
        let mut snap = self.snapshot.lock();

        snap.last_error = None;
        if let Some(c) = component {
            snap.components.insert(c, Health::Ok);
            info!("[{}] error cleared", c);
        }

        self.set_indicator(Level::Low);
        self.persist(&snap);
    }

    /// Report a component healthy.
    ///
    /// The latched error is only cleared if it was raised by this component, an error raised by
    /// anything else stays latched.
    pub fn resolve(&self, component: Component) {
        let mut snap = self.snapshot.lock();

        let prev = snap.components.insert(component, Health::Ok);
        let owns_error = matches!(&snap.last_error, Some(e) if e.component == component);

        if owns_error {
            snap.last_error = None;
            info!("[{}] recovered", component);
        }

        if !owns_error && prev == Some(Health::Ok) {
            return;
        }

        if snap.last_error.is_none() {
            self.set_indicator(Level::Low);
        }
        self.persist(&snap);
    }

    /// Record the most recent hardware action.
    pub fn update_operation<S: Into<String>>(&self, operation: S) {
        let mut snap = self.snapshot.lock();
        let op = operation.into();
        debug!("Operation: {}", op);
        snap.last_operation = Some(op);
        self.persist(&snap);
    }

    /// Set the health of a component without touching the latched error.
    pub fn update_component(&self, component: Component, health: Health) {
        let mut snap = self.snapshot.lock();
        snap.components.insert(component, health);
        self.persist(&snap);
    }

    /// Record a battery reading.
    ///
    /// The battery is reported `Ok` when a reading is present and `Unknown` otherwise.
    pub fn update_battery(&self, voltage: Option<f64>) {
        let mut snap = self.snapshot.lock();

        snap.battery_voltage = voltage;
        let health = match voltage {
            Some(_) => Health::Ok,
            None => Health::Unknown,
        };
        snap.components.insert(Component::Battery, health);

        self.persist(&snap);
    }

    pub fn set_power(&self, state: PowerState) {
        let mut snap = self.snapshot.lock();
        snap.power = state;
        info!("Power {:?}", state);
        self.persist(&snap);
    }

    /// Get an owned copy of the current status.
    pub fn get_snapshot(&self) -> StatusSnapshot {
        self.snapshot.lock().clone()
    }

    /// Path of the persisted status document.
    pub fn status_path(&self) -> &Path {
        Path::new(&self.params.status_path)
    }

    fn set_indicator(&self, level: Level) {
        if let Err(e) = self.io.write(self.params.error_pin, level) {
            warn!("Could not drive the error indicator {:?}: {}", level, e);
        }
    }

    /// Persist the snapshot, logging any failure.
    ///
    /// Must be called with the snapshot lock held so that writes land in mutation order.
    fn persist(&self, snap: &StatusSnapshot) {
        if let Err(e) = self.write_document(snap) {
            warn!("Status not persisted: {}", e);
        }
    }

    fn write_document(&self, snap: &StatusSnapshot) -> Result<(), StatusRegError> {
        let path = self.status_path();
        let doc = serde_json::to_string_pretty(snap).map_err(StatusRegError::SerialiseError)?;

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .map_err(|e| StatusRegError::WriteError(dir.to_path_buf(), e))?;
            }
        }

        // Write next to the target then rename so readers never see a partial document
        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, doc).map_err(|e| StatusRegError::WriteError(tmp.clone(), e))?;
        fs::rename(&tmp, path).map_err(|e| StatusRegError::WriteError(path.to_path_buf(), e))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use robot_if::eqpt::sim::SimGpio;

    fn make_reg(dir: &Path) -> (Arc<SimGpio>, StatusRegister) {
        let io = Arc::new(SimGpio::new());
        let params = Params {
            status_path: dir.join("status.json").to_string_lossy().into_owned(),
            error_pin: 21,
        };
        let reg = StatusRegister::new(&params, io.clone(), true);
        (io, reg)
    }

    fn read_doc(reg: &StatusRegister) -> StatusSnapshot {
        let doc = fs::read_to_string(reg.status_path()).unwrap();
        serde_json::from_str(&doc).unwrap()
    }

    #[test]
    fn test_set_and_clear_error() {
        let dir = tempfile::tempdir().unwrap();
        let (io, reg) = make_reg(dir.path());

        reg.set_error(Component::Motors, "stall detected", &["mechanical jam"]);

        let snap = reg.get_snapshot();
        assert_eq!(snap.health(Component::Motors), Health::Error);
        let err = snap.last_error.clone().unwrap();
        assert_eq!(err.component, Component::Motors);
        assert_eq!(err.message, "stall detected");
        assert_eq!(err.causes, vec!["mechanical jam".to_string()]);
        assert_eq!(io.level(21), Level::High);

        // Persisted document matches the in-memory snapshot
        assert_eq!(read_doc(&reg), snap);

        reg.clear_error(Some(Component::Motors));
        let snap = reg.get_snapshot();
        assert!(snap.last_error.is_none());
        assert_eq!(snap.health(Component::Motors), Health::Ok);
        assert_eq!(io.level(21), Level::Low);
        assert_eq!(read_doc(&reg), snap);
    }

    #[test]
    fn test_set_error_always_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_io, reg) = make_reg(dir.path());

        reg.update_component(Component::Sprayer, Health::Ok);
        reg.set_error(Component::Sprayer, "excessive duration clipped", &["bad command"]);
        assert_eq!(reg.get_snapshot().health(Component::Sprayer), Health::Error);
    }

    #[test]
    fn test_resolve_keeps_foreign_error() {
        let dir = tempfile::tempdir().unwrap();
        let (io, reg) = make_reg(dir.path());

        reg.set_error(Component::Ultrasonic, "no echo", &["wiring", "power"]);
        reg.resolve(Component::Battery);

        let snap = reg.get_snapshot();
        assert_eq!(snap.health(Component::Battery), Health::Ok);
        assert_eq!(snap.last_error.unwrap().component, Component::Ultrasonic);
        assert_eq!(io.level(21), Level::High);

        reg.resolve(Component::Ultrasonic);
        assert!(reg.get_snapshot().last_error.is_none());
        assert_eq!(io.level(21), Level::Low);
    }

    #[test]
    fn test_battery_and_power() {
        let dir = tempfile::tempdir().unwrap();
        let (_io, reg) = make_reg(dir.path());

        reg.update_battery(Some(12.3));
        assert_eq!(reg.get_snapshot().health(Component::Battery), Health::Ok);
        assert_eq!(reg.get_snapshot().battery_voltage, Some(12.3));

        reg.update_battery(None);
        assert_eq!(reg.get_snapshot().health(Component::Battery), Health::Unknown);

        reg.set_power(PowerState::On);
        reg.update_operation("motors forward");
        let doc = read_doc(&reg);
        assert_eq!(doc.power, PowerState::On);
        assert_eq!(doc.last_operation.as_deref(), Some("motors forward"));
    }

    #[test]
    fn test_persistence_failure_is_silent() {
        let dir = tempfile::tempdir().unwrap();

        // A file where the parent directory should be makes every write fail
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let params = Params {
            status_path: blocker.join("status.json").to_string_lossy().into_owned(),
            error_pin: 21,
        };
        let reg = StatusRegister::new(&params, Arc::new(SimGpio::new()), false);

        reg.set_error(Component::Arm, "IK error", &[]);
        assert_eq!(reg.get_snapshot().health(Component::Arm), Health::Error);
        assert_eq!(
            reg.get_snapshot().health(Component::Encoders),
            Health::NotPresent
        );
    }
}
