//! # Distance sensor
//!
//! Ultrasonic ranging on demand. A measurement runs on the calling thread: the trigger pin is
//! pulsed, then the echo pin is busy-polled to time the echo pulse. The caller is blocked for at
//! most twice the echo timeout.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crate::status_reg::StatusRegister;
use robot_if::{
    eqpt::{DigitalIo, IoError, Level, Pin, PinMode},
    status::Component,
};
use util::time::secs;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the distance sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub trig_pin: Pin,
    pub echo_pin: Pin,

    /// Length of the trigger pulse.
    ///
    /// Units: seconds
    pub trigger_pulse_s: f64,

    /// Longest wait for the echo to start, and for it to end.
    ///
    /// Units: seconds
    pub echo_timeout_s: f64,

    /// Units: centimeters/second
    pub speed_of_sound_cm_per_s: f64,

    /// Time the sensor is given to settle after its pins are set up.
    ///
    /// Units: seconds
    pub init_settle_s: f64,
}

pub struct DistSensor {
    params: Params,

    io: Arc<dyn DigitalIo>,

    status: Arc<StatusRegister>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DistSensorError {
    #[error("No echo received")]
    NoEcho,

    #[error("Echo did not end within the timeout")]
    EchoTooLong,

    #[error("Sensor I/O failed: {0}")]
    IoError(#[from] IoError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            trig_pin: 25,
            echo_pin: 8,
            trigger_pulse_s: 0.00001,
            echo_timeout_s: 0.02,
            speed_of_sound_cm_per_s: 34300.0,
            init_settle_s: 0.1,
        }
    }
}

impl DistSensor {
    /// Set up the sensor pins.
    ///
    /// Setup failures are logged, measurements will then report the sensor as faulty.
    pub fn new(params: &Params, io: Arc<dyn DigitalIo>, status: Arc<StatusRegister>) -> Self {
        if let Err(e) = io
            .setup(params.trig_pin, PinMode::Output)
            .and_then(|_| io.setup(params.echo_pin, PinMode::Input))
            .and_then(|_| io.write(params.trig_pin, Level::Low))
        {
            warn!("Ultrasonic sensor setup failed: {}", e);
        }
        thread::sleep(secs(params.init_settle_s));

        Self {
            params: params.clone(),
            io,
            status,
        }
    }

    /// Measure the distance to the nearest obstacle.
    ///
    /// Returns `None` and raises an ultrasonic error if no valid echo was timed.
    pub fn get_distance_cm(&self) -> Option<f64> {
        match self.measure() {
            Ok(dist_cm) => {
                self.status.resolve(Component::Ultrasonic);
                Some(dist_cm)
            }
            Err(DistSensorError::NoEcho) => {
                self.status.set_error(
                    Component::Ultrasonic,
                    "ultrasonic no-echo",
                    &["wiring", "power"],
                );
                None
            }
            Err(DistSensorError::EchoTooLong) => {
                self.status.set_error(
                    Component::Ultrasonic,
                    "ultrasonic echo timeout",
                    &["wiring", "obstruction"],
                );
                None
            }
            Err(e) => {
                self.status.set_error(
                    Component::Ultrasonic,
                    &format!("ultrasonic exception: {}", e),
                    &["wiring"],
                );
                None
            }
        }
    }

    fn measure(&self) -> Result<f64, DistSensorError> {
        let timeout = secs(self.params.echo_timeout_s);

        self.io.write(self.params.trig_pin, Level::High)?;
        thread::sleep(secs(self.params.trigger_pulse_s));
        self.io.write(self.params.trig_pin, Level::Low)?;

        let wait_start = Instant::now();
        while !self.io.read(self.params.echo_pin)?.is_high() {
            if wait_start.elapsed() > timeout {
                return Err(DistSensorError::NoEcho);
            }
        }

        let pulse_start = Instant::now();
        while self.io.read(self.params.echo_pin)?.is_high() {
            if pulse_start.elapsed() > timeout {
                return Err(DistSensorError::EchoTooLong);
            }
        }

        let echo = pulse_start.elapsed();
        let dist_cm = echo_to_cm(echo, self.params.speed_of_sound_cm_per_s);
        trace!("Echo of {:?}, {:.1} cm", echo, dist_cm);

        Ok(dist_cm)
    }
}

/// Convert the width of an echo pulse to a distance, halving for the round trip.
pub fn echo_to_cm(echo: Duration, speed_of_sound_cm_per_s: f64) -> f64 {
    echo.as_secs_f64() * speed_of_sound_cm_per_s / 2.0
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::TestRig;
    use robot_if::status::Health;

    #[test]
    fn test_echo_to_cm() {
        assert!((echo_to_cm(Duration::from_millis(10), 34300.0) - 171.5).abs() < 1e-9);
        assert_eq!(echo_to_cm(Duration::ZERO, 34300.0), 0.0);
    }

    #[test]
    fn test_no_echo() {
        let rig = TestRig::new();
        let sensor = DistSensor::new(&rig.params.dist_sensor, rig.io.clone(), rig.status.clone());

        let start = Instant::now();
        assert_eq!(sensor.get_distance_cm(), None);
        assert!(start.elapsed() < Duration::from_millis(500));

        let snap = rig.status.get_snapshot();
        assert_eq!(snap.health(Component::Ultrasonic), Health::Error);
        let err = snap.last_error.unwrap();
        assert_eq!(err.message, "ultrasonic no-echo");
        assert!(err.causes.contains(&"wiring".to_string()));
    }

    #[test]
    fn test_echo_measured() {
        let rig = TestRig::new();
        let p = &rig.params.dist_sensor;
        let sensor = DistSensor::new(p, rig.io.clone(), rig.status.clone());

        let mut levels = vec![Level::Low; 3];
        levels.extend(vec![Level::High; 200]);
        levels.push(Level::Low);
        rig.sim.set_input_sequence(p.echo_pin, levels);

        let dist_cm = sensor.get_distance_cm().unwrap();
        let max_cm = echo_to_cm(secs(p.echo_timeout_s), p.speed_of_sound_cm_per_s);
        assert!(dist_cm >= 0.0 && dist_cm <= max_cm);

        assert_eq!(
            rig.status.get_snapshot().health(Component::Ultrasonic),
            Health::Ok
        );
        // Trigger is left low
        assert_eq!(rig.sim.level(p.trig_pin), Level::Low);
    }

    #[test]
    fn test_echo_stuck_high() {
        let rig = TestRig::new();
        let p = &rig.params.dist_sensor;
        let sensor = DistSensor::new(p, rig.io.clone(), rig.status.clone());

        rig.sim.set_input(p.echo_pin, Level::High);
        assert_eq!(sensor.get_distance_cm(), None);
        assert_eq!(
            rig.status.get_snapshot().last_error.unwrap().message,
            "ultrasonic echo timeout"
        );
    }

    #[test]
    fn test_io_fault_reported() {
        let rig = TestRig::new();
        let p = &rig.params.dist_sensor;
        let sensor = DistSensor::new(p, rig.io.clone(), rig.status.clone());

        rig.sim.inject_fault(p.trig_pin);
        assert_eq!(sensor.get_distance_cm(), None);
        assert!(rig
            .status
            .get_snapshot()
            .last_error
            .unwrap()
            .message
            .starts_with("ultrasonic exception"));
    }
}
