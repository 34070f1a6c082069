//! # Simulated GPIO backend
//!
//! Keeps every pin in memory so the controllers can run on a desktop machine. Besides accepting
//! any call as a no-op, the simulation can:
//!
//! - Script the levels an input pin will return (`set_input`, `set_input_sequence`)
//! - Inject a hardware fault on a pin so that every call touching it fails (`inject_fault`)
//! - Fire rising edge callbacks on demand (`pulse_rising`)
//! - Emulate a pair of quadrature wheel encoders which tick while the motor driver is enabled
//!   (`attach_encoders`)

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use super::gpio::{DigitalIo, EdgeCallback, IoError, Level, Pin, PinMode, PwmHandle};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// In-memory GPIO backend.
#[derive(Default)]
pub struct SimGpio {
    state: Mutex<SimState>,

    callbacks: Mutex<HashMap<Pin, Vec<Arc<EdgeCallback>>>>,
}

#[derive(Default)]
struct SimState {
    modes: HashMap<Pin, PinMode>,
    levels: HashMap<Pin, Level>,
    input_seqs: HashMap<Pin, VecDeque<Level>>,
    pwm: HashMap<Pin, PwmState>,
    duty_history: HashMap<Pin, Vec<f64>>,
    faults: HashSet<Pin>,
}

#[derive(Debug, Clone, Copy)]
struct PwmState {
    freq_hz: f64,
    duty_pct: f64,
}

/// Wiring of one simulated wheel encoder.
#[derive(Debug, Clone, Copy)]
pub struct WheelSim {
    /// Encoder channel A, ticks are rising edges on this pin
    pub enc_a: Pin,

    /// Encoder channel B, read by the edge handler to find the direction
    pub enc_b: Pin,

    /// Motor driver backwards output for this side. While it is high channel B reads low.
    pub bwd_pin: Pin,
}

/// Configuration for [`SimGpio::attach_encoders`].
#[derive(Debug, Clone)]
pub struct EncoderSimConfig {
    /// Motor driver enable output, the wheels only turn while it is high
    pub enable_pin: Pin,

    pub wheels: Vec<WheelSim>,

    /// Time between ticks on each wheel
    pub tick_period: Duration,
}

/// Handle to a running encoder simulation, stops the simulation thread when dropped.
pub struct EncoderSim {
    run: Arc<AtomicBool>,
    jammed: Arc<AtomicBool>,
    jh: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level an input pin will read from now on.
    ///
    /// Any scripted sequence for the pin is discarded.
    pub fn set_input(&self, pin: Pin, level: Level) {
        let mut state = self.state.lock();
        state.input_seqs.remove(&pin);
        state.levels.insert(pin, level);
    }

    /// Script the levels returned by successive reads of an input pin.
    ///
    /// Each read consumes one level, the final level is held once the sequence runs out.
    pub fn set_input_sequence(&self, pin: Pin, levels: Vec<Level>) {
        self.state.lock().input_seqs.insert(pin, levels.into());
    }

    /// Make every call touching `pin` fail with [`IoError::Fault`].
    pub fn inject_fault(&self, pin: Pin) {
        self.state.lock().faults.insert(pin);
    }

    pub fn clear_fault(&self, pin: Pin) {
        self.state.lock().faults.remove(&pin);
    }

    /// Current level of a pin, `Low` if it was never driven.
    pub fn level(&self, pin: Pin) -> Level {
        self.state
            .lock()
            .levels
            .get(&pin)
            .copied()
            .unwrap_or(Level::Low)
    }

    /// Mode a pin was set up with, if any.
    pub fn mode(&self, pin: Pin) -> Option<PinMode> {
        self.state.lock().modes.get(&pin).copied()
    }

    /// Current duty cycle of a PWM output, `None` if no PWM is running on the pin.
    pub fn duty(&self, pin: Pin) -> Option<f64> {
        self.state.lock().pwm.get(&pin).map(|p| p.duty_pct)
    }

    /// Frequency of a PWM output, `None` if no PWM is running on the pin.
    pub fn pwm_freq(&self, pin: Pin) -> Option<f64> {
        self.state.lock().pwm.get(&pin).map(|p| p.freq_hz)
    }

    /// Every duty cycle set on a pin since the PWM was started.
    pub fn duty_history(&self, pin: Pin) -> Vec<f64> {
        self.state
            .lock()
            .duty_history
            .get(&pin)
            .cloned()
            .unwrap_or_default()
    }

    /// Fire all rising edge callbacks registered on `pin`.
    pub fn pulse_rising(&self, pin: Pin) {
        // Clone the callbacks out so that they're free to call back into the backend
        let cbs: Vec<Arc<EdgeCallback>> = match self.callbacks.lock().get(&pin) {
            Some(cbs) => cbs.clone(),
            None => return,
        };

        for cb in cbs {
            cb();
        }
    }

    /// Start a background thread emulating wheel encoders.
    ///
    /// While `enable_pin` is high and the simulation is not jammed every wheel ticks once per
    /// `tick_period`. Channel B is driven before each tick so that the edge handler sees a
    /// forward tick unless the wheel's backwards output is high.
    pub fn attach_encoders(self: &Arc<Self>, config: EncoderSimConfig) -> EncoderSim {
        let run = Arc::new(AtomicBool::new(true));
        let jammed = Arc::new(AtomicBool::new(false));

        let io: Weak<SimGpio> = Arc::downgrade(self);
        let run_clone = run.clone();
        let jammed_clone = jammed.clone();

        let jh = thread::spawn(move || {
            while run_clone.load(Ordering::Relaxed) {
                thread::sleep(config.tick_period);

                let io = match io.upgrade() {
                    Some(io) => io,
                    None => break,
                };

                if jammed_clone.load(Ordering::Relaxed) || !io.level(config.enable_pin).is_high() {
                    continue;
                }

                for wheel in config.wheels.iter() {
                    let b = Level::from(!io.level(wheel.bwd_pin).is_high());
                    io.state.lock().levels.insert(wheel.enc_b, b);
                    io.pulse_rising(wheel.enc_a);
                }
            }
            trace!("Encoder simulation stopped");
        });

        EncoderSim {
            run,
            jammed,
            jh: Some(jh),
        }
    }

    fn check_fault(state: &SimState, pin: Pin) -> Result<(), IoError> {
        if state.faults.contains(&pin) {
            Err(IoError::Fault(pin))
        } else {
            Ok(())
        }
    }
}

impl DigitalIo for SimGpio {
    fn setup(&self, pin: Pin, mode: PinMode) -> Result<(), IoError> {
        let mut state = self.state.lock();
        Self::check_fault(&state, pin)?;

        state.modes.insert(pin, mode);
        if mode == PinMode::InputPullUp {
            state.levels.entry(pin).or_insert(Level::High);
        }
        Ok(())
    }

    fn read(&self, pin: Pin) -> Result<Level, IoError> {
        let mut state = self.state.lock();
        Self::check_fault(&state, pin)?;

        if let Some(seq) = state.input_seqs.get_mut(&pin) {
            let level = if seq.len() > 1 {
                seq.pop_front()
            } else {
                seq.front().copied()
            };
            if let Some(l) = level {
                return Ok(l);
            }
        }

        Ok(state.levels.get(&pin).copied().unwrap_or(Level::Low))
    }

    fn write(&self, pin: Pin, level: Level) -> Result<(), IoError> {
        let mut state = self.state.lock();
        Self::check_fault(&state, pin)?;

        state.levels.insert(pin, level);
        Ok(())
    }

    fn pwm_start(&self, pin: Pin, freq_hz: f64) -> Result<PwmHandle, IoError> {
        let mut state = self.state.lock();
        Self::check_fault(&state, pin)?;

        state.pwm.insert(
            pin,
            PwmState {
                freq_hz,
                duty_pct: 0.0,
            },
        );
        state.duty_history.insert(pin, Vec::new());
        debug!("Simulated PWM started on pin {} at {} Hz", pin, freq_hz);
        Ok(PwmHandle { pin })
    }

    fn pwm_set_duty(&self, handle: PwmHandle, percent: f64) -> Result<(), IoError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(IoError::InvalidDutyCycle(percent));
        }

        let mut state = self.state.lock();
        Self::check_fault(&state, handle.pin)?;

        match state.pwm.get_mut(&handle.pin) {
            Some(pwm) => pwm.duty_pct = percent,
            None => return Err(IoError::NoPwm(handle.pin)),
        }
        state
            .duty_history
            .entry(handle.pin)
            .or_default()
            .push(percent);
        Ok(())
    }

    fn pwm_stop(&self, handle: PwmHandle) -> Result<(), IoError> {
        let mut state = self.state.lock();
        Self::check_fault(&state, handle.pin)?;

        state.pwm.remove(&handle.pin);
        state.levels.insert(handle.pin, Level::Low);
        Ok(())
    }

    fn register_rising_edge(&self, pin: Pin, callback: EdgeCallback) -> Result<(), IoError> {
        Self::check_fault(&self.state.lock(), pin)?;

        self.callbacks
            .lock()
            .entry(pin)
            .or_default()
            .push(Arc::new(callback));
        Ok(())
    }
}

impl EncoderSim {
    /// Jam (or free) the simulated wheels. Jammed wheels produce no ticks.
    pub fn set_jammed(&self, jammed: bool) {
        self.jammed.store(jammed, Ordering::Relaxed);
    }
}

impl Drop for EncoderSim {
    fn drop(&mut self) {
        self.run.store(false, Ordering::Relaxed);
        if let Some(jh) = self.jh.take() {
            jh.join().ok();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_input_sequence_holds_last_level() {
        let io = SimGpio::new();
        io.set_input_sequence(8, vec![Level::Low, Level::High]);

        assert_eq!(io.read(8).unwrap(), Level::Low);
        assert_eq!(io.read(8).unwrap(), Level::High);
        assert_eq!(io.read(8).unwrap(), Level::High);
    }

    #[test]
    fn test_fault_injection() {
        let io = SimGpio::new();
        io.write(24, Level::High).unwrap();

        io.inject_fault(24);
        assert!(matches!(io.write(24, Level::Low), Err(IoError::Fault(24))));
        assert_eq!(io.level(24), Level::High);

        io.clear_fault(24);
        io.write(24, Level::Low).unwrap();
        assert_eq!(io.level(24), Level::Low);
    }

    #[test]
    fn test_pwm_duty() {
        let io = SimGpio::new();
        let h = io.pwm_start(18, 50.0).unwrap();

        io.pwm_set_duty(h, 7.0).unwrap();
        io.pwm_set_duty(h, 0.0).unwrap();
        assert!(io.pwm_set_duty(h, 120.0).is_err());

        assert_eq!(io.duty_history(18), vec![7.0, 0.0]);
        io.pwm_stop(h).unwrap();
        assert_eq!(io.duty(18), None);
    }

    #[test]
    fn test_encoder_sim_ticks_only_when_enabled() {
        let io = Arc::new(SimGpio::new());
        let count = Arc::new(AtomicI64::new(0));

        let weak = Arc::downgrade(&io);
        let count_clone = count.clone();
        io.register_rising_edge(
            5,
            Box::new(move || {
                let fwd = weak
                    .upgrade()
                    .map(|io| io.level(6).is_high())
                    .unwrap_or(false);
                count_clone.fetch_add(if fwd { 1 } else { -1 }, Ordering::Relaxed);
            }),
        )
        .unwrap();

        let sim = io.attach_encoders(EncoderSimConfig {
            enable_pin: 24,
            wheels: vec![WheelSim {
                enc_a: 5,
                enc_b: 6,
                bwd_pin: 27,
            }],
            tick_period: Duration::from_millis(2),
        });

        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::Relaxed), 0);

        io.write(24, Level::High).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(count.load(Ordering::Relaxed) > 0);

        // Reverse the wheel, count should fall
        io.write(27, Level::High).unwrap();
        let before = count.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(50));
        assert!(count.load(Ordering::Relaxed) < before);

        drop(sim);
    }
}
