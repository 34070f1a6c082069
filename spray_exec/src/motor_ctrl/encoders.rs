//! Wheel encoder counting

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{trace, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Weak},
    thread,
    time::Duration,
};

use super::Params;
use robot_if::eqpt::{DigitalIo, EdgeCallback, IoError, Pin, PinMode};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Signed tick counts of the two drive wheels.
///
/// Counts rise while a wheel turns forwards and fall while it turns backwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCounts {
    pub left: i64,
    pub right: i64,
}

/// Encoder counters shared between the edge handlers and the controller.
///
/// The lock is only ever held for a single read or update, never while calling into anything
/// else.
#[derive(Debug, Default)]
pub(crate) struct Encoders {
    counts: Mutex<EncoderCounts>,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl EncoderCounts {
    /// Absolute number of ticks each wheel moved between `self` and `later`.
    pub fn movement_to(&self, later: &EncoderCounts) -> (i64, i64) {
        (
            (later.left - self.left).abs(),
            (later.right - self.right).abs(),
        )
    }
}

impl Encoders {
    pub fn get(&self) -> EncoderCounts {
        *self.counts.lock()
    }

    pub fn reset(&self) {
        *self.counts.lock() = EncoderCounts::default();
    }

    fn tick(&self, side: Side, forwards: bool) {
        let step = if forwards { 1 } else { -1 };
        let mut counts = self.counts.lock();
        match side {
            Side::Left => counts.left += step,
            Side::Right => counts.right += step,
        }
    }

    /// Block for `window` and return the movement of each wheel over it.
    pub fn movement_over(&self, window: Duration) -> (i64, i64) {
        let start = self.get();
        thread::sleep(window);
        start.movement_to(&self.get())
    }

    /// True if neither wheel moved at least `min_ticks` over `window`.
    pub fn stalled(&self, window: Duration, min_ticks: i64) -> bool {
        let (left, right) = self.movement_over(window);
        trace!("Encoder movement over {:?}: L {}, R {}", window, left, right);
        left < min_ticks && right < min_ticks
    }

    /// Set up the encoder inputs and register the edge handlers.
    ///
    /// Ticks are counted on rising edges of channel A. The level of channel B at that moment
    /// gives the direction, high is forwards.
    pub fn attach(
        self: &Arc<Self>,
        io: &Arc<dyn DigitalIo>,
        params: &Params,
    ) -> Result<(), IoError> {
        let wheels = [
            (Side::Left, params.enc_left_a_pin, params.enc_left_b_pin),
            (Side::Right, params.enc_right_a_pin, params.enc_right_b_pin),
        ];

        for (_, a, b) in wheels.iter() {
            io.setup(*a, PinMode::InputPullUp)?;
            io.setup(*b, PinMode::InputPullUp)?;
        }

        for (side, a, b) in wheels {
            io.register_rising_edge(a, self.edge_handler(io, side, b))?;
        }

        Ok(())
    }

    fn edge_handler(
        self: &Arc<Self>,
        io: &Arc<dyn DigitalIo>,
        side: Side,
        b_pin: Pin,
    ) -> EdgeCallback {
        // Weak references so the backend's callback table doesn't keep either side alive
        let io: Weak<dyn DigitalIo> = Arc::downgrade(io);
        let encoders: Weak<Encoders> = Arc::downgrade(self);

        Box::new(move || {
            let (io, encoders) = match (io.upgrade(), encoders.upgrade()) {
                (Some(io), Some(enc)) => (io, enc),
                _ => return,
            };

            match io.read(b_pin) {
                Ok(level) => encoders.tick(side, level.is_high()),
                Err(e) => warn!("Could not read encoder channel B on pin {}: {}", b_pin, e),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use robot_if::eqpt::{sim::SimGpio, Level};

    #[test]
    fn test_direction_from_channel_b() {
        let sim = Arc::new(SimGpio::new());
        let io: Arc<dyn DigitalIo> = sim.clone();
        let params = Params::default();

        let enc = Arc::new(Encoders::default());
        enc.attach(&io, &params).unwrap();

        // Pull-ups leave channel B high, so these are forward ticks
        sim.pulse_rising(params.enc_left_a_pin);
        sim.pulse_rising(params.enc_left_a_pin);
        sim.pulse_rising(params.enc_right_a_pin);
        assert_eq!(enc.get(), EncoderCounts { left: 2, right: 1 });

        sim.set_input(params.enc_right_b_pin, Level::Low);
        sim.pulse_rising(params.enc_right_a_pin);
        sim.pulse_rising(params.enc_right_a_pin);
        assert_eq!(enc.get(), EncoderCounts { left: 2, right: -1 });

        enc.reset();
        assert_eq!(enc.get(), EncoderCounts::default());
    }

    #[test]
    fn test_movement_is_absolute() {
        let a = EncoderCounts { left: 10, right: 4 };
        let b = EncoderCounts { left: 7, right: 9 };
        assert_eq!(a.movement_to(&b), (3, 5));
    }

    #[test]
    fn test_fault_on_channel_b_skips_tick() {
        let sim = Arc::new(SimGpio::new());
        let io: Arc<dyn DigitalIo> = sim.clone();
        let params = Params::default();

        let enc = Arc::new(Encoders::default());
        enc.attach(&io, &params).unwrap();

        sim.inject_fault(params.enc_left_b_pin);
        sim.pulse_rising(params.enc_left_a_pin);
        assert_eq!(enc.get().left, 0);
    }
}
