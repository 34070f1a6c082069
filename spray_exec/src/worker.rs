//! # Serial worker
//!
//! Every command-driven subsystem owns exactly one worker: a dedicated thread consuming a bounded
//! command channel strictly in order. The thread blocks on the channel with a short poll timeout
//! so that it notices the stop flag promptly. Commands are never reordered or merged.
//!
//! When the channel is full new commands are rejected with [`WorkerError::QueueFull`], the
//! caller decides whether that is an error or a dropped message.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use util::time::secs;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters shared by all worker loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerParams {
    /// Maximum number of commands waiting in a worker's queue
    pub queue_capacity: usize,

    /// Time a worker blocks on its queue before re-checking the stop flag.
    ///
    /// Units: seconds
    pub poll_period_s: f64,
}

/// Cooperative stop signal shared between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

/// A dedicated thread consuming commands of type `C`.
pub struct Worker<C> {
    name: &'static str,

    sender: Sender<C>,

    receiver: Receiver<C>,

    stop: StopFlag,

    jh: Mutex<Option<JoinHandle<()>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("The {0} command queue is full")]
    QueueFull(&'static str),

    #[error("The {0} worker has stopped")]
    Stopped(&'static str),

    #[error("Could not spawn the {0} worker thread: {1}")]
    SpawnFailed(&'static str, std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for WorkerParams {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            poll_period_s: 0.05,
        }
    }
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleep for `duration`, waking every `poll` to check the flag.
    ///
    /// Returns `false` if the sleep was cut short because the flag was set.
    pub fn sleep(&self, duration: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let poll = poll.max(Duration::from_millis(1));

        loop {
            if self.is_set() {
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }

            thread::sleep(poll.min(deadline - now));
        }
    }
}

impl<C: Send + 'static> Worker<C> {
    /// Spawn a new worker thread.
    ///
    /// `handler` is called once per command, in the order the commands were sent. A panic
    /// inside the handler is logged and the loop carries on with the next command.
    pub fn spawn<H>(
        name: &'static str,
        params: &WorkerParams,
        mut handler: H,
    ) -> Result<Self, WorkerError>
    where
        H: FnMut(C, &StopFlag) + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(params.queue_capacity.max(1));
        let stop = StopFlag::new();
        let poll = secs(params.poll_period_s).max(Duration::from_millis(1));

        let rx = receiver.clone();
        let stop_clone = stop.clone();

        let jh = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                debug!("{} worker started", name);

                while !stop_clone.is_set() {
                    let cmd = match rx.recv_timeout(poll) {
                        Ok(c) => c,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    let res =
                        panic::catch_unwind(AssertUnwindSafe(|| handler(cmd, &stop_clone)));
                    if res.is_err() {
                        error!("{} worker recovered from a panic in its command handler", name);
                    }
                }

                debug!("{} worker stopped", name);
            })
            .map_err(|e| WorkerError::SpawnFailed(name, e))?;

        Ok(Self {
            name,
            sender,
            receiver,
            stop,
            jh: Mutex::new(Some(jh)),
        })
    }
}

impl<C> Worker<C> {
    /// Enqueue a command without blocking.
    pub fn send(&self, cmd: C) -> Result<(), WorkerError> {
        if self.stop.is_set() {
            return Err(WorkerError::Stopped(self.name));
        }

        self.sender.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull(self.name),
            TrySendError::Disconnected(_) => WorkerError::Stopped(self.name),
        })
    }

    /// Discard every command that has not been started yet, returning how many were dropped.
    pub fn drain(&self) -> usize {
        let mut num_dropped = 0;
        while self.receiver.try_recv().is_ok() {
            num_dropped += 1;
        }

        if num_dropped > 0 {
            trace!("Drained {} commands from the {} queue", num_dropped, self.name);
        }
        num_dropped
    }

    /// Number of commands waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Signal the worker to exit after its current command.
    pub fn stop(&self) {
        self.stop.set();
    }

    /// Wait until `deadline` for the worker thread to exit.
    ///
    /// Returns `true` if the thread has exited.
    pub fn join_until(&self, deadline: Instant) -> bool {
        join_until(&self.jh, deadline)
    }
}

impl<C> Drop for Worker<C> {
    fn drop(&mut self) {
        self.stop.set();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Wait until `deadline` for the thread behind `jh` to exit, joining it if it has.
///
/// Returns `true` if the thread has exited or was already joined.
pub(crate) fn join_until(jh: &Mutex<Option<JoinHandle<()>>>, deadline: Instant) -> bool {
    let mut jh = jh.lock();

    let finished = match jh.as_ref() {
        Some(h) => {
            while !h.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            h.is_finished()
        }
        None => return true,
    };

    if finished {
        if let Some(h) = jh.take() {
            h.join().ok();
        }
    }

    finished
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
