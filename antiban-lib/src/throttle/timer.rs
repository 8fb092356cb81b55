//! The pause/resume clock.
//!
//! A [`Timer`] runs one callback after a duration. The returned
//! [`TimerHandle`] can move the deadline while the timer is still armed.
//! Resetting and firing are decided under the same lock, so a reset either
//! lands before the fire or fails with [`TimerError::AlreadyFired`].
//!
//! [`TokioTimer`] is the default implementation and spawns one task per
//! armed timer on a tokio runtime. It honours `tokio::time::pause`, which
//! keeps tests independent of wall-clock time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Callback run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Reasons a timer can no longer be reset
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The deadline passed and the callback was (or is being) run
    #[error("timer already fired")]
    AlreadyFired,

    /// The timer was cancelled before it fired
    #[error("timer was cancelled")]
    Cancelled,
}

/// Schedules single-shot callbacks
pub trait Timer: Send + Sync + fmt::Debug {
    /// Run `callback` once `after` has elapsed
    fn arm(&self, after: Duration, callback: TimerCallback) -> Box<dyn TimerHandle>;
}

/// Handle to an armed timer.
///
/// Dropping the handle does not cancel the timer.
pub trait TimerHandle: Send + Sync + fmt::Debug {
    /// Move the deadline to `after` from now.
    ///
    /// # Errors
    ///
    /// Fails if the timer already fired or was cancelled. The deadline is
    /// left untouched in that case.
    fn reset(&self, after: Duration) -> Result<(), TimerError>;

    /// Whether the timer is still armed
    fn is_active(&self) -> bool;

    /// Disarm the timer without running the callback. Returns `false` if
    /// the timer was no longer armed.
    fn cancel(&self) -> bool;
}

/// [`Timer`] backed by the tokio time driver
#[derive(Debug, Clone)]
pub struct TokioTimer {
    runtime: Handle,
}

impl TokioTimer {
    /// Create a timer which spawns onto the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime
    #[must_use]
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a timer which spawns onto the given runtime
    #[must_use]
    pub const fn with_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Timer for TokioTimer {
    fn arm(&self, after: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let entry = Arc::new(Entry {
            state: Mutex::new(EntryState {
                deadline: Instant::now() + after,
                phase: Phase::Armed,
            }),
            notify: Notify::new(),
        });
        self.runtime.spawn(run(entry.clone(), callback));
        Box::new(TokioTimerHandle { entry })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Armed,
    Fired,
    Cancelled,
}

#[derive(Debug)]
struct EntryState {
    deadline: Instant,
    phase: Phase,
}

#[derive(Debug)]
struct Entry {
    state: Mutex<EntryState>,
    /// Wakes the timer task when the deadline moved or the timer was cancelled
    notify: Notify,
}

#[derive(Debug)]
struct TokioTimerHandle {
    entry: Arc<Entry>,
}

impl TimerHandle for TokioTimerHandle {
    fn reset(&self, after: Duration) -> Result<(), TimerError> {
        {
            let mut state = self.entry.state.lock();
            match state.phase {
                Phase::Armed => state.deadline = Instant::now() + after,
                Phase::Fired => return Err(TimerError::AlreadyFired),
                Phase::Cancelled => return Err(TimerError::Cancelled),
            }
        }
        self.entry.notify.notify_one();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.entry.state.lock().phase == Phase::Armed
    }

    fn cancel(&self) -> bool {
        {
            let mut state = self.entry.state.lock();
            if state.phase != Phase::Armed {
                return false;
            }
            state.phase = Phase::Cancelled;
        }
        self.entry.notify.notify_one();
        true
    }
}

async fn run(entry: Arc<Entry>, callback: TimerCallback) {
    loop {
        let deadline = {
            let state = entry.state.lock();
            if state.phase != Phase::Armed {
                return;
            }
            state.deadline
        };

        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {}
            () = entry.notify.notified() => continue,
        }

        let due = {
            let mut state = entry.state.lock();
            match state.phase {
                Phase::Armed if state.deadline <= Instant::now() => {
                    state.phase = Phase::Fired;
                    true
                }
                Phase::Armed => false,
                Phase::Fired | Phase::Cancelled => return,
            }
        };
        if due {
            break;
        }
    }
    callback();
}
