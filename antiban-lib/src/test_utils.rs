//! Test doubles for the throttle's collaborators.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::throttle::{Scheduler, SlotKey, Timer, TimerCallback, TimerError, TimerHandle};

/// A command the controller issued to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Pause,
    Unpause,
    PauseSlot(SlotKey),
    UnpauseSlot(SlotKey),
    SetSlotDelay(SlotKey, Duration),
}

/// Scheduler which records every command and knows a fixed set of slots
#[derive(Debug, Default)]
pub(crate) struct RecordingScheduler {
    commands: Mutex<Vec<Command>>,
    delays: Mutex<HashMap<SlotKey, Duration>>,
}

impl RecordingScheduler {
    pub(crate) fn with_slots(slots: &[(&str, Duration)]) -> Self {
        let delays = slots
            .iter()
            .map(|(key, delay)| (SlotKey::from(*key), *delay))
            .collect();
        Self {
            commands: Mutex::default(),
            delays: Mutex::new(delays),
        }
    }

    pub(crate) fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub(crate) fn count(&self, command: &Command) -> usize {
        self.commands.lock().iter().filter(|c| *c == command).count()
    }

    pub(crate) fn delay(&self, key: &str) -> Option<Duration> {
        self.delays.lock().get(&SlotKey::from(key)).copied()
    }

    /// Forget a slot, as if the pipeline tore it down
    pub(crate) fn remove_slot(&self, key: &str) {
        self.delays.lock().remove(&SlotKey::from(key));
    }
}

impl Scheduler for RecordingScheduler {
    fn pause(&self) {
        self.commands.lock().push(Command::Pause);
    }

    fn unpause(&self) {
        self.commands.lock().push(Command::Unpause);
    }

    fn slot_delay(&self, key: &SlotKey) -> Option<Duration> {
        self.delays.lock().get(key).copied()
    }

    fn set_slot_delay(&self, key: &SlotKey, delay: Duration) {
        self.commands
            .lock()
            .push(Command::SetSlotDelay(key.clone(), delay));
        self.delays.lock().insert(key.clone(), delay);
    }

    fn pause_slot(&self, key: &SlotKey) {
        self.commands.lock().push(Command::PauseSlot(key.clone()));
    }

    fn unpause_slot(&self, key: &SlotKey) {
        self.commands.lock().push(Command::UnpauseSlot(key.clone()));
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
    phase: Phase,
    /// Initial duration followed by every successful reset
    durations: Vec<Duration>,
    /// Make the next reset lose the race against the fire
    fire_on_reset: bool,
}

struct Entry {
    state: Mutex<EntryState>,
    callback: Mutex<Option<TimerCallback>>,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Timer which only fires when told to.
///
/// Timers are addressed by the order they were armed in.
#[derive(Debug, Default)]
pub(crate) struct ManualTimer {
    entries: Mutex<Vec<Arc<Entry>>>,
}

impl ManualTimer {
    fn entry(&self, index: usize) -> Arc<Entry> {
        self.entries.lock()[index].clone()
    }

    /// Number of timers armed so far
    pub(crate) fn armed(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn durations(&self, index: usize) -> Vec<Duration> {
        self.entry(index).state.lock().durations.clone()
    }

    pub(crate) fn is_active(&self, index: usize) -> bool {
        self.entry(index).state.lock().phase == Phase::Armed
    }

    /// Let the deadline pass and run the callback. Returns `false` if the
    /// timer was not armed anymore.
    pub(crate) fn fire(&self, index: usize) -> bool {
        if !self.expire(index) {
            return false;
        }
        self.run_callback(index);
        true
    }

    /// Fire every armed timer
    pub(crate) fn fire_all(&self) -> usize {
        (0..self.armed()).filter(|&index| self.fire(index)).count()
    }

    /// Let the deadline pass without running the callback yet
    pub(crate) fn expire(&self, index: usize) -> bool {
        let entry = self.entry(index);
        let mut state = entry.state.lock();
        if state.phase != Phase::Armed {
            return false;
        }
        state.phase = Phase::Fired;
        true
    }

    /// Run the callback of a timer, whatever its phase. Callbacks only run
    /// once.
    pub(crate) fn run_callback(&self, index: usize) {
        let callback = self.entry(index).callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// The next reset of this timer finds it fired, although it still
    /// looked armed
    pub(crate) fn fire_on_reset(&self, index: usize) {
        self.entry(index).state.lock().fire_on_reset = true;
    }
}

impl Timer for ManualTimer {
    fn arm(&self, after: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let entry = Arc::new(Entry {
            state: Mutex::new(EntryState {
                phase: Phase::Armed,
                durations: vec![after],
                fire_on_reset: false,
            }),
            callback: Mutex::new(Some(callback)),
        });
        self.entries.lock().push(entry.clone());
        Box::new(ManualHandle { entry })
    }
}

#[derive(Debug)]
struct ManualHandle {
    entry: Arc<Entry>,
}

impl TimerHandle for ManualHandle {
    fn reset(&self, after: Duration) -> Result<(), TimerError> {
        let mut state = self.entry.state.lock();
        if state.fire_on_reset && state.phase == Phase::Armed {
            state.phase = Phase::Fired;
        }
        match state.phase {
            Phase::Armed => {
                state.durations.push(after);
                Ok(())
            }
            Phase::Fired => Err(TimerError::AlreadyFired),
            Phase::Cancelled => Err(TimerError::Cancelled),
        }
    }

    fn is_active(&self) -> bool {
        self.entry.state.lock().phase == Phase::Armed
    }

    fn cancel(&self) -> bool {
        let mut state = self.entry.state.lock();
        if state.phase != Phase::Armed {
            return false;
        }
        state.phase = Phase::Cancelled;
        true
    }
}
