//! Collaborators shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use antiban_lib::throttle::{
    Scheduler, SlotKey, Timer, TimerCallback, TimerError, TimerHandle,
};
use parking_lot::Mutex;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Pause,
    Unpause,
    PauseSlot(SlotKey),
    UnpauseSlot(SlotKey),
    SetSlotDelay(SlotKey, Duration),
}

impl Command {
    /// The slot a per-slot command applies to
    pub(crate) fn slot(&self) -> Option<&SlotKey> {
        match self {
            Self::Pause | Self::Unpause => None,
            Self::PauseSlot(key) | Self::UnpauseSlot(key) | Self::SetSlotDelay(key, _) => Some(key),
        }
    }
}

/// Scheduler of a pipeline with a fixed set of slots, all starting with the
/// same delay
#[derive(Debug)]
pub(crate) struct Engine {
    commands: Mutex<Vec<Command>>,
    delays: Mutex<HashMap<SlotKey, Duration>>,
}

impl Engine {
    pub(crate) fn new(slots: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::default(),
            delays: Mutex::new(slots.iter().map(|key| (SlotKey::from(*key), delay)).collect()),
        })
    }

    pub(crate) fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub(crate) fn commands_for(&self, key: &SlotKey) -> Vec<Command> {
        self.commands()
            .into_iter()
            .filter(|command| command.slot() == Some(key))
            .collect()
    }
}

impl Scheduler for Engine {
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
        self.commands.lock().push(Command::SetSlotDelay(key.clone(), delay));
        self.delays.lock().insert(key.clone(), delay);
    }

    fn pause_slot(&self, key: &SlotKey) {
        self.commands.lock().push(Command::PauseSlot(key.clone()));
    }

    fn unpause_slot(&self, key: &SlotKey) {
        self.commands.lock().push(Command::UnpauseSlot(key.clone()));
    }
}

#[derive(Debug, Default)]
struct Slot {
    active: bool,
    durations: Vec<Duration>,
}

struct Entry {
    slot: Mutex<Slot>,
    callback: Mutex<Option<TimerCallback>>,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry").field("slot", &self.slot).finish_non_exhaustive()
    }
}

/// Timer fired by hand, addressed by arming order
#[derive(Debug, Default)]
pub(crate) struct HandTimer {
    entries: Mutex<Vec<Arc<Entry>>>,
}

impl HandTimer {
    pub(crate) fn armed(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn durations(&self, index: usize) -> Vec<Duration> {
        self.entries.lock()[index].slot.lock().durations.clone()
    }

    /// Fire the timer if it is still armed
    pub(crate) fn fire(&self, index: usize) -> bool {
        let entry = self.entries.lock()[index].clone();
        {
            let mut slot = entry.slot.lock();
            if !slot.active {
                return false;
            }
            slot.active = false;
        }
        let callback = entry.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        true
    }
}

impl Timer for HandTimer {
    fn arm(&self, after: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let entry = Arc::new(Entry {
            slot: Mutex::new(Slot {
                active: true,
                durations: vec![after],
            }),
            callback: Mutex::new(Some(callback)),
        });
        self.entries.lock().push(entry.clone());
        Box::new(HandTimerHandle { entry })
    }
}

#[derive(Debug)]
struct HandTimerHandle {
    entry: Arc<Entry>,
}

impl TimerHandle for HandTimerHandle {
    fn reset(&self, after: Duration) -> Result<(), TimerError> {
        let mut slot = self.entry.slot.lock();
        if !slot.active {
            return Err(TimerError::AlreadyFired);
        }
        slot.durations.push(after);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.entry.slot.lock().active
    }

    fn cancel(&self) -> bool {
        std::mem::replace(&mut self.entry.slot.lock().active, false)
    }
}
