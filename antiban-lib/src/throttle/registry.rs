use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::throttle::{PauseScope, PauseUnit, SlotKey, SlotState, SlotStatsMap};

/// Shared handle to the state of one slot
pub type SharedSlotState = Arc<Mutex<SlotState>>;

/// Owns the [`SlotState`] of every slot observed so far, together with the
/// pause unit of the whole pipeline.
///
/// # Architecture
///
/// - Each slot key gets its own state behind its own mutex, so updates for
///   different slots never contend on a shared lock
/// - States are created lazily when a slot is first observed
/// - Thread-safe using `DashMap` for concurrent access to the map itself
/// - The pipeline unit is locked before any slot state, never after
#[derive(Debug)]
pub struct SlotRegistry {
    slots: DashMap<SlotKey, SharedSlotState>,
    /// Pause unit covering every slot in [`PauseScope::Pipeline`]
    pipeline: Mutex<PauseUnit>,
    scope: PauseScope,
    base_pause: Duration,
}

impl SlotRegistry {
    /// Create an empty registry. Pause units start with `base_pause` as
    /// their pause duration.
    #[must_use]
    pub fn new(scope: PauseScope, base_pause: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            pipeline: Mutex::new(PauseUnit::new(base_pause)),
            scope,
            base_pause,
        }
    }

    pub(crate) const fn pipeline(&self) -> &Mutex<PauseUnit> {
        &self.pipeline
    }

    /// Get the state of `key`, creating a default one if the slot was not
    /// seen before.
    ///
    /// Concurrent calls for the same key return the same state.
    pub fn get_or_create(&self, key: &SlotKey) -> SharedSlotState {
        if let Some(state) = self.slots.get(key) {
            return state.clone();
        }

        match self.slots.entry(key.clone()) {
            // Another thread created it in the meantime
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let state = Arc::new(Mutex::new(SlotState::new(key.clone(), self.base_pause)));
                entry.insert(state).clone()
            }
        }
    }

    /// Get the state of `key` if the slot was observed before
    #[must_use]
    pub fn get(&self, key: &SlotKey) -> Option<SharedSlotState> {
        self.slots.get(key).map(|state| state.clone())
    }

    /// Zero the counters and the delay gate of `key`.
    ///
    /// The pause duration is left alone; see
    /// [`SlotRegistry::reset_pause_duration`]. Returns `false` for unknown
    /// slots.
    pub fn reset(&self, key: &SlotKey) -> bool {
        self.get(key).is_some_and(|state| {
            self.reset_locked(&mut state.lock());
            true
        })
    }

    /// Set the pause duration of the unit covering `key` back to the base
    /// pause: the pipeline unit in [`PauseScope::Pipeline`], the slot's own
    /// unit otherwise. Returns `false` for unknown slots.
    pub fn reset_pause_duration(&self, key: &SlotKey) -> bool {
        let Some(state) = self.get(key) else {
            return false;
        };
        match self.scope {
            PauseScope::Pipeline => self.reset_pause_locked(&mut self.pipeline.lock()),
            PauseScope::Slot => self.reset_pause_locked(&mut state.lock().unit),
        }
        true
    }

    /// [`SlotRegistry::reset`] for a state the caller already holds locked
    pub(crate) fn reset_locked(&self, state: &mut SlotState) {
        state.reset();
    }

    /// [`SlotRegistry::reset_pause_duration`] for a unit the caller already
    /// holds locked
    pub(crate) fn reset_pause_locked(&self, unit: &mut PauseUnit) {
        unit.set_pause(self.base_pause);
    }

    /// All slot states, so callers can lock them one after another without
    /// holding the map
    #[must_use]
    pub fn states(&self) -> Vec<SharedSlotState> {
        self.slots.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Keys of all observed slots
    #[must_use]
    pub fn keys(&self) -> Vec<SlotKey> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of observed slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot was observed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lifetime statistics of every observed slot
    #[must_use]
    pub fn stats(&self) -> SlotStatsMap {
        self.states()
            .into_iter()
            .map(|state| {
                let state = state.lock();
                (state.key().clone(), state.stats().clone())
            })
            .collect::<HashMap<_, _>>()
            .into()
    }
}
