use std::time::Duration;

use serde::Serialize;

use super::{SlotKey, SlotStats};
use crate::throttle::TimerHandle;

/// Success and ban counters of one observation window.
///
/// Both counters are only ever reset together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Window {
    /// Completions which were not banned
    pub successes: u64,
    /// Completions which were banned
    pub bans: u64,
}

impl Window {
    /// Both successes and bans were seen in this window, which points to
    /// throttling rather than a transient block
    #[must_use]
    pub const fn is_mixed(&self) -> bool {
        self.successes > 0 && self.bans > 0
    }

    /// No completion was observed in this window yet
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.successes == 0 && self.bans == 0
    }

    pub(crate) const fn record(&mut self, banned: bool) {
        if banned {
            self.bans += 1;
        } else {
            self.successes += 1;
        }
    }
}

/// Pause bookkeeping of one independently paused unit: either a single
/// slot or the whole pipeline.
///
/// A unit is paused exactly while it holds a timer handle. Every armed
/// timer gets a new epoch; a resume callback only applies to the unit if
/// its epoch is still the current one.
#[derive(Debug)]
pub struct PauseUnit {
    window: Window,
    current_pause: Duration,
    timer: Option<Box<dyn TimerHandle>>,
    epoch: u64,
    resumed: bool,
}

impl PauseUnit {
    pub(crate) fn new(base_pause: Duration) -> Self {
        Self {
            window: Window::default(),
            current_pause: base_pause,
            timer: None,
            epoch: 0,
            resumed: false,
        }
    }

    /// Counters of the current observation window
    #[must_use]
    pub const fn window(&self) -> Window {
        self.window
    }

    /// Duration the next (or current) pause of this unit lasts
    #[must_use]
    pub const fn current_pause(&self) -> Duration {
        self.current_pause
    }

    /// Whether a pause timer is outstanding
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub(crate) const fn record(&mut self, banned: bool) {
        self.window.record(banned);
    }

    pub(crate) const fn reset_window(&mut self) {
        self.window = Window {
            successes: 0,
            bans: 0,
        };
    }

    pub(crate) const fn set_pause(&mut self, pause: Duration) {
        self.current_pause = pause;
    }

    pub(crate) fn timer(&self) -> Option<&dyn TimerHandle> {
        self.timer.as_deref()
    }

    /// Start a new epoch for a timer which is about to be armed
    pub(crate) const fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn install(&mut self, timer: Box<dyn TimerHandle>) {
        self.timer = Some(timer);
    }

    /// Cancel the outstanding timer, if any. Returns whether the unit was
    /// paused; its resume is then up to the caller.
    pub(crate) fn cancel_timer(&self) -> bool {
        self.timer.as_deref().is_some_and(|timer| {
            timer.cancel();
            true
        })
    }

    /// Whether a callback armed in `epoch` still owns this unit's pause
    pub(crate) const fn is_current(&self, epoch: u64) -> bool {
        self.timer.is_some() && self.epoch == epoch
    }

    /// Drop the pause timer and mark the start of a post-resume window
    pub(crate) fn disarm(&mut self) -> Option<Box<dyn TimerHandle>> {
        self.resumed = true;
        self.timer.take()
    }

    /// Consume the post-resume marker: true only for the first completion
    /// observed after a resume
    pub(crate) const fn take_resumed(&mut self) -> bool {
        let resumed = self.resumed;
        self.resumed = false;
        resumed
    }
}

/// Gate for the once-per-window slot delay increase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DelayGate {
    pub(crate) adjusted: bool,
    pub(crate) pending: Option<Duration>,
}

/// Mutable state of one slot, owned by the [`SlotRegistry`](crate::throttle::SlotRegistry).
///
/// In slot scope the embedded [`PauseUnit`] is the unit that gets paused.
/// In pipeline scope the slot still counts its own window, but pausing is
/// done by the controller's pipeline unit.
#[derive(Debug)]
pub struct SlotState {
    pub(crate) key: SlotKey,
    pub(crate) unit: PauseUnit,
    pub(crate) delay: DelayGate,
    pub(crate) stats: SlotStats,
}

impl SlotState {
    pub(crate) fn new(key: SlotKey, base_pause: Duration) -> Self {
        Self {
            key,
            unit: PauseUnit::new(base_pause),
            delay: DelayGate::default(),
            stats: SlotStats::default(),
        }
    }

    /// The slot this state belongs to
    #[must_use]
    pub const fn key(&self) -> &SlotKey {
        &self.key
    }

    /// Successful completions since the last reset
    #[must_use]
    pub const fn success_count(&self) -> u64 {
        self.unit.window.successes
    }

    /// Banned completions since the last reset
    #[must_use]
    pub const fn ban_count(&self) -> u64 {
        self.unit.window.bans
    }

    /// Pause duration of the slot's own pause unit
    #[must_use]
    pub const fn current_pause(&self) -> Duration {
        self.unit.current_pause
    }

    /// Whether the slot delay was already increased in this window
    #[must_use]
    pub const fn delay_adjusted(&self) -> bool {
        self.delay.adjusted
    }

    /// A computed delay waiting to be applied on resume
    #[must_use]
    pub const fn pending_delay(&self) -> Option<Duration> {
        self.delay.pending
    }

    /// Whether the slot's own pause timer is outstanding
    #[must_use]
    pub const fn pause_armed(&self) -> bool {
        self.unit.is_armed()
    }

    /// The slot's pause unit
    #[must_use]
    pub const fn unit(&self) -> &PauseUnit {
        &self.unit
    }

    /// Lifetime statistics of the slot
    #[must_use]
    pub const fn stats(&self) -> &SlotStats {
        &self.stats
    }

    /// Zero the window counters together with the delay gate
    pub(crate) const fn reset(&mut self) {
        self.unit.reset_window();
        self.delay.adjusted = false;
    }
}
