use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt, future};
use log::Level;
use serde::Serialize;

use crate::CompletionEvent;
use crate::throttle::slot::DelayGate;
use crate::throttle::{
    BackoffPolicy, DelayMode, PauseScope, PauseUnit, Scheduler, SlotKey, SlotRegistry, SlotState,
    SlotStats, SlotStatsMap, ThrottleConfig, Timer, TimerCallback,
};

/// Point-in-time view of a slot.
///
/// The counters always belong to the slot itself. The pause fields belong
/// to the unit covering the slot, i.e. the whole pipeline in
/// [`PauseScope::Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    /// Successful completions in the current window
    pub successes: u64,
    /// Banned completions in the current window
    pub bans: u64,
    /// Whether the slot delay was increased in the current window
    pub delay_adjusted: bool,
    /// Increased delay waiting for the next resume
    pub pending_delay: Option<Duration>,
    /// Duration of the current or next pause
    pub current_pause: Duration,
    /// Whether a pause timer is outstanding
    pub pause_armed: bool,
}

/// The unit a timer pauses
#[derive(Debug, Clone, PartialEq, Eq)]
enum UnitId {
    Pipeline,
    Slot(SlotKey),
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "pipeline"),
            Self::Slot(key) => write!(f, "slot {key}"),
        }
    }
}

/// Reacts to banned completions by pausing dispatch and slowing down slots.
///
/// Completion events are fed in with [`ThrottleController::observe`] (or
/// one of the batch and stream variants). The controller
///
/// 1. counts successes and bans per slot,
/// 2. pauses the affected unit on a ban and resumes it when the pause timer
///    fires, growing the pause if bans recur right after resuming,
/// 3. increases a slot's delay once per window when the window shows both
///    successes and bans.
///
/// Each pausable unit has its own lock. Timer callbacks take the same lock
/// as event processing, so a resume never interleaves with an event for
/// the same unit. Scheduler commands are issued without waiting on the
/// pipeline.
///
/// The controller is cheap to clone; clones share all state.
#[derive(Debug, Clone)]
pub struct ThrottleController {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ThrottleConfig,
    policy: BackoffPolicy,
    registry: SlotRegistry,
    scheduler: Arc<dyn Scheduler>,
    timer: Arc<dyn Timer>,
}

impl ThrottleController {
    /// Create a controller driving `scheduler` and using `timer` as its
    /// pause clock. The configuration is sanitized first.
    #[must_use]
    pub fn new(config: ThrottleConfig, scheduler: Arc<dyn Scheduler>, timer: Arc<dyn Timer>) -> Self {
        let config = config.sanitized();
        let policy = config.policy();
        Self {
            inner: Arc::new(Inner {
                config,
                policy,
                registry: SlotRegistry::new(config.pause_scope, config.base_pause),
                scheduler,
                timer,
            }),
        }
    }

    /// The effective (sanitized) configuration
    #[must_use]
    pub fn config(&self) -> &ThrottleConfig {
        &self.inner.config
    }

    /// The backoff policy in use
    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.inner.policy
    }

    /// The registry holding every observed slot
    #[must_use]
    pub fn registry(&self) -> &SlotRegistry {
        &self.inner.registry
    }

    /// Account for one completed request
    pub fn observe(&self, event: &CompletionEvent) {
        debug_assert!(!event.slot.is_empty(), "completion event without slot key");
        if event.slot.is_empty() {
            log::error!("Ignoring completion event without slot key");
            return;
        }

        let inner = &self.inner;
        let slot = inner.registry.get_or_create(&event.slot);
        match inner.config.pause_scope {
            PauseScope::Slot => {
                let mut state = slot.lock();
                let SlotState {
                    key,
                    unit,
                    delay,
                    stats,
                } = &mut *state;
                let id = UnitId::Slot(key.clone());
                inner.step(&id, unit, key, delay, stats, event.banned);
            }
            PauseScope::Pipeline => {
                let mut pipeline = inner.registry.pipeline().lock();
                let mut state = slot.lock();
                let SlotState {
                    key,
                    unit,
                    delay,
                    stats,
                } = &mut *state;
                unit.record(event.banned);
                inner.step(&UnitId::Pipeline, &mut pipeline, key, delay, stats, event.banned);
            }
        }
    }

    /// Account for a burst of completions, e.g. one output batch of the
    /// pipeline
    pub fn observe_batch<I>(&self, events: I)
    where
        I: IntoIterator,
        I::Item: Borrow<CompletionEvent>,
    {
        for event in events {
            self.observe(event.borrow());
        }
    }

    /// Observe every event of `events` until the stream ends. Returns the
    /// number of observed events.
    pub async fn run<S>(&self, events: S) -> usize
    where
        S: Stream<Item = CompletionEvent>,
    {
        events
            .fold(0, |count, event| {
                self.observe(&event);
                future::ready(count + 1)
            })
            .await
    }

    /// Pass every item of `stream` through unchanged, observing the
    /// completion event `extract` finds in it, if any.
    ///
    /// Items without an event (anything that is not a completed request)
    /// are simply forwarded.
    pub fn inspect<S, F>(
        &self,
        stream: S,
        mut extract: F,
    ) -> impl Stream<Item = S::Item> + use<S, F>
    where
        S: Stream,
        F: FnMut(&S::Item) -> Option<CompletionEvent>,
    {
        let controller = self.clone();
        stream.inspect(move |item| {
            if let Some(event) = extract(item) {
                controller.observe(&event);
            }
        })
    }

    /// Whether any pause is outstanding
    #[must_use]
    pub fn is_paused(&self) -> bool {
        match self.inner.config.pause_scope {
            PauseScope::Pipeline => self.inner.registry.pipeline().lock().is_armed(),
            PauseScope::Slot => self
                .inner
                .registry
                .states()
                .iter()
                .any(|state| state.lock().pause_armed()),
        }
    }

    /// Whether new requests may currently be dispatched through `key`
    #[must_use]
    pub fn is_admitted(&self, key: &SlotKey) -> bool {
        match self.inner.config.pause_scope {
            PauseScope::Pipeline => !self.inner.registry.pipeline().lock().is_armed(),
            PauseScope::Slot => self
                .inner
                .registry
                .get(key)
                .is_none_or(|state| !state.lock().pause_armed()),
        }
    }

    /// Current view of `key`, or `None` if the slot was never observed
    #[must_use]
    pub fn snapshot(&self, key: &SlotKey) -> Option<SlotSnapshot> {
        let state = self.inner.registry.get(key)?;
        let snapshot = match self.inner.config.pause_scope {
            PauseScope::Pipeline => {
                let pipeline = self.inner.registry.pipeline().lock();
                let state = state.lock();
                Inner::snapshot(&state, &pipeline)
            }
            PauseScope::Slot => {
                let state = state.lock();
                Inner::snapshot(&state, state.unit())
            }
        };
        Some(snapshot)
    }

    /// Lifetime statistics of `key`
    #[must_use]
    pub fn slot_stats(&self, key: &SlotKey) -> Option<SlotStats> {
        let state = self.inner.registry.get(key)?;
        let stats = state.lock().stats().clone();
        Some(stats)
    }

    /// Lifetime statistics of all observed slots
    #[must_use]
    pub fn stats(&self) -> SlotStatsMap {
        self.inner.registry.stats()
    }

    /// Cancel every outstanding pause timer and resume the paused units
    /// right away.
    ///
    /// Call this when the pipeline stops, so no pause is left without its
    /// resume.
    ///
    /// Dropping the last clone of the controller does the same.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn shutdown(&self) {
        {
            let mut pipeline = self.registry.pipeline().lock();
            if pipeline.cancel_timer() {
                self.resume_pipeline(&mut pipeline);
            }
        }
        for state in self.registry.states() {
            let mut state = state.lock();
            if state.unit.cancel_timer() {
                self.resume_slot(&mut state);
            }
        }
    }

    /// Apply one completion to the unit covering its slot
    fn step(
        self: &Arc<Self>,
        id: &UnitId,
        unit: &mut PauseUnit,
        key: &SlotKey,
        delay: &mut DelayGate,
        stats: &mut SlotStats,
        banned: bool,
    ) {
        unit.record(banned);
        let first_after_resume = unit.take_resumed();

        if banned {
            stats.record_ban();
            self.pause(id, unit, stats);
        } else {
            stats.record_success();
            if first_after_resume && unit.current_pause() != self.policy.base_pause() {
                self.status(format_args!(
                    "{id} recovered after resume, pause duration back to {}s",
                    self.policy.base_pause().as_secs_f64()
                ));
                self.registry.reset_pause_locked(unit);
            }
        }

        // Successes and bans in the same window point to throttling
        if unit.window().is_mixed() && !delay.adjusted {
            if self.slot_delay_increase_once(key, delay) {
                stats.record_delay_increase();
            }
            delay.adjusted = true;
        }
    }

    /// Pause `unit`, or extend its running pause
    fn pause(self: &Arc<Self>, id: &UnitId, unit: &mut PauseUnit, stats: &mut SlotStats) {
        let pause = self
            .policy
            .next_pause_duration(unit.window(), unit.current_pause());
        unit.set_pause(pause);
        // A unit still holding a timer is in the middle of its pause cycle
        let new_cycle = !unit.is_armed();

        if let Some(timer) = unit.timer()
            && timer.is_active()
        {
            match timer.reset(pause) {
                Ok(()) => {
                    self.status(format_args!(
                        "{id} pause timer reset to {}s",
                        pause.as_secs_f64()
                    ));
                    return;
                }
                // The timer fired in the meantime; its resume is stale once
                // a new timer is installed below
                Err(e) => log::debug!("Cannot reset pause timer of {id}: {e}"),
            }
        }

        self.status(format_args!(
            "Create a new pause task for {id}, {}s",
            pause.as_secs_f64()
        ));
        match id {
            UnitId::Pipeline => self.scheduler.pause(),
            UnitId::Slot(key) => self.scheduler.pause_slot(key),
        }
        let epoch = unit.next_epoch();
        let handle = self.timer.arm(pause, self.resume_callback(id.clone(), epoch));
        unit.install(handle);
        if new_cycle {
            stats.record_pause();
        }
    }

    fn resume_callback(self: &Arc<Self>, id: UnitId, epoch: u64) -> TimerCallback {
        let inner = Arc::downgrade(self);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.on_timer(&id, epoch);
            }
        })
    }

    /// Resume callback of the timer armed in `epoch`
    fn on_timer(&self, id: &UnitId, epoch: u64) {
        match id {
            UnitId::Pipeline => {
                let mut pipeline = self.registry.pipeline().lock();
                if pipeline.is_current(epoch) {
                    self.resume_pipeline(&mut pipeline);
                } else {
                    log::debug!("Ignoring stale resume of {id}");
                }
            }
            UnitId::Slot(key) => {
                let Some(state) = self.registry.get(key) else {
                    return;
                };
                let mut state = state.lock();
                if state.unit.is_current(epoch) {
                    self.resume_slot(&mut state);
                } else {
                    log::debug!("Ignoring stale resume of {id}");
                }
            }
        }
    }

    fn resume_pipeline(&self, pipeline: &mut PauseUnit) {
        pipeline.disarm();
        pipeline.reset_window();
        for state in self.registry.states() {
            let mut state = state.lock();
            self.apply_pending_delay(&mut state);
            self.registry.reset_locked(&mut state);
        }
        self.scheduler.unpause();
        self.status(format_args!(
            "Pipeline resumed after a pause of {}s",
            pipeline.current_pause().as_secs_f64()
        ));
    }

    fn resume_slot(&self, state: &mut SlotState) {
        state.unit.disarm();
        self.apply_pending_delay(state);
        self.registry.reset_locked(state);
        self.scheduler.unpause_slot(&state.key);
        self.status(format_args!(
            "Slot {} resumed after a pause of {}s",
            state.key,
            state.current_pause().as_secs_f64()
        ));
    }

    /// Increase the delay of `key` for this window. Returns `false` if the
    /// scheduler does not know the slot.
    fn slot_delay_increase_once(&self, key: &SlotKey, delay: &mut DelayGate) -> bool {
        let Some(old_delay) = self.scheduler.slot_delay(key) else {
            log::warn!("No slot found for key {key}, delay left unchanged");
            return false;
        };
        let new_delay = self.policy.next_slot_delay(old_delay);
        match self.config.delay_mode {
            DelayMode::Immediate => {
                self.scheduler.set_slot_delay(key, new_delay);
                self.status(format_args!(
                    "Increase delay of slot {key} from {:?} to {new_delay:?}",
                    old_delay
                ));
            }
            DelayMode::OnResume => {
                delay.pending = Some(new_delay);
                self.status(format_args!(
                    "Delay of slot {key} goes up to {new_delay:?} on resume"
                ));
            }
        }
        true
    }

    fn apply_pending_delay(&self, state: &mut SlotState) {
        let Some(new_delay) = state.delay.pending.take() else {
            return;
        };
        if self.scheduler.slot_delay(&state.key).is_none() {
            log::warn!(
                "No slot found for key {}, dropping delay of {new_delay:?}",
                state.key
            );
            return;
        }
        self.scheduler.set_slot_delay(&state.key, new_delay);
        self.status(format_args!(
            "Increase delay of slot {} to {new_delay:?}",
            state.key
        ));
    }

    fn snapshot(state: &SlotState, unit: &PauseUnit) -> SlotSnapshot {
        SlotSnapshot {
            successes: state.success_count(),
            bans: state.ban_count(),
            delay_adjusted: state.delay_adjusted(),
            pending_delay: state.pending_delay(),
            current_pause: unit.current_pause(),
            pause_armed: unit.is_armed(),
        }
    }

    /// Log a pause or delay change, loudly unless verbosity is turned off
    fn status(&self, message: fmt::Arguments<'_>) {
        let level = if self.config.verbose {
            Level::Warn
        } else {
            Level::Debug
        };
        log::log!(level, "{message}");
    }
}
