//! Ban-driven pausing and per-slot slow-down.
//!
//! This module watches the completions of a fetch pipeline and reacts when
//! remote services start rejecting requests. A ban pauses dispatch for a
//! while, with pauses growing if bans recur right after resuming. A window
//! with both successes and bans on a slot raises that slot's request delay.
//!
//! # Architecture
//!
//! - [`SlotKey`]: Identifies an independently rate-limited channel, usually a host
//! - [`SlotState`]: Window counters, delay gate and statistics of one slot
//! - [`SlotRegistry`]: Lazily creates and owns the state of every slot
//! - [`BackoffPolicy`]: Pure computation of pause durations and slot delays
//! - [`ThrottleController`]: Consumes completion events and drives the [`Scheduler`]
//! - [`Timer`]: The pause/resume clock, [`TokioTimer`] by default
//! - [`ThrottleConfig`]: Configuration, read once by the controller

mod config;
mod controller;
mod policy;
mod registry;
mod scheduler;
mod slot;
mod timer;

pub use config::{
    DEFAULT_BASE_PAUSE, DEFAULT_INCREASE_RATIO, DEFAULT_MIN_DELAY, DelayMode, PauseScope,
    ThrottleConfig,
};
pub use controller::{SlotSnapshot, ThrottleController};
pub use policy::BackoffPolicy;
pub use registry::{SharedSlotState, SlotRegistry};
pub use scheduler::Scheduler;
pub use slot::{PauseUnit, SlotKey, SlotState, SlotStats, SlotStatsMap, Window};
pub use timer::{Timer, TimerCallback, TimerError, TimerHandle, TokioTimer};
