//! `antiban` slows a concurrent fetch pipeline down once remote services
//! start banning its requests.
//!
//! The pipeline reports every completed request as a [`CompletionEvent`]
//! and implements the [`Scheduler`](throttle::Scheduler) commands the
//! throttle issues: pausing and resuming dispatch and changing the delay of
//! single slots.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use antiban_lib::CompletionEvent;
//! use antiban_lib::throttle::{
//!     Scheduler, SlotKey, ThrottleConfig, ThrottleController, TokioTimer,
//! };
//!
//! #[derive(Debug)]
//! struct Engine;
//!
//! impl Scheduler for Engine {
//!     fn pause(&self) {}
//!     fn unpause(&self) {}
//!     fn slot_delay(&self, _key: &SlotKey) -> Option<Duration> {
//!         Some(Duration::from_secs(1))
//!     }
//!     fn set_slot_delay(&self, _key: &SlotKey, _delay: Duration) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = ThrottleController::new(
//!         ThrottleConfig::default(),
//!         Arc::new(Engine),
//!         Arc::new(TokioTimer::new()),
//!     );
//!
//!     controller.observe(&CompletionEvent::success("example.com"));
//!     controller.observe(&CompletionEvent::ban("example.com"));
//!     assert!(controller.is_paused());
//!
//!     controller.shutdown();
//!     assert!(!controller.is_paused());
//! }
//! ```
#![warn(missing_docs)]

pub mod throttle;
mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use types::{CompletionEvent, ErrorKind, Result};
