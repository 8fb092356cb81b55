//! Pure backoff arithmetic. Nothing in here touches shared state or the
//! scheduler, so every decision can be checked in isolation.

use std::time::Duration;

use crate::throttle::Window;

/// Computes pause durations and slot delays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base_pause: Duration,
    increase_ratio: f64,
    min_delay: Duration,
    max_pause: Option<Duration>,
}

impl BackoffPolicy {
    /// Create a policy. Values are expected to be sanitized already, see
    /// [`ThrottleConfig::sanitized`](crate::throttle::ThrottleConfig::sanitized).
    #[must_use]
    pub const fn new(
        base_pause: Duration,
        increase_ratio: f64,
        min_delay: Duration,
        max_pause: Option<Duration>,
    ) -> Self {
        Self {
            base_pause,
            increase_ratio,
            min_delay,
            max_pause,
        }
    }

    /// Pause duration of a fresh unit
    #[must_use]
    pub const fn base_pause(&self) -> Duration {
        self.base_pause
    }

    /// Pause duration for a ban which was just counted in `window`.
    ///
    /// Only the first ban of a window without any success escalates: the
    /// current duration grows by the increase ratio and is rounded down to
    /// whole seconds. Any later ban keeps the current duration, the running
    /// pause is merely extended. The result never drops below the base
    /// pause and never exceeds the configured maximum.
    #[must_use]
    pub fn next_pause_duration(&self, window: Window, current: Duration) -> Duration {
        let current = current.max(self.base_pause);
        let next = if window.successes == 0 && window.bans == 1 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let secs = (current.as_secs_f64() * self.increase_ratio).floor() as u64;
            Duration::from_secs(secs).max(current)
        } else {
            current
        };
        match self.max_pause {
            Some(max_pause) => next.min(max_pause),
            None => next,
        }
    }

    /// The delay replacing `old_delay` on a slot that shows both successes
    /// and bans: `max(min_delay, old_delay) * increase_ratio`, saturating at
    /// [`Duration::MAX`]
    #[must_use]
    pub fn next_slot_delay(&self, old_delay: Duration) -> Duration {
        let secs = old_delay.max(self.min_delay).as_secs_f64() * self.increase_ratio;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
