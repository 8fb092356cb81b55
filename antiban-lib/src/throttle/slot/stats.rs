use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::ser::SerializeStruct;

use super::SlotKey;

/// A [`HashMap`] mapping slots to their [`SlotStats`]
#[derive(Debug, Default, Serialize)]
pub struct SlotStatsMap(HashMap<SlotKey, SlotStats>);

impl SlotStatsMap {
    /// Sort slot statistics by ban count (descending order), so the most
    /// troublesome slots come first
    #[must_use]
    pub fn sorted(&self) -> Vec<(SlotKey, SlotStats)> {
        let mut sorted: Vec<_> = self.0.clone().into_iter().collect();
        sorted.sort_by(|(a_key, a), (b_key, b)| b.bans.cmp(&a.bans).then(a_key.cmp(b_key)));
        sorted
    }

    /// Statistics of a single slot
    #[must_use]
    pub fn get(&self, key: &SlotKey) -> Option<&SlotStats> {
        self.0.get(key)
    }

    /// Number of slots with statistics
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no slot has been observed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<SlotKey, SlotStats>> for SlotStatsMap {
    fn from(value: HashMap<SlotKey, SlotStats>) -> Self {
        Self(value)
    }
}

/// Lifetime statistics of one slot. Unlike the window counters these are
/// never reset.
#[derive(Debug, Clone, Default)]
pub struct SlotStats {
    /// Completions which were not banned
    pub successes: u64,
    /// Completions which were banned
    pub bans: u64,
    /// Pause timers armed because of bans on this slot
    pub pauses: u64,
    /// Times the slot delay was increased
    pub delay_increases: u64,
    /// Timestamp of the last successful completion
    pub last_success: Option<Instant>,
    /// Timestamp of the last banned completion
    pub last_ban: Option<Instant>,
}

impl SlotStats {
    pub(crate) fn record_success(&mut self) {
        self.successes += 1;
        self.last_success = Some(Instant::now());
    }

    pub(crate) fn record_ban(&mut self) {
        self.bans += 1;
        self.last_ban = Some(Instant::now());
    }

    pub(crate) const fn record_pause(&mut self) {
        self.pauses += 1;
    }

    pub(crate) const fn record_delay_increase(&mut self) {
        self.delay_increases += 1;
    }

    /// Total number of observed completions
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.successes + self.bans
    }

    /// Get ban rate (0.0 to 1.0)
    #[must_use]
    pub fn ban_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.bans as f64 / self.total() as f64;
        rate
    }

    /// Time since the last ban, if any
    #[must_use]
    pub fn since_last_ban(&self) -> Option<Duration> {
        self.last_ban.map(|at| at.elapsed())
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ban_pct = (self.ban_rate() * 100.0) as u64;
        format!(
            "{} completions ({}% banned), {} pauses, {} delay increases",
            self.total(),
            ban_pct,
            self.pauses,
            self.delay_increases
        )
    }
}

impl Serialize for SlotStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("SlotStats", 5)?;
        s.serialize_field("successes", &self.successes)?;
        s.serialize_field("bans", &self.bans)?;
        s.serialize_field("ban_rate", &self.ban_rate())?;
        s.serialize_field("pauses", &self.pauses)?;
        s.serialize_field("delay_increases", &self.delay_increases)?;
        s.end()
    }
}
