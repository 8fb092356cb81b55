use std::fmt;

use url::Url;

use crate::throttle::SlotKey;
use crate::types::Result;

/// The outcome of one completed request, as seen by the throttle.
///
/// The pipeline decides upstream whether a response was banned; the
/// throttle only needs the slot the request went through and that flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompletionEvent {
    /// Slot the request was dispatched through
    pub slot: SlotKey,
    /// Whether the remote service rejected the request
    pub banned: bool,
}

impl CompletionEvent {
    /// Create a new event for the given slot
    #[must_use]
    pub fn new<K: Into<SlotKey>>(slot: K, banned: bool) -> Self {
        Self {
            slot: slot.into(),
            banned,
        }
    }

    /// A request through `slot` which completed normally
    #[must_use]
    pub fn success<K: Into<SlotKey>>(slot: K) -> Self {
        Self::new(slot, false)
    }

    /// A request through `slot` which was rejected by the remote service
    #[must_use]
    pub fn ban<K: Into<SlotKey>>(slot: K) -> Self {
        Self::new(slot, true)
    }

    /// Create an event keyed by the host of the request URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host
    pub fn from_url(url: &Url, banned: bool) -> Result<Self> {
        Ok(Self {
            slot: SlotKey::try_from(url)?,
            banned,
        })
    }
}

impl fmt::Display for CompletionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.banned { "banned" } else { "ok" };
        write!(f, "{} [{outcome}]", self.slot)
    }
}
