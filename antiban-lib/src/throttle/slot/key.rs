use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// Identifies one independently rate-limited slot of the fetch pipeline.
///
/// Slots are usually keyed by the destination host. Keys are normalised to
/// lowercase so that `Example.com` and `example.com` share one slot.
///
/// # Examples
///
/// ```
/// use antiban_lib::throttle::SlotKey;
/// use url::Url;
///
/// let url = Url::parse("https://API.example.com/items?page=2").unwrap();
/// let key = SlotKey::try_from(&url).unwrap();
/// assert_eq!(key.as_str(), "api.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct SlotKey(String);

impl SlotKey {
    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the key as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether the key is empty. Empty keys are never observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&Url> for SlotKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;
        Ok(SlotKey(host.to_lowercase()))
    }
}

impl TryFrom<Url> for SlotKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        SlotKey::try_from(&url)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SlotKey {
    type Err = ErrorKind;

    /// Parse a non-empty key, surrounding whitespace is dropped
    fn from_str(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ErrorKind::EmptySlotKey);
        }
        Ok(SlotKey(key.to_lowercase()))
    }
}

impl From<String> for SlotKey {
    fn from(key: String) -> Self {
        SlotKey(key.to_lowercase())
    }
}

impl From<&str> for SlotKey {
    fn from(key: &str) -> Self {
        SlotKey(key.to_lowercase())
    }
}

impl From<&SlotKey> for SlotKey {
    fn from(key: &SlotKey) -> Self {
        key.clone()
    }
}
