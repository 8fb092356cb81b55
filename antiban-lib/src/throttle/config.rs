use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};
use typed_builder::TypedBuilder;

use crate::throttle::BackoffPolicy;
use crate::types::Result;

/// Default pause of the first pause cycle, before escalation
pub const DEFAULT_BASE_PAUSE: Duration = Duration::from_secs(60);

/// Default growth factor for pause durations and slot delays
pub const DEFAULT_INCREASE_RATIO: f64 = 1.5;

/// Default lower bound of a slot delay before it gets multiplied
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(100);

/// What gets paused when a ban is observed
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PauseScope {
    /// A ban on any slot pauses dispatch for the whole pipeline
    #[default]
    Pipeline,
    /// A ban only pauses the slot it was observed on
    Slot,
}

/// When an increased slot delay is handed to the scheduler
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DelayMode {
    /// As soon as a window shows both successes and bans
    #[default]
    Immediate,
    /// Once the unit covering the slot resumes
    OnResume,
}

/// Throttle configuration, read once when the controller is built.
///
/// Can be deserialized from TOML:
///
/// ```
/// use antiban_lib::throttle::{PauseScope, ThrottleConfig};
/// use std::time::Duration;
///
/// let config = ThrottleConfig::from_toml(r#"
///     pause_scope = "slot"
///     base_pause = "30s"
///     max_pause = "10m"
/// "#).unwrap();
/// assert_eq!(config.pause_scope, PauseScope::Slot);
/// assert_eq!(config.base_pause, Duration::from_secs(30));
/// assert_eq!(config.increase_ratio, 1.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(deny_unknown_fields)]
#[builder(field_defaults(setter(into)))]
pub struct ThrottleConfig {
    /// Whether bans pause the whole pipeline or a single slot
    #[serde(default)]
    #[builder(default)]
    pub pause_scope: PauseScope,

    /// Pause duration before any escalation
    #[serde(default = "default_base_pause", with = "humantime_serde")]
    #[builder(default = DEFAULT_BASE_PAUSE)]
    pub base_pause: Duration,

    /// Growth factor applied to pause durations and slot delays
    #[serde(default = "default_increase_ratio")]
    #[builder(default = DEFAULT_INCREASE_RATIO)]
    pub increase_ratio: f64,

    /// Slot delays below this value are raised to it before growing
    #[serde(default = "default_min_delay", with = "humantime_serde")]
    #[builder(default = DEFAULT_MIN_DELAY)]
    pub min_delay: Duration,

    /// Upper bound for escalated pauses. Unbounded when unset.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    #[builder(default)]
    pub max_pause: Option<Duration>,

    /// When increased slot delays are applied
    #[serde(default)]
    #[builder(default)]
    pub delay_mode: DelayMode,

    /// Log pause and delay changes at warn level instead of debug
    #[serde(default = "default_verbose")]
    #[builder(default = true)]
    pub verbose: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

const fn default_base_pause() -> Duration {
    DEFAULT_BASE_PAUSE
}

const fn default_increase_ratio() -> f64 {
    DEFAULT_INCREASE_RATIO
}

const fn default_min_delay() -> Duration {
    DEFAULT_MIN_DELAY
}

const fn default_verbose() -> bool {
    true
}

impl ThrottleConfig {
    /// Parse a configuration from TOML. Missing fields use their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid TOML or contains unknown
    /// fields or malformed durations
    pub fn from_toml(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Replace values which would break the throttle with their defaults.
    ///
    /// Completion processing must never fail because of a bad setting, so
    /// nothing here is an error; each correction is logged instead.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if self.base_pause.is_zero() {
            log::warn!(
                "Base pause must not be zero, using {}s",
                DEFAULT_BASE_PAUSE.as_secs()
            );
            self.base_pause = DEFAULT_BASE_PAUSE;
        }
        if self.min_delay.is_zero() {
            log::warn!(
                "Minimum slot delay must not be zero, using {}ms",
                DEFAULT_MIN_DELAY.as_millis()
            );
            self.min_delay = DEFAULT_MIN_DELAY;
        }
        if !self.increase_ratio.is_finite() || self.increase_ratio < 1.0 {
            log::warn!(
                "Invalid increase ratio {}, using {DEFAULT_INCREASE_RATIO}",
                self.increase_ratio
            );
            self.increase_ratio = DEFAULT_INCREASE_RATIO;
        }
        if let Some(max_pause) = self.max_pause
            && max_pause < self.base_pause
        {
            log::warn!(
                "Maximum pause {}s is below the base pause, capping at {}s",
                max_pause.as_secs_f64(),
                self.base_pause.as_secs_f64()
            );
            self.max_pause = Some(self.base_pause);
        }
        self
    }

    /// The backoff policy described by this configuration
    #[must_use]
    pub const fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.base_pause,
            self.increase_ratio,
            self.min_delay,
            self.max_pause,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::str::FromStr;

    #[test]
    fn test_default_config() {
        let config = ThrottleConfig::default();
        assert_eq!(config.pause_scope, PauseScope::Pipeline);
        assert_eq!(config.base_pause, Duration::from_secs(60));
        assert!((config.increase_ratio - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.min_delay, Duration::from_millis(100));
        assert_eq!(config.max_pause, None);
        assert_eq!(config.delay_mode, DelayMode::Immediate);
        assert!(config.verbose);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ThrottleConfig::builder()
            .pause_scope(PauseScope::Slot)
            .base_pause(Duration::from_secs(5))
            .max_pause(Duration::from_secs(120))
            .verbose(false)
            .build();

        assert_eq!(config.pause_scope, PauseScope::Slot);
        assert_eq!(config.base_pause, Duration::from_secs(5));
        assert_eq!(config.max_pause, Some(Duration::from_secs(120)));
        assert!(!config.verbose);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            ThrottleConfig::from_toml("").unwrap(),
            ThrottleConfig::default()
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = ThrottleConfig::builder()
            .delay_mode(DelayMode::OnResume)
            .min_delay(Duration::from_millis(250))
            .max_pause(Duration::from_secs(600))
            .build();

        let toml = toml::to_string(&config).unwrap();
        let deserialized = ThrottleConfig::from_toml(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(matches!(
            ThrottleConfig::from_toml("pause_duration = \"5s\""),
            Err(crate::ErrorKind::ConfigParse(_))
        ));
    }

    #[rstest]
    #[case("pipeline", PauseScope::Pipeline)]
    #[case("slot", PauseScope::Slot)]
    fn test_pause_scope_from_str(#[case] input: &str, #[case] expected: PauseScope) {
        assert_eq!(PauseScope::from_str(input).unwrap(), expected);
        assert_eq!(expected.to_string(), input);
    }

    #[test]
    fn test_delay_mode_from_str() {
        assert_eq!(DelayMode::from_str("on_resume").unwrap(), DelayMode::OnResume);
        assert!(DelayMode::from_str("later").is_err());
    }

    #[rstest]
    #[case(Duration::ZERO, 1.5, Duration::from_millis(100), DEFAULT_BASE_PAUSE, 1.5, Duration::from_millis(100))]
    #[case(Duration::from_secs(10), 0.5, Duration::ZERO, Duration::from_secs(10), DEFAULT_INCREASE_RATIO, DEFAULT_MIN_DELAY)]
    #[case(Duration::from_secs(10), f64::NAN, Duration::from_secs(1), Duration::from_secs(10), DEFAULT_INCREASE_RATIO, Duration::from_secs(1))]
    #[case(Duration::from_secs(10), 1.0, Duration::from_secs(1), Duration::from_secs(10), 1.0, Duration::from_secs(1))]
    fn test_sanitized(
        #[case] base_pause: Duration,
        #[case] increase_ratio: f64,
        #[case] min_delay: Duration,
        #[case] expected_base: Duration,
        #[case] expected_ratio: f64,
        #[case] expected_min_delay: Duration,
    ) {
        let config = ThrottleConfig::builder()
            .base_pause(base_pause)
            .increase_ratio(increase_ratio)
            .min_delay(min_delay)
            .build()
            .sanitized();

        assert_eq!(config.base_pause, expected_base);
        assert!((config.increase_ratio - expected_ratio).abs() < f64::EPSILON);
        assert_eq!(config.min_delay, expected_min_delay);
    }

    #[test]
    fn test_max_pause_below_base_is_raised() {
        let config = ThrottleConfig::builder()
            .base_pause(Duration::from_secs(60))
            .max_pause(Duration::from_secs(30))
            .build()
            .sanitized();
        assert_eq!(config.max_pause, Some(Duration::from_secs(60)));
    }
}
