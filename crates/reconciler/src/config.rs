//! Reconciler configuration.

use std::fmt;
use std::time::Duration;

use logset_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Identifier range reserved for a cluster's initial members.
///
/// Members identify each other by these identifiers, so the range is recorded
/// once per cluster at creation and never reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    /// First identifier, inclusive.
    pub start: u64,
    /// Last identifier, exclusive.
    pub end: u64,
}

impl IdRange {
    /// `[131072, 262144)`.
    pub const DEFAULT: Self = Self {
        start: 131_072,
        end: 262_144,
    };

    /// Create a range, rejecting empty or inverted bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `start >= end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] when `start >= end`.
    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(Error::config(format!(
                "id range [{}, {}) is empty",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn contains(&self, id: u64) -> bool {
        id >= self.start && id < self.end
    }

    /// The first `count` identifiers of the range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpec`] when the range cannot hold `count` members.
    pub fn allocate(&self, count: usize) -> Result<Vec<u64>> {
        let wanted = u64::try_from(count).map_err(|e| Error::invalid_spec(e.to_string()))?;
        if wanted > self.len() {
            return Err(Error::invalid_spec(format!(
                "cannot allocate {count} ids from range {self}"
            )));
        }
        Ok((self.start..self.end).take(count).collect())
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconcilerConfig {
    /// How long a store may stay not-ready before it counts as failed.
    #[serde(with = "duration_secs", default = "default_store_failure_timeout")]
    pub store_failure_timeout: Duration,

    /// Requeue delay after a pass that found nothing to do.
    #[serde(with = "duration_secs", default = "default_resync_interval")]
    pub resync_interval: Duration,

    /// Requeue delay after a pass that took an action.
    #[serde(with = "duration_secs", default = "default_action_requeue")]
    pub action_requeue: Duration,

    /// Bootstrap identifier range injected into the create path.
    #[serde(default)]
    pub id_range: IdRange,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            store_failure_timeout: default_store_failure_timeout(),
            resync_interval: default_resync_interval(),
            action_requeue: default_action_requeue(),
            id_range: IdRange::DEFAULT,
        }
    }
}

impl ReconcilerConfig {
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty id range or a zero requeue delay.
    pub fn validate(&self) -> Result<()> {
        self.id_range.validate()?;
        if self.resync_interval.is_zero() || self.action_requeue.is_zero() {
            return Err(Error::config("requeue delays must be non-zero"));
        }
        Ok(())
    }

    #[must_use]
    pub const fn store_failure_timeout(mut self, timeout: Duration) -> Self {
        self.store_failure_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn id_range(mut self, range: IdRange) -> Self {
        self.id_range = range;
        self
    }
}

const fn default_store_failure_timeout() -> Duration {
    Duration::from_secs(600)
}

const fn default_resync_interval() -> Duration {
    Duration::from_secs(300)
}

const fn default_action_requeue() -> Duration {
    Duration::from_secs(5)
}

/// Serialization helper for Duration as seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range() {
        let range = IdRange::default();
        assert_eq!(range.start, 131_072);
        assert_eq!(range.end, 262_144);
        assert_eq!(range.to_string(), "131072-262144");
        assert!(range.contains(131_072));
        assert!(!range.contains(262_144));
    }

    #[test]
    fn test_allocate_takes_from_start() {
        let ids = IdRange::DEFAULT.allocate(3).unwrap_or_default();
        assert_eq!(ids, vec![131_072, 131_073, 131_074]);
    }

    #[test]
    fn test_allocate_rejects_overflow() {
        let range = IdRange::new(10, 12);
        assert!(range.is_ok());
        assert!(range.map(|r| r.allocate(3).is_err()).unwrap_or(false));
    }

    #[test]
    fn test_empty_range_rejected() {
        assert!(IdRange::new(5, 5).is_err());
    }

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: ReconcilerConfig = toml::from_str("").unwrap_or_else(|_| ReconcilerConfig {
            resync_interval: Duration::ZERO,
            ..ReconcilerConfig::default()
        });
        assert_eq!(config, ReconcilerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parses_seconds() {
        let parsed: std::result::Result<ReconcilerConfig, _> = toml::from_str(
            r"
store-failure-timeout = 30
id-range = { start = 1, end = 100 }
",
        );
        let config = parsed.ok();
        assert_eq!(
            config.as_ref().map(|c| c.store_failure_timeout),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.map(|c| c.id_range.end), Some(100));
    }
}
