use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReclaimError, Result};

pub const DEFAULT_ATTEMPTS: u32 = 2;
pub const DEFAULT_PARALLEL: usize = 4;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Frozen parameter set consumed by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReclaimConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Fixed pause between two erase attempts of the same target.
    #[serde(default = "default_backoff", with = "duration_ms")]
    pub backoff: Duration,
    /// How long in-flight workers may keep running after an interruption
    /// before they are aborted. `None` waits until a second signal.
    #[serde(default, with = "option_duration_ms")]
    pub shutdown_grace: Option<Duration>,
}

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_parallel() -> usize {
    DEFAULT_PARALLEL
}

fn default_backoff() -> Duration {
    DEFAULT_BACKOFF
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            attempts: DEFAULT_ATTEMPTS,
            parallel: DEFAULT_PARALLEL,
            backoff: DEFAULT_BACKOFF,
            shutdown_grace: None,
        }
    }
}

impl ReclaimConfig {
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(ReclaimError::InvalidConfig(
                "attempts must be at least 1".to_string(),
            ));
        }
        if self.parallel == 0 {
            return Err(ReclaimError::InvalidConfig(
                "parallel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ReclaimConfig;

    #[test]
    fn defaults_match_documented_values() {
        let config = ReclaimConfig::default();
        assert!(!config.dry_run);
        assert_eq!(config.attempts, 2);
        assert_eq!(config.parallel, 4);
        assert_eq!(config.backoff, Duration::from_secs(1));
        assert!(config.shutdown_grace.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_attempts_and_parallelism() {
        let config = ReclaimConfig {
            attempts: 0,
            ..ReclaimConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ReclaimConfig {
            parallel: 0,
            ..ReclaimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ReclaimConfig =
            serde_json::from_str(r#"{"dry_run": true, "shutdown_grace": 2500}"#).expect("parse");
        assert!(config.dry_run);
        assert_eq!(config.attempts, 2);
        assert_eq!(config.backoff, Duration::from_millis(1000));
        assert_eq!(config.shutdown_grace, Some(Duration::from_millis(2500)));
    }
}
