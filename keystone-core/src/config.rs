//! Configuration types

use crate::{ConfigError, KeystoneError, KeystoneResult};
use serde::{Deserialize, Serialize};

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct KeystoneConfig {
    /// Upper bound, in seconds, for tier grant and agreement durations
    pub max_grant_duration_secs: u64,
    /// Accept recovery ids 0/1 in addition to 27/28
    pub accept_raw_recovery_ids: bool,
    /// Number of records the in-memory event log retains
    pub event_log_capacity: usize,
}

impl Default for KeystoneConfig {
    fn default() -> Self {
        Self {
            // five years
            max_grant_duration_secs: 5 * 365 * 24 * 60 * 60,
            accept_raw_recovery_ids: true,
            event_log_capacity: 10_000,
        }
    }
}

impl KeystoneConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(KeystoneError::Config) if invalid.
    pub fn validate(&self) -> KeystoneResult<()> {
        if self.max_grant_duration_secs == 0 {
            return Err(KeystoneError::Config(ConfigError::InvalidValue {
                field: "max_grant_duration_secs".to_string(),
                value: self.max_grant_duration_secs.to_string(),
                reason: "max_grant_duration_secs must be greater than 0".to_string(),
            }));
        }

        // chrono durations are bounded by i64 milliseconds
        if self.max_grant_duration_secs > i64::MAX as u64 / 1000 {
            return Err(KeystoneError::Config(ConfigError::InvalidValue {
                field: "max_grant_duration_secs".to_string(),
                value: self.max_grant_duration_secs.to_string(),
                reason: "max_grant_duration_secs is out of range".to_string(),
            }));
        }

        if self.event_log_capacity == 0 {
            return Err(KeystoneError::Config(ConfigError::InvalidValue {
                field: "event_log_capacity".to_string(),
                value: self.event_log_capacity.to_string(),
                reason: "event_log_capacity must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `KEYSTONE_MAX_GRANT_DURATION_SECS`: Maximum grant duration (default: five years)
    /// - `KEYSTONE_ACCEPT_RAW_RECOVERY_IDS`: Accept v=0/1 signatures (default: true)
    /// - `KEYSTONE_EVENT_LOG_CAPACITY`: In-memory event log size (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_grant_duration_secs: std::env::var("KEYSTONE_MAX_GRANT_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_grant_duration_secs),
            accept_raw_recovery_ids: std::env::var("KEYSTONE_ACCEPT_RAW_RECOVERY_IDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.accept_raw_recovery_ids),
            event_log_capacity: std::env::var("KEYSTONE_EVENT_LOG_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_log_capacity),
        }
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> KeystoneResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| {
            KeystoneError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any positive in-range duration bound with a positive log capacity validates.
        #[test]
        fn prop_positive_values_validate(
            secs in 1u64..=1_000_000_000,
            capacity in 1usize..100_000,
            raw in any::<bool>(),
        ) {
            let config = KeystoneConfig {
                max_grant_duration_secs: secs,
                accept_raw_recovery_ids: raw,
                event_log_capacity: capacity,
            };
            prop_assert!(config.validate().is_ok());
        }
    }
}
