//! Engine configuration.
//!
//! Durations are expressed in seconds so TOML files stay readable; the
//! engine works in milliseconds and converts through the `*_ms` accessors.

use crate::errors::{VigilError, VigilResult};
use crate::time::SECOND_MS;
use serde::{Deserialize, Serialize};

const DAY_SECS: u64 = 24 * 60 * 60;

/// Tunables for liveness tracking and recovery gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Check-in interval applied to new vaults unless they specify their own.
    pub check_in_interval_secs: u64,
    /// Grace period after the due instant before a vault counts as overdue.
    pub grace_period_secs: u64,
    /// How long before the due instant a vault enters `warning`.
    pub warning_lead_secs: u64,
    /// Delay between trigger and earliest completion; the owner may cancel inside it.
    pub time_lock_secs: u64,
    /// Attestor approvals required on top of the guardian threshold.
    pub required_attestors: usize,
    /// Minimum confidence for biometric fallback check-ins.
    pub min_biometric_confidence: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_in_interval_secs: 90 * DAY_SECS,
            grace_period_secs: 0,
            warning_lead_secs: 7 * DAY_SECS,
            time_lock_secs: 7 * DAY_SECS,
            required_attestors: 2,
            min_biometric_confidence: 0.8,
        }
    }
}

impl EngineConfig {
    /// Reject settings that would make the state machine degenerate.
    pub fn validate(&self) -> VigilResult<()> {
        if self.check_in_interval_secs == 0 {
            return Err(VigilError::invalid("check_in_interval_secs must be positive"));
        }
        if self.time_lock_secs == 0 {
            return Err(VigilError::invalid("time_lock_secs must be positive"));
        }
        if self.warning_lead_secs >= self.check_in_interval_secs {
            return Err(VigilError::invalid(
                "warning_lead_secs must be shorter than check_in_interval_secs",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_biometric_confidence) {
            return Err(VigilError::invalid(
                "min_biometric_confidence must lie within 0.0..=1.0",
            ));
        }
        Ok(())
    }

    pub fn check_in_interval_ms(&self) -> u64 {
        self.check_in_interval_secs.saturating_mul(SECOND_MS)
    }

    pub fn grace_period_ms(&self) -> u64 {
        self.grace_period_secs.saturating_mul(SECOND_MS)
    }

    pub fn warning_lead_ms(&self) -> u64 {
        self.warning_lead_secs.saturating_mul(SECOND_MS)
    }

    pub fn time_lock_ms(&self) -> u64 {
        self.time_lock_secs.saturating_mul(SECOND_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.time_lock_ms(), 7 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn rejects_zero_time_lock() {
        let config = EngineConfig {
            time_lock_secs: 0,
            ..EngineConfig::default()
        };
        assert_matches!(config.validate(), Err(VigilError::Invalid { .. }));
    }

    #[test]
    fn rejects_warning_longer_than_interval() {
        let config = EngineConfig {
            check_in_interval_secs: 10,
            warning_lead_secs: 10,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        let config = EngineConfig {
            min_biometric_confidence: 1.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"time_lock_secs": 60, "required_attestors": 0}"#).unwrap();
        assert_eq!(config.time_lock_secs, 60);
        assert_eq!(config.required_attestors, 0);
        assert_eq!(config.check_in_interval_secs, 90 * DAY_SECS);
    }
}
