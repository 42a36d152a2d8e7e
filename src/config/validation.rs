//! Configuration validation.
//!
//! Opt-in range checks for a [`TunerConfig`]. The engine accepts any
//! configuration; hosts that load settings from files or the environment
//! should run [`validate_config`] first.

use super::TunerConfig;
use crate::error::ConfigError;

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `min_ttl` must not exceed `max_ttl`
/// - `base_ttl` must lie within `[min_ttl, max_ttl]`
/// - `target_hit_rate` must be in `[0, 1]`
/// - both TTL multipliers must be positive
/// - `cost_sensitivity` must not be negative
/// - `metrics_cleanup_interval`, `max_tracked_entries` and
///   `event_channel_capacity` must be non-zero
pub fn validate_config(config: &TunerConfig) -> Result<(), ConfigError> {
    if config.min_ttl > config.max_ttl {
        return Err(invalid("min_ttl", "must not exceed max_ttl"));
    }

    if config.base_ttl < config.min_ttl || config.base_ttl > config.max_ttl {
        return Err(invalid("base_ttl", "must be between min_ttl and max_ttl"));
    }

    if !(0.0..=1.0).contains(&config.target_hit_rate) {
        return Err(invalid("target_hit_rate", "must be between 0 and 1"));
    }

    if config.ttl_increase_multiplier <= 0.0 {
        return Err(invalid("ttl_increase_multiplier", "must be positive"));
    }

    if config.ttl_decrease_multiplier <= 0.0 {
        return Err(invalid("ttl_decrease_multiplier", "must be positive"));
    }

    if config.cost_sensitivity < 0.0 {
        return Err(invalid("cost_sensitivity", "must not be negative"));
    }

    if config.metrics_cleanup_interval.is_zero() {
        return Err(invalid("metrics_cleanup_interval", "must be non-zero"));
    }

    if config.max_tracked_entries == 0 {
        return Err(invalid("max_tracked_entries", "must be non-zero"));
    }

    if config.event_channel_capacity == 0 {
        return Err(invalid("event_channel_capacity", "must be non-zero"));
    }

    Ok(())
}

fn invalid(var: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn assert_invalid(config: &TunerConfig, expected_var: &str) {
        let err = validate_config(config).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidValue { var, .. } if var == expected_var),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TunerConfig::default()).is_ok());
    }

    #[test]
    fn test_min_above_max() {
        let config = TunerConfig {
            min_ttl: Duration::from_secs(100),
            max_ttl: Duration::from_secs(10),
            ..TunerConfig::default()
        };
        assert_invalid(&config, "min_ttl");
    }

    #[test]
    fn test_base_outside_bounds() {
        let config = TunerConfig {
            base_ttl: Duration::from_secs(1),
            ..TunerConfig::default()
        };
        assert_invalid(&config, "base_ttl");
    }

    #[test]
    fn test_target_hit_rate_out_of_range() {
        let config = TunerConfig {
            target_hit_rate: 1.5,
            ..TunerConfig::default()
        };
        assert_invalid(&config, "target_hit_rate");
    }

    #[test]
    fn test_non_positive_multipliers() {
        let config = TunerConfig {
            ttl_decrease_multiplier: 0.0,
            ..TunerConfig::default()
        };
        assert_invalid(&config, "ttl_decrease_multiplier");

        let config = TunerConfig {
            ttl_increase_multiplier: -1.0,
            ..TunerConfig::default()
        };
        assert_invalid(&config, "ttl_increase_multiplier");
    }

    #[test]
    fn test_negative_cost_sensitivity() {
        let config = TunerConfig {
            cost_sensitivity: -0.1,
            ..TunerConfig::default()
        };
        assert_invalid(&config, "cost_sensitivity");
    }

    #[test]
    fn test_zero_capacity() {
        let config = TunerConfig {
            max_tracked_entries: 0,
            ..TunerConfig::default()
        };
        assert_invalid(&config, "max_tracked_entries");
    }

    #[test]
    fn test_zero_cleanup_interval() {
        let config = TunerConfig {
            metrics_cleanup_interval: Duration::ZERO,
            ..TunerConfig::default()
        };
        assert_invalid(&config, "metrics_cleanup_interval");
    }
}
