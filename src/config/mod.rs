//! Configuration management.
//!
//! This module handles:
//! - Default values for every tuning option
//! - Environment variable loading (`TTL_TUNER_*`)
//! - Opt-in range validation
//!
//! The engine itself never rejects a configuration. Call [`validate_config`]
//! when loading settings from an untrusted source.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ttl_tuner::config::TunerConfig;
//!
//! let config = TunerConfig {
//!     base_ttl: Duration::from_secs(120),
//!     min_accesses_for_tuning: 5,
//!     ..TunerConfig::default()
//! };
//!
//! assert_eq!(config.max_tracked_entries, 10_000);
//! assert!(config.enable_auto_tuning);
//! ```

mod validation;

pub use validation::validate_config;

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default lower clamp bound (1 minute).
pub const DEFAULT_MIN_TTL: Duration = Duration::from_secs(60);

/// Default upper clamp bound (24 hours).
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default TTL used before enough data exists (5 minutes).
pub const DEFAULT_BASE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default hit rate the algorithms optimize toward.
pub const DEFAULT_TARGET_HIT_RATE: f64 = 0.8;

/// Default cold-start threshold.
pub const DEFAULT_MIN_ACCESSES_FOR_TUNING: u64 = 10;

/// Default adaptive increase multiplier.
pub const DEFAULT_TTL_INCREASE_MULTIPLIER: f64 = 1.2;

/// Default adaptive decrease multiplier.
pub const DEFAULT_TTL_DECREASE_MULTIPLIER: f64 = 0.8;

/// Default weight of cost in TTL adjustment.
pub const DEFAULT_COST_SENSITIVITY: f64 = 0.1;

/// Default cleanup cadence (1 hour).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default staleness threshold (24 hours).
pub const DEFAULT_RETENTION_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Default hard cap on tracked keys.
pub const DEFAULT_MAX_TRACKED_ENTRIES: usize = 10_000;

/// Default capacity of the host event queue.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Which tuning algorithm the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Deterministic hit-rate/frequency/cost heuristic.
    #[default]
    Adaptive,
    /// Epsilon-greedy single-step Q-learning.
    ReinforcementLearning,
}

impl std::str::FromStr for AlgorithmKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "adaptive" => Ok(Self::Adaptive),
            "reinforcement_learning" | "rl" => Ok(Self::ReinforcementLearning),
            other => Err(ConfigError::InvalidValue {
                var: "TTL_TUNER_ALGORITHM".into(),
                reason: format!("unknown algorithm '{other}'"),
            }),
        }
    }
}

/// Tuning configuration.
///
/// All fields have defaults (see [`TunerConfig::default`]). Durations are
/// serialized as `{ secs, nanos }` by serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Hard lower clamp bound for any recommendation.
    pub min_ttl: Duration,
    /// Hard upper clamp bound for any recommendation.
    pub max_ttl: Duration,
    /// TTL used before enough data exists.
    pub base_ttl: Duration,
    /// The hit rate the algorithms optimize toward.
    pub target_hit_rate: f64,
    /// Cold-start threshold on total accesses.
    pub min_accesses_for_tuning: u64,
    /// Adaptive algorithm response strength when above target.
    pub ttl_increase_multiplier: f64,
    /// Adaptive algorithm response strength when below target.
    pub ttl_decrease_multiplier: f64,
    /// Weight of cost in TTL adjustment.
    pub cost_sensitivity: f64,
    /// Cleanup cadence.
    pub metrics_cleanup_interval: Duration,
    /// Staleness threshold for eviction.
    pub metrics_retention_period: Duration,
    /// Master switch for recommendations.
    pub enable_auto_tuning: bool,
    /// Master switch for cost-driven adjustment.
    pub enable_cost_awareness: bool,
    /// Hard cap on concurrently tracked keys.
    pub max_tracked_entries: usize,
    /// Algorithm the engine runs.
    pub algorithm: AlgorithmKind,
    /// Fixed seed for the reinforcement-learning random source.
    pub rl_seed: Option<u64>,
    /// Capacity of the queue between host notifications and the background task.
    pub event_channel_capacity: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            min_ttl: DEFAULT_MIN_TTL,
            max_ttl: DEFAULT_MAX_TTL,
            base_ttl: DEFAULT_BASE_TTL,
            target_hit_rate: DEFAULT_TARGET_HIT_RATE,
            min_accesses_for_tuning: DEFAULT_MIN_ACCESSES_FOR_TUNING,
            ttl_increase_multiplier: DEFAULT_TTL_INCREASE_MULTIPLIER,
            ttl_decrease_multiplier: DEFAULT_TTL_DECREASE_MULTIPLIER,
            cost_sensitivity: DEFAULT_COST_SENSITIVITY,
            metrics_cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            metrics_retention_period: DEFAULT_RETENTION_PERIOD,
            enable_auto_tuning: true,
            enable_cost_awareness: true,
            max_tracked_entries: DEFAULT_MAX_TRACKED_ENTRIES,
            algorithm: AlgorithmKind::Adaptive,
            rl_seed: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl TunerConfig {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset variables keep their default:
    /// - `TTL_TUNER_MIN_TTL_SECS`, `TTL_TUNER_MAX_TTL_SECS`, `TTL_TUNER_BASE_TTL_SECS`
    /// - `TTL_TUNER_TARGET_HIT_RATE`
    /// - `TTL_TUNER_MIN_ACCESSES`
    /// - `TTL_TUNER_INCREASE_MULTIPLIER`, `TTL_TUNER_DECREASE_MULTIPLIER`
    /// - `TTL_TUNER_COST_SENSITIVITY`
    /// - `TTL_TUNER_CLEANUP_INTERVAL_SECS`, `TTL_TUNER_RETENTION_SECS`
    /// - `TTL_TUNER_AUTO_TUNING`, `TTL_TUNER_COST_AWARENESS` (`true`/`false`)
    /// - `TTL_TUNER_MAX_TRACKED_ENTRIES`
    /// - `TTL_TUNER_ALGORITHM` (`adaptive` or `reinforcement_learning`)
    /// - `TTL_TUNER_RL_SEED`
    /// - `TTL_TUNER_EVENT_CHANNEL_CAPACITY`
    ///
    /// A `.env` file is loaded first if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but cannot be
    /// parsed. Ranges are not checked here; see [`validate_config`].
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let algorithm = match env::var("TTL_TUNER_ALGORITHM") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.algorithm,
        };

        let rl_seed = match env::var("TTL_TUNER_RL_SEED") {
            Ok(value) => Some(value.parse().map_err(|_| ConfigError::InvalidValue {
                var: "TTL_TUNER_RL_SEED".into(),
                reason: "must be a non-negative integer".into(),
            })?),
            Err(_) => None,
        };

        Ok(Self {
            min_ttl: parse_env_secs("TTL_TUNER_MIN_TTL_SECS", defaults.min_ttl)?,
            max_ttl: parse_env_secs("TTL_TUNER_MAX_TTL_SECS", defaults.max_ttl)?,
            base_ttl: parse_env_secs("TTL_TUNER_BASE_TTL_SECS", defaults.base_ttl)?,
            target_hit_rate: parse_env_f64("TTL_TUNER_TARGET_HIT_RATE", defaults.target_hit_rate)?,
            min_accesses_for_tuning: parse_env_u64(
                "TTL_TUNER_MIN_ACCESSES",
                defaults.min_accesses_for_tuning,
            )?,
            ttl_increase_multiplier: parse_env_f64(
                "TTL_TUNER_INCREASE_MULTIPLIER",
                defaults.ttl_increase_multiplier,
            )?,
            ttl_decrease_multiplier: parse_env_f64(
                "TTL_TUNER_DECREASE_MULTIPLIER",
                defaults.ttl_decrease_multiplier,
            )?,
            cost_sensitivity: parse_env_f64(
                "TTL_TUNER_COST_SENSITIVITY",
                defaults.cost_sensitivity,
            )?,
            metrics_cleanup_interval: parse_env_secs(
                "TTL_TUNER_CLEANUP_INTERVAL_SECS",
                defaults.metrics_cleanup_interval,
            )?,
            metrics_retention_period: parse_env_secs(
                "TTL_TUNER_RETENTION_SECS",
                defaults.metrics_retention_period,
            )?,
            enable_auto_tuning: parse_env_bool("TTL_TUNER_AUTO_TUNING", defaults.enable_auto_tuning)?,
            enable_cost_awareness: parse_env_bool(
                "TTL_TUNER_COST_AWARENESS",
                defaults.enable_cost_awareness,
            )?,
            max_tracked_entries: parse_env_usize(
                "TTL_TUNER_MAX_TRACKED_ENTRIES",
                defaults.max_tracked_entries,
            )?,
            algorithm,
            rl_seed,
            event_channel_capacity: parse_env_usize(
                "TTL_TUNER_EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            )?,
        })
    }
}

/// Parse an environment variable as whole seconds, using a default if not set.
fn parse_env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_env_u64(name, default.as_secs()).map(Duration::from_secs)
}

/// Parse an environment variable as u64, using a default if not set.
fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a non-negative integer".into(),
        })
    })
}

/// Parse an environment variable as usize, using a default if not set.
fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a non-negative integer".into(),
        })
    })
}

/// Parse an environment variable as f64, using a default if not set.
fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    env::var(name).map_or(Ok(default), |val| {
        val.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ConfigError::InvalidValue {
                var: name.into(),
                reason: "must be a finite number".into(),
            })
    })
}

/// Parse an environment variable as a boolean, using a default if not set.
fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    env::var(name).map_or(Ok(default), |val| {
        match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: name.into(),
                reason: "must be true or false".into(),
            }),
        }
    })
}
