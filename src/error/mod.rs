//! Error types for the TTL tuner.
//!
//! This module defines a small hierarchical error system:
//! - [`TunerError`]: Top-level error returned by fallible public operations
//!   (configuration loading and engine lifecycle)
//! - [`ConfigError`]: Configuration loading and validation errors
//! - [`AlgorithmError`]: Failures while computing a TTL recommendation
//! - [`LifecycleError`]: Engine start/stop misuse
//!
//! All errors implement `Send + Sync` so they can cross task boundaries.
//!
//! Algorithm errors never escape [`TuningEngine::get_recommended_ttl`]; they are
//! logged and reported as "no recommendation".
//!
//! [`TuningEngine::get_recommended_ttl`]: crate::engine::TuningEngine::get_recommended_ttl

use thiserror::Error;

/// Top-level tuner error.
#[derive(Debug, Error)]
pub enum TunerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Lifecycle error.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Errors raised by a [`TuningAlgorithm`](crate::tuning::TuningAlgorithm).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlgorithmError {
    /// The computed TTL was NaN or infinite.
    #[error("Non-finite TTL computed for {key}: {value}")]
    NonFiniteTtl {
        /// The cache key being tuned.
        key: String,
        /// The offending value in seconds.
        value: f64,
    },
}

/// Engine lifecycle errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `start` was called on an engine that is already running.
    #[error("Tuning engine is already running")]
    AlreadyRunning,

    /// `start` was called outside of a Tokio runtime.
    #[error("No Tokio runtime available to spawn the background task")]
    NoRuntime,
}
