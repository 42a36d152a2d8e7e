//! TTL Tuner
//!
//! Adaptive per-key cache TTL tuning. A host cache reports hits, misses and
//! factory executions; the tuner keeps per-key statistics and recommends a
//! time-to-live for each key based on hit rate, access frequency and the
//! cost of recomputing the value.
//!
//! # Features
//!
//! - Per-key hit/miss counters, decayed failure rate, latency EMA and p95
//! - Bounded 24-hour access window and fixed-size cost history
//! - Deterministic adaptive heuristic or epsilon-greedy Q-learning
//! - Background cleanup of stale keys with a hard cap on tracked keys
//! - Factory wrapping that applies the recommendation and records cost
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use ttl_tuner::{FactoryContext, TunerConfig, TuningEngine};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ttl_tuner::TunerError> {
//! let engine = TuningEngine::new(TunerConfig::default());
//! let events = engine.start()?;
//!
//! let user = engine
//!     .wrap("user:42", |ctx| async move {
//!         // Load from the backing store, then cache with `ctx.duration`.
//!         Ok::<_, std::io::Error>(format!("user with ttl {:?}", ctx.duration))
//!     })
//!     .call(FactoryContext::new("user:42", Duration::from_secs(300)))
//!     .await;
//! assert!(user.is_ok());
//!
//! drop(events);
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  hit/miss/factory   ┌──────────────┐   snapshot   ┌─────────────────┐
//! │ Host cache │────────────────────▶│ TuningEngine │─────────────▶│ TuningAlgorithm │
//! │            │◀────────────────────│              │◀─────────────│ (adaptive / RL) │
//! └────────────┘   recommended TTL   └──────┬───────┘     TTL      └─────────────────┘
//!                                           │
//!                                           ▼
//!                                     MetricsStore
//!                                  (KeyMetrics per key)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod tuning;

#[cfg(test)]
mod test_utils;

pub use config::{validate_config, AlgorithmKind, TunerConfig};
pub use engine::{
    CacheEvent, CacheObserver, EngineStats, EventSender, FactoryContext, TrackedFactory,
    TuningEngine,
};
pub use error::{AlgorithmError, ConfigError, LifecycleError, TunerError};
pub use metrics::{CleanupReport, CostSample, KeyMetrics, MetricsSnapshot, MetricsStore};
pub use tuning::{
    AdaptiveAlgorithm, LearningSnapshot, ReinforcementLearningAlgorithm, TuningAlgorithm,
};
