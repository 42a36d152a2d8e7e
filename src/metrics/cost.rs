//! Cost samples.
//!
//! A [`CostSample`] records what it took to produce one cached value. Its
//! [`score`](CostSample::score) folds the three cost dimensions into one
//! unit-normalized scalar: seconds of compute, MiB of memory and monetary
//! units count equally, scaled by a caller-supplied multiplier.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ttl_tuner::metrics::CostSample;
//!
//! let sample = CostSample::new(Duration::from_millis(1000), 1_048_576, 0.10)
//!     .with_multiplier(2.0);
//! assert!((sample.score() - 4.2).abs() < 0.01);
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes per MiB, the memory normalization unit.
const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Resource cost of a single value-producing operation.
///
/// Values are not validated. Negative monetary costs or multipliers are
/// accepted and will skew the score; keeping them sane is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSample {
    /// Wall-clock computation time.
    pub computation_time: Duration,
    /// Approximate memory footprint in bytes.
    pub memory_bytes: u64,
    /// Monetary cost (e.g. API spend) in arbitrary currency units.
    pub monetary_cost: f64,
    /// Free-form multiplier applied to the whole score.
    pub custom_multiplier: f64,
    /// When the sample was captured.
    pub captured_at: DateTime<Utc>,
}

impl CostSample {
    /// Create a sample with a multiplier of 1.0, captured now.
    #[must_use]
    pub fn new(computation_time: Duration, memory_bytes: u64, monetary_cost: f64) -> Self {
        Self {
            computation_time,
            memory_bytes,
            monetary_cost,
            custom_multiplier: 1.0,
            captured_at: Utc::now(),
        }
    }

    /// Set the custom multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.custom_multiplier = multiplier;
        self
    }

    /// Override the capture timestamp.
    #[must_use]
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }

    /// Unit-normalized cost score.
    ///
    /// `(time_ms / 1000 + bytes / 1_048_576 + monetary) * multiplier`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self) -> f64 {
        let seconds = self.computation_time.as_secs_f64();
        let mebibytes = self.memory_bytes as f64 / BYTES_PER_MIB;
        (seconds + mebibytes + self.monetary_cost) * self.custom_multiplier
    }
}
