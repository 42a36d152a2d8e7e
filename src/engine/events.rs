//! Host cache notifications.
//!
//! A host cache reports hits, misses and factory executions through
//! [`CacheObserver`]. Two implementations exist:
//!
//! - [`TuningEngine`] handles each notification synchronously on the caller's
//!   thread.
//! - [`EventSender`], returned by [`TuningEngine::start`], queues notifications
//!   to the background task. When the queue is full the event is handled inline
//!   instead of being dropped. After [`TuningEngine::stop`] the sender is inert.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::TuningEngine;

/// A single notification from the host cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A lookup found a live entry.
    Hit {
        /// Cache key.
        key: String,
    },
    /// A lookup found nothing.
    Miss {
        /// Cache key.
        key: String,
    },
    /// The factory produced a value.
    FactorySucceeded {
        /// Cache key.
        key: String,
        /// Time spent in the factory.
        elapsed: Duration,
    },
    /// The factory returned an error.
    FactoryFailed {
        /// Cache key.
        key: String,
        /// Time spent before failing.
        elapsed: Duration,
    },
    /// The factory was abandoned after a timeout.
    FactoryTimedOut {
        /// Cache key.
        key: String,
        /// Time spent before the timeout fired.
        elapsed: Duration,
    },
}

impl CacheEvent {
    /// Key the event refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Hit { key }
            | Self::Miss { key }
            | Self::FactorySucceeded { key, .. }
            | Self::FactoryFailed { key, .. }
            | Self::FactoryTimedOut { key, .. } => key,
        }
    }
}

/// Receiver of host cache notifications.
///
/// Errors and timeouts both count as factory failures.
pub trait CacheObserver {
    /// A lookup for `key` hit.
    fn notify_hit(&self, key: &str);

    /// A lookup for `key` missed.
    fn notify_miss(&self, key: &str);

    /// The factory for `key` succeeded after `elapsed`.
    fn notify_factory_success(&self, key: &str, elapsed: Duration);

    /// The factory for `key` failed after `elapsed`.
    fn notify_factory_error(&self, key: &str, elapsed: Duration);

    /// The factory for `key` timed out after `elapsed`.
    fn notify_factory_timeout(&self, key: &str, elapsed: Duration);
}

impl CacheObserver for TuningEngine {
    fn notify_hit(&self, key: &str) {
        self.on_hit(key);
    }

    fn notify_miss(&self, key: &str) {
        self.on_miss(key);
    }

    fn notify_factory_success(&self, key: &str, elapsed: Duration) {
        self.on_factory_outcome(key, elapsed, false);
    }

    fn notify_factory_error(&self, key: &str, elapsed: Duration) {
        self.on_factory_outcome(key, elapsed, true);
    }

    fn notify_factory_timeout(&self, key: &str, elapsed: Duration) {
        self.on_factory_outcome(key, elapsed, true);
    }
}

/// Queue handle into a running engine.
///
/// Cheap to clone. Sending never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<CacheEvent>,
    engine: TuningEngine,
}

impl EventSender {
    pub(super) const fn new(tx: mpsc::Sender<CacheEvent>, engine: TuningEngine) -> Self {
        Self { tx, engine }
    }

    /// Queue an event for the background task.
    ///
    /// Returns `false` if the engine has been stopped and the event was
    /// discarded.
    pub fn send(&self, event: CacheEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(key = %event.key(), "Event queue full, handling inline");
                self.engine.handle_event(event);
                true
            }
            Err(TrySendError::Closed(event)) => {
                tracing::debug!(key = %event.key(), "Engine stopped, dropping event");
                false
            }
        }
    }

    /// True while the background task is accepting events.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl CacheObserver for EventSender {
    fn notify_hit(&self, key: &str) {
        self.send(CacheEvent::Hit { key: key.to_owned() });
    }

    fn notify_miss(&self, key: &str) {
        self.send(CacheEvent::Miss { key: key.to_owned() });
    }

    fn notify_factory_success(&self, key: &str, elapsed: Duration) {
        self.send(CacheEvent::FactorySucceeded {
            key: key.to_owned(),
            elapsed,
        });
    }

    fn notify_factory_error(&self, key: &str, elapsed: Duration) {
        self.send(CacheEvent::FactoryFailed {
            key: key.to_owned(),
            elapsed,
        });
    }

    fn notify_factory_timeout(&self, key: &str, elapsed: Duration) {
        self.send(CacheEvent::FactoryTimedOut {
            key: key.to_owned(),
            elapsed,
        });
    }
}
