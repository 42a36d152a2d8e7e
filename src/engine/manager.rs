//! Background task for a started engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                 Background task                       │
//! ├───────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌────────────┐  │
//! │  │ Cleanup     │   │ Event RX     │   │ Shutdown   │  │
//! │  │ interval    │   │ (mpsc)       │   │ (watch)    │  │
//! │  └─────────────┘   └──────────────┘   └────────────┘  │
//! │          │                 │                 │        │
//! │          ▼                 ▼                 ▼        │
//! │     run_cleanup()    handle_event()        break      │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! The task holds only a weak reference to the engine, so dropping every
//! [`TuningEngine`] handle also ends the task.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{CacheEvent, Inner, TuningEngine};

/// Shortest cleanup period the timer accepts.
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

/// Handles owned by a running engine.
#[derive(Debug)]
pub(super) struct Background {
    pub(super) shutdown_tx: watch::Sender<bool>,
    pub(super) task: JoinHandle<()>,
}

fn upgrade(engine: &Weak<Inner>) -> Option<TuningEngine> {
    engine.upgrade().map(|inner| TuningEngine { inner })
}

/// Spawn the background task on the current runtime.
pub(super) fn spawn(
    runtime: &tokio::runtime::Handle,
    engine: &Arc<Inner>,
    events: mpsc::Receiver<CacheEvent>,
    period: Duration,
) -> Background {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = runtime.spawn(run(Arc::downgrade(engine), events, shutdown_rx, period));
    Background { shutdown_tx, task }
}

/// Run until shutdown is signalled or the engine is dropped.
async fn run(
    engine: Weak<Inner>,
    mut events: mpsc::Receiver<CacheEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    period: Duration,
) {
    let period = period.max(MIN_CLEANUP_INTERVAL);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first immediate tick
    interval.tick().await;

    tracing::info!(
        cleanup_interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        "Tuning engine background task started"
    );

    let mut events_open = true;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(engine) = upgrade(&engine) else { break };
                engine.run_cleanup();
            }
            event = events.recv(), if events_open => {
                match event {
                    Some(event) => {
                        let Some(engine) = upgrade(&engine) else { break };
                        engine.handle_event(event);
                    }
                    None => events_open = false,
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    // Apply whatever was queued before shutdown.
    events.close();
    let mut drained = 0_usize;
    while let Ok(event) = events.try_recv() {
        if let Some(engine) = upgrade(&engine) {
            engine.handle_event(event);
            drained += 1;
        }
    }

    tracing::info!(drained, "Tuning engine background task stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::TunerConfig;

    #[tokio::test]
    async fn test_task_exits_when_engine_dropped() {
        let engine = TuningEngine::new(TunerConfig::default());
        let (_tx, rx) = mpsc::channel(8);
        let background = spawn(
            &tokio::runtime::Handle::current(),
            &engine.inner,
            rx,
            Duration::from_millis(5),
        );

        drop(engine);
        tokio::time::timeout(Duration::from_secs(5), background.task)
            .await
            .expect("task should end once the engine is gone")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let engine = TuningEngine::new(TunerConfig::default());
        let (tx, rx) = mpsc::channel(8);
        let background = spawn(
            &tokio::runtime::Handle::current(),
            &engine.inner,
            rx,
            Duration::from_secs(3600),
        );

        for _ in 0..3 {
            tx.try_send(CacheEvent::Hit { key: "k".into() }).unwrap();
        }
        background.shutdown_tx.send(true).unwrap();
        background.task.await.unwrap();

        assert_eq!(engine.get_metrics("k").unwrap().hit_count, 3);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_zero_period_does_not_panic() {
        let engine = TuningEngine::new(TunerConfig::default());
        let (_tx, rx) = mpsc::channel(8);
        let background = spawn(&tokio::runtime::Handle::current(), &engine.inner, rx, Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(20)).await;
        background.shutdown_tx.send(true).unwrap();
        background.task.await.unwrap();
        assert!(engine.stats().cleanup_runs > 0);
    }
}
