//! Background task collector.
//!
//! Sweeps the store on a fixed interval so that tasks nobody polls are
//! eventually reclaimed. One sweep ages every task by one generation.

use crate::store::SharedStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Handle to a running collector; dropping it stops the sweeps.
#[derive(Debug)]
pub struct TaskCollector {
    handle: JoinHandle<()>,
    period: Duration,
}

impl TaskCollector {
    /// Spawn a collector sweeping `store` every `period`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(store: SharedStore, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            tracing::info!("Task collector started, sweeping every {:?}", period);

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match store.sweep(1).await {
                    Ok(purged) => {
                        tracing::trace!("Sweep done, {} purged", purged);
                    }
                    Err(e) => {
                        tracing::error!("Task sweep failed: {}", e);
                    }
                }
            }
        });

        Self { handle, period }
    }

    /// Sweep interval.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the collector loop is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop sweeping.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for TaskCollector {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            tracing::info!("Task collector stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::StoreFactory;
    use crate::task::Task;

    #[tokio::test]
    async fn test_collector_sweeps_periodically() {
        let store = StoreFactory::in_memory(StoreConfig::default());
        store.admit(Task::new("abandoned", None, 2)).await.unwrap();

        let collector = TaskCollector::start(store.clone(), Duration::from_millis(20));
        assert!(collector.is_running());
        assert_eq!(collector.period(), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.count().await, 0);
        assert_eq!(store.stats().await.unwrap().purged_total, 1);

        collector.stop();
    }

    #[tokio::test]
    async fn test_stopped_collector_no_longer_sweeps() {
        let store = StoreFactory::in_memory(StoreConfig::default());
        let collector = TaskCollector::start(store.clone(), Duration::from_millis(20));
        collector.stop();

        store.admit(Task::new("kept", None, 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.count().await, 1);
    }
}
