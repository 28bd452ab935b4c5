//! Task stores for long-running operations.
//!
//! A store is the capacity-bounded collection of [`Task`]s owned by one
//! scheduler. Only the in-memory store ships with the crate; other
//! persistence backends can implement [`TaskStore`].
//!
//! # Examples
//!
//! ```rust
//! use taskmodel::prelude::*;
//!
//! # async fn example() -> TaskModelResult<()> {
//! let store = InMemoryStore::with_config(StoreConfig::with_capacity(10));
//!
//! store.admit(Task::new("abc", Some(5000), 2)).await?;
//! store.mutate("abc", TaskUpdate::start()).await?;
//!
//! let polled = store.dequeue("abc").await?;
//! assert!(matches!(polled, Dequeued::Executing { .. }));
//! # Ok(())
//! # }
//! ```

use crate::config::StoreConfig;
use crate::error::TaskModelResult;
use crate::task::{Task, TaskUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub mod memory;
pub use memory::InMemoryStore;

/// Outcome of polling a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Dequeued {
    /// No such task, or it was already consumed or purged
    NotFound,
    /// Admitted but not started
    Created {
        /// Admission time
        created_at: DateTime<Utc>,
    },
    /// Handler still running
    Executing {
        /// Admission time
        created_at: DateTime<Utc>,
        /// Start time
        started_at: Option<DateTime<Utc>>,
        /// Latest remaining-time estimate
        remaining_time_ms: Option<u64>,
    },
    /// Result of a completed task; the task has been removed
    Completed(Vec<Value>),
}

/// Statistics about the store state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of tasks currently held
    pub count: usize,
    /// Maximum number of tasks
    pub capacity: usize,
    /// Tasks waiting to start
    pub created: usize,
    /// Tasks whose handler is running
    pub executing: usize,
    /// Completed tasks waiting for a poller
    pub completed: usize,
    /// Tasks admitted since the store was created
    pub admitted_total: u64,
    /// Admissions refused because the store was full
    pub rejected_total: u64,
    /// Results delivered to pollers
    pub consumed_total: u64,
    /// Tasks removed by sweeps
    pub purged_total: u64,
}

/// Trait that all task stores must implement.
///
/// Every operation is atomic with respect to a given task id.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task.
    ///
    /// Fails with `AdmissionRejected` when the store is full and with
    /// `DuplicateTask` when the id is already taken; neither case mutates the store.
    async fn admit(&self, task: Task) -> TaskModelResult<()>;

    /// Get a snapshot of a task by ID
    async fn lookup(&self, task_id: &str) -> TaskModelResult<Option<Task>>;

    /// Apply a partial update; fails with `TaskNotFound` for unknown ids.
    async fn mutate(&self, task_id: &str, update: TaskUpdate) -> TaskModelResult<()>;

    /// Poll a task, consuming it if it is completed.
    async fn dequeue(&self, task_id: &str) -> TaskModelResult<Dequeued>;

    /// Age every task by `generation` and purge the spent ones.
    ///
    /// Returns the number of purged tasks.
    async fn sweep(&self, generation: u32) -> TaskModelResult<u64>;

    /// Number of tasks currently held
    async fn count(&self) -> usize;

    /// Maximum number of tasks
    fn capacity(&self) -> usize;

    /// Get store statistics
    async fn stats(&self) -> TaskModelResult<StoreStats>;

    /// Health check for the store
    async fn health_check(&self) -> TaskModelResult<()>;
}

/// Convenient type alias for boxed task store
pub type SharedStore = std::sync::Arc<dyn TaskStore>;

/// Factory methods for creating stores
pub struct StoreFactory;

impl StoreFactory {
    /// Create an in-memory store
    pub fn in_memory(config: StoreConfig) -> SharedStore {
        std::sync::Arc::new(InMemoryStore::with_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskUpdate;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_basic_operations() {
        let store = StoreFactory::in_memory(StoreConfig::default());
        assert!(store.health_check().await.is_ok());

        store.admit(Task::new("test-1", None, 2)).await.unwrap();
        store.mutate("test-1", TaskUpdate::start()).await.unwrap();
        store
            .mutate("test-1", TaskUpdate::complete(vec![json!("done")]))
            .await
            .unwrap();

        let polled = store.dequeue("test-1").await.unwrap();
        assert_eq!(polled, Dequeued::Completed(vec![json!("done")]));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.consumed_total, 1);
        assert_eq!(stats.capacity, 1000);
    }
}
