//! In-memory task store.
//!
//! All tasks live in one map behind a single async-friendly lock, so capacity
//! accounting, result consumption and sweeps never interleave. Nothing
//! survives a process restart.

use super::{Dequeued, StoreStats, TaskStore};
use crate::config::{StoreConfig, SweepPolicy};
use crate::error::{TaskModelError, TaskModelResult};
use crate::task::{Task, TaskId, TaskState, TaskUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    /// Tasks indexed by ID
    tasks: HashMap<TaskId, Task>,
    admitted_total: u64,
    rejected_total: u64,
    consumed_total: u64,
    purged_total: u64,
}

/// In-memory task store implementation
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    capacity: usize,
    sweep_policy: SweepPolicy,
}

impl InMemoryStore {
    /// Create a new in-memory store with default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a new in-memory store with custom configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            capacity: config.effective_capacity(),
            sweep_policy: config.sweep_policy,
        }
    }

    /// Sweep policy in use.
    pub fn sweep_policy(&self) -> SweepPolicy {
        self.sweep_policy
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn purgeable(policy: SweepPolicy, task: &Task) -> bool {
    match policy {
        SweepPolicy::Unconditional => true,
        SweepPolicy::CompletedOnly => task.state() == TaskState::Completed,
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn admit(&self, task: Task) -> TaskModelResult<()> {
        let mut state = self.state.write().await;

        if state.tasks.len() >= self.capacity {
            state.rejected_total += 1;
            tracing::warn!(
                "Task pool is full ({}/{}), rejecting task {}",
                state.tasks.len(),
                self.capacity,
                task.id()
            );
            return Err(TaskModelError::AdmissionRejected {
                capacity: self.capacity,
            });
        }

        if state.tasks.contains_key(task.id()) {
            tracing::warn!("Task id {} is already taken", task.id());
            return Err(TaskModelError::DuplicateTask {
                task_id: task.id().clone(),
            });
        }

        let task_id = task.id().clone();
        state.tasks.insert(task_id.clone(), task);
        state.admitted_total += 1;

        tracing::debug!(
            "Admitted task {} ({}/{})",
            task_id,
            state.tasks.len(),
            self.capacity
        );
        Ok(())
    }

    async fn lookup(&self, task_id: &str) -> TaskModelResult<Option<Task>> {
        let state = self.state.read().await;
        Ok(state.tasks.get(task_id).cloned())
    }

    async fn mutate(&self, task_id: &str, update: TaskUpdate) -> TaskModelResult<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskModelError::not_found(task_id))?;

        task.apply(update)?;
        tracing::trace!("Task {} is now {}", task_id, task.state());
        Ok(())
    }

    async fn dequeue(&self, task_id: &str) -> TaskModelResult<Dequeued> {
        let mut state = self.state.write().await;

        let Some(task) = state.tasks.get(task_id) else {
            return Ok(Dequeued::NotFound);
        };

        match (task.state, task.result.is_some()) {
            (TaskState::Created, _) => Ok(Dequeued::Created {
                created_at: task.created_at,
            }),
            (TaskState::Executing, _) => Ok(Dequeued::Executing {
                created_at: task.created_at,
                started_at: task.started_at,
                remaining_time_ms: task.remaining_time_ms,
            }),
            (TaskState::Completed, true) => {
                let result = state
                    .tasks
                    .remove(task_id)
                    .and_then(|task| task.result)
                    .unwrap_or_default();
                state.consumed_total += 1;

                tracing::debug!("Task {} result delivered", task_id);
                Ok(Dequeued::Completed(result))
            }
            (TaskState::Completed, false) => {
                tracing::error!("Task {} is completed but holds no result", task_id);
                Err(TaskModelError::UnsupportedState {
                    task_id: task_id.to_string(),
                    state: "completed without result".to_string(),
                })
            }
        }
    }

    async fn sweep(&self, generation: u32) -> TaskModelResult<u64> {
        let mut state = self.state.write().await;
        let policy = self.sweep_policy;
        let before = state.tasks.len();

        state
            .tasks
            .retain(|_, task| !(task.age(generation) && purgeable(policy, task)));

        let purged = (before - state.tasks.len()) as u64;
        state.purged_total += purged;

        if purged > 0 {
            tracing::info!(
                "Collected {} abandoned tasks, {} left",
                purged,
                state.tasks.len()
            );
        } else {
            tracing::trace!("Sweep found nothing to collect");
        }

        Ok(purged)
    }

    async fn count(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn stats(&self) -> TaskModelResult<StoreStats> {
        let state = self.state.read().await;
        let in_state = |wanted: TaskState| {
            state
                .tasks
                .values()
                .filter(|task| task.state == wanted)
                .count()
        };

        Ok(StoreStats {
            count: state.tasks.len(),
            capacity: self.capacity,
            created: in_state(TaskState::Created),
            executing: in_state(TaskState::Executing),
            completed: in_state(TaskState::Completed),
            admitted_total: state.admitted_total,
            rejected_total: state.rejected_total,
            consumed_total: state.consumed_total,
            purged_total: state.purged_total,
        })
    }

    async fn health_check(&self) -> TaskModelResult<()> {
        let count = self.count().await;

        tracing::debug!("Store health check: {}/{} tasks", count, self.capacity);

        if count > self.capacity {
            return Err(TaskModelError::config(format!(
                "Store holds {} tasks, above its capacity of {}",
                count, self.capacity
            )));
        }
        Ok(())
    }
}
