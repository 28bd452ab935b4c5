//! Task definition and state transitions.

use crate::error::{TaskModelError, TaskModelResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Unique identifier for a task
pub type TaskId = String;

/// State of a long-running task.
///
/// Transitions are monotonic: `Created -> Executing -> Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    /// Task is admitted but the handler has not started
    Created,
    /// Handler is running in the background
    Executing,
    /// Handler finished, the result waits for a poller
    Completed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Created => "created",
            TaskState::Executing => "executing",
            TaskState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Progress report sent by a handler while it is still working.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressNotification {
    /// Milliseconds of work done since the last report
    pub elapsed_time_ms: u64,
}

impl ProgressNotification {
    /// Create a notification for the given amount of finished work.
    pub fn new(elapsed_time_ms: u64) -> Self {
        Self { elapsed_time_ms }
    }
}

/// A partial update applied to a stored task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    /// `Created -> Executing`
    Start {
        /// When the handler started
        at: DateTime<Utc>,
    },
    /// Decrement the remaining-time estimate
    Progress(ProgressNotification),
    /// `Executing -> Completed` with the handler's values
    Complete {
        /// Values passed to the completion callback
        result: Vec<Value>,
        /// When the handler completed
        at: DateTime<Utc>,
    },
}

impl TaskUpdate {
    /// Start the task now.
    pub fn start() -> Self {
        Self::Start { at: Utc::now() }
    }

    /// Complete the task now.
    pub fn complete(result: Vec<Value>) -> Self {
        Self::Complete {
            result,
            at: Utc::now(),
        }
    }
}

/// A unit of deferred handler execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) state: TaskState,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) remaining_time_ms: Option<u64>,
    pub(crate) result: Option<Vec<Value>>,
    pub(crate) lifetime: i64,
}

impl Task {
    /// Create a task in the `Created` state.
    pub fn new(id: impl Into<TaskId>, remaining_time_ms: Option<u64>, lifetime: u32) -> Self {
        Self {
            id: id.into(),
            state: TaskState::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            remaining_time_ms,
            result: None,
            lifetime: i64::from(lifetime),
        }
    }

    /// Task identifier.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// When the task was admitted.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the handler started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the handler completed.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Remaining-time estimate in milliseconds.
    pub fn remaining_time_ms(&self) -> Option<u64> {
        self.remaining_time_ms
    }

    /// Result values, present once the task is completed.
    pub fn result(&self) -> Option<&[Value]> {
        self.result.as_deref()
    }

    /// Sweep generations left before the task is collected.
    pub fn lifetime(&self) -> i64 {
        self.lifetime
    }

    /// Apply a partial update.
    pub fn apply(&mut self, update: TaskUpdate) -> TaskModelResult<()> {
        match update {
            TaskUpdate::Start { at } => self.start(at),
            TaskUpdate::Progress(notification) => {
                self.record_progress(notification);
                Ok(())
            }
            TaskUpdate::Complete { result, at } => self.complete(result, at),
        }
    }

    /// Move to `Executing`.
    pub fn start(&mut self, at: DateTime<Utc>) -> TaskModelResult<()> {
        self.transition(TaskState::Executing)?;
        self.started_at = Some(at.max(self.created_at));
        Ok(())
    }

    /// Move to `Completed` and store the result.
    pub fn complete(&mut self, result: Vec<Value>, at: DateTime<Utc>) -> TaskModelResult<()> {
        self.transition(TaskState::Completed)?;
        let floor = self.started_at.unwrap_or(self.created_at);
        self.completed_at = Some(at.max(floor));
        self.result = Some(result);
        Ok(())
    }

    /// Decrement the remaining-time estimate, never below zero.
    pub fn record_progress(&mut self, notification: ProgressNotification) {
        if let Some(remaining) = self.remaining_time_ms.as_mut() {
            *remaining = remaining.saturating_sub(notification.elapsed_time_ms);
        }
    }

    /// Spend `generation` units of lifetime; returns true once the lifetime is used up.
    pub fn age(&mut self, generation: u32) -> bool {
        self.lifetime -= i64::from(generation);
        self.lifetime <= 0
    }

    fn transition(&mut self, to: TaskState) -> TaskModelResult<()> {
        let allowed = matches!(
            (self.state, to),
            (TaskState::Created, TaskState::Executing)
                | (TaskState::Executing, TaskState::Completed)
        );
        if !allowed {
            return Err(TaskModelError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_new_task_is_created() {
        let task = Task::new("t-1", Some(5000), 2);
        assert_eq!(task.state(), TaskState::Created);
        assert_eq!(task.remaining_time_ms(), Some(5000));
        assert_eq!(task.lifetime(), 2);
        assert!(task.result().is_none());
        assert!(task.started_at().is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut task = Task::new("t-1", None, 2);
        task.apply(TaskUpdate::start()).unwrap();
        assert_eq!(task.state(), TaskState::Executing);

        task.apply(TaskUpdate::complete(vec![json!(42)])).unwrap();
        assert_eq!(task.state(), TaskState::Completed);
        assert_eq!(task.result(), Some(&[json!(42)][..]));
        assert!(task.completed_at().unwrap() >= task.started_at().unwrap());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut task = Task::new("t-1", None, 2);

        // cannot skip Executing
        let err = task.complete(vec![], Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            TaskModelError::InvalidTransition {
                from: TaskState::Created,
                to: TaskState::Completed,
                ..
            }
        ));

        task.start(Utc::now()).unwrap();
        assert!(task.start(Utc::now()).is_err());

        task.complete(vec![json!("done")], Utc::now()).unwrap();
        assert!(task.complete(vec![json!("again")], Utc::now()).is_err());
        assert_eq!(task.result(), Some(&[json!("done")][..]));
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut task = Task::new("t-1", None, 2);
        let earlier = task.created_at() - Duration::seconds(10);
        task.start(earlier).unwrap();
        assert_eq!(task.started_at(), Some(task.created_at()));
    }

    #[test]
    fn test_progress_clamps_at_zero() {
        let mut task = Task::new("t-1", Some(1500), 2);
        task.record_progress(ProgressNotification::new(1000));
        assert_eq!(task.remaining_time_ms(), Some(500));
        task.record_progress(ProgressNotification::new(1000));
        assert_eq!(task.remaining_time_ms(), Some(0));

        let mut unknown = Task::new("t-2", None, 2);
        unknown.record_progress(ProgressNotification::new(1000));
        assert_eq!(unknown.remaining_time_ms(), None);
    }

    #[test]
    fn test_age_spends_lifetime() {
        let mut task = Task::new("t-1", None, 2);
        assert!(!task.age(1));
        assert!(task.age(1));
        assert_eq!(task.lifetime(), 0);
    }
}
