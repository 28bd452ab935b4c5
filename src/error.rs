//! Error types for task model operations.

use crate::response::Status;
use crate::task::{TaskId, TaskState};
use thiserror::Error;

/// Result type used throughout the task model.
pub type TaskModelResult<T> = Result<T, TaskModelError>;

/// Main error type for task model operations.
#[derive(Error, Debug)]
pub enum TaskModelError {
    /// The store already holds as many tasks as it may
    #[error("The capacity({capacity}) of the task pool exceeded.")]
    AdmissionRejected {
        /// Capacity of the store that refused the task
        capacity: usize,
    },

    /// The estimated run-time of a task is above the configured maximum
    #[error("The task has too much run-time({remaining_time_ms} ms).")]
    BudgetExceeded {
        /// Estimated remaining time of the rejected task
        remaining_time_ms: u64,
        /// Maximum remaining time accepted by the scheduler
        max_remaining_time_ms: u64,
    },

    /// A freshly generated task id collided with a live task
    #[error("Duplicated task {task_id}, try again later.")]
    DuplicateTask {
        /// The colliding identifier
        task_id: TaskId,
    },

    /// Unknown, purged or already consumed task
    #[error("Task doesn't exist on the server.")]
    TaskNotFound {
        /// The identifier that was looked up
        task_id: TaskId,
    },

    /// The store holds a task whose state cannot be served
    #[error("Task state {state} is not supported")]
    UnsupportedState {
        /// The task with the broken state
        task_id: TaskId,
        /// Description of the offending state
        state: String,
    },

    /// A task was asked to move backwards or skip a state
    #[error("Task {task_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// The task being mutated
        task_id: TaskId,
        /// Current state
        from: TaskState,
        /// Requested state
        to: TaskState,
    },

    /// `begin_invoke` was called on a flow that already left the idle state
    #[error("Async flow for task {task_id} is already {state}")]
    FlowClosed {
        /// Task bound to the flow
        task_id: TaskId,
        /// Current flow state
        state: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl TaskModelError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given task
    pub fn not_found(task_id: impl Into<TaskId>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    /// Abstract status code surfaced to the HTTP boundary.
    pub fn status(&self) -> Status {
        match self {
            Self::AdmissionRejected { .. } | Self::BudgetExceeded { .. } => Status::BadRequest,
            Self::DuplicateTask { .. } => Status::ServiceUnavailable,
            Self::TaskNotFound { .. } => Status::NotFound,
            Self::UnsupportedState { .. } => Status::NotImplemented,
            _ => Status::InternalServerError,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AdmissionRejected { .. } | Self::DuplicateTask { .. }
        )
    }
}
