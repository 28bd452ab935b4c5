//! Async flow: the bridge between one handler invocation and its task.
//!
//! A flow starts `Idle`. [`AsyncFlow::begin_invoke`] admits the task and
//! answers the caller with the poll location (`Admitted`), or
//! answers with an error (`Rejected`). [`AsyncFlow::end_invoke`] either
//! records progress, completes the task, or, when the flow never left `Idle`,
//! answers the caller directly with the handler's values.

use crate::error::{TaskModelError, TaskModelResult};
use crate::response::Response;
use crate::store::SharedStore;
use crate::task::{ProgressNotification, Task, TaskId, TaskUpdate};
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};

/// Receiving end of the synchronous reply of one invocation.
pub type ResponseReceiver = oneshot::Receiver<Response>;

/// Lifecycle of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Nothing sent yet
    Idle,
    /// Task admitted, 202 sent
    Admitted,
    /// Result delivered (inline or into the task)
    Completed,
    /// Admission refused, error sent
    Rejected,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Idle => "idle",
            FlowState::Admitted => "admitted",
            FlowState::Completed => "completed",
            FlowState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// What a handler reports through [`AsyncFlow::end_invoke`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Work is still in progress
    Progress(ProgressNotification),
    /// Final values of the handler
    Values(Vec<Value>),
}

impl From<ProgressNotification> for Outcome {
    fn from(notification: ProgressNotification) -> Self {
        Outcome::Progress(notification)
    }
}

impl From<Vec<Value>> for Outcome {
    fn from(values: Vec<Value>) -> Self {
        Outcome::Values(values)
    }
}

/// Scheduler settings every flow needs.
#[derive(Clone)]
pub(crate) struct FlowSettings {
    pub(crate) store: SharedStore,
    pub(crate) monitor_url: String,
    pub(crate) max_remaining_time_ms: u64,
    pub(crate) task_lifetime: u32,
}

impl FlowSettings {
    /// Open a flow for a fresh task id.
    pub(crate) fn open(&self, task_id: TaskId) -> (AsyncFlow, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        let location = self
            .monitor_url
            .replace(crate::config::TASK_ID_PLACEHOLDER, &task_id);
        let flow = AsyncFlow {
            shared: Arc::new(FlowShared {
                task_id,
                location,
                settings: self.clone(),
                inner: Mutex::new(FlowInner {
                    state: FlowState::Idle,
                    responder: Some(tx),
                }),
            }),
        };
        (flow, rx)
    }
}

struct FlowShared {
    task_id: TaskId,
    location: String,
    settings: FlowSettings,
    inner: Mutex<FlowInner>,
}

struct FlowInner {
    state: FlowState,
    responder: Option<oneshot::Sender<Response>>,
}

impl FlowInner {
    fn respond(&mut self, task_id: &str, response: Response) {
        match self.responder.take() {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!("Caller of task {} is gone, reply dropped", task_id);
                }
            }
            None => tracing::debug!("Task {} already replied", task_id),
        }
    }

    fn reject(&mut self, task_id: &str, error: &TaskModelError) {
        tracing::warn!("Task {} rejected: {}", task_id, error);
        self.respond(task_id, Response::from_error(error));
        self.state = FlowState::Rejected;
    }
}

/// Per-invocation bridge between a handler and its task.
///
/// Cloning is cheap; all clones drive the same flow and their calls are
/// serialized.
#[derive(Clone)]
pub struct AsyncFlow {
    shared: Arc<FlowShared>,
}

impl AsyncFlow {
    /// Identifier of the task bound to this flow.
    pub fn task_id(&self) -> &TaskId {
        &self.shared.task_id
    }

    /// Poll location of the task.
    pub fn location(&self) -> &str {
        &self.shared.location
    }

    /// Current flow state.
    pub async fn state(&self) -> FlowState {
        self.shared.inner.lock().await.state
    }

    /// Admit the task and answer the caller with its poll location.
    ///
    /// On rejection the caller has already received the error response and
    /// the handler must not do the work.
    pub async fn begin_invoke(&self, remaining_time_ms: Option<u64>) -> TaskModelResult<()> {
        let task_id = self.task_id();
        let settings = &self.shared.settings;
        let mut inner = self.shared.inner.lock().await;

        if inner.state != FlowState::Idle {
            return Err(TaskModelError::FlowClosed {
                task_id: task_id.clone(),
                state: inner.state.to_string(),
            });
        }

        if let Some(remaining) = remaining_time_ms {
            if remaining > settings.max_remaining_time_ms {
                let error = TaskModelError::BudgetExceeded {
                    remaining_time_ms: remaining,
                    max_remaining_time_ms: settings.max_remaining_time_ms,
                };
                inner.reject(task_id, &error);
                return Err(error);
            }
        }

        // the task enters the store already executing, in one locked step
        let mut task = Task::new(task_id.clone(), remaining_time_ms, settings.task_lifetime);
        let admitted = match task.start(Utc::now()) {
            Ok(()) => settings.store.admit(task).await,
            Err(error) => Err(error),
        };
        if let Err(error) = admitted {
            inner.reject(task_id, &error);
            return Err(error);
        }

        inner.respond(task_id, Response::accepted(self.location(), task_id.clone()));
        inner.state = FlowState::Admitted;

        tracing::debug!(
            "Task {} accepted, remaining time {:?} ms",
            task_id,
            remaining_time_ms
        );
        Ok(())
    }

    /// Report progress or completion of the handler.
    ///
    /// Writes into a task that was already purged are dropped silently.
    pub async fn end_invoke(&self, outcome: impl Into<Outcome>) -> TaskModelResult<()> {
        let outcome = outcome.into();
        let task_id = self.task_id();
        let store = &self.shared.settings.store;
        let mut inner = self.shared.inner.lock().await;

        match (inner.state, outcome) {
            (FlowState::Idle, Outcome::Values(values)) => {
                tracing::debug!("Task {} finished inline", task_id);
                inner.respond(task_id, Response::values(values));
                inner.state = FlowState::Completed;
                Ok(())
            }
            (FlowState::Idle, Outcome::Progress(_)) => {
                tracing::debug!("Ignoring progress of task {} before admission", task_id);
                Ok(())
            }
            (FlowState::Admitted, Outcome::Progress(notification)) => {
                ignore_purged(
                    task_id,
                    store
                        .mutate(task_id, TaskUpdate::Progress(notification))
                        .await,
                )
            }
            (FlowState::Admitted, Outcome::Values(values)) => {
                inner.state = FlowState::Completed;
                let result = store.mutate(task_id, TaskUpdate::complete(values)).await;
                if result.is_ok() {
                    tracing::debug!("Task {} completed", task_id);
                }
                ignore_purged(task_id, result)
            }
            (state, _) => {
                tracing::debug!("Task {} flow is {}, ignoring report", task_id, state);
                Ok(())
            }
        }
    }

    /// Complete the handler with the given values.
    pub async fn complete(&self, values: Vec<Value>) -> TaskModelResult<()> {
        self.end_invoke(Outcome::Values(values)).await
    }

    /// Report `elapsed_time_ms` of finished work.
    pub async fn progress(&self, elapsed_time_ms: u64) -> TaskModelResult<()> {
        self.end_invoke(ProgressNotification::new(elapsed_time_ms))
            .await
    }
}

impl fmt::Debug for AsyncFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFlow")
            .field("task_id", &self.shared.task_id)
            .field("location", &self.shared.location)
            .finish()
    }
}

fn ignore_purged(task_id: &str, result: TaskModelResult<()>) -> TaskModelResult<()> {
    match result {
        Err(TaskModelError::TaskNotFound { .. }) => {
            tracing::debug!("Task {} was collected, dropping late report", task_id);
            Ok(())
        }
        other => other,
    }
}

/// Completion callback handed to auto-mode handlers.
///
/// It is bound to the flow's `end_invoke` and cannot re-admit the task.
#[derive(Clone, Debug)]
pub struct Completion {
    flow: AsyncFlow,
}

impl Completion {
    pub(crate) fn new(flow: AsyncFlow) -> Self {
        Self { flow }
    }

    /// Identifier of the running task.
    pub fn task_id(&self) -> &TaskId {
        self.flow.task_id()
    }

    /// Store the handler's result.
    pub async fn complete(&self, values: Vec<Value>) -> TaskModelResult<()> {
        self.flow.complete(values).await
    }

    /// Report `elapsed_time_ms` of finished work.
    pub async fn progress(&self, elapsed_time_ms: u64) -> TaskModelResult<()> {
        self.flow.progress(elapsed_time_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::response::{ResponseBody, Status};
    use crate::store::{Dequeued, InMemoryStore, StoreFactory, StoreStats, TaskStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use serde_json::json;

    fn settings(capacity: usize, max_remaining_time_ms: u64) -> FlowSettings {
        FlowSettings {
            store: StoreFactory::in_memory(StoreConfig::with_capacity(capacity)),
            monitor_url: "/tasks/{taskId}".to_string(),
            max_remaining_time_ms,
            task_lifetime: 2,
        }
    }

    #[tokio::test]
    async fn test_begin_invoke_accepts() {
        let settings = settings(10, 60_000);
        let (flow, rx) = settings.open("abc".to_string());

        flow.begin_invoke(Some(5000)).await.unwrap();
        assert_eq!(flow.state().await, FlowState::Admitted);

        let response = rx.await.unwrap();
        assert_eq!(response.status, Status::Accepted);
        assert_eq!(response.header("Location"), Some("/tasks/abc"));

        let task = settings.store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(task.state(), crate::task::TaskState::Executing);
        assert_eq!(task.remaining_time_ms(), Some(5000));
    }

    /// Store that runs a sweep right after every admission.
    struct SweepAfterAdmit {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl TaskStore for SweepAfterAdmit {
        async fn admit(&self, task: Task) -> TaskModelResult<()> {
            self.inner.admit(task).await?;
            self.inner.sweep(1).await?;
            Ok(())
        }

        async fn lookup(&self, task_id: &str) -> TaskModelResult<Option<Task>> {
            self.inner.lookup(task_id).await
        }

        async fn mutate(&self, task_id: &str, update: TaskUpdate) -> TaskModelResult<()> {
            self.inner.mutate(task_id, update).await
        }

        async fn dequeue(&self, task_id: &str) -> TaskModelResult<Dequeued> {
            self.inner.dequeue(task_id).await
        }

        async fn sweep(&self, generation: u32) -> TaskModelResult<u64> {
            self.inner.sweep(generation).await
        }

        async fn count(&self) -> usize {
            self.inner.count().await
        }

        fn capacity(&self) -> usize {
            self.inner.capacity()
        }

        async fn stats(&self) -> TaskModelResult<StoreStats> {
            self.inner.stats().await
        }

        async fn health_check(&self) -> TaskModelResult<()> {
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn test_sweep_right_after_admission_still_accepts() {
        let settings = FlowSettings {
            store: Arc::new(SweepAfterAdmit {
                inner: InMemoryStore::new(),
            }),
            monitor_url: "/tasks/{taskId}".to_string(),
            max_remaining_time_ms: 60_000,
            task_lifetime: 1,
        };
        let (flow, rx) = settings.open("abc".to_string());

        assert!(flow.begin_invoke(Some(1000)).await.is_ok());
        assert_eq!(flow.state().await, FlowState::Admitted);
        assert_eq!(rx.await.unwrap().status, Status::Accepted);

        // the purged task swallows the late completion
        assert!(flow.complete(vec![json!(1)]).await.is_ok());
        assert_eq!(settings.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_admitted_task_is_already_executing() {
        let settings = settings(10, 60_000);
        let (flow, _rx) = settings.open("abc".to_string());
        flow.begin_invoke(None).await.unwrap();

        let stats = settings.store.stats().await.unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.executing, 1);
        let task = settings.store.lookup("abc").await.unwrap().unwrap();
        assert!(task.started_at().unwrap() >= task.created_at());
    }

    #[tokio::test]
    async fn test_begin_invoke_budget_exceeded() {
        let settings = settings(10, 1000);
        let (flow, rx) = settings.open("abc".to_string());

        let result = flow.begin_invoke(Some(5000)).await;
        assert!(matches!(result, Err(TaskModelError::BudgetExceeded { .. })));
        assert_eq!(flow.state().await, FlowState::Rejected);

        let response = rx.await.unwrap();
        assert_eq!(response.status, Status::BadRequest);
        assert!(matches!(
            response.body,
            ResponseBody::Message(ref m) if m.contains("run-time")
        ));
        assert_eq!(settings.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_begin_invoke_capacity_exceeded() {
        let settings = settings(1, 60_000);
        let (first, _first_rx) = settings.open("a".to_string());
        first.begin_invoke(None).await.unwrap();

        let (second, rx) = settings.open("b".to_string());
        let result = second.begin_invoke(None).await;
        assert!(matches!(
            result,
            Err(TaskModelError::AdmissionRejected { .. })
        ));

        let response = rx.await.unwrap();
        assert_eq!(response.status, Status::BadRequest);
        assert!(matches!(
            response.body,
            ResponseBody::Message(ref m) if m.contains("capacity")
        ));
    }

    #[tokio::test]
    async fn test_begin_invoke_duplicate_task() {
        let settings = settings(10, 60_000);
        let (first, _first_rx) = settings.open("same".to_string());
        first.begin_invoke(None).await.unwrap();

        let (second, rx) = settings.open("same".to_string());
        assert!(matches!(
            second.begin_invoke(None).await,
            Err(TaskModelError::DuplicateTask { .. })
        ));
        assert_eq!(rx.await.unwrap().status, Status::ServiceUnavailable);
        assert_eq!(second.state().await, FlowState::Rejected);
    }

    #[tokio::test]
    async fn test_begin_invoke_twice() {
        let settings = settings(10, 60_000);
        let (flow, _rx) = settings.open("abc".to_string());
        flow.begin_invoke(None).await.unwrap();

        assert!(matches!(
            flow.begin_invoke(None).await,
            Err(TaskModelError::FlowClosed { .. })
        ));
        assert_eq!(settings.store.count().await, 1);
    }

    #[tokio::test]
    async fn test_end_invoke_without_begin_replies_inline() {
        let settings = settings(10, 60_000);
        let (flow, rx) = settings.open("abc".to_string());

        flow.complete(vec![json!("fast")]).await.unwrap();
        assert_eq!(flow.state().await, FlowState::Completed);

        let response = rx.await.unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.into_values(), Some(vec![json!("fast")]));
        assert_eq!(settings.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_progress_and_completion() {
        let settings = settings(10, 60_000);
        let (flow, _rx) = settings.open("abc".to_string());
        flow.begin_invoke(Some(3000)).await.unwrap();

        flow.progress(1000).await.unwrap();
        let task = settings.store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(task.remaining_time_ms(), Some(2000));
        assert_eq!(flow.state().await, FlowState::Admitted);

        flow.complete(vec![json!(42)]).await.unwrap();
        assert_eq!(flow.state().await, FlowState::Completed);
        assert_eq!(
            settings.store.dequeue("abc").await.unwrap(),
            Dequeued::Completed(vec![json!(42)])
        );

        // later reports are ignored
        flow.complete(vec![json!(43)]).await.unwrap();
        assert_eq!(
            settings.store.dequeue("abc").await.unwrap(),
            Dequeued::NotFound
        );
    }

    #[tokio::test]
    async fn test_late_write_into_purged_task_is_noop() {
        let settings = settings(10, 60_000);
        let (flow, _rx) = settings.open("abc".to_string());
        flow.begin_invoke(Some(3000)).await.unwrap();

        settings.store.sweep(2).await.unwrap();
        assert_eq!(settings.store.count().await, 0);

        assert!(flow.progress(500).await.is_ok());
        assert!(flow.complete(vec![json!("late")]).await.is_ok());
        assert_eq!(settings.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_completion_is_bound_to_flow() {
        let settings = settings(10, 60_000);
        let (flow, _rx) = settings.open("abc".to_string());
        flow.begin_invoke(None).await.unwrap();

        let done = Completion::new(flow.clone());
        assert_eq!(done.task_id(), "abc");
        done.complete(vec![json!("ok")]).await.unwrap();
        assert_eq!(flow.state().await, FlowState::Completed);
    }
}
