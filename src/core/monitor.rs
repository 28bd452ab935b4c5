//! Task monitor endpoint: the poll operation exposed to clients.

use crate::core::registry::{Args, Method, Operation};
use crate::error::TaskModelError;
use crate::response::{Response, Status};
use crate::store::{Dequeued, SharedStore};
use crate::utils::retry_after_secs;
use async_trait::async_trait;
use serde_json::Value;

/// Poll endpoint backed by a scheduler's store.
///
/// Polling a completed task returns its result and consumes it; every other
/// state leaves the task untouched.
pub struct TaskMonitorEndpoint {
    store: SharedStore,
    method: Method,
    params: Vec<String>,
    remaining_time_header: String,
}

impl TaskMonitorEndpoint {
    /// Create an endpoint answering on `DELETE`.
    pub fn new(store: SharedStore, remaining_time_header: impl Into<String>) -> Self {
        Self {
            store,
            method: Method::Delete,
            params: vec!["taskId".to_string()],
            remaining_time_header: remaining_time_header.into(),
        }
    }

    /// Answer on another method, e.g. `GET` for polling from a browser.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Poll one task.
    pub async fn poll(&self, task_id: &str) -> Response {
        let dequeued = match self.store.dequeue(task_id).await {
            Ok(dequeued) => dequeued,
            Err(error) => {
                tracing::error!("Polling task {} failed: {}", task_id, error);
                return Response::from_error(&error);
            }
        };

        match dequeued {
            Dequeued::NotFound => Response::from_error(&TaskModelError::not_found(task_id)),
            Dequeued::Created { created_at } => Response::message(
                Status::Created,
                format!(
                    "Task is created but not executed. Created at {}",
                    created_at.to_rfc3339()
                ),
            ),
            Dequeued::Executing {
                created_at,
                started_at,
                remaining_time_ms,
            } => {
                let started = started_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                let response = Response::message(
                    Status::NoContent,
                    format!(
                        "Task is processing. Created at {}. Started at {}",
                        created_at.to_rfc3339(),
                        started
                    ),
                );
                match remaining_time_ms {
                    Some(remaining) => response.with_header(
                        self.remaining_time_header.clone(),
                        retry_after_secs(remaining).to_string(),
                    ),
                    None => response,
                }
            }
            Dequeued::Completed(values) => Response::values(values),
        }
    }
}

#[async_trait]
impl Operation for TaskMonitorEndpoint {
    fn method(&self) -> Method {
        self.method
    }

    fn params(&self) -> &[String] {
        &self.params
    }

    async fn invoke(&self, args: Args) -> Response {
        let task_id = match args.first() {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        self.poll(&task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::response::ResponseBody;
    use crate::store::StoreFactory;
    use crate::task::{ProgressNotification, Task, TaskUpdate};
    use serde_json::json;

    fn endpoint() -> TaskMonitorEndpoint {
        TaskMonitorEndpoint::new(StoreFactory::in_memory(StoreConfig::default()), "Retry-After")
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let monitor = endpoint();
        let response = monitor.invoke(vec![json!("nope")]).await;
        assert_eq!(response.status, Status::NotFound);
        assert_eq!(
            response.body,
            ResponseBody::Message("Task doesn't exist on the server.".to_string())
        );

        let response = monitor.invoke(vec![]).await;
        assert_eq!(response.status, Status::NotFound);
    }

    #[tokio::test]
    async fn test_created_task() {
        let monitor = endpoint();
        monitor.store.admit(Task::new("abc", None, 2)).await.unwrap();

        let response = monitor.poll("abc").await;
        assert_eq!(response.status, Status::Created);
        assert!(matches!(
            response.body,
            ResponseBody::Message(ref m) if m.starts_with("Task is created")
        ));
    }

    #[tokio::test]
    async fn test_executing_task_with_retry_hint() {
        let monitor = endpoint();
        monitor
            .store
            .admit(Task::new("abc", Some(5000), 2))
            .await
            .unwrap();
        monitor
            .store
            .mutate("abc", TaskUpdate::start())
            .await
            .unwrap();

        let response = monitor.poll("abc").await;
        assert_eq!(response.status, Status::NoContent);
        assert_eq!(response.header("Retry-After"), Some("5"));

        monitor
            .store
            .mutate(
                "abc",
                TaskUpdate::Progress(ProgressNotification::new(9000)),
            )
            .await
            .unwrap();
        let response = monitor.poll("abc").await;
        assert_eq!(response.header("Retry-After"), Some("0"));
    }

    #[tokio::test]
    async fn test_executing_task_without_estimate() {
        let monitor = endpoint();
        monitor.store.admit(Task::new("abc", None, 2)).await.unwrap();
        monitor
            .store
            .mutate("abc", TaskUpdate::start())
            .await
            .unwrap();

        let response = monitor.poll("abc").await;
        assert_eq!(response.status, Status::NoContent);
        assert!(response.headers.is_empty());
    }

    #[tokio::test]
    async fn test_completed_task_consumed() {
        let monitor = endpoint().with_method(Method::Get);
        assert_eq!(monitor.method(), Method::Get);
        assert_eq!(monitor.params(), &["taskId".to_string()]);

        monitor.store.admit(Task::new("abc", None, 2)).await.unwrap();
        monitor
            .store
            .mutate("abc", TaskUpdate::start())
            .await
            .unwrap();
        monitor
            .store
            .mutate("abc", TaskUpdate::complete(vec![json!(40)]))
            .await
            .unwrap();

        let response = monitor.invoke(vec![json!("abc")]).await;
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.into_values(), Some(vec![json!(40)]));

        let response = monitor.invoke(vec![json!("abc")]).await;
        assert_eq!(response.status, Status::NotFound);
    }
}
