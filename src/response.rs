//! Abstract responses handed back to the HTTP layer.
//!
//! The task model never writes to the wire. Every synchronous reply and every
//! poll result is a [`Response`]: a [`Status`], a [`ResponseBody`] and a small
//! set of headers that the router is expected to serialize.

use crate::error::TaskModelError;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status codes produced by the task model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Result of a completed task
    Ok,
    /// Task is admitted but not started yet
    Created,
    /// Task was accepted, poll the location for the result
    Accepted,
    /// Task is still executing
    NoContent,
    /// Request rejected (capacity or run-time budget)
    BadRequest,
    /// Unknown or already consumed task
    NotFound,
    /// Handler misbehaved
    InternalServerError,
    /// Task state cannot be served
    NotImplemented,
    /// Transient condition, retry later
    ServiceUnavailable,
}

impl Status {
    /// Numeric HTTP equivalent.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::ServiceUnavailable => 503,
        }
    }

    /// Whether the status signals a failure.
    pub fn is_error(self) -> bool {
        self.code() >= 400
    }
}

/// Payload of a [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// Informational or error message
    Message(String),
    /// Poll location of an accepted task
    Accepted {
        /// URL of the monitor endpoint for this task
        location: String,
        /// Identifier of the task
        task_id: TaskId,
    },
    /// Values produced by a handler
    Values(Vec<Value>),
}

/// A status + body pair with optional headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Abstract status
    pub status: Status,
    /// Response payload
    pub body: ResponseBody,
    /// Extra headers (e.g. `Location`, `Retry-After`)
    pub headers: BTreeMap<String, String>,
}

impl Response {
    /// Create a response without headers.
    pub fn new(status: Status, body: ResponseBody) -> Self {
        Self {
            status,
            body,
            headers: BTreeMap::new(),
        }
    }

    /// Successful response carrying handler values.
    pub fn values(values: Vec<Value>) -> Self {
        Self::new(Status::Ok, ResponseBody::Values(values))
    }

    /// Message response with the given status.
    pub fn message(status: Status, message: impl Into<String>) -> Self {
        Self::new(status, ResponseBody::Message(message.into()))
    }

    /// 202 response pointing at the monitor location of a task.
    pub fn accepted(location: impl Into<String>, task_id: impl Into<TaskId>) -> Self {
        let location = location.into();
        Self::new(
            Status::Accepted,
            ResponseBody::Accepted {
                location: location.clone(),
                task_id: task_id.into(),
            },
        )
        .with_header("Location", location)
    }

    /// Error response; the message is the error's display text.
    pub fn from_error(error: &TaskModelError) -> Self {
        Self::message(error.status(), error.to_string())
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Look up a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The values of a successful response, if any.
    pub fn into_values(self) -> Option<Vec<Value>> {
        match self.body {
            ResponseBody::Values(values) => Some(values),
            _ => None,
        }
    }
}

impl From<TaskModelError> for Response {
    fn from(error: TaskModelError) -> Self {
        Response::from_error(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Accepted.code(), 202);
        assert_eq!(Status::NoContent.code(), 204);
        assert!(Status::ServiceUnavailable.is_error());
        assert!(!Status::Created.is_error());
    }

    #[test]
    fn test_accepted_sets_location() {
        let response = Response::accepted("/tasks/abc", "abc");
        assert_eq!(response.status, Status::Accepted);
        assert_eq!(response.header("Location"), Some("/tasks/abc"));
        assert!(matches!(
            response.body,
            ResponseBody::Accepted { ref task_id, .. } if task_id == "abc"
        ));
    }

    #[test]
    fn test_error_conversion() {
        let response: Response = TaskModelError::not_found("x").into();
        assert_eq!(response.status, Status::NotFound);
        assert_eq!(
            response.body,
            ResponseBody::Message("Task doesn't exist on the server.".to_string())
        );
    }

    #[test]
    fn test_into_values() {
        let response = Response::values(vec![json!(42)]);
        assert_eq!(response.into_values(), Some(vec![json!(42)]));
        assert_eq!(
            Response::message(Status::Created, "hi").into_values(),
            None
        );
    }
}
