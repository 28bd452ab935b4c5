//! Operation registry shared with the HTTP router.
//!
//! The router owns the wire format; the task model only needs a table of
//! operations keyed by URL template. Each [`Operation`] declares its method
//! and parameter names and turns already-deserialized arguments into a
//! [`Response`].

use crate::response::{Response, Status};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Deserialized call arguments, in declaration order.
pub type Args = Vec<Value>;

/// HTTP method of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Method {
    /// GET
    Get,
    /// POST
    #[default]
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// An operation the router can dispatch to.
#[async_trait]
pub trait Operation: Send + Sync {
    /// HTTP method
    fn method(&self) -> Method;

    /// Declared parameter names, in argument order
    fn params(&self) -> &[String];

    /// Handle one call and produce the synchronous reply.
    async fn invoke(&self, args: Args) -> Response;
}

/// Table of operations keyed by URL template.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation, returning the one it replaced.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        operation: Arc<dyn Operation>,
    ) -> Option<Arc<dyn Operation>> {
        let path = path.into();
        tracing::debug!("Registering {} {}", operation.method(), path);
        self.operations.insert(path, operation)
    }

    /// Look up an operation.
    pub fn get(&self, path: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(path).cloned()
    }

    /// Whether an operation is registered at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.operations.contains_key(path)
    }

    /// Registered URL templates, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.operations.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Dispatch a call; unknown paths yield a 404 response.
    pub async fn invoke(&self, path: &str, args: Args) -> Response {
        match self.get(path) {
            Some(operation) => operation.invoke(args).await,
            None => Response::message(
                Status::NotFound,
                format!("Operation {} is not registered", path),
            ),
        }
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}
