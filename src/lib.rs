//! # taskmodel
//!
//! Long-running operations for Rust services.
//!
//! A slow handler is wrapped by a [`TaskScheduler`]: the caller gets
//! `202 Accepted` with a poll location right away, the handler runs in the
//! background, and the result is fetched (once) from the monitor endpoint.
//!
//! ## Features
//!
//! - **Bounded admission**: the store holds at most `capacity` tasks, extra
//!   requests are declined with `400`
//! - **Run-time budget**: appraised requests that would take too long are
//!   declined before any work starts
//! - **Retry hints**: polling an executing task returns `Retry-After`
//! - **Garbage collection**: tasks nobody polls are swept after a few
//!   generations
//!
//! ## Quick Start
//!
//! ```rust
//! use taskmodel::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> TaskModelResult<()> {
//!     let config = SchedulerConfig::default().with_max_remaining_time(60_000);
//!     let scheduler = TaskScheduler::new(config)?;
//!
//!     let mut operations = OperationRegistry::new();
//!     let monitor = scheduler.init(&mut operations).await?;
//!
//!     let report = scheduler.wrap(LongRunning::appraised(
//!         |args, done| async move {
//!             let _ = done.complete(args).await;
//!         },
//!         |_args| Some(5_000),
//!     ));
//!     operations.insert("/report", Arc::new(report));
//!
//!     let accepted = operations.invoke("/report", vec![json!("q3")]).await;
//!     assert_eq!(accepted.status, Status::Accepted);
//!     let location = accepted.header("Location").unwrap_or_default().to_string();
//!     let task_id = location.trim_start_matches("/tasks/");
//!
//!     let _ = monitor.poll(task_id).await;
//!     scheduler.shutdown().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod response;
pub mod store;
pub mod task;
pub mod utils;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::core::{
        Args, AsyncFlow, Completion, FlowState, LongRunning, LongRunningOperation, Method,
        Operation, OperationRegistry, Outcome, TaskCollector, TaskMonitorEndpoint, TaskScheduler,
    };
    pub use crate::error::{TaskModelError, TaskModelResult};
    pub use crate::response::{Response, ResponseBody, Status};
    pub use crate::store::{
        Dequeued, InMemoryStore, SharedStore, StoreFactory, StoreStats, TaskStore,
    };
    pub use crate::task::{ProgressNotification, Task, TaskId, TaskState, TaskUpdate};
    pub use async_trait::async_trait;
}

pub use crate::config::*;
pub use crate::core::{
    Args, AsyncFlow, Completion, FlowState, LongRunning, LongRunningOperation, Method, Operation,
    OperationRegistry, Outcome, TaskCollector, TaskMonitorEndpoint, TaskScheduler,
};
pub use crate::error::{TaskModelError, TaskModelResult};
pub use crate::response::{Response, ResponseBody, Status};
pub use crate::store::{Dequeued, InMemoryStore, SharedStore, StoreFactory, StoreStats, TaskStore};
pub use crate::task::{ProgressNotification, Task, TaskId, TaskState, TaskUpdate};
pub use async_trait::async_trait;
