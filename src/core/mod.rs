//! The task scheduler.
//!
//! The scheduler owns the task store and the collector, generates task ids,
//! wraps long-running handlers and installs the monitor endpoint that
//! pollers use to fetch results.

use crate::config::SchedulerConfig;
use crate::error::{TaskModelError, TaskModelResult};
use crate::store::{SharedStore, StoreFactory, StoreStats, TaskStore};
use crate::task::TaskId;
use crate::utils::random_task_id;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod collector;
pub mod flow;
pub mod monitor;
pub mod operation;
pub mod registry;

pub use collector::TaskCollector;
pub use flow::{AsyncFlow, Completion, FlowState, Outcome, ResponseReceiver};
pub use monitor::TaskMonitorEndpoint;
pub use operation::{Appraiser, AutoHandler, LongRunning, LongRunningOperation, ManualHandler};
pub use registry::{Args, Method, Operation, OperationRegistry};

use flow::FlowSettings;

/// Scheduler for long-running tasks.
///
/// # Examples
///
/// ```rust
/// use taskmodel::prelude::*;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> TaskModelResult<()> {
///     let scheduler = TaskScheduler::new(SchedulerConfig::default())?;
///     let mut operations = OperationRegistry::new();
///     scheduler.set_monitor(&mut operations);
///
///     let sum = scheduler
///         .wrap(LongRunning::auto(|args, done| async move {
///             let total: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
///             let _ = done.complete(vec![json!(total)]).await;
///         }))
///         .with_params(["x", "y"]);
///     operations.insert("/longTimeSum", std::sync::Arc::new(sum));
///
///     let accepted = operations.invoke("/longTimeSum", vec![json!(10), json!(30)]).await;
///     assert_eq!(accepted.status, Status::Accepted);
///     Ok(())
/// }
/// ```
pub struct TaskScheduler {
    config: SchedulerConfig,
    store: SharedStore,
    collector: Mutex<Option<TaskCollector>>,
}

impl TaskScheduler {
    /// Create a scheduler with an in-memory store.
    pub fn new(config: SchedulerConfig) -> TaskModelResult<Self> {
        let store = StoreFactory::in_memory(config.store.clone());
        Self::build(config, store)
    }

    /// Create a scheduler with a custom store.
    pub fn with_store<S: TaskStore + 'static>(
        config: SchedulerConfig,
        store: S,
    ) -> TaskModelResult<Self> {
        Self::build(config, Arc::new(store))
    }

    fn build(config: SchedulerConfig, store: SharedStore) -> TaskModelResult<Self> {
        config
            .validate()
            .map_err(|errors| TaskModelError::config(errors.join("; ")))?;

        tracing::debug!(
            "Task scheduler created: monitor {}, capacity {}, lifetime {}",
            config.monitor_url,
            store.capacity(),
            config.task_lifetime
        );

        Ok(Self {
            config,
            store,
            collector: Mutex::new(None),
        })
    }

    /// Start the periodic sweep, if an interval is configured.
    pub async fn start(&self) -> TaskModelResult<()> {
        let Some(period) = self.config.sweep_interval() else {
            tracing::debug!("No sweep interval configured, tasks are collected on demand");
            return Ok(());
        };

        let mut collector = self.collector.lock().await;
        if collector.is_some() {
            return Err(TaskModelError::config("Task collector is already running"));
        }

        *collector = Some(TaskCollector::start(Arc::clone(&self.store), period));
        Ok(())
    }

    /// Stop the periodic sweep.
    pub async fn shutdown(&self) -> TaskModelResult<()> {
        if let Some(collector) = self.collector.lock().await.take() {
            collector.stop();
        }
        Ok(())
    }

    /// Whether the periodic sweep is running.
    pub async fn is_collecting(&self) -> bool {
        self.collector
            .lock()
            .await
            .as_ref()
            .is_some_and(TaskCollector::is_running)
    }

    /// Run one sweep by hand.
    pub async fn collect(&self) -> TaskModelResult<u64> {
        self.store.sweep(1).await
    }

    /// Generate a new task identifier.
    pub fn new_task_id(&self) -> TaskId {
        random_task_id()
    }

    /// Open a flow for a new task, for routers that drive flows themselves.
    pub fn open_flow(&self) -> (AsyncFlow, ResponseReceiver) {
        self.flow_settings().open(self.new_task_id())
    }

    /// Rewrite a handler into a long-running operation.
    pub fn wrap(&self, long_running: LongRunning) -> LongRunningOperation {
        tracing::debug!("Wrapping {} long-running handler", long_running.mode());
        LongRunningOperation::new(self.flow_settings(), long_running)
    }

    /// Wrap a handler and register it at `path`.
    pub fn apply(
        &self,
        operations: &mut OperationRegistry,
        path: impl Into<String>,
        long_running: LongRunning,
    ) -> Arc<LongRunningOperation> {
        let operation = Arc::new(self.wrap(long_running));
        operations.insert(path, operation.clone());
        operation
    }

    /// Install the monitor endpoint at the configured URL template.
    pub fn set_monitor(&self, operations: &mut OperationRegistry) -> Arc<TaskMonitorEndpoint> {
        let endpoint = Arc::new(
            TaskMonitorEndpoint::new(
                Arc::clone(&self.store),
                self.config.remaining_time_header.clone(),
            )
            .with_method(self.config.monitor_method),
        );
        operations.insert(self.config.monitor_url.clone(), endpoint.clone());

        tracing::info!(
            "Task monitor installed at {} {}",
            self.config.monitor_method,
            self.config.monitor_url
        );
        endpoint
    }

    /// Prepare an application: install the monitor and start collecting.
    pub async fn init(
        &self,
        operations: &mut OperationRegistry,
    ) -> TaskModelResult<Arc<TaskMonitorEndpoint>> {
        let endpoint = self.set_monitor(operations);
        self.start().await?;
        Ok(endpoint)
    }

    /// The task store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Store statistics.
    pub async fn stats(&self) -> TaskModelResult<StoreStats> {
        self.store.stats().await
    }

    /// Get the configuration used by this scheduler.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            store: Arc::clone(&self.store),
            monitor_url: self.config.monitor_url.clone(),
            max_remaining_time_ms: self.config.effective_max_remaining_time(),
            task_lifetime: self.config.task_lifetime,
        }
    }
}
