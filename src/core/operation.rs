//! Long-running operations: handlers wrapped by the scheduler.
//!
//! An operation opts into the task model with a [`LongRunning`] marker that
//! carries the handler for its mode:
//!
//! - **Auto**: the scheduler admits the task before the handler runs and
//!   hands it a [`Completion`] callback.
//! - **Appraised**: like auto, but an appraiser estimates the remaining time
//!   from the arguments first, so slow requests are declined up front.
//! - **Manual**: the handler gets the [`AsyncFlow`] itself and decides when
//!   (and whether) to call `begin_invoke`.

use crate::core::flow::{AsyncFlow, Completion, FlowSettings};
use crate::core::registry::{Args, Method, Operation};
use crate::response::{Response, Status};
use crate::utils::random_task_id;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Handler receiving a bound completion callback.
pub type AutoHandler = Arc<dyn Fn(Args, Completion) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler driving its own flow.
pub type ManualHandler = Arc<dyn Fn(Args, AsyncFlow) -> BoxFuture<'static, ()> + Send + Sync>;

/// Estimates the remaining time (in milliseconds) of a call from its arguments.
pub type Appraiser = Arc<dyn Fn(Args) -> BoxFuture<'static, Option<u64>> + Send + Sync>;

/// Long-running mode of an operation, with the handler for that mode.
#[derive(Clone)]
pub enum LongRunning {
    /// Admit first, then run the handler in the background
    Auto(AutoHandler),
    /// Appraise, admit, then run the handler in the background
    Appraised {
        /// The handler
        handler: AutoHandler,
        /// Remaining-time estimator
        appraise: Appraiser,
    },
    /// The handler drives admission and completion itself
    Manual(ManualHandler),
}

impl LongRunning {
    /// Auto mode from an async closure.
    pub fn auto<F, Fut>(handler: F) -> Self
    where
        F: Fn(Args, Completion) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        LongRunning::Auto(Arc::new(move |args, done| handler(args, done).boxed()))
    }

    /// Auto mode with a remaining-time appraiser.
    pub fn appraised<F, Fut, A>(handler: F, appraise: A) -> Self
    where
        F: Fn(Args, Completion) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        A: Fn(&[Value]) -> Option<u64> + Send + Sync + 'static,
    {
        Self::appraised_async(handler, move |args: Args| {
            future::ready(appraise(args.as_slice()))
        })
    }

    /// Auto mode with an appraiser that may await before estimating.
    pub fn appraised_async<F, Fut, A, AFut>(handler: F, appraise: A) -> Self
    where
        F: Fn(Args, Completion) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        A: Fn(Args) -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Option<u64>> + Send + 'static,
    {
        LongRunning::Appraised {
            handler: Arc::new(move |args, done| handler(args, done).boxed()),
            appraise: Arc::new(move |args| appraise(args).boxed()),
        }
    }

    /// Manual mode from an async closure.
    pub fn manual<F, Fut>(handler: F) -> Self
    where
        F: Fn(Args, AsyncFlow) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        LongRunning::Manual(Arc::new(move |args, flow| handler(args, flow).boxed()))
    }

    /// Short mode name, for logs.
    pub fn mode(&self) -> &'static str {
        match self {
            LongRunning::Auto(_) => "auto",
            LongRunning::Appraised { .. } => "appraised",
            LongRunning::Manual(_) => "manual",
        }
    }
}

impl fmt::Debug for LongRunning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LongRunning").field(&self.mode()).finish()
    }
}

/// A handler rewritten by the scheduler to answer 202 and run in the background.
pub struct LongRunningOperation {
    settings: FlowSettings,
    long_running: LongRunning,
    method: Method,
    params: Vec<String>,
}

impl LongRunningOperation {
    pub(crate) fn new(settings: FlowSettings, long_running: LongRunning) -> Self {
        Self {
            settings,
            long_running,
            method: Method::default(),
            params: Vec::new(),
        }
    }

    /// Set the HTTP method (POST by default).
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Declare parameter names.
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Long-running mode of this operation.
    pub fn long_running(&self) -> &LongRunning {
        &self.long_running
    }

    async fn run_auto(
        &self,
        handler: &AutoHandler,
        appraise: Option<&Appraiser>,
        args: Args,
        flow: AsyncFlow,
    ) {
        let remaining_time_ms = match appraise {
            Some(appraise) => appraise(args.clone()).await,
            None => None,
        };

        // on rejection the caller already has its error response
        if flow.begin_invoke(remaining_time_ms).await.is_err() {
            return;
        }

        let task = handler(args, Completion::new(flow));
        tokio::spawn(task);
    }
}

#[async_trait]
impl Operation for LongRunningOperation {
    fn method(&self) -> Method {
        self.method
    }

    fn params(&self) -> &[String] {
        &self.params
    }

    async fn invoke(&self, args: Args) -> Response {
        let (flow, reply) = self.settings.open(random_task_id());
        tracing::trace!(
            "Invoking {} operation for task {}",
            self.long_running.mode(),
            flow.task_id()
        );

        match &self.long_running {
            LongRunning::Auto(handler) => self.run_auto(handler, None, args, flow).await,
            LongRunning::Appraised { handler, appraise } => {
                self.run_auto(handler, Some(appraise), args, flow).await
            }
            LongRunning::Manual(handler) => {
                tokio::spawn(handler(args, flow));
            }
        }

        reply.await.unwrap_or_else(|_| {
            tracing::error!("Long-running handler finished without replying");
            Response::message(
                Status::InternalServerError,
                "The operation completed without a response.",
            )
        })
    }
}

impl fmt::Debug for LongRunningOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongRunningOperation")
            .field("mode", &self.long_running.mode())
            .field("method", &self.method)
            .field("params", &self.params)
            .finish()
    }
}
