//! Units of work for the worker pool.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::action::{ActionContext, LaunchResult};
use crate::error::Error;
use crate::session::Session;

/// The callable a task runs: business logic against the task's own session.
pub type TaskWork = Box<
    dyn FnOnce(Arc<dyn Session>, ActionContext) -> BoxFuture<'static, Result<LaunchResult, Error>>
        + Send,
>;

/// Invoked exactly once with the outcome of [`TaskWork`], including failures.
pub type TaskCallback = Box<
    dyn FnOnce(
            Arc<dyn Session>,
            Result<LaunchResult, Error>,
            ActionContext,
        ) -> BoxFuture<'static, Result<(), Error>>
        + Send,
>;

/// A queued launch. Consumed by exactly one worker.
pub struct Task {
    pub id: Uuid,
    /// Job tracking this task, if any. Used for log context.
    pub job_id: Option<Uuid>,
    /// Identifier of the action the task belongs to.
    pub action: String,
    pub args: ActionContext,
    pub session: Arc<dyn Session>,
    pub(crate) work: TaskWork,
    pub(crate) callback: TaskCallback,
}

impl Task {
    pub fn new<W, WFut, C, CFut>(
        session: Arc<dyn Session>,
        args: ActionContext,
        work: W,
        callback: C,
    ) -> Self
    where
        W: FnOnce(Arc<dyn Session>, ActionContext) -> WFut + Send + 'static,
        WFut: Future<Output = Result<LaunchResult, Error>> + Send + 'static,
        C: FnOnce(Arc<dyn Session>, Result<LaunchResult, Error>, ActionContext) -> CFut
            + Send
            + 'static,
        CFut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            job_id: None,
            action: String::new(),
            args,
            session,
            work: Box::new(move |session, args| Box::pin(work(session, args))),
            callback: Box::new(move |session, result, args| {
                Box::pin(callback(session, result, args))
            }),
        }
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_action(mut self, identifier: impl Into<String>) -> Self {
        self.action = identifier.into();
        self
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("job_id", &self.job_id)
            .field("action", &self.action)
            .field("args", &self.args)
            .field("session", &self.session.id())
            .finish_non_exhaustive()
    }
}
