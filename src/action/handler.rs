//! Connects an [`Action`] to the event bus.
//!
//! Discover events are answered with the action's descriptor when the
//! action accepts the selection. Launch events either return the action's
//! form, run the launch in place, or (in queued mode) clone the session,
//! create a job, and hand the launch to the worker pool.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event::ActionEvent;
use super::hub::{EventHub, Subscription};
use super::resolver::{EntityTypeResolver, PassthroughResolver};
use super::{Action, ActionContext, ActionDescriptor, FormField, LaunchResult};
use crate::config::HandlerConfig;
use crate::error::{ConfigError, Error, TranslationError};
use crate::job::JobManager;
use crate::session::Session;
use crate::worker::{Task, WorkerPool};

/// How launches are executed.
#[derive(Clone)]
pub enum LaunchMode {
    /// Run on the dispatching task with the handler's own session.
    Synchronous,
    /// Run on the pool with a cloned session and a tracking job.
    Queued(Arc<WorkerPool>),
}

impl std::fmt::Debug for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synchronous => write!(f, "Synchronous"),
            Self::Queued(pool) => write!(f, "Queued({} workers)", pool.size()),
        }
    }
}

/// One entry of a discover reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverItem {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "actionIdentifier")]
    pub action_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub items: Vec<DiscoverItem>,
}

/// Reply to a launch event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LaunchResponse {
    /// The action needs input first.
    Form { items: Vec<FormField> },
    Result {
        success: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact_path: Option<String>,
    },
}

impl LaunchResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Result {
            success: false,
            message: message.into(),
            artifact_path: None,
        }
    }

    /// `None` for a form reply.
    pub fn success(&self) -> Option<bool> {
        match self {
            Self::Form { .. } => None,
            Self::Result { success, .. } => Some(*success),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Form { .. } => None,
            Self::Result { message, .. } => Some(message),
        }
    }
}

impl From<LaunchResult> for LaunchResponse {
    fn from(result: LaunchResult) -> Self {
        Self::Result {
            success: result.success,
            message: result.message,
            artifact_path: result.artifact_path,
        }
    }
}

/// Binds an action to its descriptor, session and launch mode.
pub struct ActionHandler {
    descriptor: ActionDescriptor,
    action: Arc<dyn Action>,
    session: Arc<dyn Session>,
    resolver: Arc<dyn EntityTypeResolver>,
    mode: LaunchMode,
}

impl ActionHandler {
    /// Create a synchronous handler. Fails if the descriptor has no label
    /// or identifier.
    pub fn new(
        descriptor: ActionDescriptor,
        action: Arc<dyn Action>,
        session: Arc<dyn Session>,
    ) -> Result<Self, ConfigError> {
        descriptor.validate()?;
        Ok(Self {
            descriptor,
            action,
            session,
            resolver: Arc::new(PassthroughResolver),
            mode: LaunchMode::Synchronous,
        })
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn EntityTypeResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run launches on `pool` with job tracking.
    pub fn queued(mut self, pool: Arc<WorkerPool>) -> Self {
        self.mode = LaunchMode::Queued(pool);
        self
    }

    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> &LaunchMode {
        &self.mode
    }

    /// Subscribe to discover events and to launch events addressed to this
    /// action.
    pub async fn register(self: Arc<Self>, hub: &dyn EventHub, config: &HandlerConfig) {
        let handler = Arc::clone(&self);
        hub.subscribe(
            Subscription::Topic(config.discover_topic.clone()),
            Arc::new(move |event: ActionEvent| -> BoxFuture<'static, Option<Value>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let response = handler.handle_discover(&event).await?;
                    serde_json::to_value(response).ok()
                })
            }),
        )
        .await;

        let handler = Arc::clone(&self);
        hub.subscribe(
            Subscription::Action {
                topic: config.launch_topic.clone(),
                identifier: self.descriptor.identifier.clone(),
            },
            Arc::new(move |event: ActionEvent| -> BoxFuture<'static, Option<Value>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let response = handler.handle_launch(&event).await;
                    serde_json::to_value(response).ok()
                })
            }),
        )
        .await;

        info!(
            identifier = %self.descriptor.identifier,
            mode = ?self.mode,
            "Action registered"
        );
    }

    /// Answer a discover event. `None` means the action is not offered,
    /// including when the event cannot be translated.
    pub async fn handle_discover(&self, event: &ActionEvent) -> Option<DiscoverResponse> {
        match self.discover(event).await {
            Ok(true) => Some(DiscoverResponse {
                items: vec![DiscoverItem {
                    label: self.descriptor.label.clone(),
                    description: self.descriptor.description.clone(),
                    action_identifier: self.descriptor.identifier.clone(),
                    variant: self.descriptor.variant.clone(),
                    icon: self.descriptor.icon.clone(),
                }],
            }),
            Ok(false) => None,
            Err(e) => {
                warn!(
                    identifier = %self.descriptor.identifier,
                    event_id = %event.id,
                    error = %e,
                    "Discovery failed"
                );
                None
            }
        }
    }

    async fn discover(&self, event: &ActionEvent) -> Result<bool, Error> {
        let ctx = event.translate(self.resolver.as_ref())?;
        if !self.descriptor.allows(&ctx.entities) {
            return Ok(false);
        }
        self.action.discover(self.session.as_ref(), &ctx).await
    }

    /// Answer a launch event. Failures become `{success: false, message}`.
    pub async fn handle_launch(&self, event: &ActionEvent) -> LaunchResponse {
        match self.launch(event).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    identifier = %self.descriptor.identifier,
                    event_id = %event.id,
                    error = %e,
                    "Launch failed"
                );
                LaunchResponse::failure(e.to_string())
            }
        }
    }

    async fn launch(&self, event: &ActionEvent) -> Result<LaunchResponse, Error> {
        let identifier = &self.descriptor.identifier;
        if event.data.action_identifier.as_deref() != Some(identifier.as_str()) {
            return Err(TranslationError::IdentifierMismatch {
                expected: identifier.clone(),
                got: event.data.action_identifier.clone().unwrap_or_default(),
            }
            .into());
        }

        let ctx = event.translate(self.resolver.as_ref())?;

        if let Some(form) = self.action.interface(self.session.as_ref(), &ctx).await?
            && !form.is_empty()
        {
            debug!(identifier = %identifier, fields = form.len(), "Returning interface");
            return Ok(LaunchResponse::Form { items: form });
        }

        let result = match &self.mode {
            LaunchMode::Synchronous => self.launch_now(&ctx).await?,
            LaunchMode::Queued(pool) => self.launch_queued(pool, ctx).await?,
        };
        Ok(result.into())
    }

    async fn launch_now(&self, ctx: &ActionContext) -> Result<LaunchResult, Error> {
        let outcome = async {
            let reply = self.action.launch(self.session.as_ref(), ctx).await?;
            let result = with_default_message(reply.into_result()?, &self.descriptor.label);
            self.session.commit().await?;
            Ok::<_, Error>(result)
        }
        .await;

        if outcome.is_err() {
            self.session.rollback().await;
        }
        outcome
    }

    async fn launch_queued(
        &self,
        pool: &WorkerPool,
        ctx: ActionContext,
    ) -> Result<LaunchResult, Error> {
        let session = self.session.clone_session()?;
        let label = self.descriptor.label.clone();

        let job_id = JobManager::new(Arc::clone(&session))
            .create_job(&ctx.user_id, format!("Running '{label}'"))
            .await?;

        let action = Arc::clone(&self.action);
        let job_label = label.clone();
        let task = Task::new(
            session,
            ctx,
            move |session, ctx| async move {
                let reply = action.launch(session.as_ref(), &ctx).await?;
                Ok::<_, Error>(reply.into_result()?)
            },
            move |session, outcome, _ctx| finish_job(session, job_id, job_label, outcome),
        )
        .with_job(job_id)
        .with_action(self.descriptor.identifier.clone());

        pool.submit(task).await;

        Ok(LaunchResult::success(format!("Launched action '{label}'")))
    }
}

/// Fill in a message when the action reported an empty one.
fn with_default_message(mut result: LaunchResult, label: &str) -> LaunchResult {
    if result.message.trim().is_empty() {
        let verb = if result.success { "completed" } else { "failed" };
        result.message = format!("Action '{label}' {verb}");
    }
    result
}

/// Completion callback for queued launches: record the outcome on the job.
///
/// Errors from the launch roll back its uncommitted changes and fail the
/// job. If saving the result itself fails, one more attempt is made to mark
/// the job failed before the error is returned to the worker.
async fn finish_job(
    session: Arc<dyn Session>,
    job_id: Uuid,
    label: String,
    outcome: Result<LaunchResult, Error>,
) -> Result<(), Error> {
    let (success, message, artifact_path) = match outcome {
        Ok(result) => {
            let result = with_default_message(result, &label);
            (result.success, result.message, result.artifact_path)
        }
        Err(e) => {
            session.rollback().await;
            (false, format!("Action '{label}' failed: {e}"), None)
        }
    };

    let jobs = JobManager::new(Arc::clone(&session));
    match jobs
        .complete_job(job_id, success, message, artifact_path.as_deref())
        .await
    {
        Ok(_) => Ok(()),
        Err(e) => {
            session.rollback().await;
            error!(job_id = %job_id, error = %e, "Could not save job result, marking job failed");
            if let Err(retry) = jobs
                .complete_job(
                    job_id,
                    false,
                    format!("Action '{label}' could not save its result: {e}"),
                    None,
                )
                .await
            {
                error!(job_id = %job_id, error = %retry, "Could not mark job failed");
            }
            Err(e)
        }
    }
}
