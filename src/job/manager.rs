//! Job lifecycle: create jobs when work is accepted, finalize them when it ends.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, JobError};
use crate::job::state::{JOB_KIND, Job, JobStatus};
use crate::session::{Fields, Session};

/// Entity kind artifacts are stored under.
pub const COMPONENT_KIND: &str = "Component";

/// Creates and finalizes job records through one session.
///
/// Every state change is committed before returning.
pub struct JobManager {
    session: Arc<dyn Session>,
}

impl JobManager {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Persist a new `running` job and commit it.
    pub async fn create_job(
        &self,
        user_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Uuid, Error> {
        let job = Job::running(user_id, description);
        let entity = self.session.create(JOB_KIND, job.to_fields()).await?;
        self.session.commit().await?;

        info!(job_id = %entity.id, user_id = %job.user_id, "Job created");
        Ok(entity.id)
    }

    /// Load a job record.
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, Error> {
        let entity = self
            .session
            .get(JOB_KIND, job_id)
            .await?
            .ok_or(JobError::NotFound { id: job_id })?;
        Ok(Job::from_entity(&entity)?)
    }

    /// Set the terminal status of a job, optionally attaching an artifact,
    /// and commit.
    ///
    /// Calling this twice overwrites the first outcome.
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        success: bool,
        description: impl Into<String>,
        artifact_path: Option<&str>,
    ) -> Result<Job, Error> {
        let job = self.get_job(job_id).await?;
        let target = JobStatus::from_success(success);

        if !job.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: job_id,
                state: job.status.to_string(),
                target: target.to_string(),
            }
            .into());
        }
        if job.status.is_terminal() {
            warn!(job_id = %job_id, from = %job.status, to = %target, "Overwriting finished job");
        }

        let description = description.into();
        let mut fields = Fields::new();
        fields.insert("status".into(), target.to_string().into());
        fields.insert("description".into(), description.clone().into());
        fields.insert("finished_at".into(), Utc::now().to_rfc3339().into());

        if let Some(path) = artifact_path {
            let artifact_id = self.attach_artifact(path).await?;
            fields.insert("artifact_id".into(), artifact_id.to_string().into());
        }

        let entity = self.session.update(JOB_KIND, job_id, fields).await?;
        self.session.commit().await?;

        info!(job_id = %job_id, status = %target, "Job finished");
        Ok(Job::from_entity(&entity)?)
    }

    async fn attach_artifact(&self, path: &str) -> Result<Uuid, Error> {
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);

        let mut fields = Fields::new();
        fields.insert("name".into(), Value::from(name));
        fields.insert("file_system_path".into(), Value::from(path));

        let component = self.session.create(COMPONENT_KIND, fields).await?;
        debug!(component_id = %component.id, path, "Artifact attached");
        Ok(component.id)
    }
}
