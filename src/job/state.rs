//! Job state machine and record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::session::{Entity, Fields};

/// Entity kind job records are stored under.
pub const JOB_KIND: &str = "Job";

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Work is queued or executing.
    Running,
    /// Work finished successfully.
    Done,
    /// Work failed.
    Failed,
}

impl JobStatus {
    /// Check if this status allows transitioning to another status.
    ///
    /// Terminal statuses may be overwritten by another terminal status, but
    /// nothing ever goes back to `Running`.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Running, Done) | (Running, Failed) |
            (Done, Done) | (Done, Failed) |
            (Failed, Failed) | (Failed, Done)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Terminal status for a launch outcome.
    pub fn from_success(success: bool) -> Self {
        if success { Self::Done } else { Self::Failed }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A persisted job, as seen by the user who launched the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// User the job belongs to.
    pub user_id: String,
    pub status: JobStatus,
    /// Human-readable progress or result message.
    pub description: String,
    /// Component produced by the job, if any.
    pub artifact_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh job in `Running` status.
    pub fn running(user_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            status: JobStatus::Running,
            description: description.into(),
            artifact_id: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Field map for storage. The id lives on the entity itself.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("user_id".into(), self.user_id.clone().into());
        fields.insert("status".into(), self.status.to_string().into());
        fields.insert("description".into(), self.description.clone().into());
        fields.insert(
            "artifact_id".into(),
            self.artifact_id
                .map(|id| id.to_string().into())
                .unwrap_or(serde_json::Value::Null),
        );
        fields.insert("created_at".into(), self.created_at.to_rfc3339().into());
        fields.insert(
            "finished_at".into(),
            self.finished_at
                .map(|t| t.to_rfc3339().into())
                .unwrap_or(serde_json::Value::Null),
        );
        fields
    }

    /// Rebuild a job from its stored entity.
    pub fn from_entity(entity: &Entity) -> Result<Self, JobError> {
        let malformed = |reason: &str| JobError::Malformed {
            id: entity.id,
            reason: reason.to_string(),
        };

        let status = entity
            .get_str("status")
            .and_then(JobStatus::parse)
            .ok_or_else(|| malformed("missing or unknown status"))?;

        let created_at = entity
            .get_str("created_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| malformed("missing created_at"))?;

        let finished_at = entity
            .get_str("finished_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc));

        let artifact_id = match entity.get_str("artifact_id") {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| malformed("bad artifact_id"))?),
            None => None,
        };

        Ok(Self {
            id: entity.id,
            user_id: entity.get_str("user_id").unwrap_or_default().to_string(),
            status,
            description: entity.get_str("description").unwrap_or_default().to_string(),
            artifact_id,
            created_at,
            finished_at,
        })
    }
}
