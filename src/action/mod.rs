//! Actions: discoverable, launchable units of user-triggered behavior.
//!
//! A concrete action implements [`Action`]. An [`ActionHandler`] wraps it
//! with its [`ActionDescriptor`], translates bus events, and either runs the
//! launch in place or hands it to the worker pool with job tracking.

pub mod event;
pub mod handler;
pub mod hub;
pub mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, Error, ResultError};
use crate::session::Session;

pub use event::{ActionEvent, EventData, EventSource, EventUser, SelectionItem};
pub use handler::{ActionHandler, DiscoverItem, DiscoverResponse, LaunchMode, LaunchResponse};
pub use hub::{EventCallback, EventHub, LocalEventHub, Subscription};
pub use resolver::{EntityTypeResolver, PassthroughResolver};

/// Static description of an action, fixed per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub label: String,
    pub identifier: String,
    pub description: Option<String>,
    pub variant: Option<String>,
    pub icon: Option<String>,
    /// Entity types the action is offered for. Empty means any.
    pub allowed_entity_types: Vec<String>,
}

impl ActionDescriptor {
    pub fn new(label: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            identifier: identifier.into(),
            description: None,
            variant: None,
            icon: None,
            allowed_entity_types: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_allowed_entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_entity_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Reject descriptors that cannot be registered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.label.trim().is_empty() {
            return Err(ConfigError::MissingLabel);
        }
        if self.identifier.trim().is_empty() {
            return Err(ConfigError::MissingIdentifier);
        }
        Ok(())
    }

    /// Whether every selected entity is of an allowed type.
    pub fn allows(&self, entities: &[EntityRef]) -> bool {
        self.allowed_entity_types.is_empty()
            || entities.iter().all(|e| {
                self.allowed_entity_types
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&e.entity_type))
            })
    }
}

/// A selected entity, with its type already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

/// Arguments an action receives, translated from the inbound event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    /// Id of the event source.
    pub event_id: String,
    pub entities: Vec<EntityRef>,
    /// User who triggered the event.
    pub user_id: String,
    /// Form values from a previous interface round, if any.
    pub values: serde_json::Map<String, Value>,
}

impl ActionContext {
    pub fn value_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }
}

/// Validated outcome of a launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

impl LaunchResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            artifact_path: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            artifact_path: None,
        }
    }

    pub fn with_artifact(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }
}

/// What a launch returns before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchReply {
    /// Bare success flag; a default message is filled in.
    Flag(bool),
    Report(LaunchResult),
    /// Free-form object that must carry `success` and `message`.
    Json(Value),
}

impl From<bool> for LaunchReply {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<LaunchResult> for LaunchReply {
    fn from(result: LaunchResult) -> Self {
        Self::Report(result)
    }
}

impl From<Value> for LaunchReply {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl LaunchReply {
    /// Check the reply against the `{success, message}` contract.
    pub fn into_result(self) -> Result<LaunchResult, ResultError> {
        match self {
            Self::Flag(true) => Ok(LaunchResult::success("Action completed")),
            Self::Flag(false) => Ok(LaunchResult::failure("Action failed")),
            Self::Report(result) => Ok(result),
            Self::Json(Value::Bool(flag)) => Self::Flag(flag).into_result(),
            Self::Json(Value::Object(map)) => {
                let success = match map.get("success") {
                    None => return Err(ResultError::MissingKey("success")),
                    Some(Value::Bool(b)) => *b,
                    Some(_) => {
                        return Err(ResultError::WrongKeyType {
                            key: "success",
                            expected: "boolean",
                        });
                    }
                };
                let message = match map.get("message") {
                    None => return Err(ResultError::MissingKey("message")),
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => {
                        return Err(ResultError::WrongKeyType {
                            key: "message",
                            expected: "string",
                        });
                    }
                };
                let artifact_path = map
                    .get("artifact_path")
                    .or_else(|| map.get("artifactPath"))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                Ok(LaunchResult {
                    success,
                    message,
                    artifact_path,
                })
            }
            Self::Json(other) => Err(ResultError::InvalidType(json_type_name(&other).to_string())),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One field of an action's configuration form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub label: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl FormField {
    pub fn text(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            field_type: "text".to_string(),
            label: label.into(),
            name: name.into(),
            value: None,
            data: None,
        }
    }

    /// Drop-down of `(label, value)` options, defaulting to the first.
    pub fn enumerator(
        label: impl Into<String>,
        name: impl Into<String>,
        options: &[(&str, &str)],
    ) -> Self {
        let data: Vec<Value> = options
            .iter()
            .map(|(label, value)| serde_json::json!({ "label": label, "value": value }))
            .collect();
        Self {
            field_type: "enumerator".to_string(),
            label: label.into(),
            name: name.into(),
            value: options.first().map(|(_, value)| Value::from(*value)),
            data: Some(Value::Array(data)),
        }
    }
}

/// The capability interface concrete actions implement.
#[async_trait]
pub trait Action: Send + Sync {
    /// Whether the action should be offered for this selection.
    async fn discover(&self, session: &dyn Session, ctx: &ActionContext) -> Result<bool, Error>;

    /// Perform the action's work.
    async fn launch(&self, session: &dyn Session, ctx: &ActionContext)
    -> Result<LaunchReply, Error>;

    /// A form to show before launching, or `None` to launch directly.
    async fn interface(
        &self,
        _session: &dyn Session,
        _ctx: &ActionContext,
    ) -> Result<Option<Vec<FormField>>, Error> {
        Ok(None)
    }
}
