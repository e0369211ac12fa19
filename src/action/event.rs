//! Inbound bus events and their translation into [`ActionContext`].
//!
//! Only the fields the handler reads are modelled; everything else in the
//! platform's payload is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::resolver::EntityTypeResolver;
use super::{ActionContext, EntityRef};
use crate::error::TranslationError;

/// An event delivered by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    #[serde(default = "new_event_id")]
    pub id: String,
    pub topic: String,
    pub source: EventSource,
    #[serde(default)]
    pub data: EventData,
}

fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    pub id: String,
    pub user: EventUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_identifier: Option<String>,
    #[serde(default)]
    pub selection: Vec<SelectionItem>,
    #[serde(default)]
    pub values: serde_json::Map<String, Value>,
}

/// A raw selection entry, before its type token is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionItem {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type_id: Option<String>,
}

impl ActionEvent {
    pub fn new(
        topic: impl Into<String>,
        source_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_event_id(),
            topic: topic.into(),
            source: EventSource {
                id: source_id.into(),
                user: EventUser {
                    id: user_id.into(),
                    username: None,
                },
            },
            data: EventData::default(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.data.action_identifier = Some(identifier.into());
        self
    }

    pub fn with_selection(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.data.selection.push(SelectionItem {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            object_type_id: None,
        });
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.values.insert(name.into(), value.into());
        self
    }

    /// Parse a raw JSON payload.
    pub fn from_value(value: Value) -> Result<Self, TranslationError> {
        serde_json::from_value(value).map_err(|e| TranslationError::MalformedEvent(e.to_string()))
    }

    /// Translate into the arguments an action receives.
    pub fn translate(
        &self,
        resolver: &dyn EntityTypeResolver,
    ) -> Result<ActionContext, TranslationError> {
        if self.source.id.trim().is_empty() {
            return Err(TranslationError::MalformedEvent(
                "missing source id".to_string(),
            ));
        }
        if self.source.user.id.trim().is_empty() {
            return Err(TranslationError::MalformedEvent(
                "missing source user id".to_string(),
            ));
        }

        let entities = self
            .data
            .selection
            .iter()
            .map(|item| {
                if item.entity_id.trim().is_empty() {
                    return Err(TranslationError::MalformedEvent(
                        "selection entry without entityId".to_string(),
                    ));
                }
                Ok(EntityRef::new(resolver.resolve(item)?, item.entity_id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ActionContext {
            event_id: self.source.id.clone(),
            entities,
            user_id: self.source.user.id.clone(),
            values: self.data.values.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::action::resolver::PassthroughResolver;

    #[test]
    fn parses_platform_payload() {
        let event = ActionEvent::from_value(json!({
            "topic": "ftrack.action.launch",
            "source": {"id": "src-1", "user": {"id": "user-1", "username": "jane"}},
            "data": {
                "actionIdentifier": "my.action",
                "selection": [
                    {"entityType": "task", "entityId": "e-1", "objectTypeId": "ot-1"}
                ],
                "values": {"find": "a"}
            }
        }))
        .unwrap();

        assert_eq!(event.data.action_identifier.as_deref(), Some("my.action"));
        assert_eq!(event.data.selection[0].object_type_id.as_deref(), Some("ot-1"));
        assert!(!event.id.is_empty());
    }

    #[test]
    fn missing_source_is_malformed() {
        let result = ActionEvent::from_value(json!({"topic": "ftrack.action.launch"}));
        assert!(matches!(result, Err(TranslationError::MalformedEvent(_))));
    }

    #[test]
    fn translate_builds_context() {
        let event = ActionEvent::new("ftrack.action.launch", "src-1", "user-1")
            .with_selection("Shot", "e-1")
            .with_selection("Shot", "e-2")
            .with_value("find", "old");

        let ctx = event.translate(&PassthroughResolver).unwrap();
        assert_eq!(ctx.event_id, "src-1");
        assert_eq!(ctx.user_id, "user-1");
        assert_eq!(
            ctx.entities,
            vec![EntityRef::new("Shot", "e-1"), EntityRef::new("Shot", "e-2")]
        );
        assert_eq!(ctx.value_str("find"), Some("old"));
    }

    #[test]
    fn translate_rejects_blank_user() {
        let event = ActionEvent::new("ftrack.action.launch", "src-1", "");
        assert!(matches!(
            event.translate(&PassthroughResolver),
            Err(TranslationError::MalformedEvent(_))
        ));
    }

    #[test]
    fn translate_rejects_unresolvable_type() {
        let event =
            ActionEvent::new("ftrack.action.launch", "src-1", "user-1").with_selection("", "e-1");
        assert!(matches!(
            event.translate(&PassthroughResolver),
            Err(TranslationError::UnknownEntityType { .. })
        ));
    }
}
