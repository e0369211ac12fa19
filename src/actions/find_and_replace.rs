//! Find and replace text in one attribute of every selected entity.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::{Action, ActionContext, ActionDescriptor, FormField, LaunchReply, LaunchResult};
use crate::error::{Error, TaskError};
use crate::session::{Fields, Session};

/// Attributes offered in the form, as `(label, attribute)`.
const ATTRIBUTES: &[(&str, &str)] = &[
    ("Name", "name"),
    ("Description", "description"),
    ("Custom attribute", "custom_attribute"),
];

/// Asks for an attribute plus find / replace strings, then rewrites that
/// attribute on each selected entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindAndReplace;

impl FindAndReplace {
    pub const IDENTIFIER: &'static str = "find_and_replace";

    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new("Find and replace", Self::IDENTIFIER)
            .with_description("Replace text in an attribute of the selected entities")
    }

    /// `(attribute, find, replace)` once the form has been filled in.
    /// `replace` may be empty to delete the matched text.
    fn values(ctx: &ActionContext) -> Option<(&str, &str, &str)> {
        let attribute = ctx.value_str("attribute").filter(|s| !s.is_empty())?;
        let find = ctx.value_str("find").filter(|s| !s.is_empty())?;
        let replace = ctx.value_str("replace")?;
        Some((attribute, find, replace))
    }
}

#[async_trait]
impl Action for FindAndReplace {
    async fn discover(&self, _session: &dyn Session, ctx: &ActionContext) -> Result<bool, Error> {
        Ok(!ctx.entities.is_empty())
    }

    async fn interface(
        &self,
        _session: &dyn Session,
        ctx: &ActionContext,
    ) -> Result<Option<Vec<FormField>>, Error> {
        if Self::values(ctx).is_some() {
            return Ok(None);
        }
        Ok(Some(vec![
            FormField::enumerator("Attribute", "attribute", ATTRIBUTES),
            FormField::text("Find", "find"),
            FormField::text("Replace", "replace"),
        ]))
    }

    async fn launch(
        &self,
        session: &dyn Session,
        ctx: &ActionContext,
    ) -> Result<LaunchReply, Error> {
        info!(entities = ctx.entities.len(), "Launching find and replace");

        let Some((attribute, find, replace)) = Self::values(ctx) else {
            warn!("Find and replace launched without values, aborting");
            return Err(TaskError::Failed {
                identifier: Self::IDENTIFIER.to_string(),
                reason: "attribute and find text are required".to_string(),
            }
            .into());
        };

        let mut updated = 0;
        for entity_ref in &ctx.entities {
            let Ok(id) = Uuid::parse_str(&entity_ref.entity_id) else {
                warn!(entity_id = %entity_ref.entity_id, "Skipping entity with invalid id");
                continue;
            };
            let Some(entity) = session.get(&entity_ref.entity_type, id).await? else {
                debug!(entity_id = %id, "Entity not found, skipping");
                continue;
            };
            let Some(value) = entity.get_str(attribute) else {
                continue;
            };

            let replaced = value.replace(find, replace);
            if replaced != value {
                let mut fields = Fields::new();
                fields.insert(attribute.to_string(), replaced.into());
                session.update(&entity_ref.entity_type, id, fields).await?;
                updated += 1;
            }
        }

        Ok(LaunchResult::success(format!(
            "Find and replace \"{find}\" with \"{replace}\" \
             on attribute \"{attribute}\" ({updated} updated)"
        ))
        .into())
    }
}
