//! Entity type resolution seam.
//!
//! Mapping a raw selection token to a schema-qualified type needs the
//! platform's schema list; that lookup lives behind this trait.

use super::event::SelectionItem;
use crate::error::TranslationError;

/// Resolves the raw `entityType` token of a selection entry.
pub trait EntityTypeResolver: Send + Sync {
    fn resolve(&self, item: &SelectionItem) -> Result<String, TranslationError>;
}

/// Uses the raw token unchanged. Only an empty token fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl EntityTypeResolver for PassthroughResolver {
    fn resolve(&self, item: &SelectionItem) -> Result<String, TranslationError> {
        let token = item.entity_type.trim();
        if token.is_empty() {
            return Err(TranslationError::UnknownEntityType {
                entity_type: item.entity_type.clone(),
            });
        }
        Ok(token.to_string())
    }
}
