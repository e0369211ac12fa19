//! Sessions: authenticated handles used to read and write platform data.
//!
//! A session buffers created/updated entities until `commit()`. Sessions are
//! not meant to be shared between concurrent units of work: background
//! launches get their own handle through [`Session::clone_session`].

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionCredentials;
use crate::error::{SessionError, StoreError};

pub use memory::{MemorySession, MemoryStore};

/// Field map of an entity.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Predicate used by [`Session::query`].
pub type Predicate<'a> = &'a (dyn Fn(&Entity) -> bool + Send + Sync);

/// A platform record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: String,
    pub id: Uuid,
    pub fields: Fields,
}

impl Entity {
    pub fn new(kind: impl Into<String>, fields: Fields) -> Self {
        Self {
            kind: kind.into(),
            id: Uuid::new_v4(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }
}

/// A change waiting in a session's pending buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Create(Entity),
    Update {
        kind: String,
        id: Uuid,
        fields: Fields,
    },
}

/// Backend-agnostic session trait.
#[async_trait]
pub trait Session: Send + Sync {
    /// Unique id of this handle. Clones get a fresh one.
    fn id(&self) -> Uuid;

    /// Credentials the session authenticated with.
    fn credentials(&self) -> &SessionCredentials;

    /// Open an independent session with the same credentials and empty
    /// internal state. Fails if this session is not authenticated.
    fn clone_session(&self) -> Result<Arc<dyn Session>, SessionError>;

    /// Create an entity. Visible to this session immediately, to others after commit.
    async fn create(&self, kind: &str, fields: Fields) -> Result<Entity, StoreError>;

    /// Fetch an entity, preferring this session's uncommitted view.
    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<Entity>, StoreError>;

    /// Merge `fields` into an existing entity.
    async fn update(&self, kind: &str, id: Uuid, fields: Fields) -> Result<Entity, StoreError>;

    /// All entities of `kind` matching `predicate`.
    async fn query(&self, kind: &str, predicate: Predicate<'_>) -> Result<Vec<Entity>, StoreError>;

    /// Push pending changes to the store. Returns the number applied.
    async fn commit(&self) -> Result<usize, StoreError>;

    /// Discard pending changes.
    async fn rollback(&self);

    /// Number of changes waiting for commit.
    async fn pending_changes(&self) -> usize;
}

/// Check the credentials a session must carry before it can be cloned.
pub fn ensure_authenticated(credentials: &SessionCredentials) -> Result<(), SessionError> {
    use secrecy::ExposeSecret;

    if credentials.server_url.trim().is_empty() {
        return Err(SessionError::NotAuthenticated("server url"));
    }
    if credentials.api_user.trim().is_empty() {
        return Err(SessionError::NotAuthenticated("api user"));
    }
    if credentials.api_key.expose_secret().trim().is_empty() {
        return Err(SessionError::NotAuthenticated("api key"));
    }
    Ok(())
}
