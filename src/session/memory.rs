//! In-memory store and session.
//!
//! `MemoryStore` plays the server: the committed state every session reads
//! from. `MemorySession` keeps its own pending buffer and local view on top.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{Change, Entity, Fields, Predicate, Session, ensure_authenticated};
use crate::config::SessionCredentials;
use crate::error::{SessionError, StoreError};

type Key = (String, Uuid);

/// Committed entity storage shared by every session connected to it.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<Key, Entity>>,
    /// When set, every commit is rejected with this reason.
    reject_commits: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent commits fail (`Some`) or succeed again (`None`).
    pub async fn reject_commits(&self, reason: Option<String>) {
        *self.reject_commits.write().await = reason;
    }

    pub async fn fetch(&self, kind: &str, id: Uuid) -> Option<Entity> {
        self.entities
            .read()
            .await
            .get(&(kind.to_string(), id))
            .cloned()
    }

    pub async fn scan(&self, kind: &str) -> Vec<Entity> {
        self.entities
            .read()
            .await
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of committed entities.
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Apply a batch of changes atomically: either all land or none do.
    pub async fn apply(&self, changes: &[Change]) -> Result<(), StoreError> {
        if let Some(reason) = self.reject_commits.read().await.clone() {
            return Err(StoreError::Commit(reason));
        }

        let mut entities = self.entities.write().await;
        let mut staged = entities.clone();

        for change in changes {
            match change {
                Change::Create(entity) => {
                    let key = (entity.kind.clone(), entity.id);
                    if staged.contains_key(&key) {
                        return Err(StoreError::Conflict {
                            kind: entity.kind.clone(),
                            id: entity.id,
                        });
                    }
                    staged.insert(key, entity.clone());
                }
                Change::Update { kind, id, fields } => {
                    let existing = staged.get_mut(&(kind.clone(), *id)).ok_or_else(|| {
                        StoreError::NotFound {
                            kind: kind.clone(),
                            id: *id,
                        }
                    })?;
                    for (name, value) in fields {
                        existing.fields.insert(name.clone(), value.clone());
                    }
                }
            }
        }

        *entities = staged;
        Ok(())
    }
}

#[derive(Default)]
struct LocalState {
    pending: Vec<Change>,
    /// This session's view of entities it created or updated since the last commit.
    local: HashMap<Key, Entity>,
}

/// Session over a [`MemoryStore`].
pub struct MemorySession {
    id: Uuid,
    credentials: SessionCredentials,
    store: Arc<MemoryStore>,
    state: Mutex<LocalState>,
}

impl MemorySession {
    pub fn new(credentials: SessionCredentials, store: Arc<MemoryStore>) -> Self {
        Self {
            id: Uuid::new_v4(),
            credentials,
            store,
            state: Mutex::new(LocalState::default()),
        }
    }

    /// The store this session commits to.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    async fn current(&self, state: &LocalState, kind: &str, id: Uuid) -> Option<Entity> {
        let key = (kind.to_string(), id);
        match state.local.get(&key) {
            Some(entity) => Some(entity.clone()),
            None => self.store.fetch(kind, id).await,
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    fn clone_session(&self) -> Result<Arc<dyn Session>, SessionError> {
        ensure_authenticated(&self.credentials)?;
        let clone = MemorySession::new(self.credentials.clone(), Arc::clone(&self.store));
        debug!(source = %self.id, clone = %clone.id, "Cloned session");
        Ok(Arc::new(clone))
    }

    async fn create(&self, kind: &str, fields: Fields) -> Result<Entity, StoreError> {
        let entity = Entity::new(kind, fields);
        let mut state = self.state.lock().await;
        state
            .local
            .insert((entity.kind.clone(), entity.id), entity.clone());
        state.pending.push(Change::Create(entity.clone()));
        Ok(entity)
    }

    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<Entity>, StoreError> {
        let state = self.state.lock().await;
        Ok(self.current(&state, kind, id).await)
    }

    async fn update(&self, kind: &str, id: Uuid, fields: Fields) -> Result<Entity, StoreError> {
        let mut state = self.state.lock().await;
        let mut entity = self
            .current(&state, kind, id)
            .await
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.to_string(),
                id,
            })?;

        for (name, value) in &fields {
            entity.fields.insert(name.clone(), value.clone());
        }

        state.local.insert((kind.to_string(), id), entity.clone());
        state.pending.push(Change::Update {
            kind: kind.to_string(),
            id,
            fields,
        });
        Ok(entity)
    }

    async fn query(&self, kind: &str, predicate: Predicate<'_>) -> Result<Vec<Entity>, StoreError> {
        let state = self.state.lock().await;
        let mut merged: HashMap<Uuid, Entity> = self
            .store
            .scan(kind)
            .await
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        for ((local_kind, id), entity) in &state.local {
            if local_kind == kind {
                merged.insert(*id, entity.clone());
            }
        }

        Ok(merged.into_values().filter(|e| predicate(e)).collect())
    }

    async fn commit(&self) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        if state.pending.is_empty() {
            return Ok(0);
        }

        self.store.apply(&state.pending).await?;

        let applied = state.pending.len();
        state.pending.clear();
        state.local.clear();
        debug!(session = %self.id, applied, "Committed session");
        Ok(applied)
    }

    async fn rollback(&self) {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.local.clear();
    }

    async fn pending_changes(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}
