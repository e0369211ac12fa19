//! Error types for the action handler.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Result error: {0}")]
    Result(#[from] ResultError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors. Raised at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Action missing label")]
    MissingLabel,

    #[error("Action missing identifier")]
    MissingIdentifier,

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors translating an inbound event into action arguments.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unable to translate entity type {entity_type:?}")]
    UnknownEntityType { entity_type: String },

    #[error("Event targets action {got:?}, handler is {expected:?}")]
    IdentifierMismatch { expected: String, got: String },
}

/// Session contract violations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is not authenticated: missing {0}")]
    NotAuthenticated(&'static str),
}

/// Persistent store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {kind} with id {id}")]
    NotFound { kind: String, id: Uuid },

    #[error("Entity already exists: {kind} with id {id}")]
    Conflict { kind: String, id: Uuid },

    #[error("Commit failed: {0}")]
    Commit(String),
}

/// Job-related errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} is {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("Job {id} record is malformed: {reason}")]
    Malformed { id: Uuid, reason: String },
}

/// Launch results that break the `{success, message}` contract.
#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    #[error("Launch must return a boolean or an object, received {0}")]
    InvalidType(String),

    #[error("Missing required key: {0}")]
    MissingKey(&'static str),

    #[error("Key {key} has the wrong type, expected {expected}")]
    WrongKeyType {
        key: &'static str,
        expected: &'static str,
    },
}

/// Errors raised while a worker runs a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} panicked: {message}")]
    Panicked { id: Uuid, message: String },

    #[error("Action {identifier} failed: {reason}")]
    Failed { identifier: String, reason: String },
}
