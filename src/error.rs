//! Error types for the tandem context stack.

use crate::types::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store not attached to coordinator")]
    StoreNotAttached,

    #[error("Store already attached to coordinator at {0}")]
    AlreadyAttached(PathBuf),

    #[error("Invalid store location: {0}")]
    InvalidPath(String),

    #[error("Stored schema is incompatible and automatic migration is disabled (stored {stored}, requested {requested})")]
    IncompatibleSchema { stored: String, requested: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn sled(action: &str, err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{}: {}", action, err),
        ))
    }

    pub(crate) fn codec(action: &str, err: bincode::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {}", action, err),
        ))
    }
}

/// Schema resolution errors
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema '{name}' not found in bundle {bundle}")]
    NotFound { name: String, bundle: PathBuf },

    #[error("No schemas found in bundle {0}")]
    EmptyBundle(PathBuf),

    #[error("Failed to read schema {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse schema {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Entity '{entity}' is defined by both '{first}' and '{second}'")]
    DuplicateEntity {
        entity: String,
        first: String,
        second: String,
    },

    #[error("Invalid schema '{schema}': {message}")]
    Invalid { schema: String, message: String },
}

/// Object validation errors raised when a context saves
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("{entity}.{attribute} is required")]
    MissingAttribute { entity: String, attribute: String },

    #[error("{entity}.{attribute} expects {expected}, got {actual}")]
    TypeMismatch {
        entity: String,
        attribute: String,
        expected: String,
        actual: String,
    },

    #[error("{entity} has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },
}

/// Recoverable errors reported by contexts (including failed saves)
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Validation failed for object {id}: {source}")]
    Validation {
        id: ObjectId,
        #[source]
        source: ValidationError,
    },

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Object {0} is deleted in this context")]
    ObjectDeleted(ObjectId),

    #[error("Context is closed")]
    Closed,

    #[error("Editors of the main context must come from the stack")]
    MainChild,

    #[error("Failed to start context worker: {0}")]
    Spawn(std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Stack setup and factory errors
///
/// Setup variants are configuration failures: the stack never becomes ready
/// after one of them.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Stack is not ready")]
    NotReady,

    #[error("Stack is already initialized")]
    AlreadyInitialized,

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Failed to create store directory {path}: {source}")]
    StoreDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to attach store to {coordinator} coordinator: {source}")]
    AttachStore {
        coordinator: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Unable to resolve application identity: {0}")]
    AppIdentity(String),

    #[error("Editor contexts cannot be created while the main context is read-only")]
    ReadOnly,

    #[error("{0} editor context(s) hold unsaved changes; save or discard them before enabling read-only")]
    PendingEditorChanges(usize),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for StackError {
    fn from(err: config::ConfigError) -> Self {
        StackError::Config(err.to_string())
    }
}

/// Errors surfaced by the command-line tool
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid import file {path}: {message}")]
    InvalidImport { path: PathBuf, message: String },

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("Failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}
