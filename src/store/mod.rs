//! Object Store
//!
//! Physical storage behind coordinators. Records are keyed by object id; a
//! metadata area keeps the schema the store was last attached with.

pub mod migration;
pub mod persistence;
pub mod registry;

pub use persistence::SledObjectStore;
pub use registry::{open_shared, StoreHandle};

use crate::error::StorageError;
use crate::schema::Schema;
use crate::types::{Fields, ManagedObject, ObjectId};
use serde::{Deserialize, Serialize};

/// ObjectRecord: one stored object at a specific version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub entity: String,
    /// Incremented on every stored write; 0 means never stored.
    pub version: u64,
    pub fields: Fields,
}

impl ObjectRecord {
    pub fn new(id: ObjectId, entity: impl Into<String>, version: u64, fields: Fields) -> Self {
        Self {
            id,
            entity: entity.into(),
            version,
            fields,
        }
    }

    pub fn to_managed(&self) -> ManagedObject {
        ManagedObject {
            id: self.id,
            entity: self.entity.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Writes applied atomically by `ObjectStore::apply`.
#[derive(Debug, Clone, Default)]
pub struct StoreBatch {
    pub puts: Vec<ObjectRecord>,
    pub removes: Vec<ObjectId>,
}

impl StoreBatch {
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.removes.is_empty()
    }
}

/// ObjectStore interface
pub trait ObjectStore: Send + Sync {
    fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StorageError>;

    /// All records of one entity, ordered by id.
    fn list_entity(&self, entity: &str) -> Result<Vec<ObjectRecord>, StorageError>;

    fn list_all(&self) -> Result<Vec<ObjectRecord>, StorageError>;

    /// Apply puts and removes as one atomic write and make it durable.
    fn apply(&self, batch: &StoreBatch) -> Result<(), StorageError>;

    /// Schema recorded by the last successful attach, if any.
    fn stored_schema(&self) -> Result<Option<Schema>, StorageError>;

    fn put_schema(&self, schema: &Schema) -> Result<(), StorageError>;
}
