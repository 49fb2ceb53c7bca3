//! Persistence layer for the Object Store

use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::{ObjectRecord, ObjectStore, StoreBatch};
use crate::types::ObjectId;
use std::path::Path;

const OBJECTS_TREE: &str = "objects";
const METADATA_TREE: &str = "metadata";
const SCHEMA_KEY: &[u8] = b"schema";
const FINGERPRINT_KEY: &[u8] = b"schema_fingerprint";

/// Sled-based implementation of ObjectStore
pub struct SledObjectStore {
    db: sled::Db,
    objects: sled::Tree,
    metadata: sled::Tree,
}

impl SledObjectStore {
    /// Open (or create) a store at the given path.
    ///
    /// Sled keeps its files under the path; the path itself is the store.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| StorageError::sled("Failed to open sled database", e))?;
        let objects = db
            .open_tree(OBJECTS_TREE)
            .map_err(|e| StorageError::sled("Failed to open objects tree", e))?;
        let metadata = db
            .open_tree(METADATA_TREE)
            .map_err(|e| StorageError::sled("Failed to open metadata tree", e))?;
        Ok(Self {
            db,
            objects,
            metadata,
        })
    }

    /// Stored schema fingerprint, if any
    pub fn stored_fingerprint(&self) -> Result<Option<String>, StorageError> {
        let value = self
            .metadata
            .get(FINGERPRINT_KEY)
            .map_err(|e| StorageError::sled("Failed to read schema fingerprint", e))?;
        Ok(value.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn decode(value: &[u8]) -> Result<ObjectRecord, StorageError> {
        bincode::deserialize(value).map_err(|e| StorageError::codec("Failed to deserialize object record", e))
    }
}

impl ObjectStore for SledObjectStore {
    fn get(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StorageError> {
        match self
            .objects
            .get(id.as_bytes())
            .map_err(|e| StorageError::sled("Failed to get object record", e))?
        {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn list_entity(&self, entity: &str) -> Result<Vec<ObjectRecord>, StorageError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|record| record.entity == entity)
            .collect())
    }

    fn list_all(&self) -> Result<Vec<ObjectRecord>, StorageError> {
        let mut records = Vec::new();
        for item in self.objects.iter() {
            let (_, value) = item.map_err(|e| StorageError::sled("Failed to iterate store", e))?;
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }

    fn apply(&self, batch: &StoreBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut sled_batch = sled::Batch::default();
        for record in &batch.puts {
            let value = bincode::serialize(record)
                .map_err(|e| StorageError::codec("Failed to serialize object record", e))?;
            sled_batch.insert(record.id.as_bytes().as_slice(), value);
        }
        for id in &batch.removes {
            sled_batch.remove(id.as_bytes().as_slice());
        }
        self.objects
            .apply_batch(sled_batch)
            .map_err(|e| StorageError::sled("Failed to apply batch", e))?;
        self.db
            .flush()
            .map_err(|e| StorageError::sled("Failed to flush database", e))?;
        Ok(())
    }

    fn stored_schema(&self) -> Result<Option<Schema>, StorageError> {
        match self
            .metadata
            .get(SCHEMA_KEY)
            .map_err(|e| StorageError::sled("Failed to read stored schema", e))?
        {
            Some(value) => {
                let schema = bincode::deserialize(&value)
                    .map_err(|e| StorageError::codec("Failed to deserialize stored schema", e))?;
                Ok(Some(schema))
            }
            None => Ok(None),
        }
    }

    fn put_schema(&self, schema: &Schema) -> Result<(), StorageError> {
        let value = bincode::serialize(schema)
            .map_err(|e| StorageError::codec("Failed to serialize schema", e))?;
        self.metadata
            .insert(SCHEMA_KEY, value)
            .map_err(|e| StorageError::sled("Failed to store schema", e))?;
        self.metadata
            .insert(FINGERPRINT_KEY, schema.fingerprint().as_bytes())
            .map_err(|e| StorageError::sled("Failed to store schema fingerprint", e))?;
        self.db
            .flush()
            .map_err(|e| StorageError::sled("Failed to flush database", e))?;
        Ok(())
    }
}
