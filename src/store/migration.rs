//! Lightweight schema migration performed when a store is attached.
//!
//! Only changes whose mapping can be inferred are migrated: dropped entities,
//! dropped attributes, and added attributes that are optional or carry a
//! default. Anything else fails the attach.

use crate::coordinator::AttachOptions;
use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::{ObjectStore, StoreBatch};
use crate::types::{Fields, Value};
use tracing::{info, warn};

/// What an attach did to the stored data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: bool,
    pub rewritten: usize,
    pub removed: usize,
}

/// Bring the store in line with `schema`, migrating if allowed.
pub fn reconcile(
    store: &dyn ObjectStore,
    schema: &Schema,
    options: &AttachOptions,
) -> Result<MigrationReport, StorageError> {
    let stored = match store.stored_schema()? {
        Some(stored) => stored,
        None => {
            store.put_schema(schema)?;
            return Ok(MigrationReport::default());
        }
    };

    if stored.fingerprint() == schema.fingerprint() {
        return Ok(MigrationReport::default());
    }

    if !options.migrate_automatically {
        return Err(StorageError::IncompatibleSchema {
            stored: stored.fingerprint(),
            requested: schema.fingerprint(),
        });
    }
    if !options.infer_mapping_automatically {
        return Err(StorageError::MigrationFailed(
            "schema changed and mapping inference is disabled".to_string(),
        ));
    }

    check_inferable(&stored, schema)?;

    let mut batch = StoreBatch::default();
    for mut record in store.list_all()? {
        let Some(entity) = schema.entity(&record.entity) else {
            batch.removes.push(record.id);
            continue;
        };
        let mut fields = Fields::new();
        for (name, attr) in &entity.attributes {
            let value = match record.fields.remove(name) {
                Some(value) => value,
                None => attr.default.clone().unwrap_or(Value::Null),
            };
            fields.insert(name.clone(), value);
        }
        record.fields = fields;
        batch.puts.push(record);
    }

    let report = MigrationReport {
        migrated: true,
        rewritten: batch.puts.len(),
        removed: batch.removes.len(),
    };
    store.apply(&batch)?;
    store.put_schema(schema)?;
    info!(
        from = %stored.fingerprint(),
        to = %schema.fingerprint(),
        rewritten = report.rewritten,
        removed = report.removed,
        "Migrated store schema"
    );
    Ok(report)
}

fn check_inferable(stored: &Schema, schema: &Schema) -> Result<(), StorageError> {
    for (entity_name, entity) in &schema.entities {
        let Some(old) = stored.entity(entity_name) else {
            continue;
        };
        for (attr_name, attr) in &entity.attributes {
            match old.attributes.get(attr_name) {
                Some(previous) if previous.kind != attr.kind => {
                    return Err(StorageError::MigrationFailed(format!(
                        "{}.{} changed type from {} to {}",
                        entity_name,
                        attr_name,
                        previous.kind.name(),
                        attr.kind.name()
                    )));
                }
                Some(_) => {}
                None if attr.optional || attr.default.is_some() => {}
                None => {
                    return Err(StorageError::MigrationFailed(format!(
                        "{}.{} was added as required without a default",
                        entity_name, attr_name
                    )));
                }
            }
        }
    }
    for entity_name in stored.entities.keys() {
        if schema.entity(entity_name).is_none() {
            warn!(entity = %entity_name, "Entity removed from schema; stored objects will be dropped");
        }
    }
    Ok(())
}
