//! Coordinator: binds a schema to a physical store.
//!
//! A stack opens two coordinators against the same location; both share one
//! `StoreHandle`, so their commits serialize on the same lock.

use crate::changes::ChangeSet;
use crate::context::MergePolicy;
use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::migration::{self, MigrationReport};
use crate::store::{open_shared, ObjectRecord, StoreBatch, StoreHandle};
use crate::types::{CoordinatorId, Fields, ObjectId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Options for attaching a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachOptions {
    #[serde(default = "default_true")]
    pub migrate_automatically: bool,
    #[serde(default = "default_true")]
    pub infer_mapping_automatically: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            migrate_automatically: true,
            infer_mapping_automatically: true,
        }
    }
}

/// An update the context wants to persist.
#[derive(Debug, Clone)]
pub(crate) struct PendingUpdate {
    /// The record as the context loaded it.
    pub snapshot: ObjectRecord,
    pub fields: Fields,
}

#[derive(Debug, Default)]
pub(crate) struct CommitRequest {
    pub inserts: Vec<ObjectRecord>,
    pub updates: Vec<PendingUpdate>,
    /// Snapshots of the objects to delete.
    pub deletes: Vec<ObjectRecord>,
}

#[derive(Debug, Default)]
pub(crate) struct CommitOutcome {
    pub changes: ChangeSet,
    /// Objects whose stored state won the conflict; `None` if gone from the store.
    pub refreshed: Vec<(ObjectId, Option<ObjectRecord>)>,
}

pub struct Coordinator {
    id: CoordinatorId,
    schema: Arc<Schema>,
    handle: RwLock<Option<Arc<StoreHandle>>>,
}

impl Coordinator {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            id: CoordinatorId::next(),
            schema,
            handle: RwLock::new(None),
        }
    }

    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn is_attached(&self) -> bool {
        self.handle.read().is_some()
    }

    pub fn location(&self) -> Option<PathBuf> {
        self.handle
            .read()
            .as_ref()
            .map(|h| h.location().to_path_buf())
    }

    /// Attach the store at `location`, migrating its schema if allowed.
    pub fn attach_store(
        &self,
        location: &Path,
        options: &AttachOptions,
    ) -> Result<MigrationReport, StorageError> {
        let mut slot = self.handle.write();
        if let Some(existing) = slot.as_ref() {
            return Err(StorageError::AlreadyAttached(existing.location().to_path_buf()));
        }
        let handle = open_shared(location)?;
        let report = {
            let _guard = handle.lock_commits();
            migration::reconcile(handle.store(), &self.schema, options)?
        };
        info!(
            coordinator = %self.id,
            location = %handle.location().display(),
            schema = %self.schema.name,
            "Attached store"
        );
        *slot = Some(handle);
        Ok(report)
    }

    fn handle(&self) -> Result<Arc<StoreHandle>, StorageError> {
        self.handle
            .read()
            .clone()
            .ok_or(StorageError::StoreNotAttached)
    }

    pub fn load(&self, id: &ObjectId) -> Result<Option<ObjectRecord>, StorageError> {
        self.handle()?.store().get(id)
    }

    pub fn load_entity(&self, entity: &str) -> Result<Vec<ObjectRecord>, StorageError> {
        self.handle()?.store().list_entity(entity)
    }

    pub fn load_all(&self) -> Result<Vec<ObjectRecord>, StorageError> {
        self.handle()?.store().list_all()
    }

    /// Persist a context's changes, resolving conflicts with `policy`.
    pub(crate) fn commit(
        &self,
        request: CommitRequest,
        policy: MergePolicy,
    ) -> Result<CommitOutcome, StorageError> {
        let handle = self.handle()?;
        let _guard = handle.lock_commits();
        let store = handle.store();

        let mut batch = StoreBatch::default();
        let mut outcome = CommitOutcome::default();

        for mut record in request.inserts {
            record.version = 1;
            outcome.changes.inserted.insert(record.id, record.clone());
            batch.puts.push(record);
        }

        for update in request.updates {
            let id = update.snapshot.id;
            let current = store.get(&id)?;
            match policy.resolve_update(&update.snapshot, &update.fields, current.as_ref()) {
                Some(fields) => {
                    let version = current.as_ref().map(|c| c.version).unwrap_or(0) + 1;
                    let record =
                        ObjectRecord::new(id, update.snapshot.entity.clone(), version, fields);
                    if current.is_some() {
                        outcome.changes.updated.insert(id, record.clone());
                    } else {
                        outcome.changes.inserted.insert(id, record.clone());
                    }
                    batch.puts.push(record);
                }
                None => {
                    debug!(object = %id, policy = %policy, "Stored state kept for update");
                    outcome.refreshed.push((id, current));
                }
            }
        }

        for snapshot in request.deletes {
            let current = store.get(&snapshot.id)?;
            if policy.resolve_delete(&snapshot, current.as_ref()) {
                batch.removes.push(snapshot.id);
                outcome.changes.deleted.insert(snapshot.id);
            } else {
                debug!(object = %snapshot.id, policy = %policy, "Stored state kept for delete");
                outcome.refreshed.push((snapshot.id, current));
            }
        }

        store.apply(&batch)?;
        debug!(
            coordinator = %self.id,
            inserted = outcome.changes.inserted.len(),
            updated = outcome.changes.updated.len(),
            deleted = outcome.changes.deleted.len(),
            "Committed changes"
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("id", &self.id)
            .field("schema", &self.schema.name)
            .field("location", &self.location())
            .finish()
    }
}
