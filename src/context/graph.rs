//! Object graph: the in-memory state confined to one context worker.
//!
//! Objects are faulted in on first access, either from the coordinator's store
//! (root contexts) or from the parent context. Each registered object keeps
//! the record it was loaded from so saves can detect conflicts.

use crate::changes::ChangeSet;
use crate::context::worker::ContextCore;
use crate::context::MergePolicy;
use crate::coordinator::{CommitRequest, Coordinator, PendingUpdate};
use crate::error::ContextError;
use crate::schema::Schema;
use crate::store::ObjectRecord;
use crate::types::{ContextId, Fields, ManagedObject, ObjectId, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Where a graph loads objects from and commits to.
pub(crate) enum GraphSource {
    Store(Arc<Coordinator>),
    Parent(Arc<ContextCore>),
}

#[derive(Debug, Clone)]
struct Entry {
    entity: String,
    values: Fields,
    /// Record as loaded; `None` for objects inserted in this context.
    snapshot: Option<ObjectRecord>,
}

impl Entry {
    fn loaded(record: ObjectRecord) -> Self {
        Self {
            entity: record.entity.clone(),
            values: record.fields.clone(),
            snapshot: Some(record),
        }
    }

    fn is_modified(&self) -> bool {
        match &self.snapshot {
            Some(snapshot) => snapshot.fields != self.values,
            None => false,
        }
    }

    fn version(&self) -> u64 {
        self.snapshot.as_ref().map(|s| s.version).unwrap_or(0)
    }

    /// Fields that differ from the snapshot (all of them for inserts).
    fn local_edits(&self) -> Fields {
        match &self.snapshot {
            Some(snapshot) => self
                .values
                .iter()
                .filter(|(name, value)| snapshot.fields.get(*name) != Some(*value))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            None => self.values.clone(),
        }
    }

    fn to_record(&self, id: ObjectId) -> ObjectRecord {
        ObjectRecord::new(id, self.entity.clone(), self.version(), self.values.clone())
    }

    fn to_managed(&self, id: ObjectId) -> ManagedObject {
        ManagedObject {
            id,
            entity: self.entity.clone(),
            fields: self.values.clone(),
        }
    }
}

/// Identifiers of the changes a save would persist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    pub inserted: BTreeSet<ObjectId>,
    pub updated: BTreeSet<ObjectId>,
    pub deleted: BTreeSet<ObjectId>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Changes a child pushes into its parent on save.
#[derive(Debug, Default)]
pub(crate) struct ChildPush {
    inserts: Vec<ObjectRecord>,
    updates: Vec<(ObjectId, Fields)>,
    deletes: Vec<ObjectId>,
}

pub struct ObjectGraph {
    id: ContextId,
    policy: MergePolicy,
    schema: Arc<Schema>,
    source: GraphSource,
    entries: HashMap<ObjectId, Entry>,
    inserted: BTreeSet<ObjectId>,
    deleted: BTreeSet<ObjectId>,
    pending: Arc<AtomicBool>,
}

impl ObjectGraph {
    pub(crate) fn new(
        id: ContextId,
        policy: MergePolicy,
        schema: Arc<Schema>,
        source: GraphSource,
        pending: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            policy,
            schema,
            source,
            entries: HashMap::new(),
            inserted: BTreeSet::new(),
            deleted: BTreeSet::new(),
            pending,
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.id
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn set_merge_policy(&mut self, policy: MergePolicy) {
        self.policy = policy;
    }

    pub(crate) fn publish_pending(&self) {
        self.pending.store(self.has_changes(), Ordering::Release);
    }

    pub fn has_changes(&self) -> bool {
        !self.inserted.is_empty()
            || !self.deleted.is_empty()
            || self
                .entries
                .iter()
                .any(|(id, entry)| !self.deleted.contains(id) && entry.is_modified())
    }

    pub fn pending_changes(&self) -> PendingChanges {
        PendingChanges {
            inserted: self.inserted.clone(),
            updated: self.updated_ids(),
            deleted: self.deleted.clone(),
        }
    }

    fn updated_ids(&self) -> BTreeSet<ObjectId> {
        self.entries
            .iter()
            .filter(|(id, entry)| !self.deleted.contains(*id) && entry.is_modified())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Insert a new object. Schema defaults fill in missing attributes;
    /// full validation happens on save.
    pub fn insert(&mut self, entity: &str, fields: Fields) -> Result<ObjectId, ContextError> {
        if self.schema.entity(entity).is_none() {
            return Err(ContextError::UnknownEntity(entity.to_string()));
        }
        let mut values = fields;
        self.schema.apply_defaults(entity, &mut values);

        let id = ObjectId::new();
        self.entries.insert(
            id,
            Entry {
                entity: entity.to_string(),
                values,
                snapshot: None,
            },
        );
        self.inserted.insert(id);
        trace!(context = %self.id, object = %id, entity, "Inserted object");
        Ok(id)
    }

    pub fn set(
        &mut self,
        id: ObjectId,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<(), ContextError> {
        let entry = self.live_entry(id)?;
        entry.values.insert(attribute.to_string(), value.into());
        Ok(())
    }

    pub fn update(&mut self, id: ObjectId, fields: Fields) -> Result<(), ContextError> {
        let entry = self.live_entry(id)?;
        entry.values.extend(fields);
        Ok(())
    }

    pub fn delete(&mut self, id: ObjectId) -> Result<(), ContextError> {
        self.live_entry(id)?;
        if self.inserted.remove(&id) {
            self.entries.remove(&id);
        } else {
            self.deleted.insert(id);
        }
        Ok(())
    }

    /// The object with `id`, faulting it in if needed. `None` if it does not
    /// exist or was deleted in this context.
    pub fn object(&mut self, id: ObjectId) -> Result<Option<ManagedObject>, ContextError> {
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        if let Some(entry) = self.entries.get(&id) {
            return Ok(Some(entry.to_managed(id)));
        }
        match self.fault(id)? {
            Some(record) => {
                let object = record.to_managed();
                self.register(record);
                Ok(Some(object))
            }
            None => Ok(None),
        }
    }

    /// Registered object without faulting.
    pub fn registered_object(&self, id: ObjectId) -> Option<ManagedObject> {
        if self.deleted.contains(&id) {
            return None;
        }
        self.entries.get(&id).map(|entry| entry.to_managed(id))
    }

    /// Registered objects of `entity`, ordered by id.
    pub fn registered_objects(&self, entity: &str) -> Vec<ManagedObject> {
        let mut objects: Vec<ManagedObject> = self
            .entries
            .iter()
            .filter(|(id, entry)| entry.entity == entity && !self.deleted.contains(*id))
            .map(|(id, entry)| entry.to_managed(*id))
            .collect();
        objects.sort_by_key(|object| object.id);
        objects
    }

    pub fn registered_count(&self) -> usize {
        self.entries.len() - self.deleted.len()
    }

    /// Register every object of `entity` visible from this context and
    /// return them ordered by id. Objects already registered keep their
    /// in-memory state.
    pub fn fetch_all(&mut self, entity: &str) -> Result<Vec<ManagedObject>, ContextError> {
        if self.schema.entity(entity).is_none() {
            return Err(ContextError::UnknownEntity(entity.to_string()));
        }
        let records = match &self.source {
            GraphSource::Store(coordinator) => coordinator.load_entity(entity)?,
            GraphSource::Parent(parent) => {
                let entity = entity.to_string();
                parent.call_blocking(move |graph| graph.export_entity(&entity))??
            }
        };
        for record in records {
            if !self.entries.contains_key(&record.id) {
                self.register(record);
            }
        }
        Ok(self.registered_objects(entity))
    }

    /// Discard every pending change.
    pub fn rollback(&mut self) {
        for id in std::mem::take(&mut self.inserted) {
            self.entries.remove(&id);
        }
        self.deleted.clear();
        for entry in self.entries.values_mut() {
            if let Some(snapshot) = &entry.snapshot {
                entry.values = snapshot.fields.clone();
            }
        }
    }

    /// Forget every registered object, pending changes included.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.inserted.clear();
        self.deleted.clear();
    }

    /// Apply a change-set saved elsewhere. Saved records replace the
    /// registered state except for fields edited locally; deleted objects
    /// leave the graph. Records older than the registered snapshot are
    /// ignored. Nothing is read from the store.
    pub fn merge_changes(&mut self, changes: &ChangeSet) {
        for id in &changes.deleted {
            self.entries.remove(id);
            self.inserted.remove(id);
            self.deleted.remove(id);
        }
        for record in changes.inserted.values().chain(changes.updated.values()) {
            match self.entries.get_mut(&record.id) {
                Some(entry) if record.version < entry.version() => {
                    trace!(
                        object = %record.id,
                        incoming = record.version,
                        registered = entry.version(),
                        "Skipped stale record"
                    );
                }
                Some(entry) => {
                    let edits = entry.local_edits();
                    entry.entity = record.entity.clone();
                    entry.values = record.fields.clone();
                    entry.values.extend(edits);
                    entry.snapshot = Some(record.clone());
                    self.inserted.remove(&record.id);
                }
                None => self.register(record.clone()),
            }
        }
        trace!(
            context = %self.id,
            inserted = changes.inserted.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            "Merged change-set"
        );
    }

    /// Persist pending changes one level up: into the store for root
    /// contexts, into the parent's graph otherwise.
    ///
    /// Returns the changes made, or `None` when nothing was written. On error
    /// the graph is left as it was.
    pub(crate) fn commit(&mut self) -> Result<Option<ChangeSet>, ContextError> {
        if !self.has_changes() {
            return Ok(None);
        }
        self.validate_pending()?;

        if self.policy.discards_local_changes() {
            let discarded = self.pending_changes();
            self.rollback();
            debug!(
                context = %self.id,
                inserted = discarded.inserted.len(),
                updated = discarded.updated.len(),
                deleted = discarded.deleted.len(),
                "Local changes rolled back on save"
            );
            return Ok(None);
        }

        let changes = match &self.source {
            GraphSource::Store(coordinator) => {
                let coordinator = Arc::clone(coordinator);
                self.commit_to_store(&coordinator)?
            }
            GraphSource::Parent(parent) => {
                let parent = Arc::clone(parent);
                self.commit_to_parent(&parent)?
            }
        };
        Ok((!changes.is_empty()).then_some(changes))
    }

    fn validate_pending(&self) -> Result<(), ContextError> {
        for id in self.inserted.iter().chain(self.updated_ids().iter()) {
            if let Some(entry) = self.entries.get(id) {
                self.schema
                    .validate(&entry.entity, &entry.values)
                    .map_err(|source| ContextError::Validation { id: *id, source })?;
            }
        }
        Ok(())
    }

    fn commit_to_store(&mut self, coordinator: &Coordinator) -> Result<ChangeSet, ContextError> {
        let mut request = CommitRequest::default();
        for id in &self.inserted {
            if let Some(entry) = self.entries.get(id) {
                request.inserts.push(entry.to_record(*id));
            }
        }
        for id in self.updated_ids() {
            if let Some(Entry {
                values,
                snapshot: Some(snapshot),
                ..
            }) = self.entries.get(&id)
            {
                request.updates.push(PendingUpdate {
                    snapshot: snapshot.clone(),
                    fields: values.clone(),
                });
            }
        }
        for id in &self.deleted {
            if let Some(snapshot) = self.entries.get(id).and_then(|e| e.snapshot.clone()) {
                request.deletes.push(snapshot);
            }
        }

        let outcome = coordinator.commit(request, self.policy)?;

        self.inserted.clear();
        for id in std::mem::take(&mut self.deleted) {
            self.entries.remove(&id);
        }
        self.adopt(&outcome.changes);
        for (id, current) in outcome.refreshed {
            match current {
                Some(record) => self.register(record),
                None => {
                    self.entries.remove(&id);
                }
            }
        }
        Ok(outcome.changes)
    }

    fn commit_to_parent(&mut self, parent: &ContextCore) -> Result<ChangeSet, ContextError> {
        let mut push = ChildPush::default();
        for id in &self.inserted {
            if let Some(entry) = self.entries.get(id) {
                push.inserts.push(entry.to_record(*id));
            }
        }
        for id in self.updated_ids() {
            if let Some(entry) = self.entries.get(&id) {
                push.updates.push((id, entry.local_edits()));
            }
        }
        push.deletes.extend(self.deleted.iter().copied());

        let changes = parent.call_blocking(move |graph| graph.absorb(push))??;

        self.inserted.clear();
        for id in std::mem::take(&mut self.deleted) {
            self.entries.remove(&id);
        }
        self.adopt(&changes);
        Ok(changes)
    }

    /// Re-register saved records as the new snapshots.
    fn adopt(&mut self, changes: &ChangeSet) {
        for record in changes.inserted.values().chain(changes.updated.values()) {
            self.register(record.clone());
        }
        for id in &changes.deleted {
            self.entries.remove(id);
        }
    }

    /// Take a child's changes as this graph's own pending changes.
    ///
    /// Every target is resolved before anything is applied, so a failed push
    /// leaves this graph untouched.
    pub(crate) fn absorb(&mut self, push: ChildPush) -> Result<ChangeSet, ContextError> {
        for (id, _) in &push.updates {
            self.live_entry(*id)?;
        }
        let mut deletes = Vec::with_capacity(push.deletes.len());
        for id in push.deletes {
            if self.deleted.contains(&id) {
                continue;
            }
            if self.entries.contains_key(&id) {
                deletes.push(id);
            } else if let Some(record) = self.fault(id)? {
                self.register(record);
                deletes.push(id);
            }
        }

        let mut changes = ChangeSet::default();
        for record in push.inserts {
            let id = record.id;
            self.entries.insert(
                id,
                Entry {
                    entity: record.entity.clone(),
                    values: record.fields.clone(),
                    snapshot: None,
                },
            );
            self.inserted.insert(id);
            changes.inserted.insert(id, record);
        }
        for (id, edits) in push.updates {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.values.extend(edits);
                changes.updated.insert(id, entry.to_record(id));
            }
        }
        for id in deletes {
            if self.inserted.remove(&id) {
                self.entries.remove(&id);
            } else {
                self.deleted.insert(id);
            }
            changes.deleted.insert(id);
        }
        trace!(
            context = %self.id,
            inserted = changes.inserted.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            "Absorbed child changes"
        );
        Ok(changes)
    }

    /// Current state of `id` for a child context.
    pub(crate) fn export(&mut self, id: ObjectId) -> Result<Option<ObjectRecord>, ContextError> {
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        if let Some(entry) = self.entries.get(&id) {
            return Ok(Some(entry.to_record(id)));
        }
        match self.fault(id)? {
            Some(record) => {
                self.register(record.clone());
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn export_entity(&mut self, entity: &str) -> Result<Vec<ObjectRecord>, ContextError> {
        self.fetch_all(entity)?;
        let mut records: Vec<ObjectRecord> = self
            .entries
            .iter()
            .filter(|(id, entry)| entry.entity == entity && !self.deleted.contains(*id))
            .map(|(id, entry)| entry.to_record(*id))
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    fn live_entry(&mut self, id: ObjectId) -> Result<&mut Entry, ContextError> {
        if self.deleted.contains(&id) {
            return Err(ContextError::ObjectDeleted(id));
        }
        if !self.entries.contains_key(&id) {
            let record = self.fault(id)?.ok_or(ContextError::ObjectNotFound(id))?;
            self.register(record);
        }
        self.entries
            .get_mut(&id)
            .ok_or(ContextError::ObjectNotFound(id))
    }

    fn fault(&self, id: ObjectId) -> Result<Option<ObjectRecord>, ContextError> {
        match &self.source {
            GraphSource::Store(coordinator) => Ok(coordinator.load(&id)?),
            GraphSource::Parent(parent) => parent.call_blocking(move |graph| graph.export(id))?,
        }
    }

    fn register(&mut self, record: ObjectRecord) {
        self.entries.insert(record.id, Entry::loaded(record));
    }
}

impl std::fmt::Debug for ObjectGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectGraph")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("registered", &self.registered_count())
            .field("has_changes", &self.has_changes())
            .finish()
    }
}
