//! Change-set events published after successful saves.

use crate::store::ObjectRecord;
use crate::types::{ContextId, CoordinatorId, ObjectId};
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Objects inserted, updated and deleted by one save.
///
/// Inserted and updated entries carry the records as saved, so a subscriber
/// can merge them without reading the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub inserted: BTreeMap<ObjectId, ObjectRecord>,
    pub updated: BTreeMap<ObjectId, ObjectRecord>,
    pub deleted: BTreeSet<ObjectId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn inserted_ids(&self) -> BTreeSet<ObjectId> {
        self.inserted.keys().copied().collect()
    }

    pub fn updated_ids(&self) -> BTreeSet<ObjectId> {
        self.updated.keys().copied().collect()
    }

    pub fn deleted_ids(&self) -> &BTreeSet<ObjectId> {
        &self.deleted
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Published once per save that produced changes.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Context that saved.
    pub source: ContextId,
    /// Ancestors of the source, nearest first.
    pub lineage: Vec<ContextId>,
    /// Coordinator the source is bound to (directly or through its ancestors).
    pub coordinator: CoordinatorId,
    pub changes: Arc<ChangeSet>,
    pub emitted_at: String,
}

impl ChangeEvent {
    pub fn with_now(
        source: ContextId,
        lineage: Vec<ContextId>,
        coordinator: CoordinatorId,
        changes: ChangeSet,
    ) -> Self {
        Self {
            source,
            lineage,
            coordinator,
            changes: Arc::new(changes),
            emitted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.lineage.first().copied()
    }

    pub fn descends_from(&self, ancestor: ContextId) -> bool {
        self.lineage.contains(&ancestor)
    }
}
