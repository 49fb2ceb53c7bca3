//! Merge policies: conflict resolution when a saved object changed in the
//! store after the context loaded it.

use crate::store::ObjectRecord;
use crate::types::Fields;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Properties changed in the store win over in-memory changes.
    FavorStore,
    /// Properties changed in memory win over the store.
    FavorMemory,
    /// Local changes never persist; a save rolls them back.
    RejectLocalChanges,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergePolicy::FavorStore => "favor-store",
            MergePolicy::FavorMemory => "favor-memory",
            MergePolicy::RejectLocalChanges => "reject-local-changes",
        };
        f.write_str(name)
    }
}

impl MergePolicy {
    pub fn discards_local_changes(self) -> bool {
        self == MergePolicy::RejectLocalChanges
    }

    /// Fields to store for an updated object, or `None` to keep what the
    /// store has (including keeping it deleted).
    ///
    /// `snapshot` is the record as the context loaded it, `memory` the
    /// context's current values, `current` the record in the store now.
    pub fn resolve_update(
        self,
        snapshot: &ObjectRecord,
        memory: &Fields,
        current: Option<&ObjectRecord>,
    ) -> Option<Fields> {
        let Some(current) = current else {
            return match self {
                MergePolicy::FavorMemory => Some(memory.clone()),
                MergePolicy::FavorStore | MergePolicy::RejectLocalChanges => None,
            };
        };
        if current.version == snapshot.version {
            return match self {
                MergePolicy::RejectLocalChanges => None,
                _ => Some(memory.clone()),
            };
        }
        match self {
            MergePolicy::FavorMemory => {
                Some(overlay(&current.fields, memory, &snapshot.fields))
            }
            MergePolicy::FavorStore => {
                Some(overlay(memory, &current.fields, &snapshot.fields))
            }
            MergePolicy::RejectLocalChanges => None,
        }
    }

    /// Whether a delete made in memory should reach the store.
    pub fn resolve_delete(self, snapshot: &ObjectRecord, current: Option<&ObjectRecord>) -> bool {
        match current {
            None => false,
            Some(current) if current.version == snapshot.version => {
                self != MergePolicy::RejectLocalChanges
            }
            Some(_) => self == MergePolicy::FavorMemory,
        }
    }
}

/// `base` with every field of `winner` that differs from `original` laid on top.
fn overlay(base: &Fields, winner: &Fields, original: &Fields) -> Fields {
    let mut merged = base.clone();
    for (name, value) in winner {
        if original.get(name) != Some(value) {
            merged.insert(name.clone(), value.clone());
        }
    }
    for name in original.keys() {
        if !winner.contains_key(name) {
            merged.remove(name);
        }
    }
    merged
}
