//! Merge subscriber: brings change-sets saved by other contexts into a
//! stack's main context.

use crate::changes::events::ChangeEvent;
use crate::context::worker::ContextCore;
use crate::types::{ContextId, CoordinatorId};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Why an event was not merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AutoMergeDisabled,
    EmptyChangeSet,
    /// Saved by the main context itself.
    FromMain,
    /// Saved below the main context; reaches main through the parent save.
    MainDescendant,
    /// Saved through a coordinator of another stack.
    ForeignCoordinator,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SkipReason::AutoMergeDisabled => "auto-merge-disabled",
            SkipReason::EmptyChangeSet => "empty-change-set",
            SkipReason::FromMain => "from-main",
            SkipReason::MainDescendant => "main-descendant",
            SkipReason::ForeignCoordinator => "foreign-coordinator",
        };
        f.write_str(name)
    }
}

/// Counters of merge-subscriber decisions.
#[derive(Debug, Default)]
pub struct MergeStats {
    received: AtomicU64,
    merged: AtomicU64,
    skipped_disabled: AtomicU64,
    skipped_empty: AtomicU64,
    skipped_from_main: AtomicU64,
    skipped_descendant: AtomicU64,
    skipped_foreign: AtomicU64,
}

impl MergeStats {
    fn record_skip(&self, reason: SkipReason) {
        let counter = match reason {
            SkipReason::AutoMergeDisabled => &self.skipped_disabled,
            SkipReason::EmptyChangeSet => &self.skipped_empty,
            SkipReason::FromMain => &self.skipped_from_main,
            SkipReason::MainDescendant => &self.skipped_descendant,
            SkipReason::ForeignCoordinator => &self.skipped_foreign,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MergeStatsSnapshot {
        MergeStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            skipped_disabled: self.skipped_disabled.load(Ordering::Relaxed),
            skipped_empty: self.skipped_empty.load(Ordering::Relaxed),
            skipped_from_main: self.skipped_from_main.load(Ordering::Relaxed),
            skipped_descendant: self.skipped_descendant.load(Ordering::Relaxed),
            skipped_foreign: self.skipped_foreign.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStatsSnapshot {
    pub received: u64,
    pub merged: u64,
    pub skipped_disabled: u64,
    pub skipped_empty: u64,
    pub skipped_from_main: u64,
    pub skipped_descendant: u64,
    pub skipped_foreign: u64,
}

impl MergeStatsSnapshot {
    pub fn skipped(&self) -> u64 {
        self.skipped_disabled
            + self.skipped_empty
            + self.skipped_from_main
            + self.skipped_descendant
            + self.skipped_foreign
    }
}

/// Subscriber a stack registers on its bus.
///
/// Holds the main context weakly so the subscription never keeps it alive.
pub(crate) struct MergeSubscriber {
    main: Weak<ContextCore>,
    main_id: ContextId,
    coordinators: [CoordinatorId; 2],
    auto_merge: Arc<AtomicBool>,
    stats: Arc<MergeStats>,
}

impl MergeSubscriber {
    pub(crate) fn new(
        main: &Arc<ContextCore>,
        coordinators: [CoordinatorId; 2],
        auto_merge: Arc<AtomicBool>,
        stats: Arc<MergeStats>,
    ) -> Self {
        Self {
            main: Arc::downgrade(main),
            main_id: main.id,
            coordinators,
            auto_merge,
            stats,
        }
    }

    /// Filters in order; the first that applies wins.
    pub(crate) fn skip_reason(&self, event: &ChangeEvent) -> Option<SkipReason> {
        if !self.auto_merge.load(Ordering::Acquire) {
            Some(SkipReason::AutoMergeDisabled)
        } else if event.changes.is_empty() {
            Some(SkipReason::EmptyChangeSet)
        } else if event.source == self.main_id {
            Some(SkipReason::FromMain)
        } else if event.descends_from(self.main_id) {
            Some(SkipReason::MainDescendant)
        } else if !self.coordinators.contains(&event.coordinator) {
            Some(SkipReason::ForeignCoordinator)
        } else {
            None
        }
    }

    pub(crate) fn handle(&self, event: &ChangeEvent) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        if let Some(reason) = self.skip_reason(event) {
            trace!(source = %event.source, reason = %reason, "Change event skipped");
            self.stats.record_skip(reason);
            return;
        }

        let Some(main) = self.main.upgrade() else {
            trace!(source = %event.source, "Main context gone; change event dropped");
            return;
        };
        let changes = Arc::clone(&event.changes);
        match main.submit(Box::new(move |graph| graph.merge_changes(&changes))) {
            Ok(()) => {
                self.stats.merged.fetch_add(1, Ordering::Relaxed);
                trace!(
                    source = %event.source,
                    main = %self.main_id,
                    objects = event.changes.len(),
                    "Change event queued for merge"
                );
            }
            Err(err) => {
                warn!(source = %event.source, error = %err, "Failed to queue merge into main context");
            }
        }
    }
}
