//! Context worker
//!
//! Every context owns one thread that executes all work against its object
//! graph. Other threads reach the graph only by submitting closures to the
//! worker's mailbox.

use crate::changes::ChangeBus;
use crate::context::graph::{GraphSource, ObjectGraph};
use crate::context::{ContextKind, MergePolicy};
use crate::coordinator::Coordinator;
use crate::error::ContextError;
use crate::types::ContextId;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

pub(crate) type Job = Box<dyn FnOnce(&mut ObjectGraph) + Send>;

/// Everything needed to start a context.
pub(crate) struct ContextSpec {
    pub kind: ContextKind,
    pub policy: MergePolicy,
    pub coordinator: Arc<Coordinator>,
    pub parent: Option<Arc<ContextCore>>,
    pub bus: ChangeBus,
    pub tracker: Option<Arc<EditorTracker>>,
}

/// Shared half of a context: identity, links and the mailbox.
///
/// The object graph itself lives on the worker thread. When the last
/// `Arc<ContextCore>` goes away the mailbox closes and the worker exits.
pub(crate) struct ContextCore {
    pub(crate) id: ContextId,
    pub(crate) kind: ContextKind,
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) parent: Option<Arc<ContextCore>>,
    /// Ancestors, nearest first.
    pub(crate) lineage: Vec<ContextId>,
    pub(crate) bus: ChangeBus,
    pub(crate) tracker: Option<Arc<EditorTracker>>,
    mailbox: Mutex<mpsc::Sender<Job>>,
    pending: Arc<AtomicBool>,
    policy: Mutex<MergePolicy>,
}

impl ContextCore {
    pub(crate) fn spawn(spec: ContextSpec) -> Result<Arc<Self>, ContextError> {
        let id = ContextId::next();
        let lineage = match &spec.parent {
            Some(parent) => {
                let mut lineage = Vec::with_capacity(parent.lineage.len() + 1);
                lineage.push(parent.id);
                lineage.extend(parent.lineage.iter().copied());
                lineage
            }
            None => Vec::new(),
        };

        let source = match &spec.parent {
            Some(parent) => GraphSource::Parent(Arc::clone(parent)),
            None => GraphSource::Store(Arc::clone(&spec.coordinator)),
        };
        let pending = Arc::new(AtomicBool::new(false));
        let graph = ObjectGraph::new(
            id,
            spec.policy,
            Arc::clone(spec.coordinator.schema()),
            source,
            Arc::clone(&pending),
        );

        let (sender, receiver) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name(format!("tandem-{}", id))
            .spawn(move || run_worker(graph, receiver))
            .map_err(ContextError::Spawn)?;

        let core = Arc::new(Self {
            id,
            kind: spec.kind,
            coordinator: spec.coordinator,
            parent: spec.parent,
            lineage,
            bus: spec.bus,
            tracker: spec.tracker,
            mailbox: Mutex::new(sender),
            pending,
            policy: Mutex::new(spec.policy),
        });
        debug!(
            context = %core.id,
            kind = %core.kind,
            policy = %spec.policy,
            parent = ?core.parent.as_ref().map(|p| p.id),
            coordinator = %core.coordinator.id(),
            "Context created"
        );
        Ok(core)
    }

    /// Queue a job without waiting for it.
    pub(crate) fn submit(&self, job: Job) -> Result<(), ContextError> {
        self.mailbox
            .lock()
            .send(job)
            .map_err(|_| ContextError::Closed)
    }

    fn submit_with_reply<R, F>(&self, f: F) -> Result<oneshot::Receiver<R>, ContextError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ObjectGraph) -> R + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        self.submit(Box::new(move |graph| {
            let result = f(graph);
            // Publish before replying so the caller never observes a stale flag
            graph.publish_pending();
            let _ = reply.send(result);
        }))?;
        Ok(receiver)
    }

    pub(crate) async fn call<R, F>(&self, f: F) -> Result<R, ContextError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ObjectGraph) -> R + Send + 'static,
    {
        self.submit_with_reply(f)?
            .await
            .map_err(|_| ContextError::Closed)
    }

    /// Must not be called from inside an async runtime.
    pub(crate) fn call_blocking<R, F>(&self, f: F) -> Result<R, ContextError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ObjectGraph) -> R + Send + 'static,
    {
        self.submit_with_reply(f)?
            .blocking_recv()
            .map_err(|_| ContextError::Closed)
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn merge_policy(&self) -> MergePolicy {
        *self.policy.lock()
    }

    /// Swap the policy. Jobs already queued run under the old one.
    pub(crate) fn set_merge_policy(&self, policy: MergePolicy) -> Result<(), ContextError> {
        let mut current = self.policy.lock();
        if *current == policy {
            return Ok(());
        }
        self.submit(Box::new(move |graph| graph.set_merge_policy(policy)))?;
        *current = policy;
        debug!(context = %self.id, policy = %policy, "Merge policy changed");
        Ok(())
    }
}

fn run_worker(mut graph: ObjectGraph, mailbox: mpsc::Receiver<Job>) {
    let id = graph.context_id();
    while let Ok(job) = mailbox.recv() {
        if panic::catch_unwind(AssertUnwindSafe(|| job(&mut graph))).is_err() {
            error!(context = %id, "Context job panicked");
        }
        graph.publish_pending();
    }
    trace!(context = %id, "Context worker stopped");
}

/// Token owned by the caller-facing handle of a tracked context.
pub(crate) struct EditorLease;

struct TrackedEditor {
    lease: Weak<EditorLease>,
    core: Weak<ContextCore>,
}

impl TrackedEditor {
    fn is_live(&self) -> bool {
        self.lease.strong_count() > 0
    }
}

/// Weak registry of live editor contexts and their descendants.
///
/// A context counts as live while its handle exists. Worker threads of
/// nested children may keep the core itself around a little longer.
#[derive(Default)]
pub(crate) struct EditorTracker {
    editors: Mutex<Vec<TrackedEditor>>,
}

impl EditorTracker {
    pub(crate) fn track(&self, core: &Arc<ContextCore>) -> Arc<EditorLease> {
        let lease = Arc::new(EditorLease);
        let mut editors = self.editors.lock();
        editors.retain(TrackedEditor::is_live);
        editors.push(TrackedEditor {
            lease: Arc::downgrade(&lease),
            core: Arc::downgrade(core),
        });
        lease
    }

    /// Live tracked contexts that currently hold unsaved changes.
    pub(crate) fn pending_count(&self) -> usize {
        let mut editors = self.editors.lock();
        editors.retain(TrackedEditor::is_live);
        editors
            .iter()
            .filter_map(|editor| editor.core.upgrade())
            .filter(|core| core.has_changes())
            .count()
    }

    pub(crate) fn live_count(&self) -> usize {
        let mut editors = self.editors.lock();
        editors.retain(TrackedEditor::is_live);
        editors.len()
    }
}
