//! Caller-owned handle to a context.

use crate::changes::ChangeSet;
use crate::context::graph::ObjectGraph;
use crate::context::save::propagate_save;
use crate::context::worker::{ContextCore, ContextSpec, EditorLease};
use crate::context::MergePolicy;
use crate::error::ContextError;
use crate::types::{ContextId, CoordinatorId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// The stack's foreground context.
    Main,
    /// Background writes through the writer coordinator.
    Import,
    /// Disposable sandbox whose saves never persist.
    Scratch,
    /// Child of the main context or of another editor.
    Editor,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextKind::Main => "main",
            ContextKind::Import => "import",
            ContextKind::Scratch => "scratch",
            ContextKind::Editor => "editor",
        };
        f.write_str(name)
    }
}

/// A confined unit of work.
///
/// All access to the context's objects goes through `perform`, which runs the
/// closure on the context's worker. Dropping the handle releases the context
/// once queued work (and any child contexts) are done with it.
pub struct Context {
    pub(crate) core: Arc<ContextCore>,
    /// Keeps the context counted by its editor tracker while the handle lives.
    _lease: Option<Arc<EditorLease>>,
}

impl Context {
    pub(crate) fn from_core(core: Arc<ContextCore>) -> Self {
        let lease = core.tracker.as_ref().map(|tracker| tracker.track(&core));
        Self { core, _lease: lease }
    }

    pub fn id(&self) -> ContextId {
        self.core.id
    }

    pub fn kind(&self) -> ContextKind {
        self.core.kind
    }

    pub fn parent_id(&self) -> Option<ContextId> {
        self.core.parent.as_ref().map(|parent| parent.id)
    }

    /// Ancestors, nearest first.
    pub fn lineage(&self) -> &[ContextId] {
        &self.core.lineage
    }

    pub fn coordinator_id(&self) -> CoordinatorId {
        self.core.coordinator.id()
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.core.merge_policy()
    }

    /// Whether the context held unsaved changes after its last completed job.
    pub fn has_changes(&self) -> bool {
        self.core.has_changes()
    }

    /// Run `f` on the context's worker and wait for its result.
    pub async fn perform<R, F>(&self, f: F) -> Result<R, ContextError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ObjectGraph) -> R + Send + 'static,
    {
        self.core.call(f).await
    }

    /// `perform` for closures that can fail themselves.
    pub async fn try_perform<R, F>(&self, f: F) -> Result<R, ContextError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ObjectGraph) -> Result<R, ContextError> + Send + 'static,
    {
        self.core.call(f).await?
    }

    /// Blocking `perform`. Panics if called from within an async runtime.
    pub fn perform_blocking<R, F>(&self, f: F) -> Result<R, ContextError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ObjectGraph) -> R + Send + 'static,
    {
        self.core.call_blocking(f)
    }

    /// Save this context and then each ancestor. Returns immediately;
    /// `on_complete` runs on a context worker once the chain finished or
    /// failed.
    pub fn save_with<F>(&self, on_complete: F)
    where
        F: FnOnce(Result<(), ContextError>) + Send + 'static,
    {
        propagate_save(Arc::clone(&self.core), Box::new(on_complete));
    }

    pub async fn save(&self) -> Result<(), ContextError> {
        let (reply, receiver) = oneshot::channel();
        self.save_with(move |result| {
            let _ = reply.send(result);
        });
        receiver.await.map_err(|_| ContextError::Closed)?
    }

    /// Blocking `save`. Panics if called from within an async runtime.
    pub fn save_blocking(&self) -> Result<(), ContextError> {
        let (reply, receiver) = oneshot::channel();
        self.save_with(move |result| {
            let _ = reply.send(result);
        });
        receiver.blocking_recv().map_err(|_| ContextError::Closed)?
    }

    /// Queue a change-set saved elsewhere for merging into this context.
    pub fn merge_changes(&self, changes: Arc<ChangeSet>) -> Result<(), ContextError> {
        self.core
            .submit(Box::new(move |graph| graph.merge_changes(&changes)))
    }

    /// A nested editor whose parent is this context. Editors directly under
    /// the main context come from `Stack::editor_context` instead.
    pub fn child_context(&self) -> Result<Context, ContextError> {
        if self.core.kind == ContextKind::Main {
            return Err(ContextError::MainChild);
        }
        let core = ContextCore::spawn(ContextSpec {
            kind: ContextKind::Editor,
            policy: MergePolicy::FavorMemory,
            coordinator: Arc::clone(&self.core.coordinator),
            parent: Some(Arc::clone(&self.core)),
            bus: self.core.bus.clone(),
            tracker: self.core.tracker.clone(),
        })?;
        Ok(Context::from_core(core))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("parent", &self.parent_id())
            .field("policy", &self.merge_policy())
            .finish()
    }
}
