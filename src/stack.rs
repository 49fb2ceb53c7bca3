//! Stack: two coordinators on one store, the main context, and the factories
//! for background, scratch and editor contexts.
//!
//! Saves from any context are published on the stack's change bus. A merge
//! subscriber brings the ones that would not otherwise reach the main context
//! (imports, mostly) into it.

mod location;
mod options;

pub use location::{
    default_store_location, prepare_store_directory, resolve_store_location, AppIdentity,
    STORE_DIRECTORY, STORE_EXTENSION,
};
pub use options::{SchemaSource, StackOptions, DEFAULT_BUNDLE_DIR};

use crate::changes::merge::MergeSubscriber;
use crate::changes::{ChangeBus, MergeStats, MergeStatsSnapshot, Subscription};
use crate::context::worker::{ContextCore, ContextSpec, EditorTracker};
use crate::context::{Context, ContextKind, MergePolicy};
use crate::coordinator::Coordinator;
use crate::error::StackError;
use crate::schema::Schema;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Everything that exists only once the stack is ready.
struct StackCore {
    location: PathBuf,
    schema: Arc<Schema>,
    main_coordinator: Arc<Coordinator>,
    writer_coordinator: Arc<Coordinator>,
    main: Context,
    // Dropping it deregisters the merge subscriber
    _merge_subscription: Subscription,
}

pub struct Stack {
    options: StackOptions,
    read_only: AtomicBool,
    auto_merge: Arc<AtomicBool>,
    bus: ChangeBus,
    stats: Arc<MergeStats>,
    editors: Arc<EditorTracker>,
    /// Serializes initialization and read-only toggles.
    state_lock: Mutex<()>,
    core: OnceLock<StackCore>,
}

fn main_policy(read_only: bool) -> MergePolicy {
    if read_only {
        MergePolicy::RejectLocalChanges
    } else {
        MergePolicy::FavorMemory
    }
}

impl Stack {
    /// Build an unready stack. Call `initialize` before using it.
    pub fn new(options: StackOptions) -> Self {
        let bus = options.bus.clone().unwrap_or_default();
        Self {
            read_only: AtomicBool::new(options.read_only),
            auto_merge: Arc::new(AtomicBool::new(options.auto_merge_incoming)),
            bus,
            stats: Arc::new(MergeStats::default()),
            editors: Arc::new(EditorTracker::default()),
            state_lock: Mutex::new(()),
            core: OnceLock::new(),
            options,
        }
    }

    /// Build and initialize in one step.
    pub fn open(options: StackOptions) -> Result<Self, StackError> {
        let stack = Self::new(options);
        stack.initialize()?;
        Ok(stack)
    }

    /// Resolve the store and schema, attach both coordinators, start the main
    /// context and subscribe the merge subscriber. On error the stack stays
    /// unready and may be initialized again.
    pub fn initialize(&self) -> Result<(), StackError> {
        let _guard = self.state_lock.lock();
        if self.core.get().is_some() {
            return Err(StackError::AlreadyInitialized);
        }

        let schema = Arc::new(self.options.schema.resolve()?);
        let location = resolve_store_location(
            self.options.store_location.as_deref(),
            self.options.app_name.as_deref(),
        )?;
        debug!(
            location = %location.display(),
            schema = %schema.name,
            entities = schema.entities.len(),
            "Initializing stack"
        );

        let main_coordinator = Arc::new(Coordinator::new(Arc::clone(&schema)));
        let report = main_coordinator
            .attach_store(&location, &self.options.attach)
            .map_err(|source| StackError::AttachStore {
                coordinator: "main",
                source,
            })?;
        if report.migrated {
            info!(
                rewritten = report.rewritten,
                removed = report.removed,
                "Store migrated to current schema"
            );
        }
        let writer_coordinator = Arc::new(Coordinator::new(Arc::clone(&schema)));
        writer_coordinator
            .attach_store(&location, &self.options.attach)
            .map_err(|source| StackError::AttachStore {
                coordinator: "writer",
                source,
            })?;

        let read_only = self.read_only.load(Ordering::Acquire);
        let main_core = ContextCore::spawn(ContextSpec {
            kind: ContextKind::Main,
            policy: main_policy(read_only),
            coordinator: Arc::clone(&main_coordinator),
            parent: None,
            bus: self.bus.clone(),
            tracker: None,
        })?;

        let subscriber = MergeSubscriber::new(
            &main_core,
            [main_coordinator.id(), writer_coordinator.id()],
            Arc::clone(&self.auto_merge),
            Arc::clone(&self.stats),
        );
        let subscription = self.bus.subscribe(move |event| subscriber.handle(event));

        let core = StackCore {
            location: location.clone(),
            schema: Arc::clone(&schema),
            main_coordinator,
            writer_coordinator,
            main: Context::from_core(main_core),
            _merge_subscription: subscription,
        };
        if self.core.set(core).is_err() {
            return Err(StackError::AlreadyInitialized);
        }

        info!(
            location = %location.display(),
            schema = %schema.name,
            read_only,
            auto_merge_incoming = self.auto_merge_incoming(),
            "Stack ready"
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.core.get().is_some()
    }

    fn ready(&self) -> Result<&StackCore, StackError> {
        self.core.get().ok_or(StackError::NotReady)
    }

    pub fn main_context(&self) -> Result<&Context, StackError> {
        Ok(&self.ready()?.main)
    }

    pub fn main_coordinator(&self) -> Result<&Arc<Coordinator>, StackError> {
        Ok(&self.ready()?.main_coordinator)
    }

    pub fn writer_coordinator(&self) -> Result<&Arc<Coordinator>, StackError> {
        Ok(&self.ready()?.writer_coordinator)
    }

    pub fn store_location(&self) -> Result<&Path, StackError> {
        Ok(&self.ready()?.location)
    }

    pub fn schema(&self) -> Result<&Arc<Schema>, StackError> {
        Ok(&self.ready()?.schema)
    }

    /// Background context on the writer coordinator. Its saves reach the
    /// main context through the change bus.
    pub fn import_context(&self) -> Result<Context, StackError> {
        let core = self.ready()?;
        self.spawn(ContextSpec {
            kind: ContextKind::Import,
            policy: MergePolicy::FavorMemory,
            coordinator: Arc::clone(&core.writer_coordinator),
            parent: None,
            bus: self.bus.clone(),
            tracker: None,
        })
    }

    /// Sandbox on the main coordinator; its saves roll back local changes.
    pub fn scratch_context(&self) -> Result<Context, StackError> {
        let core = self.ready()?;
        self.spawn(ContextSpec {
            kind: ContextKind::Scratch,
            policy: MergePolicy::RejectLocalChanges,
            coordinator: Arc::clone(&core.main_coordinator),
            parent: None,
            bus: self.bus.clone(),
            tracker: None,
        })
    }

    /// Child of the main context. Not available while read-only.
    pub fn editor_context(&self) -> Result<Context, StackError> {
        let core = self.ready()?;
        if self.read_only() {
            return Err(StackError::ReadOnly);
        }
        self.spawn(ContextSpec {
            kind: ContextKind::Editor,
            policy: MergePolicy::FavorMemory,
            coordinator: Arc::clone(&core.main_coordinator),
            parent: Some(Arc::clone(&core.main.core)),
            bus: self.bus.clone(),
            tracker: Some(Arc::clone(&self.editors)),
        })
    }

    fn spawn(&self, spec: ContextSpec) -> Result<Context, StackError> {
        Ok(Context::from_core(ContextCore::spawn(spec)?))
    }

    pub fn read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    /// Switch the main context between read-only and editable.
    ///
    /// Enabling read-only fails while any editor context, or a context
    /// nested under one, holds unsaved changes.
    pub fn set_read_only(&self, read_only: bool) -> Result<(), StackError> {
        let _guard = self.state_lock.lock();
        if self.read_only() == read_only {
            return Ok(());
        }
        if let Some(core) = self.core.get() {
            if read_only {
                let pending = self.editors.pending_count();
                if pending > 0 {
                    return Err(StackError::PendingEditorChanges(pending));
                }
            }
            core.main.core.set_merge_policy(main_policy(read_only))?;
        }
        self.read_only.store(read_only, Ordering::Release);
        info!(read_only, "Read-only mode changed");
        Ok(())
    }

    pub fn auto_merge_incoming(&self) -> bool {
        self.auto_merge.load(Ordering::Acquire)
    }

    pub fn set_auto_merge_incoming(&self, enabled: bool) {
        if self.auto_merge.swap(enabled, Ordering::AcqRel) != enabled {
            info!(enabled, "Auto-merge of incoming changes changed");
        }
    }

    pub fn change_bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn merge_stats(&self) -> MergeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Live editor contexts, nested ones included.
    pub fn editor_count(&self) -> usize {
        self.editors.live_count()
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("ready", &self.is_ready())
            .field("location", &self.core.get().map(|c| &c.location))
            .field("read_only", &self.read_only())
            .field("auto_merge_incoming", &self.auto_merge_incoming())
            .finish()
    }
}
