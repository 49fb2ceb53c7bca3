//! Tandem: coordinated working contexts over one object store
//!
//! A `Stack` opens a main and a writer coordinator on the same store and owns
//! the main context. Import, scratch and editor contexts come from the stack;
//! saving a context cascades up its parent chain, and change-sets saved in the
//! background are merged into the main context through the stack's change bus.

pub mod changes;
pub mod cli;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod schema;
pub mod stack;
pub mod store;
pub mod types;

pub use changes::{ChangeBus, ChangeEvent, ChangeSet, MergeStatsSnapshot};
pub use context::{Context, ContextKind, MergePolicy, ObjectGraph};
pub use coordinator::{AttachOptions, Coordinator};
pub use error::{ContextError, StackError};
pub use stack::{Stack, StackOptions};
pub use types::{fields, ContextId, CoordinatorId, Fields, ManagedObject, ObjectId, Value};
