//! Context domain: confined object graphs, their workers, merge policies and
//! save propagation.

pub mod graph;
pub mod handle;
pub mod merge_policy;
mod save;
pub(crate) mod worker;

pub use graph::{ObjectGraph, PendingChanges};
pub use handle::{Context, ContextKind};
pub use merge_policy::MergePolicy;
