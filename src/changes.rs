//! Change broadcast: events published after saves and the subscriber that
//! merges them into a stack's main context.

mod bus;
mod events;
pub mod merge;

pub use bus::{ChangeBus, Subscription};
pub use events::{ChangeEvent, ChangeSet};
pub use merge::{MergeStats, MergeStatsSnapshot, SkipReason};
