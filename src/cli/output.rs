//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::{CommandError, ContextError, StackError};

/// Map command errors to a message for CLI output, with a hint where one helps.
pub fn map_error(e: &CommandError) -> String {
    match e {
        CommandError::Stack(StackError::Schema(_)) => {
            format!("{}\nhint: point --bundle at a directory of schema .toml files", e)
        }
        CommandError::Stack(StackError::AttachStore { .. }) => {
            format!("{}\nhint: the store may need a migration the schema cannot infer", e)
        }
        CommandError::Context(ContextError::Validation { .. }) => {
            format!("{}\nnothing was imported", e)
        }
        _ => e.to_string(),
    }
}
