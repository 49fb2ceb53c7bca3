//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; a single route table dispatches to the stack.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{
    format_objects_json, format_objects_text, format_schema_table, format_status_json,
    format_status_text, StoreStatus,
};
pub use route::{json_to_value, value_to_json, RunContext};
