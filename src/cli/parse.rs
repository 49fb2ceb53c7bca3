//! CLI parse: clap types for tandem. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tandem CLI - inspect and feed a context stack's object store
#[derive(Parser, Debug)]
#[command(name = "tandem")]
#[command(about = "Inspect and import into a tandem object store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config/ and relative paths resolve here)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store location (overrides configuration)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Schema name to load from the bundle (default: merge all)
    #[arg(long)]
    pub schema: Option<String>,

    /// Schema bundle directory
    #[arg(long)]
    pub bundle: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show store location, schema and object counts
    Status {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show the resolved schema
    Schema,
    /// Import objects from a JSON file: [{"entity": "...", "fields": {...}}, ...]
    Import {
        file: PathBuf,
    },
    /// List stored objects of one entity
    List {
        entity: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
