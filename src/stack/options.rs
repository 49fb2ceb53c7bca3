//! Stack initialization parameters.

use crate::changes::ChangeBus;
use crate::config::TandemConfig;
use crate::coordinator::AttachOptions;
use crate::error::SchemaError;
use crate::schema::Schema;
use std::path::PathBuf;

/// Default schema bundle directory, relative to the working directory.
pub const DEFAULT_BUNDLE_DIR: &str = "schemas";

/// Where the stack's schema comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    Inline(Schema),
    /// A schema bundle directory. `name` selects one schema; `None` merges
    /// every schema found.
    Bundle { dir: PathBuf, name: Option<String> },
}

impl SchemaSource {
    pub fn resolve(&self) -> Result<Schema, SchemaError> {
        match self {
            SchemaSource::Inline(schema) => Ok(schema.clone()),
            SchemaSource::Bundle { dir, name } => Schema::resolve(dir, name.as_deref()),
        }
    }
}

impl Default for SchemaSource {
    fn default() -> Self {
        SchemaSource::Bundle {
            dir: PathBuf::from(DEFAULT_BUNDLE_DIR),
            name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackOptions {
    pub schema: SchemaSource,
    /// Explicit store location; derived from the application name otherwise.
    pub store_location: Option<PathBuf>,
    pub app_name: Option<String>,
    pub attach: AttachOptions,
    pub read_only: bool,
    pub auto_merge_incoming: bool,
    /// Share a bus with other stacks instead of owning a fresh one.
    pub bus: Option<ChangeBus>,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            schema: SchemaSource::default(),
            store_location: None,
            app_name: None,
            attach: AttachOptions::default(),
            read_only: false,
            auto_merge_incoming: true,
            bus: None,
        }
    }
}

impl StackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TandemConfig) -> Self {
        Self {
            schema: SchemaSource::Bundle {
                dir: config.store.bundle.clone(),
                name: config.store.schema.clone(),
            },
            store_location: config.store.location.clone(),
            app_name: config.app.name.clone(),
            attach: AttachOptions {
                migrate_automatically: config.store.migrate_automatically,
                infer_mapping_automatically: config.store.infer_mapping_automatically,
            },
            read_only: config.contexts.read_only,
            auto_merge_incoming: config.contexts.auto_merge_incoming,
            bus: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = SchemaSource::Inline(schema);
        self
    }

    pub fn with_bundle(mut self, dir: impl Into<PathBuf>, name: Option<&str>) -> Self {
        self.schema = SchemaSource::Bundle {
            dir: dir.into(),
            name: name.map(str::to_string),
        };
        self
    }

    pub fn at(mut self, location: impl Into<PathBuf>) -> Self {
        self.store_location = Some(location.into());
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn attach_options(mut self, attach: AttachOptions) -> Self {
        self.attach = attach;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn auto_merge_incoming(mut self, enabled: bool) -> Self {
        self.auto_merge_incoming = enabled;
        self
    }

    pub fn shared_bus(mut self, bus: ChangeBus) -> Self {
        self.bus = Some(bus);
        self
    }
}
