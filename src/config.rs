//! Configuration System
//!
//! Layered configuration for the stack and the command-line tool: built-in
//! defaults, the global config file, workspace config files, then
//! `TANDEM_`-prefixed environment variables.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod defaults;
mod facade;
mod sources;

pub use facade::ConfigLoader;
pub use sources::environment::ENV_PREFIX;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TandemConfig {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub contexts: ContextsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application identity used to derive the default store location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Falls back to the executable name
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Explicit store location; derived from the app name when unset
    #[serde(default)]
    pub location: Option<PathBuf>,

    /// Schema to load from the bundle; every schema is merged when unset
    #[serde(default)]
    pub schema: Option<String>,

    /// Schema bundle directory
    #[serde(default = "default_bundle")]
    pub bundle: PathBuf,

    #[serde(default = "default_true")]
    pub migrate_automatically: bool,

    #[serde(default = "default_true")]
    pub infer_mapping_automatically: bool,
}

fn default_bundle() -> PathBuf {
    PathBuf::from(crate::stack::DEFAULT_BUNDLE_DIR)
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: None,
            schema: None,
            bundle: default_bundle(),
            migrate_automatically: true,
            infer_mapping_automatically: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextsConfig {
    #[serde(default)]
    pub read_only: bool,

    #[serde(default = "default_true")]
    pub auto_merge_incoming: bool,
}

impl Default for ContextsConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            auto_merge_incoming: true,
        }
    }
}

impl TandemConfig {
    /// Validate the entire configuration, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.store.bundle.as_os_str().is_empty() {
            errors.push("store.bundle cannot be empty".to_string());
        }
        if let Some(location) = &self.store.location {
            if location.file_name().is_none() {
                errors.push(format!(
                    "store.location must name a store, got '{}'",
                    location.display()
                ));
            }
        }
        if let Some(schema) = &self.store.schema {
            if schema.trim().is_empty() {
                errors.push("store.schema cannot be blank".to_string());
            }
        }
        if let Some(name) = &self.app.name {
            if !name.chars().any(char::is_alphanumeric) {
                errors.push(format!("app.name '{}' has no alphanumeric characters", name));
            }
        }
        if !["json", "text"].contains(&self.logging.format.as_str()) {
            errors.push(format!("logging.format '{}' is not json or text", self.logging.format));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve relative store and bundle paths against `root`.
    pub fn anchor_paths(&mut self, root: &Path) {
        if self.store.bundle.is_relative() {
            self.store.bundle = root.join(&self.store.bundle);
        }
        if let Some(location) = &self.store.location {
            if location.is_relative() {
                self.store.location = Some(root.join(location));
            }
        }
    }
}
