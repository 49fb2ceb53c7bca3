//! Config loader: assembles the layered sources and deserializes the result.

use super::defaults::builder_with_defaults;
use super::sources::{environment, global_file, workspace_file};
use super::TandemConfig;
use crate::error::StackError;
use config::File;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// files, environment. Relative store and bundle paths are resolved
    /// against the workspace root.
    pub fn load(workspace_root: &Path) -> Result<TandemConfig, StackError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);

        let mut config: TandemConfig = builder.build()?.try_deserialize()?;
        config.anchor_paths(workspace_root);
        Self::checked(config)
    }

    /// Load a single file on top of the defaults, plus environment overrides.
    /// Relative paths are resolved against the file's directory.
    pub fn load_from_file(path: &Path) -> Result<TandemConfig, StackError> {
        let builder = builder_with_defaults()?.add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder);

        let mut config: TandemConfig = builder.build()?.try_deserialize()?;
        if let Some(dir) = path.parent() {
            config.anchor_paths(dir);
        }
        Self::checked(config)
    }

    fn checked(config: TandemConfig) -> Result<TandemConfig, StackError> {
        config
            .validate()
            .map_err(|errors| StackError::Config(errors.join("; ")))?;
        debug!(
            bundle = %config.store.bundle.display(),
            schema = ?config.store.schema,
            location = ?config.store.location,
            "Configuration loaded"
        );
        Ok(config)
    }
}
