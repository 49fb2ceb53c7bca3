//! Store location resolution.

use crate::error::StackError;
use directories::BaseDirs;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Directory under the platform data dir that holds default stores.
pub const STORE_DIRECTORY: &str = "tandem";
pub const STORE_EXTENSION: &str = "store";

/// Name of the application a default store belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    name: String,
}

impl AppIdentity {
    /// Use `configured` when given, the running executable's file stem otherwise.
    pub fn resolve(configured: Option<&str>) -> Result<Self, StackError> {
        let name = match configured {
            Some(name) => name.to_string(),
            None => {
                let exe = std::env::current_exe().map_err(|e| {
                    StackError::AppIdentity(format!("cannot locate executable: {}", e))
                })?;
                exe.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        StackError::AppIdentity(format!(
                            "executable name is not valid UTF-8: {}",
                            exe.display()
                        ))
                    })?
            }
        };
        let identity = Self { name };
        if identity.clean_name().is_empty() {
            return Err(StackError::AppIdentity(format!(
                "'{}' has no alphanumeric characters",
                identity.name
            )));
        }
        Ok(identity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// NFC-normalized name reduced to alphanumeric characters.
    pub fn clean_name(&self) -> String {
        self.name.nfc().filter(|c| c.is_alphanumeric()).collect()
    }

    pub fn store_file_name(&self) -> String {
        format!("{}.{}", self.clean_name(), STORE_EXTENSION)
    }
}

/// `<data dir>/tandem/<clean app name>.store`
pub fn default_store_location(identity: &AppIdentity) -> Result<PathBuf, StackError> {
    let dirs = BaseDirs::new().ok_or_else(|| {
        StackError::AppIdentity("no home directory to derive a store location from".to_string())
    })?;
    Ok(dirs
        .data_dir()
        .join(STORE_DIRECTORY)
        .join(identity.store_file_name()))
}

/// Create the directory that will hold the store at `location`.
pub fn prepare_store_directory(location: &Path) -> Result<(), StackError> {
    let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    std::fs::create_dir_all(parent).map_err(|source| StackError::StoreDirectory {
        path: parent.to_path_buf(),
        source,
    })
}

/// Explicit location if given, default location for the app otherwise.
pub fn resolve_store_location(
    explicit: Option<&Path>,
    app_name: Option<&str>,
) -> Result<PathBuf, StackError> {
    let location = match explicit {
        Some(location) => location.to_path_buf(),
        None => default_store_location(&AppIdentity::resolve(app_name)?)?,
    };
    prepare_store_directory(&location)?;
    Ok(location)
}
