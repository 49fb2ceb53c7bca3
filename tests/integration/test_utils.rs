//! Shared test utilities for integration tests
//!
//! Provides the library schema, stack setup, and isolation of the XDG
//! environment variables the default store location depends on.

use std::sync::Mutex;
use tandem::schema::{AttributeDescription, AttributeKind, EntityDescription, Schema};
use tandem::{Stack, StackOptions, Value};
use tempfile::TempDir;

/// Global mutex to serialize XDG environment variable access across all tests
static XDG_ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Environment variable state to restore after test
struct EnvState {
    home: Option<String>,
    xdg_config_home: Option<String>,
    xdg_data_home: Option<String>,
}

impl EnvState {
    fn capture() -> Self {
        Self {
            home: std::env::var("HOME").ok(),
            xdg_config_home: std::env::var("XDG_CONFIG_HOME").ok(),
            xdg_data_home: std::env::var("XDG_DATA_HOME").ok(),
        }
    }

    fn restore(self) {
        restore_var("HOME", self.home);
        restore_var("XDG_CONFIG_HOME", self.xdg_config_home);
        restore_var("XDG_DATA_HOME", self.xdg_data_home);
    }
}

fn restore_var(name: &str, value: Option<String>) {
    match value {
        Some(value) => std::env::set_var(name, value),
        None => std::env::remove_var(name),
    }
}

/// Run `f` with HOME, XDG_CONFIG_HOME and XDG_DATA_HOME pointing into
/// `test_dir`, restoring the originals afterwards.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = XDG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_config_home = test_dir.path().join("config");
    let test_data_home = test_dir.path().join("data");
    let test_home = test_dir.path().join("home");

    std::fs::create_dir_all(&test_config_home).unwrap();
    std::fs::create_dir_all(&test_data_home).unwrap();
    std::fs::create_dir_all(&test_home).unwrap();

    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_config_home.to_str().unwrap());
    std::env::set_var("XDG_DATA_HOME", test_data_home.to_str().unwrap());

    let result = f();

    env_state.restore();

    result
}

/// Books with a required title, an optional author and a page count
/// defaulting to zero; shelves with a required name.
pub fn library_schema() -> Schema {
    Schema::new("library")
        .with_entity(
            "Book",
            EntityDescription::default()
                .with_attribute("title", AttributeDescription::required(AttributeKind::Text))
                .with_attribute("author", AttributeDescription::optional(AttributeKind::Text))
                .with_attribute(
                    "pages",
                    AttributeDescription::required(AttributeKind::Integer)
                        .with_default(Value::Integer(0)),
                ),
        )
        .with_entity(
            "Shelf",
            EntityDescription::default()
                .with_attribute("name", AttributeDescription::required(AttributeKind::Text)),
        )
}

pub fn library_options(temp_dir: &TempDir) -> StackOptions {
    StackOptions::new()
        .with_schema(library_schema())
        .at(temp_dir.path().join("library.store"))
}

pub fn open_library(temp_dir: &TempDir) -> Stack {
    Stack::open(library_options(temp_dir)).unwrap()
}
