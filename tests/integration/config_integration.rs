//! Configuration driving stack setup

use crate::integration::test_utils::with_xdg_env;
use std::fs;
use std::path::Path;
use tandem::config::ConfigLoader;
use tandem::error::StackError;
use tandem::{MergePolicy, Stack, StackOptions};
use tempfile::TempDir;

const LIBRARY_SCHEMA: &str = r#"
[entities.Book.attributes.title]
type = "text"

[entities.Book.attributes.pages]
type = "integer"
default = { integer = 0 }
"#;

fn write_workspace(root: &Path, config: &str) {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("model")).unwrap();
    fs::write(root.join("config").join("config.toml"), config).unwrap();
    fs::write(root.join("model").join("library.toml"), LIBRARY_SCHEMA).unwrap();
}

#[test]
fn test_workspace_config_opens_stack() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let workspace = temp_dir.path().join("workspace");
        write_workspace(
            &workspace,
            r#"
[store]
location = "db/library.store"
bundle = "model"
schema = "library"

[contexts]
read_only = true
auto_merge_incoming = false
"#,
        );

        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(
            config.store.location.as_deref(),
            Some(workspace.join("db").join("library.store").as_path())
        );

        let stack = Stack::open(StackOptions::from_config(&config)).unwrap();
        assert_eq!(stack.schema().unwrap().name, "library");
        assert!(stack.read_only());
        assert!(!stack.auto_merge_incoming());
        assert_eq!(
            stack.main_context().unwrap().merge_policy(),
            MergePolicy::RejectLocalChanges
        );
        assert!(workspace.join("db").is_dir());
    });
}

#[test]
fn test_global_config_supplies_app_name() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let global_dir = temp_dir.path().join("config").join("tandem");
        fs::create_dir_all(&global_dir).unwrap();
        fs::write(global_dir.join("config.toml"), "[app]\nname = \"Reading List\"\n").unwrap();

        let workspace = temp_dir.path().join("workspace");
        write_workspace(&workspace, "[store]\nbundle = \"model\"\n");

        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(config.app.name.as_deref(), Some("Reading List"));

        let stack = Stack::open(StackOptions::from_config(&config)).unwrap();
        assert_eq!(
            stack.store_location().unwrap(),
            temp_dir
                .path()
                .join("data")
                .join("tandem")
                .join("ReadingList.store")
        );
    });
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let workspace = temp_dir.path().join("workspace");
        write_workspace(&workspace, "[logging]\nformat = \"xml\"\n");

        let err = ConfigLoader::load(&workspace).unwrap_err();
        assert!(matches!(err, StackError::Config(message) if message.contains("logging.format")));
    });
}
