//! Stack setup, readiness and context factories

use crate::integration::test_utils::{library_options, library_schema, open_library, with_xdg_env};
use std::fs;
use tandem::error::StackError;
use tandem::stack::{STORE_DIRECTORY, STORE_EXTENSION};
use tandem::{ContextKind, MergePolicy, Stack, StackOptions};
use tempfile::TempDir;

#[test]
fn test_unready_stack_rejects_factories() {
    let temp_dir = TempDir::new().unwrap();
    let stack = Stack::new(library_options(&temp_dir));

    assert!(!stack.is_ready());
    assert!(matches!(stack.main_context(), Err(StackError::NotReady)));
    assert!(matches!(stack.import_context(), Err(StackError::NotReady)));
    assert!(matches!(stack.schema(), Err(StackError::NotReady)));

    stack.initialize().unwrap();
    assert!(stack.is_ready());
    assert!(stack.import_context().is_ok());
}

#[test]
fn test_main_and_writer_coordinators_share_one_store() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);

    let main = stack.main_coordinator().unwrap();
    let writer = stack.writer_coordinator().unwrap();
    assert_ne!(main.id(), writer.id());
    assert_eq!(main.location(), writer.location());
    assert_eq!(
        stack.store_location().unwrap(),
        temp_dir.path().join("library.store")
    );
}

#[test]
fn test_context_kinds_and_bindings() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();
    let writer_id = stack.writer_coordinator().unwrap().id();

    assert_eq!(main.kind(), ContextKind::Main);
    assert!(main.lineage().is_empty());

    let import = stack.import_context().unwrap();
    assert_eq!(import.kind(), ContextKind::Import);
    assert_eq!(import.coordinator_id(), writer_id);

    let scratch = stack.scratch_context().unwrap();
    assert_eq!(scratch.kind(), ContextKind::Scratch);
    assert_eq!(scratch.merge_policy(), MergePolicy::RejectLocalChanges);

    let editor = stack.editor_context().unwrap();
    let nested = editor.child_context().unwrap();
    assert_eq!(nested.kind(), ContextKind::Editor);
    assert_eq!(nested.lineage(), &[editor.id(), main.id()]);
    assert_eq!(nested.coordinator_id(), main.coordinator_id());

    // Every factory call yields a fresh context
    let another = stack.import_context().unwrap();
    assert_ne!(another.id(), import.id());
}

#[test]
fn test_default_location_comes_from_app_name() {
    let temp_dir = TempDir::new().unwrap();
    with_xdg_env(&temp_dir, || {
        let stack = Stack::open(
            StackOptions::new()
                .with_schema(library_schema())
                .app_name("Book Shelf!"),
        )
        .unwrap();

        let expected = temp_dir
            .path()
            .join("data")
            .join(STORE_DIRECTORY)
            .join(format!("BookShelf.{}", STORE_EXTENSION));
        assert_eq!(stack.store_location().unwrap(), expected);
        assert!(expected.parent().unwrap().is_dir());
    });
}

#[test]
fn test_schema_from_bundle() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = temp_dir.path().join("schemas");
    fs::create_dir_all(bundle.join("extra")).unwrap();
    fs::write(
        bundle.join("library.toml"),
        r#"
[entities.Book.attributes.title]
type = "text"
"#,
    )
    .unwrap();
    fs::write(
        bundle.join("extra").join("people.toml"),
        r#"
[entities.Person.attributes.name]
type = "text"
optional = true
"#,
    )
    .unwrap();

    let merged = Stack::open(
        StackOptions::new()
            .with_bundle(&bundle, None)
            .at(temp_dir.path().join("merged.store")),
    )
    .unwrap();
    let schema = merged.schema().unwrap();
    assert!(schema.entity("Book").is_some());
    assert!(schema.entity("Person").is_some());

    let single = Stack::open(
        StackOptions::new()
            .with_bundle(&bundle, Some("people"))
            .at(temp_dir.path().join("people.store")),
    )
    .unwrap();
    assert_eq!(single.schema().unwrap().name, "people");
    assert!(single.schema().unwrap().entity("Book").is_none());
}

#[test]
fn test_missing_schema_is_a_setup_error() {
    let temp_dir = TempDir::new().unwrap();
    let stack = Stack::new(
        StackOptions::new()
            .with_bundle(temp_dir.path(), Some("absent"))
            .at(temp_dir.path().join("x.store")),
    );
    let err = stack.initialize().unwrap_err();
    assert!(matches!(err, StackError::Schema(_)));
    assert!(!stack.is_ready());
}

#[test]
fn test_dropped_contexts_release_editor_tracking() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);

    let editor = stack.editor_context().unwrap();
    let nested = editor.child_context().unwrap();
    assert_eq!(stack.editor_count(), 2);

    drop(nested);
    drop(editor);
    assert_eq!(stack.editor_count(), 0);
}
