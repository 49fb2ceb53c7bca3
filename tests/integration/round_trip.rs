//! Data written by one kind of context and read back through another

use crate::integration::test_utils::open_library;
use tandem::{fields, Value};
use tempfile::TempDir;

#[tokio::test]
async fn test_import_then_read_from_scratch() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);

    let import = stack.import_context().unwrap();
    import
        .try_perform(|graph| {
            for title in ["Bleak House", "Hard Times", "Little Dorrit"] {
                graph.insert("Book", fields([("title", title)]))?;
            }
            graph.insert("Shelf", fields([("name", "Dickens")]))?;
            Ok(())
        })
        .await
        .unwrap();
    import.save().await.unwrap();

    let scratch = stack.scratch_context().unwrap();
    let books = scratch
        .try_perform(|graph| graph.fetch_all("Book"))
        .await
        .unwrap();
    let mut titles: Vec<String> = books
        .iter()
        .filter_map(|book| book.get("title").and_then(Value::as_text).map(str::to_string))
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Bleak House", "Hard Times", "Little Dorrit"]);

    let shelves = scratch
        .try_perform(|graph| graph.fetch_all("Shelf"))
        .await
        .unwrap();
    assert_eq!(shelves.len(), 1);
}

#[tokio::test]
async fn test_scratch_edits_never_reach_the_store() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);

    let main = stack.main_context().unwrap();
    let id = main
        .try_perform(|graph| graph.insert("Book", fields([("title", "Original")])))
        .await
        .unwrap();
    main.save().await.unwrap();

    let scratch = stack.scratch_context().unwrap();
    scratch
        .try_perform(move |graph| graph.set(id, "title", "Scribbled"))
        .await
        .unwrap();
    assert!(scratch.has_changes());
    scratch.save().await.unwrap();

    let in_scratch = scratch
        .perform(move |graph| graph.registered_object(id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(in_scratch.get("title"), Some(&Value::from("Original")));
    let stored = stack.main_coordinator().unwrap().load(&id).unwrap().unwrap();
    assert_eq!(stored.fields.get("title"), Some(&Value::from("Original")));
}

#[tokio::test]
async fn test_editor_sees_unsaved_main_state() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();

    main.try_perform(|graph| {
        graph.insert("Shelf", fields([("name", "Saved")]))?;
        Ok(())
    })
    .await
    .unwrap();
    main.save().await.unwrap();
    main.try_perform(|graph| {
        graph.insert("Shelf", fields([("name", "Unsaved")]))?;
        Ok(())
    })
    .await
    .unwrap();

    // Editors read through their parent, not the store
    let editor = stack.editor_context().unwrap();
    let mut names: Vec<String> = editor
        .try_perform(|graph| graph.fetch_all("Shelf"))
        .await
        .unwrap()
        .iter()
        .filter_map(|shelf| shelf.get("name").and_then(Value::as_text).map(str::to_string))
        .collect();
    names.sort();
    assert_eq!(names, vec!["Saved", "Unsaved"]);
    assert!(!editor.has_changes());
}

#[tokio::test]
async fn test_unknown_entity_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let scratch = stack.scratch_context().unwrap();

    let err = scratch
        .try_perform(|graph| graph.fetch_all("Magazine"))
        .await
        .unwrap_err();
    assert!(matches!(err, tandem::ContextError::UnknownEntity(name) if name == "Magazine"));
}
