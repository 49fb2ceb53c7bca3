//! Change-sets saved in the background reaching the main context

use crate::integration::test_utils::{library_options, open_library};
use tandem::{fields, ChangeBus, Stack, Value};
use tempfile::TempDir;

#[tokio::test]
async fn test_import_appears_in_main_without_fetching() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();
    let import = stack.import_context().unwrap();

    let id = import
        .try_perform(|graph| {
            graph.insert(
                "Book",
                fields([("title", Value::from("Middlemarch")), ("pages", Value::from(880i64))]),
            )
        })
        .await
        .unwrap();
    import.save().await.unwrap();

    let merged = main
        .perform(move |graph| graph.registered_object(id))
        .await
        .unwrap()
        .expect("import merged into main");
    assert_eq!(merged.get("pages"), Some(&Value::Integer(880)));
    assert!(!main.has_changes());

    let stats = stack.merge_stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.merged, 1);
}

#[tokio::test]
async fn test_merge_keeps_unsaved_main_edits() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();

    let id = main
        .try_perform(|graph| graph.insert("Book", fields([("title", "Beloved")])))
        .await
        .unwrap();
    main.save().await.unwrap();
    main.try_perform(move |graph| graph.set(id, "author", "Morrison"))
        .await
        .unwrap();

    let import = stack.import_context().unwrap();
    import
        .try_perform(move |graph| graph.set(id, "pages", 324i64))
        .await
        .unwrap();
    import.save().await.unwrap();

    let object = main
        .perform(move |graph| graph.registered_object(id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(object.get("pages"), Some(&Value::Integer(324)));
    assert_eq!(object.get("author"), Some(&Value::from("Morrison")));
    assert!(main.has_changes());

    main.save().await.unwrap();
    let stored = stack.main_coordinator().unwrap().load(&id).unwrap().unwrap();
    assert_eq!(stored.fields.get("pages"), Some(&Value::Integer(324)));
    assert_eq!(stored.fields.get("author"), Some(&Value::from("Morrison")));
}

#[tokio::test]
async fn test_import_delete_removes_object_from_main() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();

    let id = main
        .try_perform(|graph| graph.insert("Shelf", fields([("name", "Drafts")])))
        .await
        .unwrap();
    main.save().await.unwrap();

    let import = stack.import_context().unwrap();
    import
        .try_perform(move |graph| graph.delete(id))
        .await
        .unwrap();
    import.save().await.unwrap();

    let (registered, count) = main
        .perform(move |graph| (graph.registered_object(id), graph.registered_count()))
        .await
        .unwrap();
    assert!(registered.is_none());
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_editor_save_reaches_main_once() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();
    let editor = stack.editor_context().unwrap();

    let id = editor
        .try_perform(|graph| graph.insert("Book", fields([("title", "Ulysses")])))
        .await
        .unwrap();
    editor.save().await.unwrap();

    let stats = stack.merge_stats();
    assert_eq!(stats.merged, 0);
    assert_eq!(stats.skipped_descendant, 1);
    assert_eq!(stats.skipped_from_main, 1);

    let books = main
        .try_perform(|graph| graph.fetch_all("Book"))
        .await
        .unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].id, id);
    assert!(!main.has_changes());
}

#[tokio::test]
async fn test_foreign_stack_on_shared_bus_is_ignored() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let bus = ChangeBus::new();
    let first = Stack::open(library_options(&first_dir).shared_bus(bus.clone())).unwrap();
    let second = Stack::open(library_options(&second_dir).shared_bus(bus.clone())).unwrap();
    assert_eq!(bus.subscriber_count(), 2);

    let import = second.import_context().unwrap();
    let id = import
        .try_perform(|graph| graph.insert("Shelf", fields([("name", "Elsewhere")])))
        .await
        .unwrap();
    import.save().await.unwrap();

    let first_stats = first.merge_stats();
    assert_eq!(first_stats.received, 1);
    assert_eq!(first_stats.skipped_foreign, 1);
    assert_eq!(second.merge_stats().merged, 1);

    let in_first = first
        .main_context()
        .unwrap()
        .try_perform(move |graph| graph.object(id))
        .await
        .unwrap();
    assert!(in_first.is_none());

    let in_second = second
        .main_context()
        .unwrap()
        .perform(move |graph| graph.registered_object(id))
        .await
        .unwrap();
    assert!(in_second.is_some());
}

#[tokio::test]
async fn test_auto_merge_can_be_switched_off() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();
    stack.set_auto_merge_incoming(false);

    let import = stack.import_context().unwrap();
    let quiet = import
        .try_perform(|graph| graph.insert("Shelf", fields([("name", "Quiet")])))
        .await
        .unwrap();
    import.save().await.unwrap();

    assert_eq!(stack.merge_stats().skipped_disabled, 1);
    let registered = main
        .perform(move |graph| graph.registered_object(quiet))
        .await
        .unwrap();
    assert!(registered.is_none());

    // Still readable from the store on demand
    let faulted = main
        .try_perform(move |graph| graph.object(quiet))
        .await
        .unwrap();
    assert!(faulted.is_some());

    stack.set_auto_merge_incoming(true);
    let loud = import
        .try_perform(|graph| graph.insert("Shelf", fields([("name", "Loud")])))
        .await
        .unwrap();
    import.save().await.unwrap();
    let registered = main
        .perform(move |graph| graph.registered_object(loud))
        .await
        .unwrap();
    assert!(registered.is_some());
    assert_eq!(stack.merge_stats().merged, 1);
}

#[tokio::test]
async fn test_scratch_saves_never_broadcast() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let scratch = stack.scratch_context().unwrap();

    scratch
        .try_perform(|graph| graph.insert("Book", fields([("title", "Sandbox")])))
        .await
        .unwrap();
    scratch.save().await.unwrap();

    assert!(!scratch.has_changes());
    assert_eq!(stack.merge_stats().received, 0);
    assert!(stack
        .main_coordinator()
        .unwrap()
        .load_entity("Book")
        .unwrap()
        .is_empty());
}
