//! Saves cascading from nested editors through the main context to the store

use crate::integration::test_utils::open_library;
use parking_lot::Mutex;
use std::sync::Arc;
use tandem::changes::Subscription;
use tandem::error::{ContextError, ValidationError};
use tandem::{fields, ChangeEvent, ObjectId, Stack, Value};
use tempfile::TempDir;

fn record_events(stack: &Stack) -> (Arc<Mutex<Vec<ChangeEvent>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = stack
        .change_bus()
        .subscribe(move |event| sink.lock().push(event.clone()));
    (events, subscription)
}

#[tokio::test]
async fn test_nested_save_reaches_the_store() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();
    let editor = stack.editor_context().unwrap();
    let nested = editor.child_context().unwrap();
    let (events, _subscription) = record_events(&stack);

    let id = nested
        .try_perform(|graph| graph.insert("Book", fields([("title", "Dune")])))
        .await
        .unwrap();
    assert!(nested.has_changes());

    nested.save().await.unwrap();

    assert!(!nested.has_changes());
    assert!(!editor.has_changes());
    assert!(!main.has_changes());

    let stored = stack.main_coordinator().unwrap().load(&id).unwrap().unwrap();
    assert_eq!(stored.fields.get("title"), Some(&Value::from("Dune")));
    assert_eq!(stored.fields.get("pages"), Some(&Value::Integer(0)));

    // One event per level, innermost first
    let sources: Vec<_> = events.lock().iter().map(|event| event.source).collect();
    assert_eq!(sources, vec![nested.id(), editor.id(), main.id()]);

    // Main adopted the saved record
    let in_main = main
        .perform(move |graph| graph.registered_object(id))
        .await
        .unwrap();
    assert_eq!(in_main.unwrap().get("title"), Some(&Value::from("Dune")));
}

#[tokio::test]
async fn test_failure_midway_stops_the_chain() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();
    let editor = stack.editor_context().unwrap();
    let nested = editor.child_context().unwrap();

    // A shelf without its required name; only caught when the editor saves
    let invalid = editor
        .try_perform(|graph| graph.insert("Shelf", fields(Vec::<(&str, Value)>::new())))
        .await
        .unwrap();
    nested
        .try_perform(|graph| graph.insert("Book", fields([("title", "Emma")])))
        .await
        .unwrap();

    let err = nested.save().await.unwrap_err();
    match err {
        ContextError::Validation { id, source } => {
            assert_eq!(id, invalid);
            assert!(matches!(source, ValidationError::MissingAttribute { .. }));
        }
        other => panic!("expected validation error, got {other}"),
    }

    // The nested level committed into the editor; nothing went further
    assert!(!nested.has_changes());
    assert!(editor.has_changes());
    assert!(!main.has_changes());
    assert!(stack
        .main_coordinator()
        .unwrap()
        .load_entity("Book")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_save_without_changes_is_silent() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let editor = stack.editor_context().unwrap();
    let (events, _subscription) = record_events(&stack);

    editor.save().await.unwrap();
    stack.main_context().unwrap().save().await.unwrap();

    assert!(events.lock().is_empty());
    assert_eq!(stack.merge_stats().received, 0);
}

#[tokio::test]
async fn test_second_save_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let editor = stack.editor_context().unwrap();
    let (events, _subscription) = record_events(&stack);

    editor
        .try_perform(|graph| graph.insert("Shelf", fields([("name", "Classics")])))
        .await
        .unwrap();
    editor.save().await.unwrap();
    let after_first = events.lock().len();
    assert_eq!(after_first, 2);

    editor.save().await.unwrap();
    assert_eq!(events.lock().len(), after_first);
    assert_eq!(
        stack
            .main_coordinator()
            .unwrap()
            .load_entity("Shelf")
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_editor_updates_and_deletes_main_objects() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();

    let (kept, dropped) = main
        .try_perform(|graph| {
            let kept = graph.insert("Book", fields([("title", "Persuasion")]))?;
            let dropped = graph.insert("Book", fields([("title", "Draft")]))?;
            Ok((kept, dropped))
        })
        .await
        .unwrap();
    main.save().await.unwrap();

    let editor = stack.editor_context().unwrap();
    editor
        .try_perform(move |graph| {
            graph.set(kept, "pages", 272i64)?;
            graph.delete(dropped)
        })
        .await
        .unwrap();
    editor.save().await.unwrap();

    let coordinator = stack.main_coordinator().unwrap();
    let stored = coordinator.load(&kept).unwrap().unwrap();
    assert_eq!(stored.fields.get("pages"), Some(&Value::Integer(272)));
    assert!(coordinator.load(&dropped).unwrap().is_none());

    let (kept_in_main, dropped_in_main) = main
        .perform(move |graph| (graph.registered_object(kept), graph.registered_object(dropped)))
        .await
        .unwrap();
    assert_eq!(kept_in_main.unwrap().get("pages"), Some(&Value::Integer(272)));
    assert!(dropped_in_main.is_none());
}

#[tokio::test]
async fn test_save_with_reports_through_callback() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let editor = stack.editor_context().unwrap();
    editor
        .try_perform(|graph| graph.insert("Book", fields([("title", "Kindred")])))
        .await
        .unwrap();

    let (reply, receiver) = tokio::sync::oneshot::channel();
    editor.save_with(move |result| {
        let _ = reply.send(result.is_ok());
    });
    assert!(receiver.await.unwrap());
}

#[test]
fn test_blocking_save_outside_a_runtime() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let import = stack.import_context().unwrap();

    let id: ObjectId = import
        .perform_blocking(|graph| graph.insert("Shelf", fields([("name", "Poetry")])))
        .unwrap()
        .unwrap();
    import.save_blocking().unwrap();

    assert!(stack
        .writer_coordinator()
        .unwrap()
        .load(&id)
        .unwrap()
        .is_some());
}
