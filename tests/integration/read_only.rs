//! Read-only mode on a live stack

use crate::integration::test_utils::{library_options, open_library};
use tandem::error::StackError;
use tandem::{fields, MergePolicy, Stack};
use tempfile::TempDir;

#[tokio::test]
async fn test_read_only_main_discards_local_saves_but_still_merges() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let main = stack.main_context().unwrap();

    let local = main
        .try_perform(|graph| graph.insert("Book", fields([("title", "Local")])))
        .await
        .unwrap();
    stack.set_read_only(true).unwrap();
    assert!(stack.read_only());
    assert_eq!(main.merge_policy(), MergePolicy::RejectLocalChanges);

    main.save().await.unwrap();
    assert!(!main.has_changes());
    let coordinator = stack.main_coordinator().unwrap();
    assert!(coordinator.load(&local).unwrap().is_none());

    let import = stack.import_context().unwrap();
    let incoming = import
        .try_perform(|graph| graph.insert("Book", fields([("title", "Incoming")])))
        .await
        .unwrap();
    import.save().await.unwrap();

    let (local_in_main, incoming_in_main) = main
        .perform(move |graph| (graph.registered_object(local), graph.registered_object(incoming)))
        .await
        .unwrap();
    assert!(local_in_main.is_none());
    assert!(incoming_in_main.is_some());

    assert!(matches!(stack.editor_context(), Err(StackError::ReadOnly)));
}

#[tokio::test]
async fn test_read_only_refused_while_editors_hold_changes() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let editor = stack.editor_context().unwrap();
    let nested = editor.child_context().unwrap();

    nested
        .try_perform(|graph| graph.insert("Shelf", fields([("name", "Pending")])))
        .await
        .unwrap();

    let err = stack.set_read_only(true).unwrap_err();
    assert!(matches!(err, StackError::PendingEditorChanges(1)));
    assert!(!stack.read_only());
    assert_eq!(
        stack.main_context().unwrap().merge_policy(),
        MergePolicy::FavorMemory
    );

    nested.save().await.unwrap();
    stack.set_read_only(true).unwrap();
    assert!(stack.read_only());
}

#[tokio::test]
async fn test_leaving_read_only_restores_editing() {
    let temp_dir = TempDir::new().unwrap();
    let stack = Stack::open(library_options(&temp_dir).read_only(true)).unwrap();
    let main = stack.main_context().unwrap();
    assert!(stack.editor_context().is_err());

    stack.set_read_only(false).unwrap();
    let id = main
        .try_perform(|graph| graph.insert("Shelf", fields([("name", "Kept")])))
        .await
        .unwrap();
    main.save().await.unwrap();

    assert!(stack
        .main_coordinator()
        .unwrap()
        .load(&id)
        .unwrap()
        .is_some());
    assert!(stack.editor_context().is_ok());
}

#[test]
fn test_toggling_to_the_current_state_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    let _editor = stack.editor_context().unwrap();

    stack.set_read_only(false).unwrap();
    assert!(!stack.read_only());
}

#[tokio::test]
async fn test_main_children_cannot_sidestep_read_only() {
    let temp_dir = TempDir::new().unwrap();
    let stack = open_library(&temp_dir);
    stack.set_read_only(true).unwrap();

    let main = stack.main_context().unwrap();
    let err = main.child_context().unwrap_err();
    assert!(matches!(err, tandem::ContextError::MainChild));
    assert_eq!(stack.editor_count(), 0);

    stack.set_read_only(false).unwrap();
    assert!(matches!(
        main.child_context(),
        Err(tandem::ContextError::MainChild)
    ));
    assert!(stack.editor_context().is_ok());
}
