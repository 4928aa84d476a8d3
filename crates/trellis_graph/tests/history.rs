//! Integration tests for undo/redo and manual snapshots.

mod test_utils;

use test_utils::{Recorder, chain, sms, store, store_with};
use trellis_core::config::CanvasConfig;
use trellis_core::node::NodePatch;
use trellis_core::{ErrorCode, codes};
use trellis_graph::{HistoryError, HistoryManager};

// ═══════════════════════════════════════════════════════════════════════════════
// Undo / redo
// ═══════════════════════════════════════════════════════════════════════════════

/// Verifies undo with an empty past fails and changes nothing.
#[tokio::test]
async fn undo_on_empty_history_is_rejected() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    let revision = store.revision();
    let recorder = Recorder::attach(store.bus());

    let err = history.undo().await.expect_err("nothing to undo");

    assert_eq!(err, HistoryError::NothingToUndo);
    assert_eq!(err.code(), codes::HISTORY_EMPTY);
    assert_eq!(store.revision(), revision);
    assert!(store.all_nodes().is_empty());
    assert!(recorder.names().is_empty());
}

/// Verifies undo and redo walk the timeline in both directions.
#[tokio::test]
async fn undo_then_redo_restores_each_state() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    store.create_node(sms("a", 0.0, 0.0)).await.expect("a");
    store
        .update_node(&"a".into(), NodePatch::new().label("Hello"))
        .await
        .expect("label");

    history.undo().await.expect("undo label");
    assert_eq!(store.get_node(&"a".into()).expect("a").label.as_deref(), Some("SMS"));
    history.undo().await.expect("undo create");
    assert!(store.all_nodes().is_empty());
    assert!(!history.can_undo());

    history.redo().await.expect("redo create");
    history.redo().await.expect("redo label");
    assert_eq!(store.get_node(&"a".into()).expect("a").label.as_deref(), Some("Hello"));
    assert_eq!(
        history.redo().await.map_err(|e| e.code()),
        Err(codes::HISTORY_EMPTY)
    );
}

/// Verifies a new change after undo discards the redo branch.
#[tokio::test]
async fn new_changes_clear_the_future() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    store.create_node(sms("a", 0.0, 0.0)).await.expect("a");
    history.undo().await.expect("undo");
    assert!(history.can_redo());

    store.create_node(sms("b", 0.0, 0.0)).await.expect("b");
    assert!(!history.can_redo());
}

/// Verifies undo emits history events but records no new entry.
#[tokio::test]
async fn undo_does_not_record_itself() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    chain(&store).await;
    let size = history.history_size();
    let recorder = Recorder::attach(store.bus());

    history.undo().await.expect("undo");

    assert_eq!(history.history_size(), size);
    assert_eq!(recorder.count("history:undo"), 1);
    assert_eq!(recorder.count("canvas:state-changed"), 1);
    let names = recorder.names();
    let commit = names.iter().position(|n| n == "canvas:state-changed");
    let undo = names.iter().position(|n| n == "history:undo");
    assert!(commit < undo);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bound
// ═══════════════════════════════════════════════════════════════════════════════

/// Verifies the timeline never grows past its bound.
#[tokio::test]
async fn history_stays_within_max_size() {
    let max_size = 4;
    let store = store_with(CanvasConfig::default().with_history_size(max_size));
    let history = HistoryManager::new(store.clone());

    for i in 0..(max_size + 3) {
        store
            .create_node(sms(&format!("n{i}"), 0.0, 0.0))
            .await
            .expect("create");
        assert!(history.history_size() <= max_size);
    }

    let mut undone = 0;
    while history.can_undo() {
        history.undo().await.expect("undo");
        undone += 1;
    }
    assert_eq!(undone, max_size - 1);
    assert_eq!(store.all_nodes().len(), 4);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshots
// ═══════════════════════════════════════════════════════════════════════════════

/// Verifies snapshots are unaffected by later edits.
#[tokio::test]
async fn snapshots_are_independent_of_later_edits() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    store.create_node(sms("a", 0.0, 0.0)).await.expect("a");
    let saved = history.create_snapshot(Some("before move")).await;

    store.move_node(&"a".into(), 500.0, 500.0).await.expect("move");

    let node = saved.graph.node(&"a".into()).expect("a in snapshot");
    assert_eq!((node.x, node.y), (0.0, 0.0));
    assert_eq!(saved.description.as_deref(), Some("before move"));
}

/// Verifies restoring a snapshot installs it and discards the redo branch.
#[tokio::test]
async fn restore_snapshot_discards_future() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    store.create_node(sms("a", 0.0, 0.0)).await.expect("a");
    let saved = history.create_snapshot(None).await;
    store.create_node(sms("b", 0.0, 0.0)).await.expect("b");
    store.create_node(sms("c", 0.0, 0.0)).await.expect("c");
    history.undo().await.expect("undo c");
    assert!(history.can_redo());

    history.restore_snapshot(&saved.id).await.expect("restore");

    assert_eq!(store.all_nodes().len(), 1);
    assert!(!history.can_redo());
    assert!(history.can_undo());
    history.undo().await.expect("undo restore");
    assert_eq!(store.all_nodes().len(), 2);
}

/// Verifies restoring a neighbouring timeline entry keeps the timeline.
#[tokio::test]
async fn restore_neighbour_walks_the_timeline() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    store.create_node(sms("a", 0.0, 0.0)).await.expect("a");
    store.create_node(sms("b", 0.0, 0.0)).await.expect("b");
    store.create_node(sms("c", 0.0, 0.0)).await.expect("c");
    history.undo().await.expect("undo c");
    let recorder = Recorder::attach(store.bus());

    let before = history.state();
    let previous = before.past.last().cloned().expect("a past entry");
    history.restore_snapshot(&previous.id).await.expect("restore previous");

    assert_eq!(store.all_nodes().len(), 1);
    assert_eq!(history.state().future.len(), 2);
    assert_eq!(history.history_size(), before.past.len() + 1 + before.future.len());
    assert_eq!(recorder.count("history:undo"), 1);
    assert_eq!(recorder.count("snapshot:restored"), 1);

    let next = history.state().future.first().cloned().expect("a future entry");
    history.restore_snapshot(&next.id).await.expect("restore next");
    assert_eq!(store.all_nodes().len(), 2);
    assert!(history.can_redo());
    assert_eq!(recorder.count("history:redo"), 1);
}

/// Verifies the present state cannot be deleted and unknown ids are reported.
#[tokio::test]
async fn delete_snapshot_guards_present() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    let present = history.state().present;
    assert_eq!(
        history.delete_snapshot(&present.id).await,
        Err(HistoryError::PresentSnapshot(present.id.clone()))
    );
    let manual = history.create_snapshot(None).await;
    history.delete_snapshot(&manual.id).await.expect("manual snapshot removed");
    assert_eq!(
        history.get_snapshot(&manual.id).map_err(|e| e.code()),
        Err(codes::SNAPSHOT_NOT_FOUND)
    );
}

/// Verifies clearing history keeps the canvas and manual snapshots.
#[tokio::test]
async fn clear_history_keeps_canvas() {
    let store = store();
    let history = HistoryManager::new(store.clone());
    chain(&store).await;
    let manual = history.create_snapshot(None).await;
    history.clear_history().await;
    assert_eq!(history.history_size(), 1);
    assert!(!history.can_undo());
    assert_eq!(store.all_nodes().len(), 3);
    assert!(history.get_snapshot(&manual.id).is_ok());
}
