//! Saving, loading and auto-saving canvases.

mod test_utils;

use test_utils::{chain, harness, harness_with, node_count, sms};
use trellis_core::codes;
use trellis_core::config::{CanvasConfig, StorageConfig};
use trellis_core::id::NodeId;
use trellis_services::prelude::*;

/// Verifies the dirty flag follows saves and edits.
#[tokio::test]
async fn saves_clear_unsaved_changes() {
    let h = harness().await;
    assert_eq!(h.canvas.has_unsaved_changes().await.data, Some(false));

    chain(&h.canvas).await;
    assert_eq!(h.canvas.has_unsaved_changes().await.data, Some(true));

    let id = h.canvas.save_canvas(Some("Welcome flow")).await.data.expect("saved");
    assert!(id.starts_with("canvas_"));
    assert_eq!(h.canvas.has_unsaved_changes().await.data, Some(false));
    assert_eq!(h.events.count("save:start"), 1);
    assert_eq!(h.events.count("save:end"), 1);

    assert!(h.canvas.create_node(sms("d", 0.0, 600.0)).await.success);
    assert_eq!(h.canvas.has_unsaved_changes().await.data, Some(true));
}

/// Verifies later saves overwrite the same record and keep its name.
#[tokio::test]
async fn later_saves_reuse_the_record() {
    let h = harness().await;
    chain(&h.canvas).await;
    let first = h.canvas.save_canvas(Some("Welcome flow")).await.data.expect("saved");

    h.clock.advance(5_000);
    assert!(h.canvas.create_node(sms("d", 0.0, 600.0)).await.success);
    let second = h.canvas.save_canvas(None).await.data.expect("saved");

    assert_eq!(first, second);
    assert_eq!(h.storage.len(), 1);
    let list = h.canvas.get_canvas_list().await.data.expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "Welcome flow");
    assert_eq!(list[0].create_time, 1_000);
    assert_eq!(list[0].update_time, 6_000);
    assert!(list[0].size > 0);
}

/// Verifies loading replaces the canvas with the stored graph.
#[tokio::test]
async fn load_restores_saved_graph() {
    let h = harness().await;
    chain(&h.canvas).await;
    let id = h.canvas.save_canvas(None).await.data.expect("saved");
    let saved = h.canvas.store().graph();

    assert!(h.canvas.delete_node(&NodeId::from("b"), true).await.success);
    assert_eq!(node_count(&h.canvas).await, 2);

    let state = h.canvas.load_canvas(&id).await.data.expect("loaded");
    assert_eq!(state.nodes.len(), 3);
    assert_eq!(h.canvas.store().graph(), saved);
    assert_eq!(h.canvas.has_unsaved_changes().await.data, Some(false));
    assert_eq!(h.events.count("load:end"), 1);
}

/// Verifies unknown ids report `CANVAS_NOT_FOUND` and leave the canvas alone.
#[tokio::test]
async fn unknown_records_are_not_found() {
    let h = harness().await;
    chain(&h.canvas).await;

    let load = h.canvas.load_canvas("canvas_missing").await;
    assert_eq!(load.error_code(), Some(codes::CANVAS_NOT_FOUND));
    assert_eq!(h.events.count("load:error"), 1);
    assert_eq!(node_count(&h.canvas).await, 3);

    let delete = h.canvas.delete_canvas("canvas_missing").await;
    assert_eq!(delete.error_code(), Some(codes::CANVAS_NOT_FOUND));
}

/// Verifies deleting the current record makes the next save create a new one.
#[tokio::test]
async fn deleting_current_record_detaches_canvas() {
    let h = harness().await;
    chain(&h.canvas).await;
    let first = h.canvas.save_canvas(None).await.data.expect("saved");

    assert_eq!(h.canvas.delete_canvas(&first).await.data, Some(true));
    assert!(h.storage.is_empty());

    let second = h.canvas.save_canvas(None).await.data.expect("saved");
    assert_ne!(first, second);
    assert_eq!(h.storage.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Auto-save
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies auto-save waits for the interval and for unsaved changes.
#[tokio::test]
async fn auto_save_respects_interval() {
    let h = harness().await;
    assert!(h.canvas.set_auto_save_interval(1_000).await.success);
    assert!(h.canvas.enable_auto_save().await.success);
    chain(&h.canvas).await;

    assert_eq!(h.canvas.auto_save_canvas().await.data, Some(false));

    h.clock.advance(1_000);
    assert_eq!(h.canvas.auto_save_canvas().await.data, Some(true));
    assert_eq!(h.events.count("auto-save"), 1);
    assert_eq!(h.storage.len(), 1);

    h.clock.advance(1_000);
    assert_eq!(h.canvas.auto_save_canvas().await.data, Some(false), "nothing changed");
}

/// Verifies auto-save is off unless configured or enabled.
#[tokio::test]
async fn auto_save_follows_configuration() {
    let off = harness().await;
    chain(&off.canvas).await;
    off.clock.advance(60_000);
    assert_eq!(off.canvas.auto_save_canvas().await.data, Some(false));

    let config = CanvasConfig::default().with_storage(StorageConfig {
        auto_save: true,
        auto_save_interval_ms: 10,
    });
    let on = harness_with(config).await;
    chain(&on.canvas).await;
    on.clock.advance(10);
    assert_eq!(on.canvas.auto_save_canvas().await.data, Some(true));

    assert!(on.canvas.disable_auto_save().await.success);
    assert!(on.canvas.create_node(sms("d", 0.0, 600.0)).await.success);
    on.clock.advance(10);
    assert_eq!(on.canvas.auto_save_canvas().await.data, Some(false));
}

/// Verifies a zero interval is rejected.
#[tokio::test]
async fn zero_interval_is_invalid() {
    let h = harness().await;
    let result = h.canvas.set_auto_save_interval(0).await;
    assert_eq!(result.error_code(), Some(codes::INVALID_ARGUMENT));
    assert_eq!(h.canvas.storage().auto_save_interval(), 30_000);
}
