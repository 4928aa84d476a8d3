//! The service boundary: lifecycle, results and event plumbing.

mod test_utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use test_utils::{chain, harness, link, node_count, sms, start, uninitialized};
use trellis_core::canvas::CanvasMode;
use trellis_core::codes;
use trellis_core::config::CanvasConfig;
use trellis_core::geometry::{Position, Rectangle};
use trellis_core::id::{ConnectionId, NodeId};
use trellis_events::CanvasEvent;
use trellis_services::prelude::*;
use trellis_validation::workflow::START_COUNT;

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies every call is refused until the canvas is initialized.
#[tokio::test]
async fn calls_wait_for_initialize() {
    let h = uninitialized(CanvasConfig::default());
    assert!(!h.canvas.is_ready());
    assert_eq!(h.canvas.get_all_nodes().await.error_code(), Some(codes::NOT_READY));
    assert_eq!(h.canvas.undo().await.error_code(), Some(codes::NOT_READY));

    assert!(h.canvas.initialize().await.success);
    assert!(h.canvas.is_ready());
    assert_eq!(h.canvas.get_all_nodes().await.data.map(|nodes| nodes.len()), Some(0));
}

/// Verifies initialize announces itself once and is idempotent.
#[tokio::test]
async fn initialize_emits_lifecycle_events_once() {
    let h = uninitialized(CanvasConfig::default());
    assert!(h.canvas.initialize().await.success);
    assert!(h.canvas.initialize().await.success);

    assert_eq!(h.events.names(), vec!["canvas:initialized", "canvas:ready"]);
}

/// Verifies destroy is terminal.
#[tokio::test]
async fn destroyed_canvas_refuses_calls() {
    let h = harness().await;
    chain(&h.canvas).await;

    assert!(h.canvas.destroy().await.success);
    assert!(h.canvas.destroy().await.success);
    assert_eq!(h.events.count("canvas:destroyed"), 1);
    assert!(!h.canvas.is_ready());

    assert_eq!(h.canvas.get_all_nodes().await.error_code(), Some(codes::NOT_READY));
    assert_eq!(h.canvas.initialize().await.error_code(), Some(codes::NOT_READY));
}

// ═══════════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies failures carry the store's error codes.
#[tokio::test]
async fn failures_carry_error_codes() {
    let h = harness().await;

    let missing = h.canvas.get_node(&NodeId::from("ghost")).await;
    assert!(!missing.success);
    assert_eq!(missing.error_code(), Some(codes::NODE_NOT_FOUND));

    let undo = h.canvas.undo().await;
    assert_eq!(undo.error_code(), Some(codes::HISTORY_EMPTY));

    assert!(h.canvas.create_node(sms("a", 0.0, 0.0)).await.success);
    let duplicate = h.canvas.create_node(sms("a", 0.0, 0.0)).await;
    assert_eq!(duplicate.error_code(), Some(codes::DUPLICATE_NODE_ID));

    let connection = h.canvas.get_connection(&ConnectionId::from("ghost")).await;
    assert_eq!(connection.error_code(), Some(codes::CONNECTION_NOT_FOUND));
}

/// Verifies view mode rejects edits until editing is restored.
#[tokio::test]
async fn view_mode_is_read_only() {
    let h = harness().await;
    assert_eq!(h.canvas.set_mode(CanvasMode::View).await.data, Some(CanvasMode::View));

    let created = h.canvas.create_node(sms("a", 0.0, 0.0)).await;
    assert_eq!(created.error_code(), Some(codes::READ_ONLY));

    assert!(h.canvas.set_mode(CanvasMode::Edit).await.success);
    assert!(h.canvas.create_node(sms("a", 0.0, 0.0)).await.success);
    assert_eq!(h.events.count("canvas:mode-changed"), 2);
}

/// Verifies batch deletes report each item and apply the rest.
#[tokio::test]
async fn batch_delete_reports_each_item() {
    let h = harness().await;
    chain(&h.canvas).await;

    let batch = h
        .canvas
        .delete_nodes(&[NodeId::from("a"), NodeId::from("ghost")], false)
        .await;

    assert!(!batch.success);
    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.error_count, 1);
    assert_eq!(batch.errors[0].code, codes::NODE_NOT_FOUND);
    assert_eq!(batch.results[0].data, Some(true));
    assert_eq!(node_count(&h.canvas).await, 2);
}

/// Verifies draft validation is a dry run.
#[tokio::test]
async fn draft_validation_does_not_commit() {
    let h = harness().await;
    assert!(h.canvas.create_node(sms("a", 0.0, 0.0)).await.success);
    let revision = h.canvas.store().revision();

    let fresh = h.canvas.validate_node_draft(&sms("b", 0.0, 150.0)).await.data.expect("result");
    assert!(fresh.valid);

    let taken = h.canvas.validate_node_draft(&sms("a", 0.0, 150.0)).await.data.expect("result");
    assert!(!taken.valid);
    assert_eq!(taken.errors[0].code, codes::DUPLICATE_NODE_ID);

    let dangling = h
        .canvas
        .validate_connection_draft(&link("x", "a", "ghost"))
        .await
        .data
        .expect("result");
    assert!(!dangling.valid);

    assert_eq!(h.canvas.store().revision(), revision);
    assert_eq!(node_count(&h.canvas).await, 1);
}

/// Verifies clones land at an absolute position with a fresh id.
#[tokio::test]
async fn clone_places_copy_at_position() {
    let h = harness().await;
    chain(&h.canvas).await;

    let copy = h
        .canvas
        .clone_node(&NodeId::from("a"), Some(Position::new(300.0, 40.0)))
        .await
        .data
        .expect("cloned");

    assert_ne!(copy.id, NodeId::from("a"));
    assert_eq!((copy.x, copy.y), (300.0, 40.0));
    assert_eq!(node_count(&h.canvas).await, 4);
}

/// Verifies viewport calls reject non-finite or non-positive input.
#[tokio::test]
async fn viewport_arguments_are_checked() {
    let h = harness().await;
    let zero = h.canvas.zoom_canvas(0.0, None).await;
    assert_eq!(zero.error_code(), Some(codes::INVALID_ARGUMENT));

    let pan = h.canvas.pan_canvas(Position::new(f64::NAN, 0.0)).await;
    assert_eq!(pan.error_code(), Some(codes::INVALID_ARGUMENT));

    let zoomed = h.canvas.zoom_canvas(2.0, None).await.data.expect("zoomed");
    assert_eq!(zoomed.zoom, 2.0);
    assert_eq!(h.canvas.get_canvas_bounds().await.data, Some(Rectangle::default()));
}

// ═══════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies workflow validation flags a flow without a start node.
#[tokio::test]
async fn workflow_validation_needs_a_start() {
    let h = harness().await;
    chain(&h.canvas).await;

    let result = h.canvas.validate_workflow().await.data.expect("result");
    assert!(!result.valid);
    assert!(result.errors.iter().any(|issue| issue.rule == START_COUNT));
    assert_eq!(h.events.count("validation:error"), 1);

    assert!(h.canvas.create_node(start("s")).await.success);
    assert!(h.canvas.create_connection(link("sa", "s", "a")).await.success);
    let result = h.canvas.validate_workflow().await.data.expect("result");
    assert!(!result.errors.iter().any(|issue| issue.rule == START_COUNT));
}

/// Verifies unknown targets fail instead of validating nothing.
#[tokio::test]
async fn validating_unknown_entities_fails() {
    let h = harness().await;
    let node = h.canvas.validate_node(&NodeId::from("ghost")).await;
    assert_eq!(node.error_code(), Some(codes::NODE_NOT_FOUND));
    let connection = h.canvas.validate_connection(&ConnectionId::from("ghost")).await;
    assert_eq!(connection.error_code(), Some(codes::CONNECTION_NOT_FOUND));
}

/// Verifies built-in rules cannot be removed.
#[tokio::test]
async fn built_in_rules_are_protected() {
    let h = harness().await;
    let rules = h.canvas.get_validation_rules().await.data.expect("rules");
    assert!(rules.iter().any(|rule| rule.id == START_COUNT && rule.built_in));

    let removed = h.canvas.remove_validation_rule(START_COUNT).await;
    assert_eq!(removed.error_code(), Some(codes::BUILT_IN_RULE));
    let unknown = h.canvas.disable_validation_rule("nope").await;
    assert_eq!(unknown.error_code(), Some(codes::RULE_NOT_FOUND));
}

// ═══════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies published events reach subscribers until they unsubscribe.
#[tokio::test]
async fn publish_reaches_subscribers() {
    let h = harness().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let handler: EventHandler = Arc::new(move |_: &CanvasEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let id = h.canvas.subscribe("campaign:ping", handler).await.data.expect("subscribed");

    assert_eq!(h.canvas.publish("campaign:ping", json!({ "n": 1 })).await.data, Some(true));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert_eq!(h.canvas.unsubscribe(&id).await.data, Some(true));
    assert!(h.canvas.publish("campaign:ping", json!({ "n": 2 })).await.success);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let blank = h.canvas.publish("  ", json!(null)).await;
    assert_eq!(blank.error_code(), Some(codes::INVALID_ARGUMENT));
}

/// Verifies event history is kept only while logging is enabled.
#[tokio::test]
async fn event_history_follows_logging() {
    let h = harness().await;
    assert!(h.canvas.publish("campaign:ping", json!(1)).await.success);
    let history = h.canvas.get_event_history(None, None).await.data.expect("history");
    assert!(history.is_empty());

    assert!(h.canvas.enable_event_logging().await.success);
    assert!(h.canvas.publish("campaign:ping", json!(2)).await.success);
    assert!(h.canvas.create_node(sms("a", 0.0, 0.0)).await.success);

    let pings = h
        .canvas
        .get_event_history(Some("campaign:ping"), None)
        .await
        .data
        .expect("history");
    assert_eq!(pings.len(), 1);
    assert_eq!(pings[0].source(), Some("service"));

    assert!(h.canvas.clear_event_history().await.success);
    let cleared = h.canvas.get_event_history(None, None).await.data.expect("history");
    assert!(cleared.is_empty());
}
