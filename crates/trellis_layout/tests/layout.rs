//! Integration tests for applying layouts through the graph store.

mod test_utils;

use test_utils::{Recorder, split_flow, store};
use trellis_core::canvas::CanvasMode;
use trellis_core::config::LayoutAlgorithm;
use trellis_core::node::NodeDraft;
use trellis_core::{ErrorCode, NodeId, NodeKind, codes};
use trellis_graph::HistoryManager;
use trellis_layout::algorithm::depths;
use trellis_layout::prelude::*;

/// Verifies the split flow is layered 0, 1, 2, 2 with separated leaves.
#[tokio::test]
async fn hierarchical_layout_layers_a_split_flow() {
    let store = store();
    split_flow(&store).await;
    let engine = LayoutEngine::new(store.clone());

    let report = engine.hierarchical_layout(None).await.expect("layout applies");

    let depths: Vec<usize> = store.with_graph(depths).into_values().collect();
    assert_eq!(depths, vec![0, 1, 2, 2]);
    let leaf1 = store.get_node(&"leaf1".into()).expect("leaf1");
    let leaf2 = store.get_node(&"leaf2".into()).expect("leaf2");
    let spacing = store.config().layout.spacing.node;
    assert_eq!(leaf1.y, leaf2.y);
    assert!((leaf1.x - leaf2.x).abs() >= spacing);
    assert!(!report.moved.is_empty());
}

/// Verifies a layout run is bracketed by layout events around one commit.
#[tokio::test]
async fn layout_emits_start_commit_end() {
    let store = store();
    split_flow(&store).await;
    let engine = LayoutEngine::new(store.clone());
    let recorder = Recorder::attach(store.bus());

    engine.grid_layout(None).await.expect("layout applies");

    let names = recorder.names();
    assert_eq!(names.first().map(String::as_str), Some("layout:start"));
    assert_eq!(names.last().map(String::as_str), Some("layout:end"));
    assert_eq!(names.iter().filter(|n| *n == "canvas:state-changed").count(), 1);
    assert!(names.contains(&"layout:changed".to_owned()));
}

/// Verifies a layout is one undoable history entry.
#[tokio::test]
async fn layout_is_undoable() {
    let store = store();
    split_flow(&store).await;
    let history = HistoryManager::new(store.clone());
    let before = store.graph();
    let engine = LayoutEngine::new(store.clone());

    engine.circular_layout(None).await.expect("layout applies");
    assert_ne!(store.graph(), before);

    history.undo().await.expect("undo layout");
    assert_eq!(store.graph(), before);
}

/// Verifies re-running a layout on its own output moves nothing.
#[tokio::test]
async fn repeated_layout_is_a_no_op() {
    let store = store();
    split_flow(&store).await;
    let engine = LayoutEngine::new(store.clone());
    engine.hierarchical_layout(None).await.expect("first run");
    let revision = store.revision();

    let report = engine.hierarchical_layout(None).await.expect("second run");

    assert!(report.moved.is_empty());
    assert_eq!(store.revision(), revision);
}

/// Verifies arrangement never touches nodes outside the subset.
#[tokio::test]
async fn align_only_moves_the_subset() {
    let store = store();
    for (id, x, y) in [("a", 40.0, 0.0), ("b", 200.0, 150.0), ("c", 900.0, 900.0)] {
        store
            .create_node(NodeDraft::new(NodeKind::Sms).with_id(id).at(x, y))
            .await
            .expect("create");
    }
    let engine = LayoutEngine::new(store.clone());

    engine
        .align_nodes(&["a".into(), "b".into()], Alignment::Left)
        .await
        .expect("align applies");

    assert_eq!(store.get_node(&"b".into()).expect("b").x, 40.0);
    let c = store.get_node(&"c".into()).expect("c");
    assert_eq!((c.x, c.y), (900.0, 900.0));
}

/// Verifies unknown ids reject the whole arrangement before any event.
#[tokio::test]
async fn unknown_ids_are_rejected_up_front() {
    let store = store();
    split_flow(&store).await;
    let engine = LayoutEngine::new(store.clone());
    let recorder = Recorder::attach(store.bus());

    let err = engine
        .distribute_nodes(&["leaf1".into(), NodeId::from("ghost")], Distribution::Vertical)
        .await
        .expect_err("ghost is unknown");

    assert_eq!(err.code(), codes::NODE_NOT_FOUND);
    assert!(recorder.names().is_empty());
}

/// Verifies a read-only canvas reports the store's refusal.
#[tokio::test]
async fn view_mode_rejects_layout() {
    let store = store();
    split_flow(&store).await;
    store.set_mode(CanvasMode::View).await;
    let engine = LayoutEngine::new(store.clone());

    let err = engine.force_layout(None).await.expect_err("read-only");
    assert_eq!(err.code(), codes::READ_ONLY);
}

/// Verifies invalid options are rejected as invalid arguments.
#[tokio::test]
async fn negative_spacing_option_is_rejected() {
    let store = store();
    split_flow(&store).await;
    let engine = LayoutEngine::new(store);
    let options = LayoutOptions::from_value(serde_json::json!({
        "spacing": { "node": -5.0, "level": 100.0, "branch": 30.0 }
    }))
    .expect("options parse");

    let err = engine.auto_layout(None, Some(&options)).await.expect_err("negative spacing");
    assert_eq!(err.code(), codes::INVALID_ARGUMENT);
}

/// Verifies suggestions put hierarchical first for a start-rooted flow.
#[tokio::test]
async fn suggestions_favour_hierarchical_for_flows() {
    let store = store();
    split_flow(&store).await;
    let engine = LayoutEngine::new(store);
    assert_eq!(engine.suggestions().first(), Some(&LayoutAlgorithm::Hierarchical));
}
