//! Import and export through the canvas facade.

mod test_utils;

use serde_json::json;
use test_utils::{chain, connection_count, harness, harness_with, node_count, sms};
use trellis_core::codes;
use trellis_core::config::{CanvasConfig, ConnectionPolicy};
use trellis_core::geometry::Position;
use trellis_core::id::{ConnectionId, NodeId};
use trellis_services::prelude::*;
use trellis_validation::rule::ValidationRule;

// ═══════════════════════════════════════════════════════════════════════════
// Round trips
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies a JSON export restores the same graph and viewport elsewhere.
#[tokio::test]
async fn json_export_restores_graph_and_viewport() {
    let source = harness().await;
    chain(&source.canvas).await;
    assert!(source.canvas.pan_canvas(Position::new(40.0, -25.0)).await.success);

    let text = source
        .canvas
        .export_canvas(&ExportOptions::json().with_metadata())
        .await
        .data
        .expect("export should succeed");

    let target = harness().await;
    let imported = target.canvas.import_canvas(&text, &ImportOptions::json()).await;
    assert!(imported.success, "{:?}", imported.error);
    assert!(imported.data.expect("report").renames.is_empty());

    assert_eq!(target.canvas.store().graph(), source.canvas.store().graph());
    assert_eq!(target.canvas.store().viewport(), source.canvas.store().viewport());
    assert_eq!(target.events.count("import:start"), 1);
    assert_eq!(target.events.count("import:end"), 1);
}

/// Verifies replacing imports are undoable as a single step.
#[tokio::test]
async fn replacing_import_is_one_undo_step() {
    let source = harness().await;
    chain(&source.canvas).await;
    let text = source
        .canvas
        .export_canvas(&ExportOptions::json())
        .await
        .data
        .expect("export should succeed");

    let target = harness().await;
    assert!(target.canvas.create_node(sms("only", 0.0, 0.0)).await.success);
    assert!(target.canvas.import_canvas(&text, &ImportOptions::json()).await.success);
    assert_eq!(node_count(&target.canvas).await, 3);

    assert!(target.canvas.undo().await.success);
    let nodes = target.canvas.get_all_nodes().await.data.expect("nodes");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, NodeId::from("only"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Merging
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies a merge renames colliding ids and rewires connections to the
/// renamed nodes.
#[tokio::test]
async fn merge_renames_colliding_ids() {
    let h = harness().await;
    chain(&h.canvas).await;
    let ids = [NodeId::from("a"), NodeId::from("b")];
    let text = h
        .canvas
        .export_nodes(&ids, &ExportOptions::json())
        .await
        .data
        .expect("export should succeed");

    let report = h
        .canvas
        .import_canvas(&text, &ImportOptions::json().merged())
        .await
        .data
        .expect("merge should succeed");

    assert_eq!(report.nodes.len(), 2);
    assert_eq!(report.connections.len(), 1);
    assert_eq!(report.renames.nodes.len(), 2);
    assert_eq!(report.renames.connections.len(), 1);
    let new_a = &report.renames.nodes[&NodeId::from("a")];
    let new_b = &report.renames.nodes[&NodeId::from("b")];
    let copy = &report.connections[0];
    assert_eq!(&copy.source, new_a);
    assert_eq!(&copy.target, new_b);
    assert_ne!(copy.id, ConnectionId::from("ab"));

    assert_eq!(node_count(&h.canvas).await, 5);
    assert_eq!(connection_count(&h.canvas).await, 3);
}

/// Verifies importing nodes alone ignores the document's connections.
#[tokio::test]
async fn import_nodes_skips_connections() {
    let h = harness().await;
    chain(&h.canvas).await;
    let text = h
        .canvas
        .export_canvas(&ExportOptions::json())
        .await
        .data
        .expect("export should succeed");

    let nodes = h
        .canvas
        .import_nodes(&text, &ImportOptions::json())
        .await
        .data
        .expect("import should succeed");

    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().all(|node| !["a", "b", "c"].contains(&node.id.as_str())));
    assert_eq!(node_count(&h.canvas).await, 6);
    assert_eq!(connection_count(&h.canvas).await, 2);
}

/// Verifies imported connections must land on existing nodes.
#[tokio::test]
async fn import_connections_requires_endpoints() {
    let policy = ConnectionPolicy {
        allow_multi_edges: true,
        ..ConnectionPolicy::default()
    };
    let h = harness_with(CanvasConfig::default().with_connection_policy(policy)).await;
    chain(&h.canvas).await;
    let ids = [ConnectionId::from("ab")];
    let text = h
        .canvas
        .export_connections(&ids, &ExportOptions::json())
        .await
        .data
        .expect("export should succeed");

    let copies = h
        .canvas
        .import_connections(&text, &ImportOptions::json())
        .await
        .data
        .expect("endpoints exist");
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].source, NodeId::from("a"));
    assert_ne!(copies[0].id, ConnectionId::from("ab"));
    assert_eq!(connection_count(&h.canvas).await, 3);

    let dangling = json!({
        "version": "1.0",
        "nodes": [],
        "connections": [{ "id": "x", "source": "ghost", "target": "a" }]
    })
    .to_string();
    let failed = h.canvas.import_connections(&dangling, &ImportOptions::json()).await;
    assert!(!failed.success);
    assert_eq!(connection_count(&h.canvas).await, 3);
}

/// Verifies the default policy refuses a second connection between the same nodes.
#[tokio::test]
async fn imported_duplicate_connection_is_rejected_by_default() {
    let h = harness().await;
    chain(&h.canvas).await;
    let ids = [ConnectionId::from("ab")];
    let text = h
        .canvas
        .export_connections(&ids, &ExportOptions::json())
        .await
        .data
        .expect("export should succeed");

    let duplicate = h.canvas.import_connections(&text, &ImportOptions::json()).await;
    assert_eq!(duplicate.error_code(), Some(codes::VALIDATION_FAILED));
    assert_eq!(connection_count(&h.canvas).await, 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// Failures
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies raster and document formats are refused with an error event.
#[tokio::test]
async fn unsupported_formats_are_refused() {
    let h = harness().await;
    chain(&h.canvas).await;

    let png = h.canvas.export_canvas(&ExportOptions::new(ExportFormat::Png)).await;
    assert_eq!(png.error_code(), Some(codes::UNSUPPORTED_FORMAT));
    assert_eq!(h.events.count("export:error"), 1);

    let csv = h
        .canvas
        .import_canvas("a,b", &ImportOptions::new(ImportFormat::Csv))
        .await;
    assert_eq!(csv.error_code(), Some(codes::UNSUPPORTED_FORMAT));
    assert_eq!(h.events.count("import:error"), 1);

    let formats = h.canvas.get_supported_export_formats().await.data.expect("formats");
    assert_eq!(formats, vec![ExportFormat::Json, ExportFormat::Svg]);
}

/// Verifies malformed documents leave the canvas untouched.
#[tokio::test]
async fn malformed_document_leaves_canvas_unchanged() {
    let h = harness().await;
    chain(&h.canvas).await;
    let before = h.canvas.store().graph();
    let revision = h.canvas.store().revision();

    let result = h.canvas.import_canvas("{ not json", &ImportOptions::json()).await;

    assert_eq!(result.error_code(), Some(codes::SERIALIZATION_ERROR));
    assert_eq!(h.canvas.store().graph(), before);
    assert_eq!(h.canvas.store().revision(), revision);
}

/// Verifies validated imports honour custom rules and unvalidated ones skip
/// them.
#[tokio::test]
async fn validated_import_applies_custom_rules() {
    let h = harness().await;
    chain(&h.canvas).await;
    let text = h
        .canvas
        .export_canvas(&ExportOptions::json())
        .await
        .data
        .expect("export should succeed");
    let rule =
        ValidationRule::data("template", |data| data.contains_key("template")).named("Messages have a template");
    assert!(h.canvas.add_validation_rule(rule).await.success);

    let strict = h.canvas.import_canvas(&text, &ImportOptions::json()).await;
    assert_eq!(strict.error_code(), Some(codes::VALIDATION_FAILED));
    assert_eq!(h.events.count("import:error"), 1);

    let relaxed = h
        .canvas
        .import_canvas(&text, &ImportOptions::json().without_validation())
        .await;
    assert!(relaxed.success, "{:?}", relaxed.error);
}

/// Verifies exporting unknown ids fails before anything is emitted.
#[tokio::test]
async fn export_of_unknown_ids_fails() {
    let h = harness().await;
    chain(&h.canvas).await;

    let nodes = h
        .canvas
        .export_nodes(&[NodeId::from("ghost")], &ExportOptions::json())
        .await;
    assert_eq!(nodes.error_code(), Some(codes::NODE_NOT_FOUND));

    let connections = h
        .canvas
        .export_connections(&[ConnectionId::from("ghost")], &ExportOptions::json())
        .await;
    assert_eq!(connections.error_code(), Some(codes::CONNECTION_NOT_FOUND));
    assert_eq!(h.events.count("export:start"), 0);
}

/// Verifies a transform hook rewrites the document before it is parsed.
#[tokio::test]
async fn transform_runs_before_parsing() {
    let h = harness().await;
    let text = json!({
        "version": "1.0",
        "nodes": [{ "id": "a", "type": "sms", "x": 0.0, "y": 0.0 }],
        "connections": []
    })
    .to_string();
    let options = ImportOptions::json().with_transform(|mut document| {
        document["nodes"][0]["label"] = json!("Welcome");
        document
    });

    assert!(h.canvas.import_canvas(&text, &options).await.success);
    let node = h.canvas.get_node(&NodeId::from("a")).await.data.expect("imported");
    assert_eq!(node.label.as_deref(), Some("Welcome"));
}

// ═══════════════════════════════════════════════════════════════════════════
// SVG
// ═══════════════════════════════════════════════════════════════════════════

/// Verifies the SVG draws one rect per node and one line per connection.
#[tokio::test]
async fn svg_draws_every_entity() {
    let h = harness().await;
    chain(&h.canvas).await;

    let svg = h
        .canvas
        .export_canvas(&ExportOptions::svg().with_background("#ffffff"))
        .await
        .data
        .expect("svg export");

    assert!(svg.starts_with("<svg"));
    assert_eq!(svg.matches("<rect data-id").count(), 3);
    assert_eq!(svg.matches("<line").count(), 2);
    assert!(svg.contains("#ffffff"));
    assert_eq!(h.events.count("export:end"), 1);
}
