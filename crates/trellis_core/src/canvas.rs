//! Canvas-level state: viewport, selection, snapshots and the history view.

use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::config::ZoomConfig;
use crate::connection::Connection;
use crate::geometry::{Position, Rectangle};
use crate::graph::Graph;
use crate::id::{ConnectionId, NodeId, SnapshotId};
use crate::node::Node;

// ─────────────────────────────────────────────────────────────────────────────
// Viewport
// ─────────────────────────────────────────────────────────────────────────────

/// The visible window onto the canvas.
///
/// `(x, y)` is the screen-space translation applied after scaling, so a
/// canvas point `p` is drawn at `p * zoom + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Horizontal translation in screen pixels.
    pub x: f64,
    /// Vertical translation in screen pixels.
    pub y: f64,
    /// Scale factor.
    pub zoom: f64,
    /// Screen width in pixels.
    pub width: f64,
    /// Screen height in pixels.
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            width: 1280.0,
            height: 720.0,
        }
    }
}

impl Viewport {
    /// Returns a copy with `zoom` clamped to the configured range.
    #[must_use]
    pub fn clamped(mut self, zoom: &ZoomConfig) -> Self {
        self.zoom = zoom.clamp(self.zoom);
        self
    }

    /// Converts a screen point to canvas coordinates.
    #[must_use]
    pub fn screen_to_canvas(&self, point: Position) -> Position {
        Position::new((point.x - self.x) / self.zoom, (point.y - self.y) / self.zoom)
    }

    /// Converts a canvas point to screen coordinates.
    #[must_use]
    pub fn canvas_to_screen(&self, point: Position) -> Position {
        Position::new(point.x * self.zoom + self.x, point.y * self.zoom + self.y)
    }

    /// The canvas-space rectangle currently visible.
    #[must_use]
    pub fn visible_area(&self) -> Rectangle {
        let origin = self.screen_to_canvas(Position::new(0.0, 0.0));
        Rectangle::new(
            origin.x,
            origin.y,
            self.width / self.zoom,
            self.height / self.zoom,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

/// How the current selection was made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// One entity.
    #[default]
    Single,
    /// Several entities.
    Multiple,
    /// Rubber-band selection.
    Area,
}

/// The set of selected nodes and connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Selected node ids, in selection order.
    #[serde(default)]
    pub nodes: IndexSet<NodeId>,
    /// Selected connection ids, in selection order.
    #[serde(default)]
    pub connections: IndexSet<ConnectionId>,
    /// Rectangle of the last area selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Rectangle>,
    /// Selection mode.
    #[serde(default)]
    pub mode: SelectionMode,
}

impl Selection {
    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    /// Drops ids that no longer exist in `graph`. Returns true if anything changed.
    pub fn retain_existing(&mut self, graph: &Graph) -> bool {
        let before = (self.nodes.len(), self.connections.len());
        self.nodes.retain(|id| graph.nodes.contains_key(id));
        self.connections
            .retain(|id| graph.connections.contains_key(id));
        before != (self.nodes.len(), self.connections.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Canvas mode & state
// ─────────────────────────────────────────────────────────────────────────────

/// Interaction mode of a canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasMode {
    /// Normal editing.
    #[default]
    Edit,
    /// Read-only; mutations are rejected.
    View,
    /// Editing with diagnostics.
    Debug,
    /// Statistics overlay.
    Statistics,
}

impl CanvasMode {
    /// Returns true if mutations are allowed.
    #[must_use]
    pub fn is_editable(self) -> bool {
        !matches!(self, CanvasMode::View)
    }
}

/// Serializable view of a whole canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    /// Nodes in insertion order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Connections in insertion order.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Viewport.
    #[serde(default)]
    pub viewport: Viewport,
    /// Selection.
    #[serde(default)]
    pub selection: Selection,
    /// Mode.
    #[serde(default)]
    pub mode: CanvasMode,
}

impl CanvasState {
    /// Builds a state from a graph plus view state.
    #[must_use]
    pub fn from_graph(graph: &Graph, viewport: Viewport, selection: Selection, mode: CanvasMode) -> Self {
        Self {
            nodes: graph.nodes.values().cloned().collect(),
            connections: graph.connections.values().cloned().collect(),
            viewport,
            selection,
            mode,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    /// Requested explicitly by a caller.
    Manual,
    /// Recorded automatically on commit.
    #[default]
    Auto,
    /// Recorded at a notable point, such as before an import.
    Checkpoint,
}

/// An immutable copy of the canvas contents.
///
/// Snapshots own their data outright; later store mutations never reach them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSnapshot {
    /// Identifier.
    pub id: SnapshotId,
    /// Capture time in epoch milliseconds.
    pub timestamp: u64,
    /// Nodes and connections.
    #[serde(flatten)]
    pub graph: Graph,
    /// Viewport at capture time.
    pub viewport: Viewport,
    /// Optional caller-supplied description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Why the snapshot was taken.
    #[serde(rename = "type", default)]
    pub kind: SnapshotType,
}

impl CanvasSnapshot {
    /// Captures a snapshot with a fresh id.
    #[must_use]
    pub fn capture(graph: Graph, viewport: Viewport, timestamp: u64, kind: SnapshotType) -> Self {
        Self {
            id: SnapshotId::generate(),
            timestamp,
            graph,
            viewport,
            description: None,
            kind,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A copy of this snapshot under a new id.
    #[must_use]
    pub fn recaptured(&self, timestamp: u64) -> Self {
        Self {
            id: SnapshotId::generate(),
            timestamp,
            ..self.clone()
        }
    }
}

/// Read-only view of the undo/redo stacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    /// Older states, oldest first.
    pub past: Vec<Arc<CanvasSnapshot>>,
    /// The state the store currently holds.
    pub present: Arc<CanvasSnapshot>,
    /// Undone states, next redo first.
    pub future: Vec<Arc<CanvasSnapshot>>,
    /// Bound on `past + 1 + future`.
    pub max_size: usize,
    /// Whether `undo` would do anything.
    pub can_undo: bool,
    /// Whether `redo` would do anything.
    pub can_redo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn viewport_coordinate_conversion_round_trips() {
        let viewport = Viewport {
            x: 100.0,
            y: 50.0,
            zoom: 2.0,
            ..Viewport::default()
        };
        let canvas = Position::new(10.0, 20.0);
        let screen = viewport.canvas_to_screen(canvas);
        assert_eq!(screen, Position::new(120.0, 90.0));
        assert_eq!(viewport.screen_to_canvas(screen), canvas);
    }

    #[test]
    fn selection_retain_existing_reports_changes() {
        let graph = Graph::from_parts([Node::new("A", NodeKind::Sms, 0.0, 0.0)], []);
        let mut selection = Selection::default();
        selection.nodes.insert(NodeId::from("A"));
        assert!(!selection.retain_existing(&graph));
        selection.nodes.insert(NodeId::from("gone"));
        assert!(selection.retain_existing(&graph));
        assert_eq!(selection.nodes.len(), 1);
    }

    #[test]
    fn snapshot_serializes_flat_with_type_tag() {
        let graph = Graph::from_parts([Node::new("A", NodeKind::Sms, 0.0, 0.0)], []);
        let snapshot = CanvasSnapshot::capture(graph, Viewport::default(), 7, SnapshotType::Manual);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["type"], "manual");
        assert_eq!(value["nodes"][0]["id"], "A");
        let back: CanvasSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn view_mode_is_not_editable() {
        assert!(CanvasMode::Edit.is_editable());
        assert!(!CanvasMode::View.is_editable());
    }
}
