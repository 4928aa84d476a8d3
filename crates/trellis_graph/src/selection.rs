//! Single, multiple and area selection over a [`GraphStore`].
//!
//! Selection lives in the store so that deletions can prune it in the same
//! commit. The manager only decides *what* to select; unknown ids are
//! skipped and reported back in [`SelectionOutcome`].

use std::sync::Arc;

use trellis_core::canvas::{Selection, SelectionMode};
use trellis_core::geometry::Rectangle;
use trellis_core::{Connection, ConnectionId, Node, NodeId};
use trellis_events::event::SelectionEventData;
use trellis_events::{CanvasEvent, CanvasEventType, EventPayload};

use crate::store::GraphStore;

/// What a selection call actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    /// Node ids that are now selected because of this call.
    pub applied_nodes: Vec<NodeId>,
    /// Connection ids that are now selected because of this call.
    pub applied_connections: Vec<ConnectionId>,
    /// Requested node ids that do not exist.
    pub ignored_nodes: Vec<NodeId>,
    /// Requested connection ids that do not exist.
    pub ignored_connections: Vec<ConnectionId>,
}

impl SelectionOutcome {
    /// Returns true if every requested id was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.ignored_nodes.is_empty() && self.ignored_connections.is_empty()
    }
}

/// Selection operations for one store.
#[derive(Debug, Clone)]
pub struct SelectionManager {
    store: Arc<GraphStore>,
}

impl SelectionManager {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Selects nodes. With `multiple` the ids are added to the current
    /// selection; otherwise they replace it.
    pub async fn select_nodes(&self, ids: &[NodeId], multiple: bool) -> SelectionOutcome {
        self.store
            .change_selection(|graph, selection| {
                if !multiple {
                    *selection = Selection::default();
                }
                let mut outcome = SelectionOutcome::default();
                for id in ids {
                    if graph.node(id).is_some() {
                        selection.nodes.insert(id.clone());
                        outcome.applied_nodes.push(id.clone());
                    } else {
                        outcome.ignored_nodes.push(id.clone());
                    }
                }
                selection.area = None;
                selection.mode = mode_for(ids.len(), multiple);
                outcome
            })
            .await
    }

    /// Selects connections. See [`select_nodes`](Self::select_nodes).
    pub async fn select_connections(&self, ids: &[ConnectionId], multiple: bool) -> SelectionOutcome {
        self.store
            .change_selection(|graph, selection| {
                if !multiple {
                    *selection = Selection::default();
                }
                let mut outcome = SelectionOutcome::default();
                for id in ids {
                    if graph.connection(id).is_some() {
                        selection.connections.insert(id.clone());
                        outcome.applied_connections.push(id.clone());
                    } else {
                        outcome.ignored_connections.push(id.clone());
                    }
                }
                selection.area = None;
                selection.mode = mode_for(ids.len(), multiple);
                outcome
            })
            .await
    }

    /// Selects every node and connection.
    pub async fn select_all(&self) -> SelectionOutcome {
        self.store
            .change_selection(|graph, selection| {
                *selection = Selection {
                    nodes: graph.nodes.keys().cloned().collect(),
                    connections: graph.connections.keys().cloned().collect(),
                    area: None,
                    mode: SelectionMode::Multiple,
                };
                SelectionOutcome {
                    applied_nodes: selection.nodes.iter().cloned().collect(),
                    applied_connections: selection.connections.iter().cloned().collect(),
                    ..SelectionOutcome::default()
                }
            })
            .await
    }

    /// Empties the selection. Returns true if anything was selected before.
    ///
    /// Calling it again is a no-op that emits nothing.
    pub async fn clear_selection(&self) -> bool {
        self.store
            .change_selection(|_, selection| {
                let had_selection = !selection.is_empty() || selection.area.is_some();
                *selection = Selection::default();
                had_selection
            })
            .await
    }

    /// Selects exactly the entities that are currently not selected.
    pub async fn invert_selection(&self) -> SelectionOutcome {
        self.store
            .change_selection(|graph, selection| {
                let nodes = graph
                    .nodes
                    .keys()
                    .filter(|id| !selection.nodes.contains(*id))
                    .cloned()
                    .collect();
                let connections = graph
                    .connections
                    .keys()
                    .filter(|id| !selection.connections.contains(*id))
                    .cloned()
                    .collect();
                *selection = Selection {
                    nodes,
                    connections,
                    area: None,
                    mode: SelectionMode::Multiple,
                };
                SelectionOutcome {
                    applied_nodes: selection.nodes.iter().cloned().collect(),
                    applied_connections: selection.connections.iter().cloned().collect(),
                    ..SelectionOutcome::default()
                }
            })
            .await
    }

    /// Selects every node whose bounding box lies fully inside `area`, plus
    /// the connections between two such nodes.
    pub async fn select_by_area(&self, area: Rectangle, multiple: bool) -> SelectionOutcome {
        self.store
            .change_selection(|graph, selection| {
                if !multiple {
                    *selection = Selection::default();
                }
                let mut outcome = SelectionOutcome::default();
                for node in graph.nodes.values() {
                    if area.contains_rect(&node.bounds()) {
                        selection.nodes.insert(node.id.clone());
                        outcome.applied_nodes.push(node.id.clone());
                    }
                }
                for connection in graph.connections.values() {
                    if selection.nodes.contains(&connection.source)
                        && selection.nodes.contains(&connection.target)
                    {
                        selection.connections.insert(connection.id.clone());
                        outcome.applied_connections.push(connection.id.clone());
                    }
                }
                selection.area = Some(area);
                selection.mode = SelectionMode::Area;
                outcome
            })
            .await
    }

    /// The current selection.
    #[must_use]
    pub fn selection(&self) -> Selection {
        self.store.selection()
    }

    /// Selected nodes, in selection order.
    #[must_use]
    pub fn selected_nodes(&self) -> Vec<Node> {
        let ids: Vec<NodeId> = self.store.selection().nodes.into_iter().collect();
        self.store.get_nodes(&ids)
    }

    /// Selected connections, in selection order.
    #[must_use]
    pub fn selected_connections(&self) -> Vec<Connection> {
        let ids: Vec<ConnectionId> = self.store.selection().connections.into_iter().collect();
        self.store.get_connections(&ids)
    }

    /// Returns true if the node is selected.
    #[must_use]
    pub fn is_node_selected(&self, id: &NodeId) -> bool {
        self.store.selection().nodes.contains(id)
    }

    /// Returns true if the connection is selected.
    #[must_use]
    pub fn is_connection_selected(&self, id: &ConnectionId) -> bool {
        self.store.selection().connections.contains(id)
    }
}

fn mode_for(count: usize, multiple: bool) -> SelectionMode {
    if multiple || count > 1 {
        SelectionMode::Multiple
    } else {
        SelectionMode::Single
    }
}

/// Events describing the step from `previous` to `next`, in emission order:
/// deselections, selections, `selection:changed`, then `selection:cleared`
/// when the selection became empty.
pub(crate) fn selection_events(previous: &Selection, next: &Selection) -> Vec<CanvasEvent> {
    if previous.nodes == next.nodes
        && previous.connections == next.connections
        && previous.area == next.area
    {
        return Vec::new();
    }
    let data = SelectionEventData {
        selected_nodes: next.nodes.iter().cloned().collect(),
        selected_connections: next.connections.iter().cloned().collect(),
        previous_nodes: previous.nodes.iter().cloned().collect(),
        previous_connections: previous.connections.iter().cloned().collect(),
        area: next.area,
    };

    let mut kinds = Vec::new();
    if previous.nodes.iter().any(|id| !next.nodes.contains(id)) {
        kinds.push(CanvasEventType::NodeDeselected);
    }
    if previous.connections.iter().any(|id| !next.connections.contains(id)) {
        kinds.push(CanvasEventType::ConnectionDeselected);
    }
    if next.nodes.iter().any(|id| !previous.nodes.contains(id)) {
        kinds.push(CanvasEventType::NodeSelected);
    }
    if next.connections.iter().any(|id| !previous.connections.contains(id)) {
        kinds.push(CanvasEventType::ConnectionSelected);
    }
    kinds.push(CanvasEventType::SelectionChanged);
    if next.is_empty() && !previous.is_empty() {
        kinds.push(CanvasEventType::SelectionCleared);
    }
    kinds
        .into_iter()
        .map(|kind| {
            CanvasEvent::new(kind, EventPayload::Selection(data.clone())).from_source("selection")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(events: &[CanvasEvent]) -> Vec<&str> {
        events.iter().map(|e| e.name().as_str()).collect()
    }

    #[test]
    fn unchanged_selection_emits_nothing() {
        let selection = Selection::default();
        assert!(selection_events(&selection, &selection.clone()).is_empty());
    }

    #[test]
    fn replacing_a_node_deselects_then_selects() {
        let mut previous = Selection::default();
        previous.nodes.insert(NodeId::from("a"));
        let mut next = Selection::default();
        next.nodes.insert(NodeId::from("b"));
        assert_eq!(
            names(&selection_events(&previous, &next)),
            vec!["node:deselected", "node:selected", "selection:changed"]
        );
    }

    #[test]
    fn emptying_the_selection_reports_cleared() {
        let mut previous = Selection::default();
        previous.connections.insert(ConnectionId::from("c"));
        assert_eq!(
            names(&selection_events(&previous, &Selection::default())),
            vec!["connection:deselected", "selection:changed", "selection:cleared"]
        );
    }

    #[test]
    fn mode_follows_call_shape() {
        assert_eq!(mode_for(1, false), SelectionMode::Single);
        assert_eq!(mode_for(2, false), SelectionMode::Multiple);
        assert_eq!(mode_for(1, true), SelectionMode::Multiple);
    }
}
