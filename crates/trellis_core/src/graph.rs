//! The node/connection container shared by the store, snapshots and layouts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::Connection;
use crate::geometry::Rectangle;
use crate::id::{ConnectionId, NodeId, PortId};
use crate::node::Node;

/// Which connections of a node to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionDirection {
    /// Connections ending at the node.
    Input,
    /// Connections starting at the node.
    Output,
    /// Both.
    #[default]
    All,
}

/// Raised when a serialized graph repeats an id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphDecodeError {
    /// Two nodes share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),
    /// Two connections share an id.
    #[error("duplicate connection id: {0}")]
    DuplicateConnection(ConnectionId),
}

/// Nodes and connections, keyed by id in insertion order.
///
/// Serialized as two arrays (`{"nodes": [...], "connections": [...]}`);
/// decoding rejects repeated ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphRepr", into = "GraphRepr")]
pub struct Graph {
    /// Nodes by id.
    pub nodes: IndexMap<NodeId, Node>,
    /// Connections by id.
    pub connections: IndexMap<ConnectionId, Connection>,
}

#[derive(Serialize, Deserialize)]
struct GraphRepr {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    connections: Vec<Connection>,
}

impl TryFrom<GraphRepr> for Graph {
    type Error = GraphDecodeError;

    fn try_from(repr: GraphRepr) -> Result<Self, Self::Error> {
        let mut graph = Graph::default();
        for node in repr.nodes {
            if graph.nodes.contains_key(&node.id) {
                return Err(GraphDecodeError::DuplicateNode(node.id));
            }
            graph.nodes.insert(node.id.clone(), node);
        }
        for conn in repr.connections {
            if graph.connections.contains_key(&conn.id) {
                return Err(GraphDecodeError::DuplicateConnection(conn.id));
            }
            graph.connections.insert(conn.id.clone(), conn);
        }
        Ok(graph)
    }
}

impl From<Graph> for GraphRepr {
    fn from(graph: Graph) -> Self {
        Self {
            nodes: graph.nodes.into_values().collect(),
            connections: graph.connections.into_values().collect(),
        }
    }
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from lists, keeping the last entry for a repeated id.
    #[must_use]
    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        connections: impl IntoIterator<Item = Connection>,
    ) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            connections: connections
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }

    /// Returns true if there are no nodes and no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Looks up a connection.
    #[must_use]
    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Connections starting at `node`.
    pub fn outgoing<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| &c.source == node)
    }

    /// Connections ending at `node`.
    pub fn incoming<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| &c.target == node)
    }

    /// Connections touching `node` in the given direction.
    #[must_use]
    pub fn connections_of(&self, node: &NodeId, direction: ConnectionDirection) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| match direction {
                ConnectionDirection::Input => &c.target == node,
                ConnectionDirection::Output => &c.source == node,
                ConnectionDirection::All => c.touches(node),
            })
            .collect()
    }

    /// Number of connections attached to a specific port.
    #[must_use]
    pub fn port_usage(&self, node: &NodeId, port: &PortId) -> usize {
        self.connections
            .values()
            .filter(|c| {
                (&c.source == node && c.source_port.as_ref() == Some(port))
                    || (&c.target == node && c.target_port.as_ref() == Some(port))
            })
            .count()
    }

    /// Removes a node together with every connection touching it.
    ///
    /// Returns the removed node and connections, or `None` when absent.
    pub fn remove_node_cascade(&mut self, id: &NodeId) -> Option<(Node, Vec<Connection>)> {
        let node = self.nodes.shift_remove(id)?;
        let doomed: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.touches(id))
            .map(|c| c.id.clone())
            .collect();
        let removed = doomed
            .iter()
            .filter_map(|cid| self.connections.shift_remove(cid))
            .collect();
        Some((node, removed))
    }

    /// Bounding box of all nodes.
    #[must_use]
    pub fn bounds(&self) -> Option<Rectangle> {
        let rects: Vec<Rectangle> = self.nodes.values().map(Node::bounds).collect();
        Rectangle::enclosing(&rects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn sample() -> Graph {
        Graph::from_parts(
            [
                Node::new("A", NodeKind::Start, 0.0, 0.0),
                Node::new("B", NodeKind::Sms, 200.0, 0.0),
                Node::new("C", NodeKind::Wait, 400.0, 0.0),
            ],
            [
                Connection::new("ab", "A", "B"),
                Connection::new("bc", "B", "C"),
            ],
        )
    }

    #[test]
    fn remove_node_cascades_connections() {
        let mut graph = sample();
        let (node, removed) = graph.remove_node_cascade(&NodeId::from("B")).unwrap();
        assert_eq!(node.id.as_str(), "B");
        assert_eq!(removed.len(), 2);
        assert!(graph.connections.is_empty());
        assert!(graph.remove_node_cascade(&NodeId::from("B")).is_none());
    }

    #[test]
    fn connections_of_filters_by_direction() {
        let graph = sample();
        let b = NodeId::from("B");
        assert_eq!(graph.connections_of(&b, ConnectionDirection::Input).len(), 1);
        assert_eq!(graph.connections_of(&b, ConnectionDirection::Output).len(), 1);
        assert_eq!(graph.connections_of(&b, ConnectionDirection::All).len(), 2);
    }

    #[test]
    fn graph_serializes_as_arrays_and_rejects_duplicates() {
        let graph = sample();
        let value = serde_json::to_value(&graph).unwrap();
        assert!(value["nodes"].is_array());
        let back: Graph = serde_json::from_value(value).unwrap();
        assert_eq!(back, graph);

        let dup = serde_json::json!({
            "nodes": [
                { "id": "A", "type": "sms", "x": 0, "y": 0 },
                { "id": "A", "type": "sms", "x": 1, "y": 1 }
            ]
        });
        assert!(serde_json::from_value::<Graph>(dup).is_err());
    }

    #[test]
    fn bounds_encloses_all_nodes() {
        let bounds = sample().bounds().unwrap();
        assert_eq!(bounds, Rectangle::new(0.0, 0.0, 520.0, 80.0));
    }
}
