//! Connection types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{ConnectionId, NodeId, PortId};

/// Shape of a connection end marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    /// Filled arrow head.
    #[default]
    Arrow,
    /// Filled circle.
    Circle,
    /// Filled diamond.
    Diamond,
    /// No marker.
    None,
}

/// An end marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerStyle {
    /// Marker shape.
    #[serde(rename = "type")]
    pub kind: MarkerKind,
    /// Marker size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Marker color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Presentation hints for a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionStyle {
    /// Stroke color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// SVG dash pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_dasharray: Option<String>,
    /// Whether the stroke is animated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,
    /// Marker at the target end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_end: Option<MarkerStyle>,
    /// Marker at the source end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_start: Option<MarkerStyle>,
}

/// Bookkeeping attached to a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionMetadata {
    /// Creation time in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<u64>,
    /// Last update time in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<u64>,
    /// Branch condition, for connections leaving a split node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Branch probability in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Relative weight, for A/B branches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A directed link from one node to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Unique identifier.
    pub id: ConnectionId,
    /// Origin node.
    pub source: NodeId,
    /// Destination node.
    pub target: NodeId,
    /// Output port on the source node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<PortId>,
    /// Input port on the target node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<PortId>,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Free-form payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Presentation hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ConnectionStyle>,
    /// Bookkeeping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConnectionMetadata>,
}

impl Connection {
    /// Creates a plain connection between two nodes.
    #[must_use]
    pub fn new(id: impl Into<ConnectionId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_port: None,
            target_port: None,
            label: None,
            data: Map::new(),
            style: None,
            metadata: None,
        }
    }

    /// Returns true if either endpoint is `node`.
    #[must_use]
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    /// Returns true if the connection goes from a node back to itself.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Returns true if both connections join the same endpoints (ports included).
    #[must_use]
    pub fn same_endpoints(&self, other: &Connection) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.source_port == other.source_port
            && self.target_port == other.target_port
    }
}

/// Input for creating a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDraft {
    /// Requested id; generated when absent.
    #[serde(default)]
    pub id: Option<ConnectionId>,
    /// Origin node.
    pub source: NodeId,
    /// Destination node.
    pub target: NodeId,
    /// Output port on the source.
    #[serde(default)]
    pub source_port: Option<PortId>,
    /// Input port on the target.
    #[serde(default)]
    pub target_port: Option<PortId>,
    /// Display label.
    #[serde(default)]
    pub label: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Presentation hints.
    #[serde(default)]
    pub style: Option<ConnectionStyle>,
    /// Bookkeeping.
    #[serde(default)]
    pub metadata: Option<ConnectionMetadata>,
}

impl ConnectionDraft {
    /// Starts a draft between two nodes.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            source_port: None,
            target_port: None,
            label: None,
            data: Map::new(),
            style: None,
            metadata: None,
        }
    }

    /// Requests a specific id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ConnectionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attaches to explicit ports.
    #[must_use]
    pub fn ports(mut self, source_port: impl Into<PortId>, target_port: impl Into<PortId>) -> Self {
        self.source_port = Some(source_port.into());
        self.target_port = Some(target_port.into());
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl From<Connection> for ConnectionDraft {
    fn from(conn: Connection) -> Self {
        Self {
            id: Some(conn.id),
            source: conn.source,
            target: conn.target,
            source_port: conn.source_port,
            target_port: conn.target_port,
            label: conn.label,
            data: conn.data,
            style: conn.style,
            metadata: conn.metadata,
        }
    }
}

/// Partial update for a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionPatch {
    /// New origin node.
    pub source: Option<NodeId>,
    /// New destination node.
    pub target: Option<NodeId>,
    /// New source port. `Some(None)` detaches.
    pub source_port: Option<Option<PortId>>,
    /// New target port. `Some(None)` detaches.
    pub target_port: Option<Option<PortId>>,
    /// New label.
    pub label: Option<String>,
    /// Payload to deep-merge.
    pub data: Option<Map<String, Value>>,
    /// Replacement style.
    pub style: Option<ConnectionStyle>,
    /// Replacement metadata.
    pub metadata: Option<ConnectionMetadata>,
}

impl ConnectionPatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Re-targets the connection.
    #[must_use]
    pub fn target(mut self, target: impl Into<NodeId>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Merges one payload entry.
    #[must_use]
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_endpoints_compares_ports() {
        let a = Connection::new("c1", "A", "B");
        let mut b = Connection::new("c2", "A", "B");
        assert!(a.same_endpoints(&b));
        b.source_port = Some(PortId::from("out"));
        assert!(!a.same_endpoints(&b));
    }

    #[test]
    fn connection_serializes_in_camel_case() {
        let mut conn = Connection::new("c1", "A", "B");
        conn.source_port = Some(PortId::from("out"));
        let value = serde_json::to_value(&conn).unwrap();
        assert_eq!(value["sourcePort"], "out");
        assert!(value.get("targetPort").is_none());
    }

    #[test]
    fn touches_and_self_loop() {
        let conn = Connection::new("c1", "A", "A");
        assert!(conn.is_self_loop());
        assert!(conn.touches(&NodeId::from("A")));
        assert!(!conn.touches(&NodeId::from("B")));
    }
}
