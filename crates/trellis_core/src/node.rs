//! Node and port types.
//!
//! Nodes are the vertices of a canvas. The node "type" is a closed
//! [`NodeKind`] enum with an open [`NodeKind::Custom`] escape hatch; the
//! behaviour attached to each kind lives in the
//! [`NodeTypeRegistry`](crate::registry::NodeTypeRegistry) rather than in
//! branches scattered through the engine.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geometry::{Position, Rectangle, Size};
use crate::id::{NodeId, PortId};

/// Size used when neither the node nor its registry entry provides one.
pub const DEFAULT_NODE_SIZE: Size = Size::new(120.0, 80.0);

// ─────────────────────────────────────────────────────────────────────────────
// NodeKind
// ─────────────────────────────────────────────────────────────────────────────

/// The type tag of a node.
///
/// Serialised as its kebab-case tag (`"audience-split"`); unknown tags
/// round-trip through [`NodeKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum NodeKind {
    /// Workflow entry point.
    Start,
    /// Splits the audience into segments.
    AudienceSplit,
    /// Branches on an observed event.
    EventSplit,
    /// Sends an SMS.
    Sms,
    /// Places an automated call.
    AiCall,
    /// Schedules a manual call.
    ManualCall,
    /// Splits traffic for an A/B test.
    AbTest,
    /// Delays the flow.
    Wait,
    /// Grants a benefit.
    Benefit,
    /// Any externally defined kind.
    Custom(String),
}

impl NodeKind {
    /// All built-in kinds, in declaration order.
    pub const BUILT_IN: [NodeKind; 9] = [
        NodeKind::Start,
        NodeKind::AudienceSplit,
        NodeKind::EventSplit,
        NodeKind::Sms,
        NodeKind::AiCall,
        NodeKind::ManualCall,
        NodeKind::AbTest,
        NodeKind::Wait,
        NodeKind::Benefit,
    ];

    /// Returns the wire tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Start => "start",
            NodeKind::AudienceSplit => "audience-split",
            NodeKind::EventSplit => "event-split",
            NodeKind::Sms => "sms",
            NodeKind::AiCall => "ai-call",
            NodeKind::ManualCall => "manual-call",
            NodeKind::AbTest => "ab-test",
            NodeKind::Wait => "wait",
            NodeKind::Benefit => "benefit",
            NodeKind::Custom(tag) => tag,
        }
    }

    /// Returns true for kinds that fan out into several branches.
    #[must_use]
    pub fn is_split(&self) -> bool {
        matches!(
            self,
            NodeKind::AudienceSplit | NodeKind::EventSplit | NodeKind::AbTest
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NodeKind {
    fn from(tag: &str) -> Self {
        match tag {
            "start" => NodeKind::Start,
            "audience-split" => NodeKind::AudienceSplit,
            "event-split" => NodeKind::EventSplit,
            "sms" => NodeKind::Sms,
            "ai-call" => NodeKind::AiCall,
            "manual-call" => NodeKind::ManualCall,
            "ab-test" => NodeKind::AbTest,
            "wait" => NodeKind::Wait,
            "benefit" => NodeKind::Benefit,
            other => NodeKind::Custom(other.to_owned()),
        }
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        NodeKind::from(tag.as_str())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Custom(tag) => tag,
            other => other.as_str().to_owned(),
        }
    }
}

impl FromStr for NodeKind {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NodeKind::from(s))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a port receives or emits connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Connections terminate here.
    Input,
    /// Connections originate here.
    Output,
}

/// The node edge a port is drawn on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSide {
    /// Top edge.
    Top,
    /// Right edge.
    Right,
    /// Bottom edge.
    #[default]
    Bottom,
    /// Left edge.
    Left,
}

/// A typed attachment point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Identifier, unique within the owning node.
    pub id: PortId,
    /// Input or output.
    pub direction: PortDirection,
    /// Edge of the node the port sits on.
    #[serde(default)]
    pub side: PortSide,
    /// Relative offset along the side in `[0, 1]`; centered when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    /// Free-form data type tag used by connection rules.
    #[serde(default)]
    pub data_type: String,
    /// Whether the port must be connected for the node to be valid.
    #[serde(default)]
    pub required: bool,
    /// Whether the port accepts more than one connection.
    #[serde(default)]
    pub multiple: bool,
}

impl Port {
    /// Creates an input port on the top side.
    #[must_use]
    pub fn input(id: impl Into<PortId>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            side: PortSide::Top,
            offset: None,
            data_type: String::new(),
            required: false,
            multiple: false,
        }
    }

    /// Creates an output port on the bottom side.
    #[must_use]
    pub fn output(id: impl Into<PortId>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
            side: PortSide::Bottom,
            offset: None,
            data_type: String::new(),
            required: false,
            multiple: false,
        }
    }

    /// Allows more than one connection on this port.
    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Marks this port as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Moves the port to another side.
    #[must_use]
    pub fn on(mut self, side: PortSide) -> Self {
        self.side = side;
        self
    }

    /// Absolute anchor point of the port for a node occupying `bounds`.
    #[must_use]
    pub fn anchor(&self, bounds: &Rectangle) -> Position {
        let t = self.offset.unwrap_or(0.5).clamp(0.0, 1.0);
        match self.side {
            PortSide::Top => Position::new(bounds.x + bounds.width * t, bounds.y),
            PortSide::Bottom => Position::new(bounds.x + bounds.width * t, bounds.bottom()),
            PortSide::Left => Position::new(bounds.x, bounds.y + bounds.height * t),
            PortSide::Right => Position::new(bounds.right(), bounds.y + bounds.height * t),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Style & Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Presentation hints for a node. The engine stores but never interprets these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStyle {
    /// Fill color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Stroke color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// Corner radius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<f64>,
    /// Opacity in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    /// Whether to draw a shadow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<bool>,
    /// Extra CSS class name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// Bookkeeping attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeMetadata {
    /// Creation time in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<u64>,
    /// Last update time in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<u64>,
    /// Free-form version tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// A vertex on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier.
    pub id: NodeId,
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Left edge in canvas coordinates.
    pub x: f64,
    /// Top edge in canvas coordinates.
    pub y: f64,
    /// Explicit width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Explicit height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Free-form payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Presentation hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<NodeStyle>,
    /// Attachment points.
    #[serde(default)]
    pub ports: Vec<Port>,
    /// Bookkeeping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NodeMetadata>,
}

impl Node {
    /// Creates a bare node of the given kind at `(x, y)`.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            x,
            y,
            width: None,
            height: None,
            label: None,
            data: Map::new(),
            style: None,
            ports: Vec::new(),
            metadata: None,
        }
    }

    /// Top-left position.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    /// Effective size, falling back to [`DEFAULT_NODE_SIZE`].
    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(
            self.width.unwrap_or(DEFAULT_NODE_SIZE.width),
            self.height.unwrap_or(DEFAULT_NODE_SIZE.height),
        )
    }

    /// Bounding box.
    #[must_use]
    pub fn bounds(&self) -> Rectangle {
        let size = self.size();
        Rectangle::new(self.x, self.y, size.width, size.height)
    }

    /// Looks up a port by id.
    #[must_use]
    pub fn port(&self, id: &PortId) -> Option<&Port> {
        self.ports.iter().find(|port| &port.id == id)
    }
}

/// Input for creating a node. Missing fields are filled by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
    /// Requested id; generated when absent.
    #[serde(default)]
    pub id: Option<NodeId>,
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Left edge.
    #[serde(default)]
    pub x: f64,
    /// Top edge.
    #[serde(default)]
    pub y: f64,
    /// Width; registry default when absent.
    #[serde(default)]
    pub width: Option<f64>,
    /// Height; registry default when absent.
    #[serde(default)]
    pub height: Option<f64>,
    /// Display label; registry label when absent.
    #[serde(default)]
    pub label: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Presentation hints.
    #[serde(default)]
    pub style: Option<NodeStyle>,
    /// Ports; registry templates when absent.
    #[serde(default)]
    pub ports: Option<Vec<Port>>,
    /// Bookkeeping.
    #[serde(default)]
    pub metadata: Option<NodeMetadata>,
}

impl NodeDraft {
    /// Starts a draft for the given kind at the origin.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: None,
            kind,
            x: 0.0,
            y: 0.0,
            width: None,
            height: None,
            label: None,
            data: Map::new(),
            style: None,
            ports: None,
            metadata: None,
        }
    }

    /// Requests a specific id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the position.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Sets the size.
    #[must_use]
    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Inserts one payload entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Overrides the registry ports.
    #[must_use]
    pub fn with_ports(mut self, ports: Vec<Port>) -> Self {
        self.ports = Some(ports);
        self
    }
}

impl From<Node> for NodeDraft {
    fn from(node: Node) -> Self {
        Self {
            id: Some(node.id),
            kind: node.kind,
            x: node.x,
            y: node.y,
            width: node.width,
            height: node.height,
            label: node.label,
            data: node.data,
            style: node.style,
            ports: Some(node.ports),
            metadata: node.metadata,
        }
    }
}

/// Partial update for a node. `None` fields are left untouched.
///
/// `data` is deep-merged into the existing payload (a `null` value removes a
/// key); `data_paths` then writes individual dotted paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePatch {
    /// New type tag.
    #[serde(rename = "type")]
    pub kind: Option<NodeKind>,
    /// New left edge.
    pub x: Option<f64>,
    /// New top edge.
    pub y: Option<f64>,
    /// New width.
    pub width: Option<f64>,
    /// New height.
    pub height: Option<f64>,
    /// New label.
    pub label: Option<String>,
    /// Payload to merge.
    pub data: Option<Map<String, Value>>,
    /// Dotted-path writes applied after the merge.
    pub data_paths: Vec<(String, Value)>,
    /// Replacement style.
    pub style: Option<NodeStyle>,
    /// Replacement ports.
    pub ports: Option<Vec<Port>>,
    /// Replacement metadata.
    pub metadata: Option<NodeMetadata>,
}

impl NodePatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the node.
    #[must_use]
    pub fn position(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Resizes the node.
    #[must_use]
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Changes the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
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

    /// Writes a dotted path inside the payload.
    #[must_use]
    pub fn data_path(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data_paths.push((path.into(), value.into()));
        self
    }

    /// Returns true when the patch only touches position.
    #[must_use]
    pub fn is_move_only(&self) -> bool {
        (self.x.is_some() || self.y.is_some())
            && self.kind.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.label.is_none()
            && self.data.is_none()
            && self.data_paths.is_empty()
            && self.style.is_none()
            && self.ports.is_none()
            && self.metadata.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_kind_round_trips_through_tags() {
        for kind in NodeKind::BUILT_IN {
            let tag: String = kind.clone().into();
            assert_eq!(NodeKind::from(tag.as_str()), kind);
        }
        assert_eq!(
            NodeKind::from("webhook"),
            NodeKind::Custom("webhook".to_owned())
        );
    }

    #[test]
    fn node_serializes_with_type_tag_and_camel_case() {
        let mut node = Node::new("A", NodeKind::AudienceSplit, 1.0, 2.0);
        node.ports.push(Port::output("out").multiple());
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], json!("audience-split"));
        assert_eq!(value["ports"][0]["dataType"], json!(""));
        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn size_falls_back_to_default() {
        let node = Node::new("A", NodeKind::Sms, 0.0, 0.0);
        assert_eq!(node.size(), DEFAULT_NODE_SIZE);
        assert_eq!(node.bounds(), Rectangle::new(0.0, 0.0, 120.0, 80.0));
    }

    #[test]
    fn port_anchor_sits_on_its_side() {
        let bounds = Rectangle::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(Port::input("in").anchor(&bounds), Position::new(50.0, 0.0));
        assert_eq!(
            Port::output("out").anchor(&bounds),
            Position::new(50.0, 50.0)
        );
        assert_eq!(
            Port::output("r").on(PortSide::Right).anchor(&bounds),
            Position::new(100.0, 25.0)
        );
    }

    #[test]
    fn move_only_patch_detection() {
        assert!(NodePatch::new().position(1.0, 2.0).is_move_only());
        assert!(!NodePatch::new().position(1.0, 2.0).label("x").is_move_only());
        assert!(!NodePatch::new().is_move_only());
    }
}
