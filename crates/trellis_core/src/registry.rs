//! Per-kind node defaults and constraints.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::geometry::Size;
use crate::id::PortId;
use crate::node::{DEFAULT_NODE_SIZE, NodeKind, Port, PortDirection, PortSide};

/// Blueprint for a port stamped onto new nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortTemplate {
    /// Port id.
    pub id: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Input or output.
    pub direction: PortDirection,
    /// Node side.
    #[serde(default)]
    pub side: PortSide,
    /// Data type tag.
    #[serde(default)]
    pub data_type: String,
    /// Whether the port must be connected.
    #[serde(default)]
    pub required: bool,
    /// Whether the port accepts several connections.
    #[serde(default)]
    pub multiple: bool,
}

impl PortTemplate {
    fn input(multiple: bool) -> Self {
        Self {
            id: "in".to_owned(),
            label: "In".to_owned(),
            direction: PortDirection::Input,
            side: PortSide::Top,
            data_type: "flow".to_owned(),
            required: false,
            multiple,
        }
    }

    fn output(multiple: bool) -> Self {
        Self {
            id: "out".to_owned(),
            label: "Out".to_owned(),
            direction: PortDirection::Output,
            side: PortSide::Bottom,
            data_type: "flow".to_owned(),
            required: false,
            multiple,
        }
    }

    /// Creates a concrete port from this template.
    #[must_use]
    pub fn instantiate(&self) -> Port {
        Port {
            id: PortId::from(self.id.as_str()),
            direction: self.direction,
            side: self.side,
            offset: None,
            data_type: self.data_type.clone(),
            required: self.required,
            multiple: self.multiple,
        }
    }
}

/// Defaults and constraints for one node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeConfig {
    /// The kind this entry describes.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Default label.
    pub label: String,
    /// Palette category.
    pub category: String,
    /// Size used when the caller gives none.
    pub default_size: Size,
    /// Lower resize bound.
    pub min_size: Size,
    /// Upper resize bound.
    pub max_size: Size,
    /// Whether `resizeNode` may change the size.
    pub resizable: bool,
    /// Whether `deleteNode` may remove it without forcing.
    pub deletable: bool,
    /// Whether connections may attach.
    pub connectable: bool,
    /// Ports stamped onto new nodes.
    pub ports: Vec<PortTemplate>,
    /// Upper bound on connections touching the node, if any.
    #[serde(default)]
    pub max_connections: Option<usize>,
    /// `data` keys that must be present and non-null.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl NodeTypeConfig {
    /// A permissive entry with one input and one output.
    #[must_use]
    pub fn generic(kind: NodeKind) -> Self {
        Self {
            label: kind.to_string(),
            kind,
            category: "custom".to_owned(),
            default_size: DEFAULT_NODE_SIZE,
            min_size: Size::new(60.0, 40.0),
            max_size: Size::new(480.0, 320.0),
            resizable: true,
            deletable: true,
            connectable: true,
            ports: vec![PortTemplate::input(true), PortTemplate::output(true)],
            max_connections: None,
            required_fields: Vec::new(),
        }
    }

    fn builtin(kind: NodeKind) -> Self {
        let mut config = Self::generic(kind.clone());
        let (label, category) = match &kind {
            NodeKind::Start => ("Start", "trigger"),
            NodeKind::AudienceSplit => ("Audience Split", "branch"),
            NodeKind::EventSplit => ("Event Split", "branch"),
            NodeKind::AbTest => ("A/B Test", "branch"),
            NodeKind::Sms => ("SMS", "action"),
            NodeKind::AiCall => ("AI Call", "action"),
            NodeKind::ManualCall => ("Manual Call", "action"),
            NodeKind::Benefit => ("Benefit", "action"),
            NodeKind::Wait => ("Wait", "control"),
            NodeKind::Custom(_) => return config,
        };
        config.label = label.to_owned();
        config.category = category.to_owned();
        config.deletable = kind != NodeKind::Start;
        config.ports = if kind == NodeKind::Start {
            vec![PortTemplate::output(false)]
        } else if kind.is_split() {
            vec![PortTemplate::input(true), PortTemplate::output(true)]
        } else {
            vec![PortTemplate::input(true), PortTemplate::output(false)]
        };
        config
    }

    /// Concrete ports for a new node of this kind.
    #[must_use]
    pub fn instantiate_ports(&self) -> Vec<Port> {
        self.ports.iter().map(PortTemplate::instantiate).collect()
    }
}

/// Lookup table from [`NodeKind`] to [`NodeTypeConfig`].
///
/// Kinds without an entry resolve to [`NodeTypeConfig::generic`].
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: HashMap<NodeKind, NodeTypeConfig>,
}

impl NodeTypeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry populated with all built-in kinds.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in NodeKind::BUILT_IN {
            registry.register(NodeTypeConfig::builtin(kind));
        }
        registry
    }

    /// Adds or replaces an entry.
    pub fn register(&mut self, config: NodeTypeConfig) -> Option<NodeTypeConfig> {
        self.types.insert(config.kind.clone(), config)
    }

    /// Removes an entry.
    pub fn unregister(&mut self, kind: &NodeKind) -> Option<NodeTypeConfig> {
        self.types.remove(kind)
    }

    /// Returns the explicit entry for `kind`.
    #[must_use]
    pub fn get(&self, kind: &NodeKind) -> Option<&NodeTypeConfig> {
        self.types.get(kind)
    }

    /// Returns the entry for `kind`, or a generic one.
    #[must_use]
    pub fn resolve(&self, kind: &NodeKind) -> NodeTypeConfig {
        self.get(kind)
            .cloned()
            .unwrap_or_else(|| NodeTypeConfig::generic(kind.clone()))
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &NodeKind> {
        self.types.keys()
    }
}
