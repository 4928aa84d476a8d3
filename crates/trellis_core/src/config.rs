//! Configuration tree for a canvas.
//!
//! Every section deserializes with `#[serde(default)]`, so a configuration
//! document only needs the keys it changes:
//!
//! ```
//! use trellis_core::config::CanvasConfig;
//!
//! let config = CanvasConfig::from_json_str(r#"{ "history": { "maxSize": 5 } }"#).unwrap();
//! assert_eq!(config.history.max_size, 5);
//! assert_eq!(config.grid.size, 20.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::id::PortId;
use crate::node::NodeKind;

/// Background grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridConfig {
    /// Whether the grid is shown and used for snapping layouts.
    pub enabled: bool,
    /// Cell size in canvas units.
    pub size: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 20.0,
        }
    }
}

impl GridConfig {
    /// Rounds `value` to the nearest grid line.
    #[must_use]
    pub fn snap(&self, value: f64) -> f64 {
        if self.size <= 0.0 {
            return value;
        }
        (value / self.size).round() * self.size
    }
}

/// Snapping while dragging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapConfig {
    /// Whether snapping is active.
    pub enabled: bool,
    /// Distance below which positions snap.
    pub threshold: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 10.0,
        }
    }
}

/// Zoom bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoomConfig {
    /// Smallest zoom factor.
    pub min: f64,
    /// Largest zoom factor.
    pub max: f64,
    /// Increment for stepwise zooming.
    pub step: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min: 0.1,
            max: 4.0,
            step: 0.1,
        }
    }
}

impl ZoomConfig {
    /// Clamps a zoom factor into `[min, max]`.
    #[must_use]
    pub fn clamp(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return 1.0_f64.clamp(self.min, self.max.max(self.min));
        }
        zoom.clamp(self.min, self.max.max(self.min))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Layout algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutAlgorithm {
    /// Layered by breadth-first depth.
    #[default]
    Hierarchical,
    /// Spring/repulsion relaxation.
    Force,
    /// Evenly spaced on a circle.
    Circular,
    /// Row-major grid.
    Grid,
}

impl LayoutAlgorithm {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutAlgorithm::Hierarchical => "hierarchical",
            LayoutAlgorithm::Force => "force",
            LayoutAlgorithm::Circular => "circular",
            LayoutAlgorithm::Grid => "grid",
        }
    }
}

/// Flow direction for hierarchical layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutDirection {
    /// Top to bottom.
    #[default]
    #[serde(rename = "TB")]
    TopToBottom,
    /// Bottom to top.
    #[serde(rename = "BT")]
    BottomToTop,
    /// Left to right.
    #[serde(rename = "LR")]
    LeftToRight,
    /// Right to left.
    #[serde(rename = "RL")]
    RightToLeft,
}

impl LayoutDirection {
    /// Returns true when depth grows along the x axis.
    #[must_use]
    pub fn is_horizontal(self) -> bool {
        matches!(self, LayoutDirection::LeftToRight | LayoutDirection::RightToLeft)
    }

    /// Returns true when depth grows towards negative coordinates.
    #[must_use]
    pub fn is_reversed(self) -> bool {
        matches!(self, LayoutDirection::BottomToTop | LayoutDirection::RightToLeft)
    }
}

/// Cross-axis alignment of a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutAlignment {
    /// Align to the start of the cross axis.
    Start,
    /// Center each layer.
    #[default]
    Center,
    /// Align to the end of the cross axis.
    End,
}

/// Spacing between laid-out nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutSpacing {
    /// Gap between siblings in a layer.
    pub node: f64,
    /// Gap between layers.
    pub level: f64,
    /// Extra gap between sibling subtrees.
    pub branch: f64,
}

impl Default for LayoutSpacing {
    fn default() -> Self {
        Self {
            node: 50.0,
            level: 100.0,
            branch: 30.0,
        }
    }
}

/// Force-directed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForceConfig {
    /// Hard iteration cap.
    pub iterations: usize,
    /// Stop once total displacement in one step falls below this.
    pub convergence: f64,
    /// Rest length of a connection spring.
    pub ideal_length: f64,
    /// Repulsion constant.
    pub repulsion: f64,
    /// Spring constant.
    pub attraction: f64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            iterations: 300,
            convergence: 0.5,
            ideal_length: 150.0,
            repulsion: 20_000.0,
            attraction: 0.05,
        }
    }
}

/// Layout settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    /// Algorithm used by `autoLayout` when none is given.
    pub algorithm: LayoutAlgorithm,
    /// Hierarchical flow direction.
    pub direction: LayoutDirection,
    /// Spacing.
    pub spacing: LayoutSpacing,
    /// Layer alignment.
    pub alignment: LayoutAlignment,
    /// Force-directed parameters.
    pub force: ForceConfig,
    /// Fixed grid column count; `ceil(sqrt(n))` when absent.
    pub grid_columns: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection policy
// ─────────────────────────────────────────────────────────────────────────────

/// Allows or denies connections between two node kinds.
///
/// `"*"` matches any kind. Port fields match only when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRule {
    /// Source kind tag or `"*"`.
    pub source_type: String,
    /// Target kind tag or `"*"`.
    pub target_type: String,
    /// Source port restriction.
    #[serde(default)]
    pub source_port: Option<String>,
    /// Target port restriction.
    #[serde(default)]
    pub target_port: Option<String>,
    /// Whether matching connections are allowed.
    pub allowed: bool,
    /// Message reported on denial.
    #[serde(default)]
    pub message: Option<String>,
}

impl ConnectionRule {
    /// A rule denying `source -> target`.
    #[must_use]
    pub fn deny(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_type: source.into(),
            target_type: target.into(),
            source_port: None,
            target_port: None,
            allowed: false,
            message: None,
        }
    }

    /// A rule allowing `source -> target`.
    #[must_use]
    pub fn allow(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            allowed: true,
            ..Self::deny(source, target)
        }
    }

    /// Sets the denial message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn matches(
        &self,
        source: &NodeKind,
        target: &NodeKind,
        source_port: Option<&PortId>,
        target_port: Option<&PortId>,
    ) -> bool {
        fn kind_matches(pattern: &str, kind: &NodeKind) -> bool {
            pattern == "*" || pattern == kind.as_str()
        }
        fn port_matches(pattern: Option<&String>, port: Option<&PortId>) -> bool {
            match pattern {
                None => true,
                Some(p) => port.is_some_and(|port| port.as_str() == p),
            }
        }
        kind_matches(&self.source_type, source)
            && kind_matches(&self.target_type, target)
            && port_matches(self.source_port.as_ref(), source_port)
            && port_matches(self.target_port.as_ref(), target_port)
    }
}

/// Graph-level connection constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionPolicy {
    /// Whether a node may connect to itself.
    pub allow_self_loops: bool,
    /// Whether two connections may join the same endpoints.
    pub allow_multi_edges: bool,
    /// Kind compatibility rules; the first match decides, no match allows.
    pub rules: Vec<ConnectionRule>,
}

impl ConnectionPolicy {
    /// Returns the denial message if the rules forbid this connection.
    #[must_use]
    pub fn denial(
        &self,
        source: &NodeKind,
        target: &NodeKind,
        source_port: Option<&PortId>,
        target_port: Option<&PortId>,
    ) -> Option<String> {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matches(source, target, source_port, target_port))?;
        if rule.allowed {
            return None;
        }
        Some(
            rule.message
                .clone()
                .unwrap_or_else(|| format!("connections from '{source}' to '{target}' are not allowed")),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine sections
// ─────────────────────────────────────────────────────────────────────────────

/// Validation behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Whether user rules run on commit. Structural checks always run.
    pub enabled: bool,
    /// Re-validate the whole graph after every commit and publish findings.
    pub real_time: bool,
    /// Treat warnings as blocking.
    pub strict: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            real_time: false,
            strict: false,
        }
    }
}

/// Undo/redo bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Upper bound on `past + 1 + future`.
    pub max_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_size: 50 }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventBusConfig {
    /// Listener count per event type above which a warning is logged.
    pub max_listeners: usize,
    /// Whether emitted events are recorded.
    pub history_enabled: bool,
    /// Capacity of the event history ring.
    pub history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_listeners: 10,
            history_enabled: false,
            history_size: 100,
        }
    }
}

/// Capacity limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceConfig {
    /// Maximum number of nodes on one canvas.
    pub max_nodes: usize,
    /// Maximum number of connections on one canvas.
    pub max_connections: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_nodes: 1000,
            max_connections: 2000,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Whether `autoSaveCanvas` saves at all.
    pub auto_save: bool,
    /// Minimum time between automatic saves.
    pub auto_save_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            auto_save: false,
            auto_save_interval_ms: 30_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CanvasConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Complete configuration for one canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasConfig {
    /// Background grid.
    pub grid: GridConfig,
    /// Drag snapping.
    pub snap: SnapConfig,
    /// Zoom bounds.
    pub zoom: ZoomConfig,
    /// Layout defaults.
    pub layout: LayoutConfig,
    /// Connection constraints.
    pub connection: ConnectionPolicy,
    /// Validation behaviour.
    pub validation: ValidationConfig,
    /// Undo/redo bound.
    pub history: HistoryConfig,
    /// Event bus settings.
    pub events: EventBusConfig,
    /// Capacity limits.
    pub performance: PerformanceConfig,
    /// Persistence.
    pub storage: StorageConfig,
}

impl CanvasConfig {
    /// Parses a JSON document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed JSON or mistyped values.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the history bound.
    #[must_use]
    pub fn with_history_size(mut self, max_size: usize) -> Self {
        self.history.max_size = max_size;
        self
    }

    /// Replaces the connection policy.
    #[must_use]
    pub fn with_connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.connection = policy;
        self
    }

    /// Toggles strict validation.
    #[must_use]
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.validation.strict = strict;
        self
    }

    /// Toggles real-time validation.
    #[must_use]
    pub fn with_real_time_validation(mut self, real_time: bool) -> Self {
        self.validation.real_time = real_time;
        self
    }

    /// Replaces the layout defaults.
    #[must_use]
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the capacity limits.
    #[must_use]
    pub fn with_capacity(mut self, max_nodes: usize, max_connections: usize) -> Self {
        self.performance.max_nodes = max_nodes;
        self.performance.max_connections = max_connections;
        self
    }

    /// Replaces the event bus settings.
    #[must_use]
    pub fn with_events(mut self, events: EventBusConfig) -> Self {
        self.events = events;
        self
    }

    /// Replaces the storage settings.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the grid size.
    #[must_use]
    pub fn with_grid_size(mut self, size: f64) -> Self {
        self.grid.size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CanvasConfig::default();
        assert_eq!(config.grid.size, 20.0);
        assert_eq!(config.snap.threshold, 10.0);
        assert_eq!(config.layout.spacing, LayoutSpacing::default());
        assert_eq!(config.layout.spacing.level, 100.0);
        assert_eq!(config.history.max_size, 50);
        assert_eq!(config.events.max_listeners, 10);
        assert!(!config.connection.allow_self_loops);
        assert!(!config.validation.strict);
    }

    #[test]
    fn partial_json_fills_defaults_and_ignores_unknown_keys() {
        let config = CanvasConfig::from_json_str(
            r#"{ "layout": { "direction": "LR" }, "validation": { "strict": true }, "theme": "dark" }"#,
        )
        .unwrap();
        assert_eq!(config.layout.direction, LayoutDirection::LeftToRight);
        assert_eq!(config.layout.algorithm, LayoutAlgorithm::Hierarchical);
        assert!(config.validation.strict);
        assert!(config.validation.enabled);
    }

    #[test]
    fn zoom_clamp_respects_bounds() {
        let zoom = ZoomConfig::default();
        assert_eq!(zoom.clamp(10.0), 4.0);
        assert_eq!(zoom.clamp(0.0), 0.1);
        assert_eq!(zoom.clamp(f64::NAN), 1.0);
    }

    #[test]
    fn connection_policy_first_match_decides() {
        let policy = ConnectionPolicy {
            rules: vec![
                ConnectionRule::allow("start", "sms"),
                ConnectionRule::deny("start", "*").with_message("start must lead to an action"),
            ],
            ..ConnectionPolicy::default()
        };
        assert!(policy.denial(&NodeKind::Start, &NodeKind::Sms, None, None).is_none());
        assert_eq!(
            policy.denial(&NodeKind::Start, &NodeKind::Wait, None, None).as_deref(),
            Some("start must lead to an action")
        );
        assert!(policy.denial(&NodeKind::Sms, &NodeKind::Wait, None, None).is_none());
    }

    #[test]
    fn grid_snap_rounds_to_nearest_line() {
        let grid = GridConfig::default();
        assert_eq!(grid.snap(29.0), 20.0);
        assert_eq!(grid.snap(31.0), 40.0);
    }
}
