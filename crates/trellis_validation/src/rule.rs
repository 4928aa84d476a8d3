//! User-defined validation rules.
//!
//! A rule pairs an id, a severity and a message with a predicate that
//! returns `true` when the checked item is acceptable. The predicate's
//! signature decides which items it sees:
//!
//! | Kind         | Predicate input              | Evaluated against            |
//! |--------------|------------------------------|------------------------------|
//! | `node`       | `(&Node, &Graph)`            | every node                   |
//! | `connection` | `(&Connection, &Graph)`      | every connection             |
//! | `graph`      | `&Graph`                     | the canvas once              |
//! | `data`       | `&Map<String, Value>`        | every node's `data`          |
//!
//! Node and data rules can be narrowed to one node kind with
//! [`ValidationRule::for_kind`].

use core::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use trellis_core::{Connection, ErrorCode, Graph, Node, NodeKind, codes};

use crate::report::{Severity, ValidationIssue};

/// What a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Individual nodes.
    Node,
    /// Individual connections.
    Connection,
    /// The whole graph.
    Graph,
    /// Node data maps.
    Data,
}

type NodeCheck = Arc<dyn Fn(&Node, &Graph) -> bool + Send + Sync>;
type ConnectionCheck = Arc<dyn Fn(&Connection, &Graph) -> bool + Send + Sync>;
type GraphCheck = Arc<dyn Fn(&Graph) -> bool + Send + Sync>;
type DataCheck = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;

#[derive(Clone)]
enum Check {
    Node(NodeCheck),
    Connection(ConnectionCheck),
    Graph(GraphCheck),
    Data(DataCheck),
}

/// A user-defined validation rule.
#[derive(Clone)]
pub struct ValidationRule {
    id: String,
    name: String,
    severity: Severity,
    message: String,
    field: Option<String>,
    applies_to: Option<NodeKind>,
    enabled: bool,
    check: Check,
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("severity", &self.severity)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl ValidationRule {
    fn build(id: impl Into<String>, check: Check) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            message: format!("rule '{id}' failed"),
            id,
            severity: Severity::Error,
            field: None,
            applies_to: None,
            enabled: true,
            check,
        }
    }

    /// A rule evaluated against each node.
    pub fn node<F>(id: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Node, &Graph) -> bool + Send + Sync + 'static,
    {
        Self::build(id, Check::Node(Arc::new(check)))
    }

    /// A rule evaluated against each connection.
    pub fn connection<F>(id: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Connection, &Graph) -> bool + Send + Sync + 'static,
    {
        Self::build(id, Check::Connection(Arc::new(check)))
    }

    /// A rule evaluated once against the graph.
    pub fn graph<F>(id: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Graph) -> bool + Send + Sync + 'static,
    {
        Self::build(id, Check::Graph(Arc::new(check)))
    }

    /// A rule evaluated against each node's data map.
    pub fn data<F>(id: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        Self::build(id, Check::Data(Arc::new(check)))
    }

    /// Sets the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the severity.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the failure message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the field reported on failure.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Restricts node and data rules to one kind.
    #[must_use]
    pub fn for_kind(mut self, kind: NodeKind) -> Self {
        self.applies_to = Some(kind);
        self
    }

    /// Rule id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the rule inspects.
    #[must_use]
    pub fn kind(&self) -> RuleKind {
        match self.check {
            Check::Node(_) => RuleKind::Node,
            Check::Connection(_) => RuleKind::Connection,
            Check::Graph(_) => RuleKind::Graph,
            Check::Data(_) => RuleKind::Data,
        }
    }

    /// Configured severity.
    #[must_use]
    pub fn severity_level(&self) -> Severity {
        self.severity
    }

    /// Whether the rule currently runs.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn issue(&self, default_field: &str, target: &str) -> ValidationIssue {
        ValidationIssue::new(
            self.id.clone(),
            self.id.clone(),
            self.field.as_deref().unwrap_or(default_field),
            self.message.clone(),
        )
        .with_severity(self.severity)
        .on(target)
    }

    fn admits(&self, node: &Node) -> bool {
        self.applies_to.as_ref().is_none_or(|kind| kind == &node.kind)
    }

    /// Evaluates the rule against one node. Non-node rules pass.
    #[must_use]
    pub fn check_node(&self, node: &Node, graph: &Graph) -> Option<ValidationIssue> {
        if !self.admits(node) {
            return None;
        }
        let passed = match &self.check {
            Check::Node(check) => check(node, graph),
            Check::Data(check) => check(&node.data),
            Check::Connection(_) | Check::Graph(_) => true,
        };
        (!passed).then(|| self.issue("id", node.id.as_str()))
    }

    /// Evaluates the rule against one connection. Non-connection rules pass.
    #[must_use]
    pub fn check_connection(&self, connection: &Connection, graph: &Graph) -> Option<ValidationIssue> {
        let Check::Connection(check) = &self.check else {
            return None;
        };
        (!check(connection, graph)).then(|| self.issue("id", connection.id.as_str()))
    }

    /// Evaluates a graph rule. Other rules pass.
    #[must_use]
    pub fn check_graph(&self, graph: &Graph) -> Option<ValidationIssue> {
        let Check::Graph(check) = &self.check else {
            return None;
        };
        (!check(graph)).then(|| self.issue("canvas", "canvas"))
    }
}

/// Serializable description of a registered rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInfo {
    /// Rule id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What the rule inspects.
    #[serde(rename = "type")]
    pub kind: RuleKind,
    /// Severity.
    pub severity: Severity,
    /// Whether the rule runs.
    pub enabled: bool,
    /// Whether the rule is built in.
    pub built_in: bool,
}

impl From<&ValidationRule> for RuleInfo {
    fn from(rule: &ValidationRule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            kind: rule.kind(),
            severity: rule.severity,
            enabled: rule.enabled,
            built_in: false,
        }
    }
}

/// Rule management failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// A rule with this id is already registered.
    #[error("validation rule '{0}' already exists")]
    Duplicate(String),
    /// No rule with this id.
    #[error("validation rule '{0}' not found")]
    NotFound(String),
    /// Built-in rules cannot be removed or disabled.
    #[error("validation rule '{0}' is built in")]
    BuiltIn(String),
}

impl ErrorCode for RuleError {
    fn code(&self) -> &'static str {
        match self {
            RuleError::Duplicate(_) => codes::DUPLICATE_RULE,
            RuleError::NotFound(_) => codes::RULE_NOT_FOUND,
            RuleError::BuiltIn(_) => codes::BUILT_IN_RULE,
        }
    }
}
