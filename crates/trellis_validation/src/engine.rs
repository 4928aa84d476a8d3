//! The validation engine.
//!
//! [`ValidationEngine`] owns the user rule set, the connection policy and the
//! node type registry. It never holds graph state: every entry point takes
//! the graph to inspect, so the store can validate a draft before committing
//! it.

use core::fmt;

use indexmap::IndexMap;
use parking_lot::RwLock;
use trellis_core::config::{CanvasConfig, ConnectionPolicy, ValidationConfig};
use trellis_core::registry::{NodeTypeConfig, NodeTypeRegistry};
use trellis_core::{ConnectionId, Graph, NodeId, NodeKind};
use trellis_events::{CanvasEvent, CanvasEventType, EventBus, EventPayload};

use crate::report::{Severity, ValidationResult};
use crate::rule::{RuleError, RuleInfo, RuleKind, ValidationRule};
use crate::structural::{self, STRUCTURAL_RULE, StructuralContext};
use crate::workflow;

const BUILT_IN_RULES: &[(&str, &str, Severity)] = &[
    (STRUCTURAL_RULE, "Structural integrity", Severity::Error),
    (workflow::START_COUNT, "Single start node", Severity::Error),
    (workflow::START_INCOMING, "Start has no inputs", Severity::Error),
    (workflow::UNREACHABLE, "Reachable from start", Severity::Error),
    (workflow::NO_TERMINAL, "Has a terminal node", Severity::Error),
    (workflow::SPLIT_BRANCHES, "Splits have branches", Severity::Warning),
    (workflow::REQUIRED_FIELD, "Required data fields", Severity::Error),
];

fn is_built_in(id: &str) -> bool {
    BUILT_IN_RULES.iter().any(|(built_in, _, _)| *built_in == id)
}

/// Entities touched by a pending commit.
///
/// User node and connection rules only run against these, so an unrelated
/// pre-existing finding does not block every later edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitScope {
    /// Created or updated nodes.
    pub nodes: Vec<NodeId>,
    /// Created or updated connections.
    pub connections: Vec<ConnectionId>,
}

impl CommitScope {
    /// An empty scope (deletions, viewport-free structural commits).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope covering one node.
    #[must_use]
    pub fn node(id: NodeId) -> Self {
        Self {
            nodes: vec![id],
            connections: Vec::new(),
        }
    }

    /// A scope covering one connection.
    #[must_use]
    pub fn connection(id: ConnectionId) -> Self {
        Self {
            nodes: Vec::new(),
            connections: vec![id],
        }
    }
}

/// Runs built-in and user rules over a graph.
pub struct ValidationEngine {
    config: RwLock<ValidationConfig>,
    policy: RwLock<ConnectionPolicy>,
    registry: RwLock<NodeTypeRegistry>,
    rules: RwLock<IndexMap<String, ValidationRule>>,
}

impl fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("config", &*self.config.read())
            .field("rules", &self.rules.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(&CanvasConfig::default())
    }
}

impl ValidationEngine {
    /// Creates an engine with the built-in node types and no user rules.
    #[must_use]
    pub fn new(config: &CanvasConfig) -> Self {
        Self::with_registry(config, NodeTypeRegistry::with_defaults())
    }

    /// Creates an engine with a custom node type registry.
    #[must_use]
    pub fn with_registry(config: &CanvasConfig, registry: NodeTypeRegistry) -> Self {
        Self {
            config: RwLock::new(config.validation.clone()),
            policy: RwLock::new(config.connection.clone()),
            registry: RwLock::new(registry),
            rules: RwLock::new(IndexMap::new()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────────

    /// Current validation settings.
    #[must_use]
    pub fn config(&self) -> ValidationConfig {
        self.config.read().clone()
    }

    /// Replaces the validation settings.
    pub fn set_config(&self, config: ValidationConfig) {
        *self.config.write() = config;
    }

    /// Whether warnings block commits.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.config.read().strict
    }

    /// Toggles strict mode.
    pub fn set_strict(&self, strict: bool) {
        self.config.write().strict = strict;
    }

    /// Whether every commit is followed by a published full validation.
    #[must_use]
    pub fn is_real_time(&self) -> bool {
        self.config.read().real_time
    }

    /// Toggles real-time mode.
    pub fn set_real_time(&self, real_time: bool) {
        self.config.write().real_time = real_time;
    }

    /// Current connection policy.
    #[must_use]
    pub fn policy(&self) -> ConnectionPolicy {
        self.policy.read().clone()
    }

    /// Replaces the connection policy.
    pub fn set_policy(&self, policy: ConnectionPolicy) {
        *self.policy.write() = policy;
    }

    /// Resolved type configuration for `kind`.
    #[must_use]
    pub fn node_type(&self, kind: &NodeKind) -> NodeTypeConfig {
        self.registry.read().resolve(kind)
    }

    /// Registers or replaces a node type.
    pub fn register_node_type(&self, config: NodeTypeConfig) -> Option<NodeTypeConfig> {
        self.registry.write().register(config)
    }

    /// Removes a node type; its kind falls back to the generic entry.
    pub fn unregister_node_type(&self, kind: &NodeKind) -> Option<NodeTypeConfig> {
        self.registry.write().unregister(kind)
    }

    /// Registered node kinds.
    #[must_use]
    pub fn node_kinds(&self) -> Vec<NodeKind> {
        self.registry.read().kinds().cloned().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rule management
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a user rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::BuiltIn`] for a built-in id and
    /// [`RuleError::Duplicate`] if the id is taken.
    pub fn add_rule(&self, rule: ValidationRule) -> Result<(), RuleError> {
        if is_built_in(rule.id()) {
            return Err(RuleError::BuiltIn(rule.id().to_owned()));
        }
        let mut rules = self.rules.write();
        if rules.contains_key(rule.id()) {
            return Err(RuleError::Duplicate(rule.id().to_owned()));
        }
        tracing::debug!(rule = rule.id(), kind = ?rule.kind(), "validation rule added");
        rules.insert(rule.id().to_owned(), rule);
        Ok(())
    }

    /// Removes a user rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::BuiltIn`] for a built-in id and
    /// [`RuleError::NotFound`] for an unknown one.
    pub fn remove_rule(&self, id: &str) -> Result<ValidationRule, RuleError> {
        if is_built_in(id) {
            return Err(RuleError::BuiltIn(id.to_owned()));
        }
        self.rules
            .write()
            .shift_remove(id)
            .ok_or_else(|| RuleError::NotFound(id.to_owned()))
    }

    /// Re-enables a user rule.
    ///
    /// # Errors
    ///
    /// Same as [`remove_rule`](Self::remove_rule).
    pub fn enable_rule(&self, id: &str) -> Result<(), RuleError> {
        self.set_rule_enabled(id, true)
    }

    /// Disables a user rule without removing it.
    ///
    /// # Errors
    ///
    /// Same as [`remove_rule`](Self::remove_rule).
    pub fn disable_rule(&self, id: &str) -> Result<(), RuleError> {
        self.set_rule_enabled(id, false)
    }

    fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<(), RuleError> {
        if is_built_in(id) {
            return Err(RuleError::BuiltIn(id.to_owned()));
        }
        let mut rules = self.rules.write();
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| RuleError::NotFound(id.to_owned()))?;
        rule.set_enabled(enabled);
        Ok(())
    }

    /// Built-in and user rules, built-ins first.
    #[must_use]
    pub fn rules(&self) -> Vec<RuleInfo> {
        let built_ins = BUILT_IN_RULES.iter().map(|(id, name, severity)| RuleInfo {
            id: (*id).to_owned(),
            name: (*name).to_owned(),
            kind: RuleKind::Graph,
            severity: *severity,
            enabled: true,
            built_in: true,
        });
        let rules = self.rules.read();
        built_ins.chain(rules.values().map(RuleInfo::from)).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    fn structural(&self, graph: &Graph) -> ValidationResult {
        let policy = self.policy.read();
        let registry = self.registry.read();
        structural::check_graph(
            graph,
            StructuralContext {
                policy: &policy,
                registry: &registry,
            },
        )
        .into_iter()
        .map(structural::StructuralViolation::into_issue)
        .collect()
    }

    fn active_rules(&self) -> Vec<ValidationRule> {
        if !self.config.read().enabled {
            return Vec::new();
        }
        self.rules
            .read()
            .values()
            .filter(|rule| rule.is_enabled())
            .cloned()
            .collect()
    }

    /// Structural checks plus every enabled rule against every entity.
    #[must_use]
    pub fn validate_graph(&self, graph: &Graph) -> ValidationResult {
        let mut result = self.structural(graph);
        for rule in self.active_rules() {
            for node in graph.nodes.values() {
                result.extend(rule.check_node(node, graph));
            }
            for connection in graph.connections.values() {
                result.extend(rule.check_connection(connection, graph));
            }
            result.extend(rule.check_graph(graph));
        }
        tracing::debug!(
            nodes = graph.nodes.len(),
            connections = graph.connections.len(),
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "canvas validated"
        );
        result
    }

    /// Checks one node: its port limits, node and data rules, and required
    /// fields. Returns `None` if the node does not exist.
    #[must_use]
    pub fn validate_node(&self, graph: &Graph, id: &NodeId) -> Option<ValidationResult> {
        let node = graph.node(id)?;
        let mut result: ValidationResult = {
            let policy = self.policy.read();
            let registry = self.registry.read();
            let ctx = StructuralContext {
                policy: &policy,
                registry: &registry,
            };
            let mut issues: Vec<_> = structural::check_node(graph, node, ctx)
                .into_iter()
                .map(structural::StructuralViolation::into_issue)
                .collect();
            issues.extend(workflow::missing_fields(node, &registry));
            issues.into_iter().collect()
        };
        for rule in self.active_rules() {
            result.extend(rule.check_node(node, graph));
        }
        Some(result)
    }

    /// Checks one connection: endpoints, ports, policy and connection
    /// rules. Returns `None` if the connection does not exist.
    #[must_use]
    pub fn validate_connection(&self, graph: &Graph, id: &ConnectionId) -> Option<ValidationResult> {
        let connection = graph.connection(id)?;
        let mut result: ValidationResult = {
            let policy = self.policy.read();
            let registry = self.registry.read();
            structural::check_connection(
                graph,
                connection,
                StructuralContext {
                    policy: &policy,
                    registry: &registry,
                },
            )
            .into_iter()
            .map(structural::StructuralViolation::into_issue)
            .collect()
        };
        for rule in self.active_rules() {
            result.extend(rule.check_connection(connection, graph));
        }
        Some(result)
    }

    /// [`validate_graph`](Self::validate_graph) plus the workflow shape checks.
    #[must_use]
    pub fn validate_workflow(&self, graph: &Graph) -> ValidationResult {
        let mut result = self.validate_graph(graph);
        result.merge(workflow::check_workflow(graph, &self.registry.read()));
        result
    }

    /// Validation run by the store before committing a draft.
    ///
    /// Structural checks cover the whole draft; node, data and connection
    /// rules cover the entities in `scope`; graph rules always run.
    #[must_use]
    pub fn check_commit(&self, graph: &Graph, scope: &CommitScope) -> ValidationResult {
        let mut result = self.structural(graph);
        self.check_rules(graph, scope, &mut result);
        result
    }

    /// Validation run by the store for one batch item.
    ///
    /// Structural checks cover the entities in `scope` and the connections
    /// attached to its nodes rather than the whole draft. Rules run as in
    /// [`check_commit`](Self::check_commit).
    #[must_use]
    pub fn check_scope(&self, graph: &Graph, scope: &CommitScope) -> ValidationResult {
        let mut result: ValidationResult = {
            let policy = self.policy.read();
            let registry = self.registry.read();
            let ctx = StructuralContext {
                policy: &policy,
                registry: &registry,
            };
            let mut violations = Vec::new();
            let found = scope
                .nodes
                .iter()
                .filter_map(|id| graph.node(id))
                .flat_map(|node| structural::check_node_with_connections(graph, node, ctx))
                .chain(
                    scope
                        .connections
                        .iter()
                        .filter_map(|id| graph.connection(id))
                        .flat_map(|connection| structural::check_connection(graph, connection, ctx)),
                );
            for violation in found {
                if !violations.contains(&violation) {
                    violations.push(violation);
                }
            }
            violations
                .into_iter()
                .map(structural::StructuralViolation::into_issue)
                .collect()
        };
        self.check_rules(graph, scope, &mut result);
        result
    }

    /// Structural checks alone, over the whole graph.
    #[must_use]
    pub fn check_structure(&self, graph: &Graph) -> ValidationResult {
        self.structural(graph)
    }

    fn check_rules(&self, graph: &Graph, scope: &CommitScope, result: &mut ValidationResult) {
        for rule in self.active_rules() {
            for node in scope.nodes.iter().filter_map(|id| graph.node(id)) {
                result.extend(rule.check_node(node, graph));
            }
            for connection in scope.connections.iter().filter_map(|id| graph.connection(id)) {
                result.extend(rule.check_connection(connection, graph));
            }
            result.extend(rule.check_graph(graph));
        }
    }

    /// Publishes a finished run on `bus`: `validation:start`, then
    /// `validation:error` / `validation:warning` when there are findings,
    /// then `validation:end`.
    pub async fn publish(
        &self,
        bus: &EventBus,
        result: &ValidationResult,
        target_type: &str,
        target: Option<&str>,
    ) {
        let data = result.to_event_data(target_type, target);
        let emit = |kind: CanvasEventType| {
            CanvasEvent::new(kind, EventPayload::Validation(data.clone())).from_source("validation")
        };
        bus.emit(emit(CanvasEventType::ValidationStart)).await;
        if !result.errors.is_empty() {
            bus.emit(emit(CanvasEventType::ValidationError)).await;
        }
        if !result.warnings.is_empty() {
            bus.emit(emit(CanvasEventType::ValidationWarning)).await;
        }
        bus.emit(emit(CanvasEventType::ValidationEnd)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Connection, Node};

    fn graph() -> Graph {
        Graph::from_parts(
            [
                Node::new("s", NodeKind::Start, 0.0, 0.0),
                Node::new("a", NodeKind::Sms, 0.0, 100.0),
            ],
            [Connection::new("c1", "s", "a")],
        )
    }

    #[test]
    fn built_in_rules_cannot_be_removed_or_shadowed() {
        let engine = ValidationEngine::default();
        assert!(matches!(
            engine.remove_rule(STRUCTURAL_RULE),
            Err(RuleError::BuiltIn(id)) if id == STRUCTURAL_RULE
        ));
        assert!(matches!(
            engine.add_rule(ValidationRule::graph(workflow::UNREACHABLE, |_| true)),
            Err(RuleError::BuiltIn(_))
        ));
        assert!(engine.disable_rule(workflow::NO_TERMINAL).is_err());
    }

    #[test]
    fn duplicate_and_missing_rules_are_rejected() {
        let engine = ValidationEngine::default();
        engine
            .add_rule(ValidationRule::graph("g", |_| true))
            .expect("registration should succeed");
        assert_eq!(
            engine.add_rule(ValidationRule::graph("g", |_| true)),
            Err(RuleError::Duplicate("g".to_owned()))
        );
        assert_eq!(engine.enable_rule("nope"), Err(RuleError::NotFound("nope".to_owned())));
        assert!(engine.remove_rule("g").is_ok());
    }

    #[test]
    fn disabled_rules_do_not_run() {
        let engine = ValidationEngine::default();
        engine
            .add_rule(ValidationRule::node("labelled", |node, _| node.label.is_some()))
            .expect("registration should succeed");
        assert_eq!(engine.validate_graph(&graph()).errors.len(), 2);

        engine.disable_rule("labelled").expect("rule exists");
        assert!(engine.validate_graph(&graph()).valid);

        engine.enable_rule("labelled").expect("rule exists");
        let mut config = engine.config();
        config.enabled = false;
        engine.set_config(config);
        assert!(engine.validate_graph(&graph()).valid);
    }

    #[test]
    fn commit_check_scopes_entity_rules() {
        let engine = ValidationEngine::default();
        engine
            .add_rule(ValidationRule::node("labelled", |node, _| node.label.is_some()))
            .expect("registration should succeed");
        let result = engine.check_commit(&graph(), &CommitScope::node("a".into()));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].target.as_deref(), Some("a"));
        assert!(engine.check_commit(&graph(), &CommitScope::new()).valid);
    }

    #[test]
    fn single_entity_validation_returns_none_for_unknown_ids() {
        let engine = ValidationEngine::default();
        assert!(engine.validate_node(&graph(), &"ghost".into()).is_none());
        assert!(engine.validate_connection(&graph(), &"ghost".into()).is_none());
        assert!(engine
            .validate_connection(&graph(), &"c1".into())
            .is_some_and(|r| r.valid));
    }

    #[test]
    fn rules_lists_built_ins_first() {
        let engine = ValidationEngine::default();
        engine
            .add_rule(ValidationRule::graph("mine", |_| true))
            .expect("registration should succeed");
        let rules = engine.rules();
        assert!(rules[0].built_in);
        assert_eq!(rules.last().map(|r| r.id.as_str()), Some("mine"));
    }
}
