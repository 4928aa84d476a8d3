//! Marketing-flow shape checks.
//!
//! A runnable flow has exactly one `start` node with nothing flowing into
//! it, every node reachable from it, at least one terminal node, and splits
//! with at least two branches. Kinds may also declare required data fields
//! through the node type registry.

use std::collections::VecDeque;

use hashbrown::HashSet;
use serde_json::Value;
use trellis_core::registry::NodeTypeRegistry;
use trellis_core::{Graph, Node, NodeId, NodeKind};

use crate::report::{Severity, ValidationIssue, ValidationResult};

/// Rule id: exactly one start node.
pub const START_COUNT: &str = "workflow.start-count";
/// Rule id: nothing flows into the start node.
pub const START_INCOMING: &str = "workflow.start-incoming";
/// Rule id: every node is reachable from the start node.
pub const UNREACHABLE: &str = "workflow.unreachable";
/// Rule id: the flow has an end.
pub const NO_TERMINAL: &str = "workflow.no-terminal";
/// Rule id: splits have at least two branches.
pub const SPLIT_BRANCHES: &str = "workflow.split-branches";
/// Rule id: registry-declared data fields are present.
pub const REQUIRED_FIELD: &str = "workflow.required-field";

/// Runs every workflow check.
#[must_use]
pub fn check_workflow(graph: &Graph, registry: &NodeTypeRegistry) -> ValidationResult {
    let mut result = ValidationResult::new();
    if graph.nodes.is_empty() {
        result.push(ValidationIssue::new(
            START_COUNT,
            START_COUNT,
            "type",
            "workflow has no start node",
        ));
        return result;
    }

    let starts: Vec<&NodeId> = graph
        .nodes
        .values()
        .filter(|node| node.kind == NodeKind::Start)
        .map(|node| &node.id)
        .collect();
    match starts.len() {
        0 => result.push(ValidationIssue::new(
            START_COUNT,
            START_COUNT,
            "type",
            "workflow has no start node",
        )),
        1 => {}
        n => result.push(ValidationIssue::new(
            START_COUNT,
            START_COUNT,
            "type",
            format!("workflow has {n} start nodes, expected one"),
        )),
    }

    for start in &starts {
        if graph.incoming(start).next().is_some() {
            result.push(
                ValidationIssue::new(
                    START_INCOMING,
                    START_INCOMING,
                    "targetId",
                    format!("start node '{start}' must not have incoming connections"),
                )
                .on(start.as_str()),
            );
        }
    }

    if !starts.is_empty() {
        let reached = reachable_from(graph, starts.iter().copied());
        for node in graph.nodes.values().filter(|node| !reached.contains(&node.id)) {
            result.push(
                ValidationIssue::new(
                    UNREACHABLE,
                    UNREACHABLE,
                    "id",
                    format!("node '{}' is not reachable from the start node", node.id),
                )
                .on(node.id.as_str()),
            );
        }
    }

    let has_terminal = graph
        .nodes
        .values()
        .any(|node| graph.outgoing(&node.id).next().is_none());
    if !has_terminal {
        result.push(ValidationIssue::new(
            NO_TERMINAL,
            NO_TERMINAL,
            "connections",
            "workflow has no terminal node",
        ));
    }

    for node in graph.nodes.values().filter(|node| node.kind.is_split()) {
        let branches = graph.outgoing(&node.id).count();
        if branches < 2 {
            result.push(
                ValidationIssue::new(
                    SPLIT_BRANCHES,
                    SPLIT_BRANCHES,
                    "connections",
                    format!("split node '{}' has {branches} branch(es), expected at least 2", node.id),
                )
                .with_severity(Severity::Warning)
                .on(node.id.as_str()),
            );
        }
    }

    for node in graph.nodes.values() {
        for issue in missing_fields(node, registry) {
            result.push(issue);
        }
    }
    result
}

/// Findings for registry-declared data fields missing on `node`.
#[must_use]
pub fn missing_fields(node: &Node, registry: &NodeTypeRegistry) -> Vec<ValidationIssue> {
    let Some(config) = registry.get(&node.kind) else {
        return Vec::new();
    };
    config
        .required_fields
        .iter()
        .filter(|field| match node.data.get(field.as_str()) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|field| {
            ValidationIssue::new(
                REQUIRED_FIELD,
                REQUIRED_FIELD,
                format!("data.{field}"),
                format!("{} node '{}' requires '{field}'", config.label, node.id),
            )
            .on(node.id.as_str())
        })
        .collect()
}

/// Breadth-first reachability with a visited set, so cycles terminate.
fn reachable_from<'a>(graph: &'a Graph, roots: impl Iterator<Item = &'a NodeId>) -> HashSet<NodeId> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for root in roots {
        if visited.insert(root.clone()) {
            queue.push_back(root.clone());
        }
    }
    while let Some(current) = queue.pop_front() {
        for connection in graph.outgoing(&current) {
            if graph.node(&connection.target).is_some() && visited.insert(connection.target.clone()) {
                queue.push_back(connection.target.clone());
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::registry::NodeTypeConfig;
    use trellis_core::Connection;

    fn flow(nodes: &[(&str, NodeKind)], edges: &[(&str, &str)]) -> Graph {
        Graph::from_parts(
            nodes.iter().map(|(id, kind)| Node::new(*id, kind.clone(), 0.0, 0.0)),
            edges
                .iter()
                .enumerate()
                .map(|(i, (s, t))| Connection::new(format!("c{i}"), *s, *t)),
        )
    }

    fn rules(result: &ValidationResult) -> Vec<&str> {
        result
            .errors
            .iter()
            .chain(&result.warnings)
            .map(|issue| issue.rule.as_str())
            .collect()
    }

    #[test]
    fn well_formed_flow_passes() {
        let graph = flow(
            &[
                ("s", NodeKind::Start),
                ("split", NodeKind::AudienceSplit),
                ("a", NodeKind::Sms),
                ("b", NodeKind::Wait),
            ],
            &[("s", "split"), ("split", "a"), ("split", "b")],
        );
        let result = check_workflow(&graph, &NodeTypeRegistry::with_defaults());
        assert!(result.is_empty(), "unexpected findings: {result:?}");
    }

    #[test]
    fn unreachable_nodes_and_lonely_splits_are_reported() {
        let graph = flow(
            &[
                ("s", NodeKind::Start),
                ("split", NodeKind::AbTest),
                ("a", NodeKind::Sms),
                ("island", NodeKind::Wait),
            ],
            &[("s", "split"), ("split", "a")],
        );
        let result = check_workflow(&graph, &NodeTypeRegistry::with_defaults());
        assert!(!result.valid);
        assert_eq!(rules(&result), vec![UNREACHABLE, SPLIT_BRANCHES]);
        assert_eq!(result.errors[0].target.as_deref(), Some("island"));
    }

    #[test]
    fn start_count_and_incoming_are_checked() {
        let graph = flow(
            &[("s1", NodeKind::Start), ("s2", NodeKind::Start), ("a", NodeKind::Sms)],
            &[("s1", "a"), ("a", "s2")],
        );
        let result = check_workflow(&graph, &NodeTypeRegistry::with_defaults());
        assert_eq!(rules(&result), vec![START_COUNT, START_INCOMING]);
    }

    #[test]
    fn cycles_without_terminal_are_errors_and_terminate() {
        let graph = flow(
            &[("s", NodeKind::Start), ("a", NodeKind::Sms), ("b", NodeKind::Wait)],
            &[("s", "a"), ("a", "b"), ("b", "a")],
        );
        let result = check_workflow(&graph, &NodeTypeRegistry::with_defaults());
        assert_eq!(rules(&result), vec![NO_TERMINAL]);
    }

    #[test]
    fn required_fields_come_from_registry() {
        let mut registry = NodeTypeRegistry::with_defaults();
        let mut sms = registry.resolve(&NodeKind::Sms);
        sms.required_fields = vec!["template".to_owned()];
        registry.register(sms);
        let mut custom = NodeTypeConfig::generic(NodeKind::Custom("hook".into()));
        custom.required_fields = vec!["url".to_owned()];
        registry.register(custom);

        let graph = flow(&[("s", NodeKind::Start), ("a", NodeKind::Sms)], &[("s", "a")]);
        let result = check_workflow(&graph, &registry);
        assert_eq!(rules(&result), vec![REQUIRED_FIELD]);
        assert_eq!(result.errors[0].field, "data.template");
    }

    #[test]
    fn empty_graph_has_no_start() {
        let result = check_workflow(&Graph::new(), &NodeTypeRegistry::with_defaults());
        assert_eq!(rules(&result), vec![START_COUNT]);
    }
}
