//! Built-in structural checks.
//!
//! These enforce the graph invariants every committed state must satisfy.
//! They always run and cannot be removed or disabled.
//!
//! # Checks
//!
//! ## Identity
//! - every node and connection id appears once
//!
//! ## Endpoints
//! - `source` and `target` resolve to live nodes
//! - both endpoints are connectable kinds
//! - self-loops and parallel connections only when the policy allows them
//! - the first matching [`ConnectionRule`](trellis_core::config::ConnectionRule) allows the pair
//!
//! ## Ports
//! - a named port exists on its node and faces the right way
//! - a port without `multiple` carries at most one connection
//! - a node stays within its kind's `max_connections`

use hashbrown::{HashMap, HashSet};
use thiserror::Error;
use trellis_core::config::ConnectionPolicy;
use trellis_core::node::PortDirection;
use trellis_core::registry::NodeTypeRegistry;
use trellis_core::{Connection, ConnectionId, ErrorCode, Graph, Node, NodeId, PortId, codes};

use crate::report::ValidationIssue;

/// Rule id reported on every structural finding.
pub const STRUCTURAL_RULE: &str = "structural";

/// A broken graph invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralViolation {
    /// Two nodes share an id.
    #[error("duplicate node id '{0}'")]
    DuplicateNode(NodeId),
    /// Two connections share an id.
    #[error("duplicate connection id '{0}'")]
    DuplicateConnection(ConnectionId),
    /// A connection's source does not exist.
    #[error("connection '{connection}' has missing source node '{node}'")]
    DanglingSource {
        /// The connection.
        connection: ConnectionId,
        /// The missing node.
        node: NodeId,
    },
    /// A connection's target does not exist.
    #[error("connection '{connection}' has missing target node '{node}'")]
    DanglingTarget {
        /// The connection.
        connection: ConnectionId,
        /// The missing node.
        node: NodeId,
    },
    /// A connection names a port its node does not have.
    #[error("connection '{connection}' references unknown port '{port}' on node '{node}'")]
    UnknownPort {
        /// The connection.
        connection: ConnectionId,
        /// The node.
        node: NodeId,
        /// The missing port.
        port: PortId,
    },
    /// A connection leaves through an input or enters through an output.
    #[error("connection '{connection}' uses port '{port}' on node '{node}' in the wrong direction")]
    PortDirection {
        /// The connection.
        connection: ConnectionId,
        /// The node.
        node: NodeId,
        /// The misused port.
        port: PortId,
    },
    /// A single-connection port carries more than one connection.
    #[error("port '{port}' on node '{node}' accepts one connection but has {count}")]
    PortCapacity {
        /// The node.
        node: NodeId,
        /// The port.
        port: PortId,
        /// Connections attached.
        count: usize,
    },
    /// A node connects to itself while self-loops are disabled.
    #[error("connection '{connection}' loops back to node '{node}'")]
    SelfLoop {
        /// The connection.
        connection: ConnectionId,
        /// The node.
        node: NodeId,
    },
    /// Two connections join the same endpoints while multi-edges are disabled.
    #[error("connection '{connection}' duplicates connection '{existing}'")]
    MultiEdge {
        /// The later connection.
        connection: ConnectionId,
        /// The earlier connection with the same endpoints.
        existing: ConnectionId,
    },
    /// A connection rule forbids the pair of kinds.
    #[error("connection '{connection}' denied: {message}")]
    RuleDenied {
        /// The connection.
        connection: ConnectionId,
        /// Message of the deciding rule.
        message: String,
    },
    /// The node's kind does not accept connections.
    #[error("node '{node}' does not accept connections")]
    NotConnectable {
        /// The connection.
        connection: ConnectionId,
        /// The node.
        node: NodeId,
    },
    /// A node carries more connections than its kind allows.
    #[error("node '{node}' has {count} connections, limit is {limit}")]
    ConnectionLimit {
        /// The node.
        node: NodeId,
        /// Configured limit.
        limit: usize,
        /// Connections attached.
        count: usize,
    },
}

impl ErrorCode for StructuralViolation {
    fn code(&self) -> &'static str {
        match self {
            StructuralViolation::DuplicateNode(_) => codes::DUPLICATE_NODE_ID,
            StructuralViolation::DuplicateConnection(_) => codes::DUPLICATE_CONNECTION_ID,
            StructuralViolation::DanglingSource { .. } | StructuralViolation::DanglingTarget { .. } => {
                "DANGLING_CONNECTION"
            }
            StructuralViolation::UnknownPort { .. } => "UNKNOWN_PORT",
            StructuralViolation::PortDirection { .. } => "PORT_DIRECTION",
            StructuralViolation::PortCapacity { .. } => "PORT_CAPACITY",
            StructuralViolation::SelfLoop { .. } => "SELF_LOOP",
            StructuralViolation::MultiEdge { .. } => "MULTI_EDGE",
            StructuralViolation::RuleDenied { .. } => "CONNECTION_DENIED",
            StructuralViolation::NotConnectable { .. } => "NOT_CONNECTABLE",
            StructuralViolation::ConnectionLimit { .. } => "CONNECTION_LIMIT",
        }
    }
}

impl StructuralViolation {
    /// Id of the entity at fault.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            StructuralViolation::DuplicateNode(node)
            | StructuralViolation::PortCapacity { node, .. }
            | StructuralViolation::ConnectionLimit { node, .. } => node.to_string(),
            StructuralViolation::DuplicateConnection(connection)
            | StructuralViolation::DanglingSource { connection, .. }
            | StructuralViolation::DanglingTarget { connection, .. }
            | StructuralViolation::UnknownPort { connection, .. }
            | StructuralViolation::PortDirection { connection, .. }
            | StructuralViolation::SelfLoop { connection, .. }
            | StructuralViolation::MultiEdge { connection, .. }
            | StructuralViolation::RuleDenied { connection, .. }
            | StructuralViolation::NotConnectable { connection, .. } => connection.to_string(),
        }
    }

    /// Field at fault, in wire naming.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            StructuralViolation::DuplicateNode(_) | StructuralViolation::DuplicateConnection(_) => "id",
            StructuralViolation::DanglingSource { .. } => "sourceId",
            StructuralViolation::DanglingTarget { .. }
            | StructuralViolation::SelfLoop { .. }
            | StructuralViolation::MultiEdge { .. }
            | StructuralViolation::RuleDenied { .. }
            | StructuralViolation::NotConnectable { .. } => "targetId",
            StructuralViolation::UnknownPort { .. } | StructuralViolation::PortDirection { .. } => {
                "portId"
            }
            StructuralViolation::PortCapacity { .. } => "ports",
            StructuralViolation::ConnectionLimit { .. } => "connections",
        }
    }

    /// Converts into a reportable finding.
    #[must_use]
    pub fn into_issue(self) -> ValidationIssue {
        ValidationIssue::new(STRUCTURAL_RULE, self.code(), self.field(), self.to_string())
            .on(self.target())
    }
}

/// Inputs the structural checks depend on.
#[derive(Debug, Clone, Copy)]
pub struct StructuralContext<'a> {
    /// Self-loop, multi-edge and kind rules.
    pub policy: &'a ConnectionPolicy,
    /// Per-kind limits.
    pub registry: &'a NodeTypeRegistry,
}

/// Checks the whole graph.
#[must_use]
pub fn check_graph(graph: &Graph, ctx: StructuralContext<'_>) -> Vec<StructuralViolation> {
    let mut violations = Vec::new();

    let mut seen_nodes = HashSet::new();
    for node in graph.nodes.values() {
        if !seen_nodes.insert(&node.id) {
            violations.push(StructuralViolation::DuplicateNode(node.id.clone()));
        }
    }
    let mut seen_connections = HashSet::new();
    for connection in graph.connections.values() {
        if !seen_connections.insert(&connection.id) {
            violations.push(StructuralViolation::DuplicateConnection(connection.id.clone()));
        }
    }

    let mut endpoints: HashMap<(&NodeId, &NodeId), &ConnectionId> = HashMap::new();
    for connection in graph.connections.values() {
        check_endpoints(graph, connection, ctx, &mut violations);
        if !ctx.policy.allow_multi_edges && !connection.is_self_loop() {
            let key = (&connection.source, &connection.target);
            if let Some(existing) = endpoints.get(&key) {
                violations.push(StructuralViolation::MultiEdge {
                    connection: connection.id.clone(),
                    existing: (*existing).clone(),
                });
            } else {
                endpoints.insert(key, &connection.id);
            }
        }
    }

    let usage = Usage::count(graph.connections.values());
    for node in graph.nodes.values() {
        check_node_capacity(node, &usage, ctx, &mut violations);
    }
    violations
}

/// Checks a single connection against the graph it lives in.
#[must_use]
pub fn check_connection(
    graph: &Graph,
    connection: &Connection,
    ctx: StructuralContext<'_>,
) -> Vec<StructuralViolation> {
    let mut violations = Vec::new();
    check_endpoints(graph, connection, ctx, &mut violations);
    if !ctx.policy.allow_multi_edges
        && !connection.is_self_loop()
        && let Some(existing) = graph.connections.values().find(|other| {
            other.id != connection.id
                && other.source == connection.source
                && other.target == connection.target
        })
    {
        violations.push(StructuralViolation::MultiEdge {
            connection: connection.id.clone(),
            existing: existing.id.clone(),
        });
    }
    let usage = Usage::count(
        graph
            .connections
            .values()
            .filter(|other| other.touches(&connection.source) || other.touches(&connection.target)),
    );
    for node_id in [&connection.source, &connection.target] {
        if let Some(node) = graph.node(node_id) {
            check_node_capacity(node, &usage, ctx, &mut violations);
        }
        if connection.is_self_loop() {
            break;
        }
    }
    violations
}

/// Checks a single node's port and connection limits.
#[must_use]
pub fn check_node(graph: &Graph, node: &Node, ctx: StructuralContext<'_>) -> Vec<StructuralViolation> {
    let mut violations = Vec::new();
    let usage = Usage::count(graph.connections.values().filter(|c| c.touches(&node.id)));
    check_node_capacity(node, &usage, ctx, &mut violations);
    violations
}

/// Checks a node together with every connection attached to it.
///
/// A node edit can change its kind or ports, which affects the endpoint
/// checks of its connections as well as its own limits.
#[must_use]
pub fn check_node_with_connections(
    graph: &Graph,
    node: &Node,
    ctx: StructuralContext<'_>,
) -> Vec<StructuralViolation> {
    let mut violations = Vec::new();
    let attached: Vec<&Connection> = graph.connections.values().filter(|c| c.touches(&node.id)).collect();
    for connection in &attached {
        check_endpoints(graph, connection, ctx, &mut violations);
    }
    let usage = Usage::count(attached);
    check_node_capacity(node, &usage, ctx, &mut violations);
    violations
}

/// Connection counts per node and per named port.
#[derive(Debug, Default)]
struct Usage<'g> {
    nodes: HashMap<&'g NodeId, usize>,
    ports: HashMap<(&'g NodeId, &'g PortId), usize>,
}

impl<'g> Usage<'g> {
    fn count(connections: impl IntoIterator<Item = &'g Connection>) -> Self {
        let mut usage = Self::default();
        for connection in connections {
            *usage.nodes.entry(&connection.source).or_default() += 1;
            if !connection.is_self_loop() {
                *usage.nodes.entry(&connection.target).or_default() += 1;
            }
            let source_port = connection.source_port.as_ref().map(|port| (&connection.source, port));
            let target_port = connection.target_port.as_ref().map(|port| (&connection.target, port));
            if let Some(key) = source_port {
                *usage.ports.entry(key).or_default() += 1;
            }
            if let Some(key) = target_port
                && Some(key) != source_port
            {
                *usage.ports.entry(key).or_default() += 1;
            }
        }
        usage
    }

    fn node(&self, id: &NodeId) -> usize {
        self.nodes.get(id).copied().unwrap_or(0)
    }

    fn port(&self, node: &NodeId, port: &PortId) -> usize {
        self.ports.get(&(node, port)).copied().unwrap_or(0)
    }
}

fn check_endpoints(
    graph: &Graph,
    connection: &Connection,
    ctx: StructuralContext<'_>,
    violations: &mut Vec<StructuralViolation>,
) {
    let source = graph.node(&connection.source);
    let target = graph.node(&connection.target);
    if source.is_none() {
        violations.push(StructuralViolation::DanglingSource {
            connection: connection.id.clone(),
            node: connection.source.clone(),
        });
    }
    if target.is_none() {
        violations.push(StructuralViolation::DanglingTarget {
            connection: connection.id.clone(),
            node: connection.target.clone(),
        });
    }

    if connection.is_self_loop() && !ctx.policy.allow_self_loops {
        violations.push(StructuralViolation::SelfLoop {
            connection: connection.id.clone(),
            node: connection.source.clone(),
        });
    }

    for (node, port, expected) in [
        (source, connection.source_port.as_ref(), PortDirection::Output),
        (target, connection.target_port.as_ref(), PortDirection::Input),
    ] {
        let Some(node) = node else { continue };
        if !ctx.registry.resolve(&node.kind).connectable {
            violations.push(StructuralViolation::NotConnectable {
                connection: connection.id.clone(),
                node: node.id.clone(),
            });
        }
        let Some(port_id) = port else { continue };
        match node.port(port_id) {
            None => violations.push(StructuralViolation::UnknownPort {
                connection: connection.id.clone(),
                node: node.id.clone(),
                port: port_id.clone(),
            }),
            Some(port) if port.direction != expected => {
                violations.push(StructuralViolation::PortDirection {
                    connection: connection.id.clone(),
                    node: node.id.clone(),
                    port: port_id.clone(),
                });
            }
            Some(_) => {}
        }
    }

    if let (Some(source), Some(target)) = (source, target)
        && let Some(message) = ctx.policy.denial(
            &source.kind,
            &target.kind,
            connection.source_port.as_ref(),
            connection.target_port.as_ref(),
        )
    {
        violations.push(StructuralViolation::RuleDenied {
            connection: connection.id.clone(),
            message,
        });
    }
}

fn check_node_capacity(
    node: &Node,
    usage: &Usage<'_>,
    ctx: StructuralContext<'_>,
    violations: &mut Vec<StructuralViolation>,
) {
    for port in node.ports.iter().filter(|port| !port.multiple) {
        let count = usage.port(&node.id, &port.id);
        if count > 1 {
            violations.push(StructuralViolation::PortCapacity {
                node: node.id.clone(),
                port: port.id.clone(),
                count,
            });
        }
    }
    if let Some(limit) = ctx.registry.resolve(&node.kind).max_connections {
        let count = usage.node(&node.id);
        if count > limit {
            violations.push(StructuralViolation::ConnectionLimit {
                node: node.id.clone(),
                limit,
                count,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::config::ConnectionRule;
    use trellis_core::{NodeKind, Port};

    fn ctx<'a>(policy: &'a ConnectionPolicy, registry: &'a NodeTypeRegistry) -> StructuralContext<'a> {
        StructuralContext { policy, registry }
    }

    fn node(id: &str, kind: NodeKind) -> Node {
        let mut node = Node::new(id, kind, 0.0, 0.0);
        node.ports = vec![Port::input("in").multiple(), Port::output("out")];
        node
    }

    #[test]
    fn dangling_endpoints_are_reported() {
        let graph = Graph::from_parts([node("a", NodeKind::Sms)], [Connection::new("c1", "a", "ghost")]);
        let policy = ConnectionPolicy::default();
        let registry = NodeTypeRegistry::with_defaults();
        let violations = check_graph(&graph, ctx(&policy, &registry));
        assert_eq!(
            violations,
            vec![StructuralViolation::DanglingTarget {
                connection: "c1".into(),
                node: "ghost".into(),
            }]
        );
        assert_eq!(violations[0].code(), "DANGLING_CONNECTION");
    }

    #[test]
    fn single_port_capacity_is_enforced() {
        let mut first = Connection::new("c1", "a", "b");
        first.source_port = Some("out".into());
        let mut second = Connection::new("c2", "a", "c");
        second.source_port = Some("out".into());
        let graph = Graph::from_parts(
            [node("a", NodeKind::Sms), node("b", NodeKind::Wait), node("c", NodeKind::Wait)],
            [first, second],
        );
        let policy = ConnectionPolicy::default();
        let registry = NodeTypeRegistry::with_defaults();
        let violations = check_graph(&graph, ctx(&policy, &registry));
        assert!(matches!(
            violations.as_slice(),
            [StructuralViolation::PortCapacity { count: 2, .. }]
        ));
    }

    #[test]
    fn port_direction_and_existence_are_checked() {
        let mut wrong_way = Connection::new("c1", "a", "b");
        wrong_way.source_port = Some("in".into());
        wrong_way.target_port = Some("nope".into());
        let graph = Graph::from_parts([node("a", NodeKind::Sms), node("b", NodeKind::Wait)], [wrong_way]);
        let policy = ConnectionPolicy::default();
        let registry = NodeTypeRegistry::with_defaults();
        let codes: Vec<&str> = check_graph(&graph, ctx(&policy, &registry))
            .iter()
            .map(ErrorCode::code)
            .collect();
        assert_eq!(codes, vec!["PORT_DIRECTION", "UNKNOWN_PORT"]);
    }

    #[test]
    fn self_loops_and_multi_edges_follow_policy() {
        let graph = Graph::from_parts(
            [node("a", NodeKind::Sms), node("b", NodeKind::Wait)],
            [
                Connection::new("loop", "a", "a"),
                Connection::new("c1", "a", "b"),
                Connection::new("c2", "a", "b"),
            ],
        );
        let registry = NodeTypeRegistry::with_defaults();
        let strict = ConnectionPolicy::default();
        assert_eq!(check_graph(&graph, ctx(&strict, &registry)).len(), 2);

        let lenient = ConnectionPolicy {
            allow_self_loops: true,
            allow_multi_edges: true,
            rules: Vec::new(),
        };
        assert!(check_graph(&graph, ctx(&lenient, &registry)).is_empty());
    }

    #[test]
    fn connection_rules_can_deny_kinds() {
        let graph = Graph::from_parts(
            [node("a", NodeKind::Wait), node("b", NodeKind::Start)],
            [Connection::new("c1", "a", "b")],
        );
        let policy = ConnectionPolicy {
            rules: vec![ConnectionRule::deny("*", "start").with_message("nothing may enter start")],
            ..ConnectionPolicy::default()
        };
        let registry = NodeTypeRegistry::with_defaults();
        let violations = check_graph(&graph, ctx(&policy, &registry));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("nothing may enter start"));
        let issue = violations[0].clone().into_issue();
        assert_eq!(issue.target.as_deref(), Some("c1"));
        assert_eq!(issue.rule, STRUCTURAL_RULE);
    }

    #[test]
    fn node_checks_cover_attached_connections() {
        let mut first = Connection::new("c1", "a", "b");
        first.source_port = Some("out".into());
        let mut a = node("a", NodeKind::Sms);
        a.ports = vec![Port::input("out")];
        let graph = Graph::from_parts([a.clone(), node("b", NodeKind::Wait)], [first]);
        let policy = ConnectionPolicy::default();
        let registry = NodeTypeRegistry::with_defaults();

        assert!(check_node(&graph, &a, ctx(&policy, &registry)).is_empty());
        let codes: Vec<&str> = check_node_with_connections(&graph, &a, ctx(&policy, &registry))
            .iter()
            .map(ErrorCode::code)
            .collect();
        assert_eq!(codes, vec!["PORT_DIRECTION"]);
    }

    #[test]
    fn single_connection_check_counts_shared_ports() {
        let mut first = Connection::new("c1", "a", "b");
        first.source_port = Some("out".into());
        let mut second = Connection::new("c2", "a", "c");
        second.source_port = Some("out".into());
        let graph = Graph::from_parts(
            [node("a", NodeKind::Sms), node("b", NodeKind::Wait), node("c", NodeKind::Wait)],
            [first, second.clone()],
        );
        let policy = ConnectionPolicy::default();
        let registry = NodeTypeRegistry::with_defaults();
        assert!(matches!(
            check_connection(&graph, &second, ctx(&policy, &registry)).as_slice(),
            [StructuralViolation::PortCapacity { count: 2, .. }]
        ));
    }
}
