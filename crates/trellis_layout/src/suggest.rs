//! Ranks layout algorithms by the shape of a graph.

use std::collections::VecDeque;

use hashbrown::HashMap;
use trellis_core::config::LayoutAlgorithm;
use trellis_core::{Graph, NodeId, NodeKind};

/// Shape facts that drive [`suggest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphShape {
    /// Number of nodes.
    pub nodes: usize,
    /// Number of connections.
    pub connections: usize,
    /// Whether the graph contains a directed cycle.
    pub cyclic: bool,
    /// Whether any node is a `start` node.
    pub has_start: bool,
}

impl GraphShape {
    /// Measures `graph`.
    #[must_use]
    pub fn of(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes.len(),
            connections: graph.connections.len(),
            cyclic: has_cycle(graph),
            has_start: graph.nodes.values().any(|node| node.kind == NodeKind::Start),
        }
    }

    fn is_dense(&self) -> bool {
        self.connections * 2 > self.nodes * 3
    }
}

/// Algorithms best suited to `graph`, best first. Empty for an empty graph.
///
/// Acyclic flows favour hierarchical layout; cyclic or dense graphs favour
/// force-directed; graphs without connections favour grid and circular.
#[must_use]
pub fn suggest(graph: &Graph) -> Vec<LayoutAlgorithm> {
    let shape = GraphShape::of(graph);
    if shape.nodes == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(LayoutAlgorithm, u8)> = [
        LayoutAlgorithm::Hierarchical,
        LayoutAlgorithm::Force,
        LayoutAlgorithm::Circular,
        LayoutAlgorithm::Grid,
    ]
    .into_iter()
    .map(|algorithm| (algorithm, score(algorithm, &shape)))
    .collect();
    // Stable: ties keep the declaration order above.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(algorithm, _)| algorithm).collect()
}

fn score(algorithm: LayoutAlgorithm, shape: &GraphShape) -> u8 {
    let linked = shape.connections > 0;
    match algorithm {
        LayoutAlgorithm::Hierarchical => match (linked, shape.cyclic) {
            (true, false) if shape.has_start => 10,
            (true, false) => 8,
            (true, true) => 4,
            (false, _) => 1,
        },
        LayoutAlgorithm::Force => match (linked, shape.cyclic || shape.is_dense()) {
            (true, true) => 9,
            (true, false) => 5,
            (false, _) => 0,
        },
        LayoutAlgorithm::Circular => {
            if shape.cyclic {
                6
            } else if linked {
                3
            } else {
                5
            }
        }
        LayoutAlgorithm::Grid => {
            if linked {
                2
            } else {
                7
            }
        }
    }
}

/// Kahn's algorithm: the graph is acyclic iff every node can be peeled off.
fn has_cycle(graph: &Graph) -> bool {
    let mut in_degree: HashMap<&NodeId, usize> = graph.nodes.keys().map(|id| (id, 0)).collect();
    for connection in graph.connections.values() {
        if graph.node(&connection.source).is_some()
            && let Some(degree) = in_degree.get_mut(&connection.target)
        {
            *degree += 1;
        }
    }
    let mut queue: VecDeque<&NodeId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut peeled = 0;
    while let Some(id) = queue.pop_front() {
        peeled += 1;
        for connection in graph.outgoing(id) {
            if let Some(degree) = in_degree.get_mut(&connection.target) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(&connection.target);
                }
            }
        }
    }
    peeled < graph.nodes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Connection, Node};

    fn graph(ids: &[&str], edges: &[(&str, &str)], start: bool) -> Graph {
        Graph::from_parts(
            ids.iter().enumerate().map(|(i, id)| {
                let kind = if start && i == 0 { NodeKind::Start } else { NodeKind::Sms };
                Node::new(*id, kind, 0.0, 0.0)
            }),
            edges
                .iter()
                .enumerate()
                .map(|(i, (s, t))| Connection::new(format!("c{i}"), *s, *t)),
        )
    }

    #[test]
    fn flows_prefer_hierarchical() {
        let g = graph(&["s", "a", "b"], &[("s", "a"), ("a", "b")], true);
        assert_eq!(suggest(&g)[0], LayoutAlgorithm::Hierarchical);
    }

    #[test]
    fn cycles_prefer_force() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")], false);
        assert!(GraphShape::of(&g).cyclic);
        assert_eq!(suggest(&g)[0], LayoutAlgorithm::Force);
    }

    #[test]
    fn unlinked_nodes_prefer_grid() {
        let g = graph(&["a", "b"], &[], false);
        assert_eq!(suggest(&g), vec![
            LayoutAlgorithm::Grid,
            LayoutAlgorithm::Circular,
            LayoutAlgorithm::Hierarchical,
            LayoutAlgorithm::Force,
        ]);
    }

    #[test]
    fn empty_graph_has_no_suggestions() {
        assert!(suggest(&Graph::new()).is_empty());
    }
}
