//! Pure layout algorithms.
//!
//! Every function reads a [`Graph`] and returns target top-left positions
//! keyed by node id, in graph insertion order. Nothing here touches a store,
//! so the same input always yields the same output.

use std::collections::VecDeque;
use std::f64::consts::{PI, TAU};

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;
use trellis_core::config::{ForceConfig, GridConfig, LayoutAlignment, LayoutConfig};
use trellis_core::geometry::{Position, Rectangle, Size};
use trellis_core::{Graph, Node, NodeId, NodeKind};

/// Target top-left positions by node id.
pub type Positions = IndexMap<NodeId, Position>;

// ─────────────────────────────────────────────────────────────────────────────
// Layering
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Visit {
    id: NodeId,
    depth: usize,
    parent: Option<NodeId>,
}

/// Nodes a hierarchy grows from: every `start` node, or failing that every
/// node without incoming connections.
fn roots(graph: &Graph) -> Vec<NodeId> {
    let starts: Vec<NodeId> = graph
        .nodes
        .values()
        .filter(|node| node.kind == NodeKind::Start)
        .map(|node| node.id.clone())
        .collect();
    if !starts.is_empty() {
        return starts;
    }
    graph
        .nodes
        .keys()
        .filter(|id| graph.incoming(id).next().is_none())
        .cloned()
        .collect()
}

/// Breadth-first visit from the roots. Nodes left unvisited (cycles with no
/// entry, or islands) seed their own traversal in insertion order. A node
/// already visited is never re-entered, so cycles terminate.
fn breadth_first(graph: &Graph) -> Vec<Visit> {
    let mut visited: HashSet<NodeId> = HashSet::with_capacity(graph.nodes.len());
    let mut order = Vec::with_capacity(graph.nodes.len());
    let mut queue: VecDeque<Visit> = VecDeque::new();

    let seeds: Vec<NodeId> = roots(graph).into_iter().chain(graph.nodes.keys().cloned()).collect();
    for seed in seeds {
        if !visited.insert(seed.clone()) {
            continue;
        }
        queue.push_back(Visit {
            id: seed,
            depth: 0,
            parent: None,
        });
        while let Some(visit) = queue.pop_front() {
            for connection in graph.outgoing(&visit.id) {
                if graph.node(&connection.target).is_some() && visited.insert(connection.target.clone()) {
                    queue.push_back(Visit {
                        id: connection.target.clone(),
                        depth: visit.depth + 1,
                        parent: Some(visit.id.clone()),
                    });
                }
            }
            order.push(visit);
        }
    }
    order
}

/// Breadth-first depth of every node, in visit order.
#[must_use]
pub fn depths(graph: &Graph) -> IndexMap<NodeId, usize> {
    breadth_first(graph)
        .into_iter()
        .map(|visit| (visit.id, visit.depth))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Hierarchical
// ─────────────────────────────────────────────────────────────────────────────

/// Layers nodes by depth. Depth runs along the configured direction; each
/// layer is spread across the other axis, with an extra `spacing.branch` gap
/// wherever adjacent nodes have different parents.
#[must_use]
pub fn hierarchical(graph: &Graph, config: &LayoutConfig) -> Positions {
    let visits = breadth_first(graph);
    if visits.is_empty() {
        return Positions::new();
    }

    let cell = largest_size(graph);
    let horizontal = config.direction.is_horizontal();
    let (main_extent, cross_extent) = if horizontal {
        (cell.width, cell.height)
    } else {
        (cell.height, cell.width)
    };
    let main_step = main_extent + config.spacing.level;
    let cross_step = cross_extent + config.spacing.node;

    let mut layers: Vec<Vec<&Visit>> = Vec::new();
    for visit in &visits {
        if layers.len() <= visit.depth {
            layers.resize_with(visit.depth + 1, Vec::new);
        }
        layers[visit.depth].push(visit);
    }
    let offsets: Vec<Vec<f64>> = layers
        .iter()
        .map(|layer| cross_offsets(layer, cross_step, config.spacing.branch))
        .collect();
    let widest = offsets
        .iter()
        .filter_map(|layer| layer.last().copied())
        .fold(0.0, f64::max);

    let origin = top_left(graph);
    let last_layer = layers.len() - 1;
    let mut positions = Positions::with_capacity(visits.len());
    for (depth, (layer, offsets)) in layers.iter().zip(&offsets).enumerate() {
        let span = offsets.last().copied().unwrap_or(0.0);
        let shift = match config.alignment {
            LayoutAlignment::Start => 0.0,
            LayoutAlignment::Center => (widest - span) / 2.0,
            LayoutAlignment::End => widest - span,
        };
        let level = if config.direction.is_reversed() {
            last_layer - depth
        } else {
            depth
        };
        let main = level as f64 * main_step;
        for (visit, offset) in layer.iter().zip(offsets) {
            let Some(node) = graph.node(&visit.id) else {
                continue;
            };
            let size = node.size();
            let cross = shift + offset;
            let position = if horizontal {
                Position::new(
                    origin.x + main + (cell.width - size.width) / 2.0,
                    origin.y + cross + (cell.height - size.height) / 2.0,
                )
            } else {
                Position::new(
                    origin.x + cross + (cell.width - size.width) / 2.0,
                    origin.y + main + (cell.height - size.height) / 2.0,
                )
            };
            positions.insert(visit.id.clone(), position);
        }
    }
    sort_like(graph, positions)
}

fn cross_offsets(layer: &[&Visit], step: f64, branch: f64) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(layer.len());
    let mut cursor = 0.0;
    for (i, visit) in layer.iter().enumerate() {
        if i > 0 {
            cursor += step;
            if layer[i - 1].parent != visit.parent {
                cursor += branch;
            }
        }
        offsets.push(cursor);
    }
    offsets
}

// ─────────────────────────────────────────────────────────────────────────────
// Force-directed
// ─────────────────────────────────────────────────────────────────────────────

const MIN_DISTANCE: f64 = 1.0;
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Spring/repulsion relaxation starting from the current positions.
///
/// Every pair repels with `repulsion / d²`; every connection pulls its
/// endpoints by `attraction * (d - ideal_length)`. A node moves at most a
/// cooling step per iteration. Stops after `iterations` steps or once the
/// total displacement of a step drops below `convergence`.
#[must_use]
pub fn force(graph: &Graph, config: &ForceConfig) -> Positions {
    let ids: Vec<&NodeId> = graph.nodes.keys().collect();
    let count = ids.len();
    if count == 0 {
        return Positions::new();
    }
    let index: HashMap<&NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let sizes: Vec<Size> = graph.nodes.values().map(Node::size).collect();
    let mut centers: Vec<Position> = graph.nodes.values().map(|node| node.bounds().center()).collect();
    separate_coincident(&mut centers, config.ideal_length / 4.0);

    let springs: Vec<(usize, usize)> = graph
        .connections
        .values()
        .filter_map(|c| Some((*index.get(&c.source)?, *index.get(&c.target)?)))
        .filter(|(a, b)| a != b)
        .collect();

    let max_step = config.ideal_length.max(MIN_DISTANCE);
    let mut iterations = 0;
    for step in 0..config.iterations {
        iterations = step + 1;
        let mut forces = vec![(0.0_f64, 0.0_f64); count];
        for i in 0..count {
            for j in (i + 1)..count {
                let dx = centers[i].x - centers[j].x;
                let dy = centers[i].y - centers[j].y;
                let distance_sq = (dx * dx + dy * dy).max(MIN_DISTANCE);
                let distance = distance_sq.sqrt();
                let push = config.repulsion / distance_sq;
                let (fx, fy) = (dx / distance * push, dy / distance * push);
                forces[i].0 += fx;
                forces[i].1 += fy;
                forces[j].0 -= fx;
                forces[j].1 -= fy;
            }
        }
        for &(a, b) in &springs {
            let dx = centers[b].x - centers[a].x;
            let dy = centers[b].y - centers[a].y;
            let distance = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
            let pull = config.attraction * (distance - config.ideal_length);
            let (fx, fy) = (dx / distance * pull, dy / distance * pull);
            forces[a].0 += fx;
            forces[a].1 += fy;
            forces[b].0 -= fx;
            forces[b].1 -= fy;
        }

        let temperature = max_step * (1.0 - step as f64 / config.iterations as f64);
        let mut displacement = 0.0;
        for (center, (fx, fy)) in centers.iter_mut().zip(&forces) {
            let magnitude = (fx * fx + fy * fy).sqrt();
            if !magnitude.is_finite() || magnitude <= f64::EPSILON {
                continue;
            }
            let length = magnitude.min(temperature);
            center.x += fx / magnitude * length;
            center.y += fy / magnitude * length;
            displacement += length;
        }
        if displacement < config.convergence {
            break;
        }
    }
    tracing::debug!(nodes = count, iterations, "force layout settled");

    ids.into_iter()
        .zip(centers.into_iter().zip(sizes))
        .map(|(id, (center, size))| {
            (
                id.clone(),
                Position::new(center.x - size.width / 2.0, center.y - size.height / 2.0),
            )
        })
        .collect()
}

/// Fans out nodes that share a center so repulsion has a direction to push.
fn separate_coincident(centers: &mut [Position], radius: f64) {
    for i in 1..centers.len() {
        let (placed, rest) = centers.split_at_mut(i);
        let current = &mut rest[0];
        if placed.iter().any(|p| p.distance_to(*current) < MIN_DISTANCE) {
            let angle = i as f64 * GOLDEN_ANGLE;
            current.x += radius.max(MIN_DISTANCE) * angle.cos();
            current.y += radius.max(MIN_DISTANCE) * angle.sin();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Circular
// ─────────────────────────────────────────────────────────────────────────────

/// Places nodes on a circle around the current content center, clockwise
/// from twelve o'clock in insertion order. The radius is the smallest that
/// keeps neighbouring centers `max(width, height) + spacing.node` apart.
#[must_use]
pub fn circular(graph: &Graph, config: &LayoutConfig) -> Positions {
    let count = graph.nodes.len();
    if count == 0 {
        return Positions::new();
    }
    let cell = largest_size(graph);
    let chord = cell.width.max(cell.height) + config.spacing.node;
    let radius = if count == 1 {
        0.0
    } else {
        chord / (2.0 * (PI / count as f64).sin())
    };
    let center = graph
        .bounds()
        .as_ref()
        .map_or(Position::default(), Rectangle::center);

    graph
        .nodes
        .values()
        .enumerate()
        .map(|(i, node)| {
            let angle = -PI / 2.0 + TAU * i as f64 / count as f64;
            let size = node.size();
            (
                node.id.clone(),
                Position::new(
                    center.x + radius * angle.cos() - size.width / 2.0,
                    center.y + radius * angle.sin() - size.height / 2.0,
                ),
            )
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Grid
// ─────────────────────────────────────────────────────────────────────────────

/// Row-major grid in insertion (creation) order. Uses `grid_columns` when
/// set, otherwise `ceil(sqrt(n))` columns; positions snap to the canvas
/// grid when it is enabled.
#[must_use]
pub fn grid(graph: &Graph, config: &LayoutConfig, canvas_grid: &GridConfig) -> Positions {
    let count = graph.nodes.len();
    if count == 0 {
        return Positions::new();
    }
    let columns = config
        .grid_columns
        .filter(|columns| *columns > 0)
        .unwrap_or_else(|| (count as f64).sqrt().ceil() as usize)
        .max(1);
    let cell = largest_size(graph);
    let step_x = cell.width + config.spacing.node;
    let step_y = cell.height + config.spacing.node;
    let origin = top_left(graph);
    let snap = |value: f64| {
        if canvas_grid.enabled {
            canvas_grid.snap(value)
        } else {
            value
        }
    };

    graph
        .nodes
        .keys()
        .enumerate()
        .map(|(i, id)| {
            let (row, column) = (i / columns, i % columns);
            (
                id.clone(),
                Position::new(
                    snap(origin.x + column as f64 * step_x),
                    snap(origin.y + row as f64 * step_y),
                ),
            )
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Largest width and largest height over all nodes.
fn largest_size(graph: &Graph) -> Size {
    graph.nodes.values().map(Node::size).fold(Size::new(0.0, 0.0), |acc, size| {
        Size::new(acc.width.max(size.width), acc.height.max(size.height))
    })
}

fn top_left(graph: &Graph) -> Position {
    graph
        .bounds()
        .map_or(Position::new(0.0, 0.0), |bounds| Position::new(bounds.x, bounds.y))
}

/// Reorders `positions` to graph insertion order.
fn sort_like(graph: &Graph, mut positions: Positions) -> Positions {
    graph
        .nodes
        .keys()
        .filter_map(|id| positions.shift_remove_entry(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Connection;
    use trellis_core::config::LayoutDirection;

    fn flow(nodes: &[(&str, NodeKind)], edges: &[(&str, &str)]) -> Graph {
        Graph::from_parts(
            nodes.iter().map(|(id, kind)| Node::new(*id, kind.clone(), 0.0, 0.0)),
            edges
                .iter()
                .enumerate()
                .map(|(i, (s, t))| Connection::new(format!("c{i}"), *s, *t)),
        )
    }

    fn split_tree() -> Graph {
        flow(
            &[
                ("start", NodeKind::Start),
                ("splitA", NodeKind::AudienceSplit),
                ("leaf1", NodeKind::Sms),
                ("leaf2", NodeKind::Sms),
            ],
            &[("start", "splitA"), ("splitA", "leaf1"), ("splitA", "leaf2")],
        )
    }

    #[test]
    fn depths_follow_breadth_first_order() {
        let depths = depths(&split_tree());
        let values: Vec<usize> = depths.values().copied().collect();
        assert_eq!(values, vec![0, 1, 2, 2]);
    }

    #[test]
    fn cycles_terminate_and_visit_every_node_once() {
        let graph = flow(
            &[("a", NodeKind::Sms), ("b", NodeKind::Sms), ("c", NodeKind::Sms)],
            &[("a", "b"), ("b", "c"), ("c", "a")],
        );
        let depths = depths(&graph);
        assert_eq!(depths.len(), 3);
        assert_eq!(depths.get(&NodeId::from("a")), Some(&0));
        assert_eq!(depths.get(&NodeId::from("c")), Some(&2));
    }

    #[test]
    fn hierarchical_separates_siblings_by_node_spacing() {
        let config = LayoutConfig::default();
        let positions = hierarchical(&split_tree(), &config);
        let leaf1 = positions[&NodeId::from("leaf1")];
        let leaf2 = positions[&NodeId::from("leaf2")];
        assert_eq!(leaf1.y, leaf2.y);
        assert!((leaf2.x - leaf1.x).abs() >= config.spacing.node);
        assert!(positions[&NodeId::from("splitA")].y > positions[&NodeId::from("start")].y);
    }

    #[test]
    fn left_to_right_swaps_axes() {
        let config = LayoutConfig {
            direction: LayoutDirection::LeftToRight,
            ..LayoutConfig::default()
        };
        let positions = hierarchical(&split_tree(), &config);
        let leaf1 = positions[&NodeId::from("leaf1")];
        let leaf2 = positions[&NodeId::from("leaf2")];
        assert_eq!(leaf1.x, leaf2.x);
        assert!(positions[&NodeId::from("splitA")].x > positions[&NodeId::from("start")].x);
    }

    #[test]
    fn branch_gap_applies_between_cousins() {
        let graph = flow(
            &[
                ("r", NodeKind::Start),
                ("a", NodeKind::Sms),
                ("b", NodeKind::Sms),
                ("a1", NodeKind::Wait),
                ("b1", NodeKind::Wait),
            ],
            &[("r", "a"), ("r", "b"), ("a", "a1"), ("b", "b1")],
        );
        let config = LayoutConfig::default();
        let positions = hierarchical(&graph, &config);
        let siblings = positions[&NodeId::from("b")].x - positions[&NodeId::from("a")].x;
        let cousins = positions[&NodeId::from("b1")].x - positions[&NodeId::from("a1")].x;
        assert_eq!(cousins - siblings, config.spacing.branch);
    }

    #[test]
    fn force_is_deterministic_and_separates_stacked_nodes() {
        let graph = flow(
            &[("a", NodeKind::Sms), ("b", NodeKind::Sms), ("c", NodeKind::Sms)],
            &[("a", "b")],
        );
        let config = ForceConfig::default();
        let first = force(&graph, &config);
        assert_eq!(first, force(&graph, &config));
        let a = first[&NodeId::from("a")];
        let c = first[&NodeId::from("c")];
        assert!(a.distance_to(c) > 1.0);
        assert!(first.values().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn circular_keeps_neighbours_apart() {
        let graph = flow(
            &[("a", NodeKind::Sms), ("b", NodeKind::Sms), ("c", NodeKind::Sms), ("d", NodeKind::Sms)],
            &[],
        );
        let config = LayoutConfig::default();
        let positions = circular(&graph, &config);
        let points: Vec<Position> = positions.values().copied().collect();
        for pair in points.windows(2) {
            assert!(pair[0].distance_to(pair[1]) + 1e-9 >= 120.0 + config.spacing.node);
        }
        // First node sits at twelve o'clock.
        assert!(points[0].y < points[1].y);
    }

    #[test]
    fn grid_uses_square_columns_and_snaps() {
        let graph = flow(
            &[
                ("a", NodeKind::Sms),
                ("b", NodeKind::Sms),
                ("c", NodeKind::Sms),
                ("d", NodeKind::Sms),
                ("e", NodeKind::Sms),
            ],
            &[],
        );
        let positions = grid(&graph, &LayoutConfig::default(), &GridConfig::default());
        let rows: Vec<f64> = positions.values().map(|p| p.y).collect();
        assert_eq!(rows[0], rows[2]);
        assert!(rows[3] > rows[2]);
        assert!(positions.values().all(|p| p.x % 20.0 == 0.0 && p.y % 20.0 == 0.0));
    }
}
