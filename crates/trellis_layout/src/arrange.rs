//! Alignment, distribution and spacing over a chosen subset of nodes.
//!
//! These functions only ever return positions for the nodes they are given.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use trellis_core::Node;
use trellis_core::geometry::Rectangle;

use crate::algorithm::Positions;
use crate::error::LayoutError;

/// Edge or center to line nodes up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    /// Shared left edge.
    Left,
    /// Shared right edge.
    Right,
    /// Shared top edge.
    Top,
    /// Shared bottom edge.
    Bottom,
    /// Shared vertical center line (equal center x).
    CenterHorizontal,
    /// Shared horizontal center line (equal center y).
    CenterVertical,
}

impl Alignment {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Right => "right",
            Alignment::Top => "top",
            Alignment::Bottom => "bottom",
            Alignment::CenterHorizontal => "center-horizontal",
            Alignment::CenterVertical => "center-vertical",
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Alignment {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Alignment::Left),
            "right" => Ok(Alignment::Right),
            "top" => Ok(Alignment::Top),
            "bottom" => Ok(Alignment::Bottom),
            "center-horizontal" => Ok(Alignment::CenterHorizontal),
            "center-vertical" => Ok(Alignment::CenterVertical),
            other => Err(LayoutError::Unknown {
                kind: "alignment",
                name: other.to_owned(),
            }),
        }
    }
}

/// Axis to spread nodes along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Equal gaps left to right.
    Horizontal,
    /// Equal gaps top to bottom.
    Vertical,
}

impl Distribution {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Distribution::Horizontal => "horizontal",
            Distribution::Vertical => "vertical",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distribution {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "horizontal" => Ok(Distribution::Horizontal),
            "vertical" => Ok(Distribution::Vertical),
            other => Err(LayoutError::Unknown {
                kind: "distribution",
                name: other.to_owned(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────────────────────────

/// Lines `nodes` up against the matching edge (or center) of their
/// combined bounding box. Only the aligned coordinate changes.
#[must_use]
pub fn align(nodes: &[Node], alignment: Alignment) -> Positions {
    let rects: Vec<Rectangle> = nodes.iter().map(Node::bounds).collect();
    let Some(bounds) = Rectangle::enclosing(&rects) else {
        return Positions::new();
    };
    let center = bounds.center();
    nodes
        .iter()
        .zip(&rects)
        .map(|(node, rect)| {
            let mut position = node.position();
            match alignment {
                Alignment::Left => position.x = bounds.x,
                Alignment::Right => position.x = bounds.right() - rect.width,
                Alignment::Top => position.y = bounds.y,
                Alignment::Bottom => position.y = bounds.bottom() - rect.height,
                Alignment::CenterHorizontal => position.x = center.x - rect.width / 2.0,
                Alignment::CenterVertical => position.y = center.y - rect.height / 2.0,
            }
            (node.id.clone(), position)
        })
        .collect()
}

/// Spreads `nodes` so the gaps between neighbouring edges are equal. The
/// outermost two nodes stay put; fewer than three nodes is a no-op.
#[must_use]
pub fn distribute(nodes: &[Node], distribution: Distribution) -> Positions {
    if nodes.len() < 3 {
        return Positions::new();
    }
    let mut ordered: Vec<&Node> = nodes.iter().collect();
    let horizontal = distribution == Distribution::Horizontal;
    ordered.sort_by(|a, b| lead(a, horizontal).total_cmp(&lead(b, horizontal)));

    let first = ordered[0].bounds();
    let last = ordered[ordered.len() - 1].bounds();
    let (start, end) = if horizontal {
        (first.x, last.right())
    } else {
        (first.y, last.bottom())
    };
    let occupied: f64 = ordered.iter().map(|node| extent(node, horizontal)).sum();
    let gap = (end - start - occupied) / (ordered.len() - 1) as f64;
    place_in_sequence(&ordered, horizontal, start, gap)
}

/// Places `nodes` one after another along their dominant axis with exactly
/// `spacing` between neighbouring edges, starting from the first node.
///
/// # Errors
///
/// Returns [`LayoutError::InvalidArgument`] for a negative or non-finite
/// spacing.
pub fn adjust_spacing(nodes: &[Node], spacing: f64) -> Result<Positions, LayoutError> {
    if !spacing.is_finite() || spacing < 0.0 {
        return Err(LayoutError::InvalidArgument(format!(
            "spacing must be a non-negative number, got {spacing}"
        )));
    }
    if nodes.len() < 2 {
        return Ok(Positions::new());
    }
    let horizontal = spread(nodes, true) >= spread(nodes, false);
    let mut ordered: Vec<&Node> = nodes.iter().collect();
    ordered.sort_by(|a, b| lead(a, horizontal).total_cmp(&lead(b, horizontal)));
    let start = lead(ordered[0], horizontal);
    Ok(place_in_sequence(&ordered, horizontal, start, spacing))
}

fn place_in_sequence(ordered: &[&Node], horizontal: bool, start: f64, gap: f64) -> Positions {
    let mut cursor = start;
    ordered
        .iter()
        .map(|node| {
            let mut position = node.position();
            if horizontal {
                position.x = cursor;
            } else {
                position.y = cursor;
            }
            cursor += extent(node, horizontal) + gap;
            (node.id.clone(), position)
        })
        .collect()
}

fn lead(node: &Node, horizontal: bool) -> f64 {
    if horizontal { node.x } else { node.y }
}

fn extent(node: &Node, horizontal: bool) -> f64 {
    let size = node.size();
    if horizontal { size.width } else { size.height }
}

/// Distance between the extreme centers along one axis.
fn spread(nodes: &[Node], horizontal: bool) -> f64 {
    let centers = nodes.iter().map(|node| {
        let center = node.bounds().center();
        if horizontal { center.x } else { center.y }
    });
    let (min, max) = centers.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    });
    max - min
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{NodeId, NodeKind};

    fn node(id: &str, x: f64, y: f64) -> Node {
        Node::new(id, NodeKind::Sms, x, y)
    }

    #[test]
    fn align_left_moves_only_x() {
        let nodes = [node("a", 40.0, 0.0), node("b", 10.0, 200.0)];
        let positions = align(&nodes, Alignment::Left);
        assert_eq!(positions[&NodeId::from("a")].x, 10.0);
        assert_eq!(positions[&NodeId::from("a")].y, 0.0);
        assert_eq!(positions[&NodeId::from("b")].y, 200.0);
    }

    #[test]
    fn center_horizontal_shares_center_x() {
        let mut wide = node("w", 0.0, 0.0);
        wide.width = Some(300.0);
        let nodes = [wide, node("n", 500.0, 100.0)];
        let positions = align(&nodes, Alignment::CenterHorizontal);
        let w = positions[&NodeId::from("w")].x + 150.0;
        let n = positions[&NodeId::from("n")].x + 60.0;
        assert_eq!(w, n);
    }

    #[test]
    fn distribute_equalises_gaps() {
        let nodes = [node("a", 0.0, 0.0), node("b", 130.0, 0.0), node("c", 400.0, 0.0)];
        let positions = distribute(&nodes, Distribution::Horizontal);
        assert_eq!(positions[&NodeId::from("a")].x, 0.0);
        assert_eq!(positions[&NodeId::from("b")].x, 200.0);
        assert_eq!(positions[&NodeId::from("c")].x, 400.0);
    }

    #[test]
    fn distribute_needs_three_nodes() {
        let nodes = [node("a", 0.0, 0.0), node("b", 50.0, 0.0)];
        assert!(distribute(&nodes, Distribution::Vertical).is_empty());
    }

    #[test]
    fn adjust_spacing_follows_dominant_axis() {
        let nodes = [node("a", 0.0, 0.0), node("b", 0.0, 500.0), node("c", 10.0, 90.0)];
        let positions = adjust_spacing(&nodes, 20.0).expect("valid spacing");
        assert_eq!(positions[&NodeId::from("a")].y, 0.0);
        assert_eq!(positions[&NodeId::from("c")].y, 100.0);
        assert_eq!(positions[&NodeId::from("b")].y, 200.0);
        assert_eq!(positions[&NodeId::from("c")].x, 10.0);
    }

    #[test]
    fn negative_spacing_is_rejected() {
        assert!(adjust_spacing(&[node("a", 0.0, 0.0)], -1.0).is_err());
    }

    #[test]
    fn names_parse_and_display() {
        assert_eq!("center-vertical".parse::<Alignment>(), Ok(Alignment::CenterVertical));
        assert_eq!(Distribution::Horizontal.to_string(), "horizontal");
        assert!("diagonal".parse::<Distribution>().is_err());
    }
}
