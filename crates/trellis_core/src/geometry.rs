//! Geometry primitives shared by nodes, the viewport and layouts.

use serde::{Deserialize, Serialize};

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    #[must_use]
    pub fn distance_to(&self, other: Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A width/height pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Size {
    /// Creates a new size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Clamps both dimensions into `[min, max]`.
    #[must_use]
    pub fn clamp(self, min: Size, max: Size) -> Self {
        Self {
            width: self.width.clamp(min.width, max.width.max(min.width)),
            height: self.height.clamp(min.height, max.height.max(min.height)),
        }
    }
}

/// An axis-aligned rectangle anchored at its top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Rectangle {
    /// Creates a new rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Position {
        Position::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Returns true if `other` lies entirely inside this rectangle (edges inclusive).
    #[must_use]
    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Returns true if the rectangles overlap. Touching edges do not count.
    #[must_use]
    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    /// Smallest rectangle enclosing both.
    #[must_use]
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rectangle::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    /// Bounding box of a set of rectangles, `None` when empty.
    pub fn enclosing<'a>(rects: impl IntoIterator<Item = &'a Rectangle>) -> Option<Rectangle> {
        rects
            .into_iter()
            .copied()
            .reduce(|acc, rect| acc.union(&rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_excludes_touching_edges() {
        let a = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rectangle::new(5.0, 5.0, 10.0, 10.0)));
        assert!(!a.intersects(&Rectangle::new(10.0, 0.0, 10.0, 10.0)));
        assert!(!a.intersects(&Rectangle::new(0.0, 20.0, 5.0, 5.0)));
    }

    #[test]
    fn contains_rect_is_edge_inclusive() {
        let outer = Rectangle::new(0.0, 0.0, 100.0, 100.0);
        assert!(outer.contains_rect(&Rectangle::new(0.0, 0.0, 100.0, 100.0)));
        assert!(outer.contains_rect(&Rectangle::new(10.0, 10.0, 20.0, 20.0)));
        assert!(!outer.contains_rect(&Rectangle::new(90.0, 90.0, 20.0, 20.0)));
    }

    #[test]
    fn enclosing_covers_all_rectangles() {
        let rects = [
            Rectangle::new(0.0, 0.0, 10.0, 10.0),
            Rectangle::new(50.0, -20.0, 10.0, 10.0),
        ];
        let bounds = Rectangle::enclosing(&rects).unwrap();
        assert_eq!(bounds, Rectangle::new(0.0, -20.0, 60.0, 30.0));
        let empty: [Rectangle; 0] = [];
        assert!(Rectangle::enclosing(&empty).is_none());
    }

    #[test]
    fn size_clamp_respects_bounds() {
        let size = Size::new(10.0, 500.0).clamp(Size::new(50.0, 50.0), Size::new(200.0, 200.0));
        assert_eq!(size, Size::new(50.0, 200.0));
    }
}
