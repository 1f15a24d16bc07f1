// THEORY:
// A `Contour` is the boundary polygon of one colour-filtered region. It is produced
// by a detector from one frame, is immutable afterwards and dies at the end of the
// cycle. The geometric helpers here (area, perimeter, hull) are what the contour
// filter needs; the bounding box and centroid live in `candidate`.

use imageproc::geometry::{arc_length, convex_hull};
use imageproc::point::Point as ImagePoint;

/// An integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An ordered, closed sequence of boundary points.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Moves every point by `(dx, dy)`.
    pub fn translated(mut self, dx: i32, dy: i32) -> Self {
        for point in &mut self.points {
            point.x += dx;
            point.y += dy;
        }
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    /// Enclosed polygon area (shoelace formula), always non-negative.
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Closed arc length of the boundary.
    pub fn perimeter(&self) -> f64 {
        arc_length(&self.to_image_points(), true)
    }

    /// Area of the convex hull around the boundary points.
    pub fn hull_area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let points = self.to_image_points();
        let hull: Vec<Point> = convex_hull(points.as_slice())
            .into_iter()
            .map(|p| Point::new(p.x, p.y))
            .collect();
        polygon_area(&hull)
    }

    fn to_image_points(&self) -> Vec<ImagePoint<i32>> {
        self.points.iter().map(|p| ImagePoint::new(p.x, p.y)).collect()
    }
}

impl From<imageproc::contours::Contour<i32>> for Contour {
    fn from(contour: imageproc::contours::Contour<i32>) -> Self {
        Self::new(
            contour
                .points
                .into_iter()
                .map(|p| Point::new(p.x, p.y))
                .collect(),
        )
    }
}

fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area: i64 = 0;
    for (i, current) in points.iter().enumerate() {
        let next = &points[(i + 1) % points.len()];
        twice_area += current.x as i64 * next.y as i64 - next.x as i64 * current.y as i64;
    }
    (twice_area as f64 / 2.0).abs()
}
