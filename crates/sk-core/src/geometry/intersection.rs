//! Intersections between 2D primitives
//!
//! Segments are bounded: intersection points must lie on both segments.
//! Circles are full circles; restricting to an arc's sweep happens at the
//! curve level.

use glam::DVec2;

use super::perp;
use crate::constants::GEOMETRY_EPSILON;

/// Parametric slack at segment ends
const SEGMENT_SLACK: f64 = 1e-9;

/// A bounded line segment or a full circle in workplane coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Segment { a: DVec2, b: DVec2 },
    Circle { center: DVec2, radius: f64 },
}

impl Primitive {
    /// All intersection points with another primitive
    pub fn intersect(&self, other: &Primitive) -> Vec<DVec2> {
        match (*self, *other) {
            (Primitive::Segment { a, b }, Primitive::Segment { a: c, b: d }) => {
                segment_segment(a, b, c, d).into_iter().collect()
            }
            (Primitive::Segment { a, b }, Primitive::Circle { center, radius })
            | (Primitive::Circle { center, radius }, Primitive::Segment { a, b }) => {
                segment_circle(a, b, center, radius)
            }
            (
                Primitive::Circle {
                    center: c1,
                    radius: r1,
                },
                Primitive::Circle {
                    center: c2,
                    radius: r2,
                },
            ) => circle_circle(c1, r1, c2, r2),
        }
    }
}

/// Intersections between every pair of primitives, pair by pair
pub fn intersect_all(primitives: &[Primitive]) -> Vec<DVec2> {
    let mut points = Vec::new();
    for (i, first) in primitives.iter().enumerate() {
        for second in &primitives[i + 1..] {
            points.extend(first.intersect(second));
        }
    }
    points
}

/// Intersection of two bounded segments. Parallel segments never intersect.
pub fn segment_segment(a1: DVec2, a2: DVec2, b1: DVec2, b2: DVec2) -> Option<DVec2> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = r.perp_dot(s);
    if denom.abs() <= GEOMETRY_EPSILON * r.length() * s.length() || denom == 0.0 {
        return None;
    }
    let qp = b1 - a1;
    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;
    let range = -SEGMENT_SLACK..=1.0 + SEGMENT_SLACK;
    (range.contains(&t) && range.contains(&u)).then(|| a1 + r * t)
}

/// Intersections of a bounded segment with a circle
pub fn segment_circle(a: DVec2, b: DVec2, center: DVec2, radius: f64) -> Vec<DVec2> {
    let d = b - a;
    let f = a - center;
    let qa = d.dot(d);
    if qa < GEOMETRY_EPSILON {
        return Vec::new();
    }
    let qb = 2.0 * f.dot(d);
    let qc = f.dot(f) - radius * radius;
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return Vec::new();
    }

    let sq = disc.sqrt();
    let mut params = vec![(-qb - sq) / (2.0 * qa)];
    if sq > GEOMETRY_EPSILON {
        params.push((-qb + sq) / (2.0 * qa));
    }
    params
        .into_iter()
        .filter(|t| (-SEGMENT_SLACK..=1.0 + SEGMENT_SLACK).contains(t))
        .map(|t| a + d * t)
        .collect()
}

/// Intersections of two circles. Concentric circles never intersect.
pub fn circle_circle(c1: DVec2, r1: f64, c2: DVec2, r2: f64) -> Vec<DVec2> {
    let d = c2 - c1;
    let dist = d.length();
    if dist < GEOMETRY_EPSILON {
        return Vec::new();
    }
    let slack = 1e-9 * (r1 + r2).max(1.0);
    if dist > r1 + r2 + slack || dist < (r1 - r2).abs() - slack {
        return Vec::new();
    }

    let along = (r1 * r1 - r2 * r2 + dist * dist) / (2.0 * dist);
    let h = (r1 * r1 - along * along).max(0.0).sqrt();
    let mid = c1 + d * (along / dist);
    if h < GEOMETRY_EPSILON {
        return vec![mid];
    }
    let offset = perp(d) / dist * h;
    vec![mid + offset, mid - offset]
}
