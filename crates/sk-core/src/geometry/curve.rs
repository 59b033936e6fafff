//! Resolved 2D curves
//!
//! A [`Curve2D`] is a snapshot of a line, arc or circle in workplane
//! coordinates, detached from the scene so that queries don't borrow it.

use std::f64::consts::TAU;

use glam::DVec2;

use super::intersection::Primitive;
use super::{perp, round_v, signed_angle};
use crate::constants::{ENDPOINT_PRECISION, GEOMETRY_EPSILON};

/// One of the two stored endpoints of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    P1,
    P2,
}

/// A 2D line, arc or circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve2D {
    Line {
        p1: DVec2,
        p2: DVec2,
    },
    /// Counter-clockwise from `p1` to `p2`, or from `p2` to `p1` when inverted
    Arc {
        center: DVec2,
        p1: DVec2,
        p2: DVec2,
        invert: bool,
    },
    Circle {
        center: DVec2,
        radius: f64,
    },
}

fn angle_of(v: DVec2) -> f64 {
    v.y.atan2(v.x)
}

/// Counter-clockwise sweep from angle `from` to angle `to`, in `[0, TAU)`
fn ccw_sweep(from: f64, to: f64) -> f64 {
    (to - from).rem_euclid(TAU)
}

impl Curve2D {
    pub fn radius(&self) -> Option<f64> {
        match *self {
            Curve2D::Line { .. } => None,
            Curve2D::Arc { center, p1, .. } => Some(p1.distance(center)),
            Curve2D::Circle { radius, .. } => Some(radius),
        }
    }

    pub fn center(&self) -> Option<DVec2> {
        match *self {
            Curve2D::Line { .. } => None,
            Curve2D::Arc { center, .. } | Curve2D::Circle { center, .. } => Some(center),
        }
    }

    /// Stored endpoint coordinates
    pub fn endpoint(&self, which: Endpoint) -> Option<DVec2> {
        match (*self, which) {
            (Curve2D::Line { p1, .. } | Curve2D::Arc { p1, .. }, Endpoint::P1) => Some(p1),
            (Curve2D::Line { p2, .. } | Curve2D::Arc { p2, .. }, Endpoint::P2) => Some(p2),
            (Curve2D::Circle { .. }, _) => None,
        }
    }

    /// Start and end of the counter-clockwise sweep of an arc
    fn sweep_points(&self) -> Option<(DVec2, DVec2, DVec2)> {
        match *self {
            Curve2D::Arc {
                center,
                p1,
                p2,
                invert,
            } => Some(if invert {
                (center, p2, p1)
            } else {
                (center, p1, p2)
            }),
            _ => None,
        }
    }

    /// Start angle and counter-clockwise sweep angle of an arc or circle
    pub fn angular_range(&self) -> Option<(f64, f64)> {
        match *self {
            Curve2D::Line { .. } => None,
            Curve2D::Circle { .. } => Some((0.0, TAU)),
            Curve2D::Arc { .. } => {
                let (center, start, end) = self.sweep_points()?;
                let from = angle_of(start - center);
                let sweep = ccw_sweep(from, angle_of(end - center));
                Some((from, if sweep == 0.0 { TAU } else { sweep }))
            }
        }
    }

    /// Closest point on the underlying line or circle.
    ///
    /// `None` for a zero-length line or a point at the center of a curve.
    pub fn project_point(&self, co: DVec2) -> Option<DVec2> {
        match *self {
            Curve2D::Line { p1, p2 } => {
                let dir = p2 - p1;
                let len_sq = dir.length_squared();
                if len_sq < GEOMETRY_EPSILON {
                    return None;
                }
                Some(p1 + dir * ((co - p1).dot(dir) / len_sq))
            }
            Curve2D::Arc { .. } | Curve2D::Circle { .. } => {
                let center = self.center()?;
                let radius = self.radius()?;
                let offset = co - center;
                let len = offset.length();
                if len < GEOMETRY_EPSILON {
                    return None;
                }
                Some(center + offset * (radius / len))
            }
        }
    }

    /// Whether the polar angle of `co` falls inside an arc's sweep.
    ///
    /// Always true for lines and circles.
    pub fn is_inside(&self, co: DVec2) -> bool {
        let Curve2D::Arc { .. } = self else {
            return true;
        };
        let Some((center, start, _)) = self.sweep_points() else {
            return true;
        };
        let Some((_, sweep)) = self.angular_range() else {
            return true;
        };
        if co.distance_squared(center) < GEOMETRY_EPSILON {
            return false;
        }
        ccw_sweep(angle_of(start - center), angle_of(co - center)) <= sweep + 1e-12
    }

    /// Whether `co` matches an endpoint when both are rounded to
    /// five decimal places
    pub fn overlaps_endpoint(&self, co: DVec2) -> bool {
        let co = round_v(co, ENDPOINT_PRECISION);
        [Endpoint::P1, Endpoint::P2]
            .into_iter()
            .filter_map(|which| self.endpoint(which))
            .any(|p| round_v(p, ENDPOINT_PRECISION) == co)
    }

    /// Full primitive the curve lies on
    pub fn primitive(&self) -> Primitive {
        match *self {
            Curve2D::Line { p1, p2 } => Primitive::Segment { a: p1, b: p2 },
            Curve2D::Arc { center, p1, .. } => Primitive::Circle {
                center,
                radius: p1.distance(center),
            },
            Curve2D::Circle { center, radius } => Primitive::Circle { center, radius },
        }
    }

    /// Parallel copy at signed distance `distance`.
    ///
    /// Lines shift along their counter-clockwise normal, curves change
    /// radius. `None` when the offset would collapse the curve.
    pub fn offset(&self, distance: f64) -> Option<Primitive> {
        match self.primitive() {
            Primitive::Segment { a, b } => {
                let dir = (b - a).try_normalize()?;
                let shift = perp(dir) * distance;
                Some(Primitive::Segment {
                    a: a + shift,
                    b: b + shift,
                })
            }
            Primitive::Circle { center, radius } => {
                let radius = radius + distance;
                (radius > GEOMETRY_EPSILON).then_some(Primitive::Circle { center, radius })
            }
        }
    }

    /// Intersections with another curve.
    ///
    /// Points that coincide with an endpoint of either curve are dropped, as
    /// are points outside an arc's sweep.
    pub fn intersect(&self, other: &Curve2D) -> Vec<DVec2> {
        self.primitive()
            .intersect(&other.primitive())
            .into_iter()
            .filter(|co| !self.overlaps_endpoint(*co) && !other.overlaps_endpoint(*co))
            .filter(|co| self.is_inside(*co) && other.is_inside(*co))
            .collect()
    }

    /// Direction of travel when moving along the curve into `which`
    pub fn arrival_direction(&self, which: Endpoint) -> Option<DVec2> {
        match *self {
            Curve2D::Line { p1, p2 } => {
                let dir = match which {
                    Endpoint::P1 => p1 - p2,
                    Endpoint::P2 => p2 - p1,
                };
                dir.try_normalize()
            }
            Curve2D::Arc { invert, .. } => {
                let (center, _, _) = self.sweep_points()?;
                let at = self.endpoint(which)?;
                let tangent = perp(at - center).try_normalize()?;
                // The sweep runs counter-clockwise and ends at p2 unless inverted
                let is_sweep_end = (which == Endpoint::P2) != invert;
                Some(if is_sweep_end { tangent } else { -tangent })
            }
            Curve2D::Circle { .. } => None,
        }
    }

    /// Signed angle between the arrival directions of two segments at their
    /// shared point
    pub fn connection_angle(&self, at: Endpoint, other: &Curve2D, other_at: Endpoint) -> Option<f64> {
        let a = self.arrival_direction(at)?;
        let b = other.arrival_direction(other_at)?;
        Some(signed_angle(a, b))
    }

    /// Points along the curve, `segments` pieces for curves
    pub fn tessellate(&self, segments: u32) -> Vec<DVec2> {
        match *self {
            Curve2D::Line { p1, p2 } => vec![p1, p2],
            Curve2D::Arc { .. } | Curve2D::Circle { .. } => {
                let (Some(center), Some(radius), Some((start, sweep))) =
                    (self.center(), self.radius(), self.angular_range())
                else {
                    return Vec::new();
                };
                let segments = segments.max(1);
                (0..=segments)
                    .map(|i| {
                        let angle = start + sweep * f64::from(i) / f64::from(segments);
                        center + DVec2::from_angle(angle) * radius
                    })
                    .collect()
            }
        }
    }
}
