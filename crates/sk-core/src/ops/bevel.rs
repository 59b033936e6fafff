//! Bevel
//!
//! Replaces the corner where two segments meet with a tangent arc.

use glam::DVec2;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::constraint::Constraint;
use crate::entity::{EntityData, EntityKind};
use crate::error::SketchError;
use crate::geometry::intersection::intersect_all;
use crate::geometry::Curve2D;
use crate::handle::{Handle, MAX_SLOTS};
use crate::scene::Scene;
use crate::session::Session;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BevelError {
    #[error("Point should have two connected segments, found {0}")]
    NotTwoSegments(usize),

    #[error("Radius must be positive, got {0}")]
    InvalidRadius(f64),

    #[error("No fillet center found for the given radius")]
    NoIntersection,

    #[error("Tangent points are undefined")]
    DegenerateProjection,

    #[error(transparent)]
    Sketch(#[from] SketchError),
}

/// Geometry of a fillet between two segments, in workplane coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fillet {
    pub center: DVec2,
    /// Tangent point on the first segment
    pub tangent1: DVec2,
    /// Tangent point on the second segment
    pub tangent2: DVec2,
    /// The arc sweeps from `tangent2` to `tangent1`
    pub invert: bool,
}

/// Compute the fillet of radius `radius` at `corner`.
///
/// Candidate centers are the intersections of the segments' offsets at
/// `±radius`; the one closest to the corner that lies within both curves'
/// domains wins. `connection_angle` is the signed angle between the two
/// segments at the corner and decides the sweep direction.
pub fn fillet(
    corner: DVec2,
    first: &Curve2D,
    second: &Curve2D,
    connection_angle: f64,
    radius: f64,
) -> Result<Fillet, BevelError> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(BevelError::InvalidRadius(radius));
    }

    let offsets: Vec<_> = [first, second]
        .into_iter()
        .flat_map(|curve| [curve.offset(radius), curve.offset(-radius)])
        .flatten()
        .collect();

    let mut candidates = intersect_all(&offsets);
    candidates.sort_by(|a, b| a.distance(corner).total_cmp(&b.distance(corner)));

    let center = candidates
        .into_iter()
        .find(|co| first.is_inside(*co) && second.is_inside(*co))
        .ok_or(BevelError::NoIntersection)?;

    let (Some(tangent1), Some(tangent2)) = (first.project_point(center), second.project_point(center))
    else {
        return Err(BevelError::DegenerateProjection);
    };

    Ok(Fillet {
        center,
        tangent1,
        tangent2,
        invert: connection_angle < 0.0,
    })
}

/// Entities created by [`bevel`]
#[derive(Debug, Clone, PartialEq)]
pub struct BevelResult {
    pub arc: Handle,
    pub center: Handle,
    pub tangent_points: [Handle; 2],
    /// The two tangent constraints
    pub constraints: [Uuid; 2],
    /// The corner point was unreferenced afterwards and got removed
    pub removed_corner: bool,
}

/// Round off the corner at `point` with an arc of `radius`.
///
/// Both connected segments are rewired to the new tangent points and bound
/// to the arc with tangent constraints. Every check runs before the first
/// entity is added, so the scene is left untouched when an error is
/// returned. Solving is up to the caller.
pub fn bevel(
    scene: &mut Scene,
    session: &mut Session,
    point: Handle,
    radius: f64,
) -> Result<BevelResult, BevelError> {
    let sketch = match scene.entities().get(point).map(|e| e.data()) {
        Some(EntityData::Point2D { sketch, .. }) => *sketch,
        _ => {
            return Err(SketchError::InvalidReference {
                handle: point,
                role: "bevel point",
                expected: EntityKind::Point2D.name().to_string(),
            }
            .into());
        }
    };

    let connected = scene.connected_segments(point);
    let [seg1, seg2] = connected[..] else {
        warn!("Bevel needs two segments at {}, found {}", point, connected.len());
        return Err(BevelError::NotTwoSegments(connected.len()));
    };

    let corner = scene.co(point).ok_or(BevelError::DegenerateProjection)?;
    let (Some(first), Some(second)) = (scene.curve_2d(seg1), scene.curve_2d(seg2)) else {
        return Err(BevelError::DegenerateProjection);
    };
    let angle = scene
        .connection_angle(seg1, seg2)
        .ok_or(BevelError::DegenerateProjection)?;
    let fillet = fillet(corner, &first, &second, angle, radius)?;

    let nm = scene
        .sketch_workplane(sketch)
        .and_then(|wp| match scene.entities().get(wp)?.data() {
            EntityData::Workplane { nm, .. } => Some(*nm),
            _ => None,
        })
        .ok_or(SketchError::InvalidReference {
            handle: sketch,
            role: "sketch workplane",
            expected: EntityKind::Workplane.name().to_string(),
        })?;

    // Nothing below may fail once the store has been touched
    let finite = [fillet.center, fillet.tangent1, fillet.tangent2]
        .iter()
        .all(|co| co.is_finite());
    if !finite {
        return Err(BevelError::DegenerateProjection);
    }
    let offsets = scene.entities().collection_offsets();
    for (kind, needed) in [(EntityKind::Point2D, 3), (EntityKind::Arc, 1)] {
        if offsets[kind.index()] + needed > MAX_SLOTS {
            return Err(SketchError::SlabFull(kind).into());
        }
    }

    let store = scene.entities_mut();
    let mut center = store.add_point_2d(fillet.center, sketch)?;
    let mut p1 = store.add_point_2d(fillet.tangent1, sketch)?;
    let mut p2 = store.add_point_2d(fillet.tangent2, sketch)?;
    let arc = store.add_arc(nm, center, p1, p2, sketch)?;
    store.set_invert_direction(arc, fillet.invert)?;

    store.replace_point(seg1, point, p1)?;
    store.replace_point(seg2, point, p2)?;

    let constraints = [
        scene.add_constraint(Constraint::tangent(arc, seg1).in_sketch(sketch))?,
        scene.add_constraint(Constraint::tangent(arc, seg2).in_sketch(sketch))?,
    ];

    let mut removed_corner = false;
    if !scene.is_referenced(point)
        && let Some(removal) = scene.remove(point, session)
    {
        removed_corner = true;
        if let Some(relocation) = removal.relocation {
            for handle in [&mut center, &mut p1, &mut p2] {
                if *handle == relocation.from {
                    *handle = relocation.to;
                }
            }
        }
    }

    info!("Beveled corner {} with radius {}", point, radius);
    Ok(BevelResult {
        arc,
        center,
        tangent_points: [p1, p2],
        constraints,
        removed_corner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Corner {
        scene: Scene,
        session: Session,
        corner: Handle,
        l1: Handle,
        l2: Handle,
    }

    fn corner() -> Corner {
        let mut scene = Scene::new();
        let wp = scene.entities().origin_elements().plane_xy;
        let store = scene.entities_mut();
        let sketch = store.add_sketch(wp).unwrap();
        let corner = store.add_point_2d([0.0, 0.0], sketch).unwrap();
        let a = store.add_point_2d([1.0, 0.0], sketch).unwrap();
        let b = store.add_point_2d([0.0, 1.0], sketch).unwrap();
        let l1 = store.add_line_2d(a, corner, sketch).unwrap();
        let l2 = store.add_line_2d(b, corner, sketch).unwrap();
        Corner {
            scene,
            session: Session::new(),
            corner,
            l1,
            l2,
        }
    }

    #[test]
    fn test_fillet_geometry() {
        let first = Curve2D::Line {
            p1: DVec2::new(1.0, 0.0),
            p2: DVec2::ZERO,
        };
        let second = Curve2D::Line {
            p1: DVec2::new(0.0, 1.0),
            p2: DVec2::ZERO,
        };
        let fillet = fillet(DVec2::ZERO, &first, &second, -1.0, 0.1).unwrap();
        assert_relative_eq!(fillet.center.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(fillet.center.y, 0.1, epsilon = 1e-12);
        assert_relative_eq!(fillet.tangent1.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(fillet.tangent1.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(fillet.tangent2.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(fillet.tangent2.y, 0.1, epsilon = 1e-12);
        assert!(fillet.invert);
    }

    #[test]
    fn test_fillet_errors() {
        let first = Curve2D::Line {
            p1: DVec2::new(1.0, 0.0),
            p2: DVec2::ZERO,
        };
        let second = Curve2D::Line {
            p1: DVec2::new(0.0, 1.0),
            p2: DVec2::ZERO,
        };
        assert_eq!(
            fillet(DVec2::ZERO, &first, &second, -1.0, 5.0),
            Err(BevelError::NoIntersection)
        );
        assert_eq!(
            fillet(DVec2::ZERO, &first, &second, -1.0, 0.0),
            Err(BevelError::InvalidRadius(0.0))
        );
    }

    #[test]
    fn test_bevel_corner() {
        let Corner {
            mut scene,
            mut session,
            corner,
            l1,
            l2,
        } = corner();
        let points_before = scene.entities().slab(EntityKind::Point2D).len();

        let result = bevel(&mut scene, &mut session, corner, 0.1).unwrap();
        assert!(result.removed_corner);
        assert_eq!(
            scene.entities().slab(EntityKind::Point2D).len(),
            points_before + 2
        );
        assert_eq!(scene.constraints().len(), 2);

        let center = scene.co(result.center).unwrap();
        assert_relative_eq!(center.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(center.y, 0.1, epsilon = 1e-12);

        // Both lines now end in the tangent points
        let [t1, t2] = result.tangent_points;
        assert!(scene.entities().get(l1).unwrap().connection_points().contains(&t1));
        assert!(scene.entities().get(l2).unwrap().connection_points().contains(&t2));
        assert_relative_eq!(scene.co(t1).unwrap().x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(scene.co(t2).unwrap().y, 0.1, epsilon = 1e-12);

        // The arc takes the short way round
        let arc = scene.curve_2d(result.arc).unwrap();
        let (_, sweep) = arc.angular_range().unwrap();
        assert_relative_eq!(sweep, std::f64::consts::FRAC_PI_2, epsilon = 1e-9);
        assert!(matches!(
            scene.entities().get(result.arc).unwrap().data(),
            EntityData::Arc {
                invert_direction: true,
                ..
            }
        ));
    }

    #[test]
    fn test_bevel_needs_two_segments() {
        let Corner {
            mut scene,
            mut session,
            l1,
            ..
        } = corner();
        let lonely = scene.entities().get(l1).unwrap().connection_points()[0];
        let before = scene.entities().collection_offsets();
        assert_eq!(
            bevel(&mut scene, &mut session, lonely, 0.1),
            Err(BevelError::NotTwoSegments(1))
        );
        assert_eq!(scene.entities().collection_offsets(), before);
    }

    #[test]
    fn test_bevel_too_large_leaves_scene() {
        let Corner {
            mut scene,
            mut session,
            corner,
            ..
        } = corner();
        let before = scene.entities().collection_offsets();
        assert_eq!(
            bevel(&mut scene, &mut session, corner, 5.0),
            Err(BevelError::NoIntersection)
        );
        assert_eq!(scene.entities().collection_offsets(), before);
        assert!(scene.constraints().is_empty());
    }

    #[test]
    fn test_bevel_invalid_radius_leaves_scene() {
        let Corner {
            mut scene,
            mut session,
            corner,
            l1,
            ..
        } = corner();
        let before = scene.entities().handles();
        for radius in [0.0, -0.2, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                bevel(&mut scene, &mut session, corner, radius),
                Err(BevelError::InvalidRadius(_))
            ));
        }
        assert_eq!(scene.entities().handles(), before);
        assert!(scene.entities().get(l1).unwrap().connection_points().contains(&corner));
        assert!(scene.constraints().is_empty());
    }

    #[test]
    fn test_bevel_rejects_3d_point() {
        let Corner {
            mut scene,
            mut session,
            ..
        } = corner();
        let origin = scene.entities().origin_elements().origin;
        assert!(matches!(
            bevel(&mut scene, &mut session, origin, 0.1),
            Err(BevelError::Sketch(SketchError::InvalidReference { .. }))
        ));
    }
}
