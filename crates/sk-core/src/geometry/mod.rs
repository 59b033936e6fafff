//! Geometric helpers shared by queries, rendering and construction

pub mod curve;
pub mod intersection;

use glam::{DQuat, DVec2, DVec3};

pub use curve::{Curve2D, Endpoint};
pub use intersection::Primitive;

/// Placement of a workplane in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// World position of the workplane origin
    pub origin: DVec3,
    /// Rotation taking the local Z axis onto the workplane normal
    pub rotation: DQuat,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            origin: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }
}

impl Frame {
    /// Lift workplane coordinates into world space
    pub fn to_world(&self, co: DVec2) -> DVec3 {
        self.origin + self.rotation * co.extend(0.0)
    }

    /// Project a world position onto the workplane
    pub fn to_local(&self, location: DVec3) -> DVec2 {
        (self.rotation.inverse() * (location - self.origin)).truncate()
    }

    pub fn normal(&self) -> DVec3 {
        self.rotation * DVec3::Z
    }
}

/// Round both components to `digits` decimal places
pub fn round_v(v: DVec2, digits: i32) -> DVec2 {
    let scale = 10f64.powi(digits);
    (v * scale).round() / scale
}

/// Signed angle between `a` and `b`, in `(-PI, PI]`.
///
/// Positive when `b` lies clockwise of `a`: `signed_angle(X, Y)` is
/// `-PI / 2`. The connection angle and the bevel sweep direction follow
/// this convention.
pub fn signed_angle(a: DVec2, b: DVec2) -> f64 {
    (a.y * b.x - a.x * b.y).atan2(a.dot(b))
}

/// Counter-clockwise perpendicular
pub fn perp(v: DVec2) -> DVec2 {
    DVec2::new(-v.y, v.x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame {
            origin: DVec3::new(1.0, 2.0, 3.0),
            rotation: DQuat::from_rotation_x(FRAC_PI_2),
        };
        let co = DVec2::new(0.5, -0.25);
        let world = frame.to_world(co);
        let back = frame.to_local(world);
        assert_relative_eq!(back.x, co.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, co.y, epsilon = 1e-12);
    }

    #[test]
    fn test_round_v() {
        let v = round_v(DVec2::new(0.123456, -1.000004), 5);
        assert_eq!(v, DVec2::new(0.12346, -1.0));
    }

    #[test]
    fn test_signed_angle() {
        assert_relative_eq!(signed_angle(-DVec2::X, -DVec2::Y), -FRAC_PI_2);
        assert_relative_eq!(signed_angle(-DVec2::Y, -DVec2::X), FRAC_PI_2);
        assert_relative_eq!(signed_angle(DVec2::X, DVec2::X), 0.0);
        // Clockwise is positive
        assert_relative_eq!(signed_angle(DVec2::X, DVec2::Y), -FRAC_PI_2);
        assert_relative_eq!(signed_angle(DVec2::Y, DVec2::X), FRAC_PI_2);
        assert_relative_eq!(signed_angle(DVec2::X, DVec2::new(-1.0, -1e-12)), std::f64::consts::PI, epsilon = 1e-9);
    }
}
