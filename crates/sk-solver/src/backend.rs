//! Solver backend contract
//!
//! A backend builds [`SolverSystem`]s. The pipeline translates scene
//! entities and constraints into a system, calls [`SolverSystem::solve`] and
//! reads the solved values back. It never depends on how a backend works.

use glam::{DQuat, DVec2, DVec3};
use sk_core::SolverConfig;

/// Object registered with a solver system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolverHandle(pub u32);

impl std::fmt::Display for SolverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameter group. Only the parameters of the solved group may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Fixed,
    Free,
}

/// Equations a solver system understands.
///
/// Entity order in [`SolverSystem::add_constraint`] follows the variant
/// docs. Planar variants need a workplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintType {
    /// `[point, point]`
    PointsCoincident,
    /// `[point, point]`, value is the distance
    PtPtDistance,
    /// `[point, line]`, value is the distance
    PtLineDistance,
    /// `[point, workplane]`, value is the distance
    PtPlaneDistance,
    /// `[point, workplane]`
    PtInPlane,
    /// `[point, line]`
    PtOnLine,
    /// `[point, arc or circle]`
    PtOnCircle,
    /// `[line]`, planar
    Horizontal,
    /// `[line]`, planar
    Vertical,
    /// `[line, line]`
    Parallel,
    /// `[line, line]`
    Perpendicular,
    /// `[line, line]`
    EqualLength,
    /// `[arc or circle, arc or circle]`
    EqualRadius,
    /// `[line, line]`, value in radians
    Angle,
    /// `[arc or circle]`, value is the diameter
    Diameter,
    /// `[point, line]`
    AtMidpoint,
    /// `[arc or circle, line]`, planar
    LineTangent,
    /// `[arc or circle, arc or circle]`, planar
    CurveTangent,
}

impl ConstraintType {
    /// Number of entities the constraint takes
    pub fn arity(self) -> usize {
        match self {
            ConstraintType::Horizontal | ConstraintType::Vertical | ConstraintType::Diameter => 1,
            _ => 2,
        }
    }

    /// Whether the equation is only defined inside a workplane
    pub fn is_planar(self) -> bool {
        matches!(
            self,
            ConstraintType::Horizontal
                | ConstraintType::Vertical
                | ConstraintType::LineTangent
                | ConstraintType::CurveTangent
        )
    }
}

/// Raw outcome of [`SolverSystem::solve`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResult {
    /// Result code, see [`sk_core::SolverState::from_code`]
    pub code: i32,
    /// Constraints the solver blames for the outcome
    pub failed: Vec<SolverHandle>,
    /// Remaining degrees of freedom
    pub dof: i32,
}

/// One system of parameters, entities and constraints.
///
/// Entity handles passed in must have been returned by the same system.
/// Implementations report bad input through [`RawResult::code`] from
/// `solve`, not by panicking.
pub trait SolverSystem {
    fn add_point_3d(&mut self, location: DVec3, group: Group) -> SolverHandle;

    /// Point with coordinates in a workplane
    fn add_point_2d(&mut self, co: DVec2, workplane: SolverHandle, group: Group) -> SolverHandle;

    fn add_normal_3d(&mut self, orientation: DQuat, group: Group) -> SolverHandle;

    /// Normal of a workplane, no parameters of its own
    fn add_normal_2d(&mut self, workplane: SolverHandle) -> SolverHandle;

    fn add_workplane(&mut self, origin: SolverHandle, normal: SolverHandle) -> SolverHandle;

    /// Line through two points, in a workplane or in 3D
    fn add_line(
        &mut self,
        p1: SolverHandle,
        p2: SolverHandle,
        workplane: Option<SolverHandle>,
    ) -> SolverHandle;

    /// Arc from `p1` to `p2` around `center`. Both endpoints keep the same
    /// distance to the center.
    fn add_arc(
        &mut self,
        normal: SolverHandle,
        center: SolverHandle,
        p1: SolverHandle,
        p2: SolverHandle,
        workplane: SolverHandle,
        group: Group,
    ) -> SolverHandle;

    fn add_circle(
        &mut self,
        normal: SolverHandle,
        center: SolverHandle,
        radius: f64,
        workplane: SolverHandle,
        group: Group,
    ) -> SolverHandle;

    fn add_constraint(
        &mut self,
        kind: ConstraintType,
        value: f64,
        entities: &[SolverHandle],
        workplane: Option<SolverHandle>,
        group: Group,
    ) -> SolverHandle;

    /// Solve the parameters of one group, everything else held constant
    fn solve(&mut self, group: Group) -> RawResult;

    fn point_3d(&self, handle: SolverHandle) -> Option<DVec3>;

    fn point_2d(&self, handle: SolverHandle) -> Option<DVec2>;

    fn normal_3d(&self, handle: SolverHandle) -> Option<DQuat>;

    /// Radius of a circle
    fn distance(&self, handle: SolverHandle) -> Option<f64>;
}

/// Factory for solver systems
pub trait SolverBackend: Send + Sync {
    /// Get the name of this backend
    fn name(&self) -> &str;

    /// Check if the backend can solve anything
    fn is_available(&self) -> bool;

    /// Create an empty system, `None` when the backend is unavailable
    fn create_system(&self, config: &SolverConfig) -> Option<Box<dyn SolverSystem>>;
}

/// A backend that never solves (used when no solver is compiled in)
#[derive(Debug, Default)]
pub struct NullBackend;

impl SolverBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn create_system(&self, _config: &SolverConfig) -> Option<Box<dyn SolverSystem>> {
        None
    }
}

/// Get the default backend based on available features
pub fn default_backend() -> Box<dyn SolverBackend> {
    #[cfg(feature = "newton")]
    {
        Box::new(crate::newton::NewtonBackend)
    }

    #[cfg(not(feature = "newton"))]
    {
        Box::new(NullBackend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend() {
        let backend = NullBackend;
        assert_eq!(backend.name(), "null");
        assert!(!backend.is_available());
        assert!(backend.create_system(&SolverConfig::default()).is_none());
    }

    #[test]
    fn test_constraint_arity() {
        assert_eq!(ConstraintType::Horizontal.arity(), 1);
        assert_eq!(ConstraintType::Diameter.arity(), 1);
        assert_eq!(ConstraintType::PtPtDistance.arity(), 2);
        assert!(ConstraintType::LineTangent.is_planar());
        assert!(!ConstraintType::Parallel.is_planar());
    }

    #[cfg(feature = "newton")]
    #[test]
    fn test_default_backend_is_available() {
        let backend = default_backend();
        assert_eq!(backend.name(), "newton");
        assert!(backend.is_available());
    }
}
