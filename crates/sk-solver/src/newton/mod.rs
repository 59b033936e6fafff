//! Built-in Newton-Raphson solver
//!
//! Pure Rust implementation of the [`SolverSystem`] contract. Every object
//! owns a few scalar parameters; constraints become residual equations over
//! them. A solve runs damped Gauss-Newton steps on the parameters of one
//! group, using a numeric Jacobian, and then inspects the rank of the
//! Jacobian to find redundant or contradicting constraints.

mod linalg;

use glam::{DQuat, DVec2, DVec3};
use sk_core::{SolverConfig, SolverState};
use tracing::{debug, trace};

use crate::backend::{ConstraintType, Group, RawResult, SolverBackend, SolverHandle, SolverSystem};
use linalg::RowBasis;

/// Relative step of the central difference Jacobian
const JACOBIAN_STEP: f64 = 1e-6;

/// Updates smaller than this count as stalled
const STALL_STEP: f64 = 1e-14;

/// Backend creating [`NewtonSystem`]s
#[derive(Debug, Default)]
pub struct NewtonBackend;

impl SolverBackend for NewtonBackend {
    fn name(&self) -> &str {
        "newton"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create_system(&self, config: &SolverConfig) -> Option<Box<dyn SolverSystem>> {
        Some(Box::new(NewtonSystem::new(config.clone())))
    }
}

#[derive(Debug, Clone, Copy)]
struct Param {
    value: f64,
    group: Group,
}

#[derive(Debug, Clone)]
struct ConstraintDef {
    kind: ConstraintType,
    value: f64,
    entities: Vec<SolverHandle>,
    workplane: Option<SolverHandle>,
    group: Group,
}

#[derive(Debug, Clone)]
enum Object {
    Point3D {
        params: [usize; 3],
    },
    Point2D {
        params: [usize; 2],
        workplane: SolverHandle,
    },
    /// Quaternion parameters in `x, y, z, w` order
    Normal3D {
        params: [usize; 4],
    },
    Normal2D {
        workplane: SolverHandle,
    },
    Workplane {
        origin: SolverHandle,
        normal: SolverHandle,
    },
    Line {
        p1: SolverHandle,
        p2: SolverHandle,
        workplane: Option<SolverHandle>,
    },
    Arc {
        normal: SolverHandle,
        center: SolverHandle,
        p1: SolverHandle,
        p2: SolverHandle,
        workplane: SolverHandle,
        group: Group,
    },
    Circle {
        normal: SolverHandle,
        center: SolverHandle,
        radius: usize,
        workplane: SolverHandle,
    },
    Constraint(ConstraintDef),
}

/// One residual block of the system
#[derive(Debug, Clone, Copy)]
enum Equation {
    /// A user constraint. `sense` picks the branch of sign dependent
    /// equations and is fixed from the starting geometry.
    Constraint { object: usize, sense: f64 },
    /// Both endpoints of an arc lie on the same circle
    ArcRadius { object: usize },
    /// A free quaternion stays normalized
    UnitNormal { object: usize },
}

impl Equation {
    fn owner(self) -> Option<SolverHandle> {
        match self {
            Equation::Constraint { object, .. } => Some(SolverHandle(object as u32)),
            _ => None,
        }
    }
}

fn cross2(a: DVec3, b: DVec3) -> f64 {
    a.x * b.y - a.y * b.x
}

fn sign(value: f64) -> f64 {
    if value < 0.0 { -1.0 } else { 1.0 }
}

/// Constraint system solved by damped Newton iteration
#[derive(Debug, Clone)]
pub struct NewtonSystem {
    config: SolverConfig,
    params: Vec<Param>,
    objects: Vec<Object>,
}

impl NewtonSystem {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            params: Vec::new(),
            objects: Vec::new(),
        }
    }

    fn push(&mut self, object: Object) -> SolverHandle {
        self.objects.push(object);
        SolverHandle((self.objects.len() - 1) as u32)
    }

    fn param(&mut self, value: f64, group: Group) -> usize {
        self.params.push(Param { value, group });
        self.params.len() - 1
    }

    fn object(&self, handle: SolverHandle) -> Option<&Object> {
        self.objects.get(handle.0 as usize)
    }

    // ============== Validation ==============

    fn is_point(&self, handle: SolverHandle) -> bool {
        matches!(
            self.object(handle),
            Some(Object::Point3D { .. } | Object::Point2D { .. })
        )
    }

    fn is_line(&self, handle: SolverHandle) -> bool {
        matches!(self.object(handle), Some(Object::Line { .. }))
    }

    fn is_curve(&self, handle: SolverHandle) -> bool {
        matches!(
            self.object(handle),
            Some(Object::Arc { .. } | Object::Circle { .. })
        )
    }

    fn is_normal(&self, handle: SolverHandle) -> bool {
        matches!(
            self.object(handle),
            Some(Object::Normal3D { .. } | Object::Normal2D { .. })
        )
    }

    fn is_workplane(&self, handle: SolverHandle) -> bool {
        matches!(self.object(handle), Some(Object::Workplane { .. }))
    }

    fn accepts(&self, def: &ConstraintDef) -> bool {
        if def.entities.len() != def.kind.arity() || !def.value.is_finite() {
            return false;
        }
        if def.kind.is_planar() && def.workplane.is_none() {
            return false;
        }
        if def.workplane.is_some_and(|wp| !self.is_workplane(wp)) {
            return false;
        }
        let e = &def.entities;
        match def.kind {
            ConstraintType::PointsCoincident | ConstraintType::PtPtDistance => {
                self.is_point(e[0]) && self.is_point(e[1])
            }
            ConstraintType::PtLineDistance
            | ConstraintType::PtOnLine
            | ConstraintType::AtMidpoint => self.is_point(e[0]) && self.is_line(e[1]),
            ConstraintType::PtPlaneDistance | ConstraintType::PtInPlane => {
                self.is_point(e[0]) && self.is_workplane(e[1])
            }
            ConstraintType::PtOnCircle => self.is_point(e[0]) && self.is_curve(e[1]),
            ConstraintType::Horizontal | ConstraintType::Vertical => self.is_line(e[0]),
            ConstraintType::Parallel
            | ConstraintType::Perpendicular
            | ConstraintType::EqualLength
            | ConstraintType::Angle => self.is_line(e[0]) && self.is_line(e[1]),
            ConstraintType::EqualRadius | ConstraintType::CurveTangent => {
                self.is_curve(e[0]) && self.is_curve(e[1])
            }
            ConstraintType::Diameter => self.is_curve(e[0]),
            ConstraintType::LineTangent => self.is_curve(e[0]) && self.is_line(e[1]),
        }
    }

    fn validate(&self) -> bool {
        self.objects.iter().all(|object| match object {
            Object::Point3D { .. } | Object::Normal3D { .. } => true,
            Object::Point2D { workplane, .. } | Object::Normal2D { workplane } => {
                self.is_workplane(*workplane)
            }
            Object::Workplane { origin, normal } => {
                matches!(self.object(*origin), Some(Object::Point3D { .. }))
                    && matches!(self.object(*normal), Some(Object::Normal3D { .. }))
            }
            Object::Line { p1, p2, workplane } => {
                self.is_point(*p1)
                    && self.is_point(*p2)
                    && workplane.is_none_or(|wp| self.is_workplane(wp))
            }
            Object::Arc {
                normal,
                center,
                p1,
                p2,
                workplane,
                ..
            } => {
                self.is_normal(*normal)
                    && self.is_point(*center)
                    && self.is_point(*p1)
                    && self.is_point(*p2)
                    && self.is_workplane(*workplane)
            }
            Object::Circle {
                normal,
                center,
                workplane,
                ..
            } => self.is_normal(*normal) && self.is_point(*center) && self.is_workplane(*workplane),
            Object::Constraint(def) => self.accepts(def),
        })
    }

    // ============== Evaluation ==============

    fn quaternion(&self, x: &[f64], handle: SolverHandle) -> Option<DQuat> {
        match self.object(handle)? {
            Object::Normal3D { params } => {
                let q = DQuat::from_xyzw(x[params[0]], x[params[1]], x[params[2]], x[params[3]]);
                (q.length() > 1e-12).then(|| q.normalize())
            }
            Object::Normal2D { workplane } => self.frame(x, *workplane).map(|(_, q)| q),
            _ => None,
        }
    }

    fn frame(&self, x: &[f64], workplane: SolverHandle) -> Option<(DVec3, DQuat)> {
        let Object::Workplane { origin, normal } = self.object(workplane)? else {
            return None;
        };
        Some((self.world(x, *origin)?, self.quaternion(x, *normal)?))
    }

    fn world(&self, x: &[f64], handle: SolverHandle) -> Option<DVec3> {
        match self.object(handle)? {
            Object::Point3D { params } => Some(DVec3::new(x[params[0]], x[params[1]], x[params[2]])),
            Object::Point2D { params, workplane } => {
                let (origin, rotation) = self.frame(x, *workplane)?;
                Some(origin + rotation * DVec3::new(x[params[0]], x[params[1]], 0.0))
            }
            _ => None,
        }
    }

    /// Point position in workplane coordinates (z = 0), or in world space
    fn position(&self, x: &[f64], handle: SolverHandle, plane: Option<SolverHandle>) -> Option<DVec3> {
        let Some(plane) = plane else {
            return self.world(x, handle);
        };
        if let Some(Object::Point2D { params, workplane }) = self.object(handle)
            && *workplane == plane
        {
            return Some(DVec3::new(x[params[0]], x[params[1]], 0.0));
        }
        let (origin, rotation) = self.frame(x, plane)?;
        let local = rotation.inverse() * (self.world(x, handle)? - origin);
        Some(local.truncate().extend(0.0))
    }

    fn line(&self, x: &[f64], handle: SolverHandle, plane: Option<SolverHandle>) -> Option<(DVec3, DVec3)> {
        let Object::Line { p1, p2, .. } = self.object(handle)? else {
            return None;
        };
        Some((self.position(x, *p1, plane)?, self.position(x, *p2, plane)?))
    }

    fn curve_plane(&self, handle: SolverHandle) -> Option<SolverHandle> {
        match self.object(handle)? {
            Object::Arc { workplane, .. } | Object::Circle { workplane, .. } => Some(*workplane),
            _ => None,
        }
    }

    /// Center and radius of an arc or circle
    fn curve(&self, x: &[f64], handle: SolverHandle, plane: Option<SolverHandle>) -> Option<(DVec3, f64)> {
        match self.object(handle)? {
            Object::Arc { center, p1, .. } => {
                let c = self.position(x, *center, plane)?;
                Some((c, self.position(x, *p1, plane)?.distance(c)))
            }
            Object::Circle { center, radius, .. } => {
                Some((self.position(x, *center, plane)?, x[*radius]))
            }
            _ => None,
        }
    }

    /// Sign of the starting configuration for equations with two branches
    fn sense(&self, x: &[f64], def: &ConstraintDef) -> Option<f64> {
        let e = &def.entities;
        let plane = def.workplane;
        let sense = match def.kind {
            ConstraintType::PtLineDistance if plane.is_some() => {
                let p = self.position(x, e[0], plane)?;
                let (a, b) = self.line(x, e[1], plane)?;
                sign(cross2(b - a, p - a))
            }
            ConstraintType::PtPlaneDistance => {
                let (origin, rotation) = self.frame(x, e[1])?;
                sign((self.world(x, e[0])? - origin).dot(rotation * DVec3::Z))
            }
            ConstraintType::Angle if plane.is_some() => {
                let (a1, b1) = self.line(x, e[0], plane)?;
                let (a2, b2) = self.line(x, e[1], plane)?;
                sign(cross2(b1 - a1, b2 - a2))
            }
            ConstraintType::LineTangent => {
                let plane = plane.or(self.curve_plane(e[0]));
                let (c, _) = self.curve(x, e[0], plane)?;
                let (a, b) = self.line(x, e[1], plane)?;
                sign(cross2(b - a, c - a))
            }
            ConstraintType::CurveTangent => {
                let plane = plane.or(self.curve_plane(e[0]));
                let (c1, r1) = self.curve(x, e[0], plane)?;
                let (c2, r2) = self.curve(x, e[1], plane)?;
                // Outside of each other: external tangency
                if c1.distance(c2) >= r1.max(r2) { 1.0 } else { -1.0 }
            }
            _ => 1.0,
        };
        Some(sense)
    }

    fn eval_constraint(&self, x: &[f64], def: &ConstraintDef, sense: f64, out: &mut Vec<f64>) -> Option<()> {
        let e = &def.entities;
        let plane = def.workplane;
        let planar = plane.is_some();
        let v = def.value;

        match def.kind {
            ConstraintType::PointsCoincident => {
                let d = self.position(x, e[0], plane)? - self.position(x, e[1], plane)?;
                out.extend([d.x, d.y]);
                if !planar {
                    out.push(d.z);
                }
            }
            ConstraintType::PtPtDistance => {
                let d = self.position(x, e[0], plane)?.distance(self.position(x, e[1], plane)?);
                out.push(d - v);
            }
            ConstraintType::PtLineDistance => {
                let p = self.position(x, e[0], plane)?;
                let (a, b) = self.line(x, e[1], plane)?;
                let dir = (b - a).try_normalize()?;
                if planar {
                    out.push(cross2(dir, p - a) - sense * v);
                } else {
                    out.push(dir.cross(p - a).length() - v);
                }
            }
            ConstraintType::PtPlaneDistance | ConstraintType::PtInPlane => {
                let (origin, rotation) = self.frame(x, e[1])?;
                let distance = (self.world(x, e[0])? - origin).dot(rotation * DVec3::Z);
                let target = if def.kind == ConstraintType::PtInPlane { 0.0 } else { sense * v };
                out.push(distance - target);
            }
            ConstraintType::PtOnLine => {
                let p = self.position(x, e[0], plane)?;
                let (a, b) = self.line(x, e[1], plane)?;
                let dir = (b - a).try_normalize()?;
                if planar {
                    out.push(cross2(dir, p - a));
                } else {
                    let (u, w) = dir.any_orthonormal_pair();
                    out.extend([(p - a).dot(u), (p - a).dot(w)]);
                }
            }
            ConstraintType::PtOnCircle => {
                let plane = plane.or(self.curve_plane(e[1]));
                let (c, r) = self.curve(x, e[1], plane)?;
                out.push(self.position(x, e[0], plane)?.distance(c) - r);
            }
            ConstraintType::Horizontal => {
                let (a, b) = self.line(x, e[0], plane)?;
                out.push(b.y - a.y);
            }
            ConstraintType::Vertical => {
                let (a, b) = self.line(x, e[0], plane)?;
                out.push(b.x - a.x);
            }
            ConstraintType::Parallel => {
                let (a1, b1) = self.line(x, e[0], plane)?;
                let (a2, b2) = self.line(x, e[1], plane)?;
                let d1 = (b1 - a1).try_normalize()?;
                let d2 = (b2 - a2).try_normalize()?;
                // Cross product should be zero for parallel lines
                if planar {
                    out.push(cross2(d1, d2));
                } else {
                    let (u, w) = d1.any_orthonormal_pair();
                    out.extend([d2.dot(u), d2.dot(w)]);
                }
            }
            ConstraintType::Perpendicular => {
                let (a1, b1) = self.line(x, e[0], plane)?;
                let (a2, b2) = self.line(x, e[1], plane)?;
                // Dot product should be zero for perpendicular lines
                out.push((b1 - a1).try_normalize()?.dot((b2 - a2).try_normalize()?));
            }
            ConstraintType::EqualLength => {
                let (a1, b1) = self.line(x, e[0], plane)?;
                let (a2, b2) = self.line(x, e[1], plane)?;
                out.push(a1.distance(b1) - a2.distance(b2));
            }
            ConstraintType::EqualRadius => {
                let (_, r1) = self.curve(x, e[0], plane.or(self.curve_plane(e[0])))?;
                let (_, r2) = self.curve(x, e[1], plane.or(self.curve_plane(e[1])))?;
                out.push(r1 - r2);
            }
            ConstraintType::Angle => {
                let (a1, b1) = self.line(x, e[0], plane)?;
                let (a2, b2) = self.line(x, e[1], plane)?;
                let d1 = (b1 - a1).try_normalize()?;
                let d2 = (b2 - a2).try_normalize()?;
                if planar {
                    out.push(cross2(d1, d2).atan2(d1.dot(d2)) - sense * v);
                } else {
                    out.push(d1.dot(d2).clamp(-1.0, 1.0).acos() - v);
                }
            }
            ConstraintType::Diameter => {
                let (_, r) = self.curve(x, e[0], plane.or(self.curve_plane(e[0])))?;
                out.push(2.0 * r - v);
            }
            ConstraintType::AtMidpoint => {
                let p = self.position(x, e[0], plane)?;
                let (a, b) = self.line(x, e[1], plane)?;
                let d = p - (a + b) * 0.5;
                out.extend([d.x, d.y]);
                if !planar {
                    out.push(d.z);
                }
            }
            ConstraintType::LineTangent => {
                let (c, r) = self.curve(x, e[0], plane)?;
                let (a, b) = self.line(x, e[1], plane)?;
                let dir = (b - a).try_normalize()?;
                // Center keeps its side of the line at distance r
                out.push(cross2(dir, c - a) - sense * r);
            }
            ConstraintType::CurveTangent => {
                let (c1, r1) = self.curve(x, e[0], plane)?;
                let (c2, r2) = self.curve(x, e[1], plane)?;
                let target = if sense > 0.0 { r1 + r2 } else { (r1 - r2).abs() };
                out.push(c1.distance(c2) - target);
            }
        }
        Some(())
    }

    fn eval(&self, x: &[f64], equation: Equation, out: &mut Vec<f64>) -> Option<()> {
        match equation {
            Equation::Constraint { object, sense } => {
                let Object::Constraint(def) = &self.objects[object] else {
                    return None;
                };
                self.eval_constraint(x, def, sense, out)
            }
            Equation::ArcRadius { object } => {
                let Object::Arc {
                    center,
                    p1,
                    p2,
                    workplane,
                    ..
                } = &self.objects[object]
                else {
                    return None;
                };
                let plane = Some(*workplane);
                let c = self.position(x, *center, plane)?;
                out.push(self.position(x, *p2, plane)?.distance(c) - self.position(x, *p1, plane)?.distance(c));
                Some(())
            }
            Equation::UnitNormal { object } => {
                let Object::Normal3D { params } = &self.objects[object] else {
                    return None;
                };
                out.push(params.iter().map(|p| x[*p] * x[*p]).sum::<f64>() - 1.0);
                Some(())
            }
        }
    }

    fn residuals(&self, x: &[f64], equations: &[Equation]) -> Option<Vec<f64>> {
        let mut out = Vec::new();
        for equation in equations {
            self.eval(x, *equation, &mut out)?;
        }
        Some(out)
    }

    /// Central difference Jacobian over the unknown parameters
    fn jacobian(&self, x: &mut [f64], equations: &[Equation], unknowns: &[usize], rows: usize) -> Option<Vec<Vec<f64>>> {
        let mut j = vec![vec![0.0; unknowns.len()]; rows];
        for (col, &var) in unknowns.iter().enumerate() {
            let original = x[var];
            let h = JACOBIAN_STEP * original.abs().max(1.0);

            x[var] = original + h;
            let forward = self.residuals(x, equations);
            x[var] = original - h;
            let backward = self.residuals(x, equations);
            x[var] = original;

            let (forward, backward) = (forward?, backward?);
            for row in 0..rows {
                j[row][col] = (forward[row] - backward[row]) / (2.0 * h);
            }
        }
        Some(j)
    }

    /// Equations taking part in solving `group`
    fn equations(&self, x: &[f64], group: Group) -> Option<Vec<Equation>> {
        let mut equations = Vec::new();
        for (index, object) in self.objects.iter().enumerate() {
            match object {
                Object::Constraint(def) if def.group == group => {
                    equations.push(Equation::Constraint {
                        object: index,
                        sense: self.sense(x, def)?,
                    });
                }
                Object::Arc { group: g, .. } if *g == group => {
                    equations.push(Equation::ArcRadius { object: index });
                }
                Object::Normal3D { params } if params.iter().any(|p| self.params[*p].group == group) => {
                    equations.push(Equation::UnitNormal { object: index });
                }
                _ => {}
            }
        }
        Some(equations)
    }

    fn result(state: SolverState, failed: Vec<SolverHandle>, dof: i32) -> RawResult {
        RawResult {
            code: state.code(),
            failed,
            dof,
        }
    }
}

impl SolverSystem for NewtonSystem {
    fn add_point_3d(&mut self, location: DVec3, group: Group) -> SolverHandle {
        let params = [
            self.param(location.x, group),
            self.param(location.y, group),
            self.param(location.z, group),
        ];
        self.push(Object::Point3D { params })
    }

    fn add_point_2d(&mut self, co: DVec2, workplane: SolverHandle, group: Group) -> SolverHandle {
        let params = [self.param(co.x, group), self.param(co.y, group)];
        self.push(Object::Point2D { params, workplane })
    }

    fn add_normal_3d(&mut self, orientation: DQuat, group: Group) -> SolverHandle {
        let params = [
            self.param(orientation.x, group),
            self.param(orientation.y, group),
            self.param(orientation.z, group),
            self.param(orientation.w, group),
        ];
        self.push(Object::Normal3D { params })
    }

    fn add_normal_2d(&mut self, workplane: SolverHandle) -> SolverHandle {
        self.push(Object::Normal2D { workplane })
    }

    fn add_workplane(&mut self, origin: SolverHandle, normal: SolverHandle) -> SolverHandle {
        self.push(Object::Workplane { origin, normal })
    }

    fn add_line(&mut self, p1: SolverHandle, p2: SolverHandle, workplane: Option<SolverHandle>) -> SolverHandle {
        self.push(Object::Line { p1, p2, workplane })
    }

    fn add_arc(
        &mut self,
        normal: SolverHandle,
        center: SolverHandle,
        p1: SolverHandle,
        p2: SolverHandle,
        workplane: SolverHandle,
        group: Group,
    ) -> SolverHandle {
        self.push(Object::Arc {
            normal,
            center,
            p1,
            p2,
            workplane,
            group,
        })
    }

    fn add_circle(
        &mut self,
        normal: SolverHandle,
        center: SolverHandle,
        radius: f64,
        workplane: SolverHandle,
        group: Group,
    ) -> SolverHandle {
        let radius = self.param(radius, group);
        self.push(Object::Circle {
            normal,
            center,
            radius,
            workplane,
        })
    }

    fn add_constraint(
        &mut self,
        kind: ConstraintType,
        value: f64,
        entities: &[SolverHandle],
        workplane: Option<SolverHandle>,
        group: Group,
    ) -> SolverHandle {
        self.push(Object::Constraint(ConstraintDef {
            kind,
            value,
            entities: entities.to_vec(),
            workplane,
            group,
        }))
    }

    fn solve(&mut self, group: Group) -> RawResult {
        let unknowns: Vec<usize> = (0..self.params.len())
            .filter(|p| self.params[*p].group == group)
            .collect();
        let n = unknowns.len();
        if n > self.config.max_unknowns {
            return Self::result(SolverState::TooManyUnknowns, Vec::new(), n as i32);
        }
        if !self.validate() {
            return Self::result(SolverState::InitError, Vec::new(), n as i32);
        }

        let mut x: Vec<f64> = self.params.iter().map(|p| p.value).collect();
        let Some(equations) = self.equations(&x, group) else {
            return Self::result(SolverState::InitError, Vec::new(), n as i32);
        };
        let Some(mut f) = self.residuals(&x, &equations) else {
            return Self::result(SolverState::InitError, Vec::new(), n as i32);
        };

        // Row owners, in residual order
        let mut owners = Vec::with_capacity(f.len());
        let mut rows = Vec::new();
        for equation in &equations {
            rows.clear();
            if self.eval(&x, *equation, &mut rows).is_none() {
                return Self::result(SolverState::InitError, Vec::new(), n as i32);
            }
            owners.extend(std::iter::repeat_n(equation.owner(), rows.len()));
        }

        let tolerance = self.config.tolerance;
        let damping = self.config.damping.clamp(0.1, 1.0);
        let mut converged = linalg::norm(&f) < tolerance;
        let mut iterations = 0;

        while !converged && iterations < self.config.max_iterations {
            iterations += 1;
            let Some(j) = self.jacobian(&mut x, &equations, &unknowns, f.len()) else {
                break;
            };
            let dx = RowBasis::new(&j).step(&f, n);

            for (k, &var) in unknowns.iter().enumerate() {
                x[var] += damping * dx[k];
            }
            let Some(next) = self.residuals(&x, &equations) else {
                break;
            };
            f = next;
            converged = linalg::norm(&f) < tolerance;

            let step = linalg::norm(&dx);
            trace!("Iteration {}: residual {:e}, step {:e}", iterations, linalg::norm(&f), step);
            if !converged && step < STALL_STEP * (1.0 + linalg::norm(&x)) {
                break;
            }
        }

        let (rank, dependent) = match self.jacobian(&mut x, &equations, &unknowns, f.len()) {
            Some(j) => {
                let factor = RowBasis::new(&j);
                (factor.rank(), factor.dependent().to_vec())
            }
            None => (0, Vec::new()),
        };
        let mut failed: Vec<SolverHandle> = dependent.iter().filter_map(|row| owners[*row]).collect();
        failed.sort_unstable();
        failed.dedup();
        let dof = (n - rank.min(n)) as i32;

        debug!(
            "Newton solve: {} unknowns, {} equations, {} iterations, converged: {}",
            n,
            f.len(),
            iterations,
            converged
        );

        let state = match (converged, failed.is_empty()) {
            (true, true) => SolverState::Okay,
            (true, false) => SolverState::RedundantOkay,
            (false, false) => SolverState::Inconsistent,
            (false, true) => SolverState::DidntConverge,
        };
        if converged {
            for (param, value) in self.params.iter_mut().zip(x) {
                param.value = value;
            }
        }
        Self::result(state, failed, dof)
    }

    fn point_3d(&self, handle: SolverHandle) -> Option<DVec3> {
        match self.object(handle)? {
            Object::Point3D { params } => Some(DVec3::new(
                self.params[params[0]].value,
                self.params[params[1]].value,
                self.params[params[2]].value,
            )),
            _ => None,
        }
    }

    fn point_2d(&self, handle: SolverHandle) -> Option<DVec2> {
        match self.object(handle)? {
            Object::Point2D { params, .. } => Some(DVec2::new(
                self.params[params[0]].value,
                self.params[params[1]].value,
            )),
            _ => None,
        }
    }

    fn normal_3d(&self, handle: SolverHandle) -> Option<DQuat> {
        let x: Vec<f64> = self.params.iter().map(|p| p.value).collect();
        match self.object(handle)? {
            Object::Normal3D { .. } => self.quaternion(&x, handle),
            _ => None,
        }
    }

    fn distance(&self, handle: SolverHandle) -> Option<f64> {
        match self.object(handle)? {
            Object::Circle { radius, .. } => Some(self.params[*radius].value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// System with the XY plane as a fixed workplane
    fn planar() -> (NewtonSystem, SolverHandle) {
        let mut sys = NewtonSystem::new(SolverConfig::default());
        let origin = sys.add_point_3d(DVec3::ZERO, Group::Fixed);
        let normal = sys.add_normal_3d(DQuat::IDENTITY, Group::Fixed);
        let wp = sys.add_workplane(origin, normal);
        (sys, wp)
    }

    #[test]
    fn test_simple_horizontal_constraint() {
        let (mut sys, wp) = planar();
        let p1 = sys.add_point_2d(DVec2::new(0.0, 0.0), wp, Group::Free);
        let p2 = sys.add_point_2d(DVec2::new(10.0, 5.0), wp, Group::Free);
        let line = sys.add_line(p1, p2, Some(wp));
        sys.add_constraint(ConstraintType::Horizontal, 0.0, &[line], Some(wp), Group::Free);

        let result = sys.solve(Group::Free);
        assert_eq!(result.code, 0, "Solver should converge: {:?}", result);

        let a = sys.point_2d(p1).unwrap();
        let b = sys.point_2d(p2).unwrap();
        assert!((a.y - b.y).abs() < 1e-8, "Line should be horizontal: {} vs {}", a.y, b.y);
        assert_eq!(result.dof, 3);
    }

    #[test]
    fn test_distance_with_fixed_point() {
        let (mut sys, wp) = planar();
        let p1 = sys.add_point_2d(DVec2::new(0.0, 0.0), wp, Group::Fixed);
        let p2 = sys.add_point_2d(DVec2::new(5.0, 0.0), wp, Group::Free);
        sys.add_constraint(ConstraintType::PtPtDistance, 10.0, &[p1, p2], Some(wp), Group::Free);

        let result = sys.solve(Group::Free);
        assert_eq!(result.code, 0);
        assert_relative_eq!(sys.point_2d(p2).unwrap().length(), 10.0, epsilon = 1e-8);
        assert_eq!(sys.point_2d(p1).unwrap(), DVec2::ZERO);
    }

    #[test]
    fn test_contradiction_is_inconsistent() {
        let (mut sys, wp) = planar();
        let p1 = sys.add_point_2d(DVec2::new(0.0, 0.0), wp, Group::Fixed);
        let p2 = sys.add_point_2d(DVec2::new(5.0, 0.0), wp, Group::Free);
        sys.add_constraint(ConstraintType::PtPtDistance, 10.0, &[p1, p2], Some(wp), Group::Free);
        let second = sys.add_constraint(ConstraintType::PtPtDistance, 20.0, &[p1, p2], Some(wp), Group::Free);

        let result = sys.solve(Group::Free);
        assert_eq!(SolverState::from_code(result.code), SolverState::Inconsistent);
        assert_eq!(result.failed, vec![second]);
        // Nothing moves on failure
        assert_eq!(sys.point_2d(p2).unwrap(), DVec2::new(5.0, 0.0));
    }

    #[test]
    fn test_duplicate_is_redundant() {
        let (mut sys, wp) = planar();
        let p1 = sys.add_point_2d(DVec2::new(0.0, 0.0), wp, Group::Free);
        let p2 = sys.add_point_2d(DVec2::new(4.0, 1.0), wp, Group::Free);
        let line = sys.add_line(p1, p2, Some(wp));
        sys.add_constraint(ConstraintType::Horizontal, 0.0, &[line], Some(wp), Group::Free);
        let again = sys.add_constraint(ConstraintType::Horizontal, 0.0, &[line], Some(wp), Group::Free);

        let result = sys.solve(Group::Free);
        assert_eq!(SolverState::from_code(result.code), SolverState::RedundantOkay);
        assert_eq!(result.failed, vec![again]);
    }

    #[test]
    fn test_arc_endpoints_share_radius() {
        let (mut sys, wp) = planar();
        let nm = sys.add_normal_2d(wp);
        let ct = sys.add_point_2d(DVec2::ZERO, wp, Group::Fixed);
        let p1 = sys.add_point_2d(DVec2::new(1.0, 0.0), wp, Group::Fixed);
        let p2 = sys.add_point_2d(DVec2::new(0.0, 2.0), wp, Group::Free);
        sys.add_arc(nm, ct, p1, p2, wp, Group::Free);

        let result = sys.solve(Group::Free);
        assert_eq!(result.code, 0);
        assert_relative_eq!(sys.point_2d(p2).unwrap().length(), 1.0, epsilon = 1e-8);
        assert_eq!(result.dof, 1);
    }

    #[test]
    fn test_line_tangent_keeps_side() {
        let (mut sys, wp) = planar();
        let nm = sys.add_normal_2d(wp);
        let ct = sys.add_point_2d(DVec2::new(0.0, 3.0), wp, Group::Free);
        let circle = sys.add_circle(nm, ct, 1.0, wp, Group::Fixed);
        let a = sys.add_point_2d(DVec2::new(-5.0, 0.0), wp, Group::Fixed);
        let b = sys.add_point_2d(DVec2::new(5.0, 0.0), wp, Group::Fixed);
        let line = sys.add_line(a, b, Some(wp));
        sys.add_constraint(ConstraintType::LineTangent, 0.0, &[circle, line], Some(wp), Group::Free);

        let result = sys.solve(Group::Free);
        assert_eq!(result.code, 0);
        assert_relative_eq!(sys.point_2d(ct).unwrap().y, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_point_in_plane_3d() {
        let mut sys = NewtonSystem::new(SolverConfig::default());
        let origin = sys.add_point_3d(DVec3::ZERO, Group::Fixed);
        let normal = sys.add_normal_3d(DQuat::from_rotation_x(std::f64::consts::FRAC_PI_2), Group::Fixed);
        let wp = sys.add_workplane(origin, normal);
        let p = sys.add_point_3d(DVec3::new(1.0, 2.0, 3.0), Group::Free);
        sys.add_constraint(ConstraintType::PtInPlane, 0.0, &[p, wp], None, Group::Free);

        let result = sys.solve(Group::Free);
        assert_eq!(result.code, 0);
        // XZ plane: y vanishes, the rest barely moves
        let solved = sys.point_3d(p).unwrap();
        assert!(solved.y.abs() < 1e-8, "Point should lie in the plane, got {}", solved);
        assert_relative_eq!(solved.x, 1.0, epsilon = 1e-6);
        assert_eq!(result.dof, 2);
    }

    #[test]
    fn test_bad_input_is_init_error() {
        let (mut sys, wp) = planar();
        let p = sys.add_point_2d(DVec2::ZERO, wp, Group::Free);
        // Horizontal needs a line
        sys.add_constraint(ConstraintType::Horizontal, 0.0, &[p], Some(wp), Group::Free);
        assert_eq!(SolverState::from_code(sys.solve(Group::Free).code), SolverState::InitError);
    }

    #[test]
    fn test_too_many_unknowns() {
        let config = SolverConfig {
            max_unknowns: 1,
            ..Default::default()
        };
        let mut sys = NewtonSystem::new(config);
        sys.add_point_3d(DVec3::ZERO, Group::Free);
        assert_eq!(
            SolverState::from_code(sys.solve(Group::Free).code),
            SolverState::TooManyUnknowns
        );
    }

    #[test]
    fn test_empty_system_is_okay() {
        let mut sys = NewtonSystem::new(SolverConfig::default());
        let result = sys.solve(Group::Free);
        assert_eq!(result.code, 0);
        assert_eq!(result.dof, 0);
    }
}
