//! Solve pipeline
//!
//! Collects the entities and constraints of one scope, translates them into
//! a [`SolverSystem`], solves, copies the solution back into the scene and
//! classifies the outcome.

use std::collections::HashMap;

use sk_core::{
    Constraint, ConstraintKind, EntityData, EntityKind, Handle, Scene, SolverConfig, SolverState,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ConstraintType, Group, SolverBackend, SolverHandle, SolverSystem, default_backend};

/// Outcome of one sketch or of the 3D space
#[derive(Debug, Clone, PartialEq)]
pub struct GroupResult {
    /// Solved sketch, `None` for the 3D space
    pub sketch: Option<Handle>,
    pub state: SolverState,
    /// Constraints reported by the solver
    pub failed: Vec<Uuid>,
    /// Remaining degrees of freedom
    pub dof: i32,
}

/// Results of every group solved by one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    pub groups: Vec<GroupResult>,
}

impl SolveReport {
    /// Worst state over all groups
    pub fn state(&self) -> SolverState {
        self.groups
            .iter()
            .map(|g| g.state)
            .fold(SolverState::Okay, |worst, state| {
                if state.severity() > worst.severity() {
                    state
                } else {
                    worst
                }
            })
    }

    pub fn is_ok(&self) -> bool {
        self.state().is_ok()
    }

    /// Failed constraints of every group
    pub fn failed(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.groups.iter().flat_map(|g| g.failed.iter().copied())
    }

    /// Result for one sketch, or for the 3D space with `None`
    pub fn group(&self, sketch: Option<Handle>) -> Option<&GroupResult> {
        self.groups.iter().find(|g| g.sketch == sketch)
    }
}

/// What a call to [`SolvePipeline::solve`] did
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Solved(SolveReport),
    /// No solver backend is available; the scene was not touched
    Unavailable,
}

impl SolveOutcome {
    pub fn report(&self) -> Option<&SolveReport> {
        match self {
            SolveOutcome::Solved(report) => Some(report),
            SolveOutcome::Unavailable => None,
        }
    }
}

/// Scene handles mapped to their solver counterparts
#[derive(Default)]
struct Translation {
    entities: HashMap<Handle, SolverHandle>,
    constraints: HashMap<SolverHandle, Uuid>,
}

struct Translator<'a> {
    scene: &'a Scene,
    scope: Option<Handle>,
    system: &'a mut dyn SolverSystem,
    result: Translation,
}

impl Translator<'_> {
    /// Entities outside the solved scope, fixed ones and origin elements
    /// are constants
    fn group(&self, handle: Handle) -> Group {
        match self.scene.entities().get(handle) {
            Some(entity) if !entity.is_fixed() && entity.sketch() == self.scope => Group::Free,
            _ => Group::Fixed,
        }
    }

    /// Translate an entity and everything it references. A sketch maps to
    /// its workplane.
    fn entity(&mut self, handle: Handle) -> Option<SolverHandle> {
        if let Some(solver) = self.result.entities.get(&handle) {
            return Some(*solver);
        }
        let scene = self.scene;
        let group = self.group(handle);
        let solver = match scene.entities().get(handle)?.data() {
            EntityData::Point3D { location } => self.system.add_point_3d(*location, group),
            EntityData::Normal3D { orientation } => self.system.add_normal_3d(*orientation, group),
            EntityData::Line3D { p1, p2 } => {
                let p1 = self.entity(*p1)?;
                let p2 = self.entity(*p2)?;
                self.system.add_line(p1, p2, None)
            }
            EntityData::Workplane { p1, nm } => {
                let origin = self.entity(*p1)?;
                let normal = self.entity(*nm)?;
                self.system.add_workplane(origin, normal)
            }
            EntityData::Sketch(data) => self.entity(data.wp)?,
            EntityData::Point2D { co, sketch } => {
                let wp = self.entity(*sketch)?;
                self.system.add_point_2d(*co, wp, group)
            }
            EntityData::Line2D { p1, p2, sketch } => {
                let wp = self.entity(*sketch)?;
                let p1 = self.entity(*p1)?;
                let p2 = self.entity(*p2)?;
                self.system.add_line(p1, p2, Some(wp))
            }
            EntityData::Normal2D { sketch } => {
                let wp = self.entity(*sketch)?;
                self.system.add_normal_2d(wp)
            }
            EntityData::Arc {
                nm, ct, p1, p2, sketch, ..
            } => {
                let wp = self.entity(*sketch)?;
                let nm = self.entity(*nm)?;
                let ct = self.entity(*ct)?;
                let p1 = self.entity(*p1)?;
                let p2 = self.entity(*p2)?;
                self.system.add_arc(nm, ct, p1, p2, wp, group)
            }
            EntityData::Circle {
                nm,
                ct,
                radius,
                sketch,
            } => {
                let wp = self.entity(*sketch)?;
                let nm = self.entity(*nm)?;
                let ct = self.entity(*ct)?;
                self.system.add_circle(nm, ct, *radius, wp, group)
            }
        };
        self.result.entities.insert(handle, solver);
        Some(solver)
    }

    fn constraint(&mut self, constraint: &Constraint) -> Option<SolverHandle> {
        let scene = self.scene;
        let kind_of = |handle: Handle| scene.entities().kind_of(handle);
        let (kind, value, entities) = match &constraint.kind {
            ConstraintKind::Coincident { entity1, entity2 } => {
                let kind = match kind_of(*entity2)? {
                    EntityKind::Workplane => ConstraintType::PtInPlane,
                    k if k.is_line() => ConstraintType::PtOnLine,
                    k if k.is_point() => ConstraintType::PointsCoincident,
                    _ => return None,
                };
                (kind, 0.0, vec![*entity1, *entity2])
            }
            ConstraintKind::Horizontal { line } => (ConstraintType::Horizontal, 0.0, vec![*line]),
            ConstraintKind::Vertical { line } => (ConstraintType::Vertical, 0.0, vec![*line]),
            ConstraintKind::Parallel { line1, line2 } => {
                (ConstraintType::Parallel, 0.0, vec![*line1, *line2])
            }
            ConstraintKind::Perpendicular { line1, line2 } => {
                (ConstraintType::Perpendicular, 0.0, vec![*line1, *line2])
            }
            ConstraintKind::Equal { entity1, entity2 } => {
                let kind = if kind_of(*entity1)?.is_line() {
                    ConstraintType::EqualLength
                } else {
                    ConstraintType::EqualRadius
                };
                (kind, 0.0, vec![*entity1, *entity2])
            }
            ConstraintKind::Tangent { curve, other } => {
                let kind = if kind_of(*other)?.is_line() {
                    ConstraintType::LineTangent
                } else {
                    ConstraintType::CurveTangent
                };
                (kind, 0.0, vec![*curve, *other])
            }
            ConstraintKind::Midpoint { point, line } => {
                (ConstraintType::AtMidpoint, 0.0, vec![*point, *line])
            }
            ConstraintKind::PointOnCurve { point, curve } => {
                let kind = if kind_of(*curve)?.is_line() {
                    ConstraintType::PtOnLine
                } else {
                    ConstraintType::PtOnCircle
                };
                (kind, 0.0, vec![*point, *curve])
            }
            ConstraintKind::Distance {
                entity1,
                entity2,
                value,
            } => {
                let kind = match kind_of(*entity2)? {
                    EntityKind::Workplane => ConstraintType::PtPlaneDistance,
                    k if k.is_line() => ConstraintType::PtLineDistance,
                    k if k.is_point() => ConstraintType::PtPtDistance,
                    _ => return None,
                };
                (kind, *value, vec![*entity1, *entity2])
            }
            ConstraintKind::Angle {
                line1,
                line2,
                value,
            } => (ConstraintType::Angle, *value, vec![*line1, *line2]),
            ConstraintKind::Diameter {
                curve,
                value,
                setting,
            } => {
                let diameter = if *setting { value * 2.0 } else { *value };
                (ConstraintType::Diameter, diameter, vec![*curve])
            }
        };

        let workplane = match constraint.sketch {
            Some(sketch) => Some(self.entity(sketch)?),
            None => None,
        };
        let handles = entities
            .into_iter()
            .map(|handle| self.entity(handle))
            .collect::<Option<Vec<_>>>()?;
        let solver = self
            .system
            .add_constraint(kind, value, &handles, workplane, Group::Free);
        self.result.constraints.insert(solver, constraint.id);
        Some(solver)
    }
}

/// Runs solves of a scene against one backend
pub struct SolvePipeline {
    backend: Box<dyn SolverBackend>,
    available: bool,
    config: SolverConfig,
}

impl SolvePipeline {
    pub fn new(backend: Box<dyn SolverBackend>, config: SolverConfig) -> Self {
        let available = backend.is_available();
        if available {
            debug!("Using solver backend '{}'", backend.name());
        } else {
            warn!("Solver backend '{}' is not available", backend.name());
        }
        Self {
            backend,
            available,
            config,
        }
    }

    /// Pipeline over [`default_backend`]
    pub fn with_default_backend(config: SolverConfig) -> Self {
        Self::new(default_backend(), config)
    }

    /// Decided once, when the pipeline was created
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve one sketch, or with `None` the 3D space and then every sketch.
    pub fn solve(&self, scene: &mut Scene, sketch: Option<Handle>) -> SolveOutcome {
        if !self.available {
            debug!("Skipping solve, no solver available");
            return SolveOutcome::Unavailable;
        }

        let scopes: Vec<Option<Handle>> = match sketch {
            Some(sketch) => vec![Some(sketch)],
            None => std::iter::once(None)
                .chain(
                    scene
                        .entities()
                        .slab(EntityKind::Sketch)
                        .iter()
                        .map(|e| Some(e.handle())),
                )
                .collect(),
        };

        let groups = scopes
            .into_iter()
            .map(|scope| self.solve_group(scene, scope))
            .collect();
        SolveOutcome::Solved(SolveReport { groups })
    }

    fn solve_group(&self, scene: &mut Scene, scope: Option<Handle>) -> GroupResult {
        let label = scope.map_or_else(|| "3D space".to_string(), |s| format!("sketch {s}"));
        let failure = |state| GroupResult {
            sketch: scope,
            state,
            failed: Vec::new(),
            dof: 0,
        };

        if let Some(sketch) = scope
            && !scene.entities().is_kind(sketch, EntityKind::Sketch)
        {
            warn!("Cannot solve {}: not a sketch", sketch);
            return failure(SolverState::InitError);
        }

        for constraint in scene.constraints_mut().iter_mut() {
            if constraint.sketch == scope {
                constraint.failed = false;
            }
        }

        let Some(mut system) = self.backend.create_system(&self.config) else {
            warn!("Solver backend '{}' failed to create a system", self.backend.name());
            return self.finish(scene, failure(SolverState::InitError));
        };

        // Collect and translate
        let Some(translation) = translate(scene, scope, system.as_mut()) else {
            warn!("Failed to translate {} for the solver", label);
            return self.finish(scene, failure(SolverState::InitError));
        };

        let raw = system.solve(Group::Free);
        let state = SolverState::from_code(raw.code);
        let mut failed: Vec<Uuid> = raw
            .failed
            .iter()
            .filter_map(|h| translation.constraints.get(h).copied())
            .collect();
        failed.dedup();

        if state.is_ok() {
            let changed = write_back(scene, scope, &translation, system.as_ref());
            remeasure_references(scene, scope);
            info!(
                "Solved {}: {} ({} entities changed, {} dof)",
                label, state, changed, raw.dof
            );
        } else {
            warn!(
                "Solving {} failed: {} ({} failed constraints)",
                label,
                state,
                failed.len()
            );
        }

        for id in &failed {
            if let Some(constraint) = scene.constraints_mut().get_mut(*id) {
                constraint.failed = true;
            }
        }

        self.finish(
            scene,
            GroupResult {
                sketch: scope,
                state,
                failed,
                dof: raw.dof,
            },
        )
    }

    /// Store the state on the solved sketch
    fn finish(&self, scene: &mut Scene, result: GroupResult) -> GroupResult {
        if let Some(sketch) = result.sketch
            && let Err(e) = scene.entities_mut().set_solver_state(sketch, result.state)
        {
            warn!("Failed to store solver state: {}", e);
        }
        result
    }
}

fn translate(scene: &Scene, scope: Option<Handle>, system: &mut dyn SolverSystem) -> Option<Translation> {
    let mut translator = Translator {
        scene,
        scope,
        system,
        result: Translation::default(),
    };

    // Construction entities only come in through references
    let members: Vec<Handle> = scene
        .entities()
        .all()
        .filter(|e| e.sketch() == scope && !e.kind().is_sketch() && !e.construction)
        .map(|e| e.handle())
        .collect();
    for handle in members {
        translator.entity(handle)?;
    }

    for constraint in scene.constraints().in_scope(scope).filter(|c| !c.is_reference) {
        translator.constraint(constraint)?;
    }

    debug!(
        "Translated {} entities and {} constraints",
        translator.result.entities.len(),
        translator.result.constraints.len()
    );
    Some(translator.result)
}

/// Copy solved values of free entities into the scene. Returns the number of
/// entities that changed.
fn write_back(
    scene: &mut Scene,
    scope: Option<Handle>,
    translation: &Translation,
    system: &dyn SolverSystem,
) -> usize {
    let mut changed = 0;
    for (&handle, &solver) in &translation.entities {
        let kind = match scene.entities().get(handle) {
            Some(entity) if !entity.is_fixed() && entity.sketch() == scope => entity.kind(),
            _ => continue,
        };
        let store = scene.entities_mut();
        let result = match kind {
            EntityKind::Point3D => system.point_3d(solver).map(|v| store.set_location(handle, v)),
            EntityKind::Point2D => system.point_2d(solver).map(|v| store.set_co(handle, v)),
            EntityKind::Normal3D => system.normal_3d(solver).map(|v| store.set_orientation(handle, v)),
            EntityKind::Circle => system.distance(solver).map(|v| store.set_radius(handle, v)),
            _ => None,
        };
        match result {
            Some(Ok(true)) => changed += 1,
            Some(Err(e)) => warn!("Failed to write back {}: {}", handle, e),
            _ => {}
        }
    }
    changed
}

/// Reference constraints follow the geometry instead of driving it
fn remeasure_references(scene: &mut Scene, scope: Option<Handle>) {
    let measured: Vec<(Uuid, f64)> = scene
        .constraints()
        .in_scope(scope)
        .filter(|c| c.is_reference)
        .filter_map(|c| Some((c.id, scene.measure(&c.kind)?)))
        .collect();
    for (id, value) in measured {
        if let Some(constraint) = scene.constraints_mut().get_mut(id) {
            constraint.kind.set_value(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn test_report_state_is_worst() {
        let group = |state| GroupResult {
            sketch: None,
            state,
            failed: Vec::new(),
            dof: 0,
        };
        let mut report = SolveReport::default();
        assert_eq!(report.state(), SolverState::Okay);

        report.groups.push(group(SolverState::RedundantOkay));
        assert_eq!(report.state(), SolverState::RedundantOkay);
        assert!(report.is_ok());

        report.groups.push(group(SolverState::DidntConverge));
        report.groups.push(group(SolverState::Okay));
        assert_eq!(report.state(), SolverState::DidntConverge);
        assert!(!report.is_ok());
    }

    #[test]
    fn test_null_backend_is_unavailable() {
        let pipeline = SolvePipeline::new(Box::new(NullBackend), SolverConfig::default());
        assert!(!pipeline.is_available());
        assert_eq!(pipeline.backend_name(), "null");

        let mut scene = Scene::new();
        assert_eq!(pipeline.solve(&mut scene, None), SolveOutcome::Unavailable);
    }

    #[test]
    fn test_not_a_sketch() {
        let pipeline = SolvePipeline::new(Box::new(NullBackend), SolverConfig::default());
        let mut scene = Scene::new();
        let origin = scene.entities().origin_elements().origin;
        let result = SolvePipeline {
            available: true,
            ..pipeline
        }
        .solve_group(&mut scene, Some(origin));
        assert_eq!(result.state, SolverState::InitError);
    }
}
