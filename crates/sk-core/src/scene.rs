//! Scene
//!
//! Owns the entity store, the constraints and the active-sketch pointer.
//! Operations that must keep all three consistent live here.

use std::collections::{HashMap, HashSet};

use glam::{DVec2, DVec3};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SketcherConfig;
use crate::constraint::{Constraint, ConstraintKind, ConstraintStore};
use crate::entity::{Entity, EntityData, EntityKind, RefField};
use crate::error::{SketchError, SketchResult};
use crate::geometry::{Curve2D, Endpoint, Frame};
use crate::handle::Handle;
use crate::session::Session;
use crate::store::{EntityStore, Removal};

/// A sketch document: entities, constraints and editing scope
#[derive(Debug, Clone)]
pub struct Scene {
    pub(crate) entities: EntityStore,
    pub(crate) constraints: ConstraintStore,
    pub(crate) active_sketch: Option<Handle>,
    /// Whether origin elements are displayed and selectable
    pub show_origin: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create a scene with its origin elements
    pub fn new() -> Self {
        let mut scene = Self::empty();
        if let Err(e) = scene.entities.ensure_origin_elements() {
            warn!("Failed to create origin elements: {}", e);
        }
        scene
    }

    /// Create a scene with origin elements and the given settings
    pub fn from_config(config: &SketcherConfig) -> Self {
        let mut scene = Self::new();
        scene.apply_config(config);
        scene
    }

    /// Create a scene without any entity, not even the origin elements
    pub fn empty() -> Self {
        Self {
            entities: EntityStore::new(),
            constraints: ConstraintStore::new(),
            active_sketch: None,
            show_origin: true,
        }
    }

    pub fn apply_config(&mut self, config: &SketcherConfig) {
        self.entities.set_dirty_policy(config.dirty_policy);
        self.show_origin = config.show_origin;
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub fn constraints(&self) -> &ConstraintStore {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut ConstraintStore {
        &mut self.constraints
    }

    /// Sketch currently being edited, `None` while working in 3D
    pub fn active_sketch(&self) -> Option<Handle> {
        self.active_sketch
    }

    pub fn set_active_sketch(&mut self, sketch: Option<Handle>) -> SketchResult<()> {
        if let Some(handle) = sketch
            && !self.entities.is_kind(handle, EntityKind::Sketch)
        {
            return Err(SketchError::InvalidReference {
                handle,
                role: "active sketch",
                expected: EntityKind::Sketch.name().to_string(),
            });
        }
        self.active_sketch = sketch;
        Ok(())
    }

    // ============== Constraints ==============

    /// Validate and store a constraint
    pub fn add_constraint(&mut self, constraint: Constraint) -> SketchResult<Uuid> {
        let handles = constraint.entities();
        let mut kinds = Vec::with_capacity(handles.len());
        for handle in &handles {
            let entity =
                self.entities
                    .get(*handle)
                    .ok_or_else(|| SketchError::InvalidReference {
                        handle: *handle,
                        role: "constraint entity",
                        expected: "a live entity".into(),
                    })?;
            kinds.push(entity.kind());
        }

        if !constraint.kind.accepts(&kinds) {
            let kinds: Vec<_> = kinds.iter().map(|k| k.name()).collect();
            return Err(SketchError::UnsupportedConstraint(format!(
                "{} between {}",
                constraint.type_name(),
                kinds.join(", ")
            )));
        }

        if let Some(value) = constraint.kind.value()
            && (!value.is_finite()
                || (value <= 0.0 && matches!(constraint.kind, ConstraintKind::Diameter { .. })))
        {
            return Err(SketchError::InvalidArgument(format!(
                "{} value {value} is out of range",
                constraint.type_name()
            )));
        }

        match constraint.sketch {
            Some(sketch) => {
                if !self.entities.is_kind(sketch, EntityKind::Sketch) {
                    return Err(SketchError::InvalidReference {
                        handle: sketch,
                        role: "constraint sketch",
                        expected: EntityKind::Sketch.name().to_string(),
                    });
                }
                for handle in &handles {
                    if let Some(owner) = self.entities.get(*handle).and_then(Entity::sketch)
                        && owner != sketch
                    {
                        return Err(SketchError::SketchMismatch {
                            entity: *handle,
                            sketch,
                        });
                    }
                }
            }
            None => {
                if let Some(handle) = handles
                    .iter()
                    .find(|h| self.entities.get(**h).is_some_and(Entity::is_2d))
                {
                    return Err(SketchError::InvalidArgument(format!(
                        "2D entity {handle} needs a sketch scoped constraint"
                    )));
                }
            }
        }

        debug!("Adding {} constraint", constraint.type_name());
        Ok(self.constraints.add(constraint))
    }

    // ============== Removal ==============

    /// Remove one entity by swap-to-end compaction.
    ///
    /// The moved entity's references are rewritten everywhere: entities,
    /// origin pointers, constraints, the active sketch and the session.
    /// References to the removed entity itself are left as they are; use
    /// [`Scene::delete`] to drop dependents as well.
    pub fn remove(&mut self, handle: Handle, session: &mut Session) -> Option<Removal> {
        let removal = self.entities.remove(handle)?;
        if self.active_sketch == Some(handle) {
            self.active_sketch = None;
        }
        if let Some(relocation) = removal.relocation {
            self.constraints
                .remap(|h| (h == relocation.from).then_some(relocation.to));
            if self.active_sketch == Some(relocation.from) {
                self.active_sketch = Some(relocation.to);
            }
        }
        session.apply_removal(&removal);
        Some(removal)
    }

    /// Remove several entities, tracking the ones still pending across
    /// relocations. Returns the number of removed entities.
    pub fn remove_many(&mut self, handles: &[Handle], session: &mut Session) -> usize {
        let mut pending: Vec<Handle> = handles.to_vec();
        // Highest slots go first, so pending handles rarely move
        pending.sort_unstable();
        pending.dedup();

        let mut removed = 0;
        while let Some(handle) = pending.pop() {
            let Some(removal) = self.remove(handle, session) else {
                continue;
            };
            removed += 1;
            if let Some(relocation) = removal.relocation {
                for h in pending.iter_mut().filter(|h| **h == relocation.from) {
                    *h = relocation.to;
                }
            }
        }
        removed
    }

    /// Remove an entity together with every entity depending on it and
    /// every constraint referencing any of them.
    ///
    /// Returns the number of removed entities.
    pub fn delete(&mut self, handle: Handle, session: &mut Session) -> usize {
        let Some(entity) = self.entities.get(handle) else {
            return 0;
        };
        if entity.is_origin() {
            warn!("Cannot delete origin element {}", entity);
            return 0;
        }

        let mut doomed = HashSet::from([handle]);
        loop {
            let found: Vec<Handle> = self
                .entities
                .all()
                .filter(|e| !e.is_origin() && !doomed.contains(&e.handle()))
                .filter(|e| e.dependencies().iter().any(|d| doomed.contains(d)))
                .map(Entity::handle)
                .collect();
            if found.is_empty() {
                break;
            }
            doomed.extend(found);
        }

        let constraint_ids: Vec<Uuid> = self
            .constraints
            .iter()
            .filter(|c| doomed.iter().any(|h| c.references(*h)))
            .map(|c| c.id)
            .collect();
        for id in &constraint_ids {
            self.constraints.remove(*id);
        }

        let handles: Vec<Handle> = doomed.into_iter().collect();
        let removed = self.remove_many(&handles, session);
        info!(
            "Deleted {} entities and {} constraints",
            removed,
            constraint_ids.len()
        );
        removed
    }

    // ============== Reference Graph ==============

    /// Rewrite every reference to `old` into `new` across entities, origin
    /// pointers, constraints and the active sketch
    pub fn update_pointers(&mut self, old: Handle, new: Handle) {
        if old == new || old.is_none() {
            return;
        }
        self.entities.update_pointers(old, new);
        self.constraints.remap(|h| (h == old).then_some(new));
        if self.active_sketch == Some(old) {
            self.active_sketch = Some(new);
        }
    }

    /// Simultaneous rewrite through a handle map
    pub fn update_pointers_map(&mut self, map: &HashMap<Handle, Handle>) {
        self.entities.update_pointers_map(map);
        self.constraints.remap(|h| map.get(&h).copied());
        if let Some(active) = self.active_sketch
            && let Some(new) = map.get(&active)
        {
            self.active_sketch = Some(*new);
        }
    }

    /// Whether any entity or constraint references `handle`
    pub fn is_referenced(&self, handle: Handle) -> bool {
        self.entities.is_referenced(handle) || self.constraints.is_referenced(handle)
    }

    // ============== Visibility & Selection ==============

    pub fn is_visible(&self, entity: &Entity) -> bool {
        if entity.is_origin() {
            return self.show_origin;
        }
        match entity.sketch() {
            Some(sketch) => {
                entity.visible
                    && self
                        .entities
                        .get(sketch)
                        .is_some_and(|sketch| self.is_visible(sketch))
            }
            None => entity.visible,
        }
    }

    /// Visible, and either active or on a sketch sharing the active
    /// sketch's workplane
    pub fn is_selectable(&self, entity: &Entity) -> bool {
        if !self.is_visible(entity) {
            return false;
        }
        if let (Some(active), Some(sketch)) = (self.active_sketch, entity.sketch()) {
            let active_wp = self.sketch_workplane(active);
            return active_wp.is_some() && active_wp == self.sketch_workplane(sketch);
        }
        entity.is_active(self.active_sketch)
    }

    /// Selected entities that can currently be selected
    pub fn selected<'a>(&'a self, session: &'a Session) -> impl Iterator<Item = &'a Entity> + Clone {
        self.entities
            .all()
            .filter(move |e| session.is_selected(e.handle()) && self.is_selectable(e))
    }

    /// Selected entities that are also active
    pub fn selected_active<'a>(
        &'a self,
        session: &'a Session,
    ) -> impl Iterator<Item = &'a Entity> + Clone {
        let active = self.active_sketch;
        self.selected(session).filter(move |e| e.is_active(active))
    }

    /// Every selected entity, selectable or not
    pub fn selected_all<'a>(
        &'a self,
        session: &'a Session,
    ) -> impl Iterator<Item = &'a Entity> + Clone {
        self.entities
            .all()
            .filter(move |e| session.is_selected(e.handle()))
    }

    // ============== Geometry Access ==============

    /// Workplane of a sketch
    pub fn sketch_workplane(&self, sketch: Handle) -> Option<Handle> {
        Some(self.entities.get(sketch)?.as_sketch()?.wp)
    }

    /// Placement of a workplane
    pub fn workplane_frame(&self, wp: Handle) -> Option<Frame> {
        let EntityData::Workplane { p1, nm } = self.entities.get(wp)?.data() else {
            return None;
        };
        let EntityData::Point3D { location } = self.entities.get(*p1)?.data() else {
            return None;
        };
        let EntityData::Normal3D { orientation } = self.entities.get(*nm)?.data() else {
            return None;
        };
        Some(Frame {
            origin: *location,
            rotation: *orientation,
        })
    }

    /// Placement of a sketch's workplane
    pub fn sketch_frame(&self, sketch: Handle) -> Option<Frame> {
        self.workplane_frame(self.sketch_workplane(sketch)?)
    }

    /// World position of a 3D or 2D point
    pub fn location(&self, handle: Handle) -> Option<DVec3> {
        match self.entities.get(handle)?.data() {
            EntityData::Point3D { location } => Some(*location),
            EntityData::Point2D { co, sketch } => Some(self.sketch_frame(*sketch)?.to_world(*co)),
            _ => None,
        }
    }

    /// Workplane coordinates of a 2D point
    pub fn co(&self, handle: Handle) -> Option<DVec2> {
        match self.entities.get(handle)?.data() {
            EntityData::Point2D { co, .. } => Some(*co),
            _ => None,
        }
    }

    /// World direction of a 3D or 2D normal
    pub fn normal(&self, handle: Handle) -> Option<DVec3> {
        match self.entities.get(handle)?.data() {
            EntityData::Normal3D { orientation } => Some(*orientation * DVec3::Z),
            EntityData::Normal2D { sketch } => Some(self.sketch_frame(*sketch)?.normal()),
            _ => None,
        }
    }

    /// World positions of the endpoints of a line or arc
    pub fn segment_endpoints(&self, handle: Handle) -> Option<(DVec3, DVec3)> {
        let entity = self.entities.get(handle)?;
        let p1 = entity.data().reference(RefField::P1)?;
        let p2 = entity.data().reference(RefField::P2)?;
        Some((self.location(p1)?, self.location(p2)?))
    }

    /// Snapshot of a 2D line, arc or circle in workplane coordinates
    pub fn curve_2d(&self, handle: Handle) -> Option<Curve2D> {
        match self.entities.get(handle)?.data() {
            EntityData::Line2D { p1, p2, .. } => Some(Curve2D::Line {
                p1: self.co(*p1)?,
                p2: self.co(*p2)?,
            }),
            EntityData::Arc {
                ct,
                p1,
                p2,
                invert_direction,
                ..
            } => Some(Curve2D::Arc {
                center: self.co(*ct)?,
                p1: self.co(*p1)?,
                p2: self.co(*p2)?,
                invert: *invert_direction,
            }),
            EntityData::Circle { ct, radius, .. } => Some(Curve2D::Circle {
                center: self.co(*ct)?,
                radius: *radius,
            }),
            _ => None,
        }
    }

    /// Lines and arcs that end in `point`
    pub fn connected_segments(&self, point: Handle) -> Vec<Handle> {
        EntityKind::ALL
            .into_iter()
            .filter(|kind| kind.is_segment())
            .flat_map(|kind| self.entities.slab(kind))
            .filter(|e| e.connection_points().contains(&point))
            .map(Entity::handle)
            .collect()
    }

    /// Point shared by two segments
    pub fn connection_point(&self, a: Handle, b: Handle) -> Option<Handle> {
        let second = self.entities.get(b)?.connection_points();
        self.entities
            .get(a)?
            .connection_points()
            .into_iter()
            .find(|p| second.contains(p))
    }

    fn endpoint_at(&self, segment: Handle, point: Handle) -> Option<Endpoint> {
        let data = self.entities.get(segment)?.data();
        if data.reference(RefField::P1)? == point {
            Some(Endpoint::P1)
        } else if data.reference(RefField::P2)? == point {
            Some(Endpoint::P2)
        } else {
            None
        }
    }

    /// Signed angle between two 2D segments at their shared point
    pub fn connection_angle(&self, a: Handle, b: Handle) -> Option<f64> {
        let point = self.connection_point(a, b)?;
        self.curve_2d(a)?.connection_angle(
            self.endpoint_at(a, point)?,
            &self.curve_2d(b)?,
            self.endpoint_at(b, point)?,
        )
    }

    /// Intersections of two 2D curves, excluding their endpoints
    pub fn intersect(&self, a: Handle, b: Handle) -> Vec<DVec2> {
        match (self.curve_2d(a), self.curve_2d(b)) {
            (Some(first), Some(second)) => first.intersect(&second),
            _ => Vec::new(),
        }
    }

    /// Current value of a dimensional constraint, measured from geometry
    pub fn measure(&self, kind: &ConstraintKind) -> Option<f64> {
        match kind {
            ConstraintKind::Distance {
                entity1, entity2, ..
            } => {
                let point = self.location(*entity1)?;
                match self.entities.kind_of(*entity2)? {
                    EntityKind::Point3D | EntityKind::Point2D => {
                        Some(point.distance(self.location(*entity2)?))
                    }
                    EntityKind::Line3D | EntityKind::Line2D => {
                        let (a, b) = self.segment_endpoints(*entity2)?;
                        let dir = (b - a).try_normalize()?;
                        Some((point - a).cross(dir).length())
                    }
                    EntityKind::Workplane => {
                        let frame = self.workplane_frame(*entity2)?;
                        Some((point - frame.origin).dot(frame.normal()).abs())
                    }
                    _ => None,
                }
            }
            ConstraintKind::Angle { line1, line2, .. } => {
                let (a1, b1) = self.segment_endpoints(*line1)?;
                let (a2, b2) = self.segment_endpoints(*line2)?;
                let d1 = (b1 - a1).try_normalize()?;
                let d2 = (b2 - a2).try_normalize()?;
                Some(d1.dot(d2).clamp(-1.0, 1.0).acos())
            }
            ConstraintKind::Diameter { curve, setting, .. } => {
                let radius = self.curve_2d(*curve)?.radius()?;
                Some(if *setting { radius } else { radius * 2.0 })
            }
            _ => None,
        }
    }
}
