//! Entity store
//!
//! Ten homogeneous slabs, one per [`EntityKind`]. An entity's handle encodes
//! its kind and its slot, so lookup is two indexing operations. Removing an
//! entity moves the last entity of the slab into the freed slot and rewrites
//! every reference to the moved entity.

use glam::{DQuat, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{DEFAULT_SKETCH_NAME, GEOMETRY_EPSILON, QUARTER_TURN};
use crate::config::DirtyPolicy;
use crate::entity::{Entity, EntityData, EntityKind, KIND_COUNT, SketchData, TargetObject};
use crate::error::{SketchError, SketchResult};
use crate::handle::{Handle, MAX_SLOTS};
use crate::state::SolverState;

/// Pointers to the protected origin elements of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginElements {
    /// World origin point
    pub origin: Handle,
    pub axis_x: Handle,
    pub axis_y: Handle,
    pub axis_z: Handle,
    pub plane_xy: Handle,
    pub plane_xz: Handle,
    pub plane_yz: Handle,
}

impl OriginElements {
    /// All origin pointers
    pub fn handles(&self) -> [Handle; 7] {
        [
            self.origin,
            self.axis_x,
            self.axis_y,
            self.axis_z,
            self.plane_xy,
            self.plane_xz,
            self.plane_yz,
        ]
    }

    pub(crate) fn handles_mut(&mut self) -> [&mut Handle; 7] {
        [
            &mut self.origin,
            &mut self.axis_x,
            &mut self.axis_y,
            &mut self.axis_z,
            &mut self.plane_xy,
            &mut self.plane_xz,
            &mut self.plane_yz,
        ]
    }
}

/// An entity moved to a new handle by compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Handle before the move
    pub from: Handle,
    /// Handle after the move
    pub to: Handle,
}

/// Outcome of removing one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// The entity that was removed, still carrying its old handle
    pub removed: Entity,
    /// The entity that took over the freed slot, if any
    pub relocation: Option<Relocation>,
}

/// Handle-addressed storage for all entities of a scene
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    pub(crate) slabs: [Vec<Entity>; KIND_COUNT],
    pub(crate) origin: OriginElements,
    pub(crate) dirty_policy: DirtyPolicy,
}

fn ensure_finite(values: &[f64], what: &str) -> SketchResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SketchError::InvalidArgument(format!(
            "{what} must be finite, got {values:?}"
        )))
    }
}

fn wrong_kind(handle: Handle, kind: EntityKind) -> SketchError {
    SketchError::InvalidReference {
        handle,
        role: "target",
        expected: kind.name().to_string(),
    }
}

/// Store `value` in `slot`. Returns whether it differed.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

impl EntityStore {
    /// Create an empty store without origin elements
    pub fn new() -> Self {
        Self::default()
    }

    // ============== Lookup ==============

    /// Resolve a handle. Unknown handles and `-1` yield `None`.
    pub fn get(&self, handle: Handle) -> Option<&Entity> {
        if handle.is_none() {
            return None;
        }
        let (kind, slot) = handle.breakdown();
        self.slabs.get(kind)?.get(slot)
    }

    /// Resolve a handle mutably
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Entity> {
        if handle.is_none() {
            return None;
        }
        let (kind, slot) = handle.breakdown();
        self.slabs.get_mut(kind)?.get_mut(slot)
    }

    /// Whether a handle addresses a live entity
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Kind of a live entity
    pub fn kind_of(&self, handle: Handle) -> Option<EntityKind> {
        self.get(handle).map(Entity::kind)
    }

    /// Whether `handle` is a live entity of `kind`
    pub fn is_kind(&self, handle: Handle, kind: EntityKind) -> bool {
        self.kind_of(handle) == Some(kind)
    }

    /// Entities of one kind, in slot order
    pub fn slab(&self, kind: EntityKind) -> &[Entity] {
        &self.slabs[kind.index()]
    }

    /// All entities, in slot order within a kind and kind order overall.
    ///
    /// The iterator is lazy and can be cloned to restart it.
    pub fn all(&self) -> impl Iterator<Item = &Entity> + Clone {
        self.slabs.iter().flatten()
    }

    /// Snapshot of all handles, in the order of [`EntityStore::all`]
    pub fn handles(&self) -> Vec<Handle> {
        self.all().map(Entity::handle).collect()
    }

    /// Total number of entities
    pub fn len(&self) -> usize {
        self.slabs.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slabs.iter().all(Vec::is_empty)
    }

    /// Number of entities per kind, indexed by kind tag
    pub fn collection_offsets(&self) -> [usize; KIND_COUNT] {
        std::array::from_fn(|i| self.slabs[i].len())
    }

    /// Pointers to the origin elements
    pub fn origin_elements(&self) -> &OriginElements {
        &self.origin
    }

    fn expect(
        &self,
        handle: Handle,
        role: &'static str,
        kinds: &[EntityKind],
    ) -> SketchResult<&Entity> {
        match self.get(handle) {
            Some(entity) if kinds.contains(&entity.kind()) => Ok(entity),
            _ => Err(SketchError::InvalidReference {
                handle,
                role,
                expected: kinds
                    .iter()
                    .map(|kind| kind.name())
                    .collect::<Vec<_>>()
                    .join(" or "),
            }),
        }
    }

    fn expect_in_sketch(
        &self,
        handle: Handle,
        role: &'static str,
        kinds: &[EntityKind],
        sketch: Handle,
    ) -> SketchResult<()> {
        let entity = self.expect(handle, role, kinds)?;
        if entity.is_2d() && entity.sketch() != Some(sketch) {
            return Err(SketchError::SketchMismatch {
                entity: handle,
                sketch,
            });
        }
        Ok(())
    }

    // ============== Creation ==============

    fn push(&mut self, data: EntityData) -> SketchResult<Handle> {
        let kind = data.kind();
        let slab = &mut self.slabs[kind.index()];
        if slab.len() >= MAX_SLOTS {
            return Err(SketchError::SlabFull(kind));
        }
        let handle = Handle::assemble(kind.index(), slab.len());
        slab.push(Entity::new(handle, data));
        Ok(handle)
    }

    /// Add a point in 3D space
    pub fn add_point_3d(&mut self, location: impl Into<DVec3>) -> SketchResult<Handle> {
        let location = location.into();
        ensure_finite(&location.to_array(), "point location")?;
        self.push(EntityData::Point3D { location })
    }

    /// Add a point in 3D space from untyped coordinates
    pub fn add_point_3d_from_slice(&mut self, coords: &[f64]) -> SketchResult<Handle> {
        let coords: [f64; 3] = coords.try_into().map_err(|_| {
            SketchError::InvalidArgument(format!(
                "a 3D point needs 3 coordinates, got {}",
                coords.len()
            ))
        })?;
        self.add_point_3d(coords)
    }

    /// Add a line in 3D space between two 3D points
    pub fn add_line_3d(&mut self, p1: Handle, p2: Handle) -> SketchResult<Handle> {
        self.expect(p1, "p1", &[EntityKind::Point3D])?;
        self.expect(p2, "p2", &[EntityKind::Point3D])?;
        self.push(EntityData::Line3D { p1, p2 })
    }

    /// Add a normal in 3D space, described by a rotation of the Z axis
    pub fn add_normal_3d(&mut self, orientation: DQuat) -> SketchResult<Handle> {
        ensure_finite(&orientation.to_array(), "orientation")?;
        if orientation.length_squared() < GEOMETRY_EPSILON {
            return Err(SketchError::InvalidArgument(
                "orientation quaternion must not be zero".into(),
            ));
        }
        self.push(EntityData::Normal3D {
            orientation: orientation.normalize(),
        })
    }

    /// Add a workplane through a 3D point, oriented by a 3D normal
    pub fn add_workplane(&mut self, p1: Handle, nm: Handle) -> SketchResult<Handle> {
        self.expect(p1, "p1", &[EntityKind::Point3D])?;
        self.expect(nm, "nm", &[EntityKind::Normal3D])?;
        self.push(EntityData::Workplane { p1, nm })
    }

    /// Add a sketch on a workplane
    pub fn add_sketch(&mut self, wp: Handle) -> SketchResult<Handle> {
        self.expect(wp, "wp", &[EntityKind::Workplane])?;
        let handle = self.push(EntityData::Sketch(SketchData {
            wp,
            solver_state: SolverState::Okay,
            target: None,
        }))?;
        if let Some(sketch) = self.get_mut(handle) {
            sketch.name = DEFAULT_SKETCH_NAME.to_string();
        }
        Ok(handle)
    }

    /// Add a point on a sketch, in workplane coordinates
    pub fn add_point_2d(&mut self, co: impl Into<DVec2>, sketch: Handle) -> SketchResult<Handle> {
        let co = co.into();
        ensure_finite(&co.to_array(), "point coordinates")?;
        self.expect(sketch, "sketch", &[EntityKind::Sketch])?;
        self.push(EntityData::Point2D { co, sketch })
    }

    /// Add a point on a sketch from untyped coordinates
    pub fn add_point_2d_from_slice(&mut self, coords: &[f64], sketch: Handle) -> SketchResult<Handle> {
        let coords: [f64; 2] = coords.try_into().map_err(|_| {
            SketchError::InvalidArgument(format!(
                "a 2D point needs 2 coordinates, got {}",
                coords.len()
            ))
        })?;
        self.add_point_2d(coords, sketch)
    }

    /// Add a line between two points of the same sketch
    pub fn add_line_2d(&mut self, p1: Handle, p2: Handle, sketch: Handle) -> SketchResult<Handle> {
        self.expect(sketch, "sketch", &[EntityKind::Sketch])?;
        self.expect_in_sketch(p1, "p1", &[EntityKind::Point2D], sketch)?;
        self.expect_in_sketch(p2, "p2", &[EntityKind::Point2D], sketch)?;
        self.push(EntityData::Line2D { p1, p2, sketch })
    }

    /// Add a normal that follows the sketch's workplane
    pub fn add_normal_2d(&mut self, sketch: Handle) -> SketchResult<Handle> {
        self.expect(sketch, "sketch", &[EntityKind::Sketch])?;
        self.push(EntityData::Normal2D { sketch })
    }

    /// Add an arc around `ct` from `p1` to `p2`
    pub fn add_arc(
        &mut self,
        nm: Handle,
        ct: Handle,
        p1: Handle,
        p2: Handle,
        sketch: Handle,
    ) -> SketchResult<Handle> {
        self.expect(sketch, "sketch", &[EntityKind::Sketch])?;
        self.expect_in_sketch(nm, "nm", &[EntityKind::Normal2D, EntityKind::Normal3D], sketch)?;
        self.expect_in_sketch(ct, "ct", &[EntityKind::Point2D], sketch)?;
        self.expect_in_sketch(p1, "p1", &[EntityKind::Point2D], sketch)?;
        self.expect_in_sketch(p2, "p2", &[EntityKind::Point2D], sketch)?;
        self.push(EntityData::Arc {
            nm,
            ct,
            p1,
            p2,
            sketch,
            invert_direction: false,
        })
    }

    /// Add a circle around `ct`
    pub fn add_circle(
        &mut self,
        nm: Handle,
        ct: Handle,
        radius: f64,
        sketch: Handle,
    ) -> SketchResult<Handle> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(SketchError::InvalidArgument(format!(
                "circle radius must be positive, got {radius}"
            )));
        }
        self.expect(sketch, "sketch", &[EntityKind::Sketch])?;
        self.expect_in_sketch(nm, "nm", &[EntityKind::Normal2D, EntityKind::Normal3D], sketch)?;
        self.expect_in_sketch(ct, "ct", &[EntityKind::Point2D], sketch)?;
        self.push(EntityData::Circle {
            nm,
            ct,
            radius,
            sketch,
        })
    }

    // ============== Origin ==============

    fn push_origin(&mut self, data: EntityData, name: &str) -> SketchResult<Handle> {
        let handle = self.push(data)?;
        if let Some(entity) = self.get_mut(handle) {
            entity.name = name.to_string();
            entity.fixed = true;
            entity.origin = true;
        }
        Ok(handle)
    }

    /// Create the origin point, the axis normals and the principal
    /// workplanes, skipping every element that already exists.
    ///
    /// Returns whether anything was created.
    pub fn ensure_origin_elements(&mut self) -> SketchResult<bool> {
        let mut created = false;

        if !self.is_kind(self.origin.origin, EntityKind::Point3D) {
            self.origin.origin =
                self.push_origin(EntityData::Point3D { location: DVec3::ZERO }, "Origin")?;
            created = true;
        }

        let axes = [
            (
                "X Axis",
                DQuat::from_rotation_z(QUARTER_TURN) * DQuat::from_rotation_x(QUARTER_TURN),
            ),
            ("Y Axis", DQuat::from_rotation_x(QUARTER_TURN)),
            ("Z Axis", DQuat::IDENTITY),
        ];
        for (i, (name, orientation)) in axes.into_iter().enumerate() {
            let current = match i {
                0 => self.origin.axis_x,
                1 => self.origin.axis_y,
                _ => self.origin.axis_z,
            };
            if self.is_kind(current, EntityKind::Normal3D) {
                continue;
            }
            let handle = self.push_origin(EntityData::Normal3D { orientation }, name)?;
            match i {
                0 => self.origin.axis_x = handle,
                1 => self.origin.axis_y = handle,
                _ => self.origin.axis_z = handle,
            }
            created = true;
        }

        let planes = [
            ("YZ Plane", self.origin.axis_x),
            ("XZ Plane", self.origin.axis_y),
            ("XY Plane", self.origin.axis_z),
        ];
        for (i, (name, nm)) in planes.into_iter().enumerate() {
            let current = match i {
                0 => self.origin.plane_yz,
                1 => self.origin.plane_xz,
                _ => self.origin.plane_xy,
            };
            if self.is_kind(current, EntityKind::Workplane) {
                continue;
            }
            let p1 = self.origin.origin;
            let handle = self.push_origin(EntityData::Workplane { p1, nm }, name)?;
            match i {
                0 => self.origin.plane_yz = handle,
                1 => self.origin.plane_xz = handle,
                _ => self.origin.plane_xy = handle,
            }
            created = true;
        }

        if created {
            debug!("Created origin elements");
        }
        Ok(created)
    }

    // ============== Mutation ==============

    fn payload_mut(&mut self, handle: Handle, kind: EntityKind) -> SketchResult<&mut Entity> {
        match self.get_mut(handle) {
            Some(entity) if entity.kind() == kind => Ok(entity),
            _ => Err(wrong_kind(handle, kind)),
        }
    }

    /// Move a 3D point. Returns whether the value changed.
    pub fn set_location(&mut self, handle: Handle, value: DVec3) -> SketchResult<bool> {
        ensure_finite(&value.to_array(), "point location")?;
        let entity = self.payload_mut(handle, EntityKind::Point3D)?;
        let changed = match &mut entity.data {
            EntityData::Point3D { location } => replace(location, value),
            _ => return Err(wrong_kind(handle, EntityKind::Point3D)),
        };
        entity.dirty |= changed;
        Ok(changed)
    }

    /// Move a 2D point. Returns whether the value changed.
    pub fn set_co(&mut self, handle: Handle, value: DVec2) -> SketchResult<bool> {
        ensure_finite(&value.to_array(), "point coordinates")?;
        let entity = self.payload_mut(handle, EntityKind::Point2D)?;
        let changed = match &mut entity.data {
            EntityData::Point2D { co, .. } => replace(co, value),
            _ => return Err(wrong_kind(handle, EntityKind::Point2D)),
        };
        entity.dirty |= changed;
        Ok(changed)
    }

    /// Reorient a 3D normal. Returns whether the value changed.
    pub fn set_orientation(&mut self, handle: Handle, value: DQuat) -> SketchResult<bool> {
        ensure_finite(&value.to_array(), "orientation")?;
        if value.length_squared() < GEOMETRY_EPSILON {
            return Err(SketchError::InvalidArgument(
                "orientation quaternion must not be zero".into(),
            ));
        }
        let entity = self.payload_mut(handle, EntityKind::Normal3D)?;
        let changed = match &mut entity.data {
            EntityData::Normal3D { orientation } => replace(orientation, value.normalize()),
            _ => return Err(wrong_kind(handle, EntityKind::Normal3D)),
        };
        entity.dirty |= changed;
        Ok(changed)
    }

    /// Resize a circle. Returns whether the value changed.
    pub fn set_radius(&mut self, handle: Handle, value: f64) -> SketchResult<bool> {
        if !value.is_finite() || value <= 0.0 {
            return Err(SketchError::InvalidArgument(format!(
                "circle radius must be positive, got {value}"
            )));
        }
        let entity = self.payload_mut(handle, EntityKind::Circle)?;
        let changed = match &mut entity.data {
            EntityData::Circle { radius, .. } => replace(radius, value),
            _ => return Err(wrong_kind(handle, EntityKind::Circle)),
        };
        entity.dirty |= changed;
        Ok(changed)
    }

    /// Flip the sweep direction of an arc
    pub fn set_invert_direction(&mut self, handle: Handle, value: bool) -> SketchResult<()> {
        let entity = self.payload_mut(handle, EntityKind::Arc)?;
        if let EntityData::Arc {
            invert_direction, ..
        } = &mut entity.data
            && *invert_direction != value
        {
            *invert_direction = value;
            entity.dirty = true;
        }
        Ok(())
    }

    /// Attach (or detach) the host object a sketch is converted into
    pub fn set_target(&mut self, sketch: Handle, name: Option<String>) -> SketchResult<()> {
        let entity = self.payload_mut(sketch, EntityKind::Sketch)?;
        if let Some(data) = entity.as_sketch_mut() {
            data.target = name.map(|name| TargetObject { name, sketch });
        }
        Ok(())
    }

    /// Record the state of the last solve on a sketch
    pub fn set_solver_state(&mut self, sketch: Handle, state: SolverState) -> SketchResult<()> {
        let entity = self.payload_mut(sketch, EntityKind::Sketch)?;
        if let Some(data) = entity.as_sketch_mut() {
            data.solver_state = state;
        }
        Ok(())
    }

    /// Reconnect an endpoint of a line or arc to another point of the same
    /// sketch. Returns whether `old` was an endpoint.
    pub fn replace_point(&mut self, segment: Handle, old: Handle, new: Handle) -> SketchResult<bool> {
        let entity = self.expect(segment, "segment", &[EntityKind::Line2D, EntityKind::Arc])?;
        let sketch = entity.sketch().unwrap_or(Handle::NONE);
        self.expect_in_sketch(new, "point", &[EntityKind::Point2D], sketch)?;
        Ok(self
            .get_mut(segment)
            .is_some_and(|entity| entity.replace_point(old, new)))
    }

    // ============== Removal ==============

    /// Mark everything that points at `handle` dirty. After a removal these
    /// hold a dangling handle or one that now names the moved entity.
    fn invalidate_referrers(&mut self, handle: Handle) {
        let stale: Vec<Handle> = self.referrers(handle).map(Entity::handle).collect();
        for referrer in stale {
            self.mark_dirty(referrer);
        }
    }

    /// Remove an entity by swap-to-end compaction.
    ///
    /// Origin elements and unknown handles are left alone (`None`). When the
    /// freed slot was not the last one, the last entity of the slab moves
    /// into it and every reference held by entities and origin pointers is
    /// rewritten before the moved entity takes over the freed handle.
    /// References held outside the store are the caller's business; see
    /// [`Scene::remove`](crate::Scene::remove).
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<Removal> {
        let entity = self.get(handle)?;
        if entity.is_origin() {
            debug!("Refusing to remove origin element {}", entity);
            return None;
        }

        let (kind, slot) = handle.breakdown();
        let removed = self.slabs[kind].swap_remove(slot);
        debug!("Removed {}", removed);

        if slot >= self.slabs[kind].len() {
            self.invalidate_referrers(handle);
            return Some(Removal {
                removed,
                relocation: None,
            });
        }

        let from = self.slabs[kind][slot].handle;
        self.update_pointers(from, handle);
        let moved = &mut self.slabs[kind][slot];
        moved.handle = handle;
        moved.dirty = true;
        self.invalidate_referrers(handle);
        Some(Removal {
            removed,
            relocation: Some(Relocation { from, to: handle }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sketch_store() -> (EntityStore, Handle) {
        let mut store = EntityStore::new();
        store.ensure_origin_elements().unwrap();
        let wp = store.origin.plane_xy;
        let sketch = store.add_sketch(wp).unwrap();
        (store, sketch)
    }

    #[test]
    fn test_add_assigns_handles() {
        let mut store = EntityStore::new();
        let a = store.add_point_3d([1.0, 2.0, 3.0]).unwrap();
        let b = store.add_point_3d(DVec3::new(4.0, 5.0, 6.0)).unwrap();
        assert_eq!(a.breakdown(), (EntityKind::Point3D.index(), 0));
        assert_eq!(b.breakdown(), (EntityKind::Point3D.index(), 1));
        assert_eq!(store.get(b).unwrap().handle(), b);

        let line = store.add_line_3d(a, b).unwrap();
        assert_eq!(line.breakdown(), (EntityKind::Line3D.index(), 0));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_structural_errors() {
        let mut store = EntityStore::new();
        assert!(matches!(
            store.add_point_3d_from_slice(&[1.0, 2.0]),
            Err(SketchError::InvalidArgument(_))
        ));
        assert!(store.add_point_3d([f64::NAN, 0.0, 0.0]).is_err());
        assert!(store.add_normal_3d(DQuat::from_xyzw(0.0, 0.0, 0.0, 0.0)).is_err());

        let p = store.add_point_3d([0.0; 3]).unwrap();
        assert!(matches!(
            store.add_line_3d(p, Handle::NONE),
            Err(SketchError::InvalidReference { role: "p2", .. })
        ));
        assert!(store.add_sketch(p).is_err());
        // Nothing was partially applied
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_not_found() {
        let store = EntityStore::new();
        assert!(store.get(Handle::NONE).is_none());
        assert!(store.get(Handle::assemble(0, 5)).is_none());
        assert!(store.get(Handle::assemble(14, 0)).is_none());
    }

    #[test]
    fn test_ensure_origin_elements_idempotent() {
        let mut store = EntityStore::new();
        assert!(store.ensure_origin_elements().unwrap());
        let offsets = store.collection_offsets();
        assert!(!store.ensure_origin_elements().unwrap());
        assert_eq!(store.collection_offsets(), offsets);

        assert_eq!(offsets[EntityKind::Point3D.index()], 1);
        assert_eq!(offsets[EntityKind::Normal3D.index()], 3);
        assert_eq!(offsets[EntityKind::Workplane.index()], 3);
        for handle in store.origin_elements().handles() {
            let entity = store.get(handle).unwrap();
            assert!(entity.is_origin());
            assert!(entity.is_fixed());
        }
    }

    #[test]
    fn test_axis_orientations() {
        let mut store = EntityStore::new();
        store.ensure_origin_elements().unwrap();
        let z_of = |handle: Handle| match store.get(handle).unwrap().data() {
            EntityData::Normal3D { orientation } => *orientation * DVec3::Z,
            _ => panic!("not a normal"),
        };
        let origin = *store.origin_elements();
        assert!(z_of(origin.axis_x).abs_diff_eq(DVec3::X, 1e-12));
        assert!(z_of(origin.axis_y).abs_diff_eq(-DVec3::Y, 1e-12));
        assert!(z_of(origin.axis_z).abs_diff_eq(DVec3::Z, 1e-12));
    }

    #[test]
    fn test_2d_validation() {
        let (mut store, sketch) = sketch_store();
        let other = store.add_sketch(store.origin.plane_xz).unwrap();
        let p1 = store.add_point_2d([0.0, 0.0], sketch).unwrap();
        let q = store.add_point_2d([1.0, 0.0], other).unwrap();

        assert!(matches!(
            store.add_line_2d(p1, q, sketch),
            Err(SketchError::SketchMismatch { .. })
        ));
        assert!(store.add_point_2d_from_slice(&[1.0, 2.0, 3.0], sketch).is_err());

        let nm = store.add_normal_2d(sketch).unwrap();
        assert!(store.add_circle(nm, p1, -1.0, sketch).is_err());
        assert!(store.add_circle(nm, p1, 1.0, sketch).is_ok());
    }

    #[test]
    fn test_remove_compacts() {
        let mut store = EntityStore::new();
        let a = store.add_point_3d([0.0, 0.0, 0.0]).unwrap();
        let b = store.add_point_3d([1.0, 0.0, 0.0]).unwrap();
        let c = store.add_point_3d([2.0, 0.0, 0.0]).unwrap();
        let line = store.add_line_3d(b, c).unwrap();

        let removal = store.remove(a).unwrap();
        assert_eq!(removal.removed.handle(), a);
        assert_eq!(removal.relocation, Some(Relocation { from: c, to: a }));

        // The former last point now lives at `a`
        let moved = store.get(a).unwrap();
        assert_eq!(moved.handle(), a);
        assert!(matches!(moved.data(), EntityData::Point3D { location } if location.x == 2.0));
        assert!(store.get(c).is_none());

        // The line follows the move
        assert_eq!(store.get(line).unwrap().dependencies(), vec![b, a]);
    }

    #[test]
    fn test_remove_last_slot() {
        let mut store = EntityStore::new();
        let a = store.add_point_3d([0.0; 3]).unwrap();
        let b = store.add_point_3d([1.0; 3]).unwrap();
        let removal = store.remove(b).unwrap();
        assert_eq!(removal.relocation, None);
        assert_eq!(store.len(), 1);
        assert!(store.get(a).is_some());

        store.remove(a).unwrap();
        assert!(store.is_empty());
        assert!(store.get(a).is_none());
    }

    #[test]
    fn test_remove_invalidates_referrers() {
        for policy in [DirtyPolicy::Shallow, DirtyPolicy::Transitive] {
            let (mut store, sketch) = sketch_store();
            store.set_dirty_policy(policy);
            let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
            let b = store.add_point_2d([1.0, 0.0], sketch).unwrap();
            let c = store.add_point_2d([2.0, 1.0], sketch).unwrap();
            let line = store.add_line_2d(a, b, sketch).unwrap();
            for handle in store.handles() {
                store.clear(handle);
            }

            // `c` moves into the freed slot and the line now ends there
            store.remove(a).unwrap();
            assert!(store.is_dirty(line), "Line must be rebuilt under {:?}", policy);
            assert!(store.is_dirty(a), "Moved point must be rebuilt under {:?}", policy);
            assert!(!store.is_dirty(b));
        }
    }

    #[test]
    fn test_remove_last_slot_invalidates_referrers() {
        let mut store = EntityStore::new();
        let a = store.add_point_3d([0.0; 3]).unwrap();
        let b = store.add_point_3d([1.0; 3]).unwrap();
        let line = store.add_line_3d(a, b).unwrap();
        for handle in store.handles() {
            store.clear(handle);
        }

        store.remove(b).unwrap();
        assert!(store.is_dirty(line));
        assert!(!store.is_dirty(a));
    }

    #[test]
    fn test_remove_origin_is_noop() {
        let mut store = EntityStore::new();
        store.ensure_origin_elements().unwrap();
        let offsets = store.collection_offsets();
        let handles = store.handles();

        for handle in store.origin_elements().handles() {
            assert!(store.remove(handle).is_none());
        }
        assert_eq!(store.collection_offsets(), offsets);
        assert_eq!(store.handles(), handles);
    }

    #[test]
    fn test_origin_pointer_follows_relocation() {
        let mut store = EntityStore::new();
        let early = store.add_point_3d([5.0, 5.0, 5.0]).unwrap();
        store.ensure_origin_elements().unwrap();
        let origin_before = store.origin.origin;
        assert_ne!(origin_before, early);

        let removal = store.remove(early).unwrap();
        assert_eq!(
            removal.relocation,
            Some(Relocation {
                from: origin_before,
                to: early
            })
        );
        assert_eq!(store.origin.origin, early);
        let plane = store.get(store.origin.plane_xy).unwrap();
        assert_eq!(plane.dependencies()[0], early);
    }

    #[test]
    fn test_setters_mark_dirty_on_change() {
        let (mut store, sketch) = sketch_store();
        let p = store.add_point_2d([0.0, 0.0], sketch).unwrap();
        store.get_mut(p).unwrap().dirty = false;

        assert!(!store.set_co(p, DVec2::ZERO).unwrap());
        assert!(!store.get(p).unwrap().dirty_flag());
        assert!(store.set_co(p, DVec2::new(1.0, 0.0)).unwrap());
        assert!(store.get(p).unwrap().dirty_flag());

        assert!(store.set_location(p, DVec3::ZERO).is_err());
    }

    #[test]
    fn test_all_order() {
        let (mut store, sketch) = sketch_store();
        let p2d = store.add_point_2d([0.0, 0.0], sketch).unwrap();
        let p3d = store.add_point_3d([0.0; 3]).unwrap();
        let handles = store.handles();
        let pos_3d = handles.iter().position(|h| *h == p3d).unwrap();
        let pos_2d = handles.iter().position(|h| *h == p2d).unwrap();
        assert!(pos_3d < pos_2d, "kind order wins over insertion order");

        let all = store.all();
        assert_eq!(all.clone().count(), all.count());
    }
}
