//! Sketch Constraints
//!
//! Geometric and dimensional constraints between entities. A constraint
//! either lives in 3D space or is scoped to one sketch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::handle::Handle;

/// Constraint relation and the entities it involves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    // ============== Geometric Constraints ==============
    /// A point coincides with a point, or lies on a line or workplane
    Coincident { entity1: Handle, entity2: Handle },
    /// A 2D line is parallel to the workplane's X axis
    Horizontal { line: Handle },
    /// A 2D line is parallel to the workplane's Y axis
    Vertical { line: Handle },
    Parallel { line1: Handle, line2: Handle },
    Perpendicular { line1: Handle, line2: Handle },
    /// Two lines have equal length, or two curves have equal radius
    Equal { entity1: Handle, entity2: Handle },
    /// A curve touches a line or another curve
    Tangent { curve: Handle, other: Handle },
    /// A point lies at the midpoint of a line
    Midpoint { point: Handle, line: Handle },
    /// A point lies on an arc, circle or line
    PointOnCurve { point: Handle, curve: Handle },

    // ============== Dimensional Constraints ==============
    /// Distance from a point to a point, line or workplane
    Distance {
        entity1: Handle,
        entity2: Handle,
        value: f64,
    },
    /// Angle between two lines
    Angle {
        line1: Handle,
        line2: Handle,
        /// Angle in radians
        value: f64,
    },
    /// Size of an arc or circle
    Diameter {
        curve: Handle,
        value: f64,
        /// `value` is the radius instead of the diameter
        setting: bool,
    },
}

impl ConstraintKind {
    /// Type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ConstraintKind::Coincident { .. } => "Coincident",
            ConstraintKind::Horizontal { .. } => "Horizontal",
            ConstraintKind::Vertical { .. } => "Vertical",
            ConstraintKind::Parallel { .. } => "Parallel",
            ConstraintKind::Perpendicular { .. } => "Perpendicular",
            ConstraintKind::Equal { .. } => "Equal",
            ConstraintKind::Tangent { .. } => "Tangent",
            ConstraintKind::Midpoint { .. } => "Midpoint",
            ConstraintKind::PointOnCurve { .. } => "PointOnCurve",
            ConstraintKind::Distance { .. } => "Distance",
            ConstraintKind::Angle { .. } => "Angle",
            ConstraintKind::Diameter { .. } => "Diameter",
        }
    }

    /// Entities referenced by this constraint, in field order
    pub fn entities(&self) -> Vec<Handle> {
        match self {
            ConstraintKind::Horizontal { line } | ConstraintKind::Vertical { line } => vec![*line],
            ConstraintKind::Diameter { curve, .. } => vec![*curve],
            ConstraintKind::Coincident { entity1, entity2 }
            | ConstraintKind::Equal { entity1, entity2 }
            | ConstraintKind::Distance {
                entity1, entity2, ..
            } => vec![*entity1, *entity2],
            ConstraintKind::Parallel { line1, line2 }
            | ConstraintKind::Perpendicular { line1, line2 }
            | ConstraintKind::Angle { line1, line2, .. } => vec![*line1, *line2],
            ConstraintKind::Tangent { curve, other } => vec![*curve, *other],
            ConstraintKind::Midpoint { point, line } => vec![*point, *line],
            ConstraintKind::PointOnCurve { point, curve } => vec![*point, *curve],
        }
    }

    fn entities_mut(&mut self) -> Vec<&mut Handle> {
        match self {
            ConstraintKind::Horizontal { line } | ConstraintKind::Vertical { line } => vec![line],
            ConstraintKind::Diameter { curve, .. } => vec![curve],
            ConstraintKind::Coincident { entity1, entity2 }
            | ConstraintKind::Equal { entity1, entity2 }
            | ConstraintKind::Distance {
                entity1, entity2, ..
            } => vec![entity1, entity2],
            ConstraintKind::Parallel { line1, line2 }
            | ConstraintKind::Perpendicular { line1, line2 }
            | ConstraintKind::Angle { line1, line2, .. } => vec![line1, line2],
            ConstraintKind::Tangent { curve, other } => vec![curve, other],
            ConstraintKind::Midpoint { point, line } => vec![point, line],
            ConstraintKind::PointOnCurve { point, curve } => vec![point, curve],
        }
    }

    /// Check if this constraint references a specific entity
    pub fn references_entity(&self, handle: Handle) -> bool {
        self.entities().contains(&handle)
    }

    /// Get the dimension value (for dimensional constraints)
    pub fn value(&self) -> Option<f64> {
        match self {
            ConstraintKind::Distance { value, .. }
            | ConstraintKind::Angle { value, .. }
            | ConstraintKind::Diameter { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Set the dimension value (for dimensional constraints)
    pub fn set_value(&mut self, new_value: f64) -> bool {
        match self {
            ConstraintKind::Distance { value, .. }
            | ConstraintKind::Angle { value, .. }
            | ConstraintKind::Diameter { value, .. } => {
                *value = new_value;
                true
            }
            _ => false,
        }
    }

    /// Check if this is a dimensional constraint
    pub fn is_dimensional(&self) -> bool {
        self.value().is_some()
    }

    /// Check the kinds of the referenced entities, in [`entities`](Self::entities) order
    pub fn accepts(&self, kinds: &[EntityKind]) -> bool {
        use EntityKind as K;
        let point = |k: &K| k.is_point();
        let line = |k: &K| k.is_line();
        let curve = |k: &K| k.is_curve();
        match (self, kinds) {
            (ConstraintKind::Coincident { .. }, [a, b]) => {
                point(a) && (point(b) || line(b) || *b == K::Workplane)
            }
            (ConstraintKind::Horizontal { .. } | ConstraintKind::Vertical { .. }, [a]) => {
                *a == K::Line2D
            }
            (
                ConstraintKind::Parallel { .. }
                | ConstraintKind::Perpendicular { .. }
                | ConstraintKind::Angle { .. },
                [a, b],
            ) => line(a) && line(b),
            (ConstraintKind::Equal { .. }, [a, b]) => {
                (line(a) && line(b)) || (curve(a) && curve(b))
            }
            (ConstraintKind::Tangent { .. }, [a, b]) => curve(a) && (*b == K::Line2D || curve(b)),
            (ConstraintKind::Midpoint { .. }, [a, b]) => point(a) && line(b),
            (ConstraintKind::PointOnCurve { .. }, [a, b]) => point(a) && (curve(b) || line(b)),
            (ConstraintKind::Distance { .. }, [a, b]) => {
                point(a) && (point(b) || line(b) || *b == K::Workplane)
            }
            (ConstraintKind::Diameter { .. }, [a]) => curve(a),
            _ => false,
        }
    }
}

fn default_visible() -> bool {
    true
}

/// A constraint stored in a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Unique identifier
    pub id: Uuid,
    pub kind: ConstraintKind,
    /// Owning sketch, `None` for constraints in 3D space
    #[serde(default)]
    pub sketch: Option<Handle>,
    /// Measured only, never enforced
    #[serde(default)]
    pub is_reference: bool,
    /// Reported by the last solve
    #[serde(skip)]
    pub failed: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl Constraint {
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sketch: None,
            is_reference: false,
            failed: false,
            visible: true,
        }
    }

    /// Scope the constraint to a sketch
    pub fn in_sketch(mut self, sketch: Handle) -> Self {
        self.sketch = Some(sketch);
        self
    }

    /// Turn the constraint into a measurement
    pub fn reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    // ============== Factory Methods ==============

    pub fn coincident(entity1: Handle, entity2: Handle) -> Self {
        Self::new(ConstraintKind::Coincident { entity1, entity2 })
    }

    pub fn horizontal(line: Handle) -> Self {
        Self::new(ConstraintKind::Horizontal { line })
    }

    pub fn vertical(line: Handle) -> Self {
        Self::new(ConstraintKind::Vertical { line })
    }

    pub fn parallel(line1: Handle, line2: Handle) -> Self {
        Self::new(ConstraintKind::Parallel { line1, line2 })
    }

    pub fn perpendicular(line1: Handle, line2: Handle) -> Self {
        Self::new(ConstraintKind::Perpendicular { line1, line2 })
    }

    pub fn equal(entity1: Handle, entity2: Handle) -> Self {
        Self::new(ConstraintKind::Equal { entity1, entity2 })
    }

    pub fn tangent(curve: Handle, other: Handle) -> Self {
        Self::new(ConstraintKind::Tangent { curve, other })
    }

    pub fn midpoint(point: Handle, line: Handle) -> Self {
        Self::new(ConstraintKind::Midpoint { point, line })
    }

    pub fn point_on_curve(point: Handle, curve: Handle) -> Self {
        Self::new(ConstraintKind::PointOnCurve { point, curve })
    }

    pub fn distance(entity1: Handle, entity2: Handle, value: f64) -> Self {
        Self::new(ConstraintKind::Distance {
            entity1,
            entity2,
            value,
        })
    }

    pub fn angle(line1: Handle, line2: Handle, value: f64) -> Self {
        Self::new(ConstraintKind::Angle {
            line1,
            line2,
            value,
        })
    }

    pub fn diameter(curve: Handle, value: f64) -> Self {
        Self::new(ConstraintKind::Diameter {
            curve,
            value,
            setting: false,
        })
    }

    pub fn radius(curve: Handle, value: f64) -> Self {
        Self::new(ConstraintKind::Diameter {
            curve,
            value,
            setting: true,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn entities(&self) -> Vec<Handle> {
        self.kind.entities()
    }

    /// Whether the constraint references `handle`, as an entity or as its sketch
    pub fn references(&self, handle: Handle) -> bool {
        self.sketch == Some(handle) || self.kind.references_entity(handle)
    }

    fn remap(&mut self, map: &impl Fn(Handle) -> Option<Handle>) {
        for slot in self.kind.entities_mut() {
            if slot.is_some()
                && let Some(new) = map(*slot)
            {
                *slot = new;
            }
        }
        if let Some(sketch) = self.sketch.as_mut()
            && let Some(new) = map(*sketch)
        {
            *sketch = new;
        }
    }
}

/// All constraints of a scene, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintStore {
    constraints: Vec<Constraint>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validation is the caller's business, see [`Scene::add_constraint`](crate::Scene::add_constraint)
    pub(crate) fn add(&mut self, constraint: Constraint) -> Uuid {
        let id = constraint.id;
        self.constraints.push(constraint);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Constraint> {
        self.constraints.iter_mut().find(|c| c.id == id)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Constraint> {
        let index = self.constraints.iter().position(|c| c.id == id)?;
        Some(self.constraints.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> + Clone {
        self.constraints.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Constraint> {
        self.constraints.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Constraints of one sketch, or of 3D space for `None`
    pub fn in_scope(&self, sketch: Option<Handle>) -> impl Iterator<Item = &Constraint> + Clone {
        self.constraints.iter().filter(move |c| c.sketch == sketch)
    }

    /// Constraints that reference an entity
    pub fn referencing(&self, handle: Handle) -> impl Iterator<Item = &Constraint> + Clone {
        self.constraints.iter().filter(move |c| c.references(handle))
    }

    pub fn is_referenced(&self, handle: Handle) -> bool {
        self.referencing(handle).next().is_some()
    }

    pub(crate) fn remap(&mut self, map: impl Fn(Handle) -> Option<Handle>) {
        for constraint in &mut self.constraints {
            constraint.remap(&map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(kind: EntityKind, slot: usize) -> Handle {
        Handle::assemble(kind.index(), slot)
    }

    #[test]
    fn test_factories() {
        let l1 = h(EntityKind::Line2D, 0);
        let l2 = h(EntityKind::Line2D, 1);
        let c = Constraint::angle(l1, l2, 0.5);
        assert_eq!(c.type_name(), "Angle");
        assert_eq!(c.entities(), vec![l1, l2]);
        assert!(c.kind.is_dimensional());
        assert!(!Constraint::parallel(l1, l2).kind.is_dimensional());
        assert!(matches!(
            Constraint::radius(h(EntityKind::Arc, 0), 1.0).kind,
            ConstraintKind::Diameter { setting: true, .. }
        ));
    }

    #[test]
    fn test_set_value() {
        let p = h(EntityKind::Point2D, 0);
        let q = h(EntityKind::Point2D, 1);
        let mut c = Constraint::distance(p, q, 1.0);
        assert!(c.kind.set_value(2.5));
        assert_eq!(c.kind.value(), Some(2.5));

        let mut coincident = Constraint::coincident(p, q);
        assert!(!coincident.kind.set_value(1.0));
    }

    #[test]
    fn test_accepts() {
        use EntityKind as K;
        let any = Handle::NONE;
        assert!(Constraint::coincident(any, any).kind.accepts(&[K::Point2D, K::Point2D]));
        assert!(Constraint::coincident(any, any).kind.accepts(&[K::Point3D, K::Workplane]));
        assert!(!Constraint::coincident(any, any).kind.accepts(&[K::Line2D, K::Point2D]));
        assert!(Constraint::horizontal(any).kind.accepts(&[K::Line2D]));
        assert!(!Constraint::horizontal(any).kind.accepts(&[K::Line3D]));
        assert!(Constraint::tangent(any, any).kind.accepts(&[K::Arc, K::Line2D]));
        assert!(Constraint::equal(any, any).kind.accepts(&[K::Arc, K::Circle]));
        assert!(!Constraint::equal(any, any).kind.accepts(&[K::Arc, K::Line2D]));
        assert!(!Constraint::diameter(any, 1.0).kind.accepts(&[K::Line2D]));
    }

    #[test]
    fn test_store_remap() {
        let sketch = h(EntityKind::Sketch, 0);
        let p = h(EntityKind::Point2D, 0);
        let q = h(EntityKind::Point2D, 1);
        let r = h(EntityKind::Point2D, 2);
        let mut store = ConstraintStore::new();
        let id = store.add(Constraint::coincident(p, q).in_sketch(sketch));

        store.remap(|handle| (handle == q).then_some(r));
        assert_eq!(store.get(id).unwrap().entities(), vec![p, r]);
        assert!(store.is_referenced(sketch));
        assert!(!store.is_referenced(q));
        assert_eq!(store.in_scope(Some(sketch)).count(), 1);
        assert_eq!(store.in_scope(None).count(), 0);

        assert!(store.remove(id).is_some());
        assert!(store.is_empty());
    }
}
