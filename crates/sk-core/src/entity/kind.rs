//! Entity kinds and their reference-field descriptors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::Handle;

/// Number of entity kinds
pub const KIND_COUNT: usize = 10;

/// The closed set of entity kinds.
///
/// The declaration order is the kind tag stored in every [`Handle`]. It is
/// also a valid dependency order: an entity only references kinds that come
/// before it (arcs and circles may reference a 3D normal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Point3D,
    Line3D,
    Normal3D,
    Workplane,
    Sketch,
    Point2D,
    Line2D,
    Normal2D,
    Arc,
    Circle,
}

/// A field of an entity that holds a [`Handle`] to another entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefField {
    /// Start point (or workplane origin)
    P1,
    /// End point
    P2,
    /// Normal
    Nm,
    /// Center point
    Ct,
    /// Workplane of a sketch
    Wp,
    /// Owning sketch of a 2D entity
    Sketch,
}

impl EntityKind {
    /// All kinds in tag order
    pub const ALL: [EntityKind; KIND_COUNT] = [
        EntityKind::Point3D,
        EntityKind::Line3D,
        EntityKind::Normal3D,
        EntityKind::Workplane,
        EntityKind::Sketch,
        EntityKind::Point2D,
        EntityKind::Line2D,
        EntityKind::Normal2D,
        EntityKind::Arc,
        EntityKind::Circle,
    ];

    /// Kind tag
    pub fn index(self) -> usize {
        self as usize
    }

    /// Kind for a tag, if the tag is in use
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Kind encoded in a handle
    pub fn from_handle(handle: Handle) -> Option<Self> {
        if handle.is_none() {
            return None;
        }
        Self::from_index(handle.kind_index())
    }

    /// Type name
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Point3D => "Point3D",
            EntityKind::Line3D => "Line3D",
            EntityKind::Normal3D => "Normal3D",
            EntityKind::Workplane => "Workplane",
            EntityKind::Sketch => "Sketch",
            EntityKind::Point2D => "Point2D",
            EntityKind::Line2D => "Line2D",
            EntityKind::Normal2D => "Normal2D",
            EntityKind::Arc => "Arc",
            EntityKind::Circle => "Circle",
        }
    }

    /// Parse a type name produced by [`EntityKind::name`]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Reference fields of this kind, in dependency order.
    ///
    /// This table is the single source for reference rewriting and
    /// dependency queries; a field missing here would dangle after
    /// compaction.
    pub fn reference_fields(self) -> &'static [RefField] {
        use RefField::*;
        match self {
            EntityKind::Point3D | EntityKind::Normal3D => &[],
            EntityKind::Line3D => &[P1, P2],
            EntityKind::Workplane => &[P1, Nm],
            EntityKind::Sketch => &[Wp],
            EntityKind::Point2D | EntityKind::Normal2D => &[Sketch],
            EntityKind::Line2D => &[P1, P2, Sketch],
            EntityKind::Arc => &[Nm, Ct, P1, P2, Sketch],
            EntityKind::Circle => &[Nm, Ct, Sketch],
        }
    }

    /// Whether entities of this kind live on a sketch
    pub fn is_2d(self) -> bool {
        matches!(
            self,
            EntityKind::Point2D
                | EntityKind::Line2D
                | EntityKind::Normal2D
                | EntityKind::Arc
                | EntityKind::Circle
        )
    }

    /// Whether entities of this kind live in 3D space
    pub fn is_3d(self) -> bool {
        !self.is_2d()
    }

    pub fn is_point(self) -> bool {
        matches!(self, EntityKind::Point3D | EntityKind::Point2D)
    }

    pub fn is_line(self) -> bool {
        matches!(self, EntityKind::Line3D | EntityKind::Line2D)
    }

    pub fn is_normal(self) -> bool {
        matches!(self, EntityKind::Normal3D | EntityKind::Normal2D)
    }

    pub fn is_curve(self) -> bool {
        matches!(self, EntityKind::Arc | EntityKind::Circle)
    }

    /// Open segments that can be connected end to end
    pub fn is_segment(self) -> bool {
        matches!(self, EntityKind::Line2D | EntityKind::Arc)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, EntityKind::Circle)
    }

    pub fn is_sketch(self) -> bool {
        matches!(self, EntityKind::Sketch)
    }

    /// Slab name used by the persisted format
    pub fn collection_name(self) -> &'static str {
        match self {
            EntityKind::Point3D => "points3D",
            EntityKind::Line3D => "lines3D",
            EntityKind::Normal3D => "normals3D",
            EntityKind::Workplane => "workplanes",
            EntityKind::Sketch => "sketches",
            EntityKind::Point2D => "points2D",
            EntityKind::Line2D => "lines2D",
            EntityKind::Normal2D => "normals2D",
            EntityKind::Arc => "arcs",
            EntityKind::Circle => "circles",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::MAX_KINDS;

    #[test]
    fn test_index_roundtrip() {
        assert!(KIND_COUNT <= MAX_KINDS);
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(EntityKind::from_index(i), Some(*kind));
            assert_eq!(EntityKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(EntityKind::from_index(KIND_COUNT), None);
    }

    #[test]
    fn test_sketch_field_only_on_2d() {
        for kind in EntityKind::ALL {
            let has_sketch = kind.reference_fields().contains(&RefField::Sketch);
            assert_eq!(has_sketch, kind.is_2d(), "{kind}");
        }
    }

    #[test]
    fn test_from_handle() {
        let handle = Handle::assemble(EntityKind::Arc.index(), 3);
        assert_eq!(EntityKind::from_handle(handle), Some(EntityKind::Arc));
        assert_eq!(EntityKind::from_handle(Handle::NONE), None);
        assert_eq!(EntityKind::from_handle(Handle::assemble(12, 0)), None);
    }
}
