//! Sketch entities
//!
//! Every entity is a [`Entity`] with the common flags and an [`EntityData`]
//! payload, one variant per [`EntityKind`]. Links between entities are
//! [`Handle`]s, listed per kind by [`EntityKind::reference_fields`].

mod kind;

use std::fmt;

use glam::{DQuat, DVec2, DVec3};
use serde::{Deserialize, Serialize};

pub use kind::{EntityKind, KIND_COUNT, RefField};

use crate::handle::Handle;
use crate::state::SolverState;

/// Host object a sketch is converted into.
///
/// It is not an entity but points back at its sketch, so it takes part in
/// reference rewriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetObject {
    /// Name of the host object
    pub name: String,
    /// Sketch the object was generated from
    pub sketch: Handle,
}

/// Payload of a sketch entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchData {
    /// Workplane the sketch lies on
    pub wp: Handle,
    /// State of the last solve
    #[serde(default)]
    pub solver_state: SolverState,
    /// Converted output object, if any
    #[serde(default)]
    pub target: Option<TargetObject>,
}

/// Kind specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityData {
    Point3D {
        location: DVec3,
    },
    Line3D {
        p1: Handle,
        p2: Handle,
    },
    Normal3D {
        orientation: DQuat,
    },
    Workplane {
        p1: Handle,
        nm: Handle,
    },
    Sketch(SketchData),
    Point2D {
        co: DVec2,
        sketch: Handle,
    },
    Line2D {
        p1: Handle,
        p2: Handle,
        sketch: Handle,
    },
    Normal2D {
        sketch: Handle,
    },
    Arc {
        nm: Handle,
        ct: Handle,
        p1: Handle,
        p2: Handle,
        sketch: Handle,
        /// Sweep from `p2` to `p1` instead of `p1` to `p2`
        #[serde(default)]
        invert_direction: bool,
    },
    Circle {
        nm: Handle,
        ct: Handle,
        radius: f64,
        sketch: Handle,
    },
}

impl EntityData {
    /// Kind of this payload
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::Point3D { .. } => EntityKind::Point3D,
            EntityData::Line3D { .. } => EntityKind::Line3D,
            EntityData::Normal3D { .. } => EntityKind::Normal3D,
            EntityData::Workplane { .. } => EntityKind::Workplane,
            EntityData::Sketch(_) => EntityKind::Sketch,
            EntityData::Point2D { .. } => EntityKind::Point2D,
            EntityData::Line2D { .. } => EntityKind::Line2D,
            EntityData::Normal2D { .. } => EntityKind::Normal2D,
            EntityData::Arc { .. } => EntityKind::Arc,
            EntityData::Circle { .. } => EntityKind::Circle,
        }
    }

    /// Read a reference field. `None` if this kind has no such field.
    pub fn reference(&self, field: RefField) -> Option<Handle> {
        use EntityData as D;
        use RefField as F;
        let handle = match (self, field) {
            (D::Line3D { p1, .. }, F::P1)
            | (D::Workplane { p1, .. }, F::P1)
            | (D::Line2D { p1, .. }, F::P1)
            | (D::Arc { p1, .. }, F::P1) => p1,
            (D::Line3D { p2, .. }, F::P2)
            | (D::Line2D { p2, .. }, F::P2)
            | (D::Arc { p2, .. }, F::P2) => p2,
            (D::Workplane { nm, .. }, F::Nm)
            | (D::Arc { nm, .. }, F::Nm)
            | (D::Circle { nm, .. }, F::Nm) => nm,
            (D::Arc { ct, .. }, F::Ct) | (D::Circle { ct, .. }, F::Ct) => ct,
            (D::Sketch(data), F::Wp) => &data.wp,
            (D::Point2D { sketch, .. }, F::Sketch)
            | (D::Line2D { sketch, .. }, F::Sketch)
            | (D::Normal2D { sketch }, F::Sketch)
            | (D::Arc { sketch, .. }, F::Sketch)
            | (D::Circle { sketch, .. }, F::Sketch) => sketch,
            _ => return None,
        };
        Some(*handle)
    }

    /// Mutable access to a reference field
    pub fn reference_mut(&mut self, field: RefField) -> Option<&mut Handle> {
        use EntityData as D;
        use RefField as F;
        let handle = match (self, field) {
            (D::Line3D { p1, .. }, F::P1)
            | (D::Workplane { p1, .. }, F::P1)
            | (D::Line2D { p1, .. }, F::P1)
            | (D::Arc { p1, .. }, F::P1) => p1,
            (D::Line3D { p2, .. }, F::P2)
            | (D::Line2D { p2, .. }, F::P2)
            | (D::Arc { p2, .. }, F::P2) => p2,
            (D::Workplane { nm, .. }, F::Nm)
            | (D::Arc { nm, .. }, F::Nm)
            | (D::Circle { nm, .. }, F::Nm) => nm,
            (D::Arc { ct, .. }, F::Ct) | (D::Circle { ct, .. }, F::Ct) => ct,
            (D::Sketch(data), F::Wp) => &mut data.wp,
            (D::Point2D { sketch, .. }, F::Sketch)
            | (D::Line2D { sketch, .. }, F::Sketch)
            | (D::Normal2D { sketch }, F::Sketch)
            | (D::Arc { sketch, .. }, F::Sketch)
            | (D::Circle { sketch, .. }, F::Sketch) => sketch,
            _ => return None,
        };
        Some(handle)
    }
}

fn default_dirty() -> bool {
    true
}

fn default_visible() -> bool {
    true
}

/// An entity of the sketch graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub(crate) handle: Handle,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Excluded from solving
    #[serde(default)]
    pub fixed: bool,
    /// Auxiliary geometry, not part of the converted result
    #[serde(default)]
    pub construction: bool,
    #[serde(default)]
    pub(crate) origin: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(skip, default = "default_dirty")]
    pub(crate) dirty: bool,
    pub(crate) data: EntityData,
}

impl Entity {
    pub(crate) fn new(handle: Handle, data: EntityData) -> Self {
        Self {
            handle,
            name: String::new(),
            fixed: false,
            construction: false,
            origin: false,
            visible: true,
            dirty: true,
            data,
        }
    }

    /// Handle of this entity
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Kind of this entity
    pub fn kind(&self) -> EntityKind {
        self.data.kind()
    }

    /// Kind specific payload
    pub fn data(&self) -> &EntityData {
        &self.data
    }

    /// Whether this is one of the protected origin elements
    pub fn is_origin(&self) -> bool {
        self.origin
    }

    /// Own dirty flag, ignoring dependencies
    pub fn dirty_flag(&self) -> bool {
        self.dirty
    }

    /// Excluded from solving, either explicitly or as an origin element
    pub fn is_fixed(&self) -> bool {
        self.fixed || self.origin
    }

    /// Owning sketch of a 2D entity
    pub fn sketch(&self) -> Option<Handle> {
        self.data.reference(RefField::Sketch)
    }

    pub fn is_2d(&self) -> bool {
        self.kind().is_2d()
    }

    pub fn is_3d(&self) -> bool {
        self.kind().is_3d()
    }

    /// Active means: on the active sketch, or in 3D while no sketch is active
    pub fn is_active(&self, active_sketch: Option<Handle>) -> bool {
        match self.sketch() {
            Some(sketch) => Some(sketch) == active_sketch,
            None => active_sketch.is_none(),
        }
    }

    /// Handles this entity references directly
    pub fn dependencies(&self) -> Vec<Handle> {
        self.kind()
            .reference_fields()
            .iter()
            .filter_map(|field| self.data.reference(*field))
            .filter(|handle| handle.is_some())
            .collect()
    }

    /// Endpoints through which segments connect to each other
    pub fn connection_points(&self) -> Vec<Handle> {
        match &self.data {
            EntityData::Line3D { p1, p2 }
            | EntityData::Line2D { p1, p2, .. }
            | EntityData::Arc { p1, p2, .. } => vec![*p1, *p2],
            _ => Vec::new(),
        }
    }

    /// Swap one endpoint for another point, returns whether anything changed
    pub(crate) fn replace_point(&mut self, old: Handle, new: Handle) -> bool {
        for field in [RefField::P1, RefField::P2] {
            if let Some(slot) = self.data.reference_mut(field)
                && *slot == old
            {
                *slot = new;
                self.dirty = true;
                return true;
            }
        }
        false
    }

    /// Sketch payload, if this is a sketch
    pub fn as_sketch(&self) -> Option<&SketchData> {
        match &self.data {
            EntityData::Sketch(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn as_sketch_mut(&mut self) -> Option<&mut SketchData> {
        match &mut self.data {
            EntityData::Sketch(data) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.handle.slot())
    }
}
