//! Render batches
//!
//! World-space geometry derived from entities, rebuilt whenever an entity
//! reports dirty.

use glam::{DVec2, DVec3};

use crate::constants::WORKPLANE_DISPLAY_SIZE;
use crate::entity::{Entity, EntityData, EntityKind};
use crate::scene::Scene;

/// How the vertices of a batch are connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Points,
    LineStrip,
    LineLoop,
}

/// Display geometry of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBatch {
    pub kind: EntityKind,
    pub topology: Topology,
    /// World-space vertices
    pub vertices: Vec<DVec3>,
    /// Drawn with a dashed line
    pub dashed: bool,
}

/// Colour role of an entity in the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Default,
    Highlight,
    Selected,
    SelectedHighlight,
    Inactive,
    InactiveSelected,
    Hidden,
}

/// Build the display geometry of an entity.
///
/// `None` for entities without geometry of their own (normals, sketches) and
/// for entities whose references cannot be resolved.
pub fn build_batch(scene: &Scene, entity: &Entity, arc_segments: u32) -> Option<RenderBatch> {
    let kind = entity.kind();
    let (topology, vertices) = match entity.data() {
        EntityData::Point3D { .. } | EntityData::Point2D { .. } => {
            (Topology::Points, vec![scene.location(entity.handle())?])
        }
        EntityData::Line3D { .. } | EntityData::Line2D { .. } => {
            let (a, b) = scene.segment_endpoints(entity.handle())?;
            (Topology::LineStrip, vec![a, b])
        }
        EntityData::Workplane { .. } => {
            let frame = scene.workplane_frame(entity.handle())?;
            let half = WORKPLANE_DISPLAY_SIZE / 2.0;
            let corners = [
                DVec2::new(-half, -half),
                DVec2::new(half, -half),
                DVec2::new(half, half),
                DVec2::new(-half, half),
            ];
            (
                Topology::LineLoop,
                corners.into_iter().map(|co| frame.to_world(co)).collect(),
            )
        }
        EntityData::Arc { sketch, .. } | EntityData::Circle { sketch, .. } => {
            let frame = scene.sketch_frame(*sketch)?;
            let curve = scene.curve_2d(entity.handle())?;
            let topology = if kind.is_closed() {
                Topology::LineLoop
            } else {
                Topology::LineStrip
            };
            let mut points = curve.tessellate(arc_segments);
            if kind.is_closed() {
                points.pop();
            }
            (
                topology,
                points.into_iter().map(|co| frame.to_world(co)).collect(),
            )
        }
        EntityData::Normal3D { .. } | EntityData::Normal2D { .. } | EntityData::Sketch(_) => {
            return None;
        }
    };

    Some(RenderBatch {
        kind,
        topology,
        vertices,
        dashed: entity.construction && !kind.is_point(),
    })
}
