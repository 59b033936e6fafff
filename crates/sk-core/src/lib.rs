//! Parametric sketch model
//!
//! This crate provides:
//! - Handle-addressed entity storage with swap-to-end compaction
//! - Reference rewriting and dirty tracking over the entity graph
//! - Constraints, scenes and editing sessions
//! - 2D geometric queries and the bevel operation
//! - RON persistence with kind-order migration

pub mod config;
pub mod constants;
pub mod constraint;
mod dirty;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod handle;
pub mod ops;
pub mod project;
mod refs;
pub mod render;
pub mod scene;
pub mod session;
pub mod state;
pub mod store;

// Re-exports for convenience
pub use config::{DirtyPolicy, SketcherConfig, SolverConfig};
pub use constraint::{Constraint, ConstraintKind, ConstraintStore};
pub use entity::{Entity, EntityData, EntityKind, KIND_COUNT, RefField, SketchData, TargetObject};
pub use error::{SketchError, SketchResult};
pub use geometry::{Curve2D, Endpoint, Frame, Primitive};
pub use handle::Handle;
pub use ops::{BevelError, BevelResult, bevel};
pub use project::FORMAT_VERSION;
pub use render::{DisplayState, RenderBatch, Topology};
pub use scene::Scene;
pub use session::Session;
pub use state::SolverState;
pub use store::{EntityStore, OriginElements, Relocation, Removal};
