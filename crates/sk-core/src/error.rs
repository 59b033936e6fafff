//! Error types

use thiserror::Error;

use crate::entity::EntityKind;
use crate::handle::Handle;

/// Errors raised by entity, constraint and persistence operations.
///
/// Lookups of unknown handles are not errors; they return `None`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SketchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid reference {handle} for {role}: expected {expected}")]
    InvalidReference {
        handle: Handle,
        role: &'static str,
        expected: String,
    },

    #[error("{entity} does not belong to sketch {sketch}")]
    SketchMismatch { entity: Handle, sketch: Handle },

    #[error("Slab for {0} is full")]
    SlabFull(EntityKind),

    #[error("Unsupported constraint: {0}")]
    UnsupportedConstraint(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Result type for sketch operations
pub type SketchResult<T> = Result<T, SketchError>;
