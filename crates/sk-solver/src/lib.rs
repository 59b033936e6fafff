//! Constraint solving for sketch scenes
//!
//! This crate provides:
//! - The solver backend contract ([`SolverBackend`], [`SolverSystem`])
//! - A built-in Newton-Raphson backend (feature `newton`)
//! - The solve pipeline that moves scene geometry through a backend

pub mod backend;
#[cfg(feature = "newton")]
pub mod newton;
pub mod pipeline;

pub use backend::{
    ConstraintType, Group, NullBackend, RawResult, SolverBackend, SolverHandle, SolverSystem,
    default_backend,
};
#[cfg(feature = "newton")]
pub use newton::{NewtonBackend, NewtonSystem};
pub use pipeline::{GroupResult, SolveOutcome, SolvePipeline, SolveReport};
