//! Construction operations that edit a scene

pub mod bevel;

pub use bevel::{BevelError, BevelResult, Fillet, bevel, fillet};
