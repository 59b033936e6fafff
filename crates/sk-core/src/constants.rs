//! Global constants for sk-core

/// Decimal digits used when comparing intersection points against endpoints
pub const ENDPOINT_PRECISION: i32 = 5;

/// A quarter turn in radians
pub const QUARTER_TURN: f64 = std::f64::consts::FRAC_PI_2;

/// Lengths below this are treated as degenerate
pub const GEOMETRY_EPSILON: f64 = 1e-12;

/// Default number of segments used to tessellate arcs and circles
pub const DEFAULT_ARC_SEGMENTS: u32 = 32;

/// Edge length of the square drawn for a workplane
pub const WORKPLANE_DISPLAY_SIZE: f64 = 0.4;

/// Name given to new sketches
pub const DEFAULT_SKETCH_NAME: &str = "Sketch";
