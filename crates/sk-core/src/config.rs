//! Sketcher configuration
//!
//! Settings that a host application may load from a RON file and hand to
//! the scene and the solve pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ARC_SEGMENTS;
use crate::error::{SketchError, SketchResult};

/// How dirtiness of dependencies is propagated when queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirtyPolicy {
    /// Only direct dependencies are inspected
    Shallow,
    /// Dependencies are followed recursively
    #[default]
    Transitive,
}

/// Numeric solver settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Residual norm below which the system counts as solved
    pub tolerance: f64,
    /// Maximum number of Newton iterations
    pub max_iterations: usize,
    /// Systems with more free parameters are rejected
    pub max_unknowns: usize,
    /// Step scale applied to every Newton update (0.1 - 1.0)
    pub damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 100,
            max_unknowns: 4096,
            damping: 1.0,
        }
    }
}

impl SolverConfig {
    /// Tighter settings for final solves
    pub fn precise() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 400,
            ..Self::default()
        }
    }

    /// Looser settings for interactive dragging
    pub fn interactive() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 30,
            ..Self::default()
        }
    }
}

/// Top level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SketcherConfig {
    /// Solver settings
    pub solver: SolverConfig,
    /// Dirty propagation policy
    pub dirty_policy: DirtyPolicy,
    /// Segments used to tessellate arcs and circles for display
    pub arc_segments: u32,
    /// Whether the origin elements are displayed (and selectable)
    pub show_origin: bool,
}

impl Default for SketcherConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            dirty_policy: DirtyPolicy::default(),
            arc_segments: DEFAULT_ARC_SEGMENTS,
            show_origin: true,
        }
    }
}

impl SketcherConfig {
    /// Parse a configuration from RON text
    pub fn from_ron_str(content: &str) -> SketchResult<Self> {
        ron::from_str(content).map_err(|e| SketchError::Deserialize(e.to_string()))
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> SketchResult<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| SketchError::Io(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    /// Serialize to pretty RON text
    pub fn to_ron_string(&self) -> SketchResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SketchError::Serialize(e.to_string()))
    }
}
