//! Solver outcome classification

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified result of one solver invocation.
///
/// Stored on every sketch after it has been solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolverState {
    /// Successfully solved
    #[default]
    Okay,
    /// Contradictory constraints
    Inconsistent,
    /// The system did not converge
    DidntConverge,
    /// More unknowns than the solver accepts
    TooManyUnknowns,
    /// The solver could not set up the system
    InitError,
    /// Solved, but some constraints are redundant
    RedundantOkay,
    /// Any result code the solver does not document
    UnknownFailure,
}

impl SolverState {
    /// Map a raw solver result code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => SolverState::Okay,
            1 => SolverState::Inconsistent,
            2 => SolverState::DidntConverge,
            3 => SolverState::TooManyUnknowns,
            4 => SolverState::InitError,
            5 => SolverState::RedundantOkay,
            _ => SolverState::UnknownFailure,
        }
    }

    /// Raw result code
    pub fn code(self) -> i32 {
        match self {
            SolverState::Okay => 0,
            SolverState::Inconsistent => 1,
            SolverState::DidntConverge => 2,
            SolverState::TooManyUnknowns => 3,
            SolverState::InitError => 4,
            SolverState::RedundantOkay => 5,
            SolverState::UnknownFailure => 6,
        }
    }

    /// Whether solved values may be written back
    pub fn is_ok(self) -> bool {
        matches!(self, SolverState::Okay | SolverState::RedundantOkay)
    }

    /// Severity used to pick the worst state of several groups
    pub fn severity(self) -> u8 {
        match self {
            SolverState::Okay => 0,
            SolverState::RedundantOkay => 1,
            _ => 2,
        }
    }

    /// Short label
    pub fn label(self) -> &'static str {
        match self {
            SolverState::Okay => "Okay",
            SolverState::Inconsistent => "Inconsistent",
            SolverState::DidntConverge => "Didnt Converge",
            SolverState::TooManyUnknowns => "Too Many Unknowns",
            SolverState::InitError => "Initialize Error",
            SolverState::RedundantOkay => "Redundant Constraints",
            SolverState::UnknownFailure => "Unknown Failure",
        }
    }

    /// User facing explanation
    pub fn description(self) -> &'static str {
        match self {
            SolverState::Okay => "Successfully solved sketch.",
            SolverState::Inconsistent => {
                "Cannot solve sketch because of inconsistent constraints, check through the failed constraints and remove the ones that contradict each other."
            }
            SolverState::DidntConverge => "Cannot solve sketch, system didn't converge.",
            SolverState::TooManyUnknowns => "Cannot solve sketch because of too many unknowns.",
            SolverState::InitError => "Solver failed to initialize.",
            SolverState::RedundantOkay => {
                "Some constraints seem to be redundant, this might cause an error once the constraints are no longer consistent. Check through the marked constraints and only keep what's necessary."
            }
            SolverState::UnknownFailure => "Cannot solve sketch because of unknown failure.",
        }
    }
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
