use super::config::ConfigError;
use crate::core::rotamers::library::LibraryLoadError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Candidate budget exhausted: search space of {requested} candidates exceeds the limit of {limit}")]
    ExhaustedBudget { requested: u128, limit: usize },

    #[error("Atom {atom} at ({x:.3}, {y:.3}, {z:.3}) lies outside the density map")]
    OutOfBounds { atom: String, x: f64, y: f64, z: f64 },

    #[error("Occupancy problem is infeasible: {0}")]
    Infeasible(String),

    #[error("Solver exceeded its time budget before finding any feasible solution")]
    SolverTimeout,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Rotamer library error: {0}")]
    RotamerLibrary(#[from] LibraryLoadError),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

/// Error category recorded in region diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ExhaustedBudget,
    OutOfBounds,
    Infeasible,
    SolverTimeout,
    Config,
    RotamerLibrary,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ExhaustedBudget { .. } => ErrorKind::ExhaustedBudget,
            EngineError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            EngineError::Infeasible(_) => ErrorKind::Infeasible,
            EngineError::SolverTimeout => ErrorKind::SolverTimeout,
            EngineError::Config(_) => ErrorKind::Config,
            EngineError::RotamerLibrary(_) => ErrorKind::RotamerLibrary,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ExhaustedBudget => "exhausted-budget",
            ErrorKind::OutOfBounds => "out-of-bounds",
            ErrorKind::Infeasible => "infeasible",
            ErrorKind::SolverTimeout => "solver-timeout",
            ErrorKind::Config => "config",
            ErrorKind::RotamerLibrary => "rotamer-library",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}
