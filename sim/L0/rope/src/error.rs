//! Rope and rod errors.

use strand_constraint::ConstraintError;
use strand_solver::{SolverError, SolverId};
use thiserror::Error;

/// Errors returned by blueprints, actors, stitchers and attachments.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RopeError {
    /// The solver rejected an operation.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Constraints could not be built.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    /// Blueprint construction was stopped by its progress callback.
    #[error("blueprint construction cancelled")]
    Cancelled,

    /// The actor is not part of any solver.
    #[error("actor is not part of a solver")]
    NotInSolver,

    /// The actor is already part of a solver.
    #[error("actor is already part of {0}")]
    AlreadyInSolver(SolverId),

    /// The actor belongs to another solver than the one passed in.
    #[error("actor belongs to {actor}, not {solver}")]
    WrongSolver {
        /// Solver the actor belongs to.
        actor: SolverId,
        /// Solver passed to the operation.
        solver: SolverId,
    },

    /// An attachment targets a collider that does not exist.
    #[error("collider {0} does not exist")]
    MissingCollider(usize),

    /// Invalid parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl RopeError {
    /// Create an invalid parameter error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Result type for rope operations.
pub type Result<T> = std::result::Result<T, RopeError>;
