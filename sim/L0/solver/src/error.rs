//! Solver errors.

use strand_constraint::ConstraintError;
use strand_types::StrandError;
use thiserror::Error;

use crate::{ActorId, StitcherId};

/// Errors returned by [`crate::Solver`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// Invalid configuration or parameters.
    #[error(transparent)]
    Config(#[from] StrandError),

    /// A constraint batch could not be built or remapped.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    /// The actor is not part of this solver.
    #[error("{0} is not part of this solver")]
    UnknownActor(ActorId),

    /// The stitcher is not part of this solver.
    #[error("{0} is not part of this solver")]
    UnknownStitcher(StitcherId),

    /// The particle arena cannot grow any further.
    #[error("particle arena exhausted: requested {requested}, capacity limit {limit}")]
    ArenaExhausted {
        /// Particles requested.
        requested: usize,
        /// Arena capacity limit.
        limit: usize,
    },

    /// A local particle index exceeds the actor's particle count.
    #[error("particle {index} out of bounds for actor with {len} particles")]
    ParticleOutOfBounds {
        /// Requested index.
        index: usize,
        /// Actor particle count.
        len: usize,
    },
}

impl SolverError {
    /// Create a configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::Config(StrandError::invalid_config(msg))
    }
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;
