//! Constraint construction errors.

use thiserror::Error;

/// Errors raised while building or remapping constraint batches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// A constraint shares a particle with another constraint of the batch.
    #[error("particle {particle} already used by another constraint in this batch")]
    SharedParticle {
        /// The shared particle.
        particle: usize,
    },

    /// Greedy coloring needed more batches than available.
    #[error("constraint graph needs more than {max} batches")]
    TooManyBatches {
        /// Maximum number of batches.
        max: usize,
    },

    /// A local particle index has no entry in the index map.
    #[error("particle index {index} out of bounds (map length {len})")]
    IndexOutOfBounds {
        /// Offending index.
        index: usize,
        /// Map length.
        len: usize,
    },

    /// A constraint definition is malformed.
    #[error("invalid constraint: {0}")]
    Invalid(String),
}

impl ConstraintError {
    /// Create an invalid constraint error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for constraint operations.
pub type Result<T> = std::result::Result<T, ConstraintError>;
