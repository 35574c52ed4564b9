//! Error types shared across the simulation crates.

use thiserror::Error;

/// Errors raised while configuring particles, constraints or the solver.
///
/// Numerical degeneracies during a step are never reported through this
/// type: they are absorbed by the step itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrandError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timestep is non-positive or not finite.
    #[error("Invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// A particle index lies outside the particle arrays.
    #[error("Particle index {index} out of bounds (particle count {len})")]
    ParticleOutOfBounds {
        /// Offending index.
        index: usize,
        /// Current particle count.
        len: usize,
    },

    /// A mass value is negative or not finite.
    #[error("Invalid mass {0}: must be finite and non-negative")]
    InvalidMass(f64),
}

impl StrandError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a particle bounds error.
    #[must_use]
    pub const fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::ParticleOutOfBounds { index, len }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, StrandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StrandError::invalid_config("substeps must be positive");
        assert!(err.to_string().contains("substeps"));

        let err = StrandError::out_of_bounds(12, 10);
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("10"));
    }
}
