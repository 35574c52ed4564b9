//! Distance constraints between particle pairs.

use smallvec::{SmallVec, smallvec};
use strand_types::math::EPSILON;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{ProjectConstraint, ProjectionContext, remap_index};
use crate::correction::Correction;
use crate::error::Result;

/// Keeps two particles at a rest distance.
///
/// The constraint is `C = |x1 - x2| - rest_length`. Compression up to
/// `max_compression` (a length) is tolerated without correction, which lets
/// ropes buckle instead of pushing back.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistanceConstraint {
    /// Constrained particles.
    pub particles: [usize; 2],
    /// Rest distance.
    pub rest_length: f64,
    /// Inverse stiffness. Zero is rigid.
    pub compliance: f64,
    /// Tolerated compression, as a length.
    pub max_compression: f64,
    /// Accumulated Lagrange multiplier.
    pub lambda: f64,
}

impl DistanceConstraint {
    /// Rigid constraint with no compression slack.
    #[must_use]
    pub fn new(particles: [usize; 2], rest_length: f64) -> Self {
        Self {
            particles,
            rest_length,
            compliance: 0.0,
            max_compression: 0.0,
            lambda: 0.0,
        }
    }

    /// Set the compliance.
    #[must_use]
    pub fn with_compliance(mut self, compliance: f64) -> Self {
        self.compliance = compliance.max(0.0);
        self
    }

    /// Set the compression slack.
    #[must_use]
    pub fn with_max_compression(mut self, max_compression: f64) -> Self {
        self.max_compression = max_compression.max(0.0);
        self
    }
}

impl ProjectConstraint for DistanceConstraint {
    fn particles(&self) -> SmallVec<[usize; 4]> {
        smallvec![self.particles[0], self.particles[1]]
    }

    fn reset(&mut self) {
        self.lambda = 0.0;
    }

    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction {
        let [i, j] = self.particles;
        let p = ctx.particles;
        let w1 = p.inv_masses[i];
        let w2 = p.inv_masses[j];
        if w1 + w2 <= EPSILON {
            return Correction::default();
        }

        let diff = p.positions[i] - p.positions[j];
        let distance = diff.norm();
        let mut c = distance - self.rest_length;
        c -= c.min(0.0).max(-self.max_compression);

        let alpha = ctx.scaled_compliance(self.compliance);
        let dlambda = (-c - alpha * self.lambda) / (w1 + w2 + alpha + EPSILON);
        self.lambda += dlambda;

        let delta = diff * (dlambda / (distance + EPSILON));
        let mut correction = Correction::with_error(c.abs());
        correction.push_position(i, delta * w1);
        correction.push_position(j, -delta * w2);
        correction
    }

    fn remap(&mut self, map: &[usize]) -> Result<()> {
        self.particles = [remap_index(self.particles[0], map)?, remap_index(self.particles[1], map)?];
        Ok(())
    }
}
