//! Stitch constraints joining particles of two actors.

use smallvec::{SmallVec, smallvec};
use strand_types::math::EPSILON;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{ProjectConstraint, ProjectionContext, remap_index};
use crate::correction::Correction;
use crate::error::Result;

/// Pulls two particles onto each other.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StitchConstraint {
    /// Stitched particles.
    pub particles: [usize; 2],
    /// Inverse stiffness.
    pub compliance: f64,
    /// Accumulated Lagrange multiplier.
    pub lambda: f64,
}

impl StitchConstraint {
    /// Rigid stitch.
    #[must_use]
    pub fn new(particles: [usize; 2]) -> Self {
        Self {
            particles,
            compliance: 0.0,
            lambda: 0.0,
        }
    }

    /// Set the compliance.
    #[must_use]
    pub fn with_compliance(mut self, compliance: f64) -> Self {
        self.compliance = compliance.max(0.0);
        self
    }
}

impl ProjectConstraint for StitchConstraint {
    fn particles(&self) -> SmallVec<[usize; 4]> {
        smallvec![self.particles[0], self.particles[1]]
    }

    fn reset(&mut self) {
        self.lambda = 0.0;
    }

    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction {
        let [i, j] = self.particles;
        let p = ctx.particles;
        let (w1, w2) = (p.inv_masses[i], p.inv_masses[j]);
        if w1 + w2 <= EPSILON {
            return Correction::default();
        }

        let diff = p.positions[i] - p.positions[j];
        let c = diff.norm();
        let alpha = ctx.scaled_compliance(self.compliance);
        let dlambda = (-c - alpha * self.lambda) / (w1 + w2 + alpha + EPSILON);
        self.lambda += dlambda;

        let delta = diff * (dlambda / (c + EPSILON));
        let mut correction = Correction::with_error(c);
        correction.push_position(i, delta * w1);
        correction.push_position(j, -delta * w2);
        correction
    }

    fn remap(&mut self, map: &[usize]) -> Result<()> {
        self.particles = [remap_index(self.particles[0], map)?, remap_index(self.particles[1], map)?];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use strand_types::{Particle, ParticleArrays};

    #[test]
    fn test_stitch_meets_in_the_middle() {
        let mut particles = ParticleArrays::with_len(2);
        particles.set(0, &Particle::new(Point3::origin(), 1.0));
        particles.set(1, &Particle::new(Point3::new(0.0, 1.0, 0.0), 1.0));
        let correction = {
            let ctx = ProjectionContext::new(&particles, 0.01);
            StitchConstraint::new([0, 1]).project(&ctx)
        };
        for (i, d) in &correction.positions {
            particles.positions[*i] += d;
        }
        assert_relative_eq!(particles.positions[0], Point3::new(0.0, 0.5, 0.0), epsilon = 1e-6);
        assert_relative_eq!(particles.positions[1], Point3::new(0.0, 0.5, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_stitch_to_pinned_particle() {
        let mut particles = ParticleArrays::with_len(2);
        particles.set(0, &Particle::pinned(Point3::origin()));
        particles.set(1, &Particle::new(Point3::new(0.0, 1.0, 0.0), 1.0));
        let ctx = ProjectionContext::new(&particles, 0.01);
        let correction = StitchConstraint::new([0, 1]).project(&ctx);
        assert_relative_eq!(correction.positions[0].1.norm(), 0.0);
        assert_relative_eq!(correction.positions[1].1.y, -1.0, epsilon = 1e-6);
    }
}
