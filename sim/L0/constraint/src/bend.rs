//! Bending constraints over particle triples.

use nalgebra::Point3;
use smallvec::{SmallVec, smallvec};
use strand_types::math::EPSILON;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{ProjectConstraint, ProjectionContext, remap_index};
use crate::correction::Correction;
use crate::error::Result;

/// Distance of `c` from the centroid of a triple, as a vector.
#[must_use]
pub fn bend_vector(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> nalgebra::Vector3<f64> {
    let centroid = (a.coords + b.coords + c.coords) / 3.0;
    c.coords - centroid
}

/// Resists bending at the middle particle of a triple.
///
/// Particles are stored as `[a, b, c]` with `c` the middle one, so a rope
/// uses `(i, i + 2, i + 1)`. The constraint is the distance of `c` from the
/// triple's centroid minus the rest value. Deviations within `max_bending`
/// are ignored. With plasticity, the part of a deviation left past the dead
/// zone creeps the rest value at `plastic_creep` per second once it exceeds
/// `plastic_yield`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BendConstraint {
    /// `[a, b, c]`, `c` is the middle particle.
    pub particles: [usize; 3],
    /// Rest centroid distance.
    pub rest_bend: f64,
    /// Inverse stiffness.
    pub compliance: f64,
    /// Dead zone half-width.
    pub max_bending: f64,
    /// Deviation above which plastic flow starts.
    pub plastic_yield: f64,
    /// Plastic flow rate. Zero disables plasticity.
    pub plastic_creep: f64,
    /// Accumulated Lagrange multiplier.
    pub lambda: f64,
}

impl BendConstraint {
    /// Rigid, elastic bend constraint.
    #[must_use]
    pub fn new(particles: [usize; 3], rest_bend: f64) -> Self {
        Self {
            particles,
            rest_bend,
            compliance: 0.0,
            max_bending: 0.0,
            plastic_yield: 0.0,
            plastic_creep: 0.0,
            lambda: 0.0,
        }
    }

    /// Set the compliance.
    #[must_use]
    pub fn with_compliance(mut self, compliance: f64) -> Self {
        self.compliance = compliance.max(0.0);
        self
    }

    /// Set the dead zone.
    #[must_use]
    pub fn with_max_bending(mut self, max_bending: f64) -> Self {
        self.max_bending = max_bending.max(0.0);
        self
    }

    /// Enable plasticity.
    #[must_use]
    pub fn with_plasticity(mut self, plastic_yield: f64, plastic_creep: f64) -> Self {
        self.plastic_yield = plastic_yield.max(0.0);
        self.plastic_creep = plastic_creep.max(0.0);
        self
    }
}

impl ProjectConstraint for BendConstraint {
    fn particles(&self) -> SmallVec<[usize; 4]> {
        SmallVec::from_slice(&self.particles)
    }

    fn reset(&mut self) {
        self.lambda = 0.0;
    }

    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction {
        let [a, b, c] = self.particles;
        let p = ctx.particles;
        let (wa, wb, wc) = (p.inv_masses[a], p.inv_masses[b], p.inv_masses[c]);
        let w = wa + wb + 2.0 * wc;
        if w <= EPSILON {
            return Correction::default();
        }

        let bend = bend_vector(&p.positions[a], &p.positions[b], &p.positions[c]);
        let length = bend.norm();

        let mut constraint = length - self.rest_bend;
        constraint = (constraint - self.max_bending).max(0.0) + (constraint + self.max_bending).min(0.0);

        // Only deformation past the dead zone flows.
        if self.plastic_creep > 0.0 && constraint.abs() > self.plastic_yield {
            self.rest_bend += constraint * self.plastic_creep * ctx.dt;
        }

        let alpha = ctx.scaled_compliance(self.compliance);
        let dlambda = (-constraint - alpha * self.lambda) / (w + alpha + EPSILON);
        self.lambda += dlambda;

        let correction_vector = bend * (dlambda / (length + EPSILON));
        let mut correction = Correction::with_error(constraint.abs());
        correction.push_position(a, -correction_vector * (2.0 * wa));
        correction.push_position(b, -correction_vector * (2.0 * wb));
        correction.push_position(c, correction_vector * (4.0 * wc));
        correction
    }

    fn remap(&mut self, map: &[usize]) -> Result<()> {
        for p in &mut self.particles {
            *p = remap_index(*p, map)?;
        }
        Ok(())
    }
}

/// Bend triples `[a, b, middle]` along a path of `count` particles.
#[must_use]
pub fn rope_bend_triples(count: usize, closed: bool) -> SmallVec<[[usize; 3]; 8]> {
    let mut triples: SmallVec<[[usize; 3]; 8]> = smallvec![];
    if count < 3 {
        return triples;
    }
    for i in 0..count - 2 {
        triples.push([i, i + 2, i + 1]);
    }
    if closed {
        triples.push([count - 2, 0, count - 1]);
        triples.push([count - 1, 1, 0]);
    }
    triples
}
