//! Cosserat bend-twist constraints for rods.

use nalgebra::{Quaternion, Vector3};
use smallvec::{SmallVec, smallvec};
use strand_types::math::{EPSILON, pure_quaternion};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{ProjectConstraint, ProjectionContext, remap_index};
use crate::correction::Correction;
use crate::error::Result;

/// Keeps the relative rotation of two consecutive orientations at a rest
/// Darboux value.
///
/// The current Darboux quaternion `conj(q1) * q2` is compared with the rest
/// value along the shorter of `ω - rest` and `ω + rest`; its vector part is
/// driven to zero per axis, with `(bend x, bend y, torsion)` compliances.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BendTwistConstraint {
    /// Oriented particles.
    pub particles: [usize; 2],
    /// Rest Darboux quaternion.
    pub rest_darboux: Quaternion<f64>,
    /// Compliance per axis.
    pub compliance: Vector3<f64>,
    /// Deviation above which plastic flow starts.
    pub plastic_yield: f64,
    /// Plastic flow rate. Zero disables plasticity.
    pub plastic_creep: f64,
    /// Accumulated multipliers per axis.
    pub lambda: Vector3<f64>,
}

impl BendTwistConstraint {
    /// Rigid, elastic constraint.
    #[must_use]
    pub fn new(particles: [usize; 2], rest_darboux: Quaternion<f64>) -> Self {
        Self {
            particles,
            rest_darboux,
            compliance: Vector3::zeros(),
            plastic_yield: 0.0,
            plastic_creep: 0.0,
            lambda: Vector3::zeros(),
        }
    }

    /// Set the compliances.
    #[must_use]
    pub fn with_compliance(mut self, bend_x: f64, bend_y: f64, torsion: f64) -> Self {
        self.compliance = Vector3::new(bend_x, bend_y, torsion).map(|c| c.max(0.0));
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

impl ProjectConstraint for BendTwistConstraint {
    fn particles(&self) -> SmallVec<[usize; 4]> {
        smallvec![self.particles[0], self.particles[1]]
    }

    fn reset(&mut self) {
        self.lambda = Vector3::zeros();
    }

    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction {
        let [i, j] = self.particles;
        let p = ctx.particles;
        let (w1, w2) = (p.inv_rotational_masses[i], p.inv_rotational_masses[j]);
        if w1 + w2 <= EPSILON {
            return Correction::default();
        }

        let q1 = p.orientations[i].into_inner();
        let q2 = p.orientations[j].into_inner();
        let darboux = q1.conjugate() * q2;

        let plus = darboux + self.rest_darboux;
        let minus = darboux - self.rest_darboux;
        let omega = if minus.norm_squared() > plus.norm_squared() { plus } else { minus };

        // The rest value flows for later projections; this one uses `omega`.
        if self.plastic_creep > 0.0 && omega.norm_squared() > self.plastic_yield * self.plastic_yield {
            self.rest_darboux += omega * (self.plastic_creep * ctx.dt);
        }

        let alpha = self.compliance / (ctx.dt * ctx.dt);
        let error = omega.imag();
        let dlambda = (error - alpha.component_mul(&self.lambda)).component_div(&alpha.add_scalar(w1 + w2 + EPSILON));
        self.lambda += dlambda;

        let impulse = pure_quaternion(&dlambda);
        let mut correction = Correction::with_error(error.norm());
        correction.push_orientation(i, q2 * impulse * w1);
        correction.push_orientation(j, -(q1 * impulse) * w2);
        correction
    }

    fn remap(&mut self, map: &[usize]) -> Result<()> {
        self.particles = [remap_index(self.particles[0], map)?, remap_index(self.particles[1], map)?];
        Ok(())
    }
}
