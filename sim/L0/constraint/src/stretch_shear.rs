//! Cosserat stretch-shear constraints for rods.
//!
//! Couples a rod segment `x1 → x2` to the orientation of its first
//! particle: the segment must have its rest length and lie along the local
//! Z axis of `q · rest_orientation`.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use smallvec::{SmallVec, smallvec};
use strand_types::math::{EPSILON, pure_quaternion};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{ProjectConstraint, ProjectionContext, remap_index};
use crate::correction::Correction;
use crate::error::Result;

/// Stretch and shear constraint between a segment and an orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StretchShearConstraint {
    /// Segment endpoints.
    pub particles: [usize; 2],
    /// Particle whose orientation frames the segment.
    pub orientation: usize,
    /// Rest segment length.
    pub rest_length: f64,
    /// Orientation offset applied after the particle orientation.
    pub rest_orientation: UnitQuaternion<f64>,
    /// Compliance per local axis: `(shear x, shear y, stretch)`.
    pub compliance: Vector3<f64>,
    /// Accumulated multipliers per axis.
    pub lambda: Vector3<f64>,
}

impl StretchShearConstraint {
    /// Rigid constraint framed by the first particle.
    #[must_use]
    pub fn new(particles: [usize; 2], rest_length: f64) -> Self {
        Self {
            particles,
            orientation: particles[0],
            rest_length,
            rest_orientation: UnitQuaternion::identity(),
            compliance: Vector3::zeros(),
            lambda: Vector3::zeros(),
        }
    }

    /// Set the compliances.
    #[must_use]
    pub fn with_compliance(mut self, shear_x: f64, shear_y: f64, stretch: f64) -> Self {
        self.compliance = Vector3::new(shear_x, shear_y, stretch).map(|c| c.max(0.0));
        self
    }

    /// Set the rest orientation offset.
    #[must_use]
    pub fn with_rest_orientation(mut self, rest_orientation: UnitQuaternion<f64>) -> Self {
        self.rest_orientation = rest_orientation;
        self
    }
}

impl ProjectConstraint for StretchShearConstraint {
    fn particles(&self) -> SmallVec<[usize; 4]> {
        let mut particles: SmallVec<[usize; 4]> = smallvec![self.particles[0], self.particles[1]];
        if !self.particles.contains(&self.orientation) {
            particles.push(self.orientation);
        }
        particles
    }

    fn reset(&mut self) {
        self.lambda = Vector3::zeros();
    }

    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction {
        let [i, j] = self.particles;
        let o = self.orientation;
        let p = ctx.particles;
        let (w1, w2) = (p.inv_masses[i], p.inv_masses[j]);
        let wq = p.inv_rotational_masses[o];
        if w1 + w2 + wq <= EPSILON {
            return Correction::default();
        }
        let length = self.rest_length;

        let basis = p.orientations[o] * self.rest_orientation;
        let mut gamma = basis.inverse_transform_vector(&(p.positions[j] - p.positions[i])) / (length + EPSILON);
        gamma.z -= 1.0;

        let w = (w1 + w2) / (length + EPSILON) + wq * 4.0 * length + EPSILON;
        let alpha = self.compliance / (ctx.dt * ctx.dt);
        let dlambda = (gamma - alpha.component_mul(&self.lambda)).component_div(&alpha.add_scalar(w));
        self.lambda += dlambda;

        let world = basis * dlambda;
        let mut correction = Correction::with_error(gamma.norm() * length);
        correction.push_position(i, world * w1);
        correction.push_position(j, -world * w2);

        if wq > 0.0 {
            let e3 = self.rest_orientation * Vector3::z();
            let q = p.orientations[o].into_inner();
            let dq: Quaternion<f64> =
                pure_quaternion(&world) * (q * pure_quaternion(&e3).conjugate()) * (2.0 * wq * length);
            correction.push_orientation(o, dq);
        }
        correction
    }

    fn remap(&mut self, map: &[usize]) -> Result<()> {
        self.particles = [remap_index(self.particles[0], map)?, remap_index(self.particles[1], map)?];
        self.orientation = remap_index(self.orientation, map)?;
        Ok(())
    }
}
