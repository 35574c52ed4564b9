//! Pins binding particles to collider frames.
//!
//! A pin drives a particle to a point fixed in a collider's local space, and
//! optionally an oriented particle to a fixed local orientation. Pins whose
//! force exceeds their break threshold stop acting and report themselves
//! broken; pins whose collider has no frame are skipped.

use nalgebra::{Point3, UnitQuaternion};
use smallvec::{SmallVec, smallvec};
use strand_types::math::{EPSILON, pure_quaternion};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{ProjectConstraint, ProjectionContext, remap_index};
use crate::correction::Correction;
use crate::error::Result;

/// Binds a particle to a point of a collider.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinConstraint {
    /// Pinned particle.
    pub particle: usize,
    /// Collider slot providing the frame.
    pub collider: usize,
    /// Attachment point in collider space.
    pub offset: Point3<f64>,
    /// Attachment orientation in collider space, for oriented particles.
    pub rest_orientation: Option<UnitQuaternion<f64>>,
    /// Positional inverse stiffness.
    pub compliance: f64,
    /// Rotational inverse stiffness.
    pub rotational_compliance: f64,
    /// Force above which the pin breaks. Infinite pins never break.
    pub break_threshold: f64,
    /// Accumulated multiplier.
    pub lambda: nalgebra::Vector3<f64>,
    /// Set once the pin has broken.
    pub broken: bool,
}

impl PinConstraint {
    /// Rigid, unbreakable pin.
    #[must_use]
    pub fn new(particle: usize, collider: usize, offset: Point3<f64>) -> Self {
        Self {
            particle,
            collider,
            offset,
            rest_orientation: None,
            compliance: 0.0,
            rotational_compliance: 0.0,
            break_threshold: f64::INFINITY,
            lambda: nalgebra::Vector3::zeros(),
            broken: false,
        }
    }

    /// Also constrain orientation.
    #[must_use]
    pub fn with_orientation(mut self, rest_orientation: UnitQuaternion<f64>) -> Self {
        self.rest_orientation = Some(rest_orientation);
        self
    }

    /// Set the compliances.
    #[must_use]
    pub fn with_compliance(mut self, compliance: f64, rotational_compliance: f64) -> Self {
        self.compliance = compliance.max(0.0);
        self.rotational_compliance = rotational_compliance.max(0.0);
        self
    }

    /// Set the break threshold.
    #[must_use]
    pub fn with_break_threshold(mut self, break_threshold: f64) -> Self {
        self.break_threshold = break_threshold;
        self
    }
}

impl ProjectConstraint for PinConstraint {
    fn particles(&self) -> SmallVec<[usize; 4]> {
        smallvec![self.particle]
    }

    fn reset(&mut self) {
        self.lambda = nalgebra::Vector3::zeros();
    }

    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction {
        if self.broken {
            return Correction::default();
        }
        let Some(frame) = ctx.frames.get(self.collider).copied().flatten() else {
            return Correction::default();
        };

        let i = self.particle;
        let p = ctx.particles;
        let mut correction = Correction::default();

        let w = p.inv_masses[i];
        if w > 0.0 {
            let target = frame.transform_point(&self.offset);
            let c = p.positions[i] - target;
            let alpha = ctx.scaled_compliance(self.compliance);
            let dlambda = (-c - self.lambda * alpha) / (w + alpha + EPSILON);
            self.lambda += dlambda;

            if self.lambda.norm() / (ctx.dt * ctx.dt) > self.break_threshold {
                self.broken = true;
                return Correction::default();
            }
            correction.error = c.norm();
            correction.push_position(i, dlambda * w);
        }

        let wq = p.inv_rotational_masses[i];
        if let Some(rest) = self.rest_orientation.filter(|_| wq > 0.0) {
            let target = frame.rotation * rest;
            let q = p.orientations[i];
            let mut omega = (q.inverse() * target).into_inner();
            if omega.w < 0.0 {
                omega = -omega;
            }
            let alpha = ctx.scaled_compliance(self.rotational_compliance);
            let scale = wq / (wq + alpha + EPSILON);
            correction.push_orientation(i, q.into_inner() * pure_quaternion(&omega.imag()) * scale);
            correction.error = correction.error.max(omega.imag().norm());
        }
        correction
    }

    fn remap(&mut self, map: &[usize]) -> Result<()> {
        self.particle = remap_index(self.particle, map)?;
        Ok(())
    }
}
