//! Affine transforms from collider-local space to solver space.

use nalgebra::{Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Translation, rotation and per-axis scale.
///
/// Points are mapped as `translation + rotation * (scale ⊙ p)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AffineTransform {
    /// Translation in solver space.
    pub translation: Vector3<f64>,
    /// Rotation applied after scaling.
    pub rotation: UnitQuaternion<f64>,
    /// Per-axis scale, applied first.
    pub scale: Vector3<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    /// Create a transform from its parts.
    #[must_use]
    pub const fn new(
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        scale: Vector3<f64>,
    ) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(
            Vector3::zeros(),
            UnitQuaternion::identity(),
            Vector3::new(1.0, 1.0, 1.0),
        )
    }

    /// A pure translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// A rigid transform (unit scale).
    #[must_use]
    pub fn from_parts(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
            ..Self::identity()
        }
    }

    fn inverse_scale(&self) -> Vector3<f64> {
        self.scale.map(|s| if s.abs() > f64::EPSILON { 1.0 / s } else { 0.0 })
    }

    /// Map a local point to solver space.
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.translation + self.rotation * point.coords.component_mul(&self.scale))
    }

    /// Map a solver-space point to local space.
    #[must_use]
    pub fn inverse_transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let local = self
            .rotation
            .inverse_transform_vector(&(point.coords - self.translation));
        Point3::from(local.component_mul(&self.inverse_scale()))
    }

    /// Map a local vector (rotation and scale, no translation).
    #[must_use]
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * vector.component_mul(&self.scale)
    }

    /// Inverse of [`transform_vector`](Self::transform_vector).
    #[must_use]
    pub fn inverse_transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation
            .inverse_transform_vector(vector)
            .component_mul(&self.inverse_scale())
    }

    /// Rotate a direction (no scale, no translation).
    #[must_use]
    pub fn transform_direction(&self, direction: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * direction
    }

    /// Map a local surface normal to solver space (inverse-transpose), unit length.
    #[must_use]
    pub fn transform_normal(&self, normal: &Vector3<f64>) -> Vector3<f64> {
        crate::math::safe_normalize(&(self.rotation * normal.component_mul(&self.inverse_scale())))
    }

    /// Inverse of [`transform_direction`](Self::transform_direction).
    #[must_use]
    pub fn inverse_transform_direction(&self, direction: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_point_round_trip() {
        let t = AffineTransform::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.0, FRAC_PI_2, 0.0),
            Vector3::new(2.0, 1.0, 0.5),
        );
        let p = Point3::new(0.3, -0.7, 1.9);
        let back = t.inverse_transform_point(&t.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-12);
    }

    #[test]
    fn test_direction_ignores_scale() {
        let t = AffineTransform::new(
            Vector3::zeros(),
            UnitQuaternion::identity(),
            Vector3::new(3.0, 3.0, 3.0),
        );
        assert_relative_eq!(t.transform_direction(&Vector3::x()), Vector3::x());
        assert_relative_eq!(t.transform_vector(&Vector3::x()), Vector3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_normal_under_non_uniform_scale() {
        let t = AffineTransform::new(
            Vector3::zeros(),
            UnitQuaternion::identity(),
            Vector3::new(2.0, 1.0, 1.0),
        );
        // Plane x + y = 1 maps to x/2 + y = 1, normal (0.5, 1, 0).
        let n = t.transform_normal(&Vector3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(n, Vector3::new(0.5, 1.0, 0.0).normalize(), epsilon = 1e-12);
    }
}
