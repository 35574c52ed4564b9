//! Sphere colliders.

use nalgebra::{Point3, Vector3};
use strand_types::Aabb;
use strand_types::math::safe_normalize;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::distance::{DistanceFunction, SurfacePoint};

/// A sphere in collider-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sphere {
    /// Center.
    pub center: Point3<f64>,
    /// Radius.
    pub radius: f64,
}

impl Sphere {
    /// Create a sphere.
    #[must_use]
    pub const fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Local bounds.
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_sphere(self.center, self.radius)
    }
}

impl DistanceFunction for Sphere {
    fn project(&self, point: &Point3<f64>) -> SurfacePoint {
        let mut normal = safe_normalize(&(point - self.center));
        if normal == Vector3::zeros() {
            normal = Vector3::y();
        }
        SurfacePoint {
            point: self.center + normal * self.radius,
            normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inside_and_outside() {
        let sphere = Sphere::new(Point3::new(1.0, 0.0, 0.0), 0.5);
        let outside = Point3::new(3.0, 0.0, 0.0);
        let s = sphere.project(&outside);
        assert_relative_eq!(s.signed_distance(&outside), 1.5, epsilon = 1e-12);

        let inside = Point3::new(1.0, 0.25, 0.0);
        let s = sphere.project(&inside);
        assert_relative_eq!(s.signed_distance(&inside), -0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_center_picks_up() {
        let sphere = Sphere::new(Point3::origin(), 2.0);
        let s = sphere.project(&Point3::origin());
        assert_relative_eq!(s.point, Point3::new(0.0, 2.0, 0.0));
    }
}
