//! Box colliders.

use nalgebra::{Point3, Vector3};
use strand_types::Aabb;
use strand_types::math::{pure_sign, safe_normalize};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::distance::{DistanceFunction, SurfacePoint};

/// An axis-aligned box in collider-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cuboid {
    /// Box center.
    pub center: Point3<f64>,
    /// Half extents along each local axis.
    pub half_extents: Vector3<f64>,
}

impl Cuboid {
    /// Box centered at the origin.
    #[must_use]
    pub fn new(half_extents: Vector3<f64>) -> Self {
        Self {
            center: Point3::origin(),
            half_extents,
        }
    }

    /// Box with an offset center.
    #[must_use]
    pub const fn with_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    /// Local bounds.
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_center(self.center, self.half_extents)
    }
}

impl DistanceFunction for Cuboid {
    fn project(&self, point: &Point3<f64>) -> SurfacePoint {
        let h = self.half_extents;
        let q = point - self.center;
        let inside = (0..3).all(|i| q[i].abs() <= h[i]);

        if inside {
            // Snap to the face of least penetration.
            let depth = Vector3::new(h.x - q.x.abs(), h.y - q.y.abs(), h.z - q.z.abs());
            let axis = depth.imin();
            let mut surface = q;
            surface[axis] = pure_sign(q[axis]) * h[axis];
            let mut normal = Vector3::zeros();
            normal[axis] = pure_sign(q[axis]);
            return SurfacePoint {
                point: self.center + surface,
                normal,
            };
        }

        let clamped = Vector3::new(
            q.x.clamp(-h.x, h.x),
            q.y.clamp(-h.y, h.y),
            q.z.clamp(-h.z, h.z),
        );
        SurfacePoint {
            point: self.center + clamped,
            normal: safe_normalize(&(q - clamped)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exterior_face() {
        let cuboid = Cuboid::new(Vector3::new(1.0, 1.0, 1.0));
        let p = Point3::new(0.2, 1.5, -0.3);
        let s = cuboid.project(&p);
        assert_relative_eq!(s.point, Point3::new(0.2, 1.0, -0.3), epsilon = 1e-12);
        assert_relative_eq!(s.normal, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(s.signed_distance(&p), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_exterior_corner() {
        let cuboid = Cuboid::new(Vector3::new(1.0, 1.0, 1.0));
        let p = Point3::new(2.0, 2.0, 2.0);
        let s = cuboid.project(&p);
        assert_relative_eq!(s.point, Point3::new(1.0, 1.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(s.signed_distance(&p), 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_interior_snaps_to_nearest_face() {
        let cuboid = Cuboid::with_center(Point3::new(0.0, -1.0, 0.0), Vector3::new(2.0, 1.0, 2.0));
        let p = Point3::new(0.5, -0.2, 0.1);
        let s = cuboid.project(&p);
        assert_relative_eq!(s.point, Point3::new(0.5, 0.0, 0.1), epsilon = 1e-12);
        assert_relative_eq!(s.normal, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(s.signed_distance(&p), -0.2, epsilon = 1e-12);
    }
}
