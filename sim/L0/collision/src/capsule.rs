//! Capsule colliders.

use nalgebra::{Point3, Vector3};
use strand_types::Aabb;
use strand_types::math::{project_point_line, safe_normalize};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::distance::{DistanceFunction, SurfacePoint};

/// A capsule: all points within `radius` of the segment `a`-`b`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capsule {
    /// First segment endpoint.
    pub a: Point3<f64>,
    /// Second segment endpoint.
    pub b: Point3<f64>,
    /// Radius.
    pub radius: f64,
}

impl Capsule {
    /// Create a capsule from its segment and radius.
    #[must_use]
    pub const fn new(a: Point3<f64>, b: Point3<f64>, radius: f64) -> Self {
        Self { a, b, radius }
    }

    /// Capsule centered at the origin, aligned with local Y.
    #[must_use]
    pub fn upright(half_height: f64, radius: f64) -> Self {
        Self::new(
            Point3::new(0.0, -half_height, 0.0),
            Point3::new(0.0, half_height, 0.0),
            radius,
        )
    }

    /// Local bounds.
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_sphere(self.a, self.radius).union(&Aabb::from_sphere(self.b, self.radius))
    }
}

impl DistanceFunction for Capsule {
    fn project(&self, point: &Point3<f64>) -> SurfacePoint {
        let (on_axis, _) = project_point_line(point, &self.a, &self.b);
        let mut normal = safe_normalize(&(point - on_axis));
        if normal == Vector3::zeros() {
            // On the axis: any direction perpendicular to it.
            let axis = safe_normalize(&(self.b - self.a));
            let helper = if axis.x.abs() < 0.9 {
                Vector3::x()
            } else {
                Vector3::y()
            };
            normal = safe_normalize(&axis.cross(&helper));
            if normal == Vector3::zeros() {
                normal = Vector3::y();
            }
        }
        SurfacePoint {
            point: on_axis + normal * self.radius,
            normal,
        }
    }
}
