//! One-sided triangles, used by height fields.

use nalgebra::{Point3, Vector3};
use strand_types::math::{nearest_point_on_triangle, safe_normalize};

use crate::distance::{DistanceFunction, SurfacePoint};

/// A triangle whose front side is given by the winding `a`, `b`, `c`.
///
/// Points behind the triangle are reported as penetrating: the returned
/// normal always lies on the front side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Vertices.
    pub vertices: [Point3<f64>; 3],
    normal: Vector3<f64>,
}

impl Triangle {
    /// Create a triangle.
    #[must_use]
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self {
            vertices: [a, b, c],
            normal: safe_normalize(&(b - a).cross(&(c - a))),
        }
    }

    /// Unit face normal.
    #[must_use]
    pub const fn normal(&self) -> Vector3<f64> {
        self.normal
    }
}

impl DistanceFunction for Triangle {
    fn project(&self, point: &Point3<f64>) -> SurfacePoint {
        let [a, b, c] = &self.vertices;
        let (nearest, _) = nearest_point_on_triangle(a, b, c, point);
        let mut normal = safe_normalize(&(point - nearest));
        if normal == Vector3::zeros() {
            normal = self.normal;
        } else if normal.dot(&self.normal) < 0.0 {
            normal = -normal;
        }
        SurfacePoint {
            point: nearest,
            normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ground() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 0.0),
        )
    }

    #[test]
    fn test_winding_normal() {
        assert_relative_eq!(ground().normal(), Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_one_sided() {
        let tri = ground();
        let above = Point3::new(0.2, 0.3, 0.5);
        assert_relative_eq!(tri.project(&above).signed_distance(&above), 0.3, epsilon = 1e-12);

        let below = Point3::new(0.2, -0.3, 0.5);
        let s = tri.project(&below);
        assert_relative_eq!(s.normal, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(s.signed_distance(&below), -0.3, epsilon = 1e-12);
    }
}
