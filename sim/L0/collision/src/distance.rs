//! Distance function abstraction shared by every collider shape.

use nalgebra::{Point3, Vector3};
use strand_types::AffineTransform;

/// Closest point on a surface, with the normal along which distance grows.
///
/// The signed distance of the query point `p` is `(p - point) · normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// Point on the surface.
    pub point: Point3<f64>,
    /// Unit normal.
    pub normal: Vector3<f64>,
}

impl SurfacePoint {
    /// Signed distance from `p` to the surface along the normal.
    #[must_use]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        (p - self.point).dot(&self.normal)
    }

    /// A surface infinitely far from `p`, used when a shape has no geometry.
    #[must_use]
    pub fn unreachable(p: &Point3<f64>) -> Self {
        Self {
            point: p + Vector3::y() * f64::MAX.sqrt(),
            normal: -Vector3::y(),
        }
    }
}

/// A shape that can project points onto its surface.
pub trait DistanceFunction {
    /// Project `point` onto the surface.
    fn project(&self, point: &Point3<f64>) -> SurfacePoint;
}

/// A local-space shape seen through a collider transform.
#[derive(Debug, Clone, Copy)]
pub struct Transformed<'a, F: ?Sized> {
    /// Shape in collider-local space.
    pub shape: &'a F,
    /// Collider-local to solver space.
    pub transform: &'a AffineTransform,
}

impl<'a, F: ?Sized> Transformed<'a, F> {
    /// Wrap a local shape.
    pub const fn new(shape: &'a F, transform: &'a AffineTransform) -> Self {
        Self { shape, transform }
    }
}

impl<F: DistanceFunction + ?Sized> DistanceFunction for Transformed<'_, F> {
    fn project(&self, point: &Point3<f64>) -> SurfacePoint {
        let local = self.transform.inverse_transform_point(point);
        let surface = self.shape.project(&local);
        SurfacePoint {
            point: self.transform.transform_point(&surface.point),
            normal: self.transform.transform_normal(&surface.normal),
        }
    }
}
