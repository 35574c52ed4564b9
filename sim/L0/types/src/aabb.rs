//! Axis-aligned bounding boxes.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::AffineTransform;

/// Axis-aligned bounding box.
///
/// An empty box has `min > max` on every axis and absorbs the first point
/// or box it is grown by.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create a box from its corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// An inverted box that contains nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Box around a sphere.
    #[must_use]
    pub fn from_sphere(center: Point3<f64>, radius: f64) -> Self {
        let r = Vector3::new(radius, radius, radius);
        Self::new(center - r, center + r)
    }

    /// Box centered at a point with the given half extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest box containing all points. Empty for an empty iterator.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.encapsulate_point(p);
        }
        aabb
    }

    /// Whether the box contains nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to contain a point.
    pub fn encapsulate_point(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Grow to contain another box.
    pub fn encapsulate(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Union of two boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.encapsulate(other);
        out
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Full size along each axis.
    #[must_use]
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z).
    #[must_use]
    pub fn longest_axis(&self) -> usize {
        self.size().imax()
    }

    /// Grow by a margin on every side.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::new(margin, margin, margin);
        Self::new(self.min - m, self.max + m)
    }

    /// Sweep the box along a displacement.
    #[must_use]
    pub fn swept(&self, displacement: &Vector3<f64>) -> Self {
        let mut out = *self;
        out.encapsulate(&Self::new(self.min + displacement, self.max + displacement));
        out
    }

    /// Whether two boxes overlap (touching counts).
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether a point lies inside (boundary included).
    #[must_use]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Bounds of this box after a transform (bounds of the 8 mapped corners).
    #[must_use]
    pub fn transformed(&self, transform: &AffineTransform) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.encapsulate_point(&transform.transform_point(&corner));
        }
        out
    }

    /// Bounds of this box mapped back into a transform's local space.
    #[must_use]
    pub fn inverse_transformed(&self, transform: &AffineTransform) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.encapsulate_point(&transform.inverse_transform_point(&corner));
        }
        out
    }
}
