//! Height field colliders for terrain.
//!
//! # Coordinate system
//!
//! The field lies in the local XZ plane with heights along +Y:
//!
//! ```text
//!    Y (up)
//!    │   ╱╲
//!    │  ╱  ╲__╱╲
//!    │ ╱        ╲
//!    └────────────→ X  (0 ..= size.x)
//!   ╱
//!  ↙ Z  (0 ..= size.z)
//! ```
//!
//! Samples are normalized heights, stored row by row with X varying
//! fastest. A sample value `s` sits at height `s * size.y`.
//!
//! Each cell is split along its `(min_x, min_z)`-`(max_x, max_z)` diagonal
//! into two triangles whose front faces point up.

#![allow(clippy::cast_possible_wrap)]

use nalgebra::{Point3, Vector3};
use strand_types::{Aabb, Result, StrandError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::triangle::Triangle;

/// Sample grid shared by height field colliders.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeightFieldData {
    samples: Vec<f64>,
    resolution_u: usize,
    resolution_v: usize,
    min_sample: f64,
    max_sample: f64,
}

impl HeightFieldData {
    /// Create a grid of `resolution_u` × `resolution_v` samples.
    ///
    /// # Errors
    ///
    /// Returns [`StrandError::InvalidConfig`] when either resolution is below
    /// two, the sample count does not match, or a sample is not finite.
    pub fn new(samples: Vec<f64>, resolution_u: usize, resolution_v: usize) -> Result<Self> {
        if resolution_u < 2 || resolution_v < 2 {
            return Err(StrandError::invalid_config(format!(
                "height field resolution {resolution_u}x{resolution_v} must be at least 2x2"
            )));
        }
        if samples.len() != resolution_u * resolution_v {
            return Err(StrandError::invalid_config(format!(
                "height field has {} samples, expected {}",
                samples.len(),
                resolution_u * resolution_v
            )));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(StrandError::invalid_config(
                "height field samples must be finite",
            ));
        }

        let (min_sample, max_sample) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });

        Ok(Self {
            samples,
            resolution_u,
            resolution_v,
            min_sample,
            max_sample,
        })
    }

    /// A flat grid where every sample equals `value`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`new`](Self::new).
    pub fn flat(resolution_u: usize, resolution_v: usize, value: f64) -> Result<Self> {
        Self::new(vec![value; resolution_u * resolution_v], resolution_u, resolution_v)
    }

    /// Build a grid from a function of the sample indices `(u, v)`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`new`](Self::new).
    pub fn from_fn<F>(resolution_u: usize, resolution_v: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut samples = Vec::with_capacity(resolution_u * resolution_v);
        for v in 0..resolution_v {
            for u in 0..resolution_u {
                samples.push(f(u, v));
            }
        }
        Self::new(samples, resolution_u, resolution_v)
    }

    /// Samples along X.
    #[must_use]
    pub const fn resolution_u(&self) -> usize {
        self.resolution_u
    }

    /// Samples along Z.
    #[must_use]
    pub const fn resolution_v(&self) -> usize {
        self.resolution_v
    }

    /// Sample at grid coordinates, or `None` out of range.
    #[must_use]
    pub fn sample(&self, u: usize, v: usize) -> Option<f64> {
        if u < self.resolution_u && v < self.resolution_v {
            Some(self.samples[v * self.resolution_u + u])
        } else {
            None
        }
    }

    /// Smallest sample.
    #[must_use]
    pub const fn min_sample(&self) -> f64 {
        self.min_sample
    }

    /// Largest sample.
    #[must_use]
    pub const fn max_sample(&self) -> f64 {
        self.max_sample
    }
}

/// A sample grid scaled to a local size.
#[derive(Debug, Clone, Copy)]
pub struct HeightField<'a> {
    data: &'a HeightFieldData,
    size: Vector3<f64>,
}

impl<'a> HeightField<'a> {
    /// Scale `data` to `size` (width, maximum height, depth).
    #[must_use]
    pub const fn new(data: &'a HeightFieldData, size: Vector3<f64>) -> Self {
        Self { data, size }
    }

    fn cell_size(&self) -> (f64, f64) {
        (
            self.size.x / (self.data.resolution_u - 1) as f64,
            self.size.z / (self.data.resolution_v - 1) as f64,
        )
    }

    fn height(&self, u: usize, v: usize) -> f64 {
        self.data.sample(u, v).unwrap_or(0.0) * self.size.y
    }

    /// Local bounds of the whole field.
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::new(
            Point3::new(0.0, self.data.min_sample * self.size.y, 0.0),
            Point3::new(self.size.x, self.data.max_sample * self.size.y, self.size.z),
        )
    }

    /// Range of cell indices along one axis overlapped by `[lo, hi]`.
    fn cell_range(lo: f64, hi: f64, cell: f64, cells: usize) -> Option<(usize, usize)> {
        if cell <= 0.0 || hi < 0.0 || lo > cell * cells as f64 {
            return None;
        }
        let last = cells as i64 - 1;
        let start = ((lo / cell).floor() as i64).clamp(0, last);
        let end = ((hi / cell).floor() as i64).clamp(0, last);
        Some((start as usize, end as usize))
    }

    /// Both triangles of every cell overlapping `bounds` (local space).
    #[must_use]
    pub fn triangles_in(&self, bounds: &Aabb) -> Vec<Triangle> {
        let (cw, ch) = self.cell_size();
        let cells_u = self.data.resolution_u - 1;
        let cells_v = self.data.resolution_v - 1;

        let Some((start_x, end_x)) = Self::cell_range(bounds.min.x, bounds.max.x, cw, cells_u)
        else {
            return Vec::new();
        };
        let Some((start_z, end_z)) = Self::cell_range(bounds.min.z, bounds.max.z, ch, cells_v)
        else {
            return Vec::new();
        };

        let mut triangles = Vec::with_capacity((end_x - start_x + 1) * (end_z - start_z + 1) * 2);
        for z in start_z..=end_z {
            for x in start_x..=end_x {
                let h1 = self.height(x, z);
                let h2 = self.height(x + 1, z);
                let h3 = self.height(x, z + 1);
                let h4 = self.height(x + 1, z + 1);

                let min_x = x as f64 * cw;
                let max_x = min_x + cw;
                let min_z = z as f64 * ch;
                let max_z = min_z + ch;

                triangles.push(Triangle::new(
                    Point3::new(min_x, h3, max_z),
                    Point3::new(max_x, h4, max_z),
                    Point3::new(min_x, h1, min_z),
                ));
                triangles.push(Triangle::new(
                    Point3::new(min_x, h1, min_z),
                    Point3::new(max_x, h4, max_z),
                    Point3::new(max_x, h2, min_z),
                ));
            }
        }
        triangles
    }

    /// Interpolated surface height at local `(x, z)`, or `None` outside the field.
    #[must_use]
    pub fn height_at(&self, x: f64, z: f64) -> Option<f64> {
        let (cw, ch) = self.cell_size();
        if !(0.0..=self.size.x).contains(&x) || !(0.0..=self.size.z).contains(&z) {
            return None;
        }
        let cx = ((x / cw).floor() as usize).min(self.data.resolution_u - 2);
        let cz = ((z / ch).floor() as usize).min(self.data.resolution_v - 2);
        let fx = x / cw - cx as f64;
        let fz = z / ch - cz as f64;

        let h1 = self.height(cx, cz);
        let h2 = self.height(cx + 1, cz);
        let h3 = self.height(cx, cz + 1);
        let h4 = self.height(cx + 1, cz + 1);

        Some(if fx <= fz {
            h1 + (h4 - h3) * fx + (h3 - h1) * fz
        } else {
            h1 + (h2 - h1) * fx + (h4 - h2) * fz
        })
    }
}
