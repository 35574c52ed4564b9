//! Render frames along a simulated curve.

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use strand_types::Color;
use strand_types::math::{from_to_rotation, look_rotation, safe_normalize};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point on a rendered curve with its orthonormal frame.
///
/// `tangent` follows the curve, `normal` and `binormal` span the
/// cross-section. Frames are recomputed from particle state on demand.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathFrame {
    /// Position.
    pub position: Point3<f64>,
    /// Unit tangent.
    pub tangent: Vector3<f64>,
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Unit binormal.
    pub binormal: Vector3<f64>,
    /// Color.
    pub color: Color,
    /// Cross-section radius.
    pub thickness: f64,
}

impl Default for PathFrame {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            tangent: Vector3::z(),
            normal: Vector3::y(),
            binormal: Vector3::x(),
            color: Color::new(1.0, 1.0, 1.0, 1.0),
            thickness: 0.0,
        }
    }
}

impl PathFrame {
    /// Reset to the canonical frame at the origin.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Frame from an orientation: tangent is local Z, normal local Y.
    #[must_use]
    pub fn from_orientation(position: Point3<f64>, orientation: &UnitQuaternion<f64>) -> Self {
        Self {
            position,
            tangent: orientation * Vector3::z(),
            normal: orientation * Vector3::y(),
            binormal: orientation * Vector3::x(),
            ..Self::default()
        }
    }

    /// Move the frame to a new position and tangent, carrying the normal
    /// along with the smallest rotation and then twisting it by `twist`
    /// radians around the new tangent.
    pub fn transport(&mut self, position: Point3<f64>, tangent: Vector3<f64>, twist: f64) {
        let mut rotation = from_to_rotation(&self.tangent, &tangent);
        if let Some(axis) = Unit::try_new(tangent, f64::EPSILON) {
            rotation = UnitQuaternion::from_axis_angle(&axis, twist) * rotation;
        }
        self.normal = rotation * self.normal;
        self.binormal = rotation * self.binormal;
        self.tangent = tangent;
        self.position = position;
    }

    /// Rotate normal and binormal around the tangent.
    pub fn twist(&mut self, angle: f64) {
        if let Some(axis) = Unit::try_new(self.tangent, f64::EPSILON) {
            let rotation = UnitQuaternion::from_axis_angle(&axis, angle);
            self.normal = rotation * self.normal;
            self.binormal = rotation * self.binormal;
        }
    }

    /// Orientation whose local Z is the tangent and local Y the normal.
    #[must_use]
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        look_rotation(&self.tangent, &self.normal)
    }

    /// Component-wise linear interpolation.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self::weighted_sum([1.0 - t, t, 0.0], [self, other, other])
    }

    /// Component-wise weighted sum of three frames.
    #[must_use]
    pub fn weighted_sum(weights: [f64; 3], frames: [&Self; 3]) -> Self {
        let [w1, w2, w3] = weights;
        let [a, b, c] = frames;
        Self {
            position: Point3::from(a.position.coords * w1 + b.position.coords * w2 + c.position.coords * w3),
            tangent: a.tangent * w1 + b.tangent * w2 + c.tangent * w3,
            normal: a.normal * w1 + b.normal * w2 + c.normal * w3,
            binormal: a.binormal * w1 + b.binormal * w2 + c.binormal * w3,
            color: a.color * w1 + b.color * w2 + c.color * w3,
            thickness: a.thickness * w1 + b.thickness * w2 + c.thickness * w3,
        }
    }
}

/// Signed angle from `from` to `to` around `axis`.
fn signed_angle(from: &Vector3<f64>, to: &Vector3<f64>, axis: &Vector3<f64>) -> f64 {
    from.cross(to).dot(axis).atan2(from.dot(to))
}

/// Frames for a rope: tangents from neighboring positions, normals by
/// parallel transport starting from the canonical frame.
///
/// `closed` curves list their first point again at the end; the mismatch
/// between the transported and the initial normal is spread evenly over
/// the loop, so the last frame matches the first.
#[must_use]
pub fn transport_frames(
    positions: &[Point3<f64>],
    radii: &[f64],
    colors: &[Color],
    closed: bool,
    twist: f64,
) -> Vec<PathFrame> {
    let n = positions.len();
    if n == 0 {
        return Vec::new();
    }
    let unique = if closed && n > 1 { n - 1 } else { n };

    let tangent_at = |i: usize| -> Vector3<f64> {
        let i = if closed { i % unique } else { i };
        let prev = if i > 0 {
            Some(i - 1)
        } else if closed && unique > 1 {
            Some(unique - 1)
        } else {
            None
        };
        let next = if i + 1 < unique {
            Some(i + 1)
        } else if closed && unique > 1 {
            Some(0)
        } else {
            None
        };
        let backward = prev.map_or_else(Vector3::zeros, |p| positions[i] - positions[p]);
        let forward = next.map_or_else(Vector3::zeros, |q| positions[q] - positions[i]);
        safe_normalize(&(backward + forward))
    };

    let mut frames = Vec::with_capacity(n);
    let mut frame = PathFrame::default();
    for i in 0..n {
        let tangent = tangent_at(i);
        if tangent != Vector3::zeros() {
            frame.transport(positions[i], tangent, if i > 0 { twist } else { 0.0 });
        } else {
            frame.position = positions[i];
        }
        frame.thickness = radii.get(i).copied().unwrap_or(0.0);
        frame.color = colors.get(i).copied().unwrap_or(frame.color);
        frames.push(frame);
    }

    if closed && n > 2 {
        let first = frames[0];
        let last = frames[n - 1];
        let mismatch = signed_angle(&last.normal, &first.normal, &first.tangent);
        let steps = (n - 1) as f64;
        for (i, frame) in frames.iter_mut().enumerate() {
            frame.twist(mismatch * i as f64 / steps);
        }
    }
    frames
}

/// Frames for a rod: each frame is the halfway rotation between the
/// orientation of its particle and the previous one.
#[must_use]
pub fn oriented_frames(
    positions: &[Point3<f64>],
    orientations: &[UnitQuaternion<f64>],
    radii: &[f64],
    colors: &[Color],
) -> Vec<PathFrame> {
    let mut previous: Option<UnitQuaternion<f64>> = None;
    positions
        .iter()
        .zip(orientations)
        .enumerate()
        .map(|(i, (position, q))| {
            let smoothed = previous.map_or(*q, |p| q.slerp(&p, 0.5));
            previous = Some(*q);
            let mut frame = PathFrame::from_orientation(*position, &smoothed);
            frame.thickness = radii.get(i).copied().unwrap_or(0.0);
            frame.color = colors.get(i).copied().unwrap_or(frame.color);
            frame
        })
        .collect()
}
