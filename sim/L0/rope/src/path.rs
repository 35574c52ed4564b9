//! Control-point paths.
//!
//! A [`Path`] is a chain of cubic Bézier spans between [`ControlPoint`]s.
//! Besides positions, every control point carries per-particle data (mass,
//! thickness, color, filter, normal) that blueprints sample along the
//! curve.
//!
//! # Parameterization
//!
//! `mu` runs from 0 to 1 over the whole path, each span covering an equal
//! share. Arc length is tabulated with [`ARC_LENGTH_SAMPLES`] samples per
//! span, integrated with adaptive Gauss–Lobatto quadrature, so
//! [`Path::mu_at_length`] can place particles at even distances.
//!
//! ```text
//!  cp0 ──out──▶      ◀──in── cp1 ──out──▶      ◀──in── cp2
//!   ●───────────span 0──────────●───────────span 1──────────●
//!  mu=0                       mu=0.5                       mu=1
//! ```

use nalgebra::{Point3, Vector3};
use strand_types::math::safe_normalize;
use strand_types::{Color, CollisionFilter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Arc-length samples per span.
pub const ARC_LENGTH_SAMPLES: usize = 20;

/// Accuracy target of the arc-length quadrature.
const LENGTH_ACCURACY: f64 = 1e-5;

/// Subdivision depth limit of the arc-length quadrature.
const LENGTH_MAX_DEPTH: u32 = 3;

/// Default control point mass.
pub const DEFAULT_MASS: f64 = 0.1;

/// Default control point rotational mass.
pub const DEFAULT_ROTATIONAL_MASS: f64 = 0.01;

/// A path control point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControlPoint {
    /// Position.
    pub position: Point3<f64>,
    /// Incoming tangent handle, relative to `position`.
    pub in_tangent: Vector3<f64>,
    /// Outgoing tangent handle, relative to `position`.
    pub out_tangent: Vector3<f64>,
    /// Normal, used to orient rod particles.
    pub normal: Vector3<f64>,
    /// Mass of particles generated here.
    pub mass: f64,
    /// Rotational mass of particles generated here.
    pub rotational_mass: f64,
    /// Thickness multiplier.
    pub thickness: f64,
    /// Color.
    pub color: Color,
    /// Collision filter.
    pub filter: CollisionFilter,
}

impl ControlPoint {
    /// A control point with flat tangents and default particle data.
    #[must_use]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            in_tangent: Vector3::zeros(),
            out_tangent: Vector3::zeros(),
            normal: Vector3::y(),
            mass: DEFAULT_MASS,
            rotational_mass: DEFAULT_ROTATIONAL_MASS,
            thickness: 1.0,
            color: Color::new(1.0, 1.0, 1.0, 1.0),
            filter: CollisionFilter::new(CollisionFilter::COLLIDE_WITH_EVERYTHING, 1),
        }
    }

    /// Set the tangent handles.
    #[must_use]
    pub const fn with_tangents(mut self, in_tangent: Vector3<f64>, out_tangent: Vector3<f64>) -> Self {
        self.in_tangent = in_tangent;
        self.out_tangent = out_tangent;
        self
    }

    /// Set the normal.
    #[must_use]
    pub const fn with_normal(mut self, normal: Vector3<f64>) -> Self {
        self.normal = normal;
        self
    }

    /// Set the mass. Zero pins particles generated at this point.
    #[must_use]
    pub const fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Set the rotational mass.
    #[must_use]
    pub const fn with_rotational_mass(mut self, rotational_mass: f64) -> Self {
        self.rotational_mass = rotational_mass;
        self
    }

    /// Set the thickness multiplier.
    #[must_use]
    pub const fn with_thickness(mut self, thickness: f64) -> Self {
        self.thickness = thickness;
        self
    }

    /// Set the color.
    #[must_use]
    pub const fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Set the collision filter.
    #[must_use]
    pub const fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    fn out_handle(&self) -> Point3<f64> {
        self.position + self.out_tangent
    }

    fn in_handle(&self) -> Point3<f64> {
        self.position + self.in_tangent
    }
}

/// Cubic Bézier point.
fn bezier(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>, t: f64) -> Point3<f64> {
    let s = 1.0 - t;
    Point3::from(
        p0.coords * (s * s * s) + p1.coords * (3.0 * s * s * t) + p2.coords * (3.0 * s * t * t) + p3.coords * (t * t * t),
    )
}

/// Cubic Bézier first derivative.
fn bezier_derivative(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
    t: f64,
) -> Vector3<f64> {
    let s = 1.0 - t;
    (p1 - p0) * (3.0 * s * s) + (p2 - p1) * (6.0 * s * t) + (p3 - p2) * (3.0 * t * t)
}

/// Blend weights of a cubic with control values `(a, a, b, b)`.
fn ease(t: f64) -> (f64, f64) {
    let s = 1.0 - t;
    let wa = s * s * s + 3.0 * s * s * t;
    (wa, 1.0 - wa)
}

/// One adaptive Gauss–Lobatto step over `[a, b]` for `f = |B'(t)|`.
fn gauss_lobatto(f: &impl Fn(f64) -> f64, a: f64, b: f64, fa: f64, fb: f64, depth: u32) -> f64 {
    let alpha = (2.0_f64 / 3.0).sqrt();
    let beta = 1.0 / 5.0_f64.sqrt();

    let h = (b - a) / 2.0;
    let m = (a + b) / 2.0;
    let mll = m - alpha * h;
    let ml = m - beta * h;
    let mr = m + beta * h;
    let mrr = m + alpha * h;

    let fmll = f(mll);
    let fml = f(ml);
    let fm = f(m);
    let fmr = f(mr);
    let fmrr = f(mrr);

    let integral4 = (h / 6.0) * (fa + fb + 5.0 * (fml + fmr));
    let integral7 = (h / 1470.0)
        * (77.0 * (fa + fb) + 432.0 * (fmll + fmrr) + 625.0 * (fml + fmr) + 672.0 * fm);

    if (integral4 - integral7).abs() < LENGTH_ACCURACY || depth == 0 || mll <= a || b <= mrr {
        return integral7;
    }
    let d = depth - 1;
    gauss_lobatto(f, a, mll, fa, fmll, d)
        + gauss_lobatto(f, mll, ml, fmll, fml, d)
        + gauss_lobatto(f, ml, m, fml, fm, d)
        + gauss_lobatto(f, m, mr, fm, fmr, d)
        + gauss_lobatto(f, mr, mrr, fmr, fmrr, d)
        + gauss_lobatto(f, mrr, b, fmrr, fb, d)
}

/// A sequence of control points joined by cubic Bézier spans.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Path {
    points: Vec<ControlPoint>,
    closed: bool,
    arc_lengths: Vec<f64>,
    length: f64,
}

impl Path {
    /// Create a path. Its arc-length table is computed immediately.
    #[must_use]
    pub fn new(points: Vec<ControlPoint>, closed: bool) -> Self {
        let mut path = Self {
            points,
            closed,
            arc_lengths: Vec::new(),
            length: 0.0,
        };
        path.recalculate_length();
        path
    }

    /// An open path through `positions` with straight spans.
    #[must_use]
    pub fn polyline(positions: &[Point3<f64>]) -> Self {
        Self::new(positions.iter().copied().map(ControlPoint::new).collect(), false)
    }

    /// The path used when a blueprint is given fewer than two control
    /// points: a gently curved segment from `(-1, 0, 0)` to `(1, 0, 0)`.
    #[must_use]
    pub fn default_segment() -> Self {
        let handles = (Vector3::new(-0.25, 0.0, 0.0), Vector3::new(0.25, 0.0, 0.0));
        Self::new(
            vec![
                ControlPoint::new(Point3::new(-1.0, 0.0, 0.0)).with_tangents(handles.0, handles.1),
                ControlPoint::new(Point3::new(1.0, 0.0, 0.0)).with_tangents(handles.0, handles.1),
            ],
            false,
        )
    }

    /// Control points.
    #[must_use]
    pub fn control_points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Number of control points.
    #[must_use]
    pub fn control_point_count(&self) -> usize {
        self.points.len()
    }

    /// Whether the last control point connects back to the first.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Open or close the path.
    pub fn set_closed(&mut self, closed: bool) {
        if self.closed != closed {
            self.closed = closed;
            self.recalculate_length();
        }
    }

    /// Append a control point.
    pub fn add_control_point(&mut self, point: ControlPoint) {
        self.points.push(point);
        self.recalculate_length();
    }

    /// Insert a control point at `index` (clamped to the point count).
    pub fn insert_control_point(&mut self, index: usize, point: ControlPoint) {
        self.points.insert(index.min(self.points.len()), point);
        self.recalculate_length();
    }

    /// Split the span containing `mu` at that point without changing the
    /// curve shape. Returns the new control point index.
    pub fn insert_control_point_at_mu(&mut self, mu: f64) -> Option<usize> {
        if self.points.len() < 2 || !mu.is_finite() {
            return None;
        }
        let (i, t) = self.span_at_mu(mu);
        let next = (i + 1) % self.points.len();
        let (a, b) = (self.points[i], self.points[next]);

        // De Casteljau split of the span at t.
        let lerp = |p: &Point3<f64>, q: &Point3<f64>| p + (q - p) * t;
        let p01 = lerp(&a.position, &a.out_handle());
        let p12 = lerp(&a.out_handle(), &b.in_handle());
        let p23 = lerp(&b.in_handle(), &b.position);
        let p012 = lerp(&p01, &p12);
        let p123 = lerp(&p12, &p23);
        let split = lerp(&p012, &p123);

        self.points[i].out_tangent = p01 - a.position;
        self.points[next].in_tangent = p23 - b.position;

        let (wa, wb) = ease(t);
        let point = ControlPoint {
            position: split,
            in_tangent: p012 - split,
            out_tangent: p123 - split,
            normal: safe_normalize(&(a.normal * wa + b.normal * wb)),
            mass: a.mass * wa + b.mass * wb,
            rotational_mass: a.rotational_mass * wa + b.rotational_mass * wb,
            thickness: a.thickness * wa + b.thickness * wb,
            color: a.color * wa + b.color * wb,
            filter: if t > 0.5 { b.filter } else { a.filter },
        };
        self.points.insert(i + 1, point);
        self.recalculate_length();
        Some(i + 1)
    }

    /// Remove the control point at `index`.
    pub fn remove_control_point(&mut self, index: usize) -> Option<ControlPoint> {
        if index >= self.points.len() {
            return None;
        }
        let point = self.points.remove(index);
        self.recalculate_length();
        Some(point)
    }

    /// Number of Bézier spans.
    #[must_use]
    pub fn span_count(&self) -> usize {
        match self.points.len() {
            0 | 1 => 0,
            n if self.closed => n,
            n => n - 1,
        }
    }

    /// Total arc length.
    #[must_use]
    pub const fn length(&self) -> f64 {
        self.length
    }

    /// Cumulative arc length, `1 + spans · (ARC_LENGTH_SAMPLES + 1)` entries.
    #[must_use]
    pub fn arc_length_table(&self) -> &[f64] {
        &self.arc_lengths
    }

    /// Arc length from the start of the path to the start of `span`.
    #[must_use]
    pub fn span_start_length(&self, span: usize) -> f64 {
        self.arc_lengths
            .get(span * (ARC_LENGTH_SAMPLES + 1))
            .copied()
            .unwrap_or(self.length)
    }

    /// Arc length of `span`.
    #[must_use]
    pub fn span_length(&self, span: usize) -> f64 {
        self.span_start_length(span + 1) - self.span_start_length(span)
    }

    fn span_points(&self, span: usize) -> [Point3<f64>; 4] {
        let a = &self.points[span];
        let b = &self.points[(span + 1) % self.points.len()];
        [a.position, a.out_handle(), b.in_handle(), b.position]
    }

    fn recalculate_length(&mut self) {
        self.arc_lengths.clear();
        self.arc_lengths.push(0.0);
        self.length = 0.0;

        let step = 1.0 / (ARC_LENGTH_SAMPLES + 1) as f64;
        for span in 0..self.span_count() {
            let [p0, p1, p2, p3] = self.span_points(span);
            let speed = |t: f64| bezier_derivative(&p0, &p1, &p2, &p3, t).norm();
            for i in 0..=ARC_LENGTH_SAMPLES {
                let a = i as f64 * step;
                let b = (i + 1) as f64 * step;
                self.length += gauss_lobatto(&speed, a, b, speed(a), speed(b), LENGTH_MAX_DEPTH);
                self.arc_lengths.push(self.length);
            }
        }
    }

    /// Path parameter at arc length `length`, linearly interpolated from the
    /// arc-length table.
    #[must_use]
    pub fn mu_at_length(&self, length: f64) -> f64 {
        if length <= 0.0 {
            return 0.0;
        }
        if length >= self.length {
            return 1.0;
        }
        let table = &self.arc_lengths;
        let i = table
            .iter()
            .position(|&l| length < l)
            .unwrap_or(table.len() - 1)
            .max(1);
        let last = (table.len() - 1) as f64;
        let prev_mu = (i - 1) as f64 / last;
        let next_mu = i as f64 / last;
        let width = table[i] - table[i - 1];
        let s = if width > 0.0 { (length - table[i - 1]) / width } else { 0.0 };
        prev_mu + (next_mu - prev_mu) * s
    }

    /// Span index and local parameter for a path parameter.
    #[must_use]
    pub fn span_at_mu(&self, mu: f64) -> (usize, f64) {
        let spans = self.span_count();
        if spans == 0 {
            return (0, 0.0);
        }
        let scaled = mu.clamp(0.0, 1.0) * spans as f64;
        let span = (scaled.floor() as usize).min(spans - 1);
        (span, scaled - span as f64)
    }

    /// Position at path parameter `mu`.
    #[must_use]
    pub fn position_at_mu(&self, mu: f64) -> Point3<f64> {
        if self.span_count() == 0 {
            return self.points.first().map_or_else(Point3::origin, |p| p.position);
        }
        let (span, t) = self.span_at_mu(mu);
        let [p0, p1, p2, p3] = self.span_points(span);
        bezier(&p0, &p1, &p2, &p3, t)
    }

    /// Unit tangent at path parameter `mu`. Zero for degenerate spans.
    #[must_use]
    pub fn tangent_at_mu(&self, mu: f64) -> Vector3<f64> {
        if self.span_count() == 0 {
            return Vector3::zeros();
        }
        let (span, t) = self.span_at_mu(mu);
        let [p0, p1, p2, p3] = self.span_points(span);
        let d = bezier_derivative(&p0, &p1, &p2, &p3, t);
        if d.norm_squared() > 0.0 {
            safe_normalize(&d)
        } else {
            safe_normalize(&(p3 - p0))
        }
    }

    fn blend<T>(&self, mu: f64, value: impl Fn(&ControlPoint) -> T, mix: impl Fn(T, T, f64, f64) -> T) -> Option<T> {
        let first = self.points.first()?;
        if self.span_count() == 0 {
            return Some(value(first));
        }
        let (span, t) = self.span_at_mu(mu);
        let a = &self.points[span];
        let b = &self.points[(span + 1) % self.points.len()];
        let (wa, wb) = ease(t);
        Some(mix(value(a), value(b), wa, wb))
    }

    fn scalar_at_mu(&self, mu: f64, value: impl Fn(&ControlPoint) -> f64) -> f64 {
        self.blend(mu, value, |a, b, wa, wb| a * wa + b * wb).unwrap_or(0.0)
    }

    /// Normal at path parameter `mu`.
    #[must_use]
    pub fn normal_at_mu(&self, mu: f64) -> Vector3<f64> {
        self.blend(mu, |p| p.normal, |a, b, wa, wb| safe_normalize(&(a * wa + b * wb)))
            .unwrap_or_else(Vector3::y)
    }

    /// Mass at path parameter `mu`.
    #[must_use]
    pub fn mass_at_mu(&self, mu: f64) -> f64 {
        self.scalar_at_mu(mu, |p| p.mass)
    }

    /// Rotational mass at path parameter `mu`.
    #[must_use]
    pub fn rotational_mass_at_mu(&self, mu: f64) -> f64 {
        self.scalar_at_mu(mu, |p| p.rotational_mass)
    }

    /// Thickness multiplier at path parameter `mu`.
    #[must_use]
    pub fn thickness_at_mu(&self, mu: f64) -> f64 {
        self.scalar_at_mu(mu, |p| p.thickness)
    }

    /// Color at path parameter `mu`.
    #[must_use]
    pub fn color_at_mu(&self, mu: f64) -> Color {
        self.blend(mu, |p| p.color, |a, b, wa, wb| a * wa + b * wb)
            .unwrap_or_else(|| Color::new(1.0, 1.0, 1.0, 1.0))
    }

    /// Filter of the control point nearest to `mu`.
    #[must_use]
    pub fn filter_at_mu(&self, mu: f64) -> CollisionFilter {
        self.blend(mu, |p| p.filter, |a, b, _, wb| if wb > 0.5 { b } else { a })
            .unwrap_or(CollisionFilter::EVERYTHING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_straight_path_length() {
        let path = Path::polyline(&[Point3::origin(), Point3::new(3.0, 4.0, 0.0)]);
        assert_eq!(path.span_count(), 1);
        assert_relative_eq!(path.length(), 5.0, epsilon = 1e-9);
        assert_eq!(path.arc_length_table().len(), 1 + ARC_LENGTH_SAMPLES + 1);
        assert_relative_eq!(path.position_at_mu(0.5), Point3::new(1.5, 2.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(path.tangent_at_mu(0.2), Vector3::new(0.6, 0.8, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_mu_at_length_is_monotonic() {
        let path = Path::default_segment();
        let mut last = -1.0;
        for i in 0..=50 {
            let mu = path.mu_at_length(path.length() * f64::from(i) / 50.0);
            assert!(mu >= last);
            last = mu;
        }
        assert_relative_eq!(path.mu_at_length(path.length()), 1.0);
        assert_relative_eq!(path.mu_at_length(-1.0), 0.0);
    }

    #[test]
    fn test_curved_span_length() {
        // Quarter circle approximation of radius 1 (handle length 0.5523).
        let k = 0.552_284_749_8;
        let path = Path::new(
            vec![
                ControlPoint::new(Point3::new(1.0, 0.0, 0.0)).with_tangents(Vector3::zeros(), Vector3::new(0.0, k, 0.0)),
                ControlPoint::new(Point3::new(0.0, 1.0, 0.0)).with_tangents(Vector3::new(k, 0.0, 0.0), Vector3::zeros()),
            ],
            false,
        );
        assert_relative_eq!(path.length(), std::f64::consts::FRAC_PI_2, epsilon = 1e-3);
    }

    #[test]
    fn test_closed_path_spans() {
        let mut path = Path::polyline(&[
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        assert_eq!(path.span_count(), 2);
        path.set_closed(true);
        assert_eq!(path.span_count(), 3);
        assert_relative_eq!(path.length(), 2.0 + 2.0_f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(path.position_at_mu(1.0), Point3::origin(), epsilon = 1e-12);
    }

    #[test]
    fn test_channels_interpolate() {
        let path = Path::new(
            vec![
                ControlPoint::new(Point3::origin()).with_mass(1.0).with_thickness(2.0),
                ControlPoint::new(Point3::new(1.0, 0.0, 0.0)).with_mass(3.0).with_thickness(4.0),
            ],
            false,
        );
        assert_relative_eq!(path.mass_at_mu(0.0), 1.0);
        assert_relative_eq!(path.mass_at_mu(0.5), 2.0, epsilon = 1e-12);
        assert_relative_eq!(path.thickness_at_mu(1.0), 4.0);
    }

    #[test]
    fn test_insert_at_mu_keeps_shape() {
        let mut path = Path::default_segment();
        let before: Vec<_> = (0..=10).map(|i| path.position_at_mu(f64::from(i) / 10.0)).collect();
        let length = path.length();
        assert_eq!(path.insert_control_point_at_mu(0.3), Some(1));
        assert_eq!(path.control_point_count(), 3);
        assert_relative_eq!(path.length(), length, epsilon = 1e-6);
        assert_relative_eq!(path.control_points()[1].position, before[3], epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_paths() {
        let empty = Path::default();
        assert_eq!(empty.span_count(), 0);
        assert_eq!(empty.length(), 0.0);
        assert_eq!(empty.position_at_mu(0.5), Point3::origin());

        let single = Path::polyline(&[Point3::new(1.0, 2.0, 3.0)]);
        assert_eq!(single.span_count(), 0);
        assert_eq!(single.position_at_mu(0.7), Point3::new(1.0, 2.0, 3.0));
        assert_eq!(single.tangent_at_mu(0.7), Vector3::zeros());
    }

    #[test]
    fn test_edit_control_points() {
        let mut path = Path::polyline(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        path.add_control_point(ControlPoint::new(Point3::new(1.0, 1.0, 0.0)).with_normal(Vector3::x()));
        assert_relative_eq!(path.length(), 2.0, epsilon = 1e-6);

        path.insert_control_point(99, ControlPoint::new(Point3::new(1.0, 2.0, 0.0)).with_rotational_mass(0.5));
        assert_eq!(path.control_point_count(), 4);
        assert_relative_eq!(path.length(), 3.0, epsilon = 1e-6);
        assert_relative_eq!(path.rotational_mass_at_mu(1.0), 0.5);

        assert!(path.remove_control_point(4).is_none());
        let removed = path.remove_control_point(0).unwrap();
        assert_eq!(removed.position, Point3::origin());
        assert_relative_eq!(path.length(), 2.0, epsilon = 1e-6);
        assert_relative_eq!(path.normal_at_mu(0.5), Vector3::x(), epsilon = 1e-9);
    }
}
