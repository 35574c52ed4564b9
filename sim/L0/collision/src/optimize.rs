//! Local optimization of a simplex against a distance function.
//!
//! A simplex is the convex hull of up to four particles, each inflated by its
//! radius. The closest point to a collider is the convex combination
//! minimizing
//!
//! ```text
//! f(b) = (x(b) - s(x(b))) · n(x(b)) - r(b)
//! ```
//!
//! where `x(b) = Σ bᵢ xᵢ`, `r(b) = Σ bᵢ rᵢ` and `s`, `n` come from the shape.
//!
//! - One particle: evaluated once.
//! - Two particles: golden-section search over the edge parameter, with both
//!   endpoints considered as well.
//! - Three or four particles: Frank-Wolfe over the barycentric coordinates.

use nalgebra::{Point3, Vector3};
use strand_types::SolverConfig;

use crate::distance::{DistanceFunction, SurfacePoint};

/// Iteration limits for [`optimize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationParams {
    /// Maximum iterations.
    pub iterations: u32,
    /// Convergence tolerance (edge parameter width or duality gap).
    pub tolerance: f64,
}

impl Default for OptimizationParams {
    fn default() -> Self {
        Self {
            iterations: 8,
            tolerance: 0.005,
        }
    }
}

impl From<&SolverConfig> for OptimizationParams {
    fn from(config: &SolverConfig) -> Self {
        Self {
            iterations: config.surface_collision_iterations,
            tolerance: config.surface_collision_tolerance,
        }
    }
}

/// The closest convex point of a simplex and its surface projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexPoint {
    /// Barycentric coordinates over the simplex particles (unused entries are 0).
    pub bary: [f64; 4],
    /// Convex point.
    pub position: Point3<f64>,
    /// Interpolated radius.
    pub radius: f64,
    /// Projection of `position` onto the shape.
    pub surface: SurfacePoint,
}

impl SimplexPoint {
    /// Signed distance between the inflated simplex and the surface.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.surface.signed_distance(&self.position) - self.radius
    }
}

fn evaluate<F: DistanceFunction + ?Sized>(
    shape: &F,
    positions: &[Point3<f64>],
    radii: &[f64],
    bary: [f64; 4],
) -> SimplexPoint {
    let mut position = Vector3::zeros();
    let mut radius = 0.0;
    for (i, (p, r)) in positions.iter().zip(radii).enumerate() {
        position += p.coords * bary[i];
        radius += r * bary[i];
    }
    let position = Point3::from(position);
    SimplexPoint {
        bary,
        position,
        radius,
        surface: shape.project(&position),
    }
}

fn closer(a: SimplexPoint, b: SimplexPoint) -> SimplexPoint {
    if b.distance() < a.distance() { b } else { a }
}

/// Find the point of a simplex closest to a shape.
///
/// `positions` and `radii` must have the same length, between one and four.
/// Extra entries beyond four are ignored.
pub fn optimize<F: DistanceFunction + ?Sized>(
    shape: &F,
    positions: &[Point3<f64>],
    radii: &[f64],
    params: &OptimizationParams,
) -> SimplexPoint {
    let n = positions.len().min(radii.len()).min(4);
    let positions = &positions[..n];
    let radii = &radii[..n];

    match n {
        0 => SimplexPoint {
            bary: [0.0; 4],
            position: Point3::origin(),
            radius: 0.0,
            surface: shape.project(&Point3::origin()),
        },
        1 => evaluate(shape, positions, radii, [1.0, 0.0, 0.0, 0.0]),
        2 => golden_section(shape, positions, radii, params),
        _ => frank_wolfe(shape, positions, radii, params),
    }
}

fn golden_section<F: DistanceFunction + ?Sized>(
    shape: &F,
    positions: &[Point3<f64>],
    radii: &[f64],
    params: &OptimizationParams,
) -> SimplexPoint {
    let ratio = (5.0_f64.sqrt() - 1.0) * 0.5;
    let at = |t: f64| evaluate(shape, positions, radii, [1.0 - t, t, 0.0, 0.0]);

    let (mut a, mut b) = (0.0, 1.0);
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    let mut fc = at(c).distance();
    let mut fd = at(d).distance();

    for _ in 0..params.iterations.max(1) * 4 {
        if b - a < params.tolerance {
            break;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - ratio * (b - a);
            fc = at(c).distance();
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + ratio * (b - a);
            fd = at(d).distance();
        }
    }

    let interior = at((a + b) * 0.5);
    closer(closer(interior, at(0.0)), at(1.0))
}

fn frank_wolfe<F: DistanceFunction + ?Sized>(
    shape: &F,
    positions: &[Point3<f64>],
    radii: &[f64],
    params: &OptimizationParams,
) -> SimplexPoint {
    let n = positions.len();
    let mut bary = [0.0; 4];
    for b in bary.iter_mut().take(n) {
        *b = 1.0 / n as f64;
    }

    let mut current = evaluate(shape, positions, radii, bary);
    for i in 0..params.iterations {
        let normal = current.surface.normal;

        // Vertex with the steepest descent along -normal.
        let mut best = 0;
        let mut best_gap = f64::MIN;
        for (j, (p, r)) in positions.iter().zip(radii).enumerate() {
            let candidate = (p - current.position) - normal * (r - current.radius);
            let gap = (-normal).dot(&candidate);
            if gap > best_gap {
                best_gap = gap;
                best = j;
            }
        }
        if best_gap < params.tolerance {
            break;
        }

        let step = 0.3 * (2.0 / (f64::from(i) + 2.0));
        for (j, b) in bary.iter_mut().take(n).enumerate() {
            *b *= 1.0 - step;
            if j == best {
                *b += step;
            }
        }
        current = evaluate(shape, positions, radii, bary);
    }
    current
}
