//! Numerical helpers shared by constraints, colliders and blueprints.
//!
//! Every helper here is total: degenerate input (zero-length vectors,
//! parallel axes, zero masses) yields a well-defined value instead of NaN.

use nalgebra::{Point3, Quaternion, Unit, UnitQuaternion, Vector3};

/// Small value used to guard divisions throughout the solver.
pub const EPSILON: f64 = 1e-7;

/// Smallest mass accepted by [`mass_to_inv_mass`].
pub const MIN_MASS: f64 = 1e-5;

/// Normalize a vector, returning the zero vector when its length is too small.
#[must_use]
pub fn safe_normalize(v: &Vector3<f64>) -> Vector3<f64> {
    let norm = v.norm();
    if norm > EPSILON { v / norm } else { Vector3::zeros() }
}

/// Sign function that maps zero to `+1`.
#[must_use]
pub fn pure_sign(value: f64) -> f64 {
    if value >= 0.0 { 1.0 } else { -1.0 }
}

/// Convert a mass to an inverse mass, clamping tiny masses.
#[must_use]
pub fn mass_to_inv_mass(mass: f64) -> f64 {
    1.0 / mass.max(MIN_MASS)
}

/// Convert an inverse mass back to a mass. Zero inverse mass maps to infinity.
#[must_use]
pub fn inv_mass_to_mass(inv_mass: f64) -> f64 {
    if inv_mass > 0.0 { 1.0 / inv_mass } else { f64::INFINITY }
}

/// Build a pure (zero scalar part) quaternion from a vector.
#[must_use]
pub fn pure_quaternion(v: &Vector3<f64>) -> Quaternion<f64> {
    Quaternion::from_parts(0.0, *v)
}

/// Rest Darboux quaternion between two consecutive orientations.
///
/// Returns `conj(q1) * q2`, negated when that lies in the opposite
/// hemisphere from the identity, so that rest and current values are always
/// compared along the shortest arc.
#[must_use]
pub fn rest_darboux(q1: &UnitQuaternion<f64>, q2: &UnitQuaternion<f64>) -> Quaternion<f64> {
    let darboux = q1.conjugate().into_inner() * q2.into_inner();
    let identity = Quaternion::identity();
    let omega_plus = darboux + identity;
    let omega_minus = darboux - identity;
    if omega_minus.norm_squared() > omega_plus.norm_squared() {
        -darboux
    } else {
        darboux
    }
}

/// Rotation mapping local +Z onto `forward` and local +Y as close as possible to `up`.
///
/// Falls back to an arbitrary up vector when `forward` and `up` are parallel,
/// and to the identity when `forward` has zero length.
#[must_use]
pub fn look_rotation(forward: &Vector3<f64>, up: &Vector3<f64>) -> UnitQuaternion<f64> {
    let dir = safe_normalize(forward);
    if dir == Vector3::zeros() {
        return UnitQuaternion::identity();
    }
    let mut up = safe_normalize(up);
    if up.cross(&dir).norm_squared() < EPSILON {
        up = if dir.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
    }
    UnitQuaternion::face_towards(&dir, &up)
}

/// Shortest rotation taking direction `from` onto direction `to`.
#[must_use]
pub fn from_to_rotation(from: &Vector3<f64>, to: &Vector3<f64>) -> UnitQuaternion<f64> {
    let a = safe_normalize(from);
    let b = safe_normalize(to);
    if a == Vector3::zeros() || b == Vector3::zeros() {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::rotation_between(&a, &b).unwrap_or_else(|| {
        // Antiparallel: half turn about any axis perpendicular to `a`.
        let helper = if a.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let axis = Unit::new_normalize(a.cross(&helper));
        UnitQuaternion::from_axis_angle(&axis, std::f64::consts::PI)
    })
}

/// Project a point onto segment `ab`.
///
/// Returns the projected point and its normalized parameter `mu` in `[0, 1]`.
#[must_use]
pub fn project_point_line(
    point: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
) -> (Point3<f64>, f64) {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < EPSILON * EPSILON {
        return (*a, 0.0);
    }
    let mu = ((point - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * mu, mu)
}

/// Closest point on triangle `abc` to `p`, with its barycentric coordinates.
#[must_use]
pub fn nearest_point_on_triangle(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    p: &Point3<f64>,
) -> (Point3<f64>, Vector3<f64>) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, Vector3::new(1.0, 0.0, 0.0));
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, Vector3::new(0.0, 1.0, 0.0));
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, Vector3::new(1.0 - v, v, 0.0));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, Vector3::new(0.0, 0.0, 1.0));
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, Vector3::new(1.0 - w, 0.0, w));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, Vector3::new(0.0, 1.0 - w, w));
    }

    let denom = va + vb + vc;
    if denom.abs() < f64::MIN_POSITIVE {
        // Zero-area triangle: every vertex is equally valid.
        return (*a, Vector3::new(1.0, 0.0, 0.0));
    }
    let v = vb / denom;
    let w = vc / denom;
    (a + ab * v + ac * w, Vector3::new(1.0 - v - w, v, w))
}

/// Radius of an ellipsoid with semi-axes `radii` along a solver-space direction.
#[must_use]
pub fn ellipsoid_radius(
    direction: &Vector3<f64>,
    orientation: &UnitQuaternion<f64>,
    radii: &Vector3<f64>,
) -> f64 {
    let local = orientation.inverse_transform_vector(direction);
    if radii.x <= 0.0 || radii.y <= 0.0 || radii.z <= 0.0 {
        return radii.x.max(0.0);
    }
    let scaled = local.component_div(radii);
    let sqr = scaled.norm_squared();
    if sqr > EPSILON { (1.0 / sqr).sqrt() } else { radii.x }
}

/// Scale factor that turns a barycentric-weighted correction into a full one.
#[must_use]
pub fn bary_scale(bary: &[f64]) -> f64 {
    let sqr: f64 = bary.iter().map(|b| b * b).sum();
    if sqr > EPSILON { 1.0 / sqr } else { 0.0 }
}
