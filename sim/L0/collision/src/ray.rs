//! Ray queries against particles.
//!
//! Particles are ellipsoids. A ray is tested against the unit sphere in the
//! particle's scaled local frame; on a miss the query still reports the gap
//! between the ray segment and the ellipsoid, so callers can pick particles
//! within a tolerance.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use strand_types::math::{ellipsoid_radius, project_point_line, safe_normalize};

/// A ray with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin.
    pub origin: Point3<f64>,
    /// Unit direction.
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Create a ray; the direction is normalized.
    #[must_use]
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction: safe_normalize(&direction),
        }
    }

    /// Point at distance `t` along the ray.
    #[must_use]
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }
}

/// Result of a ray-particle query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Particle index.
    pub particle: usize,
    /// Whether the ray enters the ellipsoid within range.
    pub hit: bool,
    /// Distance along the ray to the reported point.
    pub ray_distance: f64,
    /// Hit point on the ellipsoid, or closest ellipsoid point on a miss.
    pub point: Point3<f64>,
    /// Outward surface normal at `point`.
    pub normal: Vector3<f64>,
    /// Gap between the ray segment and the ellipsoid, zero on a hit.
    pub gap: f64,
}

/// Query one ellipsoidal particle with a ray of length `max_distance`.
#[must_use]
pub fn query_particle(
    ray: &Ray,
    max_distance: f64,
    particle: usize,
    center: &Point3<f64>,
    orientation: &UnitQuaternion<f64>,
    radii: &Vector3<f64>,
) -> RayHit {
    let safe_radii = radii.map(|r| r.max(f64::EPSILON));

    // Ray in the particle's unit-sphere frame. The map is affine, so ray
    // parameters are preserved.
    let origin = orientation
        .inverse_transform_vector(&(ray.origin - center))
        .component_div(&safe_radii);
    let direction = orientation
        .inverse_transform_vector(&ray.direction)
        .component_div(&safe_radii);

    let a = direction.norm_squared();
    let b = origin.dot(&direction);
    let c = origin.norm_squared() - 1.0;
    let discriminant = b * b - a * c;

    if a > 0.0 && discriminant >= 0.0 {
        let sqrt_d = discriminant.sqrt();
        let t_enter = (-b - sqrt_d) / a;
        let t_exit = (-b + sqrt_d) / a;
        let t = if c <= 0.0 { 0.0 } else { t_enter };
        if t_exit >= 0.0 && t <= max_distance {
            let local = origin + direction * t;
            let normal = safe_normalize(&(orientation * local.component_div(&safe_radii)));
            return RayHit {
                particle,
                hit: true,
                ray_distance: t,
                point: ray.at(t),
                normal,
                gap: 0.0,
            };
        }
    }

    let end = ray.at(max_distance.max(0.0));
    let (on_ray, mu) = project_point_line(center, &ray.origin, &end);
    let offset = on_ray - center;
    let normal = safe_normalize(&offset);
    let radius = ellipsoid_radius(&normal, orientation, radii);
    RayHit {
        particle,
        hit: false,
        ray_distance: mu * max_distance.max(0.0),
        point: center + normal * radius,
        normal,
        gap: (offset.norm() - radius).max(0.0),
    }
}
