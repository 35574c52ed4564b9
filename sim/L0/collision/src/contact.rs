//! Particle-collider contacts and their projection.
//!
//! A contact links a simplex to a collider. It stores the barycentric point
//! on the simplex, the surface point (already pushed out by the collider's
//! contact offset) and an orthonormal basis. Lambdas accumulate over the
//! iterations of a substep and are reset by [`Contact::prepare`].

use nalgebra::{Point3, Vector2, Vector3};
use smallvec::SmallVec;
use strand_types::ParticleArrays;
use strand_types::math::{bary_scale, ellipsoid_radius, safe_normalize};

use crate::shape::ColliderMaterial;
use crate::world::ColliderHandle;

/// A contact between a simplex and a collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Simplex index.
    pub simplex: usize,
    /// Collider handle.
    pub collider: ColliderHandle,
    /// Barycentric coordinates of the contact point on the simplex.
    pub bary: [f64; 4],
    /// Surface point, offset along the normal by the contact offset.
    pub point: Point3<f64>,
    /// Unit contact normal, pointing away from the collider.
    pub normal: Vector3<f64>,
    /// Friction direction aligned with the relative tangential velocity.
    pub tangent: Vector3<f64>,
    /// `normal × tangent`.
    pub bitangent: Vector3<f64>,
    /// Signed gap at generation time.
    pub distance: f64,
    /// Accumulated normal lambda (non-negative).
    pub normal_lambda: f64,
    /// Accumulated tangent lambda.
    pub tangent_lambda: f64,
    /// Accumulated bitangent lambda.
    pub bitangent_lambda: f64,
    /// Accumulated adhesion lambda (non-positive).
    pub stick_lambda: f64,
    /// Effective inverse mass along the normal.
    pub normal_inv_mass: f64,
    /// Effective inverse mass along the tangent.
    pub tangent_inv_mass: f64,
    /// Effective inverse mass along the bitangent.
    pub bitangent_inv_mass: f64,
}

/// Interpolated state of the contact point on its simplex.
struct SimplexState {
    position: Point3<f64>,
    prev_position: Point3<f64>,
    radius: f64,
}

impl Contact {
    /// Create a contact with zero lambdas.
    #[must_use]
    pub fn new(
        simplex: usize,
        collider: ColliderHandle,
        bary: [f64; 4],
        point: Point3<f64>,
        normal: Vector3<f64>,
        distance: f64,
    ) -> Self {
        Self {
            simplex,
            collider,
            bary,
            point,
            normal,
            tangent: Vector3::zeros(),
            bitangent: Vector3::zeros(),
            distance,
            normal_lambda: 0.0,
            tangent_lambda: 0.0,
            bitangent_lambda: 0.0,
            stick_lambda: 0.0,
            normal_inv_mass: 0.0,
            tangent_inv_mass: 0.0,
            bitangent_inv_mass: 0.0,
        }
    }

    fn state(&self, particles: &ParticleArrays, simplex: &[usize]) -> SimplexState {
        let mut position = Vector3::zeros();
        let mut prev_position = Vector3::zeros();
        let mut radius = 0.0;
        for (&p, &b) in simplex.iter().zip(&self.bary) {
            position += particles.positions[p].coords * b;
            prev_position += particles.prev_positions[p].coords * b;
            radius += b * ellipsoid_radius(
                &self.normal,
                &particles.orientations[p],
                &particles.principal_radii[p],
            );
        }
        SimplexState {
            position: Point3::from(position),
            prev_position: Point3::from(prev_position),
            radius,
        }
    }

    /// Reset lambdas, compute effective masses and the friction basis.
    ///
    /// Called at the start of every substep, after prediction.
    pub fn prepare(&mut self, particles: &ParticleArrays, simplex: &[usize], dt: f64) {
        self.normal_lambda = 0.0;
        self.tangent_lambda = 0.0;
        self.bitangent_lambda = 0.0;
        self.stick_lambda = 0.0;

        let inv_mass: f64 = simplex
            .iter()
            .zip(&self.bary)
            .map(|(&p, &b)| particles.inv_masses[p] * b)
            .sum();
        self.normal_inv_mass = inv_mass;
        self.tangent_inv_mass = inv_mass;
        self.bitangent_inv_mass = inv_mass;

        let state = self.state(particles, simplex);
        let velocity = if dt > 0.0 {
            (state.position - state.prev_position) / dt
        } else {
            Vector3::zeros()
        };
        self.calculate_basis(&velocity);
    }

    /// Build the tangent frame from a relative velocity.
    pub fn calculate_basis(&mut self, relative_velocity: &Vector3<f64>) {
        self.tangent = safe_normalize(
            &(relative_velocity - self.normal * relative_velocity.dot(&self.normal)),
        );
        self.bitangent = safe_normalize(&self.normal.cross(&self.tangent));
    }

    /// Current gap between the inflated simplex and the surface point.
    #[must_use]
    pub fn current_distance(&self, particles: &ParticleArrays, simplex: &[usize]) -> f64 {
        let state = self.state(particles, simplex);
        let on_simplex = state.position - self.normal * state.radius;
        (on_simplex - self.point).dot(&self.normal)
    }

    /// Non-penetration. Returns the change of the normal lambda.
    ///
    /// Penetration deeper than `max_depenetration · dt` is resolved over
    /// several steps.
    pub fn solve_penetration(
        &mut self,
        particles: &ParticleArrays,
        simplex: &[usize],
        max_depenetration: f64,
        dt: f64,
    ) -> f64 {
        if self.normal_inv_mass <= 0.0 {
            return 0.0;
        }
        let dist = self.current_distance(particles, simplex);
        self.distance = dist;

        let max_projection = (-dist - max_depenetration * dt).max(0.0);
        let dlambda = -(dist + max_projection) / self.normal_inv_mass;
        let new_lambda = (self.normal_lambda + dlambda).max(0.0);
        let change = new_lambda - self.normal_lambda;
        self.normal_lambda = new_lambda;
        change
    }

    /// Adhesion within the material's stick distance. Returns the change of
    /// the stick lambda.
    pub fn solve_adhesion(
        &mut self,
        particles: &ParticleArrays,
        simplex: &[usize],
        material: &ColliderMaterial,
        dt: f64,
    ) -> f64 {
        if self.normal_inv_mass <= 0.0
            || material.stick_distance <= 0.0
            || material.stickiness <= 0.0
            || dt <= 0.0
        {
            return 0.0;
        }
        let dist = self.current_distance(particles, simplex);
        let constraint =
            material.stickiness * (1.0 - (dist / material.stick_distance).max(0.0)) * dt;
        let dlambda = -constraint / self.normal_inv_mass;
        let new_lambda = (self.stick_lambda + dlambda).min(0.0);
        let change = new_lambda - self.stick_lambda;
        self.stick_lambda = new_lambda;
        change
    }

    /// Coulomb friction. Returns the tangent and bitangent impulse changes.
    ///
    /// The friction cone is scaled by the normal impulse accumulated during
    /// this substep: a contact that is not pushing has no friction.
    pub fn solve_friction(
        &mut self,
        particles: &ParticleArrays,
        simplex: &[usize],
        material: &ColliderMaterial,
        dt: f64,
    ) -> Vector2<f64> {
        if self.tangent_inv_mass <= 0.0 || self.bitangent_inv_mass <= 0.0 || dt <= 0.0 {
            return Vector2::zeros();
        }
        let normal_impulse = self.normal_lambda / dt;
        if normal_impulse <= 0.0 {
            return Vector2::zeros();
        }

        let state = self.state(particles, simplex);
        let relative_velocity = (state.position - state.prev_position) / dt;

        let static_cone = normal_impulse * material.static_friction;
        let dynamic_cone = normal_impulse * material.dynamic_friction;

        let dt_lambda = -relative_velocity.dot(&self.tangent) / self.tangent_inv_mass;
        let db_lambda = -relative_velocity.dot(&self.bitangent) / self.bitangent_inv_mass;

        let old = Vector2::new(self.tangent_lambda, self.bitangent_lambda);
        let mut new = old + Vector2::new(dt_lambda, db_lambda);
        if new.norm() > static_cone {
            let n = new.norm();
            new = if n > 0.0 { new / n * dynamic_cone } else { new };
        }
        self.tangent_lambda = new.x;
        self.bitangent_lambda = new.y;
        new - old
    }

    /// Position corrections for a normal lambda change.
    #[must_use]
    pub fn normal_deltas(
        &self,
        particles: &ParticleArrays,
        simplex: &[usize],
        lambda_change: f64,
    ) -> SmallVec<[(usize, Vector3<f64>); 4]> {
        let delta = self.normal * lambda_change * bary_scale(&self.bary[..simplex.len().min(4)]);
        self.distribute(particles, simplex, delta)
    }

    /// Position corrections for a friction impulse change.
    #[must_use]
    pub fn friction_deltas(
        &self,
        particles: &ParticleArrays,
        simplex: &[usize],
        impulse: Vector2<f64>,
        dt: f64,
    ) -> SmallVec<[(usize, Vector3<f64>); 4]> {
        let delta = (self.tangent * impulse.x + self.bitangent * impulse.y)
            * dt
            * bary_scale(&self.bary[..simplex.len().min(4)]);
        self.distribute(particles, simplex, delta)
    }

    fn distribute(
        &self,
        particles: &ParticleArrays,
        simplex: &[usize],
        delta: Vector3<f64>,
    ) -> SmallVec<[(usize, Vector3<f64>); 4]> {
        simplex
            .iter()
            .zip(&self.bary)
            .filter(|&(&p, &b)| b > 0.0 && particles.inv_masses[p] > 0.0)
            .map(|(&p, &b)| (p, delta * particles.inv_masses[p] * b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strand_types::Particle;

    fn falling_particle(y: f64, prev_y: f64, x: f64) -> ParticleArrays {
        let mut particles = ParticleArrays::with_len(1);
        particles.set(0, &Particle::new(Point3::new(0.0, y, 0.0), 1.0).with_radius(0.1));
        particles.prev_positions[0] = Point3::new(-x, prev_y, 0.0);
        particles
    }

    fn ground_contact() -> Contact {
        Contact::new(
            0,
            ColliderHandle(0),
            [1.0, 0.0, 0.0, 0.0],
            Point3::origin(),
            Vector3::y(),
            0.0,
        )
    }

    #[test]
    fn test_penetration_pushes_out() {
        let particles = falling_particle(0.05, 0.2, 0.0);
        let mut contact = ground_contact();
        contact.prepare(&particles, &[0], 1.0 / 60.0);

        let change = contact.solve_penetration(&particles, &[0], 100.0, 1.0 / 60.0);
        let deltas = contact.normal_deltas(&particles, &[0], change);
        assert_eq!(deltas.len(), 1);
        // Radius 0.1 at height 0.05: 0.05 deep.
        assert_relative_eq!(deltas[0].1, Vector3::new(0.0, 0.05, 0.0), epsilon = 1e-12);
        assert!(contact.normal_lambda > 0.0);
    }

    #[test]
    fn test_separating_contact_does_nothing() {
        let particles = falling_particle(1.0, 1.0, 0.0);
        let mut contact = ground_contact();
        contact.prepare(&particles, &[0], 1.0 / 60.0);
        assert_eq!(contact.solve_penetration(&particles, &[0], 100.0, 1.0 / 60.0), 0.0);
    }

    #[test]
    fn test_max_depenetration_limits_push() {
        let particles = falling_particle(-0.9, -0.9, 0.0);
        let mut contact = ground_contact();
        contact.prepare(&particles, &[0], 0.1);
        let change = contact.solve_penetration(&particles, &[0], 1.0, 0.1);
        // One unit deep, at most 0.1 per step.
        assert_relative_eq!(change, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_friction_stops_sliding_inside_static_cone() {
        let dt = 0.1;
        let particles = falling_particle(0.1, 0.1, 0.01);
        let mut contact = ground_contact();
        contact.prepare(&particles, &[0], dt);
        contact.normal_lambda = 1.0;

        let material = ColliderMaterial {
            static_friction: 1.0,
            dynamic_friction: 1.0,
            ..Default::default()
        };
        let impulse = contact.solve_friction(&particles, &[0], &material, dt);
        let deltas = contact.friction_deltas(&particles, &[0], impulse, dt);
        // Undo the 0.01 tangential slide.
        assert_relative_eq!(deltas[0].1, Vector3::new(-0.01, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_friction_clamped_to_dynamic_cone() {
        let dt = 0.1;
        let particles = falling_particle(0.1, 0.1, 1.0);
        let mut contact = ground_contact();
        contact.prepare(&particles, &[0], dt);
        contact.normal_lambda = 0.01;

        let material = ColliderMaterial {
            static_friction: 0.5,
            dynamic_friction: 0.25,
            ..Default::default()
        };
        let impulse = contact.solve_friction(&particles, &[0], &material, dt);
        assert_relative_eq!(impulse.norm(), 0.01 / dt * 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_adhesion_pulls_within_stick_distance() {
        let dt = 0.1;
        let particles = falling_particle(0.15, 0.15, 0.0);
        let mut contact = ground_contact();
        contact.prepare(&particles, &[0], dt);
        let material = ColliderMaterial {
            stickiness: 1.0,
            stick_distance: 0.1,
            ..Default::default()
        };
        let change = contact.solve_adhesion(&particles, &[0], &material, dt);
        assert!(change < 0.0);
        let deltas = contact.normal_deltas(&particles, &[0], change);
        assert!(deltas[0].1.y < 0.0);
    }

    #[test]
    fn test_edge_contact_moves_both_particles_equally() {
        let mut particles = ParticleArrays::with_len(2);
        particles.set(0, &Particle::new(Point3::new(-0.5, 0.0, 0.0), 1.0).with_radius(0.1));
        particles.set(1, &Particle::new(Point3::new(0.5, 0.0, 0.0), 1.0).with_radius(0.1));
        let mut contact = Contact::new(
            0,
            ColliderHandle(0),
            [0.5, 0.5, 0.0, 0.0],
            Point3::origin(),
            Vector3::y(),
            0.0,
        );
        contact.prepare(&particles, &[0, 1], 0.1);
        let change = contact.solve_penetration(&particles, &[0, 1], 100.0, 0.1);
        let deltas = contact.normal_deltas(&particles, &[0, 1], change);
        assert_relative_eq!(deltas[0].1, Vector3::new(0.0, 0.1, 0.0), epsilon = 1e-12);
        assert_relative_eq!(deltas[1].1, Vector3::new(0.0, 0.1, 0.0), epsilon = 1e-12);
    }
}
