//! Particle state.
//!
//! The solver keeps particles as a structure of arrays ([`ParticleArrays`]):
//! every kernel touches only the fields it needs, and batches of disjoint
//! constraints can read the arrays concurrently.

use nalgebra::{Point3, UnitQuaternion, Vector3, Vector4};
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::CollisionFilter;
use crate::math::mass_to_inv_mass;

/// RGBA color, rendering only.
pub type Color = Vector4<f64>;

/// A collision primitive made of one to four particles (point, edge, triangle).
pub type Simplex = SmallVec<[usize; 4]>;

bitflags::bitflags! {
    /// Per-particle state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ParticleFlags: u32 {
        /// Slot holds a live particle that takes part in the simulation.
        const ACTIVE = 0b0000_0001;
        /// Orientation is simulated (rods).
        const ORIENTED = 0b0000_0010;
        /// Particle was put to sleep during the last step.
        const SLEEPING = 0b0000_0100;
    }
}

/// Description of a single particle, used to seed [`ParticleArrays`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Particle {
    /// Position in solver space.
    pub position: Point3<f64>,
    /// Linear velocity.
    pub velocity: Vector3<f64>,
    /// Orientation (identity for non-oriented particles).
    pub orientation: UnitQuaternion<f64>,
    /// Angular velocity.
    pub angular_velocity: Vector3<f64>,
    /// Inverse mass, 0 for pinned particles.
    pub inv_mass: f64,
    /// Inverse rotational mass, 0 for rotationally pinned particles.
    pub inv_rotational_mass: f64,
    /// Ellipsoid semi-axes.
    pub principal_radii: Vector3<f64>,
    /// Rendering color.
    pub color: Color,
    /// Collision filter.
    pub filter: CollisionFilter,
    /// Whether the orientation is simulated.
    pub oriented: bool,
}

impl Particle {
    /// Create a particle with a given mass. A mass of 0 pins the particle.
    #[must_use]
    pub fn new(position: Point3<f64>, mass: f64) -> Self {
        Self {
            position,
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            inv_mass: if mass > 0.0 { mass_to_inv_mass(mass) } else { 0.0 },
            inv_rotational_mass: 0.0,
            principal_radii: Vector3::new(0.05, 0.05, 0.05),
            color: Color::new(1.0, 1.0, 1.0, 1.0),
            filter: CollisionFilter::EVERYTHING,
            oriented: false,
        }
    }

    /// Create a pinned particle.
    #[must_use]
    pub fn pinned(position: Point3<f64>) -> Self {
        Self::new(position, 0.0)
    }

    /// Set a spherical radius.
    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.principal_radii = Vector3::new(radius, radius, radius);
        self
    }

    /// Set the initial velocity.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = velocity;
        self
    }

    /// Make the particle oriented, with the given orientation and rotational mass.
    #[must_use]
    pub fn with_orientation(mut self, orientation: UnitQuaternion<f64>, rotational_mass: f64) -> Self {
        self.orientation = orientation;
        self.inv_rotational_mass = if rotational_mass > 0.0 {
            mass_to_inv_mass(rotational_mass)
        } else {
            0.0
        };
        self.oriented = true;
        self
    }

    /// Set the collision filter.
    #[must_use]
    pub const fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the color.
    #[must_use]
    pub const fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

/// Structure-of-arrays particle storage.
///
/// All vectors always have the same length. Slots without the
/// [`ParticleFlags::ACTIVE`] flag are ignored by the solver.
#[derive(Debug, Clone, Default)]
pub struct ParticleArrays {
    /// Current (predicted) positions.
    pub positions: Vec<Point3<f64>>,
    /// Positions at the start of the current substep.
    pub prev_positions: Vec<Point3<f64>>,
    /// Rest positions, captured when the particle was seeded.
    pub rest_positions: Vec<Point3<f64>>,
    /// Current orientations.
    pub orientations: Vec<UnitQuaternion<f64>>,
    /// Orientations at the start of the current substep.
    pub prev_orientations: Vec<UnitQuaternion<f64>>,
    /// Linear velocities.
    pub velocities: Vec<Vector3<f64>>,
    /// Angular velocities.
    pub angular_velocities: Vec<Vector3<f64>>,
    /// Inverse masses.
    pub inv_masses: Vec<f64>,
    /// Inverse rotational masses.
    pub inv_rotational_masses: Vec<f64>,
    /// Ellipsoid semi-axes.
    pub principal_radii: Vec<Vector3<f64>>,
    /// Rendering colors.
    pub colors: Vec<Color>,
    /// Collision filters.
    pub filters: Vec<CollisionFilter>,
    /// State flags.
    pub flags: Vec<ParticleFlags>,
    /// External forces accumulated until the next step.
    pub external_forces: Vec<Vector3<f64>>,
}

impl ParticleArrays {
    /// Arrays with `len` inactive slots.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        let mut arrays = Self::default();
        arrays.resize(len);
        arrays
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Grow or shrink every array to `len` slots. New slots are inactive.
    pub fn resize(&mut self, len: usize) {
        self.positions.resize(len, Point3::origin());
        self.prev_positions.resize(len, Point3::origin());
        self.rest_positions.resize(len, Point3::origin());
        self.orientations.resize(len, UnitQuaternion::identity());
        self.prev_orientations.resize(len, UnitQuaternion::identity());
        self.velocities.resize(len, Vector3::zeros());
        self.angular_velocities.resize(len, Vector3::zeros());
        self.inv_masses.resize(len, 0.0);
        self.inv_rotational_masses.resize(len, 0.0);
        self.principal_radii.resize(len, Vector3::zeros());
        self.colors.resize(len, Color::zeros());
        self.filters.resize(len, CollisionFilter::EVERYTHING);
        self.flags.resize(len, ParticleFlags::empty());
        self.external_forces.resize(len, Vector3::zeros());
    }

    /// Write a particle into slot `index` and mark it active.
    ///
    /// Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, particle: &Particle) {
        if index >= self.len() {
            return;
        }
        self.positions[index] = particle.position;
        self.prev_positions[index] = particle.position;
        self.rest_positions[index] = particle.position;
        self.orientations[index] = particle.orientation;
        self.prev_orientations[index] = particle.orientation;
        self.velocities[index] = particle.velocity;
        self.angular_velocities[index] = particle.angular_velocity;
        self.inv_masses[index] = particle.inv_mass.max(0.0);
        self.inv_rotational_masses[index] = particle.inv_rotational_mass.max(0.0);
        self.principal_radii[index] = particle.principal_radii;
        self.colors[index] = particle.color;
        self.filters[index] = particle.filter;
        self.external_forces[index] = Vector3::zeros();
        let mut flags = ParticleFlags::ACTIVE;
        flags.set(ParticleFlags::ORIENTED, particle.oriented);
        self.flags[index] = flags;
    }

    /// Read slot `index` back as a [`Particle`].
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Particle> {
        if index >= self.len() {
            return None;
        }
        Some(Particle {
            position: self.positions[index],
            velocity: self.velocities[index],
            orientation: self.orientations[index],
            angular_velocity: self.angular_velocities[index],
            inv_mass: self.inv_masses[index],
            inv_rotational_mass: self.inv_rotational_masses[index],
            principal_radii: self.principal_radii[index],
            color: self.colors[index],
            filter: self.filters[index],
            oriented: self.flags[index].contains(ParticleFlags::ORIENTED),
        })
    }

    /// Copy every field of slot `from` into slot `to`.
    pub fn copy_slot(&mut self, from: usize, to: usize) {
        if from >= self.len() || to >= self.len() {
            return;
        }
        self.positions[to] = self.positions[from];
        self.prev_positions[to] = self.prev_positions[from];
        self.rest_positions[to] = self.rest_positions[from];
        self.orientations[to] = self.orientations[from];
        self.prev_orientations[to] = self.prev_orientations[from];
        self.velocities[to] = self.velocities[from];
        self.angular_velocities[to] = self.angular_velocities[from];
        self.inv_masses[to] = self.inv_masses[from];
        self.inv_rotational_masses[to] = self.inv_rotational_masses[from];
        self.principal_radii[to] = self.principal_radii[from];
        self.colors[to] = self.colors[from];
        self.filters[to] = self.filters[from];
        self.flags[to] = self.flags[from];
        self.external_forces[to] = self.external_forces[from];
    }

    /// Deactivate slot `index`, zeroing its dynamic state.
    pub fn clear(&mut self, index: usize) {
        if index >= self.len() {
            return;
        }
        self.velocities[index] = Vector3::zeros();
        self.angular_velocities[index] = Vector3::zeros();
        self.inv_masses[index] = 0.0;
        self.inv_rotational_masses[index] = 0.0;
        self.external_forces[index] = Vector3::zeros();
        self.flags[index] = ParticleFlags::empty();
    }

    /// Whether slot `index` holds an active particle.
    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.flags
            .get(index)
            .is_some_and(|f| f.contains(ParticleFlags::ACTIVE))
    }

    /// Largest principal radius of a particle.
    #[must_use]
    pub fn max_radius(&self, index: usize) -> f64 {
        self.principal_radii
            .get(index)
            .map_or(0.0, |r| r.x.max(r.y).max(r.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_particle_mass() {
        let p = Particle::new(Point3::origin(), 2.0);
        assert_relative_eq!(p.inv_mass, 0.5);
        assert_eq!(Particle::pinned(Point3::origin()).inv_mass, 0.0);
    }

    #[test]
    fn test_set_get_round_trip() {
        let mut arrays = ParticleArrays::with_len(3);
        assert!(!arrays.is_active(1));

        let p = Particle::new(Point3::new(1.0, 2.0, 3.0), 0.5)
            .with_radius(0.2)
            .with_orientation(UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3), 0.01);
        arrays.set(1, &p);

        assert!(arrays.is_active(1));
        assert_eq!(arrays.get(1), Some(p));
        assert_relative_eq!(arrays.max_radius(1), 0.2);
        assert!(arrays.flags[1].contains(ParticleFlags::ORIENTED));
    }

    #[test]
    fn test_clear_deactivates() {
        let mut arrays = ParticleArrays::with_len(1);
        arrays.set(0, &Particle::new(Point3::origin(), 1.0));
        arrays.clear(0);
        assert!(!arrays.is_active(0));
        assert_eq!(arrays.inv_masses[0], 0.0);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut arrays = ParticleArrays::with_len(1);
        arrays.set(5, &Particle::new(Point3::origin(), 1.0));
        assert_eq!(arrays.get(5), None);
    }
}
