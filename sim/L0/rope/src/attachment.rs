//! Attachments pinning actor particles to colliders.

use hashbrown::HashSet;
use strand_collision::ColliderHandle;
use strand_constraint::{ConstraintBatch, PinConstraint, partition};
use strand_solver::{Solver, SolverError};
use tracing::{debug, error};

use crate::actor::{Actor, Membership};
use crate::error::{Result, RopeError};

/// Pins a group of actor particles to a collider.
///
/// Offsets are captured in collider space when the attachment is made, so
/// the particles follow the collider afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    particles: Vec<usize>,
    collider: ColliderHandle,
    compliance: f64,
    rotational_compliance: f64,
    break_threshold: f64,
    constrain_orientation: bool,
    attached: Option<Membership>,
}

impl Attachment {
    /// Rigid, unbreakable attachment of actor-local `particles`.
    #[must_use]
    pub fn new(particles: Vec<usize>, collider: ColliderHandle) -> Self {
        Self {
            particles,
            collider,
            compliance: 0.0,
            rotational_compliance: 0.0,
            break_threshold: f64::INFINITY,
            constrain_orientation: false,
            attached: None,
        }
    }

    /// Set the compliances.
    #[must_use]
    pub fn with_compliance(mut self, compliance: f64, rotational_compliance: f64) -> Self {
        self.compliance = compliance.max(0.0);
        self.rotational_compliance = rotational_compliance.max(0.0);
        self
    }

    /// Break pins whose force exceeds `threshold`.
    #[must_use]
    pub const fn with_break_threshold(mut self, threshold: f64) -> Self {
        self.break_threshold = threshold;
        self
    }

    /// Also pin the orientation of oriented particles.
    #[must_use]
    pub const fn with_orientation(mut self) -> Self {
        self.constrain_orientation = true;
        self
    }

    /// Attached particles, actor-local.
    #[must_use]
    pub fn particles(&self) -> &[usize] {
        &self.particles
    }

    /// Target collider.
    #[must_use]
    pub const fn collider(&self) -> ColliderHandle {
        self.collider
    }

    /// Whether the attachment is active in a solver.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Pin the particles at their current positions relative to the
    /// collider.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::MissingCollider`] if the collider does not
    /// exist, [`RopeError::AlreadyInSolver`] if already attached, the actor
    /// membership errors of [`Actor::solver_actor`], and
    /// [`SolverError::ParticleOutOfBounds`] for bad particle indices.
    pub fn attach(&mut self, solver: &mut Solver, actor: &impl Actor) -> Result<()> {
        if let Some(attached) = self.attached {
            error!(solver = %attached.solver, "attachment is already active");
            return Err(RopeError::AlreadyInSolver(attached.solver));
        }
        let id = actor.solver_actor(solver)?;
        let Some(collider) = solver.colliders().collider(self.collider) else {
            error!(collider = self.collider.0, "attachment targets a missing collider");
            return Err(RopeError::MissingCollider(self.collider.0));
        };
        let transform = collider.transform;
        let indices = solver
            .solver_indices(id)
            .ok_or(RopeError::Solver(SolverError::UnknownActor(id)))?;

        let particles = solver.particles();
        let mut pins = Vec::with_capacity(self.particles.len());
        for &local in &self.particles {
            let Some(&i) = indices.get(local) else {
                error!(particle = local, "attachment particle out of range");
                return Err(RopeError::Solver(SolverError::ParticleOutOfBounds {
                    index: local,
                    len: indices.len(),
                }));
            };
            let offset = transform.inverse_transform_point(&particles.positions[i]);
            let mut pin = PinConstraint::new(local, self.collider.0, offset)
                .with_compliance(self.compliance, self.rotational_compliance)
                .with_break_threshold(self.break_threshold);
            if self.constrain_orientation && particles.inv_rotational_masses[i] > 0.0 {
                pin = pin.with_orientation(transform.rotation.inverse() * particles.orientations[i]);
            }
            pins.push(pin);
        }

        let batches = partition(pins)?.into_iter().map(ConstraintBatch::from).collect();
        solver.add_batches(id, batches)?;
        self.attached = Some(Membership {
            solver: solver.id(),
            actor: id,
        });
        debug!(actor = %id, collider = self.collider.0, particles = self.particles.len(), "attached");
        Ok(())
    }

    fn solver_particles(&self, solver: &Solver, membership: Membership) -> HashSet<usize> {
        solver.solver_indices(membership.actor).map_or_else(HashSet::new, |indices| {
            self.particles.iter().filter_map(|&l| indices.get(l).copied()).collect()
        })
    }

    fn owns(&self, batch: &ConstraintBatch, particles: &HashSet<usize>) -> bool {
        match batch {
            ConstraintBatch::Pin(b) => b
                .constraints()
                .iter()
                .all(|c| c.collider == self.collider.0 && particles.contains(&c.particle)),
            _ => false,
        }
    }

    /// Remove the pins from the solver. Detaching an inactive attachment
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::WrongSolver`] if attached in another solver.
    pub fn detach(&mut self, solver: &mut Solver) -> Result<()> {
        let Some(membership) = self.attached else {
            return Ok(());
        };
        if membership.solver != solver.id() {
            error!(attachment = %membership.solver, solver = %solver.id(), "attachment belongs to another solver");
            return Err(RopeError::WrongSolver {
                actor: membership.solver,
                solver: solver.id(),
            });
        }
        let particles = self.solver_particles(solver, membership);
        if solver.contains_actor(membership.actor) {
            solver.retain_batches(membership.actor, |b| !self.owns(b, &particles))?;
        }
        self.attached = None;
        debug!(actor = %membership.actor, collider = self.collider.0, "detached");
        Ok(())
    }

    /// Actor-local indices of pins that have broken.
    #[must_use]
    pub fn broken_particles(&self, solver: &Solver) -> Vec<usize> {
        let Some(membership) = self.attached.filter(|m| m.solver == solver.id()) else {
            return Vec::new();
        };
        let particles = self.solver_particles(solver, membership);
        let Some(indices) = solver.solver_indices(membership.actor) else {
            return Vec::new();
        };
        solver
            .batches(membership.actor)
            .unwrap_or_default()
            .iter()
            .filter(|b| self.owns(b, &particles))
            .filter_map(|b| match b {
                ConstraintBatch::Pin(batch) => Some(batch.constraints()),
                _ => None,
            })
            .flatten()
            .filter(|c| c.broken)
            .filter_map(|c| indices.iter().position(|&i| i == c.particle))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::actor::RopeActor;
    use crate::blueprint::{BlueprintSettings, RopeBlueprint};
    use crate::material::RopeMaterial;
    use crate::path::Path;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use strand_collision::{Collider, Shape, Sphere};
    use strand_types::{AffineTransform, SolverConfig};

    fn setup() -> (Solver, RopeActor, ColliderHandle) {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let mut anchor = Collider::new(Shape::Sphere(Sphere::new(Point3::origin(), 0.05)))
            .with_transform(AffineTransform::from_translation(Vector3::new(0.0, 1.0, 0.0)));
        anchor.enabled = false;
        let handle = solver.colliders_mut().add_collider(anchor);
        let path = Path::polyline(&[Point3::new(0.0, 1.0, 0.0), Point3::new(1.05, 1.0, 0.0)]);
        let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.1, 1.0)).unwrap();
        let mut actor = RopeActor::new(blueprint, RopeMaterial::default());
        actor.add_to_solver(&mut solver).unwrap();
        (solver, actor, handle)
    }

    #[test]
    fn test_attach_holds_particle() {
        let (mut solver, actor, handle) = setup();
        let id = actor.membership().unwrap().actor;
        let mut attachment = Attachment::new(vec![0], handle);
        attachment.attach(&mut solver, &actor).unwrap();
        assert!(attachment.is_attached());
        for _ in 0..60 {
            solver.step(1.0 / 60.0).unwrap();
        }
        let first = solver.actor_particle(id, 0).unwrap();
        assert_relative_eq!(first.position, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-2);
        assert!(attachment.broken_particles(&solver).is_empty());

        attachment.detach(&mut solver).unwrap();
        assert!(!attachment.is_attached());
        assert!(!solver.batches(id).unwrap().iter().any(|b| matches!(b, ConstraintBatch::Pin(_))));
    }

    #[test]
    fn test_follows_moving_collider() {
        let (mut solver, actor, handle) = setup();
        let id = actor.membership().unwrap().actor;
        let mut attachment = Attachment::new(vec![0], handle);
        attachment.attach(&mut solver, &actor).unwrap();
        for frame in 1..=60 {
            let x = 0.5 * f64::from(frame) / 60.0;
            let moved = AffineTransform::from_translation(Vector3::new(x, 1.0, 0.0));
            assert!(solver.colliders_mut().set_transform(handle, moved));
            solver.step(1.0 / 60.0).unwrap();
        }
        let first = solver.actor_particle(id, 0).unwrap();
        assert_relative_eq!(first.position, Point3::new(0.5, 1.0, 0.0), epsilon = 2e-2);
    }

    #[test]
    fn test_missing_collider() {
        let (mut solver, actor, _) = setup();
        let mut attachment = Attachment::new(vec![0], ColliderHandle(42));
        assert_eq!(attachment.attach(&mut solver, &actor).unwrap_err(), RopeError::MissingCollider(42));
        assert!(!attachment.is_attached());
    }

    #[test]
    fn test_breaking() {
        let (mut solver, actor, handle) = setup();
        let mut attachment = Attachment::new(vec![0], handle).with_break_threshold(1e-3);
        attachment.attach(&mut solver, &actor).unwrap();
        for _ in 0..10 {
            solver.step(1.0 / 60.0).unwrap();
        }
        assert_eq!(attachment.broken_particles(&solver), vec![0]);
    }
}
