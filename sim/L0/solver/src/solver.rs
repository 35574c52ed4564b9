//! The XPBD particle solver.
//!
//! # Algorithm Overview
//!
//! ```text
//! For each step(dt):
//!   1. Generate contacts for the whole step (velocity-expanded bounds)
//!   2. For each substep (h = dt / substeps):
//!      a. Apply gravity, wind and external forces: v += a * h
//!      b. Predict: x_prev = x, x += v * h (orientations likewise)
//!      c. Reset Lagrange multipliers, prepare contacts
//!      d. For each phase in ConstraintKind::ORDER, for each iteration:
//!           project batches of that kind, apply corrections
//!      e. Update velocities: v = (x - x_prev) / h
//!      f. Apply damping and velocity clamps
//!   3. Put slow particles to sleep
//! ```
//!
//! Within a phase, `Sequential` evaluation applies corrections after every
//! batch; `Parallel` evaluation applies the averaged corrections of all
//! batches once per iteration, scaled by the SOR factor. Contacts are always
//! averaged per iteration.

use hashbrown::HashMap;
use nalgebra::{UnitQuaternion, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;
use strand_collision::ray::query_particle;
use strand_collision::{ColliderWorld, Contact, Ray, RayHit};
use strand_constraint::{ConstraintBatch, CorrectionBuffer, ProjectionContext, StitchConstraint, partition};
use strand_types::math::pure_quaternion;
use strand_types::{
    AffineTransform, CollisionFilter, ConstraintKind, ConstraintParameters, EvaluationOrder, Particle,
    ParticleArrays, ParticleFlags, Simplex, SolverBackend, SolverConfig, StrandError,
};
use tracing::{debug, error, trace};

use crate::arena::{ParticleArena, ParticleRange};
use crate::error::{Result, SolverError};
use crate::id::{ActorId, IdGenerator, SolverId, StitcherId};
use crate::stats::SolverStats;

type Deltas = SmallVec<[(usize, Vector3<f64>); 4]>;

#[derive(Debug)]
struct ActorSlot {
    range: ParticleRange,
    solver_indices: Vec<usize>,
    batches: Vec<ConstraintBatch>,
    simplices: Vec<Simplex>,
}

#[derive(Debug)]
struct StitcherSlot {
    actors: [ActorId; 2],
    batches: Vec<ConstraintBatch>,
}

/// Owns particles, constraints and colliders and advances them in time.
#[derive(Debug)]
pub struct Solver {
    id: SolverId,
    config: SolverConfig,
    particles: ParticleArrays,
    arena: ParticleArena,
    actors: HashMap<ActorId, ActorSlot>,
    stitchers: HashMap<StitcherId, StitcherSlot>,
    ids: IdGenerator,
    colliders: ColliderWorld,
    simplices: Vec<Simplex>,
    simplices_dirty: bool,
    contacts: Vec<Contact>,
    buffer: CorrectionBuffer,
    stats: SolverStats,
}

impl Solver {
    /// Create a solver.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Config`] if the configuration is invalid.
    pub fn new(config: SolverConfig) -> Result<Self> {
        Self::with_arena(config, ParticleArena::new())
    }

    /// Create a solver whose particle arena never exceeds `limit` slots.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Config`] if the configuration is invalid.
    pub fn with_particle_limit(config: SolverConfig, limit: usize) -> Result<Self> {
        Self::with_arena(config, ParticleArena::with_limit(limit))
    }

    fn with_arena(config: SolverConfig, arena: ParticleArena) -> Result<Self> {
        config.validate().inspect_err(|e| error!(%e, "rejected solver configuration"))?;
        Ok(Self {
            id: SolverId::next(),
            config,
            particles: ParticleArrays::default(),
            arena,
            actors: HashMap::new(),
            stitchers: HashMap::new(),
            ids: IdGenerator::new(),
            colliders: ColliderWorld::new(),
            simplices: Vec::new(),
            simplices_dirty: false,
            contacts: Vec::new(),
            buffer: CorrectionBuffer::default(),
            stats: SolverStats::default(),
        })
    }

    /// Process-unique id of this solver.
    #[must_use]
    pub const fn id(&self) -> SolverId {
        self.id
    }

    /// Solver configuration.
    #[must_use]
    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Config`] if the configuration is invalid; the
    /// current one is kept.
    pub fn set_config(&mut self, config: SolverConfig) -> Result<()> {
        config.validate().inspect_err(|e| error!(%e, "rejected solver configuration"))?;
        self.config = config;
        Ok(())
    }

    /// Statistics from the last step.
    #[must_use]
    pub const fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Particle state.
    #[must_use]
    pub const fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    /// Mutable particle state.
    pub fn particles_mut(&mut self) -> &mut ParticleArrays {
        &mut self.particles
    }

    /// Colliders.
    #[must_use]
    pub const fn colliders(&self) -> &ColliderWorld {
        &self.colliders
    }

    /// Mutable colliders.
    pub fn colliders_mut(&mut self) -> &mut ColliderWorld {
        &mut self.colliders
    }

    /// Contacts generated for the last step.
    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Collision simplices in solver indices, as referenced by
    /// [`Contact::simplex`].
    #[must_use]
    pub fn simplices(&self) -> &[Simplex] {
        &self.simplices
    }

    /// Particle arena.
    #[must_use]
    pub const fn arena(&self) -> &ParticleArena {
        &self.arena
    }

    // =========================================================================
    // Actors
    // =========================================================================

    /// Add an actor with the given particles plus `pool` inactive spare
    /// slots. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Config`] for invalid masses and
    /// [`SolverError::ArenaExhausted`] when no slots are left. Nothing is
    /// added on error.
    pub fn add_actor(&mut self, particles: &[Particle], pool: usize) -> Result<ActorId> {
        if let Some(bad) = particles
            .iter()
            .find(|p| !p.inv_mass.is_finite() || p.inv_mass < 0.0)
        {
            error!(inv_mass = bad.inv_mass, "rejected actor with invalid particle mass");
            return Err(StrandError::InvalidMass(bad.inv_mass).into());
        }

        let len = particles.len() + pool;
        let range = self
            .arena
            .allocate(len)
            .inspect_err(|e| error!(%e, "cannot add actor"))?;
        if self.arena.capacity() > self.particles.len() {
            self.particles.resize(self.arena.capacity());
            self.buffer.resize(self.arena.capacity());
        }

        let solver_indices: Vec<usize> = range.indices().collect();
        for (&slot, particle) in solver_indices.iter().zip(particles) {
            self.particles.set(slot, particle);
        }
        for &slot in &solver_indices[particles.len()..] {
            self.particles.clear(slot);
        }

        let id = ActorId(self.ids.next());
        debug!(actor = %id, particles = particles.len(), pool, start = range.start(), "actor added");
        self.actors.insert(
            id,
            ActorSlot {
                range,
                solver_indices,
                batches: Vec::new(),
                simplices: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Remove an actor, its constraints, and every stitcher attached to it.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`] if the actor is not in this
    /// solver.
    pub fn remove_actor(&mut self, id: ActorId) -> Result<()> {
        let slot = self.actors.remove(&id).ok_or(SolverError::UnknownActor(id))?;
        for &i in &slot.solver_indices {
            self.particles.clear(i);
        }
        let freed = slot.range.len();
        self.arena.release(slot.range);

        let orphaned: Vec<StitcherId> = self
            .stitchers
            .iter()
            .filter(|(_, s)| s.actors.contains(&id))
            .map(|(k, _)| *k)
            .collect();
        for stitcher in orphaned {
            self.stitchers.remove(&stitcher);
            debug!(%stitcher, actor = %id, "stitcher removed with its actor");
        }

        self.contacts.clear();
        self.simplices_dirty = true;
        debug!(actor = %id, particles = freed, "actor removed");
        Ok(())
    }

    /// Whether the actor is part of this solver.
    #[must_use]
    pub fn contains_actor(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    /// Number of actors.
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Map from an actor's local particle indices to solver slots.
    #[must_use]
    pub fn solver_indices(&self, id: ActorId) -> Option<&[usize]> {
        self.actors.get(&id).map(|a| a.solver_indices.as_slice())
    }

    fn slot(&self, id: ActorId) -> Result<&ActorSlot> {
        self.actors.get(&id).ok_or(SolverError::UnknownActor(id))
    }

    fn slot_mut(&mut self, id: ActorId) -> Result<&mut ActorSlot> {
        self.actors.get_mut(&id).ok_or(SolverError::UnknownActor(id))
    }

    fn solver_index(&self, id: ActorId, local: usize) -> Result<usize> {
        let slot = self.slot(id)?;
        slot.solver_indices
            .get(local)
            .copied()
            .ok_or(SolverError::ParticleOutOfBounds {
                index: local,
                len: slot.solver_indices.len(),
            })
    }

    /// Read an actor particle by local index.
    #[must_use]
    pub fn actor_particle(&self, id: ActorId, local: usize) -> Option<Particle> {
        self.solver_index(id, local)
            .ok()
            .and_then(|i| self.particles.get(i))
    }

    /// Write an actor particle by local index, activating its slot.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`] or
    /// [`SolverError::ParticleOutOfBounds`].
    pub fn set_actor_particle(&mut self, id: ActorId, local: usize, particle: &Particle) -> Result<()> {
        let i = self.solver_index(id, local)?;
        self.particles.set(i, particle);
        Ok(())
    }

    /// Deactivate an actor particle by local index.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`] or
    /// [`SolverError::ParticleOutOfBounds`].
    pub fn deactivate_actor_particle(&mut self, id: ActorId, local: usize) -> Result<()> {
        let i = self.solver_index(id, local)?;
        self.particles.clear(i);
        Ok(())
    }

    /// Swap the solver slots behind two local indices of an actor.
    ///
    /// Batches and simplices already hold solver slots and are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`] or
    /// [`SolverError::ParticleOutOfBounds`].
    pub fn swap_actor_particles(&mut self, id: ActorId, a: usize, b: usize) -> Result<()> {
        let slot = self.slot_mut(id)?;
        let len = slot.solver_indices.len();
        for index in [a, b] {
            if index >= len {
                return Err(SolverError::ParticleOutOfBounds { index, len });
            }
        }
        slot.solver_indices.swap(a, b);
        Ok(())
    }

    /// Add constraint batches expressed in actor-local particle indices.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`] or [`SolverError::Constraint`]
    /// if a batch references a particle the actor does not have. Nothing is
    /// added on error.
    pub fn add_batches(&mut self, id: ActorId, batches: Vec<ConstraintBatch>) -> Result<()> {
        let mapped = self.map_batches(id, batches)?;
        self.slot_mut(id)?.batches.extend(mapped);
        Ok(())
    }

    /// Replace every constraint batch of an actor.
    ///
    /// # Errors
    ///
    /// See [`Self::add_batches`]. The old batches are kept on error.
    pub fn replace_batches(&mut self, id: ActorId, batches: Vec<ConstraintBatch>) -> Result<()> {
        let mapped = self.map_batches(id, batches)?;
        self.slot_mut(id)?.batches = mapped;
        Ok(())
    }

    fn map_batches(&self, id: ActorId, mut batches: Vec<ConstraintBatch>) -> Result<Vec<ConstraintBatch>> {
        let slot = self.slot(id)?;
        for batch in &mut batches {
            batch
                .remap(&slot.solver_indices)
                .inspect_err(|e| error!(actor = %id, %e, "rejected constraint batch"))?;
        }
        Ok(batches)
    }

    /// Constraint batches of an actor, in solver indices.
    #[must_use]
    pub fn batches(&self, id: ActorId) -> Option<&[ConstraintBatch]> {
        self.actors.get(&id).map(|a| a.batches.as_slice())
    }

    /// Mutable constraint batches of an actor.
    pub fn batches_mut(&mut self, id: ActorId) -> Option<&mut [ConstraintBatch]> {
        self.actors.get_mut(&id).map(|a| a.batches.as_mut_slice())
    }

    /// Keep only the actor batches for which `keep` returns true.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`].
    pub fn retain_batches(&mut self, id: ActorId, keep: impl FnMut(&ConstraintBatch) -> bool) -> Result<()> {
        self.slot_mut(id)?.batches.retain(keep);
        Ok(())
    }

    /// Set the collision simplices of an actor, in local indices.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`] or
    /// [`SolverError::ParticleOutOfBounds`].
    pub fn set_simplices(&mut self, id: ActorId, simplices: Vec<Simplex>) -> Result<()> {
        let slot = self.slot_mut(id)?;
        let len = slot.solver_indices.len();
        let mapped = simplices
            .into_iter()
            .map(|simplex| {
                simplex
                    .iter()
                    .map(|&local| {
                        slot.solver_indices
                            .get(local)
                            .copied()
                            .ok_or(SolverError::ParticleOutOfBounds { index: local, len })
                    })
                    .collect::<Result<Simplex>>()
            })
            .collect::<Result<Vec<_>>>()?;
        slot.simplices = mapped;
        self.simplices_dirty = true;
        Ok(())
    }

    // =========================================================================
    // Stitchers
    // =========================================================================

    /// Stitch particle pairs `(local in a, local in b)` of two actors.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownActor`] if either actor is not part of
    /// this solver, [`SolverError::ParticleOutOfBounds`] for bad indices and
    /// [`SolverError::Constraint`] if coloring fails.
    pub fn add_stitcher(
        &mut self,
        a: ActorId,
        b: ActorId,
        pairs: &[(usize, usize)],
        compliance: f64,
    ) -> Result<StitcherId> {
        for id in [a, b] {
            if !self.contains_actor(id) {
                error!(actor = %id, "stitcher actor is not part of this solver");
                return Err(SolverError::UnknownActor(id));
            }
        }

        let constraints = pairs
            .iter()
            .map(|&(pa, pb)| {
                Ok(StitchConstraint::new([self.solver_index(a, pa)?, self.solver_index(b, pb)?])
                    .with_compliance(compliance))
            })
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| error!(%e, "rejected stitcher"))?;

        let batches = partition(constraints)?.into_iter().map(ConstraintBatch::from).collect();
        let id = StitcherId(self.ids.next());
        self.stitchers.insert(
            id,
            StitcherSlot {
                actors: [a, b],
                batches,
            },
        );
        debug!(stitcher = %id, %a, %b, stitches = pairs.len(), "stitcher added");
        Ok(id)
    }

    /// Remove a stitcher.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::UnknownStitcher`] if it is not in this solver.
    pub fn remove_stitcher(&mut self, id: StitcherId) -> Result<()> {
        self.stitchers
            .remove(&id)
            .map(|_| debug!(stitcher = %id, "stitcher removed"))
            .ok_or(SolverError::UnknownStitcher(id))
    }

    /// Whether the stitcher is part of this solver.
    #[must_use]
    pub fn contains_stitcher(&self, id: StitcherId) -> bool {
        self.stitchers.contains_key(&id)
    }

    // =========================================================================
    // Forces and queries
    // =========================================================================

    /// Accumulate a force on a solver particle until the next step.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Config`] for an out-of-range particle.
    pub fn add_force(&mut self, particle: usize, force: Vector3<f64>) -> Result<()> {
        let len = self.particles.len();
        let slot = self
            .particles
            .external_forces
            .get_mut(particle)
            .ok_or(StrandError::ParticleOutOfBounds { index: particle, len })?;
        *slot += force;
        Ok(())
    }

    /// Cast a ray against every active particle whose filter collides with
    /// `filter`. Hits are sorted by distance along the ray.
    #[must_use]
    pub fn raycast(&self, ray: &Ray, max_distance: f64, filter: CollisionFilter) -> Vec<RayHit> {
        let p = &self.particles;
        let mut hits: Vec<RayHit> = (0..p.len())
            .filter(|&i| p.is_active(i) && p.filters[i].collides_with(filter))
            .map(|i| {
                query_particle(
                    ray,
                    max_distance,
                    i,
                    &p.positions[i],
                    &p.orientations[i],
                    &p.principal_radii[i],
                )
            })
            .filter(|hit| hit.hit)
            .collect();
        hits.sort_by(|a, b| a.ray_distance.total_cmp(&b.ray_distance));
        hits
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    /// Advance the simulation by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Config`] if `dt` is not finite and positive.
    pub fn step(&mut self, dt: f64) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            error!(dt, "rejected time step");
            return Err(StrandError::InvalidTimestep(dt).into());
        }

        if self.simplices_dirty {
            self.rebuild_simplices();
        }
        self.contacts = self
            .colliders
            .generate_contacts(&self.particles, &self.simplices, &self.config, dt);
        let frames = self.colliders.frames();

        let substeps = self.config.substeps.max(1);
        let h = dt / f64::from(substeps);
        let mut max_error: f64 = 0.0;
        for _ in 0..substeps {
            max_error = self.substep(h, &frames);
        }

        for force in &mut self.particles.external_forces {
            *force = Vector3::zeros();
        }
        let sleeping = self.apply_sleep();

        self.stats = SolverStats {
            steps: self.stats.steps + 1,
            substeps,
            substep_dt: h,
            contacts: self.contacts.len(),
            kinetic_energy: self.kinetic_energy(),
            max_error,
            active_particles: (0..self.particles.len()).filter(|&i| self.particles.is_active(i)).count(),
            sleeping,
        };
        trace!(step = self.stats.steps, contacts = self.stats.contacts, max_error, "step done");
        Ok(())
    }

    fn rebuild_simplices(&mut self) {
        let mut ids: Vec<ActorId> = self.actors.keys().copied().collect();
        ids.sort_unstable();
        self.simplices = ids
            .iter()
            .filter_map(|id| self.actors.get(id))
            .flat_map(|a| a.simplices.iter().cloned())
            .collect();
        self.simplices_dirty = false;
    }

    fn substep(&mut self, h: f64, frames: &[Option<AffineTransform>]) -> f64 {
        self.integrate(h);

        for contact in &mut self.contacts {
            if let Some(simplex) = self.simplices.get(contact.simplex) {
                contact.prepare(&self.particles, simplex, h);
            }
        }
        for batch in self
            .actors
            .values_mut()
            .flat_map(|a| a.batches.iter_mut())
            .chain(self.stitchers.values_mut().flat_map(|s| s.batches.iter_mut()))
        {
            batch.reset();
        }

        let backend = self.config.backend;
        let mut max_error: f64 = 0.0;
        for kind in ConstraintKind::ORDER {
            let params = *self.config.parameters(kind);
            if !params.is_active() {
                continue;
            }
            let error = match kind {
                ConstraintKind::Collision => self.solve_contacts(h, &params, false),
                ConstraintKind::Friction => self.solve_contacts(h, &params, true),
                _ => {
                    let mut batches = batches_of_kind(&mut self.actors, &mut self.stitchers, kind);
                    solve_batches(
                        &mut batches,
                        &mut self.particles,
                        &mut self.buffer,
                        frames,
                        h,
                        &params,
                        backend,
                    )
                }
            };
            max_error = max_error.max(error);
        }

        self.update_velocities(h);
        max_error
    }

    fn integrate(&mut self, h: f64) {
        let config = &self.config;
        let p = &mut self.particles;
        for i in 0..p.len() {
            if !p.is_active(i) {
                continue;
            }
            p.prev_positions[i] = p.positions[i];
            p.prev_orientations[i] = p.orientations[i];

            let w = p.inv_masses[i];
            if w > 0.0 {
                let v = p.velocities[i];
                let acceleration =
                    config.gravity + p.external_forces[i] * w + (config.wind - v) * config.drag;
                let v = clamp_norm(v + acceleration * h, config.max_velocity);
                p.velocities[i] = v;
                p.positions[i] += v * h;
            }

            if p.flags[i].contains(ParticleFlags::ORIENTED) && p.inv_rotational_masses[i] > 0.0 {
                let omega = clamp_norm(p.angular_velocities[i], config.max_angular_velocity);
                p.angular_velocities[i] = omega;
                let q = p.orientations[i].into_inner();
                let predicted = q + pure_quaternion(&omega) * q * (0.5 * h);
                if predicted.norm_squared() > 0.0 {
                    p.orientations[i] = UnitQuaternion::from_quaternion(predicted);
                }
            }
        }
    }

    fn solve_contacts(&mut self, h: f64, params: &ConstraintParameters, friction: bool) -> f64 {
        if self.contacts.is_empty() {
            return 0.0;
        }
        let backend = self.config.backend;
        let max_depenetration = self.config.max_depenetration;
        let mut error = 0.0;

        for _ in 0..params.iterations {
            let deltas: Vec<Deltas> = {
                let particles = &self.particles;
                let simplices = &self.simplices;
                let colliders = &self.colliders;
                let solve = |contact: &mut Contact| -> Deltas {
                    let Some(simplex) = simplices.get(contact.simplex) else {
                        return Deltas::new();
                    };
                    let material = colliders
                        .collider(contact.collider)
                        .map(|c| c.material)
                        .unwrap_or_default();
                    if friction {
                        if material.static_friction <= 0.0 && material.dynamic_friction <= 0.0 {
                            return Deltas::new();
                        }
                        let impulse = contact.solve_friction(particles, simplex, &material, h);
                        contact.friction_deltas(particles, simplex, impulse, h)
                    } else {
                        let change = contact.solve_penetration(particles, simplex, max_depenetration, h);
                        let stick = contact.solve_adhesion(particles, simplex, &material, h);
                        contact.normal_deltas(particles, simplex, change + stick)
                    }
                };
                match backend {
                    SolverBackend::Serial => self.contacts.iter_mut().map(solve).collect(),
                    SolverBackend::Parallel => self.contacts.par_iter_mut().map(solve).collect(),
                }
            };

            for (particle, delta) in deltas.iter().flatten() {
                self.buffer.add_position(*particle, delta);
            }
            self.buffer.apply(&mut self.particles, params.sor_factor);
            error = self
                .contacts
                .iter()
                .map(|c| (-c.distance).max(0.0))
                .fold(0.0, f64::max);
        }
        if friction { 0.0 } else { error }
    }

    fn update_velocities(&mut self, h: f64) {
        let config = &self.config;
        let damping = (1.0 - config.damping * h).max(0.0);
        let p = &mut self.particles;
        for i in 0..p.len() {
            if !p.is_active(i) {
                continue;
            }
            if p.inv_masses[i] > 0.0 {
                let v = (p.positions[i] - p.prev_positions[i]) / h;
                p.velocities[i] = clamp_norm(v * damping, config.max_velocity);
            } else {
                p.velocities[i] = Vector3::zeros();
            }

            if p.flags[i].contains(ParticleFlags::ORIENTED) && p.inv_rotational_masses[i] > 0.0 {
                let mut delta = (p.orientations[i] * p.prev_orientations[i].inverse()).into_inner();
                if delta.w < 0.0 {
                    delta = -delta;
                }
                let omega = delta.imag() * (2.0 / h);
                p.angular_velocities[i] = clamp_norm(omega * damping, config.max_angular_velocity);
            } else {
                p.angular_velocities[i] = Vector3::zeros();
            }
        }
    }

    fn apply_sleep(&mut self) -> usize {
        let threshold = self.config.sleep_threshold;
        let p = &mut self.particles;
        let mut sleeping = 0;
        for i in 0..p.len() {
            if !p.is_active(i) || p.inv_masses[i] <= 0.0 {
                continue;
            }
            let asleep = 0.5 * p.velocities[i].norm_squared() < threshold;
            if asleep {
                p.positions[i] = p.prev_positions[i];
                p.velocities[i] = Vector3::zeros();
                sleeping += 1;
            }
            p.flags[i].set(ParticleFlags::SLEEPING, asleep);
        }
        sleeping
    }

    fn kinetic_energy(&self) -> f64 {
        let p = &self.particles;
        (0..p.len())
            .filter(|&i| p.is_active(i) && p.inv_masses[i] > 0.0)
            .map(|i| 0.5 * p.velocities[i].norm_squared() / p.inv_masses[i])
            .sum()
    }
}

fn clamp_norm(v: Vector3<f64>, max: f64) -> Vector3<f64> {
    let norm = v.norm();
    if norm > max && norm > 0.0 { v * (max / norm) } else { v }
}

/// Batches of one kind from every actor, then every stitcher, in creation order.
fn batches_of_kind<'a>(
    actors: &'a mut HashMap<ActorId, ActorSlot>,
    stitchers: &'a mut HashMap<StitcherId, StitcherSlot>,
    kind: ConstraintKind,
) -> Vec<&'a mut ConstraintBatch> {
    let mut actor_slots: Vec<_> = actors.iter_mut().collect();
    actor_slots.sort_unstable_by_key(|(id, _)| **id);
    let mut stitcher_slots: Vec<_> = stitchers.iter_mut().collect();
    stitcher_slots.sort_unstable_by_key(|(id, _)| **id);

    actor_slots
        .into_iter()
        .flat_map(|(_, a)| a.batches.iter_mut())
        .chain(stitcher_slots.into_iter().flat_map(|(_, s)| s.batches.iter_mut()))
        .filter(|b| b.kind() == kind)
        .collect()
}

/// Run every iteration of one constraint phase. Returns the largest error
/// seen in the last iteration.
fn solve_batches(
    batches: &mut [&mut ConstraintBatch],
    particles: &mut ParticleArrays,
    buffer: &mut CorrectionBuffer,
    frames: &[Option<AffineTransform>],
    h: f64,
    params: &ConstraintParameters,
    backend: SolverBackend,
) -> f64 {
    if batches.is_empty() {
        return 0.0;
    }
    let mut error = 0.0;
    for _ in 0..params.iterations {
        buffer.take_max_error();
        for batch in batches.iter_mut() {
            let corrections = {
                let ctx = ProjectionContext::new(particles, h).with_frames(frames);
                batch.project(&ctx, backend)
            };
            for correction in &corrections {
                buffer.accumulate(correction);
            }
            if params.evaluation_order == EvaluationOrder::Sequential {
                buffer.apply(particles, params.sor_factor);
            }
        }
        if params.evaluation_order == EvaluationOrder::Parallel {
            buffer.apply(particles, params.sor_factor);
        }
        error = buffer.take_max_error();
    }
    error
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use strand_collision::{Collider, Cuboid, Shape};
    use strand_constraint::{Batch, DistanceConstraint, PinConstraint};
    use strand_types::Simplex;

    fn pair() -> Vec<Particle> {
        vec![
            Particle::pinned(Point3::origin()),
            Particle::new(Point3::new(1.0, 0.0, 0.0), 1.0),
        ]
    }

    fn distance_batch(rest: f64) -> ConstraintBatch {
        Batch::from_constraints([DistanceConstraint::new([0, 1], rest)])
            .unwrap()
            .into()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SolverConfig::default().with_substeps(0);
        assert!(matches!(Solver::new(config), Err(SolverError::Config(_))));
    }

    #[test]
    fn test_free_fall() {
        let mut solver = Solver::new(SolverConfig::default().no_sleeping()).unwrap();
        solver
            .add_actor(&[Particle::new(Point3::origin(), 1.0)], 0)
            .unwrap();
        solver.step(0.1).unwrap();
        // Semi-implicit Euler: one step of v = g dt, x = v dt.
        assert_relative_eq!(solver.particles().velocities[0].y, -0.981, epsilon = 1e-12);
        assert_relative_eq!(solver.particles().positions[0].y, -0.0981, epsilon = 1e-12);
        assert_eq!(solver.stats().steps, 1);
    }

    #[test]
    fn test_invalid_timestep() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        assert!(solver.step(0.0).is_err());
        assert!(solver.step(f64::NAN).is_err());
    }

    #[test]
    fn test_pendulum_keeps_length() {
        let mut solver = Solver::new(SolverConfig::default().no_sleeping()).unwrap();
        let actor = solver.add_actor(&pair(), 0).unwrap();
        solver.add_batches(actor, vec![distance_batch(1.0)]).unwrap();
        for _ in 0..60 {
            solver.step(1.0 / 60.0).unwrap();
        }
        let p = solver.particles();
        assert_relative_eq!((p.positions[1] - p.positions[0]).norm(), 1.0, epsilon = 1e-3);
        assert!(p.positions[1].y < -0.1);
    }

    #[test]
    fn test_actor_indices_and_removal() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let a = solver.add_actor(&pair(), 2).unwrap();
        let b = solver.add_actor(&pair(), 0).unwrap();
        assert_eq!(solver.solver_indices(a).unwrap(), &[0, 1, 2, 3]);
        assert_eq!(solver.solver_indices(b).unwrap(), &[4, 5]);
        assert!(!solver.particles().is_active(2));

        // Local indices are remapped into solver slots.
        solver.add_batches(b, vec![distance_batch(1.0)]).unwrap();
        assert!(solver.batches(b).unwrap()[0].uses_particle(5));

        solver.remove_actor(a).unwrap();
        assert!(!solver.particles().is_active(0));
        assert!(matches!(solver.remove_actor(a), Err(SolverError::UnknownActor(_))));

        let c = solver.add_actor(&pair(), 0).unwrap();
        assert_eq!(solver.solver_indices(c).unwrap(), &[0, 1]);
    }

    #[test]
    fn test_swap_actor_particles() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let a = solver.add_actor(&pair(), 1).unwrap();
        solver.add_batches(a, vec![distance_batch(1.0)]).unwrap();
        solver.swap_actor_particles(a, 1, 2).unwrap();
        assert_eq!(solver.solver_indices(a).unwrap(), &[0, 2, 1]);
        // Batches keep the slots they were mapped to.
        assert!(solver.batches(a).unwrap()[0].uses_particle(1));
        assert!(matches!(
            solver.swap_actor_particles(a, 0, 3),
            Err(SolverError::ParticleOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_batches_out_of_range_rejected() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let actor = solver
            .add_actor(&[Particle::new(Point3::origin(), 1.0)], 0)
            .unwrap();
        assert!(matches!(
            solver.add_batches(actor, vec![distance_batch(1.0)]),
            Err(SolverError::Constraint(_))
        ));
        assert!(solver.batches(actor).unwrap().is_empty());
    }

    #[test]
    fn test_stitcher_requires_members() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let a = solver.add_actor(&pair(), 0).unwrap();
        let b = solver.add_actor(&pair(), 0).unwrap();
        let stitcher = solver.add_stitcher(a, b, &[(1, 1)], 0.0).unwrap();
        assert!(solver.contains_stitcher(stitcher));
        assert!(matches!(
            solver.add_stitcher(a, ActorId(999), &[(1, 1)], 0.0),
            Err(SolverError::UnknownActor(ActorId(999)))
        ));
        assert!(matches!(
            solver.add_stitcher(a, b, &[(7, 1)], 0.0),
            Err(SolverError::ParticleOutOfBounds { index: 7, .. })
        ));

        solver.remove_actor(b).unwrap();
        assert!(!solver.contains_stitcher(stitcher));
    }

    #[test]
    fn test_resting_on_box() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        solver.colliders_mut().add_collider(Collider::new(Shape::Box(Cuboid::new(Vector3::new(
            1.0, 1.0, 1.0,
        )))));
        let actor = solver
            .add_actor(&[Particle::new(Point3::new(0.0, 1.5, 0.0), 1.0).with_radius(0.1)], 0)
            .unwrap();
        solver
            .set_simplices(actor, vec![Simplex::from_slice(&[0])])
            .unwrap();
        for _ in 0..240 {
            solver.step(1.0 / 60.0).unwrap();
        }
        assert_relative_eq!(solver.particles().positions[0].y, 1.1, epsilon = 1e-3);
        assert!(!solver.contacts().is_empty());
    }

    #[test]
    fn test_pin_follows_collider() {
        let mut solver = Solver::new(SolverConfig::default().zero_gravity().no_sleeping()).unwrap();
        let handle = solver
            .colliders_mut()
            .add_collider(Collider::new(Shape::Box(Cuboid::new(Vector3::new(0.1, 0.1, 0.1)))));
        let actor = solver
            .add_actor(&[Particle::new(Point3::origin(), 1.0)], 0)
            .unwrap();
        let pin: ConstraintBatch = Batch::from_constraints([PinConstraint::new(0, handle.0, Point3::origin())])
            .unwrap()
            .into();
        solver.add_batches(actor, vec![pin]).unwrap();

        solver
            .colliders_mut()
            .set_transform(handle, AffineTransform::from_translation(Vector3::new(0.0, 2.0, 0.0)));
        solver.step(1.0 / 60.0).unwrap();
        assert_relative_eq!(solver.particles().positions[0], Point3::new(0.0, 2.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_raycast_sorted_by_distance() {
        let mut solver = Solver::new(SolverConfig::default()).unwrap();
        let particles: Vec<_> = [3.0, 1.0, 2.0]
            .iter()
            .map(|&x| Particle::new(Point3::new(x, 0.0, 0.0), 1.0).with_radius(0.2))
            .collect();
        solver.add_actor(&particles, 0).unwrap();
        let ray = Ray::new(Point3::origin(), Vector3::x());
        let hits = solver.raycast(&ray, 10.0, CollisionFilter::EVERYTHING);
        let order: Vec<usize> = hits.iter().map(|h| h.particle).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_relative_eq!(hits[0].ray_distance, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_external_force_applies_once() {
        let mut solver = Solver::new(SolverConfig::default().zero_gravity().no_sleeping()).unwrap();
        solver
            .add_actor(&[Particle::new(Point3::origin(), 2.0)], 0)
            .unwrap();
        solver.add_force(0, Vector3::new(4.0, 0.0, 0.0)).unwrap();
        solver.step(0.5).unwrap();
        assert_relative_eq!(solver.particles().velocities[0].x, 1.0, epsilon = 1e-12);
        solver.step(0.5).unwrap();
        assert_relative_eq!(solver.particles().velocities[0].x, 1.0, epsilon = 1e-12);
        assert!(solver.add_force(9, Vector3::x()).is_err());
    }

    #[test]
    fn test_sleeping_freezes_slow_particles() {
        let config = SolverConfig {
            sleep_threshold: 1.0,
            ..SolverConfig::default()
        };
        let mut solver = Solver::new(config).unwrap();
        solver
            .add_actor(&[Particle::new(Point3::origin(), 1.0)], 0)
            .unwrap();
        solver.step(0.01).unwrap();
        assert_eq!(solver.stats().sleeping, 1);
        assert_eq!(solver.particles().positions[0], Point3::origin());
        assert!(solver.particles().flags[0].contains(ParticleFlags::SLEEPING));
    }

    #[test]
    fn test_parallel_backend_matches_serial() {
        let run = |backend| {
            let mut solver = Solver::new(SolverConfig::default().with_backend(backend).no_sleeping()).unwrap();
            let particles: Vec<_> = (0..6)
                .map(|i| {
                    let mass = if i == 0 { 0.0 } else { 1.0 };
                    Particle::new(Point3::new(f64::from(i) * 0.5, 0.0, 0.0), mass)
                })
                .collect();
            let actor = solver.add_actor(&particles, 0).unwrap();
            let constraints: Vec<_> = (0..5).map(|i| DistanceConstraint::new([i, i + 1], 0.5)).collect();
            let batches = partition(constraints)
                .unwrap()
                .into_iter()
                .map(ConstraintBatch::from)
                .collect();
            solver.add_batches(actor, batches).unwrap();
            for _ in 0..30 {
                solver.step(1.0 / 60.0).unwrap();
            }
            solver.particles().positions.clone()
        };
        assert_eq!(run(SolverBackend::Serial), run(SolverBackend::Parallel));
    }
}
