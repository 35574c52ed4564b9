//! Rope and rod actors.
//!
//! An actor instantiates a blueprint inside a [`Solver`]: it reserves
//! particle slots, adds its constraint batches and collision simplices, and
//! keeps its [`StructuralElement`]s in solver indices while it is a member.
//!
//! # Tearing
//!
//! After a step, [`RopeActor::apply_tearing`] reads each element's force
//! from its distance constraint multiplier (`λ / h²` with `h` the substep
//! length). Elements pulled harder than their resistance are split: the
//! first particle is duplicated into a pooled slot, both halves take half
//! the mass, and the element is re-routed to the copy. Constraints are then
//! rebuilt from the elements.
//!
//! ```text
//!   before:   ●──e0──●──e1──●──e2──●
//!                           p
//!   tear e2:  ●──e0──●──e1──●  ●──e2──●
//!                           p  p'
//! ```
//!
//! # Length changes
//!
//! [`RopeActor::change_length`] grows or shrinks the rope at a
//! [`RopeCursor`], drawing particles from the same pool tearing uses.

use hashbrown::{HashMap, HashSet};
use strand_constraint::{
    Batch, BendConstraint, ConstraintBatch, DistanceConstraint, StretchShearConstraint, bend_vector, partition,
};
use strand_solver::{ActorId, Solver, SolverError, SolverId};
use strand_types::math::safe_normalize;
use strand_types::{Point3, Simplex};
use tracing::{debug, error, info};

use crate::blueprint::{RodBlueprint, RopeBlueprint};
use crate::cursor::RopeCursor;
use crate::element::{StructuralElement, particle_chunks};
use crate::error::{Result, RopeError};
use crate::material::{RodMaterial, RopeMaterial};

/// Where an actor lives while it is part of a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Membership {
    /// Owning solver.
    pub solver: SolverId,
    /// Actor handle inside that solver.
    pub actor: ActorId,
}

/// Common behavior of rope-like actors.
pub trait Actor {
    /// Solver membership, if the actor has been added to one.
    fn membership(&self) -> Option<Membership>;

    /// Structural elements. Solver indices while a member, blueprint
    /// indices otherwise.
    fn elements(&self) -> &[StructuralElement];

    /// Whether the actor was built from a closed path.
    fn is_closed(&self) -> bool;

    /// Whether particle orientations are simulated.
    fn uses_oriented_particles(&self) -> bool;

    /// Handle of this actor in `solver`.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::NotInSolver`] or [`RopeError::WrongSolver`].
    fn solver_actor(&self, solver: &Solver) -> Result<ActorId> {
        let Some(membership) = self.membership() else {
            error!(solver = %solver.id(), "actor is not part of a solver");
            return Err(RopeError::NotInSolver);
        };
        if membership.solver != solver.id() {
            error!(actor = %membership.solver, solver = %solver.id(), "actor belongs to another solver");
            return Err(RopeError::WrongSolver {
                actor: membership.solver,
                solver: solver.id(),
            });
        }
        Ok(membership.actor)
    }

    /// Sum of element rest lengths.
    fn rest_length(&self) -> f64 {
        self.elements().iter().map(|e| e.rest_length).sum()
    }

    /// Sum of current element lengths.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    fn calculate_length(&self, solver: &Solver) -> Result<f64> {
        self.solver_actor(solver)?;
        let positions = &solver.particles().positions;
        Ok(self
            .elements()
            .iter()
            .filter_map(|e| Some((positions.get(e.particle1)?, positions.get(e.particle2)?)))
            .map(|(a, b)| (b - a).norm())
            .sum())
    }

    /// Relative elongation, `length / rest_length - 1`.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    fn strain(&self, solver: &Solver) -> Result<f64> {
        let rest = self.rest_length();
        let length = self.calculate_length(solver)?;
        Ok(if rest > 0.0 { length / rest - 1.0 } else { 0.0 })
    }

    /// Element containing path parameter `mu` and the parameter within it.
    fn element_at(&self, mu: f64) -> Option<(usize, f64)> {
        let count = self.elements().len();
        if count == 0 {
            return None;
        }
        let edge_mu = count as f64 * mu.clamp(0.0, 0.99999);
        let index = (edge_mu.floor() as usize).min(count - 1);
        Some((index, edge_mu - index as f64))
    }

    /// Particle runs for rendering, split where elements are disconnected.
    fn path_chunks(&self) -> Vec<Vec<usize>> {
        particle_chunks(self.elements())
    }
}

/// A torn element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TornEvent {
    /// Element index.
    pub element: usize,
    /// Solver index of the particle that was split.
    pub particle: usize,
    /// Solver index of the copy now starting the element.
    pub new_particle: usize,
    /// Element force when it tore.
    pub force: f64,
}

fn local_map(solver: &Solver, actor: ActorId) -> Result<HashMap<usize, usize>> {
    let indices = solver
        .solver_indices(actor)
        .ok_or(RopeError::Solver(SolverError::UnknownActor(actor)))?;
    Ok(indices.iter().enumerate().map(|(local, &global)| (global, local)).collect())
}

fn to_local(map: &HashMap<usize, usize>, particle: usize) -> Result<usize> {
    map.get(&particle).copied().ok_or(RopeError::Solver(SolverError::ParticleOutOfBounds {
        index: particle,
        len: map.len(),
    }))
}

fn to_solver(solver: &Solver, actor: ActorId, elements: &[StructuralElement]) -> Result<Vec<StructuralElement>> {
    let indices = solver
        .solver_indices(actor)
        .ok_or(RopeError::Solver(SolverError::UnknownActor(actor)))?;
    let map = |local: usize| {
        indices.get(local).copied().ok_or(RopeError::Solver(SolverError::ParticleOutOfBounds {
            index: local,
            len: indices.len(),
        }))
    };
    elements
        .iter()
        .map(|e| {
            Ok(StructuralElement {
                particle1: map(e.particle1)?,
                particle2: map(e.particle2)?,
                ..*e
            })
        })
        .collect()
}

/// Order `(particle1, particle2, rest_length)` edges along their path and
/// turn them into elements, keeping the tear resistance of elements that
/// already existed.
fn chain_elements(edges: Vec<(usize, usize, f64)>, previous: &[StructuralElement]) -> Vec<StructuralElement> {
    let resistance: HashMap<(usize, usize), f64> = previous
        .iter()
        .map(|e| ((e.particle1, e.particle2), e.tear_resistance))
        .collect();
    let mut by_start: HashMap<usize, usize> = HashMap::with_capacity(edges.len());
    let mut ends: HashSet<usize> = HashSet::with_capacity(edges.len());
    for (i, &(a, b, _)) in edges.iter().enumerate() {
        by_start.insert(a, i);
        ends.insert(b);
    }

    // Runs start at particles nothing leads into; loops start at their
    // smallest particle.
    let mut starts: Vec<usize> = edges
        .iter()
        .enumerate()
        .filter(|(_, (a, _, _))| !ends.contains(a))
        .map(|(i, _)| i)
        .collect();
    starts.sort_by_key(|&i| edges[i].0);

    let mut visited = vec![false; edges.len()];
    let mut ordered = Vec::with_capacity(edges.len());
    let mut walk = |start: usize, ordered: &mut Vec<StructuralElement>| {
        let mut current = Some(start);
        while let Some(i) = current {
            if visited[i] {
                break;
            }
            visited[i] = true;
            let (a, b, rest) = edges[i];
            let mut element = StructuralElement::new(a, b, rest);
            if let Some(&r) = resistance.get(&(a, b)) {
                element.tear_resistance = r;
            }
            ordered.push(element);
            current = by_start.get(&b).copied();
        }
    };
    for start in starts {
        walk(start, &mut ordered);
    }
    let mut remaining: Vec<usize> = (0..edges.len()).collect();
    remaining.sort_by_key(|&i| edges[i].0);
    for i in remaining {
        walk(i, &mut ordered);
    }
    ordered
}

fn edge_simplices(map: &HashMap<usize, usize>, elements: &[StructuralElement]) -> Result<Vec<Simplex>> {
    elements
        .iter()
        .map(|e| Ok(Simplex::from_slice(&[to_local(map, e.particle1)?, to_local(map, e.particle2)?])))
        .collect()
}

/// A rope: particles joined by distance and bend constraints.
#[derive(Debug, Clone)]
pub struct RopeActor {
    blueprint: RopeBlueprint,
    material: RopeMaterial,
    membership: Option<Membership>,
    elements: Vec<StructuralElement>,
    active_particles: usize,
}

impl RopeActor {
    /// Create an actor from a blueprint.
    #[must_use]
    pub fn new(blueprint: RopeBlueprint, material: RopeMaterial) -> Self {
        Self {
            elements: blueprint.elements().to_vec(),
            active_particles: blueprint.particles().len(),
            blueprint,
            material,
            membership: None,
        }
    }

    /// Blueprint this actor was created from.
    #[must_use]
    pub const fn blueprint(&self) -> &RopeBlueprint {
        &self.blueprint
    }

    /// Material.
    #[must_use]
    pub const fn material(&self) -> &RopeMaterial {
        &self.material
    }

    /// Particles in use, including copies made by tearing.
    #[must_use]
    pub const fn active_particle_count(&self) -> usize {
        self.active_particles
    }

    /// Spare particles left for tearing.
    #[must_use]
    pub fn pooled_particles_left(&self) -> usize {
        (self.blueprint.particles().len() + self.blueprint.pooled_particles()).saturating_sub(self.active_particles)
    }

    /// Add the rope to a solver.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::AlreadyInSolver`] if the actor is already a
    /// member of a solver, or the solver error if particles or constraints
    /// cannot be added. Nothing is left in the solver on error.
    pub fn add_to_solver(&mut self, solver: &mut Solver) -> Result<ActorId> {
        if let Some(membership) = self.membership {
            error!(solver = %membership.solver, "rope is already part of a solver");
            return Err(RopeError::AlreadyInSolver(membership.solver));
        }

        let id = solver.add_actor(self.blueprint.particles(), self.blueprint.pooled_particles())?;
        if let Err(e) = self.populate(solver, id) {
            error!(actor = %id, %e, "failed to add rope constraints");
            solver.remove_actor(id)?;
            return Err(e);
        }
        self.membership = Some(Membership {
            solver: solver.id(),
            actor: id,
        });
        debug!(
            solver = %solver.id(),
            actor = %id,
            particles = self.active_particles,
            "rope added to solver"
        );
        Ok(id)
    }

    fn populate(&mut self, solver: &mut Solver, id: ActorId) -> Result<()> {
        let m = self.material;
        let distances = self.blueprint.distance_constraints().batches(|c| {
            let max_compression = m.max_compression * c.rest_length;
            c.with_compliance(m.stretch_compliance).with_max_compression(max_compression)
        })?;
        let bends = self.blueprint.bend_constraints().batches(|c| {
            c.with_compliance(m.bend_compliance)
                .with_max_bending(m.max_bending)
                .with_plasticity(m.plastic_yield, m.plastic_creep)
        })?;
        let batches = distances
            .into_iter()
            .map(ConstraintBatch::from)
            .chain(bends.into_iter().map(ConstraintBatch::from))
            .collect();
        solver.add_batches(id, batches)?;
        solver.set_simplices(id, self.blueprint.simplices().to_vec())?;
        self.elements = to_solver(solver, id, self.blueprint.elements())?;
        self.active_particles = self.blueprint.particles().len();
        Ok(())
    }

    /// Remove the rope from its solver, restoring the blueprint state.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn remove_from_solver(&mut self, solver: &mut Solver) -> Result<()> {
        let id = self.solver_actor(solver)?;
        solver.remove_actor(id)?;
        self.membership = None;
        self.elements = self.blueprint.elements().to_vec();
        self.active_particles = self.blueprint.particles().len();
        debug!(solver = %solver.id(), actor = %id, "rope removed from solver");
        Ok(())
    }

    /// Set the tear resistance of one element.
    pub fn set_tear_resistance(&mut self, element: usize, resistance: f64) -> bool {
        self.elements
            .get_mut(element)
            .map(|e| e.tear_resistance = resistance)
            .is_some()
    }

    /// Read element forces from the distance constraint multipliers of the
    /// last substep.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn update_element_forces(&mut self, solver: &Solver) -> Result<()> {
        let id = self.solver_actor(solver)?;
        let h = solver.stats().substep_dt;
        if h <= 0.0 {
            return Ok(());
        }
        let lambdas: HashMap<(usize, usize), f64> = solver
            .batches(id)
            .unwrap_or_default()
            .iter()
            .filter_map(|b| match b {
                ConstraintBatch::Distance(batch) => Some(batch.active()),
                _ => None,
            })
            .flatten()
            .map(|c| ((c.particles[0], c.particles[1]), c.lambda))
            .collect();
        for element in &mut self.elements {
            if let Some(lambda) = lambdas.get(&(element.particle1, element.particle2)) {
                element.constraint_force = lambda / (h * h);
            }
        }
        Ok(())
    }

    /// Tear every element pulled harder than its resistance, at most
    /// `tear_rate` per call, strongest first.
    ///
    /// Call after [`Solver::step`]. Does nothing when tearing is disabled.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn apply_tearing(&mut self, solver: &mut Solver) -> Result<Vec<TornEvent>> {
        if !self.material.tearing_enabled {
            return Ok(Vec::new());
        }
        self.update_element_forces(solver)?;

        let threshold = self.material.tear_resistance_multiplier;
        let mut candidates: Vec<usize> = (0..self.elements.len())
            .filter(|&i| -self.elements[i].constraint_force > threshold * self.elements[i].tear_resistance)
            .collect();
        candidates.sort_by(|&a, &b| {
            self.elements[a]
                .constraint_force
                .total_cmp(&self.elements[b].constraint_force)
        });
        candidates.truncate(self.material.tear_rate);

        let mut events = Vec::new();
        for index in candidates {
            if let Some(event) = self.split(solver, index)? {
                events.push(event);
            }
        }
        if !events.is_empty() {
            self.rebuild_constraints_from_elements(solver)?;
        }
        Ok(events)
    }

    /// Tear one element immediately.
    ///
    /// Returns `None` when the element cannot tear: the pool is exhausted,
    /// its first particle is pinned, or it is already separated from the
    /// previous element.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn tear(&mut self, solver: &mut Solver, element: usize) -> Result<Option<TornEvent>> {
        let event = self.split(solver, element)?;
        if event.is_some() {
            self.rebuild_constraints_from_elements(solver)?;
        }
        Ok(event)
    }

    /// Lengthen or shorten the rope to `new_length` at `cursor`.
    ///
    /// The length is clamped to what the blueprint's particles and pool can
    /// span at the blueprint's particle spacing. Growing first stretches the
    /// cursor element up to that spacing, then inserts elements on pooled
    /// particles. Shrinking removes whole elements from the cursor onward and
    /// shortens the last one. Rest positions are laid out straight along the
    /// elements and constraints are rebuilt.
    ///
    /// Removed particles return to the pool, which reorders the actor's local
    /// particle indices.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn change_length(&mut self, solver: &mut Solver, cursor: &RopeCursor, new_length: f64) -> Result<()> {
        let id = self.solver_actor(solver)?;
        let Some((mut index, _)) = self.element_at(cursor.cursor_mu) else {
            return Ok(());
        };
        let spacing = self.blueprint.interparticle_distance();
        let capacity = self.blueprint.particles().len() + self.blueprint.pooled_particles();
        let max_length = capacity.saturating_sub(1) as f64 * spacing;
        let mut change = new_length.clamp(0.0, max_length) - self.rest_length();

        if change < 0.0 {
            change = -change;
            while self.elements.len() > 1 && change > self.elements[index].rest_length {
                let removed = self.elements.remove(index);
                change -= removed.rest_length;
                if cursor.direction {
                    self.release_particle(solver, id, removed.particle2)?;
                    if let Some(next) = self.elements.get_mut(index) {
                        if next.particle1 == removed.particle2 {
                            next.particle1 = removed.particle1;
                        }
                    } else {
                        index = index.saturating_sub(1);
                    }
                } else {
                    self.release_particle(solver, id, removed.particle1)?;
                    if index > 0 {
                        index -= 1;
                        let previous = &mut self.elements[index];
                        if previous.particle2 == removed.particle1 {
                            previous.particle2 = removed.particle2;
                        }
                    }
                }
            }
            let element = &mut self.elements[index];
            element.rest_length = (element.rest_length - change).max(0.0);
        } else {
            let source = self
                .element_at(cursor.source_mu)
                .map(|(i, mu)| {
                    let e = &self.elements[i];
                    if mu < 0.5 { e.particle1 } else { e.particle2 }
                })
                .unwrap_or(self.elements[index].particle1);

            let element = &mut self.elements[index];
            let stretch = change.min((spacing - element.rest_length).max(0.0));
            element.rest_length += stretch;
            change -= stretch;

            while self.active_particles < capacity && self.elements[index].rest_length + change > spacing {
                let delta = change.min(spacing);
                change -= delta;
                let current = self.elements[index];
                let (from, to) = if cursor.direction {
                    (current.particle1, current.particle2)
                } else {
                    (current.particle2, current.particle1)
                };
                let Some(new_particle) = self.claim_particle(solver, id, source, from, to, delta) else {
                    break;
                };
                if cursor.direction {
                    self.elements[index].particle1 = new_particle;
                    self.elements.insert(index, StructuralElement::new(from, new_particle, delta));
                } else {
                    self.elements[index].particle2 = new_particle;
                    index += 1;
                    self.elements.insert(index, StructuralElement::new(new_particle, from, delta));
                }
            }
            if change > 0.0 {
                self.elements[index].rest_length += change;
            }
        }

        self.straighten_rest_positions(solver);
        self.rebuild_constraints_from_elements(solver)?;
        debug!(
            actor = %id,
            length = self.rest_length(),
            particles = self.active_particles,
            "rope length changed"
        );
        Ok(())
    }

    /// Activate the next pooled particle as a copy of `source`, placed
    /// `delta` from `from` toward `to`.
    fn claim_particle(
        &mut self,
        solver: &mut Solver,
        id: ActorId,
        source: usize,
        from: usize,
        to: usize,
        delta: f64,
    ) -> Option<usize> {
        let new_particle = *solver.solver_indices(id)?.get(self.active_particles)?;
        let particles = solver.particles_mut();
        particles.copy_slot(source, new_particle);
        let position = particles.positions[from] + safe_normalize(&(particles.positions[to] - particles.positions[from])) * delta;
        particles.positions[new_particle] = position;
        particles.prev_positions[new_particle] = position;
        self.active_particles += 1;
        Some(new_particle)
    }

    /// Deactivate `particle` and move it to the front of the pool.
    fn release_particle(&mut self, solver: &mut Solver, id: ActorId, particle: usize) -> Result<()> {
        let local = to_local(&local_map(solver, id)?, particle)?;
        let last = self.active_particles.saturating_sub(1);
        solver.deactivate_actor_particle(id, local)?;
        solver.swap_actor_particles(id, local, last)?;
        self.active_particles = last;
        Ok(())
    }

    fn straighten_rest_positions(&self, solver: &mut Solver) {
        let rest = &mut solver.particles_mut().rest_positions;
        let mut along = 0.0;
        for e in &self.elements {
            if let Some(p) = rest.get_mut(e.particle1) {
                *p = Point3::new(along, 0.0, 0.0);
            }
            along += e.rest_length;
            if let Some(p) = rest.get_mut(e.particle2) {
                *p = Point3::new(along, 0.0, 0.0);
            }
        }
    }

    fn split(&mut self, solver: &mut Solver, index: usize) -> Result<Option<TornEvent>> {
        let id = self.solver_actor(solver)?;
        let Some(&element) = self.elements.get(index) else {
            return Ok(None);
        };
        let Some(&new_particle) = solver
            .solver_indices(id)
            .and_then(|indices| indices.get(self.active_particles))
        else {
            debug!(actor = %id, element = index, "particle pool exhausted, element not torn");
            return Ok(None);
        };

        let particle = element.particle1;
        let particles = solver.particles_mut();
        if particles.inv_masses.get(particle).is_none_or(|&w| w <= 0.0) {
            return Ok(None);
        }
        let previous = if index > 0 {
            self.elements.get(index - 1)
        } else {
            self.elements.last().filter(|last| last.particle2 == particle)
        };
        if previous.is_none_or(|p| p.particle2 != particle) {
            return Ok(None);
        }

        particles.inv_masses[particle] *= 2.0;
        particles.copy_slot(particle, new_particle);
        self.active_particles += 1;
        self.elements[index].particle1 = new_particle;

        info!(actor = %id, element = index, particle, new_particle, "rope torn");
        Ok(Some(TornEvent {
            element: index,
            particle,
            new_particle,
            force: element.constraint_force,
        }))
    }

    /// Replace the rope's distance and bend constraints and its simplices
    /// with ones generated from the current elements.
    ///
    /// Bends join consecutive connected elements and rest at the bend of
    /// the particles' rest positions.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn rebuild_constraints_from_elements(&mut self, solver: &mut Solver) -> Result<()> {
        let id = self.solver_actor(solver)?;
        let map = local_map(solver, id)?;
        let m = self.material;

        let mut distances = Vec::with_capacity(self.elements.len());
        for e in &self.elements {
            distances.push(
                DistanceConstraint::new([to_local(&map, e.particle1)?, to_local(&map, e.particle2)?], e.rest_length)
                    .with_compliance(m.stretch_compliance)
                    .with_max_compression(m.max_compression * e.rest_length),
            );
        }

        let rest = &solver.particles().rest_positions;
        let count = self.elements.len();
        let mut bends = Vec::with_capacity(count);
        for i in 0..count {
            if count < 2 || (i + 1 == count && !self.is_closed()) {
                continue;
            }
            let (e1, e2) = (&self.elements[i], &self.elements[(i + 1) % count]);
            if !e1.continues_into(e2) {
                continue;
            }
            let (a, b, c) = (e1.particle1, e2.particle2, e1.particle2);
            let rest_bend = bend_vector(&rest[a], &rest[b], &rest[c]).norm();
            bends.push(
                BendConstraint::new([to_local(&map, a)?, to_local(&map, b)?, to_local(&map, c)?], rest_bend)
                    .with_compliance(m.bend_compliance)
                    .with_max_bending(m.max_bending)
                    .with_plasticity(m.plastic_yield, m.plastic_creep),
            );
        }

        let batches: Vec<ConstraintBatch> = partition(distances)?
            .into_iter()
            .map(ConstraintBatch::from)
            .chain(partition(bends)?.into_iter().map(ConstraintBatch::from))
            .collect();
        let simplices = edge_simplices(&map, &self.elements)?;

        solver.retain_batches(id, |b| !matches!(b, ConstraintBatch::Distance(_) | ConstraintBatch::Bend(_)))?;
        solver.add_batches(id, batches)?;
        solver.set_simplices(id, simplices)?;
        Ok(())
    }

    /// Recreate the elements from the rope's active distance constraints.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn rebuild_elements_from_constraints(&mut self, solver: &Solver) -> Result<()> {
        let id = self.solver_actor(solver)?;
        let edges = solver
            .batches(id)
            .unwrap_or_default()
            .iter()
            .filter_map(|b| match b {
                ConstraintBatch::Distance(batch) => Some(batch.active()),
                _ => None,
            })
            .flatten()
            .map(|c| (c.particles[0], c.particles[1], c.rest_length))
            .collect();
        self.elements = chain_elements(edges, &self.elements);
        Ok(())
    }
}

impl Actor for RopeActor {
    fn membership(&self) -> Option<Membership> {
        self.membership
    }

    fn elements(&self) -> &[StructuralElement] {
        &self.elements
    }

    fn is_closed(&self) -> bool {
        self.blueprint.is_closed()
    }

    fn uses_oriented_particles(&self) -> bool {
        false
    }
}

/// A rod: oriented particles joined by stretch-shear and bend-twist
/// constraints, optionally held inextensible by a chain constraint.
#[derive(Debug, Clone)]
pub struct RodActor {
    blueprint: RodBlueprint,
    material: RodMaterial,
    membership: Option<Membership>,
    elements: Vec<StructuralElement>,
}

impl RodActor {
    /// Create an actor from a blueprint.
    #[must_use]
    pub fn new(blueprint: RodBlueprint, material: RodMaterial) -> Self {
        Self {
            elements: blueprint.elements().to_vec(),
            blueprint,
            material,
            membership: None,
        }
    }

    /// Blueprint this actor was created from.
    #[must_use]
    pub const fn blueprint(&self) -> &RodBlueprint {
        &self.blueprint
    }

    /// Material.
    #[must_use]
    pub const fn material(&self) -> &RodMaterial {
        &self.material
    }

    /// Add the rod to a solver.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::AlreadyInSolver`] if the actor is already a
    /// member of a solver, or the solver error if particles or constraints
    /// cannot be added. Nothing is left in the solver on error.
    pub fn add_to_solver(&mut self, solver: &mut Solver) -> Result<ActorId> {
        if let Some(membership) = self.membership {
            error!(solver = %membership.solver, "rod is already part of a solver");
            return Err(RopeError::AlreadyInSolver(membership.solver));
        }

        let id = solver.add_actor(self.blueprint.particles(), 0)?;
        if let Err(e) = self.populate(solver, id) {
            error!(actor = %id, %e, "failed to add rod constraints");
            solver.remove_actor(id)?;
            return Err(e);
        }
        self.membership = Some(Membership {
            solver: solver.id(),
            actor: id,
        });
        debug!(
            solver = %solver.id(),
            actor = %id,
            particles = self.blueprint.particles().len(),
            "rod added to solver"
        );
        Ok(id)
    }

    fn populate(&mut self, solver: &mut Solver, id: ActorId) -> Result<()> {
        let m = self.material;
        let stretch_shear = self
            .blueprint
            .stretch_shear_constraints()
            .batches(|c| c.with_compliance(m.shear_compliance_x, m.shear_compliance_y, m.stretch_compliance))?;
        let bend_twist = self.blueprint.bend_twist_constraints().batches(|c| {
            c.with_compliance(m.bend_compliance_x, m.bend_compliance_y, m.torsion_compliance)
                .with_plasticity(m.plastic_yield, m.plastic_creep)
        })?;

        let mut batches: Vec<ConstraintBatch> = stretch_shear
            .into_iter()
            .map(ConstraintBatch::from)
            .chain(bend_twist.into_iter().map(ConstraintBatch::from))
            .collect();
        if m.chain_constraints {
            if let Some(chain) = self.blueprint.chain_constraint() {
                let mut chain = chain.clone();
                chain.tightness = m.tightness.max(0.0);
                batches.push(Batch::from_constraints([chain])?.into());
            }
        }

        solver.add_batches(id, batches)?;
        solver.set_simplices(id, self.blueprint.simplices().to_vec())?;
        self.elements = to_solver(solver, id, self.blueprint.elements())?;
        Ok(())
    }

    /// Remove the rod from its solver.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn remove_from_solver(&mut self, solver: &mut Solver) -> Result<()> {
        let id = self.solver_actor(solver)?;
        solver.remove_actor(id)?;
        self.membership = None;
        self.elements = self.blueprint.elements().to_vec();
        debug!(solver = %solver.id(), actor = %id, "rod removed from solver");
        Ok(())
    }

    /// Replace the rod's stretch-shear constraints and simplices with ones
    /// generated from the current elements.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn rebuild_constraints_from_elements(&mut self, solver: &mut Solver) -> Result<()> {
        let id = self.solver_actor(solver)?;
        let map = local_map(solver, id)?;
        let m = self.material;
        let mut constraints = Vec::with_capacity(self.elements.len());
        for e in &self.elements {
            constraints.push(
                StretchShearConstraint::new([to_local(&map, e.particle1)?, to_local(&map, e.particle2)?], e.rest_length)
                    .with_compliance(m.shear_compliance_x, m.shear_compliance_y, m.stretch_compliance),
            );
        }
        let batches = partition(constraints)?.into_iter().map(ConstraintBatch::from).collect();
        let simplices = edge_simplices(&map, &self.elements)?;

        solver.retain_batches(id, |b| !matches!(b, ConstraintBatch::StretchShear(_)))?;
        solver.add_batches(id, batches)?;
        solver.set_simplices(id, simplices)?;
        Ok(())
    }

    /// Recreate the elements from the rod's active stretch-shear constraints.
    ///
    /// # Errors
    ///
    /// See [`Actor::solver_actor`].
    pub fn rebuild_elements_from_constraints(&mut self, solver: &Solver) -> Result<()> {
        let id = self.solver_actor(solver)?;
        let edges = solver
            .batches(id)
            .unwrap_or_default()
            .iter()
            .filter_map(|b| match b {
                ConstraintBatch::StretchShear(batch) => Some(batch.active()),
                _ => None,
            })
            .flatten()
            .map(|c| (c.particles[0], c.particles[1], c.rest_length))
            .collect();
        self.elements = chain_elements(edges, &self.elements);
        Ok(())
    }
}

impl Actor for RodActor {
    fn membership(&self) -> Option<Membership> {
        self.membership
    }

    fn elements(&self) -> &[StructuralElement] {
        &self.elements
    }

    fn is_closed(&self) -> bool {
        self.blueprint.is_closed()
    }

    fn uses_oriented_particles(&self) -> bool {
        true
    }
}
