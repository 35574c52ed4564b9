//! Batches of particle-disjoint constraints.
//!
//! No two constraints in a [`Batch`] touch the same particle, so a batch can
//! be projected in any order, or in parallel, and its corrections summed
//! without conflicts. Only the first [`Batch::active_count`] constraints are
//! projected; deactivating a constraint swaps it out of that prefix.

use hashbrown::HashSet;
use rayon::prelude::*;
use smallvec::SmallVec;
use strand_types::{AffineTransform, ParticleArrays, SolverBackend};

use crate::correction::Correction;
use crate::error::{ConstraintError, Result};

/// Read-only state handed to every projection.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionContext<'a> {
    /// Particle state at the start of the current phase.
    pub particles: &'a ParticleArrays,
    /// Substep length.
    pub dt: f64,
    /// Solver-space frames indexed by collider slot. Empty slots are `None`.
    pub frames: &'a [Option<AffineTransform>],
}

impl<'a> ProjectionContext<'a> {
    /// Context without collider frames.
    #[must_use]
    pub fn new(particles: &'a ParticleArrays, dt: f64) -> Self {
        Self {
            particles,
            dt,
            frames: &[],
        }
    }

    /// Attach collider frames.
    #[must_use]
    pub fn with_frames(mut self, frames: &'a [Option<AffineTransform>]) -> Self {
        self.frames = frames;
        self
    }

    /// Compliance divided by the squared substep.
    #[must_use]
    pub fn scaled_compliance(&self, compliance: f64) -> f64 {
        compliance / (self.dt * self.dt)
    }
}

/// A constraint that can be projected by an XPBD iteration.
pub trait ProjectConstraint: Send {
    /// Particles referenced by the constraint.
    fn particles(&self) -> SmallVec<[usize; 4]>;

    /// Reset accumulated Lagrange multipliers. Called once per substep.
    fn reset(&mut self);

    /// Project the constraint against the context state.
    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction;

    /// Replace every particle index `i` by `map[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::IndexOutOfBounds`] if an index has no entry.
    fn remap(&mut self, map: &[usize]) -> Result<()>;
}

/// Map one particle index.
///
/// # Errors
///
/// Returns [`ConstraintError::IndexOutOfBounds`] if `index` is not in `map`.
pub fn remap_index(index: usize, map: &[usize]) -> Result<usize> {
    map.get(index)
        .copied()
        .ok_or(ConstraintError::IndexOutOfBounds {
            index,
            len: map.len(),
        })
}

/// A set of particle-disjoint constraints of one type.
#[derive(Debug, Clone)]
pub struct Batch<C> {
    constraints: Vec<C>,
    active_count: usize,
    particles: HashSet<usize>,
}

impl<C> Default for Batch<C> {
    fn default() -> Self {
        Self {
            constraints: Vec::new(),
            active_count: 0,
            particles: HashSet::new(),
        }
    }
}

impl<C: ProjectConstraint> Batch<C> {
    /// Empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from constraints, all active.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::SharedParticle`] if two constraints share
    /// a particle.
    pub fn from_constraints(constraints: impl IntoIterator<Item = C>) -> Result<Self> {
        let mut batch = Self::new();
        for c in constraints {
            batch.push(c)?;
        }
        Ok(batch)
    }

    /// Append an active constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::SharedParticle`] if the constraint touches a
    /// particle already used by the batch. The batch is left unchanged.
    pub fn push(&mut self, constraint: C) -> Result<()> {
        let used = constraint.particles();
        if let Some(&particle) = used.iter().find(|p| self.particles.contains(*p)) {
            return Err(ConstraintError::SharedParticle { particle });
        }
        self.particles.extend(used);

        // Keep active constraints a prefix.
        self.constraints.push(constraint);
        let last = self.constraints.len() - 1;
        self.constraints.swap(self.active_count, last);
        self.active_count += 1;
        Ok(())
    }

    /// Number of constraints, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the batch holds no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Number of active constraints.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// All constraints; the first `active_count` are active.
    #[must_use]
    pub fn constraints(&self) -> &[C] {
        &self.constraints
    }

    /// Mutable access to the constraints.
    ///
    /// Particle indices must not be changed through this slice; use
    /// [`Self::remap`] instead.
    pub fn constraints_mut(&mut self) -> &mut [C] {
        &mut self.constraints
    }

    /// Active constraints.
    #[must_use]
    pub fn active(&self) -> &[C] {
        &self.constraints[..self.active_count]
    }

    /// Whether the batch uses `particle`.
    #[must_use]
    pub fn uses_particle(&self, particle: usize) -> bool {
        self.particles.contains(&particle)
    }

    /// Activate constraint `index`. Returns its new index.
    pub fn activate(&mut self, index: usize) -> Option<usize> {
        if index >= self.constraints.len() {
            return None;
        }
        if index < self.active_count {
            return Some(index);
        }
        self.constraints.swap(index, self.active_count);
        self.active_count += 1;
        Some(self.active_count - 1)
    }

    /// Deactivate constraint `index`. Returns its new index.
    pub fn deactivate(&mut self, index: usize) -> Option<usize> {
        if index >= self.constraints.len() {
            return None;
        }
        if index >= self.active_count {
            return Some(index);
        }
        self.active_count -= 1;
        self.constraints.swap(index, self.active_count);
        Some(self.active_count)
    }

    /// Set the number of active constraints, clamped to the length.
    pub fn set_active_count(&mut self, count: usize) {
        self.active_count = count.min(self.constraints.len());
    }

    /// Reset multipliers of every constraint.
    pub fn reset(&mut self) {
        for c in &mut self.constraints {
            c.reset();
        }
    }

    /// Project every active constraint and return their corrections.
    pub fn project(
        &mut self,
        ctx: &ProjectionContext<'_>,
        backend: SolverBackend,
    ) -> Vec<Correction> {
        let active = &mut self.constraints[..self.active_count];
        match backend {
            SolverBackend::Serial => active.iter_mut().map(|c| c.project(ctx)).collect(),
            SolverBackend::Parallel => active.par_iter_mut().map(|c| c.project(ctx)).collect(),
        }
    }

    /// Remap particle indices of every constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::IndexOutOfBounds`] for unmapped indices and
    /// [`ConstraintError::SharedParticle`] if the map merges particles of two
    /// constraints. Constraints may be partially remapped on error.
    pub fn remap(&mut self, map: &[usize]) -> Result<()> {
        let mut particles = HashSet::with_capacity(self.particles.len());
        for c in &mut self.constraints {
            c.remap(map)?;
            let used = c.particles();
            if let Some(&particle) = used.iter().find(|p| particles.contains(*p)) {
                return Err(ConstraintError::SharedParticle { particle });
            }
            particles.extend(used);
        }
        self.particles = particles;
        Ok(())
    }

    /// Remove and return constraints for which `pred` holds.
    pub fn extract_if(&mut self, mut pred: impl FnMut(&C) -> bool) -> Vec<C> {
        let active: Vec<bool> = (0..self.constraints.len())
            .map(|i| i < self.active_count)
            .collect();
        let mut kept = Vec::with_capacity(self.constraints.len());
        let mut removed = Vec::new();
        let mut kept_active = 0;
        for (c, was_active) in self.constraints.drain(..).zip(active) {
            if pred(&c) {
                removed.push(c);
            } else {
                if was_active {
                    kept_active += 1;
                }
                kept.push(c);
            }
        }
        self.constraints = kept;
        self.active_count = kept_active;
        self.particles = self.constraints.iter().flat_map(ProjectConstraint::particles).collect();
        removed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::DistanceConstraint;
    use nalgebra::Point3;
    use strand_types::Particle;

    fn distance(a: usize, b: usize) -> DistanceConstraint {
        DistanceConstraint::new([a, b], 1.0)
    }

    #[test]
    fn test_push_rejects_shared_particle() {
        let mut batch = Batch::new();
        batch.push(distance(0, 1)).unwrap();
        batch.push(distance(2, 3)).unwrap();
        let err = batch.push(distance(1, 2)).unwrap_err();
        assert_eq!(err, ConstraintError::SharedParticle { particle: 1 });
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_deactivate_keeps_prefix() {
        let mut batch = Batch::from_constraints([distance(0, 1), distance(2, 3), distance(4, 5)]).unwrap();
        assert_eq!(batch.active_count(), 3);

        let moved = batch.deactivate(0).unwrap();
        assert_eq!(moved, 2);
        assert_eq!(batch.active_count(), 2);
        assert_eq!(batch.constraints()[2].particles[0], 0);
        assert!(batch.active().iter().all(|c| c.particles[0] != 0));

        // New constraints join the active prefix.
        batch.push(distance(6, 7)).unwrap();
        assert_eq!(batch.active_count(), 3);
        assert!(batch.active().iter().any(|c| c.particles[0] == 6));

        let back = batch.activate(3).unwrap();
        assert_eq!(back, 3);
        assert_eq!(batch.active_count(), 4);
    }

    #[test]
    fn test_serial_and_parallel_projection_agree() {
        let mut particles = ParticleArrays::with_len(6);
        for i in 0..6 {
            particles.set(i, &Particle::new(Point3::new(i as f64 * 1.5, 0.0, 0.0), 1.0));
        }
        let ctx = ProjectionContext::new(&particles, 0.01);
        let mut a = Batch::from_constraints([distance(0, 1), distance(2, 3), distance(4, 5)]).unwrap();
        let mut b = a.clone();
        let serial = a.project(&ctx, SolverBackend::Serial);
        let parallel = b.project(&ctx, SolverBackend::Parallel);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_remap_translates_indices() {
        let mut batch = Batch::from_constraints([distance(0, 1)]).unwrap();
        batch.remap(&[10, 11]).unwrap();
        assert!(batch.uses_particle(10));
        assert!(!batch.uses_particle(0));
        assert!(batch.remap(&[0]).is_err());
    }

    #[test]
    fn test_extract_if() {
        let mut batch = Batch::from_constraints([distance(0, 1), distance(2, 3), distance(4, 5)]).unwrap();
        batch.deactivate(2);
        let removed = batch.extract_if(|c| c.particles[0] == 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.active_count(), 1);
        assert!(!batch.uses_particle(2));
    }
}
