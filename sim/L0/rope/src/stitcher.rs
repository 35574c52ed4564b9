//! Stitches between two actors.

use strand_solver::{Solver, SolverId, StitcherId};
use tracing::{debug, error};

use crate::actor::Actor;
use crate::error::{Result, RopeError};

/// Particle pairs joining two actors of the same solver.
///
/// Stitch indices are actor-local: `(particle of the first actor, particle
/// of the second actor)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stitcher {
    stitches: Vec<(usize, usize)>,
    compliance: f64,
    handle: Option<(SolverId, StitcherId)>,
}

impl Stitcher {
    /// Create an empty, rigid stitcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compliance of every stitch.
    #[must_use]
    pub fn with_compliance(mut self, compliance: f64) -> Self {
        self.compliance = compliance.max(0.0);
        self
    }

    /// Add a stitch. Returns its index.
    pub fn add_stitch(&mut self, particle1: usize, particle2: usize) -> usize {
        self.stitches.push((particle1, particle2));
        self.stitches.len() - 1
    }

    /// Remove a stitch by index.
    pub fn remove_stitch(&mut self, index: usize) -> Option<(usize, usize)> {
        (index < self.stitches.len()).then(|| self.stitches.remove(index))
    }

    /// Remove every stitch.
    pub fn clear(&mut self) {
        self.stitches.clear();
    }

    /// Stitches.
    #[must_use]
    pub fn stitches(&self) -> &[(usize, usize)] {
        &self.stitches
    }

    /// Stitcher handle while part of a solver.
    #[must_use]
    pub const fn handle(&self) -> Option<(SolverId, StitcherId)> {
        self.handle
    }

    /// Add the stitches to `solver`.
    ///
    /// Both actors must already be members of `solver`.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::AlreadyInSolver`] if this stitcher is already
    /// active, [`RopeError::NotInSolver`] or [`RopeError::WrongSolver`] if an
    /// actor is not a member of `solver`, and the solver error for bad
    /// particle indices. Nothing is added on error.
    pub fn add_to_solver(&mut self, solver: &mut Solver, actor1: &impl Actor, actor2: &impl Actor) -> Result<StitcherId> {
        if let Some((owner, _)) = self.handle {
            error!(solver = %owner, "stitcher is already part of a solver");
            return Err(RopeError::AlreadyInSolver(owner));
        }
        let a = actor1.solver_actor(solver)?;
        let b = actor2.solver_actor(solver)?;
        let id = solver.add_stitcher(a, b, &self.stitches, self.compliance)?;
        self.handle = Some((solver.id(), id));
        debug!(solver = %solver.id(), stitcher = %id, stitches = self.stitches.len(), "stitcher added");
        Ok(id)
    }

    /// Remove the stitches from `solver`.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::NotInSolver`] or [`RopeError::WrongSolver`].
    pub fn remove_from_solver(&mut self, solver: &mut Solver) -> Result<()> {
        let Some((owner, id)) = self.handle else {
            error!(solver = %solver.id(), "stitcher is not part of a solver");
            return Err(RopeError::NotInSolver);
        };
        if owner != solver.id() {
            error!(stitcher = %owner, solver = %solver.id(), "stitcher belongs to another solver");
            return Err(RopeError::WrongSolver {
                actor: owner,
                solver: solver.id(),
            });
        }
        // The solver drops stitchers of removed actors on its own.
        if solver.contains_stitcher(id) {
            solver.remove_stitcher(id)?;
        }
        self.handle = None;
        Ok(())
    }
}
