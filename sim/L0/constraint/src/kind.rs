//! Type-erased constraint batches, one variant per constraint type.

use smallvec::SmallVec;
use strand_types::{ConstraintKind, SolverBackend};

use crate::batch::{Batch, ProjectConstraint, ProjectionContext};
use crate::correction::Correction;
use crate::error::Result;
use crate::{
    BendConstraint, BendTwistConstraint, ChainConstraint, DistanceConstraint, PinConstraint, StitchConstraint,
    StretchShearConstraint,
};

/// A batch of any constraint type.
#[derive(Debug, Clone)]
pub enum ConstraintBatch {
    /// Distance constraints.
    Distance(Batch<DistanceConstraint>),
    /// Bend constraints.
    Bend(Batch<BendConstraint>),
    /// Stretch-shear constraints.
    StretchShear(Batch<StretchShearConstraint>),
    /// Bend-twist constraints.
    BendTwist(Batch<BendTwistConstraint>),
    /// Chain constraints.
    Chain(Batch<ChainConstraint>),
    /// Stitch constraints.
    Stitch(Batch<StitchConstraint>),
    /// Pin constraints.
    Pin(Batch<PinConstraint>),
}

macro_rules! each_batch {
    ($self:expr, $batch:ident => $body:expr) => {
        match $self {
            ConstraintBatch::Distance($batch) => $body,
            ConstraintBatch::Bend($batch) => $body,
            ConstraintBatch::StretchShear($batch) => $body,
            ConstraintBatch::BendTwist($batch) => $body,
            ConstraintBatch::Chain($batch) => $body,
            ConstraintBatch::Stitch($batch) => $body,
            ConstraintBatch::Pin($batch) => $body,
        }
    };
}

impl ConstraintBatch {
    /// Solver phase this batch belongs to.
    #[must_use]
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::Distance(_) => ConstraintKind::Distance,
            Self::Bend(_) => ConstraintKind::Bending,
            Self::StretchShear(_) => ConstraintKind::StretchShear,
            Self::BendTwist(_) => ConstraintKind::BendTwist,
            Self::Chain(_) => ConstraintKind::Chain,
            Self::Stitch(_) => ConstraintKind::Stitch,
            Self::Pin(_) => ConstraintKind::Pin,
        }
    }

    /// Number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        each_batch!(self, b => b.len())
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of active constraints.
    #[must_use]
    pub fn active_count(&self) -> usize {
        each_batch!(self, b => b.active_count())
    }

    /// Set the number of active constraints.
    pub fn set_active_count(&mut self, count: usize) {
        each_batch!(self, b => b.set_active_count(count));
    }

    /// Whether any constraint uses `particle`.
    #[must_use]
    pub fn uses_particle(&self, particle: usize) -> bool {
        each_batch!(self, b => b.uses_particle(particle))
    }

    /// Particles of every constraint.
    #[must_use]
    pub fn particles(&self) -> Vec<usize> {
        each_batch!(self, b => b
            .constraints()
            .iter()
            .flat_map(ProjectConstraint::particles)
            .collect())
    }

    /// Particles of the constraint at `index`.
    #[must_use]
    pub fn constraint_particles(&self, index: usize) -> Option<SmallVec<[usize; 4]>> {
        each_batch!(self, b => b.constraints().get(index).map(ProjectConstraint::particles))
    }

    /// Reset Lagrange multipliers.
    pub fn reset(&mut self) {
        each_batch!(self, b => b.reset());
    }

    /// Project active constraints.
    pub fn project(&mut self, ctx: &ProjectionContext<'_>, backend: SolverBackend) -> Vec<Correction> {
        each_batch!(self, b => b.project(ctx, backend))
    }

    /// Remap particle indices.
    ///
    /// # Errors
    ///
    /// See [`Batch::remap`].
    pub fn remap(&mut self, map: &[usize]) -> Result<()> {
        each_batch!(self, b => b.remap(map))
    }

    /// Pins of this batch that have broken, by index.
    #[must_use]
    pub fn broken_pins(&self) -> Vec<usize> {
        match self {
            Self::Pin(b) => b
                .constraints()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.broken)
                .map(|(i, _)| i)
                .collect(),
            _ => Vec::new(),
        }
    }
}

macro_rules! impl_from_batch {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<Batch<$ty>> for ConstraintBatch {
                fn from(batch: Batch<$ty>) -> Self {
                    Self::$variant(batch)
                }
            }
        )*
    };
}

impl_from_batch! {
    Distance => DistanceConstraint,
    Bend => BendConstraint,
    StretchShear => StretchShearConstraint,
    BendTwist => BendTwistConstraint,
    Chain => ChainConstraint,
    Stitch => StitchConstraint,
    Pin => PinConstraint,
}
