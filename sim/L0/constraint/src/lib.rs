//! XPBD constraints for particle ropes and rods.
//!
//! Constraints are grouped into [`Batch`]es of particle-disjoint
//! constraints of one type. Projecting a constraint yields a [`Correction`];
//! the solver sums corrections in a [`CorrectionBuffer`] and applies them
//! with per-particle averaging.
//!
//! | Constraint | Particles | Purpose |
//! |------------|-----------|---------|
//! | [`DistanceConstraint`] | 2 | Rope stretch |
//! | [`BendConstraint`] | 3 | Rope bending |
//! | [`StretchShearConstraint`] | 2 + frame | Rod stretch and shear |
//! | [`BendTwistConstraint`] | 2 frames | Rod bending and torsion |
//! | [`ChainConstraint`] | path | Inextensible chains, solved directly |
//! | [`StitchConstraint`] | 2 | Joins particles of two actors |
//! | [`PinConstraint`] | 1 | Binds a particle to a collider |
//!
//! # Compliance
//!
//! All constraints are compliant: `compliance` is inverse stiffness, scaled
//! by `1 / dt²` at projection time. Zero is rigid.
//!
//! # Example
//!
//! ```
//! use strand_constraint::{Batch, DistanceConstraint, ProjectionContext, color_constraints};
//! use strand_types::{Particle, ParticleArrays, SolverBackend};
//! use nalgebra::Point3;
//!
//! let edges = [[0, 1], [1, 2]];
//! assert_eq!(color_constraints(&edges).ok(), Some(vec![0, 1]));
//!
//! let mut particles = ParticleArrays::with_len(2);
//! particles.set(0, &Particle::pinned(Point3::origin()));
//! particles.set(1, &Particle::new(Point3::new(0.0, -2.0, 0.0), 1.0));
//!
//! let mut batch = Batch::new();
//! batch.push(DistanceConstraint::new([0, 1], 1.0)).ok();
//! let ctx = ProjectionContext::new(&particles, 1.0 / 60.0);
//! let corrections = batch.project(&ctx, SolverBackend::Serial);
//! assert!((corrections[0].positions[1].1.y - 1.0).abs() < 1e-6);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names,
    clippy::many_single_char_names,
    clippy::suboptimal_flops
)]

mod batch;
mod bend;
mod bend_twist;
mod chain;
mod coloring;
mod correction;
mod distance;
mod error;
mod kind;
mod pin;
mod stitch;
mod stretch_shear;

pub use batch::{Batch, ProjectConstraint, ProjectionContext, remap_index};
pub use bend::{BendConstraint, bend_vector, rope_bend_triples};
pub use bend_twist::BendTwistConstraint;
pub use chain::ChainConstraint;
pub use coloring::{MAX_BATCHES, color_constraints, color_path, into_batches, partition};
pub use correction::{Correction, CorrectionBuffer};
pub use distance::DistanceConstraint;
pub use error::{ConstraintError, Result};
pub use kind::ConstraintBatch;
pub use pin::PinConstraint;
pub use stitch::StitchConstraint;
pub use stretch_shear::StretchShearConstraint;
