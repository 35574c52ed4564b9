//! XPBD particle solver.
//!
//! The [`Solver`] owns one structure-of-arrays particle store shared by every
//! actor. Actors reserve contiguous slot ranges from a [`ParticleArena`] and
//! contribute constraint batches expressed in their local indices; the
//! solver remaps them into solver slots. Stitchers join particles of two
//! actors.
//!
//! # Step
//!
//! ```text
//! step(dt):
//!   contacts = colliders.generate_contacts(particles, dt)
//!   for each substep h = dt / substeps:
//!     integrate (gravity, wind drag, external forces)
//!     for kind in Distance, Bending, Collision, Friction,
//!                 StretchShear, BendTwist, Chain, Stitch, Pin:
//!       repeat iterations(kind): project, accumulate, apply
//!     v = (x - x_prev) / h, damping, clamps
//!   clear external forces, sleep
//! ```
//!
//! # Example
//!
//! ```
//! use strand_constraint::{Batch, ConstraintBatch, DistanceConstraint};
//! use strand_solver::Solver;
//! use strand_types::{Particle, SolverConfig};
//! use nalgebra::Point3;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut solver = Solver::new(SolverConfig::default())?;
//! let actor = solver.add_actor(
//!     &[
//!         Particle::pinned(Point3::origin()),
//!         Particle::new(Point3::new(1.0, 0.0, 0.0), 1.0),
//!     ],
//!     0,
//! )?;
//!
//! let batch: ConstraintBatch = Batch::from_constraints([DistanceConstraint::new([0, 1], 1.0)])?.into();
//! solver.add_batches(actor, vec![batch])?;
//!
//! for _ in 0..10 {
//!     solver.step(1.0 / 60.0)?;
//! }
//! let p = solver.particles();
//! assert!(((p.positions[1] - p.positions[0]).norm() - 1.0).abs() < 1e-3);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::too_many_arguments,
    clippy::suboptimal_flops
)]

mod arena;
mod error;
mod id;
mod solver;
mod stats;

pub use arena::{ParticleArena, ParticleRange};
pub use error::{Result, SolverError};
pub use id::{ActorId, IdGenerator, SolverId, StitcherId};
pub use solver::Solver;
pub use stats::SolverStats;
