//! Rope and rod actors for the strand XPBD solver.
//!
//! A [`Path`] of Bézier control points is sampled into a blueprint: the
//! rest particles, structural elements and graph-colored constraints of one
//! rope ([`RopeBlueprint`]) or rod ([`RodBlueprint`]). Actors load a
//! blueprint into a [`strand_solver::Solver`], tear under load, and are
//! joined by [`Stitcher`]s or pinned to colliders by [`Attachment`]s.
//! [`PathSmoother`] turns the simulated particles back into smooth frames
//! for rendering.
//!
//! ```text
//! Path ──sample──> Blueprint ──add_to_solver──> Actor ──step──> Solver
//!                                                 │               │
//!                                          tear / rebuild    particles
//!                                                                 │
//!                         PathSmoother <──────── frames ──────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use nalgebra::Point3;
//! use strand_rope::{Actor, BlueprintSettings, Path, PathSmoother, RopeActor, RopeBlueprint, RopeMaterial};
//! use strand_solver::Solver;
//! use strand_types::SolverConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = Path::polyline(&[Point3::new(0.0, 1.0, 0.0), Point3::new(1.05, 1.0, 0.0)]);
//! let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.1, 1.0))?;
//!
//! let mut solver = Solver::new(SolverConfig::default())?;
//! let mut rope = RopeActor::new(blueprint, RopeMaterial::rope());
//! rope.add_to_solver(&mut solver)?;
//! for _ in 0..30 {
//!     solver.step(1.0 / 60.0)?;
//! }
//!
//! let mut smoother = PathSmoother::new(0.01, 1);
//! smoother.generate(&solver, &rope);
//! assert!(smoother.smooth_length() > 0.0);
//! assert!(rope.strain(&solver)? < 0.05);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,
    clippy::module_name_repetitions
)]

mod actor;
mod attachment;
mod blueprint;
mod cursor;
mod element;
mod error;
mod frame;
mod material;
mod path;
mod smoother;
mod stitcher;

pub use actor::{Actor, Membership, RodActor, RopeActor, TornEvent};
pub use attachment::Attachment;
pub use blueprint::{
    BlueprintSettings, CONSTRAINT_CHUNK, ColoredConstraints, PARTICLE_CHUNK, Progress, RodBlueprint, RopeBlueprint,
};
pub use cursor::RopeCursor;
pub use element::{StructuralElement, particle_chunks};
pub use error::{Result, RopeError};
pub use frame::{PathFrame, oriented_frames, transport_frames};
pub use material::{RodMaterial, RopeMaterial};
pub use path::{ARC_LENGTH_SAMPLES, ControlPoint, DEFAULT_MASS, DEFAULT_ROTATIONAL_MASS, Path};
pub use smoother::{MAX_SMOOTHING, MIN_DECIMATION, PathSmoother, chaikin, decimate, polyline_length};
pub use stitcher::Stitcher;
