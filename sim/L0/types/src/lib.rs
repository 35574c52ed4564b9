//! Core types for the strand particle simulation.
//!
//! This crate holds the data shared by every layer of the engine:
//!
//! - [`ParticleArrays`] - structure-of-arrays particle state owned by a solver
//! - [`Particle`] - a single particle description used to seed the arrays
//! - [`CollisionFilter`] - category/mask bit filter for collision pairs
//! - [`AffineTransform`] - collider-local to solver-space transforms
//! - [`Aabb`] - axis-aligned bounds used by broad phase and the BIH
//! - [`SolverConfig`] / [`ConstraintParameters`] - solver configuration
//!
//! # Units
//!
//! All quantities are SI and stored as `f64`. Gravity defaults to
//! `(0, -9.81, 0)`: the solver space is Y-up.
//!
//! # Example
//!
//! ```
//! use strand_types::{CollisionFilter, Particle, ParticleArrays};
//! use nalgebra::Point3;
//!
//! let mut particles = ParticleArrays::with_len(2);
//! particles.set(0, &Particle::new(Point3::origin(), 0.0));
//! particles.set(1, &Particle::new(Point3::new(1.0, 0.0, 0.0), 1.0));
//!
//! assert_eq!(particles.inv_masses[0], 0.0);
//! assert!(CollisionFilter::EVERYTHING.collides_with(CollisionFilter::new(0xffff, 3)));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names
)]

mod aabb;
mod config;
mod error;
mod filter;
pub mod math;
mod particle;
mod transform;

pub use aabb::Aabb;
pub use config::{
    ConstraintKind, ConstraintParameters, EvaluationOrder, SolverBackend, SolverConfig,
};
pub use error::{Result, StrandError};
pub use filter::CollisionFilter;
pub use particle::{Color, Particle, ParticleArrays, ParticleFlags, Simplex};
pub use transform::AffineTransform;

// Re-export nalgebra for downstream crates
pub use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3, Vector4};
