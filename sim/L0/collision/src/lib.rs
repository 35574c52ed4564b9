//! Collision detection and response between particles and colliders.
//!
//! # Pipeline
//!
//! 1. [`ColliderWorld::generate_contacts`] runs once per step. Every simplex
//!    (one to four particles) is bounded, swept by its velocity and tested
//!    against the bounds of each enabled collider whose filter accepts it.
//! 2. For each candidate pair, [`optimize`] finds the convex combination of
//!    the simplex particles closest to the collider surface, using the
//!    collider's [`DistanceFunction`].
//! 3. Pairs that can touch within the step become [`Contact`]s.
//! 4. The solver projects contacts every substep: penetration with a
//!    clamped accumulated lambda, adhesion, then friction.
//!
//! # Shapes
//!
//! | Shape | Distance function |
//! |-------|-------------------|
//! | [`Sphere`] | analytic |
//! | [`Cuboid`] | clamp to half extents, face snap inside |
//! | [`Capsule`] | nearest point on segment |
//! | [`HeightField`] | per-cell one-sided triangles |
//! | Triangle mesh | BIH signed distance |
//!
//! Ray queries against particles live in [`ray`].

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names,
    clippy::many_single_char_names
)]

mod capsule;
mod contact;
mod cuboid;
mod distance;
mod heightfield;
mod mesh;
mod optimize;
pub mod ray;
mod shape;
mod sphere;
mod triangle;
mod world;

pub use capsule::Capsule;
pub use contact::Contact;
pub use cuboid::Cuboid;
pub use distance::{DistanceFunction, SurfacePoint, Transformed};
pub use heightfield::{HeightField, HeightFieldData};
pub use mesh::MeshShape;
pub use optimize::{OptimizationParams, SimplexPoint, optimize};
pub use ray::{Ray, RayHit};
pub use shape::{Collider, ColliderMaterial, Shape};
pub use sphere::Sphere;
pub use triangle::Triangle;
pub use world::{ColliderHandle, ColliderWorld, HeightFieldHandle, MeshHandle};
