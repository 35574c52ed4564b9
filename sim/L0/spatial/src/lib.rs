//! Spatial partitioning for nearest-surface queries.
//!
//! This crate provides:
//!
//! - [`Bih`] - a bounding interval hierarchy over any [`Bounded`] primitive,
//!   with a branch-and-bound nearest query
//! - [`TriangleMesh`] - an indexed triangle mesh with area-weighted vertex
//!   normals and a BIH, answering signed distance queries
//!
//! # Sign convention
//!
//! Signed distances are positive outside the surface and negative inside.
//! A point exactly on the surface counts as outside.
//!
//! # Example
//!
//! ```
//! use strand_spatial::TriangleMesh;
//! use nalgebra::{Point3, Vector3};
//!
//! let mesh = TriangleMesh::cuboid(Vector3::new(1.0, 1.0, 1.0));
//! let d = mesh.signed_distance(&Point3::new(0.0, 3.0, 0.0));
//! assert!((d - 2.0).abs() < 1e-9);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

mod bih;
mod mesh;

pub use bih::{Bih, BihConfig, BihNode, Bounded};
pub use mesh::{MeshTriangle, SurfaceQuery, TriangleMesh};
