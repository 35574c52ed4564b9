//! Integration tests for the strand crate ecosystem.
//!
//! These tests drive the whole pipeline through public APIs only:
//! - path → blueprint → actor → solver stepping
//! - XPBD constraint properties (compliance, mass weighting, coloring)
//! - collision against boxes and height fields, ray picking
//! - BIH signed distance against brute force
//! - path smoothing (decimation, Chaikin subdivision)

#![allow(
    missing_docs,
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub mod actors;
pub mod contacts;
pub mod scenarios;
pub mod smoothing;
pub mod spatial_queries;
pub mod xpbd_properties;
