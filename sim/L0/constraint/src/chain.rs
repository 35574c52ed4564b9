//! Chain constraints solved exactly along a path.
//!
//! A chain constrains every edge of a particle path to be no longer than
//! `tightness * rest_length`. All edge constraints are solved together: the
//! system `J W Jᵀ λ = C` is tridiagonal for a path and is solved directly
//! with the Thomas algorithm. Closed chains repeat their first particle at
//! the end of the path.

use nalgebra::Vector3;
use smallvec::SmallVec;
use strand_types::math::EPSILON;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{ProjectConstraint, ProjectionContext, remap_index};
use crate::correction::Correction;
use crate::error::{ConstraintError, Result};

/// Inextensible chain over a particle path.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainConstraint {
    /// Path particles. A closed chain ends with its first particle.
    pub particles: Vec<usize>,
    /// Rest length of each edge, one fewer than `particles`.
    pub rest_lengths: Vec<f64>,
    /// Fraction of the rest length each edge may reach.
    pub tightness: f64,
}

impl ChainConstraint {
    /// Create a chain.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::Invalid`] if the chain has fewer than two
    /// particles or the edge count does not match.
    pub fn new(particles: Vec<usize>, rest_lengths: Vec<f64>, tightness: f64) -> Result<Self> {
        if particles.len() < 2 {
            return Err(ConstraintError::invalid("chain needs at least two particles"));
        }
        if rest_lengths.len() + 1 != particles.len() {
            return Err(ConstraintError::invalid(format!(
                "chain of {} particles needs {} rest lengths, got {}",
                particles.len(),
                particles.len() - 1,
                rest_lengths.len()
            )));
        }
        Ok(Self {
            particles,
            rest_lengths,
            tightness: tightness.max(0.0),
        })
    }

    /// Whether the path closes on itself.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.particles.len() > 2 && self.particles.first() == self.particles.last()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.rest_lengths.len()
    }
}

impl ProjectConstraint for ChainConstraint {
    fn particles(&self) -> SmallVec<[usize; 4]> {
        let mut particles = SmallVec::from_slice(&self.particles);
        if self.is_closed() {
            particles.pop();
        }
        particles
    }

    fn reset(&mut self) {}

    fn project(&mut self, ctx: &ProjectionContext<'_>) -> Correction {
        let p = ctx.particles;
        let edges = self.edge_count();
        let w: Vec<f64> = self.particles.iter().map(|&i| p.inv_masses[i]).collect();

        let mut normals = Vec::with_capacity(edges);
        let mut rhs = Vec::with_capacity(edges);
        let mut error: f64 = 0.0;
        for e in 0..edges {
            let diff = p.positions[self.particles[e]] - p.positions[self.particles[e + 1]];
            let d = diff.norm();
            let max = self.tightness * self.rest_lengths[e];
            let violation = (d - max).max(0.0);
            error = error.max(violation.abs());
            normals.push(diff / (d + EPSILON));
            rhs.push(violation);
        }
        if error <= 0.0 {
            return Correction::default();
        }

        // Forward sweep.
        let mut upper = vec![0.0; edges];
        let mut solved = vec![0.0; edges];
        for e in 0..edges {
            let diagonal = w[e] + w[e + 1];
            let lower = if e > 0 { -w[e] * normals[e].dot(&normals[e - 1]) } else { 0.0 };
            let super_diagonal = if e + 1 < edges {
                -w[e + 1] * normals[e].dot(&normals[e + 1])
            } else {
                0.0
            };
            let (prev_upper, prev_solved) = if e > 0 { (upper[e - 1], solved[e - 1]) } else { (0.0, 0.0) };
            let pivot = diagonal - lower * prev_upper;
            if pivot.abs() < EPSILON {
                continue;
            }
            upper[e] = super_diagonal / pivot;
            solved[e] = (rhs[e] - lower * prev_solved) / pivot;
        }

        // Back substitution.
        for e in (0..edges.saturating_sub(1)).rev() {
            solved[e] -= upper[e] * solved[e + 1];
        }

        let mut correction = Correction::with_error(error);
        for (k, &particle) in self.particles.iter().enumerate() {
            if w[k] <= 0.0 {
                continue;
            }
            let mut delta = Vector3::zeros();
            if k > 0 {
                delta -= normals[k - 1] * solved[k - 1];
            }
            if k < edges {
                delta += normals[k] * solved[k];
            }
            correction.push_position(particle, -delta * w[k]);
        }
        correction
    }

    fn remap(&mut self, map: &[usize]) -> Result<()> {
        for p in &mut self.particles {
            *p = remap_index(*p, map)?;
        }
        Ok(())
    }
}
