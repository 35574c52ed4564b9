//! Greedy graph coloring of constraints into disjoint batches.
//!
//! Two constraints conflict when they share a particle. Each constraint takes
//! the lowest batch not yet used by any of its particles; per-particle usage
//! is a 64-bit mask, so at most [`MAX_BATCHES`] batches exist.

use hashbrown::HashMap;
use tracing::debug;

use crate::batch::{Batch, ProjectConstraint};
use crate::error::{ConstraintError, Result};

/// Maximum number of batches produced by coloring.
pub const MAX_BATCHES: usize = 64;

/// Assign a batch index to each constraint, given the particles it uses.
///
/// Constraints sharing a particle never get the same index, and indices are
/// as low as greedy first-fit allows.
///
/// # Errors
///
/// Returns [`ConstraintError::TooManyBatches`] if a constraint conflicts
/// with all [`MAX_BATCHES`] batches.
pub fn color_constraints<P: AsRef<[usize]>>(particle_sets: &[P]) -> Result<Vec<usize>> {
    let mut used: HashMap<usize, u64> = HashMap::new();
    let mut colors = Vec::with_capacity(particle_sets.len());

    for set in particle_sets {
        let set = set.as_ref();
        let taken = set
            .iter()
            .fold(0_u64, |acc, p| acc | used.get(p).copied().unwrap_or(0));
        let color = (!taken).trailing_zeros() as usize;
        if color >= MAX_BATCHES {
            return Err(ConstraintError::TooManyBatches { max: MAX_BATCHES });
        }
        for &p in set {
            *used.entry(p).or_insert(0) |= 1_u64 << color;
        }
        colors.push(color);
    }
    Ok(colors)
}

/// Color a path-like constraint set whose closing constraints must not share
/// a batch with anything else.
///
/// `open` is colored greedily. Each entry of `closing` then gets its own
/// batch after the open ones, so closing a loop never forces a conflict
/// into an existing batch. Returned indices cover `open` then `closing`.
///
/// # Errors
///
/// Returns [`ConstraintError::TooManyBatches`] if the total exceeds
/// [`MAX_BATCHES`].
pub fn color_path<P: AsRef<[usize]>>(open: &[P], closing: &[P]) -> Result<Vec<usize>> {
    let mut colors = color_constraints(open)?;
    let first = colors.iter().max().map_or(0, |c| c + 1);
    for i in 0..closing.len() {
        let color = first + i;
        if color >= MAX_BATCHES {
            return Err(ConstraintError::TooManyBatches { max: MAX_BATCHES });
        }
        colors.push(color);
    }
    Ok(colors)
}

/// Split constraints into batches using a precomputed coloring.
///
/// # Errors
///
/// Returns [`ConstraintError::Invalid`] if `colors` and `constraints` differ
/// in length, or [`ConstraintError::SharedParticle`] if the coloring is not
/// valid.
pub fn into_batches<C: ProjectConstraint>(constraints: Vec<C>, colors: &[usize]) -> Result<Vec<Batch<C>>> {
    if colors.len() != constraints.len() {
        return Err(ConstraintError::invalid(format!(
            "{} colors for {} constraints",
            colors.len(),
            constraints.len()
        )));
    }
    let count = colors.iter().max().map_or(0, |c| c + 1);
    let mut batches: Vec<Batch<C>> = (0..count).map(|_| Batch::new()).collect();
    for (c, &color) in constraints.into_iter().zip(colors) {
        batches[color].push(c)?;
    }
    batches.retain(|b| !b.is_empty());
    Ok(batches)
}

/// Color constraints greedily and split them into batches.
///
/// # Errors
///
/// Returns [`ConstraintError::TooManyBatches`] if coloring fails.
pub fn partition<C: ProjectConstraint>(constraints: Vec<C>) -> Result<Vec<Batch<C>>> {
    let sets: Vec<_> = constraints.iter().map(ProjectConstraint::particles).collect();
    let colors = color_constraints(&sets)?;
    let batches = into_batches(constraints, &colors)?;
    debug!(constraints = sets.len(), batches = batches.len(), "partitioned constraints");
    Ok(batches)
}
