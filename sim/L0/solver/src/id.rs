//! Solver, actor and stitcher identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NEXT_SOLVER_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies a solver. Unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverId(pub u64);

impl SolverId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_SOLVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SolverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Solver({})", self.0)
    }
}

/// Identifies an actor within a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActorId(pub u64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Actor({})", self.0)
    }
}

/// Identifies a stitcher within a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StitcherId(pub u64);

impl std::fmt::Display for StitcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stitcher({})", self.0)
    }
}

/// Thread-safe generator of unique ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next_id: AtomicU64,
}

impl IdGenerator {
    /// Generator starting at 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
        }
    }

    /// Next raw id.
    pub fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
