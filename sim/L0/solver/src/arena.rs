//! Particle slot allocation.
//!
//! Every actor owns one contiguous [`ParticleRange`] of solver slots. Ranges
//! are handed out first-fit from a sorted free list; released ranges merge
//! with their free neighbours. When no free block is large enough the arena
//! grows at the end, reusing a trailing free block if there is one.

use std::ops::Range;

use crate::error::{Result, SolverError};

/// A contiguous range of solver particle slots.
///
/// Not `Clone`: a range is owned by exactly one actor and must be handed
/// back to [`ParticleArena::release`] to be reused.
#[derive(Debug, PartialEq, Eq)]
pub struct ParticleRange {
    start: usize,
    len: usize,
}

impl ParticleRange {
    /// First slot.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Number of slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the range has no slots.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last slot.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    /// Slot indices.
    #[must_use]
    pub const fn indices(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    /// Whether `slot` belongs to the range.
    #[must_use]
    pub const fn contains(&self, slot: usize) -> bool {
        slot >= self.start && slot < self.start + self.len
    }
}

/// First-fit allocator of particle slots.
#[derive(Debug, Clone)]
pub struct ParticleArena {
    capacity: usize,
    limit: usize,
    free: Vec<Range<usize>>,
}

impl Default for ParticleArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleArena {
    /// Unbounded arena.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Arena that never grows beyond `limit` slots.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            capacity: 0,
            limit,
            free: Vec::new(),
        }
    }

    /// Current number of slots, free or not.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots below the capacity.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.iter().map(ExactSizeIterator::len).sum()
    }

    /// Number of allocated slots.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.capacity - self.free_count()
    }

    /// Free blocks, sorted by start.
    #[must_use]
    pub fn free_blocks(&self) -> &[Range<usize>] {
        &self.free
    }

    /// Allocate `len` contiguous slots.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::ArenaExhausted`] if growing would exceed the
    /// limit.
    pub fn allocate(&mut self, len: usize) -> Result<ParticleRange> {
        if len == 0 {
            return Ok(ParticleRange {
                start: self.capacity,
                len: 0,
            });
        }

        if let Some(i) = self.free.iter().position(|block| block.len() >= len) {
            let block = &mut self.free[i];
            let start = block.start;
            block.start += len;
            if block.is_empty() {
                self.free.remove(i);
            }
            return Ok(ParticleRange { start, len });
        }

        // Grow, absorbing a trailing free block.
        let start = match self.free.last() {
            Some(last) if last.end == self.capacity => last.start,
            _ => self.capacity,
        };
        let new_capacity = start
            .checked_add(len)
            .filter(|&c| c <= self.limit)
            .ok_or(SolverError::ArenaExhausted {
                requested: len,
                limit: self.limit,
            })?;
        if start < self.capacity {
            self.free.pop();
        }
        self.capacity = new_capacity;
        Ok(ParticleRange { start, len })
    }

    /// Return a range to the free list.
    pub fn release(&mut self, range: ParticleRange) {
        if range.is_empty() {
            return;
        }
        let block = range.indices();
        let at = self.free.partition_point(|b| b.start < block.start);
        self.free.insert(at, block);

        // Merge with the next block, then the previous one.
        if at + 1 < self.free.len() && self.free[at].end == self.free[at + 1].start {
            let next = self.free.remove(at + 1);
            self.free[at].end = next.end;
        }
        if at > 0 && self.free[at - 1].end == self.free[at].start {
            let current = self.free.remove(at);
            self.free[at - 1].end = current.end;
        }
    }
}
