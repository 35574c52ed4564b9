//! Where a rope changes length.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Placement of run-time length changes along a rope.
///
/// Lengthening splits the element at `cursor_mu`, drawing new particles from
/// the pool and copying their state from the particle nearest `source_mu`.
/// Shortening removes elements starting at the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RopeCursor {
    /// Path parameter of the element that grows or shrinks.
    pub cursor_mu: f64,
    /// Path parameter of the particle new particles are copied from.
    pub source_mu: f64,
    /// Whether new elements are inserted toward the start of the rope
    /// (`true`) or toward its end.
    pub direction: bool,
}

impl Default for RopeCursor {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl RopeCursor {
    /// Cursor at `cursor_mu` copying from `source_mu`, both clamped to
    /// `[0, 1]`.
    #[must_use]
    pub fn new(cursor_mu: f64, source_mu: f64) -> Self {
        Self {
            cursor_mu: cursor_mu.clamp(0.0, 1.0),
            source_mu: source_mu.clamp(0.0, 1.0),
            direction: true,
        }
    }

    /// Insert and remove toward the end of the rope instead.
    #[must_use]
    pub const fn reversed(mut self) -> Self {
        self.direction = !self.direction;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_clamps() {
        let cursor = RopeCursor::new(-0.5, 3.0);
        assert_eq!(cursor.cursor_mu, 0.0);
        assert_eq!(cursor.source_mu, 1.0);
        assert!(cursor.direction);
        assert!(!cursor.reversed().direction);
        assert_eq!(RopeCursor::default(), RopeCursor::new(0.0, 0.0));
    }
}
