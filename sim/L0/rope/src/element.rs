//! Structural elements.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One rope or rod segment between two solver particles.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StructuralElement {
    /// First particle, solver index.
    pub particle1: usize,
    /// Second particle, solver index.
    pub particle2: usize,
    /// Rest length.
    pub rest_length: f64,
    /// Constraint force from the last step. Negative when stretched.
    pub constraint_force: f64,
    /// Tear resistance multiplier of this element.
    pub tear_resistance: f64,
}

impl StructuralElement {
    /// Create an element with unit tear resistance.
    #[must_use]
    pub const fn new(particle1: usize, particle2: usize, rest_length: f64) -> Self {
        Self {
            particle1,
            particle2,
            rest_length,
            constraint_force: 0.0,
            tear_resistance: 1.0,
        }
    }

    /// Whether `next` starts where this element ends.
    #[must_use]
    pub const fn continues_into(&self, next: &Self) -> bool {
        self.particle2 == next.particle1
    }
}

/// Split a list of elements into runs of connected particles.
///
/// Each chunk lists the particles of one continuous run. A run that wraps
/// around (the last element ends at the first particle) repeats its first
/// particle at the end.
#[must_use]
pub fn particle_chunks(elements: &[StructuralElement]) -> Vec<Vec<usize>> {
    let mut chunks: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for (i, element) in elements.iter().enumerate() {
        if current.is_empty() {
            current.push(element.particle1);
        }
        current.push(element.particle2);
        let breaks = elements.get(i + 1).is_none_or(|next| !element.continues_into(next));
        if breaks {
            chunks.push(std::mem::take(&mut current));
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_split_on_gaps() {
        let elements = [
            StructuralElement::new(0, 1, 1.0),
            StructuralElement::new(1, 2, 1.0),
            StructuralElement::new(5, 3, 1.0),
            StructuralElement::new(3, 4, 1.0),
        ];
        assert_eq!(particle_chunks(&elements), vec![vec![0, 1, 2], vec![5, 3, 4]]);
    }

    #[test]
    fn test_closed_chunk_repeats_start() {
        let elements = [
            StructuralElement::new(0, 1, 1.0),
            StructuralElement::new(1, 2, 1.0),
            StructuralElement::new(2, 0, 1.0),
        ];
        assert_eq!(particle_chunks(&elements), vec![vec![0, 1, 2, 0]]);
        assert!(particle_chunks(&[]).is_empty());
    }
}
