//! Category/mask collision filters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 32-bit collision filter.
///
/// The low 16 bits hold the category (a single bit), the high 16 bits hold
/// the mask of categories this entity collides with.
///
/// ```text
///  31            16 15             0
/// ┌────────────────┬────────────────┐
/// │      mask      │    category    │
/// └────────────────┴────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionFilter(pub u32);

impl CollisionFilter {
    /// Mask value that collides with every category.
    pub const COLLIDE_WITH_EVERYTHING: u16 = 0xffff;

    /// Mask value that collides with nothing.
    pub const COLLIDE_WITH_NOTHING: u16 = 0;

    /// Category 0, colliding with everything.
    pub const EVERYTHING: Self = Self::new(Self::COLLIDE_WITH_EVERYTHING, 0);

    const CATEGORY_BITS: u32 = 0x0000_ffff;
    const MASK_BITS: u32 = 0xffff_0000;

    /// Build a filter from a mask and a category index in `0..16`.
    ///
    /// Category indices above 15 are clamped to 15.
    #[must_use]
    pub const fn new(mask: u16, category: u8) -> Self {
        let category = if category > 15 { 15 } else { category };
        Self(((mask as u32) << 16) | (1 << category))
    }

    /// Category bit of this filter.
    #[must_use]
    pub const fn category_bits(self) -> u16 {
        (self.0 & Self::CATEGORY_BITS) as u16
    }

    /// Mask of categories this filter collides with.
    #[must_use]
    pub const fn mask(self) -> u16 {
        ((self.0 & Self::MASK_BITS) >> 16) as u16
    }

    /// Category index (position of the lowest category bit).
    #[must_use]
    pub const fn category(self) -> u8 {
        self.category_bits().trailing_zeros() as u8
    }

    /// Whether two filters accept each other.
    #[must_use]
    pub const fn collides_with(self, other: Self) -> bool {
        (self.mask() & other.category_bits()) != 0 && (other.mask() & self.category_bits()) != 0
    }
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::EVERYTHING
    }
}
