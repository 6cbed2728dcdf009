//! Fixed-width category sets for categorical splits.

use crate::error::{Error, Result};

/// Set of categories routed to the left child, one bit per category.
///
/// Categories are integers in `0..=63`; category `c` is stored as bit `c`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CategoryMask(u64);

impl CategoryMask {
    /// Largest category value representable in the mask.
    pub const MAX_CATEGORY: u32 = 63;

    /// Build a mask from a list of category values.
    ///
    /// Duplicates are allowed. Any value above [`Self::MAX_CATEGORY`] is rejected.
    pub fn from_categories(categories: &[u32]) -> Result<Self> {
        let mut bits = 0u64;
        for &c in categories {
            if c > Self::MAX_CATEGORY {
                return Err(Error::validation(format!(
                    "category {c} out of range: categorical splits support categories 0..={}",
                    Self::MAX_CATEGORY
                )));
            }
            bits |= 1u64 << c;
        }
        Ok(Self(bits))
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether category `c` is in the set. Values above 63 never are.
    #[inline]
    pub fn contains(self, c: u32) -> bool {
        c <= Self::MAX_CATEGORY && (self.0 >> c) & 1 == 1
    }

    /// The complementary set within `0..=63`.
    #[inline]
    pub const fn complement(self) -> Self {
        Self(!self.0)
    }

    /// Category values in ascending order.
    pub fn categories(self) -> impl Iterator<Item = u32> {
        (0..=Self::MAX_CATEGORY).filter(move |&c| (self.0 >> c) & 1 == 1)
    }

    #[inline]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}
