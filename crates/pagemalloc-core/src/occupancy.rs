//! Per-slab occupancy bitmap.
//!
//! Bit `i` set means block `i` is live. A slab holds at most
//! [`MAX_BLOCKS_PER_SLAB`] blocks; bits at or above the slab's capacity are set
//! when the bitmap is created and never cleared, so the first-fit search can
//! only land on a real block.

/// Width of the occupancy word.
pub const MAX_BLOCKS_PER_SLAB: usize = u64::BITS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Occupancy(u64);

impl Occupancy {
    /// Bits that do not correspond to a block for a slab of `capacity` blocks.
    #[must_use]
    pub const fn overflow_mask(capacity: usize) -> u64 {
        if capacity >= MAX_BLOCKS_PER_SLAB {
            0
        } else {
            u64::MAX << capacity
        }
    }

    /// Fresh bitmap with every real block free.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self(Self::overflow_mask(capacity))
    }

    /// Fresh bitmap with block 0 live, for a slab mapped to serve a claim.
    /// `capacity` must be at least 1.
    #[must_use]
    pub const fn with_first_claimed(capacity: usize) -> Self {
        let mut occupancy = Self::with_capacity(capacity);
        occupancy.0 |= 1;
        occupancy
    }

    /// Raw word, overflow bits included.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// No block left to claim.
    #[must_use]
    pub const fn is_full(self) -> bool {
        self.0 == u64::MAX
    }

    /// No real block is live.
    #[must_use]
    pub const fn is_vacant(self, capacity: usize) -> bool {
        self.0 == Self::overflow_mask(capacity)
    }

    /// Claims the lowest free block and returns its index.
    pub fn claim_first(&mut self) -> Option<usize> {
        let index = (!self.0).trailing_zeros() as usize;
        if index >= MAX_BLOCKS_PER_SLAB {
            return None;
        }
        self.0 |= 1u64 << index;
        Some(index)
    }

    /// Clears block `index`. Returns whether it was live.
    pub fn release(&mut self, index: usize) -> bool {
        if index >= MAX_BLOCKS_PER_SLAB {
            return false;
        }
        let bit = 1u64 << index;
        let was_live = self.0 & bit != 0;
        self.0 &= !bit;
        was_live
    }
}
