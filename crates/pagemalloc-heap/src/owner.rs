//! Which allocator owns a pointer.
//!
//! `free` and the usable-size query both start here, so the slab range test
//! and the large-header fallback cannot disagree.

use std::ptr::NonNull;

use crate::large::{self, LargeRegion};
use crate::slab::{SlabList, SlabRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Block `index` of a live slab.
    SlabBlock { slab: SlabRef, index: usize },
    /// A dedicated large mapping.
    LargeRegion(LargeRegion),
    /// Not in any slab and no length header in front of it.
    Unknown,
}

impl Owner {
    /// Full capacity behind the pointer: the class width for slab blocks, the
    /// mapped length minus header for large regions, 0 when unknown.
    #[must_use]
    pub fn usable_size(&self) -> usize {
        match self {
            Self::SlabBlock { slab, .. } => slab.block_size(),
            Self::LargeRegion(region) => region.usable(),
            Self::Unknown => 0,
        }
    }
}

/// Classifies `ptr` against `slabs`, falling back to the large header.
///
/// # Safety
///
/// If `ptr` is not inside a slab, the word before it must be readable; this
/// holds for every live pointer handed out by the heap owning `slabs`.
pub(crate) unsafe fn classify(slabs: &SlabList, ptr: NonNull<u8>) -> Owner {
    if let Some((slab, index)) = slabs.find(ptr.as_ptr() as usize) {
        return Owner::SlabBlock { slab, index };
    }
    // SAFETY: forwarded from the caller.
    match unsafe { large::region_of(ptr) } {
        Some(region) => Owner::LargeRegion(region),
        None => Owner::Unknown,
    }
}
