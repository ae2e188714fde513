//! Layout arithmetic for slabs and large regions.
//!
//! A slab is one page: a [`SLAB_HEADER_SIZE`]-byte header followed by
//! `capacity` blocks of one width.
//!
//! ```text
//! page base
//! +--------+---------+---------+-----+--------------+--------+
//! | header | block 0 | block 1 | ... | block cap-1  | unused |
//! +--------+---------+---------+-----+--------------+--------+
//!          ^ data start (16-aligned)
//! ```
//!
//! A large region is a run of whole pages whose first [`LARGE_HEADER_SIZE`]
//! bytes hold the mapped length in the word right before the user pointer.
//!
//! ```text
//! region base
//! +---------+-------------+------------------------------+
//! | padding | mapped len  | user bytes ...               |
//! +---------+-------------+------------------------------+
//!                         ^ returned pointer (16-aligned)
//! ```
//!
//! Everything here works on plain addresses so the heap can check bounds
//! before it dereferences anything.

use crate::ALIGNMENT;
use crate::occupancy::MAX_BLOCKS_PER_SLAB;
use crate::size_class::SizeClass;

/// Bytes reserved at the front of every slab page.
pub const SLAB_HEADER_SIZE: usize = 32;

/// Bytes reserved at the front of every large region.
pub const LARGE_HEADER_SIZE: usize = 16;

/// Width of the length word stored right before a large pointer.
pub const LARGE_SIZE_WORD: usize = size_of::<u64>();

const _: () = assert!(SLAB_HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(LARGE_HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(LARGE_SIZE_WORD <= LARGE_HEADER_SIZE);

/// Rounds `len` up to a multiple of `page_size`, or `None` on overflow.
#[must_use]
pub fn round_up_to_page(len: usize, page_size: usize) -> Option<usize> {
    if page_size == 0 {
        return None;
    }
    let pages = len.checked_add(page_size - 1)? / page_size;
    pages.checked_mul(page_size)
}

/// Shape of a slab for one size class on a given page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabGeometry {
    pub block_size: usize,
    pub capacity: usize,
}

impl SlabGeometry {
    /// Returns `None` when not even one block fits in a page.
    #[must_use]
    pub fn new(page_size: usize, class: SizeClass) -> Option<Self> {
        let block_size = class.block_size();
        let capacity = (page_size.checked_sub(SLAB_HEADER_SIZE)? / block_size)
            .min(MAX_BLOCKS_PER_SLAB);
        if capacity == 0 {
            return None;
        }
        Some(Self {
            block_size,
            capacity,
        })
    }

    /// Bytes covered by blocks.
    #[must_use]
    pub const fn data_len(&self) -> usize {
        self.block_size * self.capacity
    }

    /// Offset of block `index` from the slab base. `index` must be below
    /// `capacity`.
    #[must_use]
    pub const fn block_offset(&self, index: usize) -> usize {
        debug_assert!(index < self.capacity);
        SLAB_HEADER_SIZE + index * self.block_size
    }

    /// Index of the block holding `addr`, if `addr` lies in the data region.
    #[must_use]
    pub fn block_index(&self, base: usize, addr: usize) -> Option<usize> {
        let start = base.checked_add(SLAB_HEADER_SIZE)?;
        let offset = addr.checked_sub(start)?;
        if offset >= self.data_len() {
            return None;
        }
        Some(offset / self.block_size)
    }
}

/// Shape of one large region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargeGeometry {
    /// Whole mapped length, header included; a page multiple.
    pub mapped_len: usize,
}

impl LargeGeometry {
    /// Region needed to serve `size` user bytes. `None` if the length overflows.
    #[must_use]
    pub fn for_request(size: usize, page_size: usize) -> Option<Self> {
        let needed = size.checked_add(LARGE_HEADER_SIZE)?;
        let mapped_len = round_up_to_page(needed, page_size)?;
        Some(Self { mapped_len })
    }

    /// Rebuilds the geometry from a stored length word; zero means no region.
    #[must_use]
    pub fn from_header(word: u64) -> Option<Self> {
        match usize::try_from(word) {
            Ok(0) | Err(_) => None,
            Ok(mapped_len) if mapped_len < LARGE_HEADER_SIZE => None,
            Ok(mapped_len) => Some(Self { mapped_len }),
        }
    }

    /// Value written into the length word.
    #[must_use]
    pub const fn header_word(&self) -> u64 {
        self.mapped_len as u64
    }

    /// Bytes the caller may use.
    #[must_use]
    pub const fn usable(&self) -> usize {
        self.mapped_len - LARGE_HEADER_SIZE
    }

    /// Offset of the user pointer from the region base.
    #[must_use]
    pub const fn user_offset() -> usize {
        LARGE_HEADER_SIZE
    }

    /// Offset of the length word from the region base.
    #[must_use]
    pub const fn size_word_offset() -> usize {
        LARGE_HEADER_SIZE - LARGE_SIZE_WORD
    }
}
