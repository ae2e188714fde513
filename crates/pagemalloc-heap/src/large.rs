//! Large allocation handling (>1024 bytes).
//!
//! Each large request gets its own mapping. The mapped length is stored in
//! the word right before the returned pointer, so freeing needs nothing but
//! the pointer itself. These paths never take the slab lock.

use std::ptr::NonNull;

use pagemalloc_core::geometry::LARGE_SIZE_WORD;
use pagemalloc_core::{AllocError, LargeGeometry};

use crate::os::PageSource;

/// A live large mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargeRegion {
    base: NonNull<u8>,
    geometry: LargeGeometry,
}

impl LargeRegion {
    /// Address of the mapping (header included).
    #[must_use]
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Whole mapped length, header included.
    #[must_use]
    pub fn mapped_len(&self) -> usize {
        self.geometry.mapped_len
    }

    /// Bytes available to the caller.
    #[must_use]
    pub fn usable(&self) -> usize {
        self.geometry.usable()
    }
}

/// Maps a region for `size` user bytes and returns the user pointer.
pub(crate) fn acquire<S: PageSource>(
    source: &S,
    size: usize,
) -> Result<(NonNull<u8>, LargeRegion), AllocError> {
    let geometry = LargeGeometry::for_request(size, source.page_size())
        .ok_or(AllocError::OutOfMemory { requested: size })?;
    let base = source
        .map(geometry.mapped_len)
        .ok_or(AllocError::OutOfMemory {
            requested: geometry.mapped_len,
        })?;

    // SAFETY: the mapping is at least one page, so both the length word and
    // the user offset are in bounds; the word is 8-aligned on a page base.
    let user = unsafe {
        base.add(LargeGeometry::size_word_offset())
            .cast::<u64>()
            .write(geometry.header_word());
        base.add(LargeGeometry::user_offset())
    };
    Ok((user, LargeRegion { base, geometry }))
}

/// Reads the region header in front of `ptr`. `None` if the word is zero.
///
/// # Safety
///
/// The [`LARGE_SIZE_WORD`] bytes before `ptr` must be readable. That holds for
/// every pointer returned by [`acquire`] that has not been released.
pub(crate) unsafe fn region_of(ptr: NonNull<u8>) -> Option<LargeRegion> {
    // SAFETY: caller guarantees the length word is readable.
    let word = unsafe {
        ptr.as_ptr()
            .sub(LARGE_SIZE_WORD)
            .cast::<u64>()
            .read_unaligned()
    };
    let geometry = LargeGeometry::from_header(word)?;
    // SAFETY: a valid header means `ptr` sits `user_offset` bytes into the region.
    let base = unsafe { ptr.sub(LargeGeometry::user_offset()) };
    Some(LargeRegion { base, geometry })
}

/// Unmaps a region, header included.
///
/// # Safety
///
/// `region` must come from [`region_of`] on a live large pointer, and no
/// pointer into it may be used afterwards.
pub(crate) unsafe fn release<S: PageSource>(source: &S, region: LargeRegion) {
    // SAFETY: caller guarantees `region` is one live mapping from `source`.
    unsafe { source.unmap(region.base, region.geometry.mapped_len) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::MmapPages;
    use pagemalloc_core::ALIGNMENT;
    use pagemalloc_core::geometry::LARGE_HEADER_SIZE;

    #[test]
    fn header_records_mapped_length() {
        let pages = MmapPages::new();
        let page = pages.page_size();
        let (ptr, region) = acquire(&pages, 4096).unwrap();
        assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
        assert_eq!(region.mapped_len() % page, 0);
        assert!(region.mapped_len() >= 4096 + LARGE_HEADER_SIZE);
        assert!(region.usable() >= 4096);

        let found = unsafe { region_of(ptr) }.unwrap();
        assert_eq!(found, region);
        assert_eq!(found.base() + LARGE_HEADER_SIZE, ptr.as_ptr() as usize);
        unsafe { release(&pages, found) };
    }

    #[test]
    fn whole_usable_range_is_writable() {
        let pages = MmapPages::new();
        let (ptr, region) = acquire(&pages, 100_000).unwrap();
        unsafe {
            let bytes = std::slice::from_raw_parts_mut(ptr.as_ptr(), region.usable());
            assert!(bytes.iter().all(|&b| b == 0));
            bytes.fill(0x5A);
            assert_eq!(region_of(ptr), Some(region));
            release(&pages, region);
        }
    }

    #[test]
    fn zero_header_is_no_region() {
        let word = [0u64; 4];
        let ptr = NonNull::from(&word[2]).cast::<u8>();
        assert_eq!(unsafe { region_of(ptr) }, None);
    }

    #[test]
    fn oversized_request_is_out_of_memory() {
        let pages = MmapPages::new();
        assert_eq!(
            acquire(&pages, usize::MAX).unwrap_err(),
            AllocError::OutOfMemory {
                requested: usize::MAX
            }
        );
    }
}
