//! Slab list for small allocations.
//!
//! Every slab is one mapped page whose first bytes hold a [`SlabHeader`].
//! Headers are chained through `next`, newest first, and the list owns every
//! page it links. All access goes through `&SlabList`/`&mut SlabList`, which
//! the heap only hands out while its slab lock is held.

use std::iter;
use std::ptr::NonNull;

use pagemalloc_core::geometry::{SLAB_HEADER_SIZE, SlabGeometry};
use pagemalloc_core::size_class::NUM_SIZE_CLASSES;
use pagemalloc_core::{ALIGNMENT, AllocError, Occupancy, SizeClass};

use crate::os::PageSource;

#[repr(C)]
struct SlabHeader {
    block_size: usize,
    capacity: usize,
    occupancy: Occupancy,
    next: Option<NonNull<SlabHeader>>,
}

const _: () = assert!(size_of::<SlabHeader>() <= SLAB_HEADER_SIZE);
const _: () = assert!(align_of::<SlabHeader>() <= ALIGNMENT);

impl SlabHeader {
    fn geometry(&self) -> SlabGeometry {
        SlabGeometry {
            block_size: self.block_size,
            capacity: self.capacity,
        }
    }
}

/// Handle to a live slab.
///
/// Only meaningful while the slab lock it was found under is still held;
/// after that the page may already be unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabRef {
    header: NonNull<SlabHeader>,
    geometry: SlabGeometry,
}

impl SlabRef {
    /// Address of the slab page.
    #[must_use]
    pub fn base(&self) -> usize {
        self.header.as_ptr() as usize
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.geometry.block_size
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.geometry.capacity
    }
}

/// A block handed out by [`SlabList::acquire`].
pub(crate) struct Claim {
    pub ptr: NonNull<u8>,
    pub slab: SlabRef,
    /// A new page was mapped to serve this claim.
    pub fresh_slab: bool,
}

pub(crate) struct SlabList {
    head: Option<NonNull<SlabHeader>>,
    live_per_class: [usize; NUM_SIZE_CLASSES],
    maps: u64,
    unmaps: u64,
}

// SAFETY: the list exclusively owns the pages its pointers refer to; moving it
// to another thread moves that ownership along.
unsafe impl Send for SlabList {}

impl SlabList {
    pub const fn new() -> Self {
        Self {
            head: None,
            live_per_class: [0; NUM_SIZE_CLASSES],
            maps: 0,
            unmaps: 0,
        }
    }

    fn iter(&self) -> impl Iterator<Item = NonNull<SlabHeader>> + '_ {
        // SAFETY: every linked header is a live slab owned by this list.
        iter::successors(self.head, |header| unsafe { header.as_ref().next })
    }

    pub fn live_slabs(&self) -> usize {
        self.live_per_class.iter().sum()
    }

    pub fn live_per_class(&self) -> [usize; NUM_SIZE_CLASSES] {
        self.live_per_class
    }

    pub fn maps(&self) -> u64 {
        self.maps
    }

    pub fn unmaps(&self) -> u64 {
        self.unmaps
    }

    /// Slab and block index whose data region contains `addr`.
    pub fn find(&self, addr: usize) -> Option<(SlabRef, usize)> {
        self.iter().find_map(|header| {
            // SAFETY: `header` comes from the list and is live.
            let geometry = unsafe { header.as_ref() }.geometry();
            geometry
                .block_index(header.as_ptr() as usize, addr)
                .map(|index| (SlabRef { header, geometry }, index))
        })
    }

    /// Claims the lowest free block of `class`, mapping a new slab if every
    /// slab of that class is full.
    pub fn acquire<S: PageSource>(
        &mut self,
        source: &S,
        class: SizeClass,
    ) -> Result<Claim, AllocError> {
        if let Some(claim) = self.claim_existing(class) {
            return Ok(claim);
        }

        let (header, geometry) = Self::map_slab(source, class)?;
        self.prepend(header, class);
        // SAFETY: block 0 of the fresh page was claimed by `map_slab`.
        let ptr = unsafe { header.cast::<u8>().add(geometry.block_offset(0)) };
        Ok(Claim {
            ptr,
            slab: SlabRef { header, geometry },
            fresh_slab: true,
        })
    }

    /// First-fit claim in the first non-full slab of `class`.
    fn claim_existing(&mut self, class: SizeClass) -> Option<Claim> {
        self.iter().find_map(|mut header| {
            // SAFETY: `header` comes from the list and is live; `&mut self`
            // rules out any other access to it.
            let slab = unsafe { header.as_mut() };
            if slab.block_size != class.block_size() {
                return None;
            }
            // Overflow bits are preset, so a claimed index is below capacity.
            let index = slab.occupancy.claim_first()?;
            let geometry = slab.geometry();
            // SAFETY: `block_offset` of a real block lies inside the page.
            let ptr = unsafe { header.cast::<u8>().add(geometry.block_offset(index)) };
            Some(Claim {
                ptr,
                slab: SlabRef { header, geometry },
                fresh_slab: false,
            })
        })
    }

    /// Frees block `index` of `slab`. Unmaps the slab when it becomes vacant
    /// and reports whether that happened.
    ///
    /// # Safety
    ///
    /// `slab` must have been returned by [`SlabList::find`] on this list
    /// without the list being modified since.
    pub unsafe fn release_block<S: PageSource>(
        &mut self,
        source: &S,
        slab: SlabRef,
        index: usize,
    ) -> bool {
        let mut header = slab.header;
        // SAFETY: caller guarantees `slab` is still linked.
        let header_ref = unsafe { header.as_mut() };
        header_ref.occupancy.release(index);
        if !header_ref.occupancy.is_vacant(header_ref.capacity) {
            return false;
        }

        let block_size = header_ref.block_size;
        if !self.unlink(header) {
            return false;
        }
        if let Some(class) = SizeClass::from_block_size(block_size) {
            self.live_per_class[class.index()] -= 1;
        }
        self.unmaps += 1;
        // SAFETY: the page is unlinked, so nothing reaches it any more.
        unsafe { source.unmap(header.cast(), source.page_size()) };
        true
    }

    /// Unmaps every slab, live blocks included.
    ///
    /// # Safety
    ///
    /// No block handed out from this list may be used afterwards.
    pub unsafe fn unmap_all<S: PageSource>(&mut self, source: &S) {
        let page_size = source.page_size();
        while let Some(header) = self.head {
            // SAFETY: `header` is the live list head.
            self.head = unsafe { header.as_ref().next };
            // SAFETY: unlinked above; caller guarantees no outstanding use.
            unsafe { source.unmap(header.cast(), page_size) };
            self.unmaps += 1;
        }
        self.live_per_class = [0; NUM_SIZE_CLASSES];
    }

    /// Maps and initializes a slab page with block 0 already claimed.
    fn map_slab<S: PageSource>(
        source: &S,
        class: SizeClass,
    ) -> Result<(NonNull<SlabHeader>, SlabGeometry), AllocError> {
        let page_size = source.page_size();
        let out_of_memory = AllocError::OutOfMemory {
            requested: page_size,
        };
        let geometry = SlabGeometry::new(page_size, class).ok_or(out_of_memory)?;
        let header = source.map(page_size).ok_or(out_of_memory)?.cast::<SlabHeader>();
        // SAFETY: fresh page-aligned RW mapping of at least SLAB_HEADER_SIZE bytes.
        unsafe {
            header.as_ptr().write(SlabHeader {
                block_size: geometry.block_size,
                capacity: geometry.capacity,
                occupancy: Occupancy::with_first_claimed(geometry.capacity),
                next: None,
            });
        }
        Ok((header, geometry))
    }

    fn prepend(&mut self, mut header: NonNull<SlabHeader>, class: SizeClass) {
        // SAFETY: `header` is a fresh, initialized page not yet in the list.
        unsafe { header.as_mut().next = self.head };
        self.head = Some(header);
        self.live_per_class[class.index()] += 1;
        self.maps += 1;
    }

    fn unlink(&mut self, target: NonNull<SlabHeader>) -> bool {
        let mut link = &mut self.head;
        while let Some(current) = *link {
            if current == target {
                // SAFETY: `current` is live and linked.
                *link = unsafe { current.as_ref().next };
                return true;
            }
            // SAFETY: `current` is live and linked; its `next` field is the
            // following link and nothing else borrows it.
            link = unsafe { &mut (*current.as_ptr()).next };
        }
        false
    }
}
