//! The allocator facade.
//!
//! [`Heap`] composes the size classifier, the slab list and the large-region
//! path into the four conventional entry points. One lock serializes every
//! slab-list scan and occupancy update; large mappings do not take it.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

use lock_api::{Mutex, RawMutex};
use pagemalloc_core::size_class::NUM_SIZE_CLASSES;
use pagemalloc_core::{
    AllocError, AllocatorLogLevel, AllocatorLogRecord, HeapConfig, LifecycleLog, Route, SizeClass,
    classify,
};

use crate::large::{self, LargeRegion};
use crate::os::{MmapPages, PageSource};
use crate::owner::{self, Owner};
use crate::slab::SlabList;

/// Point-in-time counters for one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub live_slabs: usize,
    /// Live slabs indexed by [`SizeClass::index`].
    pub live_slabs_per_class: [usize; NUM_SIZE_CLASSES],
    pub slab_maps: u64,
    pub slab_unmaps: u64,
    pub large_maps: u64,
    pub large_unmaps: u64,
    pub live_large_regions: usize,
    /// Mapped bytes of live large regions, headers included.
    pub live_large_bytes: usize,
}

impl HeapStats {
    /// Live slabs of `class`.
    #[must_use]
    pub fn live_slabs_of(&self, class: SizeClass) -> usize {
        self.live_slabs_per_class[class.index()]
    }
}

/// Slab + large-region allocator over a [`PageSource`].
///
/// `R` is the raw mutex guarding the slab list and the lifecycle log.
/// Dropping a heap unmaps its slabs; large regions still live at that point
/// are left mapped.
pub struct Heap<S = MmapPages, R = parking_lot::RawMutex>
where
    S: PageSource,
    R: RawMutex,
{
    source: S,
    slabs: Mutex<R, SlabList>,
    /// Mirror of the slab count for log snapshots taken without the slab lock.
    live_slabs: AtomicUsize,
    large_maps: AtomicU64,
    large_unmaps: AtomicU64,
    live_large_regions: AtomicUsize,
    live_large_bytes: AtomicUsize,
    log: Mutex<R, LifecycleLog>,
    /// 0 = off, otherwise `level_code`.
    log_level: AtomicU8,
}

/// mmap-backed heap guarded by `parking_lot`.
pub type MmapHeap = Heap<MmapPages, parking_lot::RawMutex>;

const fn level_code(level: Option<AllocatorLogLevel>) -> u8 {
    match level {
        None => 0,
        Some(AllocatorLogLevel::Trace) => 1,
        Some(AllocatorLogLevel::Debug) => 2,
        Some(AllocatorLogLevel::Info) => 3,
        Some(AllocatorLogLevel::Warn) => 4,
        Some(AllocatorLogLevel::Error) => 5,
    }
}

const fn code_level(code: u8) -> Option<AllocatorLogLevel> {
    match code {
        1 => Some(AllocatorLogLevel::Trace),
        2 => Some(AllocatorLogLevel::Debug),
        3 => Some(AllocatorLogLevel::Info),
        4 => Some(AllocatorLogLevel::Warn),
        5 => Some(AllocatorLogLevel::Error),
        _ => None,
    }
}

fn event(
    level: AllocatorLogLevel,
    symbol: &'static str,
    name: &'static str,
    outcome: &'static str,
) -> AllocatorLogRecord {
    AllocatorLogRecord {
        level,
        symbol,
        event: name,
        outcome,
        ..AllocatorLogRecord::EMPTY
    }
}

impl<R: RawMutex> Heap<MmapPages, R> {
    /// mmap-backed heap using the page-size fallback from `config`.
    #[must_use]
    pub const fn mmap_backed(config: HeapConfig) -> Self {
        Self::with_config(
            MmapPages::with_fallback_page_size(config.fallback_page_size),
            config,
        )
    }
}

impl<R: RawMutex> Default for Heap<MmapPages, R> {
    fn default() -> Self {
        Self::mmap_backed(HeapConfig::DEFAULT)
    }
}

impl<S: PageSource, R: RawMutex> Heap<S, R> {
    #[must_use]
    pub const fn new(source: S) -> Self {
        Self::with_config(source, HeapConfig::DEFAULT)
    }

    #[must_use]
    pub const fn with_config(source: S, config: HeapConfig) -> Self {
        Self {
            source,
            slabs: Mutex::const_new(R::INIT, SlabList::new()),
            live_slabs: AtomicUsize::new(0),
            large_maps: AtomicU64::new(0),
            large_unmaps: AtomicU64::new(0),
            live_large_regions: AtomicUsize::new(0),
            live_large_bytes: AtomicUsize::new(0),
            log: Mutex::const_new(R::INIT, LifecycleLog::new()),
            log_level: AtomicU8::new(level_code(config.log_level)),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Slab size and large-region granularity.
    pub fn page_size(&self) -> usize {
        self.source.page_size()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Allocates `size` bytes, 16-aligned. `Ok(None)` for a zero-size request.
    pub fn allocate(&self, size: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        self.allocate_as("malloc", size)
    }

    /// Allocates `count * size` zeroed bytes.
    pub fn zero_allocate(
        &self,
        count: usize,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(total) = count.checked_mul(size) else {
            self.record(AllocatorLogRecord {
                size: Some(size),
                ..event(AllocatorLogLevel::Warn, "calloc", "overflow", "overflow")
            });
            return Err(AllocError::Overflow { count, size });
        };
        let ptr = self.allocate_as("calloc", total)?;
        if let Some(ptr) = ptr {
            // SAFETY: `ptr` is a fresh block of at least `total` bytes.
            unsafe { ptr::write_bytes(ptr.as_ptr(), 0, total) };
        }
        Ok(ptr)
    }

    /// Frees `ptr`. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this heap and not freed since.
    pub unsafe fn deallocate(&self, ptr: Option<NonNull<u8>>) {
        if let Some(ptr) = ptr {
            // SAFETY: forwarded from the caller.
            unsafe { self.release_as("free", ptr) };
        }
    }

    /// Resizes `ptr` to hold `size` bytes.
    ///
    /// `None` behaves like [`Heap::allocate`]; `size == 0` frees and returns
    /// `Ok(None)`. A request that still fits the current block returns `ptr`
    /// unchanged. Otherwise the contents move to a new block; if that
    /// allocation fails, `ptr` is left untouched and stays valid.
    ///
    /// # Safety
    ///
    /// `ptr` must be `None` or a live pointer returned by this heap.
    pub unsafe fn resize_allocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(old) = ptr else {
            return self.allocate_as("realloc", size);
        };
        let Some(route) = classify(size) else {
            // SAFETY: forwarded from the caller.
            unsafe { self.release_as("realloc", old) };
            return Ok(None);
        };

        // SAFETY: forwarded from the caller.
        let old_usable = unsafe { self.usable_size(old) };
        if old_usable >= size {
            self.record(AllocatorLogRecord {
                ptr: Some(old.as_ptr() as usize),
                size: Some(size),
                ..event(AllocatorLogLevel::Trace, "realloc", "resize_in_place", "ok")
            });
            return Ok(Some(old));
        }

        let new = self.allocate_routed("realloc", route, size)?;
        // SAFETY: `old` holds `old_usable` bytes, `new` at least `size`, and
        // they are distinct live blocks.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_usable.min(size)) };
        // SAFETY: forwarded from the caller; the contents now live in `new`.
        unsafe { self.release_as("realloc", old) };
        self.record(AllocatorLogRecord {
            ptr: Some(new.as_ptr() as usize),
            size: Some(size),
            ..event(AllocatorLogLevel::Debug, "realloc", "resize_move", "ok")
        });
        Ok(Some(new))
    }

    /// Bytes usable at `ptr`: the class width for slab blocks, the mapped
    /// length minus header for large regions, 0 when the owner is unknown.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        // SAFETY: forwarded from the caller.
        unsafe { self.owner_of(ptr) }.usable_size()
    }

    /// Owner of `ptr` at the time of the call.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn owner_of(&self, ptr: NonNull<u8>) -> Owner {
        let slabs = self.slabs.lock();
        // SAFETY: forwarded from the caller.
        unsafe { owner::classify(&slabs, ptr) }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> HeapStats {
        let slabs = self.slabs.lock();
        HeapStats {
            live_slabs: slabs.live_slabs(),
            live_slabs_per_class: slabs.live_per_class(),
            slab_maps: slabs.maps(),
            slab_unmaps: slabs.unmaps(),
            large_maps: self.large_maps.load(Ordering::Relaxed),
            large_unmaps: self.large_unmaps.load(Ordering::Relaxed),
            live_large_regions: self.live_large_regions.load(Ordering::Relaxed),
            live_large_bytes: self.live_large_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn log_level(&self) -> Option<AllocatorLogLevel> {
        code_level(self.log_level.load(Ordering::Relaxed))
    }

    /// Changes the lifecycle log threshold; `None` stops recording.
    pub fn set_log_level(&self, level: Option<AllocatorLogLevel>) {
        self.log_level.store(level_code(level), Ordering::Relaxed);
    }

    /// Copies the newest lifecycle records into `out`, oldest first.
    pub fn copy_recent_events(&self, out: &mut [AllocatorLogRecord]) -> usize {
        self.log.lock().copy_recent(out)
    }

    pub fn clear_events(&self) {
        self.log.lock().clear();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn allocate_as(
        &self,
        symbol: &'static str,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        match classify(size) {
            Some(route) => self.allocate_routed(symbol, route, size).map(Some),
            None => Ok(None),
        }
    }

    fn allocate_routed(
        &self,
        symbol: &'static str,
        route: Route,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let result = match route {
            Route::Small(class) => self.acquire_small(symbol, class),
            Route::Large => self.acquire_large(symbol, size),
        };
        match result {
            Ok(ptr) => {
                self.record(AllocatorLogRecord {
                    ptr: Some(ptr.as_ptr() as usize),
                    size: Some(size),
                    ..event(AllocatorLogLevel::Trace, symbol, "alloc", "ok")
                });
                Ok(ptr)
            }
            Err(err) => {
                self.record(AllocatorLogRecord {
                    size: Some(size),
                    ..event(AllocatorLogLevel::Warn, symbol, "alloc_failed", err.outcome())
                });
                Err(err)
            }
        }
    }

    fn acquire_small(
        &self,
        symbol: &'static str,
        class: SizeClass,
    ) -> Result<NonNull<u8>, AllocError> {
        let claim = {
            let mut slabs = self.slabs.lock();
            let claim = slabs.acquire(&self.source, class)?;
            if claim.fresh_slab {
                self.live_slabs.store(slabs.live_slabs(), Ordering::Relaxed);
            }
            claim
        };
        if claim.fresh_slab {
            self.record(AllocatorLogRecord {
                ptr: Some(claim.slab.base()),
                size: Some(self.source.page_size()),
                class: Some(class.block_size()),
                ..event(AllocatorLogLevel::Debug, symbol, "slab_map", "ok")
            });
        }
        Ok(claim.ptr)
    }

    fn acquire_large(&self, symbol: &'static str, size: usize) -> Result<NonNull<u8>, AllocError> {
        let (ptr, region) = large::acquire(&self.source, size)?;
        self.large_maps.fetch_add(1, Ordering::Relaxed);
        self.live_large_regions.fetch_add(1, Ordering::Relaxed);
        self.live_large_bytes
            .fetch_add(region.mapped_len(), Ordering::Relaxed);
        self.record(AllocatorLogRecord {
            ptr: Some(region.base()),
            size: Some(region.mapped_len()),
            ..event(AllocatorLogLevel::Debug, symbol, "large_map", "ok")
        });
        Ok(ptr)
    }

    /// # Safety
    ///
    /// `ptr` must be a live pointer returned by this heap.
    unsafe fn release_as(&self, symbol: &'static str, ptr: NonNull<u8>) {
        let mut slabs = self.slabs.lock();
        // SAFETY: forwarded from the caller.
        match unsafe { owner::classify(&slabs, ptr) } {
            Owner::SlabBlock { slab, index } => {
                // SAFETY: `slab` was found under the lock we still hold.
                let unmapped = unsafe { slabs.release_block(&self.source, slab, index) };
                if unmapped {
                    self.live_slabs.store(slabs.live_slabs(), Ordering::Relaxed);
                }
                drop(slabs);
                self.record(AllocatorLogRecord {
                    ptr: Some(ptr.as_ptr() as usize),
                    class: Some(slab.block_size()),
                    ..event(AllocatorLogLevel::Trace, symbol, "free", "ok")
                });
                if unmapped {
                    self.record(AllocatorLogRecord {
                        ptr: Some(slab.base()),
                        size: Some(self.source.page_size()),
                        class: Some(slab.block_size()),
                        ..event(AllocatorLogLevel::Debug, symbol, "slab_unmap", "ok")
                    });
                }
            }
            Owner::LargeRegion(region) => {
                drop(slabs);
                // SAFETY: `region` describes the live mapping behind `ptr`.
                unsafe { self.release_large(symbol, region) };
            }
            Owner::Unknown => {
                drop(slabs);
                self.record(AllocatorLogRecord {
                    ptr: Some(ptr.as_ptr() as usize),
                    ..event(AllocatorLogLevel::Warn, symbol, "free", "unknown_owner")
                });
            }
        }
    }

    /// # Safety
    ///
    /// `region` must describe a live large mapping of this heap.
    unsafe fn release_large(&self, symbol: &'static str, region: LargeRegion) {
        // SAFETY: forwarded from the caller.
        unsafe { large::release(&self.source, region) };
        self.large_unmaps.fetch_add(1, Ordering::Relaxed);
        self.live_large_regions.fetch_sub(1, Ordering::Relaxed);
        self.live_large_bytes
            .fetch_sub(region.mapped_len(), Ordering::Relaxed);
        self.record(AllocatorLogRecord {
            ptr: Some(region.base()),
            size: Some(region.mapped_len()),
            ..event(AllocatorLogLevel::Debug, symbol, "large_unmap", "ok")
        });
    }

    fn record(&self, mut record: AllocatorLogRecord) {
        let threshold = self.log_level.load(Ordering::Relaxed);
        if threshold == 0 || level_code(Some(record.level)) < threshold {
            return;
        }
        record.live_slabs = self.live_slabs.load(Ordering::Relaxed);
        record.live_large_bytes = self.live_large_bytes.load(Ordering::Relaxed);
        self.log.lock().push(record);
    }
}

impl<S: PageSource, R: RawMutex> Drop for Heap<S, R> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no thread can still be using a block.
        unsafe { self.slabs.get_mut().unmap_all(&self.source) };
    }
}
