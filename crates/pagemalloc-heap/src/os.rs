//! Page-granular memory from the operating system.
//!
//! The heap only needs to map zeroed pages and return them later; it does not
//! care which kernel API backs them. [`PageSource`] is that seam, and
//! [`MmapPages`] is the `mmap`/`munmap` implementation used in production.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

use pagemalloc_core::FALLBACK_PAGE_SIZE;

/// Source of anonymous memory at page granularity.
///
/// # Safety
///
/// A region returned by [`PageSource::map`] must be aligned to
/// [`PageSource::page_size`], zero-filled, readable and writable for the
/// requested length, and owned exclusively by the caller until it is passed
/// back to [`PageSource::unmap`]. `map` and `unmap` must be callable from any
/// thread concurrently, and `page_size` must return the same power of two on
/// every call.
pub unsafe trait PageSource {
    /// Granularity of every mapping, in bytes.
    fn page_size(&self) -> usize;

    /// Maps `len` bytes (a multiple of the page size). `None` if the OS refuses.
    fn map(&self, len: usize) -> Option<NonNull<u8>>;

    /// Returns a region obtained from [`PageSource::map`].
    ///
    /// # Safety
    ///
    /// `base` and `len` must describe exactly one live mapping from this
    /// source, and nothing may touch that memory afterwards.
    unsafe fn unmap(&self, base: NonNull<u8>, len: usize);
}

// SAFETY: forwards to an implementation that upholds the contract.
unsafe impl<S: PageSource + ?Sized> PageSource for &S {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn map(&self, len: usize) -> Option<NonNull<u8>> {
        (**self).map(len)
    }

    unsafe fn unmap(&self, base: NonNull<u8>, len: usize) {
        // SAFETY: caller upholds the contract for the inner source.
        unsafe { (**self).unmap(base, len) }
    }
}

/// Anonymous private mappings via `mmap(2)`.
#[derive(Debug)]
pub struct MmapPages {
    /// Cached `sysconf(_SC_PAGESIZE)`; 0 until first queried.
    page_size: AtomicUsize,
    fallback_page_size: usize,
}

impl MmapPages {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_fallback_page_size(FALLBACK_PAGE_SIZE)
    }

    /// Uses `fallback` when the OS page size query fails.
    #[must_use]
    pub const fn with_fallback_page_size(fallback: usize) -> Self {
        Self {
            page_size: AtomicUsize::new(0),
            fallback_page_size: fallback,
        }
    }

    fn query_page_size(&self) -> usize {
        // SAFETY: sysconf has no memory-safety preconditions.
        let reported = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        match usize::try_from(reported) {
            Ok(size) if size > 0 && size.is_power_of_two() => size,
            _ => self.fallback_page_size,
        }
    }
}

impl Default for MmapPages {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: mmap with MAP_PRIVATE | MAP_ANONYMOUS yields fresh, zero-filled,
// page-aligned RW memory owned by nobody else; mmap/munmap are thread-safe.
unsafe impl PageSource for MmapPages {
    fn page_size(&self) -> usize {
        let cached = self.page_size.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let size = self.query_page_size();
        self.page_size.store(size, Ordering::Relaxed);
        size
    }

    fn map(&self, len: usize) -> Option<NonNull<u8>> {
        if len == 0 {
            return None;
        }
        let protection = libc::PROT_READ | libc::PROT_WRITE;
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        // SAFETY: anonymous mapping with no address hint; no existing memory is affected.
        let address = unsafe { libc::mmap(ptr::null_mut(), len, protection, flags, -1, 0) };
        if address == libc::MAP_FAILED {
            return None;
        }
        NonNull::new(address.cast())
    }

    unsafe fn unmap(&self, base: NonNull<u8>, len: usize) {
        // SAFETY: caller guarantees `base`/`len` is one live mapping from `map`.
        // A failing munmap leaves the region mapped; there is nothing to recover.
        let _ = unsafe { libc::munmap(base.as_ptr().cast(), len) };
    }
}
