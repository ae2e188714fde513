//! ABI layer for the allocation functions (`malloc`, `free`, `calloc`,
//! `realloc`, `malloc_usable_size`).
//!
//! Every entry point forwards to the global heap. Failures come back as a
//! null pointer with `errno` set to `ENOMEM`; a zero-size request returns
//! null without touching `errno`.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use pagemalloc_core::AllocError;

use crate::errno::set_errno;
use crate::heap_state::global_heap;

#[inline]
fn into_raw(result: Result<Option<NonNull<u8>>, AllocError>) -> *mut c_void {
    match result {
        Ok(Some(ptr)) => ptr.as_ptr().cast(),
        Ok(None) => ptr::null_mut(),
        Err(_) => {
            set_errno(libc::ENOMEM);
            ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// malloc
// ---------------------------------------------------------------------------

/// C `malloc` -- allocates `size` bytes of uninitialized, 16-aligned memory.
///
/// Returns null for `size == 0` and on failure.
///
/// # Safety
///
/// Caller must eventually `free` the returned pointer exactly once.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    into_raw(global_heap().allocate(size))
}

// ---------------------------------------------------------------------------
// free
// ---------------------------------------------------------------------------

/// C `free` -- deallocates memory from `malloc`, `calloc` or `realloc`.
///
/// If `ptr` is null, no operation is performed.
///
/// # Safety
///
/// `ptr` must have been returned by this allocator and not freed already.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    // SAFETY: caller guarantees `ptr` is null or a live pointer from this heap.
    unsafe { global_heap().deallocate(NonNull::new(ptr.cast())) };
}

// ---------------------------------------------------------------------------
// calloc
// ---------------------------------------------------------------------------

/// C `calloc` -- allocates `nmemb * size` zeroed bytes.
///
/// Returns null when either operand is zero, when the product overflows, or
/// on failure.
///
/// # Safety
///
/// Caller must eventually `free` the returned pointer exactly once.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut c_void {
    into_raw(global_heap().zero_allocate(nmemb, size))
}

// ---------------------------------------------------------------------------
// realloc
// ---------------------------------------------------------------------------

/// C `realloc` -- resizes the allocation at `ptr` to `size` bytes.
///
/// A null `ptr` behaves like `malloc`; `size == 0` frees `ptr` and returns
/// null. On failure null is returned and `ptr` stays valid.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this allocator. On success the
/// old pointer must no longer be used unless it was returned again.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: caller guarantees `ptr` is null or a live pointer from this heap.
    into_raw(unsafe { global_heap().resize_allocate(NonNull::new(ptr.cast()), size) })
}

// ---------------------------------------------------------------------------
// malloc_usable_size
// ---------------------------------------------------------------------------

/// GNU `malloc_usable_size` -- bytes actually available at `ptr`.
///
/// Returns 0 for null.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this allocator.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn malloc_usable_size(ptr: *mut c_void) -> usize {
    match NonNull::new(ptr.cast::<u8>()) {
        // SAFETY: caller guarantees `ptr` is a live pointer from this heap.
        Some(ptr) => unsafe { global_heap().usable_size(ptr) },
        None => 0,
    }
}
