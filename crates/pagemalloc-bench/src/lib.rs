//! Shared helpers for the pagemalloc benchmarks.

use std::ffi::c_void;

type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
type FreeFn = unsafe extern "C" fn(*mut c_void);

/// The host C library's `malloc` and `free`.
///
/// A benchmark that links `pagemalloc-abi` exports its own `malloc`, which
/// then shadows libc's for every caller in the executable. Lookups go
/// through `RTLD_NEXT` so the baseline rows keep measuring the host.
#[derive(Clone, Copy)]
pub struct SystemAllocator {
    malloc: MallocFn,
    free: FreeFn,
}

impl SystemAllocator {
    #[cfg(target_os = "linux")]
    pub fn resolve() -> Option<Self> {
        let malloc = next_symbol(c"malloc")?;
        let free = next_symbol(c"free")?;
        // SAFETY: the host exports these names with the C signatures above.
        let (malloc, free) = unsafe {
            (
                std::mem::transmute::<*mut c_void, MallocFn>(malloc),
                std::mem::transmute::<*mut c_void, FreeFn>(free),
            )
        };
        Some(Self { malloc, free })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn resolve() -> Option<Self> {
        Some(Self {
            malloc: libc::malloc,
            free: libc::free,
        })
    }

    /// # Safety
    ///
    /// Same contract as C `malloc`.
    #[inline]
    pub unsafe fn malloc(&self, size: usize) -> *mut c_void {
        // SAFETY: forwarded from the caller.
        unsafe { (self.malloc)(size) }
    }

    /// # Safety
    ///
    /// `ptr` must be null or come from [`SystemAllocator::malloc`].
    #[inline]
    pub unsafe fn free(&self, ptr: *mut c_void) {
        // SAFETY: forwarded from the caller.
        unsafe { (self.free)(ptr) }
    }
}

#[cfg(target_os = "linux")]
fn next_symbol(name: &std::ffi::CStr) -> Option<*mut c_void> {
    // SAFETY: `name` is NUL-terminated; RTLD_NEXT is a valid pseudo-handle.
    let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) };
    (!ptr.is_null()).then_some(ptr)
}
