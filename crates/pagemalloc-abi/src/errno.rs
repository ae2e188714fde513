//! Thread-local `errno` writes for failing allocations.

use std::ffi::c_int;

#[cfg(any(target_os = "linux", target_os = "emscripten"))]
unsafe fn errno_location() -> *mut c_int {
    // SAFETY: returns the calling thread's errno slot.
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut c_int {
    // SAFETY: returns the calling thread's errno slot.
    unsafe { libc::__error() }
}

#[cfg(any(
    target_os = "linux",
    target_os = "emscripten",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
))]
pub(crate) fn set_errno(value: c_int) {
    // SAFETY: the slot is valid and exclusive to this thread.
    unsafe { *errno_location() = value };
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "emscripten",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
pub(crate) fn set_errno(_value: c_int) {}
