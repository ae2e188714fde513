// Allocator exports take raw pointers straight from C callers; their contract
// is the C one, so per-function safety sections would only repeat it.
#![allow(clippy::missing_safety_doc)]
//! # pagemalloc-abi
//!
//! `extern "C"` allocation entry points over one process-wide
//! [`pagemalloc_heap::Heap`]. Built as a `cdylib`, the library can be
//! preloaded to replace the system `malloc` family:
//!
//! ```text
//! LD_PRELOAD=target/release/libpagemalloc_abi.so <program>
//! ```
//!
//! Symbols are only exported unmangled in release builds, so debug test
//! binaries keep the system allocator and call these functions by path.

pub mod heap_state;

// Exports `malloc`/`free` unmangled in release; kept out of unit-test builds
// so the test harness never allocates through it.
#[cfg(not(test))]
mod errno;
#[cfg(not(test))]
pub mod malloc_abi;
