//! The process-wide heap behind the C entry points.
//!
//! The heap lives in a `static` built by const construction, so the first
//! `malloc` of the process needs no lazy initialization. It is guarded by a
//! spin lock: `parking_lot` may allocate while parking a thread, which would
//! re-enter `malloc` while the slab lock is held.

use std::sync::atomic::{AtomicBool, Ordering};

use pagemalloc_core::{AllocatorLogRecord, HeapConfig, config};
use pagemalloc_heap::{Heap, HeapStats, MmapPages};

pub type GlobalHeap = Heap<MmapPages, spin::mutex::SpinMutex<()>>;

static GLOBAL_HEAP: GlobalHeap = Heap::mmap_backed(HeapConfig::DEFAULT);

/// Set once the `PAGEMALLOC_LOG` threshold has been copied into the heap.
static LOG_LEVEL_APPLIED: AtomicBool = AtomicBool::new(false);

/// The global heap, with the environment's log threshold applied.
pub fn global_heap() -> &'static GlobalHeap {
    if !LOG_LEVEL_APPLIED.load(Ordering::Acquire) {
        apply_env_log_level();
    }
    &GLOBAL_HEAP
}

#[cold]
fn apply_env_log_level() {
    // The env lookup allocates; a nested call sees the level as unresolved
    // and leaves the flag for the outer call to set.
    let config = HeapConfig::from_env();
    if config::log_level_resolved() && !LOG_LEVEL_APPLIED.swap(true, Ordering::AcqRel) {
        GLOBAL_HEAP.set_log_level(config.log_level);
    }
}

pub fn global_stats() -> HeapStats {
    global_heap().stats()
}

/// Copies the global heap's newest lifecycle records into `out`.
pub fn copy_recent_events(out: &mut [AllocatorLogRecord]) -> usize {
    global_heap().copy_recent_events(out)
}
