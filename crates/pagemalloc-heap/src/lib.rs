//! Slab + mmap heap.
//!
//! Requests up to 1024 bytes are served from one-page slabs holding up to 64
//! equal blocks tracked by a bitmap; larger requests get a dedicated mapping
//! with a length header in front of the returned pointer.

mod heap;
pub mod large;
mod os;
pub mod owner;
mod slab;

pub use heap::{Heap, HeapStats, MmapHeap};
pub use large::LargeRegion;
pub use os::{MmapPages, PageSource};
pub use owner::Owner;
pub use slab::SlabRef;

pub use pagemalloc_core::{AllocError, AllocatorLogLevel, AllocatorLogRecord, HeapConfig};
