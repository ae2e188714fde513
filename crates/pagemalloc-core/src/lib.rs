//! # pagemalloc-core
//!
//! Safe policy layer of the pagemalloc allocator.
//!
//! Everything in here is plain arithmetic over sizes, offsets and bitmaps:
//! size classification, the per-slab occupancy word, slab and large-region
//! geometry, the error taxonomy, runtime configuration and the lifecycle log.
//! The crate never touches raw memory; `pagemalloc-heap` owns the mappings and
//! calls in here for every decision.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod log;
pub mod occupancy;
pub mod size_class;

pub use config::HeapConfig;
pub use error::AllocError;
pub use geometry::{LargeGeometry, SlabGeometry};
pub use log::{AllocatorLogLevel, AllocatorLogRecord, LifecycleLog};
pub use occupancy::Occupancy;
pub use size_class::{Route, SizeClass, classify};

/// Alignment every returned pointer satisfies.
pub const ALIGNMENT: usize = 16;

/// Page size assumed when the OS query fails.
pub const FALLBACK_PAGE_SIZE: usize = 4096;
