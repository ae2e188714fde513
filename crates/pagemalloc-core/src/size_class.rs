//! Size classes for small allocations.
//!
//! Requests up to [`MAX_SMALL_SIZE`] bytes are rounded up to one of five
//! power-of-two widths and served from slabs. Anything larger goes to the
//! large-object path.

/// Smallest block handed out by a slab (bytes).
pub const MIN_BLOCK_SIZE: usize = 64;

/// Largest request served from a slab (bytes). Above this, use the mmap path.
pub const MAX_SMALL_SIZE: usize = 1024;

/// Number of small size classes.
pub const NUM_SIZE_CLASSES: usize = 5;

const SIZE_TABLE: [usize; NUM_SIZE_CLASSES] = [64, 128, 256, 512, 1024];

/// One of the fixed slab block widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeClass(u8);

impl SizeClass {
    /// All classes, narrowest first.
    pub const ALL: [SizeClass; NUM_SIZE_CLASSES] = [
        SizeClass(0),
        SizeClass(1),
        SizeClass(2),
        SizeClass(3),
        SizeClass(4),
    ];

    /// Returns the class whose block width is exactly `block_size`.
    #[must_use]
    pub fn from_block_size(block_size: usize) -> Option<Self> {
        SIZE_TABLE
            .iter()
            .position(|&size| size == block_size)
            .map(|index| SizeClass(index as u8))
    }

    /// Block width in bytes.
    #[must_use]
    pub const fn block_size(self) -> usize {
        SIZE_TABLE[self.0 as usize]
    }

    /// Position of this class in [`SizeClass::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Routing decision for a non-zero request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Small(SizeClass),
    Large,
}

/// Classifies a request of `size` bytes.
///
/// Returns `None` for zero, which callers treat as a no-op request.
#[must_use]
pub fn classify(size: usize) -> Option<Route> {
    if size == 0 {
        return None;
    }
    if size > MAX_SMALL_SIZE {
        return Some(Route::Large);
    }
    let width = size.next_power_of_two().max(MIN_BLOCK_SIZE);
    SizeClass::from_block_size(width).map(Route::Small)
}
