//! Structured allocator lifecycle records.
//!
//! Records are `Copy` and live in a fixed-capacity ring, so recording from
//! inside `malloc` never allocates. Reads copy into a caller-provided slice.

/// Allocator lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AllocatorLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl AllocatorLogLevel {
    /// Parse from string (case-insensitive). `None` for `off` or unknown input.
    ///
    /// Does not allocate: it runs while the process-wide heap is resolving
    /// its configuration.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s = s.trim();
        [
            ("trace", Self::Trace),
            ("debug", Self::Debug),
            ("info", Self::Info),
            ("warn", Self::Warn),
            ("warning", Self::Warn),
            ("error", Self::Error),
        ]
        .into_iter()
        .find_map(|(name, level)| s.eq_ignore_ascii_case(name).then_some(level))
    }
}

/// One allocator lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Severity level.
    pub level: AllocatorLogLevel,
    /// API symbol (`malloc`, `free`, `calloc`, `realloc`).
    pub symbol: &'static str,
    /// Event kind (`slab_map`, `large_unmap`, `resize_move`, ...).
    pub event: &'static str,
    /// Address involved in the event.
    pub ptr: Option<usize>,
    /// Size value involved in the event.
    pub size: Option<usize>,
    /// Block width of the slab class, for small-object events.
    pub class: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Snapshot: live slabs after the event.
    pub live_slabs: usize,
    /// Snapshot: bytes held by live large regions after the event.
    pub live_large_bytes: usize,
}

impl AllocatorLogRecord {
    pub const EMPTY: Self = Self {
        decision_id: 0,
        level: AllocatorLogLevel::Trace,
        symbol: "",
        event: "",
        ptr: None,
        size: None,
        class: None,
        outcome: "",
        live_slabs: 0,
        live_large_bytes: 0,
    };
}

impl Default for AllocatorLogRecord {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Number of records kept before the oldest is overwritten.
pub const LIFECYCLE_LOG_CAPACITY: usize = 256;

/// Fixed-capacity ring of lifecycle records.
pub struct LifecycleLog {
    records: [AllocatorLogRecord; LIFECYCLE_LOG_CAPACITY],
    /// Slot the next record is written to.
    head: usize,
    len: usize,
    next_decision_id: u64,
}

impl LifecycleLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [AllocatorLogRecord::EMPTY; LIFECYCLE_LOG_CAPACITY],
            head: 0,
            len: 0,
            next_decision_id: 1,
        }
    }

    /// Stores `record` under a fresh decision id and returns that id.
    pub fn push(&mut self, mut record: AllocatorLogRecord) -> u64 {
        let id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        record.decision_id = id;
        self.records[self.head] = record;
        self.head = (self.head + 1) % LIFECYCLE_LOG_CAPACITY;
        self.len = (self.len + 1).min(LIFECYCLE_LOG_CAPACITY);
        id
    }

    /// Copies the most recent records into `out`, oldest first.
    ///
    /// Returns how many slots of `out` were filled.
    pub fn copy_recent(&self, out: &mut [AllocatorLogRecord]) -> usize {
        let count = out.len().min(self.len);
        let start = (self.head + LIFECYCLE_LOG_CAPACITY - count) % LIFECYCLE_LOG_CAPACITY;
        for (offset, slot) in out.iter_mut().take(count).enumerate() {
            *slot = self.records[(start + offset) % LIFECYCLE_LOG_CAPACITY];
        }
        count
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl Default for LifecycleLog {
    fn default() -> Self {
        Self::new()
    }
}
