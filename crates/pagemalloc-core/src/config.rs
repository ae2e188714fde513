//! Runtime configuration.
//!
//! The lifecycle log threshold is set via the `PAGEMALLOC_LOG` environment
//! variable: `off` (default), `error`, `warn`, `info`, `debug` or `trace`.
//! Unknown values mean `off`.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::FALLBACK_PAGE_SIZE;
use crate::log::AllocatorLogLevel;

/// Environment variable holding the lifecycle log threshold.
pub const LOG_ENV: &str = "PAGEMALLOC_LOG";

/// Settings a heap is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Lowest level recorded in the lifecycle log; `None` records nothing.
    pub log_level: Option<AllocatorLogLevel>,
    /// Page size used when the OS cannot report one.
    pub fallback_page_size: usize,
}

impl HeapConfig {
    pub const DEFAULT: Self = Self {
        log_level: None,
        fallback_page_size: FALLBACK_PAGE_SIZE,
    };

    #[must_use]
    pub const fn with_log_level(mut self, level: Option<AllocatorLogLevel>) -> Self {
        self.log_level = level;
        self
    }

    #[must_use]
    pub const fn with_fallback_page_size(mut self, page_size: usize) -> Self {
        self.fallback_page_size = page_size;
        self
    }

    /// Default settings with the log threshold taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::DEFAULT.with_log_level(log_level())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// Atomic cache: 0=unresolved, 1=off, 2..=6=level, 255=resolving.
// The env lookup allocates, which re-enters malloc when this crate backs the
// process allocator; a reentrant caller sees RESOLVING and gets `off`.
static CACHED_LEVEL: AtomicU8 = AtomicU8::new(0);

const LEVEL_UNRESOLVED: u8 = 0;
const LEVEL_OFF: u8 = 1;
const LEVEL_RESOLVING: u8 = 255;

fn level_to_u8(level: Option<AllocatorLogLevel>) -> u8 {
    match level {
        None => LEVEL_OFF,
        Some(AllocatorLogLevel::Trace) => 2,
        Some(AllocatorLogLevel::Debug) => 3,
        Some(AllocatorLogLevel::Info) => 4,
        Some(AllocatorLogLevel::Warn) => 5,
        Some(AllocatorLogLevel::Error) => 6,
    }
}

fn u8_to_level(v: u8) -> Option<AllocatorLogLevel> {
    match v {
        2 => Some(AllocatorLogLevel::Trace),
        3 => Some(AllocatorLogLevel::Debug),
        4 => Some(AllocatorLogLevel::Info),
        5 => Some(AllocatorLogLevel::Warn),
        6 => Some(AllocatorLogLevel::Error),
        _ => None,
    }
}

fn parse_log_env(raw: &str) -> Option<AllocatorLogLevel> {
    AllocatorLogLevel::from_str_loose(raw)
}

/// Whether [`log_level`] has finished reading the environment.
#[must_use]
pub fn log_level_resolved() -> bool {
    !matches!(
        CACHED_LEVEL.load(Ordering::Acquire),
        LEVEL_UNRESOLVED | LEVEL_RESOLVING
    )
}

/// Get the configured log threshold (reads the env var on first call, caches
/// thereafter).
#[must_use]
pub fn log_level() -> Option<AllocatorLogLevel> {
    let cached = CACHED_LEVEL.load(Ordering::Acquire);
    if cached != LEVEL_UNRESOLVED && cached != LEVEL_RESOLVING {
        return u8_to_level(cached);
    }
    if cached == LEVEL_RESOLVING {
        return None;
    }

    if CACHED_LEVEL
        .compare_exchange(
            LEVEL_UNRESOLVED,
            LEVEL_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        return u8_to_level(CACHED_LEVEL.load(Ordering::Acquire));
    }

    let level = std::env::var_os(LOG_ENV)
        .as_deref()
        .and_then(|raw| raw.to_str())
        .and_then(parse_log_env);
    CACHED_LEVEL.store(level_to_u8(level), Ordering::Release);
    level
}
