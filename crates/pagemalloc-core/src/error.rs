//! Allocation failures.
//!
//! Misuse (foreign free, double free, writes past a block) is undefined
//! behavior and has no variant here: it is not detected.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The page source could not map the memory backing a request.
    #[error("out of memory: {requested} bytes could not be mapped")]
    OutOfMemory { requested: usize },
    /// `count * size` does not fit in `usize`.
    #[error("allocation size overflow: {count} x {size}")]
    Overflow { count: usize, size: usize },
}

impl AllocError {
    /// Machine-readable outcome label used in lifecycle records.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "out_of_memory",
            Self::Overflow { .. } => "overflow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_request() {
        let oom = AllocError::OutOfMemory { requested: 8192 };
        assert_eq!(
            oom.to_string(),
            "out of memory: 8192 bytes could not be mapped"
        );
        let overflow = AllocError::Overflow {
            count: usize::MAX,
            size: 2,
        };
        assert!(overflow.to_string().starts_with("allocation size overflow"));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            AllocError::OutOfMemory { requested: 1 }.outcome(),
            "out_of_memory"
        );
        assert_eq!(AllocError::Overflow { count: 1, size: 1 }.outcome(), "overflow");
    }
}
