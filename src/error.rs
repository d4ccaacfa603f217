//! Error kinds surfaced by this crate's fallible entry points.
//!
//! Precondition violations (shape mismatches the caller could have checked
//! up front, such as an index far out of range) are asserted against in
//! debug builds rather than routed through [`Error`] — see the module docs
//! on [`crate::context`] and [`crate::ir`] for which checks are which.

use thiserror::Error;

/// Errors produced by parity-math and incremental-recovery operations.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParityError {
    /// A caller-supplied argument violates a documented precondition that is
    /// cheap to check at the call boundary (shape, length, or index).
    #[error("invalid argument: {0}")]
    InvalidArguments(String),

    /// The `(N, K)` pair is outside the range this field/construction supports.
    #[error("unsupported (N={n}, K={k}): {reason}")]
    UnsupportedShape { n: usize, k: usize, reason: &'static str },

    /// More blocks were declared failed than the code can recover.
    #[error("too many failures: {failed} failed, at most {max_recoverable} supported")]
    TooManyFailures { failed: usize, max_recoverable: usize },

    /// An incremental-recovery context was asked to register more failures
    /// than its parity budget allows.
    #[error("failure registration over capacity: {registered} registered, capacity {capacity}")]
    OverCapacity { registered: usize, capacity: usize },

    /// The survivor submatrix selected for recovery is singular: this
    /// failure pattern cannot be solved from the chosen survivors.
    #[error("recovery matrix is singular and cannot be inverted")]
    SingularMatrix,

    /// Out-of-memory during context or table construction. Retained for
    /// interface parity with callers that expect this variant to exist; this
    /// implementation relies on the allocator's own abort-on-OOM behavior and
    /// never constructs this variant itself.
    #[error("out of memory")]
    OutOfMemory,

    /// Catch-all for conditions that don't fit another variant.
    #[error("{0}")]
    Other(String),
}

impl ParityError {
    pub(crate) fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    pub(crate) fn unsupported_shape(n: usize, k: usize, reason: &'static str) -> Self {
        Self::UnsupportedShape { n, k, reason }
    }

    pub(crate) fn too_many_failures(failed: usize, max_recoverable: usize) -> Self {
        Self::TooManyFailures { failed, max_recoverable }
    }

    pub(crate) fn over_capacity(registered: usize, capacity: usize) -> Self {
        Self::OverCapacity { registered, capacity }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ParityError>;
