//! # EMBER Error Handling
//!
//! Unified error type for the synchronization engine.
//!
//! Error handling follows the driver-wide principles:
//! - Errors are typed and categorized
//! - No panics in production code paths
//! - Background tasks log and continue; they never surface errors to callers

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// EMBER Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// EMBER unified error type
///
/// Covers every failure the engine surfaces to a caller. Failures internal to
/// background reclamation are logged, not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Host allocation failed. Always fatal to the requesting call.
    OutOfMemory,
    /// The backend failed to allocate a hardware counter. The caller may
    /// retry later.
    PrimitiveAllocationFailed,
    /// The pool cannot issue a counter (backend exhausted).
    PoolExhausted,
    /// A reservation was used with the wrong timeline or consumed twice.
    InvalidReservation,
    /// A handle did not refer to a live engine object.
    InvalidHandle,
    /// A query or debug buffer was too small for the required entries. No
    /// partial result was produced; retry with more capacity.
    InsufficientSpace,
    /// A foreign fence was broken before a waiter could be registered.
    /// Logged and treated as "no dependency"; never fatal to a submission.
    ForeignFenceBroken,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::PrimitiveAllocationFailed => {
                write!(f, "hardware counter allocation failed")
            }
            Self::PoolExhausted => write!(f, "counter pool exhausted"),
            Self::InvalidReservation => write!(f, "invalid or consumed reservation"),
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::InsufficientSpace => write!(f, "insufficient buffer space"),
            Self::ForeignFenceBroken => write!(f, "foreign fence broken"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
