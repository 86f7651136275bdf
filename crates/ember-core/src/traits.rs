//! # Collaborator Traits
//!
//! Interfaces to the subsystems EMBER depends on but does not implement:
//! the GPU services backend that owns raw hardware counters and the global
//! completion event object, and fences originating in other synchronization
//! domains.

use alloc::boxed::Box;
use arrayvec::ArrayString;

use crate::error::Result;
use crate::sync::RawCounter;

// =============================================================================
// EVENT WAIT
// =============================================================================

/// Outcome of a bounded wait on the global completion event object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventWait {
    /// The event was signaled
    Signaled,
    /// The wait expired. Benign: callers re-check their condition and wait
    /// again, so a missed notification costs a redundant scan, never
    /// correctness.
    TimedOut,
}

// =============================================================================
// SYNC BACKEND
// =============================================================================

/// The GPU services backend.
///
/// Supplies raw hardware counters, the global completion event object, and
/// the status-check notification that tells the submission layer previously
/// blocked work may now proceed.
///
/// `alloc_raw`/`free_raw`/`check_status` may block and must only be called
/// from blocking-allowed context. `signal_event` is safe anywhere.
pub trait SyncBackend: Send + Sync {
    /// Allocate a hardware-visible counter.
    ///
    /// `class` is a debug label recorded against the allocation.
    fn alloc_raw(&self, class: &str) -> Result<RawCounter>;

    /// Permanently release a hardware counter.
    fn free_raw(&self, raw: RawCounter);

    /// Block the calling thread until the completion event is signaled or
    /// `timeout_ns` elapses.
    fn wait_event(&self, timeout_ns: u64) -> EventWait;

    /// Wake every thread blocked in [`SyncBackend::wait_event`].
    ///
    /// Hardware signals this on real systems; software completion paths and
    /// tests signal it directly.
    fn signal_event(&self);

    /// Notify the submission layer that a software-only dependency completed
    /// and blocked hardware work may be schedulable again.
    fn check_status(&self);
}

// =============================================================================
// FOREIGN FENCES
// =============================================================================

/// Completion waiter registered on a foreign fence.
///
/// May fire in a restricted execution context: the callback must not block,
/// and may only enqueue work for blocking-allowed context.
pub type ForeignWaiter = Box<dyn FnOnce() + Send>;

/// Result of registering a waiter on a foreign fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterStatus {
    /// The waiter was registered and will be invoked exactly once
    Registered,
    /// The fence had already signaled; the waiter was not registered
    AlreadySignaled,
    /// The fence is in an error state and will never signal
    Broken,
}

/// A fence from another synchronization domain.
///
/// EMBER cannot wait on such a fence in hardware; the bridge shadows it with
/// a native counter completed from the foreign driver's own callback.
pub trait ForeignFence: Send + Sync {
    /// Debug name of the foreign fence
    fn name(&self) -> &str;

    /// True when the fence has signaled (error states count as signaled;
    /// they will never make further progress)
    fn is_signaled(&self) -> bool;

    /// Register a completion waiter.
    ///
    /// On [`WaiterStatus::Registered`] the callback fires exactly once when
    /// the fence signals. Any other status means the waiter was dropped and
    /// the caller must tear down whatever it prepared.
    fn wait_async(&self, waiter: ForeignWaiter) -> WaiterStatus;

    /// Foreign-specific value string for debug records.
    fn value_str(&self) -> ArrayString<64>;
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wait_variants_distinct() {
        assert_ne!(EventWait::Signaled, EventWait::TimedOut);
    }

    #[test]
    fn test_waiter_status_variants_distinct() {
        assert_ne!(WaiterStatus::Registered, WaiterStatus::AlreadySignaled);
        assert_ne!(WaiterStatus::Registered, WaiterStatus::Broken);
    }
}
