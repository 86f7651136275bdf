//! # Reclamation Queue
//!
//! Two deferred queues with different construction rules:
//!
//! - **defer-free**: kernel pairs whose last payload reference dropped but
//!   whose counters hardware may still write. A pair leaves the queue only
//!   when its fence counter is met and any cleanup counter is met too.
//! - **defer-put**: foreign fence references. Dropping one may block inside
//!   the foreign driver, which is illegal from a signal callback, so the drop
//!   is re-queued here and performed by the sweep.
//!
//! Enqueueing is lock-bounded and safe from any context; the sweep itself
//! runs only from contexts that may block.

use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{error, info};

use ember_core::{EventWait, ForeignFence, KernelPair, SyncBackend};
use ember_pool::CounterPool;

// =============================================================================
// CONSTANTS
// =============================================================================

/// How long one sweep pass waits for a hardware progress event before
/// rescanning.
pub const RECLAIM_WAIT_NS: u64 = 100_000_000;

/// Passes a blocking drain attempts before giving up and reporting the stuck
/// pairs. Generous: a healthy device retires work well inside one wait.
const DRAIN_MAX_PASSES: u32 = 600;

// =============================================================================
// TYPES
// =============================================================================

/// Outcome of a sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Both queues are empty
    Empty,
    /// Kernel pairs remain that are not yet reclaimable
    Pending,
}

/// Queue counters, reported by the debug dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReclaimStats {
    /// Kernel pairs currently parked
    pub pending_pairs: usize,
    /// Foreign references awaiting their deferred drop
    pub pending_puts: usize,
    /// Pairs retired to the pool over the queue's lifetime
    pub reclaimed: u64,
}

// =============================================================================
// RECLAIM QUEUE
// =============================================================================

/// Deferred reclamation queue feeding a [`CounterPool`].
pub struct ReclaimQueue {
    pool: Arc<CounterPool>,
    backend: Arc<dyn SyncBackend>,
    pending: spin::Mutex<Vec<KernelPair>>,
    puts: spin::Mutex<Vec<Arc<dyn ForeignFence>>>,
    status_kick: AtomicBool,
    reclaimed: spin::Mutex<u64>,
}

impl ReclaimQueue {
    /// Create a queue retiring counters into `pool`.
    pub fn new(pool: Arc<CounterPool>, backend: Arc<dyn SyncBackend>) -> Self {
        Self {
            pool,
            backend,
            pending: spin::Mutex::new(Vec::new()),
            puts: spin::Mutex::new(Vec::new()),
            status_kick: AtomicBool::new(false),
            reclaimed: spin::Mutex::new(0),
        }
    }

    /// Park a kernel pair until hardware is done with its counters.
    ///
    /// Safe from any context; only appends under the queue lock.
    pub fn defer_free(&self, pair: KernelPair) {
        self.pending.lock().push(pair);
    }

    /// Park a foreign fence reference for a deferred drop.
    ///
    /// Safe from any context, including foreign signal callbacks.
    pub fn defer_put(&self, fence: Arc<dyn ForeignFence>) {
        self.puts.lock().push(fence);
    }

    /// Request a submission-layer status check from the next sweep.
    ///
    /// `SyncBackend::check_status` may block, so restricted contexts set only
    /// this flag.
    pub fn kick_status(&self) {
        self.status_kick.store(true, Ordering::Release);
    }

    /// One sweep pass. May block only through the pool backend's free path.
    ///
    /// Retires every reclaimable pair to the pool and performs all deferred
    /// foreign drops. Pool releases and foreign drops happen outside the
    /// queue locks.
    pub fn process_once(&self) -> DrainState {
        let ready: Vec<KernelPair> = {
            let mut pending = self.pending.lock();
            let mut ready = Vec::new();
            let mut i = 0;
            while i < pending.len() {
                if pending[i].is_reclaimable() {
                    ready.push(pending.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            ready
        };

        if !ready.is_empty() {
            *self.reclaimed.lock() += ready.len() as u64;
        }

        for pair in ready {
            self.pool.release(pair.fence());
            if let Some(cleanup) = pair.cleanup() {
                self.pool.release(&cleanup);
            }
        }

        let puts = mem::take(&mut *self.puts.lock());
        // Foreign releases may block; this is the context that is allowed to.
        drop(puts);

        if self.status_kick.swap(false, Ordering::AcqRel) {
            self.backend.check_status();
        }

        if self.pending.lock().is_empty() {
            DrainState::Empty
        } else {
            DrainState::Pending
        }
    }

    /// Sweep until both queues are empty, waiting on hardware progress events
    /// between passes. Blocking; teardown and shutdown paths only.
    pub fn drain(&self) -> DrainState {
        for _ in 0..DRAIN_MAX_PASSES {
            if self.process_once() == DrainState::Empty {
                return DrainState::Empty;
            }
            if self.backend.wait_event(RECLAIM_WAIT_NS) == EventWait::TimedOut {
                // A missed event is not fatal, but poke the backend so a
                // wedged device gets noticed.
                self.backend.check_status();
            }
        }

        error!(
            "ember-reclaim: drain gave up with {} pairs outstanding",
            self.pending.lock().len()
        );
        DrainState::Pending
    }

    /// Current queue counters
    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            pending_pairs: self.pending.lock().len(),
            pending_puts: self.puts.lock().len(),
            reclaimed: *self.reclaimed.lock(),
        }
    }

    /// Log every parked pair that is still blocking reclamation.
    pub fn dump(&self) {
        let pending = self.pending.lock();
        info!("ember-reclaim: {} pairs parked", pending.len());
        for pair in pending.iter() {
            info!("\t{:?}", pair);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
