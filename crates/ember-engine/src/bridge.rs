//! # Foreign Fence Bridge
//!
//! Hardware can only wait on native counters, so a fence from another
//! synchronization domain is shadowed: a ForeignFence-kind counter the
//! command stream waits on, completed from the foreign driver's own signal
//! callback, plus a ForeignCleanup counter the command stream bumps so
//! reclamation knows the wait was consumed.
//!
//! The signal callback runs in restricted context. It completes the shadow
//! counter, queues the deferred work and wakes waiters; the blocking pieces
//! (dropping the foreign reference, the status check) happen later on the
//! reclamation sweep.

use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, error};

use ember_core::{
    CounterKind, ForeignFence, ForeignWaiter, KernelPair, Result, WaiterStatus,
};

use crate::engine::SyncEngine;

impl SyncEngine {
    /// Shadow a set of pending foreign fences with one native kernel pair.
    ///
    /// All foreign points of one fence coalesce into a single shadow: the
    /// shadow fence counter completes when the last foreign fence signals.
    /// Returns `None` when no shadow is needed, either because nothing is
    /// pending or because every fence signaled (or broke) before a waiter
    /// could be registered. Breakage is logged and treated as no dependency.
    ///
    /// On `Some(pair)` both counters are already advanced: the caller must
    /// emit a wait on the fence counter and an update on the cleanup counter,
    /// or the pair can never be reclaimed.
    pub fn bridge_foreign(&self, foreigns: &[Arc<dyn ForeignFence>]) -> Result<Option<KernelPair>> {
        let pending: Vec<&Arc<dyn ForeignFence>> =
            foreigns.iter().filter(|f| !f.is_signaled()).collect();
        if pending.is_empty() {
            return Ok(None);
        }

        let name = pending[0].name();
        let fence = self.pool().acquire(name, CounterKind::ForeignFence)?;
        let cleanup = match self.pool().acquire(name, CounterKind::ForeignCleanup) {
            Ok(cleanup) => cleanup,
            Err(err) => {
                self.pool().release(&fence);
                return Err(err);
            }
        };
        fence.advance();
        cleanup.advance();
        let pair = KernelPair::with_cleanup(Arc::clone(&fence), Arc::clone(&cleanup));

        // Whoever decrements the count to zero completes the shadow. That
        // may be a signal callback or, for already-signaled fences, the
        // registration loop below.
        let remaining = Arc::new(AtomicUsize::new(pending.len()));
        let mut registered = 0usize;
        let mut finished_inline = false;

        for foreign in pending {
            let waiter: ForeignWaiter = {
                let remaining = Arc::clone(&remaining);
                let pair = pair.clone();
                let foreign = Arc::clone(foreign);
                let reclaim = Arc::clone(self.reclaim());
                let backend = Arc::clone(self.backend());
                alloc::boxed::Box::new(move || {
                    // Restricted context: enqueue and flag only.
                    reclaim.defer_put(foreign);
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        pair.fence().complete();
                        reclaim.defer_free(pair.clone());
                        reclaim.kick_status();
                        backend.signal_event();
                    }
                })
            };

            match foreign.wait_async(waiter) {
                WaiterStatus::Registered => registered += 1,
                status => {
                    if status == WaiterStatus::Broken {
                        error!("ember: foreign fence {} broken, ignoring", foreign.name());
                    }
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        // Every registered callback already fired; completion
                        // falls to this thread.
                        finished_inline = true;
                    }
                }
            }
        }

        if registered == 0 {
            // Nothing will ever fire; tear the shadow down here, where
            // blocking is allowed. The cleanup counter sees no update entry,
            // so it is software-completed too.
            fence.complete();
            cleanup.complete();
            self.pool().release(&fence);
            self.pool().release(&cleanup);
            debug!("ember: foreign set signaled before registration, no shadow");
            return Ok(None);
        }

        if finished_inline {
            fence.complete();
            self.reclaim().defer_free(pair.clone());
            self.reclaim().kick_status();
            self.backend().signal_event();
        }

        Ok(Some(pair))
    }
}
