//! # Query Protocol
//!
//! Turns fences and reservations into the wait/update entry lists a command
//! submission carries. Entries are counted against the caller's capacity
//! before any counter is bumped or entry published, so a capacity failure
//! leaves the engine untouched and the caller simply retries with a larger
//! buffer.

use alloc::sync::Arc;
use alloc::vec::Vec;

use ember_core::{Error, ForeignFence, HwAddr, Result};
use ember_timeline::{Fence, FencePoint, Timeline};

use crate::engine::SyncEngine;
use crate::reservation::Reservation;

// =============================================================================
// SYNC OPS
// =============================================================================

/// One hardware synchronization entry: wait until, or update to, `value` at
/// counter address `addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOp {
    /// Firmware address of the counter
    pub addr: HwAddr,
    /// The value waited for or written
    pub value: u32,
}

/// Caller-capacity-bounded wait and update lists.
///
/// One capacity bounds each list independently; the query calls fail with
/// [`Error::InsufficientSpace`] rather than truncate.
pub struct QueryLists {
    waits: Vec<SyncOp>,
    updates: Vec<SyncOp>,
    capacity: usize,
}

impl QueryLists {
    /// Create lists holding at most `capacity` entries each.
    pub fn new(capacity: usize) -> Self {
        Self {
            waits: Vec::new(),
            updates: Vec::new(),
            capacity,
        }
    }

    /// The wait entries gathered so far
    #[inline]
    pub fn waits(&self) -> &[SyncOp] {
        &self.waits
    }

    /// The update entries gathered so far
    #[inline]
    pub fn updates(&self) -> &[SyncOp] {
        &self.updates
    }

    /// Fail unless both lists can take `wait_n` / `update_n` more entries.
    fn reserve(&self, wait_n: usize, update_n: usize) -> Result<()> {
        if self.waits.len() + wait_n > self.capacity
            || self.updates.len() + update_n > self.capacity
        {
            return Err(Error::InsufficientSpace);
        }
        Ok(())
    }

    fn push_wait(&mut self, addr: HwAddr, value: u32) {
        self.waits.push(SyncOp { addr, value });
    }

    fn push_update(&mut self, addr: HwAddr, value: u32) {
        self.updates.push(SyncOp { addr, value });
    }
}

// =============================================================================
// QUERIES
// =============================================================================

impl SyncEngine {
    /// Check-mode query: emit the entries that make a submission wait on
    /// `fence`.
    ///
    /// Per pending native point: a wait on its fence counter at the reserved
    /// value, and an update bumping its cleanup counter, attached lazily on
    /// the first check. The cleanup bump is how reclamation learns the check
    /// was consumed. Signaled points emit nothing.
    ///
    /// Pending foreign points coalesce into one shadow pair per call: a wait
    /// on the shadow fence counter and an update on the shadow cleanup
    /// counter.
    pub fn query_fence_check(&self, fence: &Fence, lists: &mut QueryLists) -> Result<()> {
        let mut natives = Vec::new();
        let mut foreigns: Vec<Arc<dyn ForeignFence>> = Vec::new();

        for point in fence.points() {
            match point {
                FencePoint::Native(native) if !native.has_signaled() => natives.push(native),
                FencePoint::Foreign(foreign) if !foreign.is_signaled() => {
                    foreigns.push(Arc::clone(foreign))
                }
                _ => {}
            }
        }

        let shadow = usize::from(!foreigns.is_empty());
        lists.reserve(natives.len() + shadow, natives.len() + shadow)?;

        for native in natives {
            // Unsignaled implies a kernel pair; idle points are born
            // signaled.
            let kernel = match native.data().kernel() {
                Some(kernel) => kernel,
                None => continue,
            };
            let cleanup = kernel.cleanup_or_init(|| {
                self.pool()
                    .acquire(fence.name(), ember_core::CounterKind::Cleanup)
            })?;

            lists.push_wait(kernel.fence().addr(), kernel.fence().next());
            let value = cleanup.advance();
            lists.push_update(cleanup.addr(), value);
        }

        if let Some(pair) = self.bridge_foreign(&foreigns)? {
            lists.push_wait(pair.fence().addr(), pair.fence().next());
            if let Some(cleanup) = pair.cleanup() {
                lists.push_update(cleanup.addr(), cleanup.next());
            }
        }

        Ok(())
    }

    /// Check-mode query over several fences, first-seen order. Foreign
    /// coalescing stays per fence.
    pub fn query_fences(&self, fences: &[&Fence], lists: &mut QueryLists) -> Result<()> {
        for fence in fences {
            self.query_fence_check(fence, lists)?;
        }
        Ok(())
    }

    /// Update-mode query: emit the entries through which this submission
    /// signals its reserved fence.
    ///
    /// Valid only on a reservation that has not been materialized yet; a
    /// fence's counters must not gain update entries once consumers can wait
    /// on it. Emits the bump of the fence counter, the timeline ordering
    /// wait, and the timeline update, then consumes the needs-fencing
    /// signal. For an idle reservation the timeline pair carries equal
    /// values: the fence still gets signaled, but orders after nothing.
    pub fn query_reservation_update(
        &self,
        timeline: &Arc<Timeline>,
        reservation: &Reservation,
        lists: &mut QueryLists,
    ) -> Result<()> {
        if !reservation.on_timeline(timeline) {
            return Err(Error::InvalidReservation);
        }
        let data = reservation.data().ok_or(Error::InvalidReservation)?;

        let kernel = match data.kernel() {
            Some(kernel) => kernel,
            None => return Ok(()),
        };

        lists.reserve(1, 2)?;

        lists.push_wait(timeline.sync().addr(), data.timeline_fence_value());
        let value = kernel.fence().advance();
        lists.push_update(kernel.fence().addr(), value);
        lists.push_update(timeline.sync().addr(), data.timeline_update_value());

        timeline.set_fencing_enabled(false);
        Ok(())
    }
}
