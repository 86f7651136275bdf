//! # Two-Phase Reservation
//!
//! Fence creation is split so a submission can fail cleanly after its fence
//! values are already baked into the command stream plan:
//!
//! 1. `alloc_fence` reserves: snapshots the timeline, advances it, builds the
//!    payload.
//! 2. `create_fence` materializes the reserved payload into a real fence, or
//!    `abandon_reservation` rolls the work back when the submission fails.
//!
//! Reservation calls against one timeline must be serialized by the caller
//! (the session owner); the timeline's next value is read and advanced as two
//! steps.

use alloc::sync::{Arc, Weak};

use log::{debug, warn};

use ember_core::{CounterKind, Error, KernelPair, Name, Result, SyncData};
use ember_timeline::{Fence, SyncPoint, Timeline};

use crate::engine::SyncEngine;

/// A reserved, not-yet-materialized fence.
///
/// Consumed exactly once, by `create_fence` or `abandon_reservation`.
/// Dropping an unconsumed reservation leaks its counters until engine
/// shutdown; the drop handler logs it.
#[must_use]
#[derive(Debug)]
pub struct Reservation {
    data: Option<Arc<SyncData>>,
    timeline: Weak<Timeline>,
}

impl Reservation {
    fn new(data: Arc<SyncData>, timeline: &Arc<Timeline>) -> Self {
        Self {
            data: Some(data),
            timeline: Arc::downgrade(timeline),
        }
    }

    /// The reserved payload, if not yet consumed
    pub(crate) fn data(&self) -> Option<&Arc<SyncData>> {
        self.data.as_ref()
    }

    /// Timeline value this reservation waits on, while unconsumed
    pub fn timeline_fence_value(&self) -> Option<u32> {
        self.data.as_ref().map(|d| d.timeline_fence_value())
    }

    /// Timeline value recorded for this reservation's own update, while
    /// unconsumed. Equals the fence value for an idle reservation.
    pub fn timeline_update_value(&self) -> Option<u32> {
        self.data.as_ref().map(|d| d.timeline_update_value())
    }

    /// True when this reservation was allocated against `timeline`
    pub(crate) fn on_timeline(&self, timeline: &Arc<Timeline>) -> bool {
        core::ptr::eq(self.timeline.as_ptr(), Arc::as_ptr(timeline))
    }

    fn take(&mut self, timeline: &Arc<Timeline>) -> Result<Arc<SyncData>> {
        if !self.on_timeline(timeline) {
            return Err(Error::InvalidReservation);
        }
        self.data.take().ok_or(Error::InvalidReservation)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.data.is_some() {
            warn!("ember: reservation dropped without create or abandon");
        }
    }
}

impl SyncEngine {
    /// Reserve a fence on `timeline`.
    ///
    /// Returns the reservation and whether the timeline was idle. Every
    /// reservation gets a Fence-kind counter; submissions signal the fence
    /// through it whether or not a timeline dependency exists. A non-idle
    /// reservation additionally advances the timeline: its update value is
    /// strictly past its fence value. An idle one leaves the timeline alone,
    /// update equal to fence.
    ///
    /// Either way a successful reservation consumes the needs-fencing
    /// signal; a failed one leaves it set so the retry still fences.
    pub fn alloc_fence(&self, timeline: &Arc<Timeline>) -> Result<(Reservation, bool)> {
        let fence_value = timeline.sync().next();
        let idle = timeline.is_idle();

        // Counter-pool failure is reported as exhaustion on this surface;
        // the pool-internal retryable error stays with query paths.
        let counter = self
            .pool()
            .acquire(timeline.name(), CounterKind::Fence)
            .map_err(|err| match err {
                Error::PrimitiveAllocationFailed => Error::PoolExhausted,
                other => other,
            })?;
        timeline.set_fencing_enabled(false);
        let update_value = if idle {
            fence_value
        } else {
            timeline.sync().advance()
        };
        let data = Arc::new(SyncData::new(
            KernelPair::new(counter),
            fence_value,
            update_value,
        ));
        Ok((Reservation::new(data, timeline), idle))
    }

    /// Materialize a reservation into a one-point fence on `timeline`.
    ///
    /// Fails with [`Error::InvalidReservation`] when the reservation was
    /// already consumed or belongs to another timeline; the reservation is
    /// untouched in the mismatch case. Points backed by a counter are queued
    /// on the timeline's active list for completion re-scans.
    pub fn create_fence(
        &self,
        timeline: &Arc<Timeline>,
        reservation: &mut Reservation,
        name: Name,
    ) -> Result<Arc<Fence>> {
        let data = reservation.take(timeline)?;
        let point = SyncPoint::new(timeline, data);

        if !point.data().is_idle() {
            timeline.register_point(point.duplicate());
        }

        let fence = Fence::single(name, point);
        debug!("ember: created {:?}", fence);
        Ok(fence)
    }

    /// Undo a reservation after a failed submission.
    ///
    /// If the fence counter was never referenced by an update entry (its
    /// next value is still zero), the timeline's next value is rolled back to
    /// the reserved fence value and the counter returns to the pool at once.
    /// Rollback is only sound when no later reservation was allocated on the
    /// timeline in between: the caller serializes submissions per timeline,
    /// so the abandoned reservation is the newest one.
    ///
    /// A counter that already carries an update entry cannot be rolled back;
    /// its pair goes to deferred reclamation instead.
    pub fn abandon_reservation(&self, timeline: &Arc<Timeline>, reservation: &mut Reservation) {
        let data = match reservation.take(timeline) {
            Ok(data) => data,
            Err(_) => return,
        };

        let kernel = match data.kernel() {
            // Counterless payload: nothing to roll back or reclaim.
            None => return,
            Some(kernel) => kernel,
        };

        if kernel.fence().next() == 0 {
            timeline.sync().set_next(data.timeline_fence_value());
            self.pool().release(kernel.fence());
            debug!(
                "ember: rolled {} back to {}",
                timeline.name(),
                data.timeline_fence_value()
            );
            return;
        }

        // The command stream already references the counter; let hardware
        // finish with it.
        if data.release() {
            self.reclaim().defer_free(kernel.clone());
        }
    }
}
