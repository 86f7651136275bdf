//! # Timeline Session
//!
//! The per-consumer handle: one timeline, reserved fences, and a blocking
//! close. The session serializes all reservation traffic on its timeline;
//! that serialization is what makes reservation rollback sound.

use alloc::sync::Arc;

use ember_core::{clamp_name, Result};
use ember_timeline::{Fence, Timeline};

use crate::engine::SyncEngine;
use crate::reservation::Reservation;

/// An open timeline session.
///
/// Dropping the session closes it: the close blocks until the timeline
/// counter is met, then destroys the timeline. Use from blocking-allowed
/// context only.
pub struct TimelineSession {
    engine: Arc<SyncEngine>,
    timeline: Arc<Timeline>,
}

impl TimelineSession {
    pub(crate) fn new(engine: Arc<SyncEngine>, timeline: Arc<Timeline>) -> Self {
        Self { engine, timeline }
    }

    /// The session's timeline
    #[inline]
    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    /// Reserve a fence for the next submission. See
    /// [`SyncEngine::alloc_fence`].
    pub fn alloc_fence(&self) -> Result<(Reservation, bool)> {
        self.engine.alloc_fence(&self.timeline)
    }

    /// Materialize a reservation into a fence. Names longer than the limit
    /// are truncated.
    pub fn create_fence(&self, reservation: &mut Reservation, name: &str) -> Result<Arc<Fence>> {
        self.engine
            .create_fence(&self.timeline, reservation, clamp_name(name))
    }

    /// Undo a reservation after a failed submission.
    pub fn abandon(&self, reservation: &mut Reservation) {
        self.engine.abandon_reservation(&self.timeline, reservation);
    }

    /// Request that the next reservation produce a real fence even if the
    /// timeline is idle.
    pub fn enable_fencing(&self, enabled: bool) {
        self.timeline.set_fencing_enabled(enabled);
    }

    /// Flatten a fence for debug display. See [`SyncEngine::debug_fence`].
    pub fn debug_fence(
        &self,
        fence: &Fence,
        max_records: usize,
    ) -> Result<crate::debug::FenceDebugInfo> {
        self.engine.debug_fence(fence, max_records)
    }

    /// Close explicitly. Equivalent to dropping; blocks until the timeline
    /// counter is met.
    pub fn close(self) {}
}

impl Drop for TimelineSession {
    fn drop(&mut self) {
        self.engine.registry().release_timeline(
            Arc::clone(&self.timeline),
            self.engine.backend().as_ref(),
            self.engine.pool(),
            self.engine.reclaim(),
        );
    }
}
