//! # Fence Point
//!
//! A point on a timeline: a shared [`SyncData`] payload plus a weak backref
//! to the owning timeline. Duplicates share the payload through its explicit
//! refcount; the holder that releases the last reference hands the kernel
//! pair to deferred reclamation.

use core::cmp::Ordering;
use core::fmt;

use alloc::sync::{Arc, Weak};

use ember_core::{wrap_cmp, SyncData};
use ember_reclaim::ReclaimQueue;

use crate::timeline::Timeline;

/// One fence point.
///
/// The backref is weak so the active list a timeline keeps of its own points
/// does not keep the timeline alive through itself.
pub struct SyncPoint {
    timeline: Weak<Timeline>,
    data: Arc<SyncData>,
}

impl SyncPoint {
    /// Bind a payload to its timeline.
    pub fn new(timeline: &Arc<Timeline>, data: Arc<SyncData>) -> Self {
        Self {
            timeline: Arc::downgrade(timeline),
            data,
        }
    }

    /// The owning timeline, if it still exists
    pub fn timeline(&self) -> Option<Arc<Timeline>> {
        self.timeline.upgrade()
    }

    /// True when this point belongs to `timeline`
    pub fn on_timeline(&self, timeline: &Arc<Timeline>) -> bool {
        core::ptr::eq(self.timeline.as_ptr(), Arc::as_ptr(timeline))
    }

    /// The shared payload
    #[inline]
    pub fn data(&self) -> &Arc<SyncData> {
        &self.data
    }

    /// Take another reference on the payload and return a point sharing it.
    pub fn duplicate(&self) -> SyncPoint {
        self.data.retain();
        SyncPoint {
            timeline: self.timeline.clone(),
            data: Arc::clone(&self.data),
        }
    }

    /// True when the point has signaled: it is idle, or its fence counter is
    /// met.
    #[inline]
    pub fn has_signaled(&self) -> bool {
        self.data.has_signaled()
    }

    /// Timeline ordering of two points, by reserved update value.
    ///
    /// Wrap-aware: a value just past the wrap orders after one just before
    /// it.
    pub fn order(&self, other: &SyncPoint) -> Ordering {
        wrap_cmp(
            self.data.timeline_update_value(),
            other.data.timeline_update_value(),
        )
    }

    /// Drop this reference to the payload. The caller that releases the last
    /// reference parks the kernel pair on `reclaim`; hardware may still be
    /// counting towards its counters.
    pub fn release(self, reclaim: &ReclaimQueue) {
        if self.data.release() {
            if let Some(kernel) = self.data.kernel() {
                reclaim.defer_free(kernel.clone());
            }
        }
    }
}

impl fmt::Debug for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncPoint {{ {:?} }}", self.data)
    }
}
