//! # Timeline
//!
//! One synchronization context: a Timeline-kind counter plus the ordered list
//! of fence points still waiting on it.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use alloc::sync::Arc;
use alloc::vec::Vec;

use ember_core::{Name, SyncCounter};
use ember_reclaim::ReclaimQueue;

use crate::point::SyncPoint;

/// A per-context timeline.
///
/// The timeline counter's next value is the reservation horizon: every fence
/// point allocated against the timeline snapshots it, and a point has
/// signaled once the current value catches up with the point's snapshot.
///
/// `fencing_enabled` is the needs-fencing signal: it is set when the consumer
/// wants the next submission fenced even though the timeline looks idle, and
/// each successful reservation consumes it.
pub struct Timeline {
    name: Name,
    sync: Arc<SyncCounter>,
    fencing_enabled: AtomicBool,
    active: spin::Mutex<Vec<SyncPoint>>,
}

impl Timeline {
    /// Create a timeline around a Timeline-kind counter, fencing enabled.
    pub fn new(name: Name, sync: Arc<SyncCounter>) -> Arc<Self> {
        Arc::new(Self {
            name,
            sync,
            fencing_enabled: AtomicBool::new(true),
            active: spin::Mutex::new(Vec::new()),
        })
    }

    /// Timeline name
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The timeline counter
    #[inline]
    pub fn sync(&self) -> &Arc<SyncCounter> {
        &self.sync
    }

    /// Whether the next reservation must produce a real fence even if the
    /// timeline counter is met
    #[inline]
    pub fn fencing_enabled(&self) -> bool {
        self.fencing_enabled.load(Ordering::Acquire)
    }

    /// Set or clear the needs-fencing signal
    #[inline]
    pub fn set_fencing_enabled(&self, enabled: bool) {
        self.fencing_enabled.store(enabled, Ordering::Release);
    }

    /// True when a reservation against this timeline may be idle: nothing
    /// outstanding on the counter and no explicit fencing request.
    pub fn is_idle(&self) -> bool {
        self.sync.is_met() && !self.fencing_enabled()
    }

    /// Queue a point on the active list. Points are registered in the order
    /// their update values were reserved.
    pub fn register_point(&self, point: SyncPoint) {
        self.active.lock().push(point);
    }

    /// True when the oldest active point has signaled, meaning a re-scan
    /// would retire something. Cheap peek under the active lock.
    pub fn head_signaled(&self) -> bool {
        let active = self.active.lock();
        match active.first() {
            Some(point) => point.has_signaled(),
            None => false,
        }
    }

    /// Retire the signaled prefix of the active list, releasing each retired
    /// point into `reclaim`. Returns the number retired.
    ///
    /// Points signal in reservation order, so the scan stops at the first
    /// unsignaled point. Releases happen after the active lock is dropped.
    pub fn collect_signaled(&self, reclaim: &ReclaimQueue) -> usize {
        let retired: Vec<SyncPoint> = {
            let mut active = self.active.lock();
            let met = active
                .iter()
                .take_while(|point| point.has_signaled())
                .count();
            active.drain(..met).collect()
        };

        let count = retired.len();
        for point in retired {
            point.release(reclaim);
        }
        count
    }

    /// Active points still waiting on this timeline
    pub fn active_len(&self) -> usize {
        self.active.lock().len()
    }
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timeline {{ {} {:?} active={} fencing={} }}",
            self.name.as_str(),
            self.sync,
            self.active_len(),
            self.fencing_enabled()
        )
    }
}

static_assertions::assert_impl_all!(Timeline: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{clamp_name, CounterId, CounterKind, HwAddr, RawCounter, ValueCell};

    fn timeline() -> Arc<Timeline> {
        let sync = Arc::new(SyncCounter::new(
            CounterId::new(1),
            CounterKind::Timeline,
            clamp_name("tl"),
            RawCounter {
                addr: HwAddr::new(0x1000),
                cell: ValueCell::new(),
            },
        ));
        Timeline::new(clamp_name("tl"), sync)
    }

    #[test]
    fn test_new_timeline_has_fencing_enabled() {
        let tl = timeline();
        assert!(tl.fencing_enabled());
        assert!(!tl.is_idle());

        tl.set_fencing_enabled(false);
        assert!(tl.is_idle());
    }

    #[test]
    fn test_outstanding_counter_defeats_idle() {
        let tl = timeline();
        tl.set_fencing_enabled(false);
        tl.sync().advance();

        assert!(!tl.is_idle());
        tl.sync().complete();
        assert!(tl.is_idle());
    }

    #[test]
    fn test_empty_timeline_head_not_signaled() {
        let tl = timeline();
        assert!(!tl.head_signaled());
    }
}
