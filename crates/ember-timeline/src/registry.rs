//! # Timeline Registry
//!
//! Tracks every live timeline so a single hardware completion notification
//! can re-scan all of them. The registry lock orders strictly before each
//! timeline's active-list lock and is never held across a blocking wait.

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, warn};

use ember_core::{EventWait, SyncBackend};
use ember_pool::CounterPool;
use ember_reclaim::ReclaimQueue;

use crate::timeline::Timeline;

/// How long one pass of a blocking timeline release waits for hardware
/// progress before re-checking the counter.
pub const RELEASE_WAIT_NS: u64 = 100_000_000;

/// Passes a blocking release attempts before declaring the timeline wedged.
const RELEASE_MAX_PASSES: u32 = 600;

/// Registry of live timelines.
pub struct TimelineRegistry {
    timelines: spin::Mutex<Vec<Arc<Timeline>>>,
}

impl TimelineRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            timelines: spin::Mutex::new(Vec::new()),
        }
    }

    /// Track a timeline.
    pub fn register(&self, timeline: Arc<Timeline>) {
        self.timelines.lock().push(timeline);
    }

    /// Stop tracking a timeline. Unknown timelines are ignored.
    pub fn deregister(&self, timeline: &Arc<Timeline>) {
        self.timelines
            .lock()
            .retain(|t| !Arc::ptr_eq(t, timeline));
    }

    /// Number of live timelines
    pub fn len(&self) -> usize {
        self.timelines.lock().len()
    }

    /// True when no timeline is registered
    pub fn is_empty(&self) -> bool {
        self.timelines.lock().is_empty()
    }

    /// Re-scan every timeline after a hardware completion notification.
    ///
    /// First pass (under the registry lock, peeking each active-list lock):
    /// collect the timelines whose oldest point has signaled. Second pass
    /// (all locks dropped): retire each one's signaled prefix. Retiring can
    /// cascade into reclamation and teardown, which must not run under the
    /// registry lock.
    ///
    /// Returns the number of points retired.
    pub fn rescan(&self, reclaim: &ReclaimQueue) -> usize {
        let ready: Vec<Arc<Timeline>> = {
            let timelines = self.timelines.lock();
            timelines
                .iter()
                .filter(|t| t.head_signaled())
                .cloned()
                .collect()
        };

        let mut retired = 0;
        for timeline in ready {
            retired += timeline.collect_signaled(reclaim);
        }

        if retired > 0 {
            debug!("ember-timeline: re-scan retired {} points", retired);
        }
        retired
    }

    /// Destroy a timeline: block until its counter is met, retire whatever
    /// remains on its active list, deregister it and return its counter to
    /// the pool.
    ///
    /// Blocking-allowed context only. A wedged device is logged and the
    /// teardown forced through rather than leaking the timeline.
    pub fn release_timeline(
        &self,
        timeline: Arc<Timeline>,
        backend: &dyn SyncBackend,
        pool: &CounterPool,
        reclaim: &ReclaimQueue,
    ) {
        let mut passes = 0;
        while !timeline.sync().is_met() {
            passes += 1;
            if passes > RELEASE_MAX_PASSES {
                warn!(
                    "ember-timeline: {} released with counter unmet ({:?})",
                    timeline.name(),
                    timeline.sync()
                );
                break;
            }
            if backend.wait_event(RELEASE_WAIT_NS) == EventWait::TimedOut {
                backend.check_status();
            }
        }

        timeline.collect_signaled(reclaim);
        if timeline.active_len() > 0 {
            warn!(
                "ember-timeline: {} destroyed with {} points active",
                timeline.name(),
                timeline.active_len()
            );
        }

        self.deregister(&timeline);
        pool.release(timeline.sync());
    }
}

impl Default for TimelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use ember_core::{
        clamp_name, CounterKind, HwAddr, KernelPair, RawCounter, Result, SyncData, ValueCell,
    };

    use crate::point::SyncPoint;

    struct TestBackend {
        next_addr: AtomicU32,
        waits: AtomicUsize,
    }

    impl TestBackend {
        fn new() -> Self {
            Self {
                next_addr: AtomicU32::new(0x1000),
                waits: AtomicUsize::new(0),
            }
        }
    }

    impl SyncBackend for TestBackend {
        fn alloc_raw(&self, _class: &str) -> Result<RawCounter> {
            Ok(RawCounter {
                addr: HwAddr::new(self.next_addr.fetch_add(4, Ordering::Relaxed)),
                cell: ValueCell::new(),
            })
        }

        fn free_raw(&self, _raw: RawCounter) {}

        fn wait_event(&self, _timeout_ns: u64) -> EventWait {
            self.waits.fetch_add(1, Ordering::Relaxed);
            EventWait::TimedOut
        }

        fn signal_event(&self) {}

        fn check_status(&self) {}
    }

    struct Fixture {
        pool: Arc<CounterPool>,
        reclaim: ReclaimQueue,
        registry: TimelineRegistry,
    }

    fn fixture() -> (Arc<TestBackend>, Fixture) {
        let backend = Arc::new(TestBackend::new());
        let pool = Arc::new(CounterPool::new(
            Arc::clone(&backend) as Arc<dyn SyncBackend>
        ));
        let reclaim = ReclaimQueue::new(
            Arc::clone(&pool),
            Arc::clone(&backend) as Arc<dyn SyncBackend>,
        );
        (
            backend,
            Fixture {
                pool,
                reclaim,
                registry: TimelineRegistry::new(),
            },
        )
    }

    fn open_timeline(fx: &Fixture, name: &str) -> Arc<Timeline> {
        let sync = fx.pool.acquire(name, CounterKind::Timeline).unwrap();
        let tl = Timeline::new(clamp_name(name), sync);
        fx.registry.register(Arc::clone(&tl));
        tl
    }

    fn queue_point(fx: &Fixture, tl: &Arc<Timeline>) -> SyncPoint {
        let fence = fx.pool.acquire(tl.name(), CounterKind::Fence).unwrap();
        fence.advance();
        let fence_value = tl.sync().next();
        let update_value = tl.sync().advance();
        let point = SyncPoint::new(
            tl,
            Arc::new(SyncData::new(
                KernelPair::new(fence),
                fence_value,
                update_value,
            )),
        );
        tl.register_point(point.duplicate());
        point
    }

    #[test]
    fn test_rescan_retires_signaled_prefix_in_order() {
        let (_, fx) = fixture();
        let tl = open_timeline(&fx, "tl");

        let first = queue_point(&fx, &tl);
        let second = queue_point(&fx, &tl);
        assert_eq!(tl.active_len(), 2);

        // Only the second point's counter is met; the head still gates it
        second.data().kernel().unwrap().fence().complete();
        assert_eq!(fx.registry.rescan(&fx.reclaim), 0);
        assert_eq!(tl.active_len(), 2);

        first.data().kernel().unwrap().fence().complete();
        assert_eq!(fx.registry.rescan(&fx.reclaim), 2);
        assert_eq!(tl.active_len(), 0);

        first.release(&fx.reclaim);
        second.release(&fx.reclaim);
    }

    #[test]
    fn test_rescan_covers_all_timelines() {
        let (_, fx) = fixture();
        let a = open_timeline(&fx, "a");
        let b = open_timeline(&fx, "b");

        let pa = queue_point(&fx, &a);
        let pb = queue_point(&fx, &b);
        pa.data().kernel().unwrap().fence().complete();
        pb.data().kernel().unwrap().fence().complete();

        assert_eq!(fx.registry.rescan(&fx.reclaim), 2);

        pa.release(&fx.reclaim);
        pb.release(&fx.reclaim);
    }

    #[test]
    fn test_release_met_timeline_returns_counter() {
        let (backend, fx) = fixture();
        let tl = open_timeline(&fx, "tl");
        assert_eq!(fx.registry.len(), 1);

        fx.registry
            .release_timeline(tl, backend.as_ref(), &fx.pool, &fx.reclaim);

        assert!(fx.registry.is_empty());
        assert_eq!(fx.pool.stats().active_len, 0);
        // No wait needed: the counter was already met
        assert_eq!(backend.waits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_release_wedged_timeline_forces_through() {
        let (backend, fx) = fixture();
        let tl = open_timeline(&fx, "tl");
        tl.sync().advance();

        fx.registry
            .release_timeline(tl, backend.as_ref(), &fx.pool, &fx.reclaim);

        assert!(fx.registry.is_empty());
        assert!(backend.waits.load(Ordering::Relaxed) > 0);
    }
}
