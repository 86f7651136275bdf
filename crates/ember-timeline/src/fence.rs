//! # Fence
//!
//! A named collection of fence points, shared as `Arc<Fence>`. Points are
//! either native (a point on one of our timelines) or foreign (a fence from
//! another synchronization domain, waited on through the bridge).

use core::fmt;

use alloc::sync::Arc;
use alloc::vec::Vec;

use ember_core::{wrap_before, ForeignFence, Name};
use ember_reclaim::ReclaimQueue;

use crate::point::SyncPoint;

// =============================================================================
// FENCE POINT
// =============================================================================

/// One point of a fence.
pub enum FencePoint {
    /// A point on a native timeline
    Native(SyncPoint),
    /// A fence from another synchronization domain
    Foreign(Arc<dyn ForeignFence>),
}

impl FencePoint {
    /// True when the point has signaled
    pub fn has_signaled(&self) -> bool {
        match self {
            Self::Native(point) => point.has_signaled(),
            Self::Foreign(foreign) => foreign.is_signaled(),
        }
    }

    /// True for foreign points
    #[inline]
    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::Foreign(_))
    }
}

impl fmt::Debug for FencePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(point) => write!(f, "Native({:?})", point),
            Self::Foreign(foreign) => write!(f, "Foreign({})", foreign.name()),
        }
    }
}

// =============================================================================
// FENCE
// =============================================================================

/// A named, immutable set of fence points.
///
/// The point set is fixed at construction; signaling state lives in the
/// points themselves.
pub struct Fence {
    name: Name,
    points: Vec<FencePoint>,
}

impl Fence {
    /// Build a fence from its points.
    pub fn new(name: Name, points: Vec<FencePoint>) -> Arc<Self> {
        Arc::new(Self { name, points })
    }

    /// Build a one-point fence around a native point.
    pub fn single(name: Name, point: SyncPoint) -> Arc<Self> {
        Self::new(name, alloc::vec![FencePoint::Native(point)])
    }

    /// Fence name
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The points, in first-seen order
    #[inline]
    pub fn points(&self) -> &[FencePoint] {
        &self.points
    }

    /// True when every point has signaled
    pub fn status(&self) -> bool {
        self.points.iter().all(FencePoint::has_signaled)
    }

    /// True when any foreign point is still pending
    pub fn foreign_pending(&self) -> bool {
        self.points
            .iter()
            .any(|p| p.is_foreign() && !p.has_signaled())
    }

    /// Merge two fences into a new one.
    ///
    /// Points are concatenated in first-seen order, `a` before `b`. Native
    /// points are duplicated (shared payload, new reference); foreign
    /// references are cloned. The inputs are untouched.
    pub fn merge(name: Name, a: &Fence, b: &Fence) -> Arc<Fence> {
        let mut points = Vec::with_capacity(a.points.len() + b.points.len());
        for point in a.points.iter().chain(b.points.iter()) {
            match point {
                FencePoint::Native(native) => points.push(FencePoint::Native(native.duplicate())),
                FencePoint::Foreign(foreign) => {
                    points.push(FencePoint::Foreign(Arc::clone(foreign)))
                }
            }
        }
        Self::new(name, points)
    }

    /// Software-complete every native point: current := next on the fence
    /// counter and any attached cleanup counter, and advance the owning
    /// timeline's cell to the point's update value.
    ///
    /// No-hardware and test paths use this in place of the firmware writes a
    /// submission would have carried; the caller follows up with a registry
    /// re-scan.
    pub fn force_signal(&self) {
        for point in &self.points {
            if let FencePoint::Native(native) = point {
                if let Some(kernel) = native.data().kernel() {
                    kernel.fence().complete();
                    if let Some(cleanup) = kernel.cleanup() {
                        cleanup.complete();
                    }
                }
                if let Some(timeline) = native.timeline() {
                    let target = native.data().timeline_update_value();
                    if wrap_before(timeline.sync().current(), target) {
                        timeline.sync().raw().cell.store(target);
                    }
                }
            }
        }
    }

    /// Drop one fence reference.
    ///
    /// The holder of the last reference releases every native point (the
    /// payload refcount decides when reclamation starts) and defers the drop
    /// of every foreign reference, since a foreign release may block.
    pub fn release(self: Arc<Self>, reclaim: &ReclaimQueue) {
        let fence = match Arc::try_unwrap(self) {
            Ok(fence) => fence,
            Err(_shared) => return,
        };

        for point in fence.points {
            match point {
                FencePoint::Native(native) => native.release(reclaim),
                FencePoint::Foreign(foreign) => reclaim.defer_put(foreign),
            }
        }
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fence {{ {} points={} signaled={} }}",
            self.name.as_str(),
            self.points.len(),
            self.status()
        )
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};
    use ember_core::{
        clamp_name, CounterId, CounterKind, ForeignWaiter, HwAddr, KernelPair, RawCounter,
        SyncCounter, SyncData, ValueCell, WaiterStatus,
    };

    use crate::timeline::Timeline;

    fn counter(id: u32, kind: CounterKind) -> Arc<SyncCounter> {
        Arc::new(SyncCounter::new(
            CounterId::new(id),
            kind,
            clamp_name("tl"),
            RawCounter {
                addr: HwAddr::new(0x1000 + id * 4),
                cell: ValueCell::new(),
            },
        ))
    }

    fn timeline() -> Arc<Timeline> {
        Timeline::new(clamp_name("tl"), counter(1, CounterKind::Timeline))
    }

    fn pending_point(tl: &Arc<Timeline>, id: u32) -> SyncPoint {
        let fence = counter(id, CounterKind::Fence);
        fence.advance();
        SyncPoint::new(
            tl,
            Arc::new(SyncData::new(KernelPair::new(fence), id - 1, id)),
        )
    }

    struct FixedForeign {
        signaled: AtomicBool,
    }

    impl ember_core::ForeignFence for FixedForeign {
        fn name(&self) -> &str {
            "other-domain"
        }

        fn is_signaled(&self) -> bool {
            self.signaled.load(Ordering::Acquire)
        }

        fn wait_async(&self, _waiter: ForeignWaiter) -> WaiterStatus {
            WaiterStatus::Registered
        }

        fn value_str(&self) -> arrayvec::ArrayString<64> {
            arrayvec::ArrayString::new()
        }
    }

    #[test]
    fn test_status_requires_all_points() {
        let tl = timeline();
        let a = pending_point(&tl, 2);
        let b = pending_point(&tl, 3);
        let fence = Fence::new(
            clamp_name("ab"),
            alloc::vec![FencePoint::Native(a), FencePoint::Native(b)],
        );
        assert!(!fence.status());

        for point in fence.points() {
            if let FencePoint::Native(native) = point {
                native.data().kernel().unwrap().fence().complete();
            }
        }
        assert!(fence.status());
    }

    #[test]
    fn test_merge_preserves_order_and_shares_payloads() {
        let tl = timeline();
        let a = Fence::single(clamp_name("a"), pending_point(&tl, 2));
        let foreign = Arc::new(FixedForeign {
            signaled: AtomicBool::new(false),
        });
        let b = Fence::new(
            clamp_name("b"),
            alloc::vec![
                FencePoint::Foreign(foreign),
                FencePoint::Native(pending_point(&tl, 3)),
            ],
        );

        let merged = Fence::merge(clamp_name("a+b"), &a, &b);
        assert_eq!(merged.points().len(), 3);
        assert!(matches!(merged.points()[0], FencePoint::Native(_)));
        assert!(matches!(merged.points()[1], FencePoint::Foreign(_)));

        // The native duplicate shares its payload with the source point
        if let (FencePoint::Native(src), FencePoint::Native(dup)) =
            (&a.points()[0], &merged.points()[0])
        {
            assert!(Arc::ptr_eq(src.data(), dup.data()));
            assert_eq!(src.data().refcount(), 2);
        } else {
            panic!("expected native points");
        }
    }

    #[test]
    fn test_foreign_pending_tracks_signal() {
        let foreign = Arc::new(FixedForeign {
            signaled: AtomicBool::new(false),
        });
        let fence = Fence::new(
            clamp_name("f"),
            alloc::vec![FencePoint::Foreign(Arc::clone(&foreign) as Arc<dyn ForeignFence>)],
        );

        assert!(fence.foreign_pending());
        assert!(!fence.status());

        foreign.signaled.store(true, Ordering::Release);
        assert!(!fence.foreign_pending());
        assert!(fence.status());
    }

    #[test]
    fn test_force_signal_completes_native_and_cleanup() {
        let tl = timeline();
        let point = pending_point(&tl, 2);
        let kernel = point.data().kernel().unwrap().clone();
        let cleanup = kernel
            .cleanup_or_init(|| Ok(counter(9, CounterKind::Cleanup)))
            .unwrap();
        cleanup.advance();

        let fence = Fence::single(clamp_name("sw"), point);
        assert!(!fence.status());

        fence.force_signal();
        assert!(fence.status());
        assert!(kernel.is_reclaimable());
    }
}
