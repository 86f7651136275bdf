//! # Counter Pool
//!
//! Bounded free list plus an active index, guarded by one pool lock.
//!
//! The pool lock is held briefly across the backend allocation call, exactly
//! like the original driver held its pool mutex across the cross-subsystem
//! allocation; every other operation under the lock is list manipulation.

use core::sync::atomic::{AtomicU32, Ordering};

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use log::{error, info, warn};

use ember_core::{
    clamp_name, CounterId, CounterKind, HwAddr, RawCounter, Result, SyncBackend, SyncCounter,
    VALUE_INVALID, VALUE_UNUSED,
};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default bound on the number of counters parked on the free list.
pub const POOL_MAX_FREE: usize = 10;

// =============================================================================
// STATISTICS
// =============================================================================

/// Pool usage statistics, reported by the debug dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Counters allocated fresh from the backend
    pub created: u32,
    /// Counters served from the free list
    pub reused: u32,
    /// Counters currently parked on the free list
    pub free_len: usize,
    /// Counters currently issued and tracked
    pub active_len: usize,
}

impl PoolStats {
    /// Free-list hit rate in percent
    pub fn hit_rate_percent(&self) -> u32 {
        let total = self.created + self.reused;
        if total == 0 {
            0
        } else {
            self.reused * 100 / total
        }
    }
}

// =============================================================================
// DEBUG RECORDS
// =============================================================================

/// Snapshot of one active, not-yet-met counter for introspection.
#[derive(Debug, Clone)]
pub struct CounterDebugRecord {
    /// Counter id
    pub id: CounterId,
    /// Firmware address
    pub addr: HwAddr,
    /// Current hardware-visible value
    pub current: u32,
    /// Next reserved value
    pub next: u32,
    /// Debug class name
    pub class: ember_core::Name,
    /// Counter kind
    pub kind: CounterKind,
}

bitflags::bitflags! {
    /// Sections of the pool debug dump.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DumpFlags: u32 {
        /// Active counters that have not met their reserved value
        const PENDING = 1 << 0;
        /// Counters parked on the free list
        const FREE    = 1 << 1;
        /// Aggregate created/reused statistics
        const STATS   = 1 << 2;
    }
}

// =============================================================================
// POOL
// =============================================================================

struct PoolInner {
    free: Vec<RawCounter>,
    active: HashMap<u32, Arc<SyncCounter>>,
    created: u32,
    reused: u32,
}

/// Recycling allocator for hardware counters.
///
/// Shared (`Arc<CounterPool>`) between the engine, timelines and the reclaim
/// worker; all state sits behind the single pool lock.
pub struct CounterPool {
    backend: Arc<dyn SyncBackend>,
    max_free: usize,
    next_id: AtomicU32,
    inner: spin::Mutex<PoolInner>,
}

impl CounterPool {
    /// Create a pool with the default free-list bound.
    pub fn new(backend: Arc<dyn SyncBackend>) -> Self {
        Self::with_bound(backend, POOL_MAX_FREE)
    }

    /// Create a pool with an explicit free-list bound.
    pub fn with_bound(backend: Arc<dyn SyncBackend>, max_free: usize) -> Self {
        Self {
            backend,
            max_free,
            next_id: AtomicU32::new(0),
            inner: spin::Mutex::new(PoolInner {
                free: Vec::new(),
                active: HashMap::new(),
                created: 0,
                reused: 0,
            }),
        }
    }

    /// Issue a counter, recycling a free-listed one when possible.
    ///
    /// The returned counter has a fresh unique id, both values reset to
    /// zero, and the given class/kind stamped for diagnostics.
    pub fn acquire(&self, class: &str, kind: CounterKind) -> Result<Arc<SyncCounter>> {
        let mut inner = self.inner.lock();

        let raw = match inner.free.pop() {
            Some(raw) => {
                inner.reused += 1;
                raw
            }
            None => match self.backend.alloc_raw(class) {
                Ok(raw) => {
                    inner.created += 1;
                    raw
                }
                Err(err) => {
                    error!("ember-pool: failed to allocate counter ({err})");
                    return Err(err);
                }
            },
        };

        let id = CounterId::new(self.next_id.fetch_add(1, Ordering::AcqRel) + 1);
        let sync = Arc::new(SyncCounter::new(id, kind, clamp_name(class), raw));
        inner.active.insert(id.raw(), Arc::clone(&sync));

        Ok(sync)
    }

    /// Return a counter to the pool.
    ///
    /// Below the bound the counter is marked with the unused sentinel and
    /// parked for reuse; above it, it is marked invalid and released to the
    /// backend permanently.
    pub fn release(&self, sync: &Arc<SyncCounter>) {
        let mut inner = self.inner.lock();

        if inner.active.remove(&sync.id().raw()).is_none() {
            warn!("ember-pool: released counter {} not tracked", sync.id());
        }

        if inner.free.len() < self.max_free {
            sync.raw().cell.store(VALUE_UNUSED);
            inner.free.push(sync.raw().clone());
        } else {
            sync.raw().cell.store(VALUE_INVALID);
            self.backend.free_raw(sync.raw().clone());
        }
    }

    /// Release every free-listed counter to the backend. Shutdown path;
    /// ignores the free-list bound.
    pub fn drain_all(&self) {
        let mut inner = self.inner.lock();

        for raw in inner.free.drain(..) {
            raw.cell.store(VALUE_INVALID);
            self.backend.free_raw(raw);
        }

        if !inner.active.is_empty() {
            warn!(
                "ember-pool: {} counters still active at drain",
                inner.active.len()
            );
        }
    }

    /// Current usage statistics
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            created: inner.created,
            reused: inner.reused,
            free_len: inner.free.len(),
            active_len: inner.active.len(),
        }
    }

    /// Snapshot every active counter that has not met its reserved value.
    pub fn debug_records(&self) -> Vec<CounterDebugRecord> {
        let inner = self.inner.lock();
        let mut records = Vec::new();

        for sync in inner.active.values() {
            if sync.is_met() {
                continue;
            }
            records.push(CounterDebugRecord {
                id: sync.id(),
                addr: sync.addr(),
                current: sync.current(),
                next: sync.next(),
                class: clamp_name(sync.class()),
                kind: sync.kind(),
            });
        }

        records
    }

    /// Log the selected dump sections.
    pub fn dump(&self, flags: DumpFlags) {
        if flags.contains(DumpFlags::STATS) {
            let stats = self.stats();
            info!(
                "ember-pool: pool usage: {}% - created {} reused {}",
                stats.hit_rate_percent(),
                stats.created,
                stats.reused
            );
        }

        if flags.contains(DumpFlags::PENDING) {
            for rec in self.debug_records() {
                info!(
                    "\tID = {}, FWAddr = {}: Current = 0x{:08x}, Next = 0x{:08x}, {} ({})",
                    rec.id,
                    rec.addr,
                    rec.current,
                    rec.next,
                    rec.class.as_str(),
                    rec.kind.name()
                );
            }
        }

        if flags.contains(DumpFlags::FREE) {
            let inner = self.inner.lock();
            for raw in inner.free.iter() {
                info!(
                    "\tfree: FWAddr = {}, Current = 0x{:08x}",
                    raw.addr,
                    raw.cell.load()
                );
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;
    use ember_core::{EventWait, ValueCell};

    /// Backend handing out counters from a bump allocator, with an optional
    /// hard cap to provoke allocation failure.
    struct TestBackend {
        next_addr: AtomicU32,
        allocated: AtomicUsize,
        freed: AtomicUsize,
        cap: usize,
    }

    impl TestBackend {
        fn new() -> Self {
            Self::with_cap(usize::MAX)
        }

        fn with_cap(cap: usize) -> Self {
            Self {
                next_addr: AtomicU32::new(0x1000),
                allocated: AtomicUsize::new(0),
                freed: AtomicUsize::new(0),
                cap,
            }
        }
    }

    impl SyncBackend for TestBackend {
        fn alloc_raw(&self, _class: &str) -> Result<RawCounter> {
            if self.allocated.load(Ordering::Relaxed) >= self.cap {
                return Err(ember_core::Error::PrimitiveAllocationFailed);
            }
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Ok(RawCounter {
                addr: HwAddr::new(self.next_addr.fetch_add(4, Ordering::Relaxed)),
                cell: ValueCell::new(),
            })
        }

        fn free_raw(&self, _raw: RawCounter) {
            self.freed.fetch_add(1, Ordering::Relaxed);
        }

        fn wait_event(&self, _timeout_ns: u64) -> EventWait {
            EventWait::TimedOut
        }

        fn signal_event(&self) {}

        fn check_status(&self) {}
    }

    fn pool() -> (Arc<TestBackend>, CounterPool) {
        let backend = Arc::new(TestBackend::new());
        let pool = CounterPool::new(Arc::clone(&backend) as Arc<dyn SyncBackend>);
        (backend, pool)
    }

    #[test]
    fn test_acquire_resets_and_ids_are_fresh() {
        let (_, pool) = pool();

        let a = pool.acquire("tl-a", CounterKind::Fence).unwrap();
        let b = pool.acquire("tl-a", CounterKind::Fence).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(a.current(), 0);
        assert_eq!(a.next(), 0);
        assert_eq!(a.kind(), CounterKind::Fence);
        assert_eq!(a.class(), "tl-a");
    }

    #[test]
    fn test_release_parks_and_reuses() {
        let (backend, pool) = pool();

        let a = pool.acquire("x", CounterKind::Fence).unwrap();
        let addr = a.addr();
        pool.release(&a);

        // Parked counter carries the unused sentinel
        assert_eq!(a.current(), VALUE_UNUSED);

        let b = pool.acquire("y", CounterKind::Cleanup).unwrap();
        assert_eq!(b.addr(), addr);
        assert_eq!(b.current(), 0);
        assert_ne!(b.id(), a.id());

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(backend.freed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_free_list_bounded() {
        let (backend, pool) = pool();

        let mut held = Vec::new();
        for _ in 0..(POOL_MAX_FREE + 5) {
            held.push(pool.acquire("burst", CounterKind::Fence).unwrap());
        }

        for sync in &held {
            pool.release(sync);
        }

        let stats = pool.stats();
        assert_eq!(stats.free_len, POOL_MAX_FREE);
        assert_eq!(stats.active_len, 0);
        // Everything past the bound went back to the backend
        assert_eq!(backend.freed.load(Ordering::Relaxed), 5);
        // Overflow counters carry the invalid sentinel
        assert!(held.iter().any(|s| s.current() == VALUE_INVALID));
    }

    #[test]
    fn test_acquire_failure_surfaces() {
        let backend = Arc::new(TestBackend::with_cap(1));
        let pool = CounterPool::new(Arc::clone(&backend) as Arc<dyn SyncBackend>);

        let _a = pool.acquire("only", CounterKind::Fence).unwrap();
        let err = pool.acquire("next", CounterKind::Fence).unwrap_err();
        assert_eq!(err, ember_core::Error::PrimitiveAllocationFailed);
    }

    #[test]
    fn test_drain_all_empties_free_list() {
        let (backend, pool) = pool();

        let a = pool.acquire("x", CounterKind::Fence).unwrap();
        let b = pool.acquire("y", CounterKind::Fence).unwrap();
        pool.release(&a);
        pool.release(&b);

        pool.drain_all();

        let stats = pool.stats();
        assert_eq!(stats.free_len, 0);
        assert_eq!(backend.freed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_debug_records_only_unmet() {
        let (_, pool) = pool();

        let met = pool.acquire("met", CounterKind::Fence).unwrap();
        let pending = pool.acquire("pending", CounterKind::Fence).unwrap();
        pending.advance();

        let records = pool.debug_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, pending.id());
        assert_ne!(records[0].id, met.id());
    }
}
