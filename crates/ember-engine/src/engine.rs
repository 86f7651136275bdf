//! # Engine Context
//!
//! The owning context for the whole synchronization engine: backend handle,
//! counter pool, deferred reclamation and the timeline registry. One engine
//! per device; everything else borrows from it.

use alloc::sync::Arc;

use log::{debug, info, warn};

use ember_core::{clamp_name, CounterKind, Result, SyncBackend};
use ember_pool::{CounterPool, DumpFlags};
use ember_reclaim::{DrainState, ReclaimQueue};
use ember_timeline::{Timeline, TimelineRegistry};

use crate::session::TimelineSession;

/// The synchronization engine.
///
/// Construction order matters: the pool wraps the backend, reclamation wraps
/// the pool, timelines sit on top. `shutdown` tears down in reverse.
pub struct SyncEngine {
    backend: Arc<dyn SyncBackend>,
    pool: Arc<CounterPool>,
    reclaim: Arc<ReclaimQueue>,
    registry: TimelineRegistry,
}

impl SyncEngine {
    /// Bring up an engine on `backend`.
    pub fn new(backend: Arc<dyn SyncBackend>) -> Arc<Self> {
        let pool = Arc::new(CounterPool::new(Arc::clone(&backend)));
        let reclaim = Arc::new(ReclaimQueue::new(Arc::clone(&pool), Arc::clone(&backend)));
        Arc::new(Self {
            backend,
            pool,
            reclaim,
            registry: TimelineRegistry::new(),
        })
    }

    /// The GPU services backend
    #[inline]
    pub fn backend(&self) -> &Arc<dyn SyncBackend> {
        &self.backend
    }

    /// The counter pool
    #[inline]
    pub fn pool(&self) -> &Arc<CounterPool> {
        &self.pool
    }

    /// The deferred reclamation queue
    #[inline]
    pub fn reclaim(&self) -> &Arc<ReclaimQueue> {
        &self.reclaim
    }

    /// The timeline registry
    #[inline]
    pub(crate) fn registry(&self) -> &TimelineRegistry {
        &self.registry
    }

    /// Open a session: create a timeline named after the requesting process
    /// and register it. Fencing starts enabled, so the first submission is
    /// fenced even on an idle timeline.
    pub fn open_session(self: &Arc<Self>, process_name: &str) -> Result<TimelineSession> {
        let name = clamp_name(process_name);
        let sync = self.pool.acquire(name.as_str(), CounterKind::Timeline)?;
        let timeline = Timeline::new(name, sync);
        self.registry.register(Arc::clone(&timeline));

        debug!("ember: opened timeline {}", timeline.name());
        Ok(TimelineSession::new(Arc::clone(self), timeline))
    }

    /// Hardware completion notification.
    ///
    /// Re-scans every timeline, retiring signaled points, and wakes every
    /// thread blocked on the completion event so it re-checks its condition.
    /// Enqueue-only; safe from restricted context.
    pub fn command_complete(&self) {
        self.registry.rescan(&self.reclaim);
        self.backend.signal_event();
    }

    /// One reclamation sweep. Blocking-allowed context only; the background
    /// worker calls this after each completion event.
    pub fn sweep(&self) -> DrainState {
        self.reclaim.process_once()
    }

    /// Tear the engine down.
    ///
    /// Blocks until deferred reclamation fully drains, then empties the
    /// pool's free list. Leaked timelines and counters are logged; teardown
    /// proceeds regardless.
    pub fn shutdown(&self) {
        if self.reclaim.drain() == DrainState::Pending {
            warn!("ember: shutdown with reclamation still pending");
        }

        if !self.registry.is_empty() {
            warn!("ember: shutdown with {} timelines open", self.registry.len());
        }

        self.pool.drain_all();
    }

    /// Log the selected debug sections, engine-wide.
    pub fn debug_dump(&self, flags: DumpFlags) {
        info!("ember: {} timelines registered", self.registry.len());
        self.pool.dump(flags);
        if flags.contains(DumpFlags::PENDING) {
            self.reclaim.dump();
        }
    }
}

static_assertions::assert_impl_all!(SyncEngine: Send, Sync);
