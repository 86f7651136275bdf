//! # Fence Data Model
//!
//! The counter and payload structures every other EMBER crate is built on.
//!
//! A [`SyncCounter`] pairs a hardware-visible current value with the next
//! value software has reserved; the counter is "met" when the two are equal.
//! Hardware (or an explicit software completion) is the only writer of the
//! current value; the next value is advanced only by the software owner while
//! holding the relevant lock.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use alloc::sync::Arc;

use crate::types::{CounterId, CounterKind, HwAddr, Name};

// =============================================================================
// VALUE CELL
// =============================================================================

/// Hardware-visible 32-bit counter cell.
///
/// On real systems this is device-mapped memory the firmware writes; the
/// engine models it as a shared atomic so completion notifications from any
/// context are observed by plain loads.
#[derive(Clone, Default)]
pub struct ValueCell(Arc<AtomicU32>);

impl ValueCell {
    /// Create a cell holding zero
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    /// Read the current value
    #[inline]
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Write the current value.
    ///
    /// Used by hardware completion (through the backend), by explicit
    /// software completion, and by the pool's sentinel marking.
    #[inline]
    pub fn store(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueCell({})", self.load())
    }
}

// =============================================================================
// RAW COUNTER
// =============================================================================

/// A hardware counter as handed out by the backend.
///
/// This is the expensive resource the pool recycles: the firmware address
/// plus the mapped value cell. The cheap [`SyncCounter`] wrapper around it is
/// rebuilt on every acquire so id, kind and class are always fresh.
#[derive(Clone, Debug)]
pub struct RawCounter {
    /// Firmware-visible address referenced by wait/update entries
    pub addr: HwAddr,
    /// The mapped current-value cell
    pub cell: ValueCell,
}

// =============================================================================
// SYNC COUNTER
// =============================================================================

/// One pooled synchronization counter.
///
/// Holds the `(current, next)` value pair plus the debug identity stamped at
/// acquire time. Shared as `Arc<SyncCounter>`; the current value may be
/// written by hardware at any moment, the next value only under the lock of
/// whichever subsystem owns the counter.
pub struct SyncCounter {
    /// Unique id for this use of the counter
    id: CounterId,
    /// What the counter is used for (debug taxonomy)
    kind: CounterKind,
    /// Debug class name, normally the owning timeline's name
    class: Name,
    /// The underlying hardware counter
    raw: RawCounter,
    /// Next value reserved by software
    next: AtomicU32,
}

impl SyncCounter {
    /// Wrap a raw hardware counter with a fresh identity, resetting both
    /// values to zero.
    pub fn new(id: CounterId, kind: CounterKind, class: Name, raw: RawCounter) -> Self {
        // Crucial to reset the counter: a recycled cell still holds the
        // unused sentinel.
        raw.cell.store(0);
        Self {
            id,
            kind,
            class,
            raw,
            next: AtomicU32::new(0),
        }
    }

    /// Unique id of this counter use
    #[inline]
    pub fn id(&self) -> CounterId {
        self.id
    }

    /// Counter kind
    #[inline]
    pub fn kind(&self) -> CounterKind {
        self.kind
    }

    /// Debug class name
    #[inline]
    pub fn class(&self) -> &str {
        self.class.as_str()
    }

    /// Firmware address of the counter
    #[inline]
    pub fn addr(&self) -> HwAddr {
        self.raw.addr
    }

    /// The hardware value cell (for returning the counter to the pool)
    #[inline]
    pub fn raw(&self) -> &RawCounter {
        &self.raw
    }

    /// Current hardware-visible value
    #[inline]
    pub fn current(&self) -> u32 {
        self.raw.cell.load()
    }

    /// Last value reserved by software
    #[inline]
    pub fn next(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }

    /// Reserve the next value, returning it.
    ///
    /// Caller must hold the lock of the subsystem that owns this counter.
    #[inline]
    pub fn advance(&self) -> u32 {
        self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Roll the reserved value back to `value`.
    ///
    /// Only the reservation-abandon path uses this; see the rollback
    /// contract documented there.
    #[inline]
    pub fn set_next(&self, value: u32) {
        self.next.store(value, Ordering::Release);
    }

    /// Force-complete: set the current value to the reserved value.
    ///
    /// Used by idle/rollback paths and by foreign waiter callbacks, where no
    /// hardware write will ever target the counter.
    #[inline]
    pub fn complete(&self) {
        self.raw.cell.store(self.next());
    }

    /// True when the current value has reached the reserved value
    #[inline]
    pub fn is_met(&self) -> bool {
        self.current() == self.next()
    }
}

impl fmt::Debug for SyncCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncCounter {{ id={} fw={} curr={:#x} next={:#x} {} ({}) }}",
            self.id,
            self.raw.addr,
            self.current(),
            self.next(),
            self.class.as_str(),
            self.kind.name()
        )
    }
}

// =============================================================================
// KERNEL PAIR
// =============================================================================

/// The fence counter plus an optional cleanup counter.
///
/// The fence counter is what hardware must reach. When a fence point is used
/// for checking only, there is no way to know when the check was consumed, so
/// a second counter is attached lazily and bumped by an update entry in the
/// same command stream; reclamation then waits for both.
///
/// Clones share the cleanup slot, so a pair handed to deferred reclamation
/// observes a cleanup counter attached later by the query path.
#[derive(Clone)]
pub struct KernelPair {
    fence: Arc<SyncCounter>,
    cleanup: Arc<spin::Mutex<Option<Arc<SyncCounter>>>>,
}

impl KernelPair {
    /// Create a pair with no cleanup counter
    pub fn new(fence: Arc<SyncCounter>) -> Self {
        Self {
            fence,
            cleanup: Arc::new(spin::Mutex::new(None)),
        }
    }

    /// Create a pair with the cleanup counter already attached (foreign
    /// shadows allocate both up front)
    pub fn with_cleanup(fence: Arc<SyncCounter>, cleanup: Arc<SyncCounter>) -> Self {
        Self {
            fence,
            cleanup: Arc::new(spin::Mutex::new(Some(cleanup))),
        }
    }

    /// The fence counter
    #[inline]
    pub fn fence(&self) -> &Arc<SyncCounter> {
        &self.fence
    }

    /// The cleanup counter, if one has been attached
    pub fn cleanup(&self) -> Option<Arc<SyncCounter>> {
        self.cleanup.lock().clone()
    }

    /// Get the cleanup counter, attaching one from `init` on first use
    pub fn cleanup_or_init<F>(&self, init: F) -> crate::Result<Arc<SyncCounter>>
    where
        F: FnOnce() -> crate::Result<Arc<SyncCounter>>,
    {
        let mut slot = self.cleanup.lock();
        if let Some(cleanup) = slot.as_ref() {
            return Ok(Arc::clone(cleanup));
        }
        let cleanup = init()?;
        *slot = Some(Arc::clone(&cleanup));
        Ok(cleanup)
    }

    /// True when the pair can be returned to the pool: the fence counter is
    /// met and any cleanup counter is met as well.
    pub fn is_reclaimable(&self) -> bool {
        if !self.fence.is_met() {
            return false;
        }
        match self.cleanup.lock().as_ref() {
            Some(cleanup) => cleanup.is_met(),
            None => true,
        }
    }
}

impl fmt::Debug for KernelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cleanup.lock().as_ref() {
            Some(cleanup) => write!(
                f,
                "KernelPair {{ fence: {:?}, cleanup: {:?} }}",
                self.fence, cleanup
            ),
            None => write!(f, "KernelPair {{ fence: {:?} }}", self.fence),
        }
    }
}

// =============================================================================
// SYNC DATA
// =============================================================================

/// Shared payload of a fence point.
///
/// Every duplicate of a fence point shares one `SyncData`. The explicit
/// refcount decides when deferred reclamation of the kernel pair begins: it
/// starts at one, duplication increments it, release decrements it, and the
/// releaser that observes zero hands the pair over - exactly once.
///
/// A payload without a kernel pair is an idle point: always signaled, no
/// hardware dependency.
pub struct SyncData {
    kernel: Option<KernelPair>,
    timeline_fence_value: u32,
    timeline_update_value: u32,
    refcount: AtomicU32,
}

impl SyncData {
    /// Create a payload bound to a kernel pair
    pub fn new(kernel: KernelPair, fence_value: u32, update_value: u32) -> Self {
        Self {
            kernel: Some(kernel),
            timeline_fence_value: fence_value,
            timeline_update_value: update_value,
            refcount: AtomicU32::new(1),
        }
    }

    /// Create an idle payload (always signaled)
    pub fn new_idle(fence_value: u32) -> Self {
        Self {
            kernel: None,
            timeline_fence_value: fence_value,
            timeline_update_value: fence_value,
            refcount: AtomicU32::new(1),
        }
    }

    /// The kernel pair, `None` for idle points
    #[inline]
    pub fn kernel(&self) -> Option<&KernelPair> {
        self.kernel.as_ref()
    }

    /// Timeline value this point waits on ("everything already queued")
    #[inline]
    pub fn timeline_fence_value(&self) -> u32 {
        self.timeline_fence_value
    }

    /// Timeline value recorded for this point's own update
    #[inline]
    pub fn timeline_update_value(&self) -> u32 {
        self.timeline_update_value
    }

    /// True when the point carries no hardware dependency
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.kernel.is_none()
    }

    /// True when the point is signaled: idle, or the fence counter is met
    pub fn has_signaled(&self) -> bool {
        match &self.kernel {
            None => true,
            Some(kernel) => kernel.fence().is_met(),
        }
    }

    /// Take another reference for a duplicated point
    #[inline]
    pub fn retain(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference; returns true for the caller that observed the
    /// count reach zero and must hand the kernel pair to reclamation.
    #[inline]
    pub fn release(&self) -> bool {
        self.refcount.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Current reference count (diagnostics only)
    #[inline]
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SyncData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kernel {
            Some(kernel) => write!(
                f,
                "SyncData {{ tl_fence={} tl_update={} ref={} {:?} }}",
                self.timeline_fence_value,
                self.timeline_update_value,
                self.refcount(),
                kernel
            ),
            None => write!(
                f,
                "SyncData {{ tl_fence={} tl_update={} ref={} idle }}",
                self.timeline_fence_value,
                self.timeline_update_value,
                self.refcount()
            ),
        }
    }
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::assert_impl_all!(SyncCounter: Send, Sync);
static_assertions::assert_impl_all!(KernelPair: Send, Sync);
static_assertions::assert_impl_all!(SyncData: Send, Sync);

// =============================================================================
// TESTS
// =============================================================================
