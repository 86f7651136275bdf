//! # EMBER Synchronization Engine
//!
//! Explicit fence/timeline synchronization for GPU command submission: a
//! recyclable counter pool, per-context timelines, two-phase fence
//! reservation, a bridge for fences from other synchronization domains, and
//! the query protocol that turns fences into hardware wait/update entries.
//!
//! The [`SyncEngine`] context owns everything; no global state. A typical
//! consumer opens one [`TimelineSession`] per submission context, reserves a
//! fence per submission with `alloc_fence`, emits its wait/update entries
//! with the query calls, then materializes the fence with `create_fence`.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

mod bridge;
mod debug;
mod engine;
mod query;
mod reservation;
mod session;

pub use debug::{FenceDebugInfo, FencePointRecord};
pub use engine::SyncEngine;
pub use query::{QueryLists, SyncOp};
pub use reservation::Reservation;
pub use session::TimelineSession;

// The engine crate is the facade: consumers get the whole surface from here.
pub use ember_core::{
    clamp_name, CounterId, CounterKind, Error, EventWait, ForeignFence, ForeignWaiter, HwAddr,
    KernelPair, Name, RawCounter, Result, SyncBackend, SyncCounter, SyncData, ValueCell,
    WaiterStatus, NAME_MAX, VALUE_INVALID, VALUE_UNUSED,
};
pub use ember_pool::{CounterPool, DumpFlags, PoolStats, POOL_MAX_FREE};
pub use ember_reclaim::{DrainState, ReclaimQueue, ReclaimStats};
pub use ember_timeline::{Fence, FencePoint, SyncPoint, Timeline, TimelineRegistry};
