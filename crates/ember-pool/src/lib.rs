//! # EMBER Counter Pool
//!
//! Recycling allocator for hardware-visible synchronization counters.
//!
//! Allocating a raw counter crosses into the services backend and is
//! comparatively expensive, so released counters are parked on a bounded
//! free list and handed back out with a fresh identity. The bound caps the
//! memory a bursty workload can pin while keeping steady-state reuse cheap;
//! counters leaving the pool are stamped with sentinel values so stale
//! readers are obvious in debug dumps.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

mod pool;

pub use pool::{
    CounterDebugRecord, CounterPool, DumpFlags, PoolStats, POOL_MAX_FREE,
};
