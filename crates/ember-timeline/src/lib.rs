//! # EMBER Timelines
//!
//! The ordering layer of the synchronization engine: per-context timelines,
//! the fence points queued on them, multi-point fences, and the registry that
//! re-scans every timeline when hardware reports progress.
//!
//! A timeline is one monotonically advancing counter. Each fence point
//! snapshots "everything queued before me" (its fence value) and reserves
//! "my own completion" (its update value); a point has signaled once the
//! timeline counter passes its fence value. Points retire strictly in
//! timeline order.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

mod fence;
mod point;
mod registry;
mod timeline;

pub use fence::{Fence, FencePoint};
pub use point::SyncPoint;
pub use registry::{TimelineRegistry, RELEASE_WAIT_NS};
pub use timeline::Timeline;
