//! # EMBER Core
//!
//! Foundational types and the fence data model for the EMBER synchronization
//! engine.
//!
//! EMBER tracks GPU work completion with small hardware-visible counters:
//! a counter is "met" when the value hardware has written equals the value
//! software last reserved. Everything above this crate (pooling, timelines,
//! reservations, the foreign-fence bridge) is built from the three shapes
//! defined here:
//!
//! - [`SyncCounter`] - one hardware-visible `(current, next)` counter pair
//! - [`KernelPair`] - the fence counter plus an optional cleanup counter
//! - [`SyncData`] - the refcounted payload shared by duplicated fence points
//!
//! The subsystems EMBER depends on but does not implement (raw counter
//! allocation, the global completion event object, foreign fences from other
//! synchronization domains) are abstracted behind the traits in [`traits`].

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod sync;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use sync::{KernelPair, RawCounter, SyncData, SyncCounter, ValueCell};
pub use traits::{EventWait, ForeignFence, ForeignWaiter, SyncBackend, WaiterStatus};
pub use types::*;
