//! # EMBER Deferred Reclamation
//!
//! Counters cannot be returned to the pool the moment their last software
//! reference drops: hardware may still be counting towards them, and foreign
//! fence references must be dropped from a context that is allowed to block.
//! This crate provides the queue that parks both until a background sweep can
//! retire them safely.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

mod reclaim;

pub use reclaim::{DrainState, ReclaimQueue, ReclaimStats, RECLAIM_WAIT_NS};
