//! # Fence Introspection
//!
//! Structured per-point records for debugfs-style consumers, bounded by a
//! caller capacity.

use arrayvec::ArrayString;

use alloc::vec::Vec;

use ember_core::{CounterId, Error, HwAddr, Name, Result};
use ember_timeline::{Fence, FencePoint};

use crate::engine::SyncEngine;

/// One fence point, flattened for display.
#[derive(Debug, Clone)]
pub struct FencePointRecord {
    /// True for points from another synchronization domain
    pub foreign: bool,
    /// Counter id, for native points with a counter
    pub id: Option<CounterId>,
    /// Firmware address of the fence counter
    pub addr: Option<HwAddr>,
    /// Current counter value
    pub current: u32,
    /// Reserved counter value
    pub next: u32,
    /// Timeline value the point consumed at reservation
    pub timeline_value: u32,
    /// Foreign-domain value string, empty for native points
    pub value_str: ArrayString<64>,
    /// Whether the point has signaled
    pub signaled: bool,
}

/// A fence flattened for display.
#[derive(Debug, Clone)]
pub struct FenceDebugInfo {
    /// Fence name
    pub name: Name,
    /// True when every point has signaled
    pub signaled: bool,
    /// Per-point records, in fence order
    pub points: Vec<FencePointRecord>,
}

impl SyncEngine {
    /// Flatten `fence` into at most `max_records` point records.
    ///
    /// Fails with [`Error::InsufficientSpace`] when the fence has more
    /// points, producing nothing.
    pub fn debug_fence(&self, fence: &Fence, max_records: usize) -> Result<FenceDebugInfo> {
        if fence.points().len() > max_records {
            return Err(Error::InsufficientSpace);
        }

        let mut points = Vec::with_capacity(fence.points().len());
        for point in fence.points() {
            points.push(match point {
                FencePoint::Native(native) => {
                    let data = native.data();
                    let (id, addr, current, next) = match data.kernel() {
                        Some(kernel) => (
                            Some(kernel.fence().id()),
                            Some(kernel.fence().addr()),
                            kernel.fence().current(),
                            kernel.fence().next(),
                        ),
                        None => (None, None, 0, 0),
                    };
                    FencePointRecord {
                        foreign: false,
                        id,
                        addr,
                        current,
                        next,
                        timeline_value: data.timeline_update_value(),
                        value_str: ArrayString::new(),
                        signaled: native.has_signaled(),
                    }
                }
                FencePoint::Foreign(foreign) => FencePointRecord {
                    foreign: true,
                    id: None,
                    addr: None,
                    current: 0,
                    next: 0,
                    timeline_value: 0,
                    value_str: foreign.value_str(),
                    signaled: foreign.is_signaled(),
                },
            });
        }

        Ok(FenceDebugInfo {
            name: ember_core::clamp_name(fence.name()),
            signaled: fence.status(),
            points,
        })
    }
}
