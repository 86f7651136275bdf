//! # EMBER Core Types
//!
//! Fundamental type definitions used across the synchronization engine.
//!
//! These types provide:
//! - Strong typing for hardware counter addresses and identifiers
//! - The counter kind taxonomy used by debug dumps
//! - Wrap-aware ordering for 32-bit timeline values

use core::cmp::Ordering;
use core::fmt;

use arrayvec::ArrayString;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum length of a counter class name / timeline name / fence name.
///
/// Names longer than this are truncated; the original interface carried
/// 32-byte buffers with a trailing NUL, so 31 usable characters.
pub const NAME_MAX: usize = 31;

/// Capacity of the fixed name buffers ([`NAME_MAX`] plus slack for the
/// truncation marker when composing process names).
pub const NAME_CAP: usize = 32;

/// Sentinel written to a counter parked on the pool free list.
pub const VALUE_UNUSED: u32 = 0xffff_ffff;

/// Sentinel written to a counter released back to hardware for good.
///
/// Any consumer still reading the counter after release sees this value in
/// debug dumps instead of a stale-but-plausible completion value.
pub const VALUE_INVALID: u32 = 0xdead_beef;

// =============================================================================
// COUNTER IDENTIFIER
// =============================================================================

/// Unique identifier assigned to a counter each time it leaves the pool.
///
/// A recycled counter gets a fresh id, so an id never refers to two logical
/// uses of the same hardware counter.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct CounterId(u32);

impl CounterId {
    /// Create a counter id from its raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CounterId({})", self.0)
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// HARDWARE ADDRESS
// =============================================================================

/// Firmware-visible address of a hardware counter.
///
/// This is the address the command stream references in wait/update entries.
/// It is not a CPU pointer and cannot be dereferenced by software.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct HwAddr(u32);

impl HwAddr {
    /// Create a new hardware address
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HwAddr(0x{:08x})", self.0)
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// =============================================================================
// COUNTER KIND
// =============================================================================

/// What a pooled counter is currently used for.
///
/// Recorded at acquire time and shown in debug dumps; the engine itself only
/// distinguishes kinds for diagnostics, never for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CounterKind {
    /// Per-session timeline counter
    Timeline       = 0,
    /// Fence point counter, written by hardware on completion
    Fence          = 1,
    /// Cleanup counter tracking consumed check-only dependencies
    Cleanup        = 2,
    /// Shadow counter for a fence from another synchronization domain
    ForeignFence   = 3,
    /// Cleanup counter paired with a foreign shadow
    ForeignCleanup = 4,
}

impl CounterKind {
    /// Human-readable kind name, as printed by the debug dump
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Timeline => "Timeline",
            Self::Fence => "Fence",
            Self::Cleanup => "Cleanup",
            Self::ForeignFence => "Foreign Fence",
            Self::ForeignCleanup => "Foreign Cleanup",
        }
    }
}

// =============================================================================
// NAMES
// =============================================================================

/// Fixed-capacity name carried by counters, timelines and fences.
pub type Name = ArrayString<NAME_CAP>;

/// Build a [`Name`] from an arbitrary string, truncating at [`NAME_MAX`]
/// characters on a UTF-8 boundary.
pub fn clamp_name(s: &str) -> Name {
    let mut name = Name::new();
    for ch in s.chars() {
        if name.len() + ch.len_utf8() > NAME_MAX {
            break;
        }
        // Capacity checked above
        let _ = name.try_push(ch);
    }
    name
}

// =============================================================================
// WRAP-AWARE ORDERING
// =============================================================================

/// Wrap-aware ordering of two 32-bit timeline values.
///
/// Timeline counters wrap over a session's lifetime, so values are compared
/// by signed difference: `0xffff_fff0` orders before `0x0000_0005`.
#[inline]
pub fn wrap_cmp(a: u32, b: u32) -> Ordering {
    if a == b {
        Ordering::Equal
    } else if (a.wrapping_sub(b) as i32) < 0 {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// True if `a` orders before `b` under wrap-aware comparison.
#[inline]
pub fn wrap_before(a: u32, b: u32) -> bool {
    wrap_cmp(a, b) == Ordering::Less
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_cmp_plain() {
        assert_eq!(wrap_cmp(1, 2), Ordering::Less);
        assert_eq!(wrap_cmp(2, 1), Ordering::Greater);
        assert_eq!(wrap_cmp(7, 7), Ordering::Equal);
    }

    #[test]
    fn test_wrap_cmp_across_wrap() {
        // A value just below the wrap boundary orders before a small value
        // just after it.
        assert!(wrap_before(0xffff_fff0, 0x0000_0005));
        assert!(!wrap_before(0x0000_0005, 0xffff_fff0));
    }

    #[test]
    fn test_clamp_name_truncates() {
        let name = clamp_name("a-process-name-that-is-far-too-long-to-keep");
        assert_eq!(name.len(), NAME_MAX);
    }

    #[test]
    fn test_clamp_name_short() {
        let name = clamp_name("gl-stream");
        assert_eq!(name.as_str(), "gl-stream");
    }

    #[test]
    fn test_counter_kind_names() {
        assert_eq!(CounterKind::Timeline.name(), "Timeline");
        assert_eq!(CounterKind::ForeignCleanup.name(), "Foreign Cleanup");
    }
}
