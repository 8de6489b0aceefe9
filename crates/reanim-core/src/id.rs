//! Identity types for the replacement engine
//!
//! Host-facing identifiers are thin newtypes over the integers the host
//! already uses; engine-assigned keys come from monotonic counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{ReanimError, ReanimResult};

/// Original motion slot - the host's built-in index of one unmodified clip
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MotionSlot(pub u32);

impl MotionSlot {
    #[inline]
    pub fn new(index: u32) -> Self {
        MotionSlot(index)
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for MotionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}

impl fmt::Display for MotionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replacement motion identity in the shared index space
///
/// Formed as `pack offset + local index`, so two rule packs never collide.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MotionId(pub u32);

impl MotionId {
    #[inline]
    pub fn new(index: u32) -> Self {
        MotionId(index)
    }

    /// Build from a pack base offset and a pack-local index
    #[inline]
    pub fn from_offset(base: u32, local: u32) -> ReanimResult<Self> {
        base.checked_add(local).map(MotionId).ok_or_else(|| {
            ReanimError::invalid("motion", format!("{} + {} overflows the motion index", base, local))
        })
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for MotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Motion({})", self.0)
    }
}

impl fmt::Display for MotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque host identifier for one in-progress playback
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaybackHandle(pub u64);

impl PlaybackHandle {
    #[inline]
    pub fn new(raw: u64) -> Self {
        PlaybackHandle(raw)
    }
}

impl fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:016x})", self.0)
    }
}

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// In-world entity a rule is evaluated against
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubjectId(pub u64);

impl SubjectId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        SubjectId(raw)
    }
}

impl fmt::Debug for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subject({:08x})", self.0)
    }
}

/// Rule pack identity - assigned at load, stable for the pack's lifetime
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RulePackId(pub u32);

impl RulePackId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        RulePackId(raw)
    }
}

impl fmt::Debug for RulePackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pack({})", self.0)
    }
}

impl fmt::Display for RulePackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replacement candidate identity
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CandidateId(pub u64);

impl CandidateId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        CandidateId(raw)
    }

    /// Allocate a process-unique candidate id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CandidateId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate({})", self.0)
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable key of one condition or action node
///
/// Assigned once at construction and never reused, so side tables
/// (weights, cached random draws) can follow a node across moves.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleKey(pub u64);

impl RuleKey {
    /// Allocate a fresh key
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RuleKey(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule#{}", self.0)
    }
}
