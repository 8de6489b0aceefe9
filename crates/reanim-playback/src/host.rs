//! Host interfaces used by the tracker

use std::fmt;

use reanim_core::{MotionId, MotionSlot, PlaybackHandle};

use crate::Pose;

/// Which motion a pose is sampled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionSource {
    /// The host's own motion for a slot
    Original(MotionSlot),
    /// A substitute owned by a rule pack
    Replacement(MotionId),
}

impl fmt::Display for MotionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionSource::Original(slot) => write!(f, "original:{}", slot),
            MotionSource::Replacement(motion) => write!(f, "motion:{}", motion),
        }
    }
}

/// Motion sampling, provided by the host animation runtime
pub trait MotionHost: Send + Sync {
    /// Sample `source` at `time` seconds; `None` while the motion is not resident
    fn sample(&self, source: MotionSource, time: f32) -> Option<Pose>;

    /// Crossfade two poses
    fn blend(&self, from: &Pose, to: &Pose, weight: f32) -> Pose {
        from.blend(to, weight)
    }
}

/// Synchronized playback index, provided by the host
pub trait SyncHost: Send + Sync {
    /// Current index of a synchronized handle
    fn index(&self, handle: PlaybackHandle) -> Option<u32>;

    fn set_index(&self, handle: PlaybackHandle, index: u32);
}
