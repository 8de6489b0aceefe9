//! Playback instance - engine state attached to one live playback handle

use std::sync::Arc;

use reanim_core::{CandidateId, MotionId, MotionSlot, PlaybackHandle, SubjectId};
use reanim_rules::ConditionStateStore;
use reanim_select::ReplacementCandidate;

use crate::MotionSource;

/// Crossfade in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    /// Outgoing motion
    pub from: MotionSource,
    /// Local time of the outgoing motion
    pub from_time: f32,
    pub elapsed: f32,
    pub duration: f32,
}

impl BlendState {
    pub fn weight(&self) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_done(&self) -> bool {
        self.weight() >= 1.0
    }
}

/// Synchronized index before and after biasing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncBias {
    pub original: u32,
    pub biased: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Blending,
}

/// Engine-owned state of one handle, alive between activate and deactivate
#[derive(Debug)]
pub struct PlaybackInstance {
    pub(crate) handle: PlaybackHandle,
    pub(crate) slot: MotionSlot,
    pub(crate) subject: SubjectId,
    pub(crate) candidate: Option<Arc<ReplacementCandidate>>,
    pub(crate) motion: Option<MotionId>,
    pub(crate) variant: Option<usize>,
    pub(crate) activated_with_replacement: bool,
    pub(crate) time: f32,
    pub(crate) loops: u32,
    pub(crate) blend: Option<BlendState>,
    pub(crate) synchronized: bool,
    pub(crate) sync: Option<SyncBias>,
    pub(crate) state: ConditionStateStore,
}

impl PlaybackInstance {
    pub(crate) fn new(
        handle: PlaybackHandle,
        slot: MotionSlot,
        subject: SubjectId,
        synchronized: bool,
    ) -> Self {
        PlaybackInstance {
            handle,
            slot,
            subject,
            candidate: None,
            motion: None,
            variant: None,
            activated_with_replacement: false,
            time: 0.0,
            loops: 0,
            blend: None,
            synchronized,
            sync: None,
            state: ConditionStateStore::new(),
        }
    }

    /// Motion currently driving the handle
    pub fn source(&self) -> MotionSource {
        match self.motion {
            Some(motion) => MotionSource::Replacement(motion),
            None => MotionSource::Original(self.slot),
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.blend.is_some() {
            PlaybackState::Blending
        } else {
            PlaybackState::Playing
        }
    }

    pub(crate) fn advance(&mut self, dt: f32) {
        self.time += dt;
        if let Some(blend) = self.blend.as_mut() {
            blend.elapsed += dt;
            blend.from_time += dt;
        }
    }

    pub(crate) fn start_blend(&mut self, from: MotionSource, from_time: f32, duration: f32) {
        self.blend = if duration > 0.0 {
            Some(BlendState {
                from,
                from_time,
                elapsed: 0.0,
                duration,
            })
        } else {
            None
        };
    }

    pub fn info(&self) -> InstanceInfo {
        InstanceInfo {
            handle: self.handle,
            slot: self.slot,
            subject: self.subject,
            candidate: self.candidate.as_ref().map(|c| c.id()),
            source: self.source(),
            variant: self.variant,
            activated_with_replacement: self.activated_with_replacement,
            state: self.state(),
            time: self.time,
            loops: self.loops,
            sync: self.sync,
            cached_draws: self.state.len(),
        }
    }
}

/// Read-only snapshot of an instance for tooling
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceInfo {
    pub handle: PlaybackHandle,
    pub slot: MotionSlot,
    pub subject: SubjectId,
    pub candidate: Option<CandidateId>,
    pub source: MotionSource,
    pub variant: Option<usize>,
    pub activated_with_replacement: bool,
    pub state: PlaybackState,
    pub time: f32,
    pub loops: u32,
    pub sync: Option<SyncBias>,
    pub cached_draws: usize,
}
