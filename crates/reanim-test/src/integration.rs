//! End-to-end Integration Suite
//!
//! Host-shaped flows through the whole engine:
//! - pack load, selection and the full playback lifecycle
//! - candidate actions reaching the host
//! - loop reselection with blending
//! - synchronized index biasing and restoration
//! - non-resident motions

use serde_json::json;

use reanim_core::{MotionSlot, PlaybackHandle, ReanimResult};
use reanim_playback::{Frame, MotionHost, MotionSource, PlaybackEventKind, Pose};
use reanim_rules::TriggerEvent;
use reanim_runtime::{EngineConfig, ReplacerEngine};

use crate::mock::{MockMotionHost, MockSubject, MockWorld};
use crate::scenario::{CandidateSpec, PackSpec};

/// One actor playing one slot through the engine
pub struct PlaybackSession<'e> {
    pub engine: &'e ReplacerEngine,
    pub subject: MockSubject,
    pub world: MockWorld,
    pub motions: MockMotionHost,
    pub handle: PlaybackHandle,
    pub slot: MotionSlot,
}

impl<'e> PlaybackSession<'e> {
    pub fn new(engine: &'e ReplacerEngine, subject: MockSubject, slot: u32) -> Self {
        PlaybackSession {
            engine,
            subject,
            world: MockWorld::new(),
            motions: MockMotionHost::new(),
            handle: PlaybackHandle::new(1),
            slot: MotionSlot::new(slot),
        }
    }

    pub fn start(&self, synchronized: bool) -> ReanimResult<MotionSource> {
        let mut frame = Frame::new(&self.subject, &self.world);
        let activation = self
            .engine
            .activate(self.handle, self.slot, &mut frame, synchronized)?;
        Ok(activation.source)
    }

    /// Advance and sample one frame; `None` while the motion is not resident
    pub fn step(&self, dt: f32) -> ReanimResult<Option<Pose>> {
        self.engine.update(self.handle, dt)?;
        self.engine.generate(self.handle, &self.motions)
    }

    pub fn looped(&self) -> ReanimResult<bool> {
        let mut frame = Frame::new(&self.subject, &self.world);
        self.engine.on_loop(self.handle, &mut frame)
    }

    pub fn trigger(&self, event: &str) -> ReanimResult<bool> {
        let mut frame = Frame::new(&self.subject, &self.world);
        self.engine
            .on_event(self.handle, &TriggerEvent::new(event), false, &mut frame)
    }

    pub fn stop(&self) -> ReanimResult<()> {
        let mut frame = Frame::new(&self.subject, &self.world);
        self.engine.deactivate(self.handle, &mut frame)
    }

    /// Source currently driving the handle
    pub fn source(&self) -> Option<MotionSource> {
        self.engine
            .tracker()
            .instance_info(self.handle)
            .map(|info| info.source)
    }

    /// Marker x of the sampled pose; see [`MockMotionHost::marker`]
    pub fn marker(&self) -> Option<f32> {
        let pose = self.engine.generate(self.handle, &self.motions).ok()??;
        pose.joints.first().map(|j| j.translation.x)
    }

    pub fn sample_direct(&self, source: MotionSource) -> Option<Pose> {
        self.motions.sample(source, 0.0)
    }
}

/// Engine with one small locomotion pack
pub fn locomotion_engine(config: EngineConfig) -> ReplacerEngine {
    let engine = ReplacerEngine::new(config);
    let pack = PackSpec::new("locomotion", 6)
        .preset(
            "wounded",
            vec![json!({
                "condition": "CompareValues",
                "valueA": {"variable": "health", "scope": "subject"},
                "comparison": "<",
                "valueB": 30.0
            })],
        )
        .candidate(
            CandidateSpec::new("limp", 1, 0)
                .priority(20)
                .when_preset("wounded")
                .on_activate(json!({"action": "SendEvent", "event": "limp_start"}))
                .on_deactivate(json!({"action": "SendEvent", "event": "limp_end"})),
        )
        .candidate(
            CandidateSpec::new("sneak", 1, 1)
                .priority(10)
                .when_flag("sneaking")
                .on_trigger(json!({"action": "SendEvent", "event": "soft_step", "trigger": {"event": "footstep"}})),
        )
        .candidate(
            CandidateSpec::new("swagger", 1, 2)
                .when_flag("drunk")
                .random_variants(&[(2, 1.0), (3, 1.0)]),
        );
    let _ = engine.load_pack(&pack.build());
    engine
}
