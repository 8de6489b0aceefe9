//! Playback instance tracker
//!
//! Maps live playback handles to engine state and drives each one through
//! activate, update, generate, loop/echo and deactivate. All callbacks come
//! from the host's real-time thread; the map lock is only held long enough to
//! find or insert an instance, each instance has its own mutex.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use reanim_core::{
    CandidateId, MotionId, MotionSlot, PlaybackHandle, ReanimError, ReanimResult, RulePackId,
};
use reanim_rules::TriggerEvent;
use reanim_select::{CandidateList, ReplacementCandidate};

use crate::{
    Frame, IndexSpace, InstanceInfo, MotionHost, MotionSource, PlaybackInstance, Pose, SyncBias,
    SyncHost,
};

// ============================================================================
// Config & stats
// ============================================================================

/// Tracker configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Crossfade length in seconds when the driving motion changes
    pub blend_duration: f32,
    /// Crossfade length in seconds for echoes
    pub echo_blend_duration: f32,
    /// Maximum retained playback events
    pub event_log_capacity: usize,
    /// Nesting limit for rule evaluation
    pub max_depth: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            blend_duration: 0.25,
            echo_blend_duration: 0.15,
            event_log_capacity: 256,
            max_depth: reanim_rules::DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub activations: u64,
    pub replaced_activations: u64,
    pub switches: u64,
    pub loops: u64,
    pub loop_reselections: u64,
    pub echoes: u64,
    pub triggers_delivered: u64,
    pub revalidations: u64,
    pub deactivations: u64,
    pub blends_completed: u64,
    pub samples_missed: u64,
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEventKind {
    Activated {
        candidate: Option<CandidateId>,
        motion: Option<MotionId>,
    },
    Switched {
        from: Option<CandidateId>,
        to: Option<CandidateId>,
    },
    Looped {
        reselected: bool,
    },
    Echoed {
        crossfade: bool,
    },
    Triggered {
        event: String,
        ran: bool,
    },
    Released,
    Deactivated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub handle: PlaybackHandle,
    pub slot: MotionSlot,
    pub kind: PlaybackEventKind,
}

/// Result of activating a handle
#[derive(Debug, Clone)]
pub struct Activation {
    pub handle: PlaybackHandle,
    pub candidate: Option<Arc<ReplacementCandidate>>,
    pub source: MotionSource,
    pub variant: Option<usize>,
}

impl Activation {
    pub fn is_replaced(&self) -> bool {
        self.candidate.is_some()
    }
}

/// What the host should do for an echo
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EchoPlan {
    /// Not replaced, the host echoes its own motion
    HostDefault,
    Crossfade {
        from: MotionSource,
        to: MotionSource,
        duration: f32,
    },
}

// ============================================================================
// Tracker
// ============================================================================

/// Concurrent map of live playback handles
pub struct PlaybackTracker {
    config: TrackerConfig,
    instances: RwLock<HashMap<PlaybackHandle, Arc<Mutex<PlaybackInstance>>>>,
    sync_space: Arc<IndexSpace>,
    sync_host: Option<Arc<dyn SyncHost>>,
    events: Mutex<VecDeque<PlaybackEvent>>,
    stats: Mutex<TrackerStats>,
}

impl fmt::Debug for PlaybackTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackTracker")
            .field("config", &self.config)
            .field("active", &self.len())
            .field("synchronized", &self.sync_host.is_some())
            .finish_non_exhaustive()
    }
}

impl PlaybackTracker {
    pub fn new(config: TrackerConfig, sync_space: Arc<IndexSpace>) -> Self {
        PlaybackTracker {
            config,
            instances: RwLock::new(HashMap::new()),
            sync_space,
            sync_host: None,
            events: Mutex::new(VecDeque::new()),
            stats: Mutex::new(TrackerStats::default()),
        }
    }

    pub fn with_sync_host(mut self, host: Arc<dyn SyncHost>) -> Self {
        self.sync_host = Some(host);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn sync_space(&self) -> &Arc<IndexSpace> {
        &self.sync_space
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    pub fn is_active(&self, handle: PlaybackHandle) -> bool {
        self.instances.read().contains_key(&handle)
    }

    pub fn handles(&self) -> Vec<PlaybackHandle> {
        self.instances.read().keys().copied().collect()
    }

    /// Original slot of a live handle
    pub fn slot_of(&self, handle: PlaybackHandle) -> Option<MotionSlot> {
        let entry = self.instances.read().get(&handle).cloned()?;
        let slot = entry.lock().slot;
        Some(slot)
    }

    pub fn instance_info(&self, handle: PlaybackHandle) -> Option<InstanceInfo> {
        let entry = self.instances.read().get(&handle).cloned()?;
        let info = entry.lock().info();
        Some(info)
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats.lock().clone()
    }

    /// Retained events, oldest first
    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn drain_events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().drain(..).collect()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start tracking a handle and select its replacement once
    pub fn activate(
        &self,
        handle: PlaybackHandle,
        slot: MotionSlot,
        list: Option<&CandidateList>,
        frame: &mut Frame<'_>,
        synchronized: bool,
    ) -> ReanimResult<Activation> {
        if self.is_active(handle) {
            return Err(ReanimError::HandleAlreadyActive(handle));
        }

        let subject = frame.subject.subject_id();
        let mut inst = PlaybackInstance::new(handle, slot, subject, synchronized);
        if let Some(candidate) = self.select(&mut inst, list, frame) {
            self.assign_candidate(&mut inst, candidate, frame);
            inst.activated_with_replacement = true;
        }
        self.apply_sync(&mut inst);

        let activation = Activation {
            handle,
            candidate: inst.candidate.clone(),
            source: inst.source(),
            variant: inst.variant,
        };
        let event = PlaybackEventKind::Activated {
            candidate: inst.candidate.as_ref().map(|c| c.id()),
            motion: inst.motion,
        };

        // held until on-activate has run so a racing deactivate sees it finished
        let entry = Arc::new(Mutex::new(inst));
        let mut inst = entry.lock();
        match self.instances.write().entry(handle) {
            Entry::Occupied(_) => {
                self.restore_sync(&mut inst);
                return Err(ReanimError::HandleAlreadyActive(handle));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
            }
        }
        self.run_on_activate(&mut inst, frame);
        drop(inst);

        {
            let mut stats = self.stats.lock();
            stats.activations += 1;
            if activation.is_replaced() {
                stats.replaced_activations += 1;
            }
        }
        if let Some(candidate) = &activation.candidate {
            debug!(
                %handle,
                %slot,
                candidate = candidate.name(),
                source = %activation.source,
                "activated with replacement"
            );
        }
        self.push_event(handle, slot, event);
        Ok(activation)
    }

    /// Advance local time; never re-evaluates
    pub fn update(&self, handle: PlaybackHandle, dt: f32) -> ReanimResult<()> {
        let entry = self.instance(handle)?;
        entry.lock().advance(dt);
        Ok(())
    }

    /// Sample the driving motion, crossfading while a blend is active.
    ///
    /// `None` means nothing is resident yet and the host keeps its own output.
    pub fn generate(
        &self,
        handle: PlaybackHandle,
        host: &dyn MotionHost,
    ) -> ReanimResult<Option<Pose>> {
        let entry = self.instance(handle)?;
        let mut inst = entry.lock();
        let target = host.sample(inst.source(), inst.time);

        let Some(blend) = inst.blend else {
            if target.is_none() {
                self.stats.lock().samples_missed += 1;
            }
            return Ok(target);
        };

        let Some(target) = target else {
            // Incoming not resident yet, hold the outgoing motion
            self.stats.lock().samples_missed += 1;
            return Ok(host.sample(blend.from, blend.from_time));
        };

        let pose = match host.sample(blend.from, blend.from_time) {
            Some(from) => host.blend(&from, &target, blend.weight()),
            None => target,
        };
        if blend.is_done() {
            inst.blend = None;
            self.stats.lock().blends_completed += 1;
        }
        Ok(Some(pose))
    }

    /// The driving motion wrapped around.
    ///
    /// Returns true when the driving motion changed.
    pub fn on_loop(
        &self,
        handle: PlaybackHandle,
        list: Option<&CandidateList>,
        frame: &mut Frame<'_>,
    ) -> ReanimResult<bool> {
        let entry = self.instance(handle)?;
        let mut inst = entry.lock();
        inst.loops += 1;
        let from = inst.source();
        let from_time = inst.time;
        inst.time = 0.0;
        self.stats.lock().loops += 1;

        let flags = inst.candidate.as_ref().map(|c| c.flags());
        let keep = flags.is_some_and(|f| f.keeps_random_results_on_loop() || !f.replaces_on_loop());
        if keep {
            self.push_event(handle, inst.slot, PlaybackEventKind::Looped { reselected: false });
            return Ok(false);
        }

        inst.state.clear();
        let next = self.select(&mut inst, list, frame);
        let changed = if same_candidate(inst.candidate.as_ref(), next.as_ref()) {
            self.repick_variant(&mut inst, frame, from, from_time, self.config.blend_duration)
        } else {
            self.switch(&mut inst, next, frame, from, from_time, self.config.blend_duration);
            true
        };

        self.stats.lock().loop_reselections += 1;
        if changed {
            debug!(%handle, source = %inst.source(), "loop switched motion");
        }
        self.push_event(handle, inst.slot, PlaybackEventKind::Looped { reselected: true });
        Ok(changed)
    }

    /// The host echoes (restarts while crossfading into itself)
    pub fn on_echo(
        &self,
        handle: PlaybackHandle,
        list: Option<&CandidateList>,
        frame: &mut Frame<'_>,
    ) -> ReanimResult<EchoPlan> {
        let entry = self.instance(handle)?;
        let mut inst = entry.lock();
        self.stats.lock().echoes += 1;

        let Some(candidate) = inst.candidate.clone() else {
            self.push_event(handle, inst.slot, PlaybackEventKind::Echoed { crossfade: false });
            return Ok(EchoPlan::HostDefault);
        };

        let from = inst.source();
        let from_time = inst.time;
        let duration = self.config.echo_blend_duration;
        let flags = candidate.flags();
        if flags.replaces_on_echo() {
            if !flags.keeps_random_results_on_loop() {
                inst.state.clear();
            }
            let next = self.select(&mut inst, list, frame);
            if same_candidate(inst.candidate.as_ref(), next.as_ref()) {
                self.repick_variant(&mut inst, frame, from, from_time, duration);
            } else {
                self.switch(&mut inst, next, frame, from, from_time, duration);
            }
        }
        inst.time = 0.0;
        inst.start_blend(from, from_time, duration);

        let plan = EchoPlan::Crossfade {
            from,
            to: inst.source(),
            duration,
        };
        trace!(%handle, ?plan, "echo");
        self.push_event(handle, inst.slot, PlaybackEventKind::Echoed { crossfade: true });
        Ok(plan)
    }

    /// Deliver a host event to the active candidate's trigger actions.
    ///
    /// `suppressed` is the host's no-trigger flag for the original motion.
    pub fn handle_event(
        &self,
        handle: PlaybackHandle,
        event: &TriggerEvent,
        suppressed: bool,
        frame: &mut Frame<'_>,
    ) -> ReanimResult<bool> {
        let entry = self.instance(handle)?;
        let mut inst = entry.lock();
        let Some(candidate) = inst.candidate.clone() else {
            return Ok(false);
        };
        if suppressed && !candidate.flags().ignores_no_trigger_flag() {
            return Ok(false);
        }

        let ran = {
            let mut ctx = frame
                .context(&mut inst.state, self.config.max_depth)
                .with_trigger(event);
            candidate.on_trigger().run(&mut ctx)
        };
        if ran {
            self.stats.lock().triggers_delivered += 1;
        }
        self.push_event(
            handle,
            inst.slot,
            PlaybackEventKind::Triggered {
                event: event.event.clone(),
                ran,
            },
        );
        Ok(ran)
    }

    /// Re-check an interruptible candidate; reselect when it no longer holds
    pub fn revalidate(
        &self,
        handle: PlaybackHandle,
        list: Option<&CandidateList>,
        frame: &mut Frame<'_>,
    ) -> ReanimResult<bool> {
        let entry = self.instance(handle)?;
        let mut inst = entry.lock();
        let Some(candidate) = inst.candidate.clone() else {
            return Ok(false);
        };
        if !candidate.flags().is_interruptible() {
            return Ok(false);
        }

        self.stats.lock().revalidations += 1;
        let holds = !candidate.is_disabled() && {
            let mut ctx = frame.context(&mut inst.state, self.config.max_depth);
            candidate.evaluate(&mut ctx)
        };
        if holds {
            return Ok(false);
        }

        let next = self.select(&mut inst, list, frame);
        let from = inst.source();
        let from_time = inst.time;
        self.switch(&mut inst, next, frame, from, from_time, self.config.blend_duration);
        Ok(true)
    }

    /// Stop tracking; the synchronized index is restored before actions run
    pub fn deactivate(&self, handle: PlaybackHandle, frame: &mut Frame<'_>) -> ReanimResult<()> {
        let entry = self
            .instances
            .write()
            .remove(&handle)
            .ok_or(ReanimError::UnknownHandle(handle))?;
        let mut inst = entry.lock();
        self.restore_sync(&mut inst);
        self.leave_candidate(&mut inst, frame);

        self.stats.lock().deactivations += 1;
        trace!(%handle, loops = inst.loops, "deactivated");
        self.push_event(handle, inst.slot, PlaybackEventKind::Deactivated);
        Ok(())
    }

    /// Detach every instance driven by a pack's candidates.
    ///
    /// Runs no actions; the handles fall back to their original motions.
    pub fn release_pack(&self, pack: RulePackId) -> usize {
        let entries: Vec<_> = self.instances.read().values().cloned().collect();
        let mut released = 0;
        for entry in entries {
            let mut inst = entry.lock();
            if inst.candidate.as_ref().map(|c| c.pack()) != Some(pack) {
                continue;
            }
            self.restore_sync(&mut inst);
            let from = inst.source();
            let from_time = inst.time;
            inst.candidate = None;
            inst.motion = None;
            inst.variant = None;
            inst.state.clear();
            inst.start_blend(from, from_time, self.config.blend_duration);
            released += 1;
            self.push_event(inst.handle, inst.slot, PlaybackEventKind::Released);
        }
        if released > 0 {
            info!(%pack, released, "playback released from unloaded pack");
        }
        released
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn instance(&self, handle: PlaybackHandle) -> ReanimResult<Arc<Mutex<PlaybackInstance>>> {
        self.instances
            .read()
            .get(&handle)
            .cloned()
            .ok_or(ReanimError::UnknownHandle(handle))
    }

    fn select(
        &self,
        inst: &mut PlaybackInstance,
        list: Option<&CandidateList>,
        frame: &mut Frame<'_>,
    ) -> Option<Arc<ReplacementCandidate>> {
        let list = list?;
        let mut ctx = frame.context(&mut inst.state, self.config.max_depth);
        list.select_replacement(&mut ctx)
    }

    fn enter_candidate(
        &self,
        inst: &mut PlaybackInstance,
        candidate: Arc<ReplacementCandidate>,
        frame: &mut Frame<'_>,
    ) {
        self.assign_candidate(inst, candidate, frame);
        self.run_on_activate(inst, frame);
    }

    /// Pick the motion and variant without running any action
    fn assign_candidate(
        &self,
        inst: &mut PlaybackInstance,
        candidate: Arc<ReplacementCandidate>,
        frame: &mut Frame<'_>,
    ) {
        let (motion, variant) = candidate.choose_motion(frame.rng());
        inst.motion = Some(motion);
        inst.variant = variant;
        inst.candidate = Some(candidate);
    }

    fn run_on_activate(&self, inst: &mut PlaybackInstance, frame: &mut Frame<'_>) {
        if let Some(candidate) = inst.candidate.clone() {
            let mut ctx = frame.context(&mut inst.state, self.config.max_depth);
            candidate.on_activate().run(&mut ctx);
        }
    }

    fn leave_candidate(&self, inst: &mut PlaybackInstance, frame: &mut Frame<'_>) {
        inst.motion = None;
        inst.variant = None;
        if let Some(candidate) = inst.candidate.take() {
            let mut ctx = frame.context(&mut inst.state, self.config.max_depth);
            candidate.on_deactivate().run(&mut ctx);
        }
    }

    /// Hand the instance to another candidate (or the original) with a crossfade
    fn switch(
        &self,
        inst: &mut PlaybackInstance,
        next: Option<Arc<ReplacementCandidate>>,
        frame: &mut Frame<'_>,
        from: MotionSource,
        from_time: f32,
        duration: f32,
    ) {
        let previous = inst.candidate.as_ref().map(|c| c.id());
        let to = next.as_ref().map(|c| c.id());
        self.leave_candidate(inst, frame);
        if let Some(candidate) = next {
            self.enter_candidate(inst, candidate, frame);
        }
        inst.time = 0.0;
        inst.start_blend(from, from_time, duration);
        self.apply_sync(inst);

        self.stats.lock().switches += 1;
        self.push_event(
            inst.handle,
            inst.slot,
            PlaybackEventKind::Switched { from: previous, to },
        );
    }

    /// Same candidate again; only the variant may change
    fn repick_variant(
        &self,
        inst: &mut PlaybackInstance,
        frame: &mut Frame<'_>,
        from: MotionSource,
        from_time: f32,
        duration: f32,
    ) -> bool {
        let Some(candidate) = inst.candidate.clone() else {
            return false;
        };
        if !candidate.has_variants() {
            return false;
        }
        let (motion, variant) = candidate.choose_motion(frame.rng());
        inst.variant = variant;
        if inst.motion == Some(motion) {
            return false;
        }
        inst.motion = Some(motion);
        inst.start_blend(from, from_time, duration);
        self.apply_sync(inst);
        true
    }

    /// Bias the synchronized index toward the driving candidate's pack block
    fn apply_sync(&self, inst: &mut PlaybackInstance) {
        if !inst.synchronized {
            return;
        }
        let Some(host) = &self.sync_host else {
            return;
        };
        let target = inst.candidate.as_ref().and_then(|c| {
            self.sync_space
                .offset(c.pack())
                .and_then(|offset| offset.checked_add(c.local_index(inst.variant)))
        });

        match (target, inst.sync) {
            (Some(biased), Some(bias)) => {
                host.set_index(inst.handle, biased);
                inst.sync = Some(SyncBias {
                    original: bias.original,
                    biased,
                });
            }
            (Some(biased), None) => {
                if let Some(original) = host.index(inst.handle) {
                    host.set_index(inst.handle, biased);
                    inst.sync = Some(SyncBias { original, biased });
                }
            }
            (None, Some(bias)) => {
                host.set_index(inst.handle, bias.original);
                inst.sync = None;
            }
            (None, None) => {}
        }
    }

    fn restore_sync(&self, inst: &mut PlaybackInstance) {
        if let (Some(host), Some(bias)) = (&self.sync_host, inst.sync.take()) {
            host.set_index(inst.handle, bias.original);
        }
    }

    fn push_event(&self, handle: PlaybackHandle, slot: MotionSlot, kind: PlaybackEventKind) {
        let capacity = self.config.event_log_capacity;
        if capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= capacity {
            events.pop_front();
        }
        events.push_back(PlaybackEvent { handle, slot, kind });
    }
}

fn same_candidate(
    a: Option<&Arc<ReplacementCandidate>>,
    b: Option<&Arc<ReplacementCandidate>>,
) -> bool {
    a.map(|c| c.id()) == b.map(|c| c.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use reanim_core::{EmptyWorld, FormRef, Point3, Subject, SubjectId};
    use reanim_rules::{Action, Condition, HasFlagCondition, SendEventAction, TriggerFilter};
    use reanim_select::CandidateFlags;

    use crate::{JointTransform, PlaybackState, Rotation};

    #[derive(Default)]
    struct Actor {
        flags: RwLock<HashSet<String>>,
        sent: Mutex<Vec<String>>,
    }

    impl Actor {
        fn set_flag(&self, name: &str, on: bool) {
            let mut flags = self.flags.write();
            if on {
                flags.insert(name.to_string());
            } else {
                flags.remove(name);
            }
        }
    }

    impl Subject for Actor {
        fn subject_id(&self) -> SubjectId {
            SubjectId::new(42)
        }
        fn variable(&self, _: &str) -> Option<f32> {
            None
        }
        fn flag(&self, name: &str) -> bool {
            self.flags.read().contains(name)
        }
        fn has_keyword(&self, _: &str) -> bool {
            false
        }
        fn has_form(&self, _: &FormRef) -> bool {
            false
        }
        fn position(&self) -> Point3 {
            Point3::zero()
        }
        fn text_equals(&self, _: &str, _: &str) -> bool {
            false
        }
        fn attribute(&self, _: &str) -> Option<f32> {
            None
        }
        fn send_event(&self, event: &str, _: Option<&str>) -> bool {
            self.sent.lock().push(event.to_string());
            true
        }
    }

    /// Poses carry the source as the x translation of a single joint
    struct Motions {
        resident: bool,
    }

    impl MotionHost for Motions {
        fn sample(&self, source: MotionSource, _time: f32) -> Option<Pose> {
            if !self.resident {
                return None;
            }
            let x = match source {
                MotionSource::Original(_) => 0.0,
                MotionSource::Replacement(m) => m.index() as f32,
            };
            Some(Pose::new(vec![JointTransform::new(
                Point3::new(x, 0.0, 0.0),
                Rotation::identity(),
            )]))
        }
    }

    #[derive(Default)]
    struct SyncIndices {
        indices: Mutex<HashMap<PlaybackHandle, u32>>,
    }

    impl SyncHost for SyncIndices {
        fn index(&self, handle: PlaybackHandle) -> Option<u32> {
            self.indices.lock().get(&handle).copied()
        }
        fn set_index(&self, handle: PlaybackHandle, index: u32) {
            self.indices.lock().insert(handle, index);
        }
    }

    const PACK: RulePackId = RulePackId(1);
    const SLOT: MotionSlot = MotionSlot(5);

    fn candidate(
        name: &str,
        priority: i32,
        motion: u32,
        flag: Option<&str>,
    ) -> Arc<ReplacementCandidate> {
        let c = ReplacementCandidate::new(
            PACK,
            name,
            SLOT,
            motion,
            MotionId::new(100 + motion),
            priority,
        );
        if let Some(flag) = flag {
            c.conditions()
                .push(Condition::new(Box::new(HasFlagCondition::with_flag(flag))));
        }
        Arc::new(c)
    }

    fn tracker() -> PlaybackTracker {
        let space = Arc::new(IndexSpace::new("sync", 0, 1000));
        PlaybackTracker::new(TrackerConfig::default(), space)
    }

    #[test]
    fn test_activate_selects_once() {
        let actor = Actor::default();
        actor.set_flag("sneaking", true);
        let list = CandidateList::new(SLOT);
        let sneak = candidate("sneak", 10, 1, Some("sneaking"));
        sneak
            .on_activate()
            .push(Action::new(Box::new(SendEventAction::with_event("sneak_on"))));
        list.add(sneak.clone());
        list.add(candidate("fallback", 0, 2, Some("never")));

        let tracker = tracker();
        let handle = PlaybackHandle::new(7);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        let activation = tracker
            .activate(handle, SLOT, Some(&list), &mut frame, false)
            .unwrap();

        assert!(activation.is_replaced());
        assert_eq!(activation.source, MotionSource::Replacement(MotionId::new(101)));
        assert_eq!(*actor.sent.lock(), vec!["sneak_on".to_string()]);

        let info = tracker.instance_info(handle).unwrap();
        assert!(info.activated_with_replacement);
        assert_eq!(info.candidate, Some(sneak.id()));

        // Update only advances time
        actor.set_flag("sneaking", false);
        tracker.update(handle, 0.5).unwrap();
        let info = tracker.instance_info(handle).unwrap();
        assert_eq!(info.candidate, Some(sneak.id()));
        assert!((info.time - 0.5).abs() < 1e-6);

        assert!(matches!(
            tracker.activate(handle, SLOT, Some(&list), &mut frame, false),
            Err(ReanimError::HandleAlreadyActive(_))
        ));
        assert_eq!(tracker.stats().replaced_activations, 1);
    }

    #[test]
    fn test_loop_reselects_and_blends() {
        let actor = Actor::default();
        actor.set_flag("injured", true);
        let list = CandidateList::new(SLOT);
        let limp = candidate("limp", 10, 3, Some("injured"));
        list.add(limp.clone());

        let tracker = tracker();
        let handle = PlaybackHandle::new(1);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        tracker
            .activate(handle, SLOT, Some(&list), &mut frame, false)
            .unwrap();

        actor.set_flag("injured", false);
        assert!(tracker.on_loop(handle, Some(&list), &mut frame).unwrap());
        let info = tracker.instance_info(handle).unwrap();
        assert_eq!(info.source, MotionSource::Original(SLOT));
        assert_eq!(info.state, PlaybackState::Blending);

        // Crossfade from the substitute (x = 103) to the original (x = 0)
        let host = Motions { resident: true };
        tracker.update(handle, 0.125).unwrap();
        let pose = tracker.generate(handle, &host).unwrap().unwrap();
        assert!((pose.joints[0].translation.x - 51.5).abs() < 0.01);

        tracker.update(handle, 0.125).unwrap();
        tracker.generate(handle, &host).unwrap();
        assert_eq!(
            tracker.instance_info(handle).unwrap().state,
            PlaybackState::Playing
        );
        assert_eq!(tracker.stats().blends_completed, 1);
    }

    #[test]
    fn test_loop_switches_to_higher_priority() {
        let actor = Actor::default();
        actor.set_flag("sneaking", true);
        let list = CandidateList::new(SLOT);
        let sneak = candidate("sneak", 5, 1, Some("sneaking"));
        sneak
            .on_deactivate()
            .push(Action::new(Box::new(SendEventAction::with_event("sneak_off"))));
        let limp = candidate("limp", 10, 3, Some("injured"));
        limp.on_activate()
            .push(Action::new(Box::new(SendEventAction::with_event("limp_on"))));
        list.add(sneak.clone());
        list.add(limp.clone());

        let tracker = tracker();
        let handle = PlaybackHandle::new(2);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        tracker
            .activate(handle, SLOT, Some(&list), &mut frame, false)
            .unwrap();
        assert_eq!(tracker.instance_info(handle).unwrap().candidate, Some(sneak.id()));

        // sneak still holds, but limp now outranks it
        actor.set_flag("injured", true);
        assert!(tracker.on_loop(handle, Some(&list), &mut frame).unwrap());
        let info = tracker.instance_info(handle).unwrap();
        assert_eq!(info.candidate, Some(limp.id()));
        assert_eq!(info.source, MotionSource::Replacement(MotionId::new(103)));
        assert_eq!(info.state, PlaybackState::Blending);
        assert_eq!(
            *actor.sent.lock(),
            vec!["sneak_off".to_string(), "limp_on".to_string()]
        );
        assert!(tracker.events().iter().any(|e| e.kind
            == PlaybackEventKind::Switched {
                from: Some(sneak.id()),
                to: Some(limp.id()),
            }));

        // Crossfade from sneak (x = 101) to limp (x = 103)
        let host = Motions { resident: true };
        tracker.update(handle, 0.125).unwrap();
        let pose = tracker.generate(handle, &host).unwrap().unwrap();
        assert!((pose.joints[0].translation.x - 102.0).abs() < 0.01);
    }

    #[test]
    fn test_racing_activations_run_actions_once() {
        let actor = Actor::default();
        actor.set_flag("sneaking", true);
        let list = CandidateList::new(SLOT);
        let sneak = candidate("sneak", 10, 1, Some("sneaking"));
        sneak
            .on_activate()
            .push(Action::new(Box::new(SendEventAction::with_event("on"))));
        sneak
            .on_deactivate()
            .push(Action::new(Box::new(SendEventAction::with_event("off"))));
        list.add(sneak);

        let tracker = tracker();
        let handle = PlaybackHandle::new(3);
        for _ in 0..50 {
            let won = std::sync::atomic::AtomicUsize::new(0);
            std::thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        let mut frame = Frame::new(&actor, &EmptyWorld);
                        if tracker
                            .activate(handle, SLOT, Some(&list), &mut frame, false)
                            .is_ok()
                        {
                            won.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    });
                }
            });
            assert_eq!(won.into_inner(), 1);
            let mut frame = Frame::new(&actor, &EmptyWorld);
            tracker.deactivate(handle, &mut frame).unwrap();
        }

        let sent = actor.sent.lock();
        assert_eq!(sent.iter().filter(|e| *e == "on").count(), 50);
        assert_eq!(sent.iter().filter(|e| *e == "off").count(), 50);
    }

    #[test]
    fn test_keep_random_results_continues_candidate() {
        let actor = Actor::default();
        actor.set_flag("injured", true);
        let list = CandidateList::new(SLOT);
        let limp = candidate("limp", 10, 3, Some("injured"));
        limp.set_flag(CandidateFlags::KEEP_RANDOM_RESULTS_ON_LOOP, true);
        list.add(limp.clone());

        let tracker = tracker();
        let handle = PlaybackHandle::new(1);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        tracker
            .activate(handle, SLOT, Some(&list), &mut frame, false)
            .unwrap();

        actor.set_flag("injured", false);
        assert!(!tracker.on_loop(handle, Some(&list), &mut frame).unwrap());
        assert_eq!(tracker.instance_info(handle).unwrap().candidate, Some(limp.id()));
        assert_eq!(tracker.instance_info(handle).unwrap().loops, 1);
    }

    #[test]
    fn test_sync_index_restored_first() {
        let actor = Actor::default();
        let list = CandidateList::new(SLOT);
        let c = candidate("synced", 1, 4, None);
        c.on_deactivate()
            .push(Action::new(Box::new(SendEventAction::with_event("off"))));
        list.add(c);

        let space = Arc::new(IndexSpace::new("sync", 0, 1000));
        space.reserve(RulePackId::new(9), 50).unwrap();
        space.reserve(PACK, 10).unwrap();
        let sync = Arc::new(SyncIndices::default());
        let tracker = PlaybackTracker::new(TrackerConfig::default(), space)
            .with_sync_host(sync.clone());

        let handle = PlaybackHandle::new(3);
        sync.set_index(handle, 7);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        tracker
            .activate(handle, SLOT, Some(&list), &mut frame, true)
            .unwrap();
        assert_eq!(sync.index(handle), Some(54));
        assert_eq!(
            tracker.instance_info(handle).unwrap().sync,
            Some(SyncBias {
                original: 7,
                biased: 54
            })
        );

        tracker.deactivate(handle, &mut frame).unwrap();
        assert_eq!(sync.index(handle), Some(7));
        assert_eq!(*actor.sent.lock(), vec!["off".to_string()]);
        assert!(!tracker.is_active(handle));
        assert!(matches!(
            tracker.deactivate(handle, &mut frame),
            Err(ReanimError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_echo_plans() {
        let actor = Actor::default();
        let list = CandidateList::new(SLOT);
        list.add(candidate("always", 1, 2, None));

        let tracker = tracker();
        let mut frame = Frame::new(&actor, &EmptyWorld);

        let replaced = PlaybackHandle::new(1);
        tracker
            .activate(replaced, SLOT, Some(&list), &mut frame, false)
            .unwrap();
        let plan = tracker.on_echo(replaced, Some(&list), &mut frame).unwrap();
        let substitute = MotionSource::Replacement(MotionId::new(102));
        assert_eq!(
            plan,
            EchoPlan::Crossfade {
                from: substitute,
                to: substitute,
                duration: TrackerConfig::default().echo_blend_duration,
            }
        );

        let plain = PlaybackHandle::new(2);
        tracker.activate(plain, SLOT, None, &mut frame, false).unwrap();
        assert_eq!(
            tracker.on_echo(plain, None, &mut frame).unwrap(),
            EchoPlan::HostDefault
        );
    }

    #[test]
    fn test_trigger_respects_no_trigger_flag() {
        let actor = Actor::default();
        let list = CandidateList::new(SLOT);
        let c = candidate("hit", 1, 2, None);
        c.on_trigger().push(
            Action::new(Box::new(SendEventAction::with_event("spark")))
                .on_event(TriggerFilter::new("HitFrame")),
        );
        list.add(c.clone());

        let tracker = tracker();
        let handle = PlaybackHandle::new(1);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        tracker
            .activate(handle, SLOT, Some(&list), &mut frame, false)
            .unwrap();

        let hit = TriggerEvent::new("hitframe");
        assert!(!tracker.handle_event(handle, &hit, true, &mut frame).unwrap());
        assert!(tracker.handle_event(handle, &hit, false, &mut frame).unwrap());

        c.set_flag(CandidateFlags::IGNORE_NO_TRIGGER_FLAG, true);
        assert!(tracker.handle_event(handle, &hit, true, &mut frame).unwrap());
        assert_eq!(actor.sent.lock().len(), 2);
    }

    #[test]
    fn test_revalidate_interruptible() {
        let actor = Actor::default();
        actor.set_flag("aiming", true);
        let list = CandidateList::new(SLOT);
        let aim = candidate("aim", 5, 1, Some("aiming"));
        list.add(aim.clone());

        let tracker = tracker();
        let handle = PlaybackHandle::new(1);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        tracker
            .activate(handle, SLOT, Some(&list), &mut frame, false)
            .unwrap();

        actor.set_flag("aiming", false);
        assert!(!tracker.revalidate(handle, Some(&list), &mut frame).unwrap());

        aim.set_flag(CandidateFlags::INTERRUPTIBLE, true);
        assert!(tracker.revalidate(handle, Some(&list), &mut frame).unwrap());
        assert_eq!(tracker.instance_info(handle).unwrap().candidate, None);
    }

    #[test]
    fn test_generate_holds_outgoing_until_resident() {
        let actor = Actor::default();
        let tracker = tracker();
        let handle = PlaybackHandle::new(1);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        tracker.activate(handle, SLOT, None, &mut frame, false).unwrap();

        let host = Motions { resident: false };
        assert_eq!(tracker.generate(handle, &host).unwrap(), None);
        assert_eq!(tracker.stats().samples_missed, 1);
    }

    #[test]
    fn test_event_log_bounded() {
        let actor = Actor::default();
        let space = Arc::new(IndexSpace::new("sync", 0, 10));
        let config = TrackerConfig {
            event_log_capacity: 2,
            ..TrackerConfig::default()
        };
        let tracker = PlaybackTracker::new(config, space);
        let mut frame = Frame::new(&actor, &EmptyWorld);
        for raw in 0..3 {
            tracker
                .activate(PlaybackHandle::new(raw), SLOT, None, &mut frame, false)
                .unwrap();
        }
        let events = tracker.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].handle, PlaybackHandle::new(1));
    }
}
