//! Replacer engine - the explicitly constructed context the host talks to
//!
//! Owns every loaded rule pack, the per-slot candidate lists, the motion and
//! synchronized index spaces and the playback tracker. One instance is shared
//! between the host's real-time thread (playback callbacks) and the editor
//! thread (inspection and edits).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use reanim_core::{
    CandidateId, ConfigProblem, HostCatalog, MotionSlot, PlaybackHandle, ProblemKind,
    ReanimError, ReanimResult, RulePackId, Subject, WorldState,
};
use reanim_playback::{
    Activation, EchoPlan, Frame, IndexSpace, MotionHost, PlaybackTracker, Pose, SyncHost,
    TrackerConfig,
};
use reanim_rules::{EvalContext, EvaluationTrace, RuleFactory, TriggerEvent};
use reanim_select::{CandidateList, PriorityConflict, ReplacementCandidate, RulePack};

use crate::{loader, DeferredEdit, EngineConfig};

/// Engine counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub packs_loaded: u64,
    pub packs_unloaded: u64,
    pub candidates_added: u64,
    pub candidates_removed: u64,
    pub selections: u64,
    pub replacements: u64,
    pub edits_queued: u64,
    pub edits_applied: u64,
    pub edits_failed: u64,
    pub problems_recorded: u64,
}

/// Runtime decision engine for motion replacement
pub struct ReplacerEngine {
    config: EngineConfig,
    factory: RuleFactory,
    catalog: HostCatalog,
    packs: RwLock<BTreeMap<RulePackId, Arc<RulePack>>>,
    /// Pack ids survive unloading so a reload keeps its index blocks
    pack_ids: Mutex<HashMap<String, RulePackId>>,
    next_pack: AtomicU32,
    slots: RwLock<HashMap<MotionSlot, Arc<CandidateList>>>,
    motions: IndexSpace,
    tracker: PlaybackTracker,
    problems: Mutex<Vec<ConfigProblem>>,
    pending: Mutex<VecDeque<DeferredEdit>>,
    stats: Mutex<EngineStats>,
}

impl std::fmt::Debug for ReplacerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let packs = self.packs.read().len();
        let slots = self.slots.read().len();
        f.debug_struct("ReplacerEngine")
            .field("packs", &packs)
            .field("slots", &slots)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl ReplacerEngine {
    /// Engine with the built-in rule kinds and a permissive host catalog
    pub fn new(config: EngineConfig) -> Self {
        let sync_space = Arc::new(IndexSpace::new("synchronized", 0, config.sync_capacity));
        let tracker = Self::build_tracker(&config, sync_space, None);
        ReplacerEngine {
            motions: IndexSpace::new("motions", config.motion_base, config.motion_capacity),
            config,
            factory: RuleFactory::with_builtins(),
            catalog: HostCatalog::permissive(),
            packs: RwLock::new(BTreeMap::new()),
            pack_ids: Mutex::new(HashMap::new()),
            next_pack: AtomicU32::new(1),
            slots: RwLock::new(HashMap::new()),
            tracker,
            problems: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            stats: Mutex::new(EngineStats::default()),
        }
    }

    /// Replace the rule registry (external providers register here first)
    pub fn with_factory(mut self, factory: RuleFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_catalog(mut self, catalog: HostCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Enable synchronized index remapping; pack blocks already reserved are kept
    pub fn with_sync_host(mut self, host: Arc<dyn SyncHost>) -> Self {
        let space = self.tracker.sync_space().clone();
        self.tracker = Self::build_tracker(&self.config, space, Some(host));
        self
    }

    fn build_tracker(
        config: &EngineConfig,
        space: Arc<IndexSpace>,
        host: Option<Arc<dyn SyncHost>>,
    ) -> PlaybackTracker {
        let tracker_config = TrackerConfig {
            max_depth: config.selection.max_depth,
            ..config.tracker.clone()
        };
        let tracker = PlaybackTracker::new(tracker_config, space);
        match host {
            Some(host) => tracker.with_sync_host(host),
            None => tracker,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn factory(&self) -> &RuleFactory {
        &self.factory
    }

    pub fn catalog(&self) -> &HostCatalog {
        &self.catalog
    }

    pub fn tracker(&self) -> &PlaybackTracker {
        &self.tracker
    }

    pub fn motion_space(&self) -> &IndexSpace {
        &self.motions
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.lock().clone()
    }

    // ========================================================================
    // Packs
    // ========================================================================

    /// Create an empty pack and reserve its motion and synchronized blocks.
    ///
    /// Running out of either index space is unrecoverable and panics.
    pub fn register_pack(
        &self,
        name: &str,
        description: &str,
        motion_count: u32,
    ) -> ReanimResult<Arc<RulePack>> {
        let id = *self
            .pack_ids
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| RulePackId::new(self.next_pack.fetch_add(1, Ordering::Relaxed)));
        if self.packs.read().contains_key(&id) {
            return Err(ReanimError::DuplicatePack(name.to_string()));
        }

        let base = reserve_or_die(&self.motions, id, motion_count);
        reserve_or_die(self.tracker.sync_space(), id, motion_count);

        let pack = Arc::new(RulePack::new(id, name, base, motion_count).with_description(description));
        match self.packs.write().entry(id) {
            std::collections::btree_map::Entry::Occupied(_) => {
                return Err(ReanimError::DuplicatePack(name.to_string()))
            }
            std::collections::btree_map::Entry::Vacant(vacant) => {
                vacant.insert(pack.clone());
            }
        }
        debug!(pack = name, %id, base, motion_count, "rule pack registered");
        Ok(pack)
    }

    /// Build a pack from its structured form; see [`loader::load_pack`]
    pub fn load_pack(&self, input: &Value) -> ReanimResult<RulePackId> {
        let id = loader::load_pack(self, input)?;
        self.stats.lock().packs_loaded += 1;
        Ok(id)
    }

    /// Remove a pack with its candidates; live playback falls back to the original
    pub fn unload_pack(&self, id: RulePackId) -> ReanimResult<()> {
        let pack = self
            .packs
            .write()
            .remove(&id)
            .ok_or(ReanimError::UnknownPack(id))?;

        let mut removed = 0;
        self.slots.write().retain(|_, list| {
            removed += list.remove_pack(id);
            !list.is_empty()
        });
        let released = self.tracker.release_pack(id);

        let prefix = format!("{}/", pack.name());
        self.problems
            .lock()
            .retain(|p| p.location != pack.name() && !p.location.starts_with(&prefix));

        {
            let mut stats = self.stats.lock();
            stats.packs_unloaded += 1;
            stats.candidates_removed += removed as u64;
        }
        info!(pack = pack.name(), removed, released, "rule pack unloaded");
        Ok(())
    }

    pub fn pack(&self, id: RulePackId) -> Option<Arc<RulePack>> {
        self.packs.read().get(&id).cloned()
    }

    pub fn pack_by_name(&self, name: &str) -> Option<Arc<RulePack>> {
        let id = self.pack_ids.lock().get(name).copied()?;
        self.pack(id)
    }

    pub fn packs(&self) -> Vec<Arc<RulePack>> {
        self.packs.read().values().cloned().collect()
    }

    // ========================================================================
    // Candidates
    // ========================================================================

    /// Register a candidate with its pack and its slot's list
    pub fn add_candidate(
        &self,
        candidate: ReplacementCandidate,
    ) -> ReanimResult<Arc<ReplacementCandidate>> {
        let id = candidate.pack();
        let candidate = Arc::new(candidate);
        {
            // pruning in unload_pack takes the same guard
            let mut slots = self.slots.write();
            let pack = self.pack(id).ok_or(ReanimError::UnknownPack(id))?;
            pack.add_candidate(candidate.clone());
            slots
                .entry(candidate.slot())
                .or_insert_with(|| Arc::new(CandidateList::new(candidate.slot())))
                .add(candidate.clone());
        }
        self.stats.lock().candidates_added += 1;
        Ok(candidate)
    }

    pub fn remove_candidate(&self, id: CandidateId) -> ReanimResult<Arc<ReplacementCandidate>> {
        let candidate = self
            .candidate(id)
            .ok_or(ReanimError::UnknownCandidate(id))?;
        if let Some(pack) = self.pack(candidate.pack()) {
            pack.remove_candidate(id)?;
        }
        if let Some(list) = self.candidate_list(candidate.slot()) {
            list.remove(id)?;
        }
        self.stats.lock().candidates_removed += 1;
        Ok(candidate)
    }

    pub fn candidate(&self, id: CandidateId) -> Option<Arc<ReplacementCandidate>> {
        self.packs.read().values().find_map(|p| p.candidate(id))
    }

    pub fn candidate_list(&self, slot: MotionSlot) -> Option<Arc<CandidateList>> {
        self.slots.read().get(&slot).cloned()
    }

    /// Slots with at least one candidate
    pub fn slots(&self) -> Vec<MotionSlot> {
        let mut slots: Vec<_> = self.slots.read().keys().copied().collect();
        slots.sort();
        slots
    }

    /// Change a candidate's priority and re-sort its list
    pub fn set_priority(&self, id: CandidateId, priority: i32) -> ReanimResult<()> {
        let candidate = self
            .candidate(id)
            .ok_or(ReanimError::UnknownCandidate(id))?;
        let list = self
            .candidate_list(candidate.slot())
            .ok_or(ReanimError::UnknownSlot(candidate.slot()))?;
        list.set_priority(id, priority)
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// First matching candidate of a slot
    pub fn select(
        &self,
        slot: MotionSlot,
        ctx: &mut EvalContext<'_>,
    ) -> Option<Arc<ReplacementCandidate>> {
        let list = self.candidate_list(slot)?;
        let selected = list.select_replacement(ctx);
        let mut stats = self.stats.lock();
        stats.selections += 1;
        if selected.is_some() {
            stats.replacements += 1;
        }
        selected
    }

    /// Evaluate a slot now and record the whole walk
    pub fn evaluate_with_trace(
        &self,
        slot: MotionSlot,
        subject: &dyn Subject,
        world: &dyn WorldState,
    ) -> (Option<Arc<ReplacementCandidate>>, EvaluationTrace) {
        let mut trace = EvaluationTrace::new();
        let selected = match self.candidate_list(slot) {
            Some(list) => {
                let mut ctx = EvalContext::new(subject, world)
                    .with_trace(&mut trace)
                    .with_max_depth(self.config.selection.max_depth);
                list.select_replacement(&mut ctx)
            }
            None => None,
        };
        (selected, trace)
    }

    /// Every candidate's result for a slot; `None` marks disabled ones
    pub fn inspect_slot(
        &self,
        slot: MotionSlot,
        subject: &dyn Subject,
        world: &dyn WorldState,
    ) -> Vec<(CandidateId, Option<bool>)> {
        let Some(list) = self.candidate_list(slot) else {
            return Vec::new();
        };
        let mut ctx =
            EvalContext::new(subject, world).with_max_depth(self.config.selection.max_depth);
        list.evaluate_each(&mut ctx)
    }

    // ========================================================================
    // Playback callbacks
    // ========================================================================

    pub fn activate(
        &self,
        handle: PlaybackHandle,
        slot: MotionSlot,
        frame: &mut Frame<'_>,
        synchronized: bool,
    ) -> ReanimResult<Activation> {
        let list = self.candidate_list(slot);
        let activation =
            self.tracker
                .activate(handle, slot, list.as_deref(), frame, synchronized)?;
        let mut stats = self.stats.lock();
        stats.selections += 1;
        if activation.is_replaced() {
            stats.replacements += 1;
        }
        Ok(activation)
    }

    pub fn update(&self, handle: PlaybackHandle, dt: f32) -> ReanimResult<()> {
        self.tracker.update(handle, dt)
    }

    pub fn generate(
        &self,
        handle: PlaybackHandle,
        host: &dyn MotionHost,
    ) -> ReanimResult<Option<Pose>> {
        self.tracker.generate(handle, host)
    }

    pub fn on_loop(&self, handle: PlaybackHandle, frame: &mut Frame<'_>) -> ReanimResult<bool> {
        let list = self.list_of(handle)?;
        self.tracker.on_loop(handle, list.as_deref(), frame)
    }

    pub fn on_echo(&self, handle: PlaybackHandle, frame: &mut Frame<'_>) -> ReanimResult<EchoPlan> {
        let list = self.list_of(handle)?;
        self.tracker.on_echo(handle, list.as_deref(), frame)
    }

    pub fn on_event(
        &self,
        handle: PlaybackHandle,
        event: &TriggerEvent,
        suppressed: bool,
        frame: &mut Frame<'_>,
    ) -> ReanimResult<bool> {
        self.tracker.handle_event(handle, event, suppressed, frame)
    }

    pub fn revalidate(&self, handle: PlaybackHandle, frame: &mut Frame<'_>) -> ReanimResult<bool> {
        let list = self.list_of(handle)?;
        self.tracker.revalidate(handle, list.as_deref(), frame)
    }

    pub fn deactivate(&self, handle: PlaybackHandle, frame: &mut Frame<'_>) -> ReanimResult<()> {
        self.tracker.deactivate(handle, frame)
    }

    fn list_of(&self, handle: PlaybackHandle) -> ReanimResult<Option<Arc<CandidateList>>> {
        let slot = self
            .tracker
            .slot_of(handle)
            .ok_or(ReanimError::UnknownHandle(handle))?;
        Ok(self.candidate_list(slot))
    }

    // ========================================================================
    // Deferred edits
    // ========================================================================

    /// Queue an edit requested mid-frame
    pub fn queue_edit(&self, edit: DeferredEdit) -> ReanimResult<()> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.config.max_pending_edits {
            warn!(limit = self.config.max_pending_edits, "deferred edit queue full");
            return Err(ReanimError::invalid("edits", "deferred edit queue full"));
        }
        pending.push_back(edit);
        self.stats.lock().edits_queued += 1;
        Ok(())
    }

    pub fn pending_edits(&self) -> usize {
        self.pending.lock().len()
    }

    /// Apply queued edits in order; call between frames. Returns how many succeeded.
    pub fn apply_pending_edits(&self) -> usize {
        let edits = std::mem::take(&mut *self.pending.lock());
        if edits.is_empty() {
            return 0;
        }

        let mut applied = 0;
        let mut failed = 0;
        for edit in edits {
            let label = edit.label();
            match edit.apply(self) {
                Ok(()) => applied += 1,
                Err(e) => {
                    failed += 1;
                    warn!(edit = label, error = %e, "deferred edit failed");
                }
            }
        }

        {
            let mut stats = self.stats.lock();
            stats.edits_applied += applied as u64;
            stats.edits_failed += failed;
        }
        debug!(applied, failed, "deferred edits applied");
        applied
    }

    // ========================================================================
    // Problems
    // ========================================================================

    pub(crate) fn record_problems(&self, problems: Vec<ConfigProblem>) {
        if problems.is_empty() {
            return;
        }
        self.stats.lock().problems_recorded += problems.len() as u64;
        self.problems.lock().extend(problems);
    }

    /// Problems reported while loading packs
    pub fn problems(&self) -> Vec<ConfigProblem> {
        self.problems.lock().clone()
    }

    /// Candidates sharing a priority, across all slots
    pub fn conflicts(&self) -> Vec<PriorityConflict> {
        let mut lists: Vec<_> = self.slots.read().values().cloned().collect();
        lists.sort_by_key(|l| l.slot());
        lists.iter().flat_map(|l| l.conflicts()).collect()
    }

    /// Fresh sweep of the current rule trees
    pub fn detect_problems(&self) -> Vec<ConfigProblem> {
        let mut out = Vec::new();
        for pack in self.packs() {
            pack.collect_problems(&mut out);
        }
        for conflict in self.conflicts() {
            let names: Vec<String> = conflict
                .candidates
                .iter()
                .filter_map(|id| self.candidate(*id))
                .map(|c| c.name().to_string())
                .collect();
            out.push(ConfigProblem::warning(
                ProblemKind::PriorityConflict,
                format!("slot {}", conflict.slot),
                format!(
                    "priority {} shared by {}",
                    conflict.priority,
                    names.join(", ")
                ),
            ));
        }
        out
    }
}

fn reserve_or_die(space: &IndexSpace, pack: RulePackId, len: u32) -> u32 {
    match space.reserve(pack, len) {
        Ok(offset) => offset,
        Err(err) => fatal(err),
    }
}

/// Unrecoverable: the host cannot address motions past the index space
fn fatal(err: ReanimError) -> ! {
    error!(error = %err, "unrecoverable engine error");
    panic!("reanim: {}", err)
}
