//! Rule pack - a loaded namespace of candidates, presets and motions

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Map, Value};

use reanim_core::{
    CandidateId, ConfigProblem, MotionId, ProblemKind, ReanimError, ReanimResult, RulePackId,
};
use reanim_rules::PresetRegistry;

use crate::ReplacementCandidate;

/// One loaded rule pack
///
/// The pack owns its motions as a contiguous block of the engine-wide motion
/// id space starting at `motion_base`.
#[derive(Debug)]
pub struct RulePack {
    id: RulePackId,
    name: String,
    description: String,
    presets: PresetRegistry,
    candidates: RwLock<Vec<Arc<ReplacementCandidate>>>,
    motion_base: u32,
    motion_count: u32,
}

impl RulePack {
    pub fn new(id: RulePackId, name: impl Into<String>, motion_base: u32, motion_count: u32) -> Self {
        RulePack {
            id,
            name: name.into(),
            description: String::new(),
            presets: PresetRegistry::new(),
            candidates: RwLock::new(Vec::new()),
            motion_base,
            motion_count,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn id(&self) -> RulePackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    pub fn motion_base(&self) -> u32 {
        self.motion_base
    }

    pub fn motion_count(&self) -> u32 {
        self.motion_count
    }

    /// Engine-wide id of a pack-local motion
    pub fn motion_id(&self, local: u32) -> ReanimResult<MotionId> {
        if local >= self.motion_count {
            return Err(ReanimError::IndexOutOfBounds {
                index: local as usize,
                len: self.motion_count as usize,
            });
        }
        MotionId::from_offset(self.motion_base, local)
    }

    pub fn owns_motion(&self, motion: MotionId) -> bool {
        let index = motion.index();
        index >= self.motion_base && index - self.motion_base < self.motion_count
    }

    pub fn add_candidate(&self, candidate: Arc<ReplacementCandidate>) {
        self.candidates.write().push(candidate);
    }

    pub fn remove_candidate(&self, id: CandidateId) -> ReanimResult<Arc<ReplacementCandidate>> {
        let mut candidates = self.candidates.write();
        let idx = candidates
            .iter()
            .position(|c| c.id() == id)
            .ok_or(ReanimError::UnknownCandidate(id))?;
        Ok(candidates.remove(idx))
    }

    pub fn candidate(&self, id: CandidateId) -> Option<Arc<ReplacementCandidate>> {
        self.candidates.read().iter().find(|c| c.id() == id).cloned()
    }

    pub fn candidates(&self) -> Vec<Arc<ReplacementCandidate>> {
        self.candidates.read().clone()
    }

    /// Invalid rules anywhere in the pack, presets included
    pub fn collect_problems(&self, out: &mut Vec<ConfigProblem>) {
        for preset in self.presets.all() {
            let location = format!("{}/preset:{}", self.name, preset.name());
            preset.conditions().collect_problems(&location, out);
        }
        for candidate in self.candidates.read().iter() {
            let location = format!("{}/{}", self.name, candidate.name());
            candidate.conditions().collect_problems(&location, out);
            for set in [
                candidate.on_activate(),
                candidate.on_deactivate(),
                candidate.on_trigger(),
            ] {
                set.collect_problems(&location, out);
            }
            if !motions_inside(candidate, self) {
                out.push(ConfigProblem::error(
                    ProblemKind::MalformedInput,
                    location,
                    format!("motion {} outside the pack", candidate.local_motion()),
                ));
            }
        }
    }

    /// Persisted structured form
    pub fn serialize(&self) -> Value {
        let mut presets = Map::new();
        for preset in self.presets.all() {
            presets.insert(preset.name(), preset.conditions().serialize());
        }
        json!({
            "name": self.name,
            "description": self.description,
            "motions": self.motion_count,
            "presets": presets,
            "candidates": self
                .candidates
                .read()
                .iter()
                .map(|c| c.serialize())
                .collect::<Vec<_>>(),
        })
    }
}

fn motions_inside(candidate: &ReplacementCandidate, pack: &RulePack) -> bool {
    pack.owns_motion(candidate.motion())
        && candidate.with_variant_set(|set| {
            set.variants().iter().all(|v| pack.owns_motion(v.motion))
        })
}
