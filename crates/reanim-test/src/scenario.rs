//! Scenario builders - rule packs and engines for tests and benches

use std::sync::Arc;

use serde_json::{json, Value};

use reanim_core::{MotionSlot, RulePackId};
use reanim_runtime::{EngineConfig, ReplacerEngine};

use crate::mock::MockSyncHost;

/// Builder for one candidate's structured form
#[derive(Debug, Clone)]
pub struct CandidateSpec {
    value: Value,
}

impl CandidateSpec {
    pub fn new(name: &str, slot: u32, motion: u32) -> Self {
        CandidateSpec {
            value: json!({"name": name, "slot": slot, "motion": motion}),
        }
    }

    pub fn priority(self, priority: i32) -> Self {
        self.set("priority", json!(priority))
    }

    /// Set a flag field by its persisted name (e.g. `"interruptible"`)
    pub fn flag(self, field: &str, value: bool) -> Self {
        self.set(field, json!(value))
    }

    pub fn when_flag(self, flag: &str) -> Self {
        self.condition(json!({"condition": "HasFlag", "flag": flag}))
    }

    pub fn unless_flag(self, flag: &str) -> Self {
        self.condition(json!({"condition": "HasFlag", "flag": flag, "negated": true}))
    }

    pub fn when_preset(self, preset: &str) -> Self {
        self.condition(json!({"condition": "PRESET", "preset": preset}))
    }

    pub fn condition(mut self, condition: Value) -> Self {
        push(&mut self.value, "conditions", condition);
        self
    }

    pub fn on_activate(mut self, action: Value) -> Self {
        push(&mut self.value, "onActivate", action);
        self
    }

    pub fn on_deactivate(mut self, action: Value) -> Self {
        push(&mut self.value, "onDeactivate", action);
        self
    }

    pub fn on_trigger(mut self, action: Value) -> Self {
        push(&mut self.value, "onTrigger", action);
        self
    }

    /// Weighted random variants over the given local motions
    pub fn random_variants(self, motions: &[(u32, f32)]) -> Self {
        let variants: Vec<Value> = motions
            .iter()
            .enumerate()
            .map(|(i, (motion, weight))| json!({"name": format!("v{}", i), "motion": motion, "weight": weight}))
            .collect();
        self.set("variants", json!({"mode": "random", "variants": variants}))
    }

    pub fn build(self) -> Value {
        self.value
    }

    fn set(mut self, field: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.value {
            map.insert(field.to_string(), value);
        }
        self
    }
}

/// Builder for a whole rule pack
#[derive(Debug, Clone)]
pub struct PackSpec {
    name: String,
    motions: u32,
    presets: serde_json::Map<String, Value>,
    candidates: Vec<Value>,
}

impl PackSpec {
    pub fn new(name: &str, motions: u32) -> Self {
        PackSpec {
            name: name.to_string(),
            motions,
            presets: serde_json::Map::new(),
            candidates: Vec::new(),
        }
    }

    pub fn preset(mut self, name: &str, conditions: Vec<Value>) -> Self {
        self.presets.insert(name.to_string(), Value::Array(conditions));
        self
    }

    pub fn candidate(mut self, candidate: CandidateSpec) -> Self {
        self.candidates.push(candidate.build());
        self
    }

    pub fn build(&self) -> Value {
        json!({
            "name": self.name,
            "description": format!("{} test pack", self.name),
            "motions": self.motions,
            "presets": self.presets,
            "candidates": self.candidates,
        })
    }
}

/// Generated workload shape
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    /// Number of rule packs
    pub packs: usize,
    /// Slots shared by all packs
    pub slots: u32,
    /// Candidates per pack and slot
    pub candidates_per_slot: usize,
    /// Flags the generated conditions draw from
    pub flag_pool: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            packs: 4,
            slots: 16,
            candidates_per_slot: 4,
            flag_pool: 8,
        }
    }
}

impl ScenarioConfig {
    /// Small workload for quick tests
    pub fn light() -> Self {
        ScenarioConfig {
            packs: 2,
            slots: 4,
            candidates_per_slot: 2,
            flag_pool: 4,
        }
    }

    /// Large workload for benches and stress runs
    pub fn heavy() -> Self {
        ScenarioConfig {
            packs: 16,
            slots: 64,
            candidates_per_slot: 8,
            flag_pool: 32,
        }
    }
}

/// Flag name `index` of the generated pool
pub fn flag_name(index: usize) -> String {
    format!("flag{}", index)
}

/// Deterministic pack `index` of a generated workload.
///
/// Every candidate requires one pool flag; priorities repeat across packs so
/// the workload also carries conflicts.
pub fn generated_pack(config: &ScenarioConfig, index: usize) -> Value {
    let per_pack = config.slots as usize * config.candidates_per_slot;
    let mut pack = PackSpec::new(&format!("pack{}", index), per_pack as u32).preset(
        "base",
        vec![json!({"condition": "HasFlag", "flag": flag_name(0), "negated": true})],
    );
    for slot in 0..config.slots {
        for n in 0..config.candidates_per_slot {
            let local = slot as usize * config.candidates_per_slot + n;
            let flag = (index + local) % config.flag_pool.max(1);
            let mut candidate = CandidateSpec::new(&format!("s{}c{}", slot, n), slot, local as u32)
                .priority((n as i32) * 10 - index as i32 % 3)
                .when_flag(&flag_name(flag));
            if n % 2 == 1 {
                candidate = candidate.when_preset("base");
            }
            pack = pack.candidate(candidate);
        }
    }
    pack.build()
}

/// Engine loaded with a generated workload
pub struct Scenario {
    pub engine: Arc<ReplacerEngine>,
    pub sync: Arc<MockSyncHost>,
    pub packs: Vec<RulePackId>,
    pub config: ScenarioConfig,
}

impl Scenario {
    pub fn build(config: ScenarioConfig) -> Self {
        Self::with_engine_config(config, EngineConfig::default())
    }

    pub fn with_engine_config(config: ScenarioConfig, engine_config: EngineConfig) -> Self {
        let sync = Arc::new(MockSyncHost::new());
        let engine = ReplacerEngine::new(engine_config).with_sync_host(sync.clone());
        let packs = (0..config.packs)
            .filter_map(|i| engine.load_pack(&generated_pack(&config, i)).ok())
            .collect();
        Scenario {
            engine: Arc::new(engine),
            sync,
            packs,
            config,
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = MotionSlot> {
        (0..self.config.slots).map(MotionSlot::new)
    }
}

fn push(value: &mut Value, field: &str, item: Value) {
    if let Value::Object(map) = value {
        match map
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(item),
            other => *other = Value::Array(vec![item]),
        }
    }
}
