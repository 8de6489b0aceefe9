//! Rule pack loading from the persisted structured form
//!
//! ```text
//! {
//!   "name": "combat",
//!   "description": "...",
//!   "motions": 12,
//!   "presets": { "calm": [ {"condition": "HasFlag", "flag": "calm"} ] },
//!   "candidates": [ { "name": "...", "slot": 3, "motion": 0, ... } ]
//! }
//! ```
//!
//! Broken rules and malformed candidates are recorded as problems and skipped;
//! only a malformed pack envelope fails the load.

use serde_json::Value;
use tracing::{info, warn};

use reanim_core::{
    str_field, ConfigProblem, ProblemKind, ReanimError, ReanimResult, RulePackId,
};
use reanim_rules::{ConditionSet, ParseContext};
use reanim_select::{ReplacementCandidate, RulePack};

use crate::ReplacerEngine;

/// Build and register a pack; returns its id
pub fn load_pack(engine: &ReplacerEngine, input: &Value) -> ReanimResult<RulePackId> {
    let name = str_field(input, "name")?;
    let description = input
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let motions = match input.get("motions") {
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ReanimError::mismatch("motions", "unsigned integer"))?,
        None => 0,
    };

    let pack = engine.register_pack(name, description, motions)?;
    match populate(engine, &pack, input) {
        Ok(()) => Ok(pack.id()),
        Err(e) => {
            warn!(pack = name, error = %e, "rule pack load failed");
            // drop the half-built pack; its index blocks stay reserved
            if let Err(rollback) = engine.unload_pack(pack.id()) {
                warn!(pack = name, error = %rollback, "rollback of failed pack load failed");
            }
            Err(e)
        }
    }
}

fn populate(engine: &ReplacerEngine, pack: &RulePack, input: &Value) -> ReanimResult<()> {
    let mut ctx = ParseContext::new(engine.factory(), engine.catalog())
        .with_presets(pack.presets())
        .at(pack.name());

    let presets = match input.get("presets") {
        Some(Value::Object(map)) => Some(map),
        Some(Value::Null) | None => None,
        Some(_) => return Err(ReanimError::mismatch("presets", "object")),
    };

    // Shells first so presets may reference each other regardless of order
    if let Some(presets) = presets {
        for name in presets.keys() {
            pack.presets().create(name)?;
        }
        for (name, body) in presets {
            let Some(preset) = pack.presets().get(name) else {
                continue;
            };
            ctx.location = format!("{}/preset:{}", pack.name(), name);
            ctx.set_current_preset(Some(name.clone()));
            let nodes = ConditionSet::parse_nodes(body, &mut ctx)?;
            preset.conditions().replace_all(nodes);
            preset.conditions().clear_dirty();
        }
        ctx.set_current_preset(None);
        ctx.location = pack.name().to_string();
    }

    let candidates = match input.get("candidates") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Null) | None => &[][..],
        Some(_) => return Err(ReanimError::mismatch("candidates", "array")),
    };

    let mut loaded = 0;
    for (index, item) in candidates.iter().enumerate() {
        match ReplacementCandidate::parse(item, pack.id(), pack.motion_base(), &mut ctx) {
            Ok(candidate) => {
                if candidate.local_motion() >= pack.motion_count() {
                    let label = format!("{}/{}", pack.name(), candidate.name());
                    ctx.report(ConfigProblem::error(
                        ProblemKind::MalformedInput,
                        label,
                        format!(
                            "motion {} outside the pack's {} motions",
                            candidate.local_motion(),
                            pack.motion_count()
                        ),
                    ));
                    continue;
                }
                engine.add_candidate(candidate)?;
                loaded += 1;
            }
            Err(e) => {
                let label = item
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|n| format!("{}/{}", pack.name(), n))
                    .unwrap_or_else(|| format!("{}/candidates[{}]", pack.name(), index));
                ctx.report(ConfigProblem::error(
                    ProblemKind::MalformedInput,
                    label,
                    format!("candidate skipped: {}", e),
                ));
            }
        }
    }

    let problems = ctx.take_problems();
    let problem_count = problems.len();
    engine.record_problems(problems);

    if engine.config().selection.warn_conflicts_on_load {
        for conflict in engine.conflicts() {
            let ours = conflict
                .candidates
                .iter()
                .any(|id| pack.candidate(*id).is_some());
            if ours {
                warn!(
                    pack = pack.name(),
                    slot = %conflict.slot,
                    priority = conflict.priority,
                    count = conflict.candidates.len(),
                    "candidates share a priority, insertion order decides"
                );
            }
        }
    }

    info!(
        pack = pack.name(),
        id = %pack.id(),
        candidates = loaded,
        presets = pack.presets().len(),
        problems = problem_count,
        "rule pack loaded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use reanim_core::MotionSlot;
    use serde_json::json;

    #[test]
    fn test_envelope_errors() {
        let engine = ReplacerEngine::new(EngineConfig::default());
        assert!(load_pack(&engine, &json!({"motions": 3})).is_err());
        assert!(load_pack(&engine, &json!({"name": "a", "motions": "x"})).is_err());
        assert!(load_pack(&engine, &json!({"name": "b", "candidates": {}})).is_err());
        assert!(engine.pack_by_name("b").is_none());
    }

    #[test]
    fn test_bad_candidate_skipped() {
        let engine = ReplacerEngine::new(EngineConfig::default());
        let id = load_pack(
            &engine,
            &json!({
                "name": "walks",
                "motions": 2,
                "candidates": [
                    {"name": "ok", "slot": 1, "motion": 0},
                    {"name": "no_motion", "slot": 1},
                    {"name": "too_far", "slot": 1, "motion": 5}
                ]
            }),
        )
        .unwrap();

        let pack = engine.pack(id).unwrap();
        assert_eq!(pack.candidates().len(), 1);
        let locations: Vec<_> = engine.problems().into_iter().map(|p| p.location).collect();
        assert_eq!(locations, vec!["walks/no_motion", "walks/too_far"]);
    }

    #[test]
    fn test_wide_indices_not_truncated() {
        let engine = ReplacerEngine::new(EngineConfig::default());
        let id = load_pack(
            &engine,
            &json!({
                "name": "wide",
                "motions": 2,
                "candidates": [
                    {"name": "wide_slot", "slot": 4294967299u64, "motion": 0},
                    {"name": "wide_motion", "slot": 3, "motion": 4294967297u64}
                ]
            }),
        )
        .unwrap();

        assert!(engine.pack(id).unwrap().candidates().is_empty());
        assert!(engine.candidate_list(MotionSlot::new(3)).is_none());
        let locations: Vec<_> = engine.problems().into_iter().map(|p| p.location).collect();
        assert_eq!(locations, vec!["wide/wide_slot", "wide/wide_motion"]);
    }

    #[test]
    fn test_failed_load_rolls_back() {
        let engine = ReplacerEngine::new(EngineConfig::default());
        let input = json!({"name": "half", "motions": 1, "candidates": {}});
        assert!(load_pack(&engine, &input).is_err());
        assert!(engine.pack_by_name("half").is_none());
        assert!(engine.packs().is_empty());
    }

    #[test]
    fn test_presets_resolve_out_of_order() {
        let engine = ReplacerEngine::new(EngineConfig::default());
        let id = load_pack(
            &engine,
            &json!({
                "name": "moods",
                "motions": 1,
                "presets": {
                    "a_outer": [{"condition": "PRESET", "preset": "b_inner"}],
                    "b_inner": [{"condition": "Constant", "value": true}]
                }
            }),
        )
        .unwrap();

        let pack = engine.pack(id).unwrap();
        assert_eq!(pack.presets().names(), vec!["a_outer", "b_inner"]);
        assert!(engine.problems().is_empty());
        assert!(engine.detect_problems().is_empty());
    }
}
