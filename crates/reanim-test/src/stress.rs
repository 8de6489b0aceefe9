//! Concurrent Stress Harness - real-time readers against an editor writer
//!
//! Reader threads play the host's real-time side: selection, activation,
//! loops, echoes and deactivation on their own handles. One writer thread
//! plays the editor: priority changes, flag toggles, deferred edits and pack
//! reloads. Invariants are checked continuously:
//! - every candidate list stays priority ordered
//! - an activation only ever reports a candidate of its own slot
//! - synchronized indices are restored once a handle deactivates
//! - all threads finish (no deadlock)
//!
//! [`run_condition_set_stress`] does the same for a single condition set.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use reanim_core::{EmptyWorld, MotionSlot, PlaybackHandle};
use reanim_playback::{Frame, MotionSource, SyncHost};
use reanim_rules::{Condition, ConditionSet, ConstantCondition, EvalContext, TriggerEvent};
use reanim_runtime::DeferredEdit;
use reanim_select::CandidateFlags;

use crate::mock::{MockMotionHost, MockSubject};
use crate::scenario::{flag_name, generated_pack, Scenario, ScenarioConfig};

/// Stress run configuration
#[derive(Clone, Debug)]
pub struct StressConfig {
    pub scenario: ScenarioConfig,
    /// Real-time reader threads
    pub readers: usize,
    /// Operations per reader
    pub reader_ops: usize,
    /// Operations of the writer
    pub writer_ops: usize,
    /// Probability that a writer op reloads a whole pack
    pub reload_prob: f64,
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            scenario: ScenarioConfig::default(),
            readers: 4,
            reader_ops: 2000,
            writer_ops: 500,
            reload_prob: 0.02,
            seed: 42,
        }
    }
}

impl StressConfig {
    /// Light run for unit tests
    pub fn light() -> Self {
        StressConfig {
            scenario: ScenarioConfig::light(),
            readers: 3,
            reader_ops: 300,
            writer_ops: 100,
            reload_prob: 0.05,
            seed: 7,
        }
    }
}

/// Outcome of a stress run
#[derive(Clone, Debug, Default)]
pub struct StressReport {
    pub selections: u64,
    pub activations: u64,
    pub replaced: u64,
    pub edits: u64,
    pub reloads: u64,
    pub violations: Vec<String>,
    pub elapsed: Duration,
}

impl StressReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Run readers and one writer against a shared engine
pub fn run_stress(config: &StressConfig) -> StressReport {
    let scenario = Scenario::build(config.scenario.clone());
    let start = Instant::now();

    let violations = Arc::new(Mutex::new(Vec::new()));
    let selections = Arc::new(AtomicU64::new(0));
    let activations = Arc::new(AtomicU64::new(0));
    let replaced = Arc::new(AtomicU64::new(0));
    let writer_done = Arc::new(AtomicBool::new(false));
    let motions = Arc::new(MockMotionHost::new());

    let mut readers = Vec::with_capacity(config.readers);
    for reader in 0..config.readers {
        let engine = scenario.engine.clone();
        let sync = scenario.sync.clone();
        let motions = motions.clone();
        let violations = violations.clone();
        let selections = selections.clone();
        let activations = activations.clone();
        let replaced = replaced.clone();
        let slots = config.scenario.slots.max(1);
        let flag_pool = config.scenario.flag_pool.max(1);
        let ops = config.reader_ops;
        let seed = config.seed.wrapping_add(reader as u64 + 1);

        readers.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let subject = MockSubject::new(reader as u64);
            let world = EmptyWorld;

            for op in 0..ops {
                let flag = flag_name(rng.gen_range(0..flag_pool));
                subject.set_flag(&flag, rng.gen_bool(0.5));
                let slot = MotionSlot::new(rng.gen_range(0..slots));

                let selected = {
                    let mut ctx = EvalContext::new(&subject, &world).with_rng(&mut rng);
                    engine.select(slot, &mut ctx)
                };
                if let Some(candidate) = selected {
                    if candidate.slot() != slot {
                        violations.lock().push(format!(
                            "slot {} selected {} of another slot",
                            slot,
                            candidate.name()
                        ));
                    }
                }
                selections.fetch_add(1, Ordering::Relaxed);

                if let Some(list) = engine.candidate_list(slot) {
                    if !list.is_ordered() {
                        violations.lock().push(format!("slot {} list out of order", slot));
                    }
                }

                // one short playback
                let handle = PlaybackHandle::new(((reader as u64) << 32) | op as u64);
                let original = 10_000 + op as u32;
                sync.register(handle, original);
                let mut frame = Frame::new(&subject, &world).with_rng(&mut rng);
                match engine.activate(handle, slot, &mut frame, true) {
                    Ok(activation) => {
                        activations.fetch_add(1, Ordering::Relaxed);
                        if activation.is_replaced() {
                            replaced.fetch_add(1, Ordering::Relaxed);
                        }
                        let _ = engine.update(handle, 0.05);
                        let _ = engine.generate(handle, motions.as_ref());
                        let _ = engine.on_loop(handle, &mut frame);
                        let _ = engine.on_event(
                            handle,
                            &TriggerEvent::new("footstep"),
                            false,
                            &mut frame,
                        );
                        let _ = engine.on_echo(handle, &mut frame);
                        let _ = engine.revalidate(handle, &mut frame);
                        if let Some(info) = engine.tracker().instance_info(handle) {
                            if info.slot != slot {
                                violations
                                    .lock()
                                    .push(format!("handle {} moved to slot {}", handle, info.slot));
                            }
                            if let MotionSource::Original(s) = info.source {
                                if s != slot {
                                    violations
                                        .lock()
                                        .push(format!("handle {} plays original {}", handle, s));
                                }
                            }
                        }
                        let _ = engine.deactivate(handle, &mut frame);
                        if sync.index(handle) != Some(original) {
                            violations
                                .lock()
                                .push(format!("handle {} sync index not restored", handle));
                        }
                    }
                    Err(e) => violations
                        .lock()
                        .push(format!("activate {} failed: {}", handle, e)),
                }
            }
        }));
    }

    let writer = {
        let engine = scenario.engine.clone();
        let scenario_config = config.scenario.clone();
        let packs = scenario.packs.clone();
        let writer_done = writer_done.clone();
        let ops = config.writer_ops;
        let reload_prob = config.reload_prob;
        let seed = config.seed;

        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut edits = 0u64;
            let mut reloads = 0u64;

            for _ in 0..ops {
                if packs.is_empty() {
                    break;
                }
                let pack_index = rng.gen_range(0..packs.len());
                if rng.gen_bool(reload_prob) {
                    if engine.unload_pack(packs[pack_index]).is_ok()
                        && engine
                            .load_pack(&generated_pack(&scenario_config, pack_index))
                            .is_ok()
                    {
                        reloads += 1;
                    }
                    continue;
                }

                let Some(pack) = engine.pack(packs[pack_index]) else {
                    continue;
                };
                let candidates = pack.candidates();
                if candidates.is_empty() {
                    continue;
                }
                let target = &candidates[rng.gen_range(0..candidates.len())];

                match rng.gen_range(0..3) {
                    0 => {
                        let _ = engine.set_priority(target.id(), rng.gen_range(-20..40));
                    }
                    1 => target.set_flag(CandidateFlags::DISABLED, rng.gen_bool(0.2)),
                    _ => {
                        let edit = DeferredEdit::SetPriority {
                            candidate: target.id(),
                            priority: rng.gen_range(-20..40),
                        };
                        if engine.queue_edit(edit).is_ok() {
                            edits += 1;
                        }
                        engine.apply_pending_edits();
                    }
                }
            }
            writer_done.store(true, Ordering::Release);
            (edits, reloads)
        })
    };

    let mut report = StressReport::default();
    for reader in readers {
        if reader.join().is_err() {
            violations.lock().push("reader panicked".to_string());
        }
    }
    match writer.join() {
        Ok((edits, reloads)) => {
            report.edits = edits;
            report.reloads = reloads;
        }
        Err(_) => violations.lock().push("writer panicked".to_string()),
    }

    if !writer_done.load(Ordering::Acquire) {
        violations.lock().push("writer did not finish".to_string());
    }
    for slot in scenario.engine.slots() {
        if let Some(list) = scenario.engine.candidate_list(slot) {
            if !list.is_ordered() {
                violations.lock().push(format!("slot {} list out of order at end", slot));
            }
        }
    }
    if !scenario.engine.tracker().is_empty() {
        violations.lock().push(format!(
            "{} playback instances leaked",
            scenario.engine.tracker().len()
        ));
    }

    report.selections = selections.load(Ordering::Relaxed);
    report.activations = activations.load(Ordering::Relaxed);
    report.replaced = replaced.load(Ordering::Relaxed);
    report.violations = std::mem::take(&mut *violations.lock());
    report.elapsed = start.elapsed();
    debug!(
        selections = report.selections,
        activations = report.activations,
        violations = report.violations.len(),
        "stress run finished"
    );
    report
}

/// Readers evaluate one condition set while a writer adds and removes members.
///
/// Every member is a constant `true`, so any evaluation other than `true`, a
/// member count outside the writer's bounds or a duplicated key is a torn read.
pub fn run_condition_set_stress(readers: usize, ops: usize, seed: u64) -> StressReport {
    const BASE: usize = 4;
    const MAX_EXTRA: usize = 16;

    let start = Instant::now();
    let set = ConditionSet::new();
    for _ in 0..BASE {
        set.push(Condition::new(Box::new(ConstantCondition::new(true))));
    }
    let violations = Arc::new(Mutex::new(Vec::new()));
    let selections = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..readers)
        .map(|reader| {
            let set = set.clone();
            let violations = violations.clone();
            let selections = selections.clone();
            thread::spawn(move || {
                let subject = MockSubject::new(reader as u64);
                for _ in 0..ops {
                    let mut ctx = EvalContext::new(&subject, &EmptyWorld);
                    if !set.evaluate_all(&mut ctx) {
                        violations.lock().push("all-true set evaluated false".to_string());
                    }
                    let keys = set.keys();
                    let mut unique = keys.clone();
                    unique.sort();
                    unique.dedup();
                    if unique.len() != keys.len() || keys.len() < BASE || keys.len() > BASE + MAX_EXTRA {
                        violations
                            .lock()
                            .push(format!("torn member list of {} keys", keys.len()));
                    }
                    selections.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let writer = {
        let set = set.clone();
        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut edits = 0u64;
            for _ in 0..ops {
                let len = set.len();
                if len < BASE + MAX_EXTRA && (len == BASE || rng.gen_bool(0.5)) {
                    set.push(Condition::new(Box::new(ConstantCondition::new(true))));
                } else if set.remove(rng.gen_range(BASE..len)).is_err() {
                    continue;
                }
                edits += 1;
            }
            edits
        })
    };

    for handle in handles {
        if handle.join().is_err() {
            violations.lock().push("reader panicked".to_string());
        }
    }
    let mut report = StressReport::default();
    match writer.join() {
        Ok(edits) => report.edits = edits,
        Err(_) => violations.lock().push("writer panicked".to_string()),
    }
    report.selections = selections.load(Ordering::Relaxed);
    report.violations = std::mem::take(&mut *violations.lock());
    report.elapsed = start.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stress_light() {
        let config = StressConfig::light();
        let report = run_stress(&config);
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.selections, (config.readers * config.reader_ops) as u64);
        assert_eq!(report.activations, report.selections);
    }

    #[test]
    fn test_stress_without_reloads() {
        let config = StressConfig {
            reload_prob: 0.0,
            ..StressConfig::light()
        };
        let report = run_stress(&config);
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.reloads, 0);
        assert!(report.replaced > 0);
    }

    #[test]
    fn test_condition_set_stress() {
        let report = run_condition_set_stress(4, 500, 11);
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.selections, 2000);
        assert!(report.edits > 0);
    }
}
