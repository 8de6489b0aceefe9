//! Evaluation and parse contexts
//!
//! `EvalContext` is created per evaluation on the real-time thread and only
//! borrows; nothing in it allocates unless tracing is switched on.

use std::collections::HashMap;

use rand::{Rng, RngCore};
use reanim_core::{ConfigProblem, HostCatalog, RuleKey, Subject, WorldState};

use crate::{EvaluationTrace, PresetRegistry, RuleFactory};

/// Default nesting limit for rule trees
pub const DEFAULT_MAX_DEPTH: u32 = 64;

/// Named event delivered to on-trigger action sets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerEvent {
    pub event: String,
    pub payload: Option<String>,
}

impl TriggerEvent {
    pub fn new(event: impl Into<String>) -> Self {
        TriggerEvent {
            event: event.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Per-instance condition state (cached random draws)
#[derive(Debug, Clone, Default)]
pub struct ConditionStateStore {
    values: HashMap<RuleKey, f32>,
}

impl ConditionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: RuleKey) -> Option<f32> {
        self.values.get(&key).copied()
    }

    pub fn insert(&mut self, key: RuleKey, value: f32) {
        self.values.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything one evaluation needs besides the rule tree itself
pub struct EvalContext<'a> {
    pub subject: &'a dyn Subject,
    pub world: &'a dyn WorldState,
    rng: Option<&'a mut dyn RngCore>,
    state: Option<&'a mut ConditionStateStore>,
    trace: Option<&'a mut EvaluationTrace>,
    trigger: Option<&'a TriggerEvent>,
    node: Option<RuleKey>,
    depth: u32,
    max_depth: u32,
}

impl<'a> EvalContext<'a> {
    pub fn new(subject: &'a dyn Subject, world: &'a dyn WorldState) -> Self {
        EvalContext {
            subject,
            world,
            rng: None,
            state: None,
            trace: None,
            trigger: None,
            node: None,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_rng(mut self, rng: &'a mut dyn RngCore) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn with_state(mut self, state: &'a mut ConditionStateStore) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_trace(mut self, trace: &'a mut EvaluationTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_trigger(mut self, trigger: &'a TriggerEvent) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Source of randomness, if the host provided one
    pub fn rng(&mut self) -> Option<&mut (dyn RngCore + 'a)> {
        self.rng.as_deref_mut()
    }

    pub fn has_rng(&self) -> bool {
        self.rng.is_some()
    }

    pub fn trace(&mut self) -> Option<&mut EvaluationTrace> {
        self.trace.as_deref_mut()
    }

    #[inline]
    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    pub fn trigger(&self) -> Option<&'a TriggerEvent> {
        self.trigger
    }

    /// Key of the rule node currently being evaluated
    pub fn node_key(&self) -> Option<RuleKey> {
        self.node
    }

    pub(crate) fn set_node(&mut self, key: RuleKey) -> Option<RuleKey> {
        self.node.replace(key)
    }

    pub(crate) fn restore_node(&mut self, previous: Option<RuleKey>) {
        self.node = previous;
    }

    /// Draw uniformly in `[min, max)`; `None` without an rng.
    ///
    /// Empty ranges and ranges whose width overflows yield `min`.
    pub fn draw(&mut self, min: f32, max: f32) -> Option<f32> {
        let rng = self.rng()?;
        if max > min && (max - min).is_finite() {
            Some(rng.gen_range(min..max))
        } else {
            Some(min)
        }
    }

    /// Draw once per instance and reuse it until the store is cleared
    pub fn cached_draw(&mut self, key: RuleKey, min: f32, max: f32) -> Option<f32> {
        if let Some(cached) = self.state.as_deref().and_then(|s| s.get(key)) {
            return Some(cached);
        }
        let value = self.draw(min, max)?;
        if let Some(state) = self.state.as_deref_mut() {
            state.insert(key, value);
        }
        Some(value)
    }

    /// Enter one nesting level, false once the limit is reached
    pub(crate) fn enter(&mut self) -> bool {
        if self.depth >= self.max_depth {
            return false;
        }
        self.depth += 1;
        true
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Context for turning structured input into rule trees
pub struct ParseContext<'a> {
    pub factory: &'a RuleFactory,
    pub catalog: &'a HostCatalog,
    pub presets: Option<&'a PresetRegistry>,
    /// Human-readable location used in problem reports
    pub location: String,
    current_preset: Option<String>,
    problems: Vec<ConfigProblem>,
}

impl<'a> ParseContext<'a> {
    pub fn new(factory: &'a RuleFactory, catalog: &'a HostCatalog) -> Self {
        ParseContext {
            factory,
            catalog,
            presets: None,
            location: String::new(),
            current_preset: None,
            problems: Vec::new(),
        }
    }

    pub fn with_presets(mut self, presets: &'a PresetRegistry) -> Self {
        self.presets = Some(presets);
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Mark the preset whose body is being parsed (self references are rejected)
    pub fn set_current_preset(&mut self, name: Option<String>) {
        self.current_preset = name;
    }

    pub fn current_preset(&self) -> Option<&str> {
        self.current_preset.as_deref()
    }

    pub fn report(&mut self, problem: ConfigProblem) {
        tracing::warn!(location = %problem.location, "{}", problem.message);
        self.problems.push(problem);
    }

    pub fn problems(&self) -> &[ConfigProblem] {
        &self.problems
    }

    pub fn take_problems(&mut self) -> Vec<ConfigProblem> {
        std::mem::take(&mut self.problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reanim_core::{EmptyWorld, FormRef, Point3, SubjectId};

    struct Dummy;

    impl Subject for Dummy {
        fn subject_id(&self) -> SubjectId {
            SubjectId::new(0)
        }
        fn variable(&self, _: &str) -> Option<f32> {
            None
        }
        fn flag(&self, _: &str) -> bool {
            false
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
    }

    #[test]
    fn test_draw_without_rng() {
        let mut ctx = EvalContext::new(&Dummy, &EmptyWorld);
        assert!(ctx.draw(0.0, 1.0).is_none());
    }

    #[test]
    fn test_draw_overflowing_width_yields_min() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = EvalContext::new(&Dummy, &EmptyWorld).with_rng(&mut rng);
        assert_eq!(ctx.draw(-3.0e38, 3.0e38), Some(-3.0e38));
        assert_eq!(ctx.draw(f32::NEG_INFINITY, 0.0), Some(f32::NEG_INFINITY));
        assert_eq!(ctx.draw(2.0, 1.0), Some(2.0));
        let inside = ctx.draw(-1.0e38, 1.0e38).unwrap();
        assert!((-1.0e38..=1.0e38).contains(&inside));
    }

    #[test]
    fn test_cached_draw_reused() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut store = ConditionStateStore::new();
        let key = RuleKey::next();
        let first;
        {
            let mut ctx = EvalContext::new(&Dummy, &EmptyWorld)
                .with_rng(&mut rng)
                .with_state(&mut store);
            first = ctx.cached_draw(key, 0.0, 100.0).unwrap();
            assert_eq!(ctx.cached_draw(key, 0.0, 100.0), Some(first));
        }
        assert_eq!(store.get(key), Some(first));
    }

    #[test]
    fn test_depth_limit() {
        let mut ctx = EvalContext::new(&Dummy, &EmptyWorld).with_max_depth(2);
        assert!(ctx.enter());
        assert!(ctx.enter());
        assert!(!ctx.enter());
        ctx.leave();
        assert!(ctx.enter());
    }

    proptest::proptest! {
        #[test]
        fn prop_draw_never_panics(min in proptest::num::f32::ANY, max in proptest::num::f32::ANY, seed: u64) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut ctx = EvalContext::new(&Dummy, &EmptyWorld).with_rng(&mut rng);
            let drawn = ctx.draw(min, max).unwrap();
            if max > min && (max - min).is_finite() {
                proptest::prop_assert!(drawn >= min && drawn <= max);
            }
        }
    }
}
