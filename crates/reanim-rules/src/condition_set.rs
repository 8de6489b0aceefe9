//! Condition set evaluation, validity and persistence

use serde_json::Value;

use reanim_core::{ConfigProblem, ProblemKind, ReanimError, ReanimResult, RuleKey};

use crate::{Condition, EvalContext, ParseContext, RuleSet};

/// Ordered collection of conditions; insertion order is evaluation order
pub type ConditionSet = RuleSet<Condition>;

impl RuleSet<Condition> {
    /// True iff every member is true; stops at the first false
    pub fn evaluate_all(&self, ctx: &mut EvalContext<'_>) -> bool {
        if !ctx.enter() {
            tracing::trace!("evaluation depth limit reached");
            return false;
        }
        let nodes = self.read_recursive();
        let result = nodes.iter().all(|c| c.evaluate(ctx));
        drop(nodes);
        ctx.leave();
        result
    }

    /// True if any enabled member is true; true when every member is disabled
    pub fn evaluate_any(&self, ctx: &mut EvalContext<'_>) -> bool {
        if !ctx.enter() {
            tracing::trace!("evaluation depth limit reached");
            return false;
        }
        let nodes = self.read_recursive();
        let mut any_enabled = false;
        let mut result = false;
        for condition in nodes.iter() {
            if condition.disabled {
                // visited only so the trace shows it
                if ctx.is_tracing() {
                    condition.evaluate(ctx);
                }
                continue;
            }
            any_enabled = true;
            if condition.evaluate(ctx) {
                result = true;
                break;
            }
        }
        drop(nodes);
        ctx.leave();
        result || !any_enabled
    }

    /// True if this set or any nested set holds an invalid condition
    pub fn has_invalid_conditions(&self) -> bool {
        self.read().iter().any(|c| !c.is_valid())
    }

    /// Find a condition anywhere in this tree and run `f` on it
    pub fn visit(&self, f: &mut dyn FnMut(&Condition, usize)) {
        self.visit_depth(f, 0);
    }

    fn visit_depth(&self, f: &mut dyn FnMut(&Condition, usize), depth: usize) {
        let nodes = self.read();
        for condition in nodes.iter() {
            f(condition, depth);
            for nested in condition.nested_conditions() {
                nested.visit_depth(f, depth + 1);
            }
        }
    }

    /// Does the tree contain a node with `key`?
    pub fn contains_key(&self, key: RuleKey) -> bool {
        let mut found = false;
        self.visit(&mut |c, _| found |= c.key() == key);
        found
    }

    /// Record every invalid leaf into `out`
    pub fn collect_problems(&self, location: &str, out: &mut Vec<ConfigProblem>) {
        self.visit(&mut |condition, _| {
            let has_nested_invalid = condition
                .nested_conditions()
                .iter()
                .any(|s| s.has_invalid_conditions());
            if condition.is_valid() || has_nested_invalid {
                return;
            }
            let kind = if condition.kind_name() == "PRESET" {
                ProblemKind::DanglingPreset
            } else {
                ProblemKind::InvalidCondition
            };
            out.push(ConfigProblem::error(
                kind,
                location,
                format!(
                    "invalid condition '{}' {}",
                    condition.kind_name(),
                    condition.kind().argument_text()
                ),
            ));
        });
    }

    /// Persisted structured form (an array)
    pub fn serialize(&self) -> Value {
        Value::Array(self.read().iter().map(Condition::serialize).collect())
    }

    /// Build conditions from an array; individual failures become invalid nodes
    pub fn parse_nodes(input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<Vec<Condition>> {
        let items = input
            .as_array()
            .ok_or_else(|| ReanimError::mismatch("conditions", "array"))?;
        let factory = ctx.factory;
        Ok(items
            .iter()
            .map(|item| factory.parse_condition(item, ctx))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;
    use reanim_core::{EmptyWorld, FormRef, Point3, Subject, SubjectId};

    use crate::{
        AndCondition, ConditionImpl, EvaluationTrace, OrCondition, RuleComponent, RuleContainer,
        TraceResult,
    };

    #[derive(Debug)]
    struct Counting {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    impl ConditionImpl for Counting {
        fn kind_name(&self) -> &str {
            "Counting"
        }
        fn evaluate_impl(&self, _ctx: &mut EvalContext<'_>) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.result
        }
        fn components(&self) -> Vec<&dyn RuleComponent> {
            Vec::new()
        }
        fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
            Vec::new()
        }
    }

    fn counting(result: bool, calls: &Arc<AtomicUsize>) -> Condition {
        Condition::new(Box::new(Counting {
            result,
            calls: calls.clone(),
        }))
    }

    struct Nobody;

    impl Subject for Nobody {
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
    fn test_evaluate_all_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = ConditionSet::new();
        set.push(counting(true, &calls));
        set.push(counting(false, &calls));
        set.push(counting(true, &calls));

        let mut ctx = EvalContext::new(&Nobody, &EmptyWorld);
        assert!(!set.evaluate_all(&mut ctx));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_evaluate_any_all_disabled_is_true() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = ConditionSet::new();
        set.push(counting(false, &calls).disabled());
        set.push(counting(false, &calls).disabled());

        let mut ctx = EvalContext::new(&Nobody, &EmptyWorld);
        assert!(set.evaluate_any(&mut ctx));
        assert!(set.evaluate_all(&mut ctx));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_evaluate_any_skips_disabled_for_count() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = ConditionSet::new();
        set.push(counting(true, &calls).disabled());
        set.push(counting(false, &calls));

        let mut ctx = EvalContext::new(&Nobody, &EmptyWorld);
        assert!(!set.evaluate_any(&mut ctx));
    }

    #[test]
    fn test_empty_sets() {
        let set = ConditionSet::new();
        let mut ctx = EvalContext::new(&Nobody, &EmptyWorld);
        assert!(set.evaluate_all(&mut ctx));
        assert!(set.evaluate_any(&mut ctx));
    }

    #[test]
    fn test_trace_visits_disabled_under_or() {
        let calls = Arc::new(AtomicUsize::new(0));
        let or = OrCondition::new();
        or.conditions.set.push(counting(true, &calls).disabled());
        or.conditions.set.push(counting(true, &calls));
        let set = ConditionSet::new();
        set.push(Condition::new(Box::new(or)));

        let mut trace = EvaluationTrace::new();
        let result = {
            let mut ctx = EvalContext::new(&Nobody, &EmptyWorld).with_trace(&mut trace);
            set.evaluate_all(&mut ctx)
        };
        assert!(result);
        assert_eq!(trace.len(), 3);
        let root = trace.roots()[0];
        let children = &trace.node(root).unwrap().children;
        assert_eq!(children.len(), 2);
        assert_eq!(trace.node(children[0]).unwrap().result, TraceResult::Disabled);
        assert_eq!(trace.node(children[1]).unwrap().result, TraceResult::Success);
    }

    #[test]
    fn test_dirty_propagates_three_levels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let top = ConditionSet::new();
        let mid_and = AndCondition::new();
        let mid = mid_and.conditions.set.clone();
        top.push(Condition::new(Box::new(mid_and)));

        let inner_or = OrCondition::new();
        let inner = inner_or.conditions.set.clone();
        mid.push(Condition::new(Box::new(inner_or)));

        top.set_dirty_recursive(false);
        assert!(!top.is_dirty() && !mid.is_dirty() && !inner.is_dirty());

        inner.push(counting(true, &calls));
        assert!(inner.is_dirty());
        assert!(mid.is_dirty());
        assert!(top.is_dirty());
    }

    #[test]
    fn test_removed_node_stops_propagating() {
        let top = ConditionSet::new();
        let and = AndCondition::new();
        let nested = and.conditions.set.clone();
        top.push(Condition::new(Box::new(and)));
        let removed = top.remove(0).unwrap();

        top.set_dirty_recursive(false);
        nested.push(Condition::new(Box::new(AndCondition::new())));
        assert!(!top.is_dirty());
        drop(removed);
    }

    #[test]
    fn test_reorder_and_move() {
        let calls = Arc::new(AtomicUsize::new(0));
        let a = ConditionSet::new();
        let b = ConditionSet::new();
        a.push(counting(true, &calls));
        a.push(counting(false, &calls));
        let keys = a.keys();

        a.reorder(&[keys[1], keys[0]]).unwrap();
        assert_eq!(a.keys(), vec![keys[1], keys[0]]);
        assert!(a.reorder(&[keys[0]]).is_err());

        a.move_to(0, &b, 5).unwrap();
        assert_eq!(a.keys(), vec![keys[0]]);
        assert_eq!(b.keys(), vec![keys[1]]);
    }

    proptest! {
        #[test]
        fn prop_negation_inverts(raw in any::<bool>(), negated in any::<bool>()) {
            let calls = Arc::new(AtomicUsize::new(0));
            let mut condition = counting(raw, &calls);
            condition.negated = negated;
            let mut ctx = EvalContext::new(&Nobody, &EmptyWorld);
            prop_assert_eq!(condition.evaluate(&mut ctx), raw ^ negated);
        }

        #[test]
        fn prop_all_matches_iterator(results in proptest::collection::vec(any::<bool>(), 0..12)) {
            let calls = Arc::new(AtomicUsize::new(0));
            let set = ConditionSet::new();
            for r in &results {
                set.push(counting(*r, &calls));
            }
            let mut ctx = EvalContext::new(&Nobody, &EmptyWorld);
            prop_assert_eq!(set.evaluate_all(&mut ctx), results.iter().all(|r| *r));
            prop_assert_eq!(
                set.evaluate_any(&mut ctx),
                results.is_empty() || results.iter().any(|r| *r)
            );
        }
    }
}
