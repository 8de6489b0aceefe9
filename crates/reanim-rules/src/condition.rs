//! Condition - boolean predicate node of a rule tree

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use reanim_core::{ReanimResult, RuleKey};

use crate::{
    ActionSet, ConditionSet, EvalContext, ParseContext, RuleComponent, RuleContainer, RuleNode,
    TraceResult, Version,
};

/// What happens when a condition's kind cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EssentialState {
    /// Must resolve; a failure is a recorded problem and evaluates false
    #[default]
    Essential,
    /// May be missing; evaluates true when it is
    OptionalTrue,
    /// May be missing; evaluates false when it is
    OptionalFalse,
}

/// Provider dependency declared by a condition or action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub provider: String,
    pub version: Version,
}

/// Kind-specific behaviour of a condition
///
/// Implementations own their components as fields and expose them through
/// [`components`](ConditionImpl::components) so parsing, serialization and
/// validity come for free.
pub trait ConditionImpl: Send + Sync + fmt::Debug {
    /// Registry name of the kind
    fn kind_name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Raw predicate, before negation
    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool;

    fn components(&self) -> Vec<&dyn RuleComponent>;

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent>;

    fn is_valid(&self) -> bool {
        self.components().iter().all(|c| c.is_valid())
    }

    /// Text shown next to the kind name in traces
    fn argument_text(&self) -> String {
        self.components()
            .iter()
            .filter(|c| c.conditions().is_none() && c.actions().is_none())
            .map(|c| c.argument_text())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fill components from the persisted form; absent fields keep defaults
    fn parse_components(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        for component in self.components_mut() {
            if let Some(value) = input.get(component.name()) {
                component.parse(value, ctx)?;
            }
        }
        Ok(())
    }

    fn serialize_components(&self, out: &mut Map<String, Value>) {
        for component in self.components() {
            out.insert(component.name().to_string(), component.serialize());
        }
    }

    /// Original input kept by placeholder kinds so nothing is lost on save
    fn raw_input(&self) -> Option<&Value> {
        None
    }
}

/// A condition: kind plus common flags
#[derive(Debug)]
pub struct Condition {
    key: RuleKey,
    pub disabled: bool,
    pub negated: bool,
    pub essential: EssentialState,
    pub requirement: Option<Requirement>,
    kind: Box<dyn ConditionImpl>,
}

impl Condition {
    pub fn new(kind: Box<dyn ConditionImpl>) -> Self {
        Condition {
            key: RuleKey::next(),
            disabled: false,
            negated: false,
            essential: EssentialState::Essential,
            requirement: None,
            kind,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn with_essential(mut self, essential: EssentialState) -> Self {
        self.essential = essential;
        self
    }

    pub fn with_requirement(mut self, provider: impl Into<String>, version: Version) -> Self {
        self.requirement = Some(Requirement {
            provider: provider.into(),
            version,
        });
        self
    }

    /// Stable identity of this node
    pub fn key(&self) -> RuleKey {
        self.key
    }

    pub fn kind_name(&self) -> &str {
        self.kind.kind_name()
    }

    pub fn kind(&self) -> &dyn ConditionImpl {
        self.kind.as_ref()
    }

    pub fn kind_mut(&mut self) -> &mut dyn ConditionImpl {
        self.kind.as_mut()
    }

    pub fn is_valid(&self) -> bool {
        self.kind.is_valid()
    }

    /// Nested condition sets owned by this condition's components
    pub fn nested_conditions(&self) -> Vec<Arc<ConditionSet>> {
        self.kind
            .components()
            .iter()
            .filter_map(|c| c.conditions().cloned())
            .collect()
    }

    /// Nested action sets owned by this condition's components
    pub fn nested_actions(&self) -> Vec<Arc<ActionSet>> {
        self.kind
            .components()
            .iter()
            .filter_map(|c| c.actions().cloned())
            .collect()
    }

    /// Disabled evaluates true regardless of negation
    #[inline]
    pub fn evaluate(&self, ctx: &mut EvalContext<'_>) -> bool {
        if ctx.is_tracing() {
            return self.evaluate_traced(ctx);
        }
        if self.disabled {
            return true;
        }
        let previous = ctx.set_node(self.key);
        let result = self.negated ^ self.kind.evaluate_impl(ctx);
        ctx.restore_node(previous);
        result
    }

    fn evaluate_traced(&self, ctx: &mut EvalContext<'_>) -> bool {
        let argument = self.kind.argument_text();
        let node = match ctx.trace() {
            Some(trace) => trace.begin(self.kind.kind_name(), self.negated, argument),
            None => return self.evaluate(ctx),
        };

        if self.disabled {
            if let Some(trace) = ctx.trace() {
                trace.finish(node, TraceResult::Disabled);
            }
            return true;
        }

        let scope = ctx.trace().and_then(|t| t.enter(node));
        let previous = ctx.set_node(self.key);
        let result = self.negated ^ self.kind.evaluate_impl(ctx);
        ctx.restore_node(previous);

        if let Some(trace) = ctx.trace() {
            trace.exit(scope);
            trace.finish(node, result.into());
        }
        result
    }

    /// Persisted structured form
    pub fn serialize(&self) -> Value {
        let mut map = match self.kind.raw_input() {
            Some(Value::Object(raw)) => raw.clone(),
            _ => {
                let mut map = Map::new();
                map.insert("condition".into(), json!(self.kind.kind_name()));
                self.kind.serialize_components(&mut map);
                map
            }
        };
        write_flag(&mut map, "negated", self.negated);
        write_flag(&mut map, "disabled", self.disabled);
        if self.essential != EssentialState::Essential {
            map.insert("essential".into(), json!(self.essential));
        }
        if let Some(req) = &self.requirement {
            map.insert("requiredPlugin".into(), json!(req.provider));
            map.insert("requiredVersion".into(), json!(req.version.to_string()));
        }
        Value::Object(map)
    }
}

/// Write a boolean flag only when set
pub(crate) fn write_flag(map: &mut Map<String, Value>, name: &str, value: bool) {
    if value {
        map.insert(name.to_string(), Value::Bool(true));
    } else {
        map.remove(name);
    }
}

impl RuleNode for Condition {
    type Mode = ();

    fn key(&self) -> RuleKey {
        self.key
    }

    fn containers(&self) -> Vec<Arc<dyn RuleContainer>> {
        let mut out: Vec<Arc<dyn RuleContainer>> = Vec::new();
        for component in self.kind.components() {
            if let Some(set) = component.conditions() {
                out.push(set.clone());
            }
            if let Some(set) = component.actions() {
                out.push(set.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvaluationTrace;
    use reanim_core::{EmptyWorld, FormRef, Point3, Subject, SubjectId};

    #[derive(Debug)]
    struct Fixed(bool);

    impl ConditionImpl for Fixed {
        fn kind_name(&self) -> &str {
            "Fixed"
        }
        fn evaluate_impl(&self, _ctx: &mut EvalContext<'_>) -> bool {
            self.0
        }
        fn components(&self) -> Vec<&dyn RuleComponent> {
            Vec::new()
        }
        fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
            Vec::new()
        }
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
    fn test_negation_and_disabled() {
        let mut ctx = EvalContext::new(&Nobody, &EmptyWorld);

        assert!(Condition::new(Box::new(Fixed(true))).evaluate(&mut ctx));
        assert!(!Condition::new(Box::new(Fixed(true))).negated().evaluate(&mut ctx));
        assert!(Condition::new(Box::new(Fixed(false))).negated().evaluate(&mut ctx));
        // disabled wins over negation
        assert!(Condition::new(Box::new(Fixed(true)))
            .negated()
            .disabled()
            .evaluate(&mut ctx));
    }

    #[test]
    fn test_traced_disabled() {
        let mut trace = EvaluationTrace::new();
        let result = {
            let mut ctx = EvalContext::new(&Nobody, &EmptyWorld).with_trace(&mut trace);
            Condition::new(Box::new(Fixed(false)))
                .disabled()
                .evaluate(&mut ctx)
        };
        assert!(result);
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.nodes()[0].result, TraceResult::Disabled);
    }

    #[test]
    fn test_serialize_flags() {
        let condition = Condition::new(Box::new(Fixed(true)))
            .negated()
            .with_essential(EssentialState::OptionalFalse);
        let value = condition.serialize();
        assert_eq!(value["condition"], "Fixed");
        assert_eq!(value["negated"], true);
        assert!(value.get("disabled").is_none());
        assert_eq!(value["essential"], "optionalFalse");
    }
}
