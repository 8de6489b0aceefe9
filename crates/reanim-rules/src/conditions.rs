//! Built-in condition kinds

use serde_json::Value;

use reanim_core::{NumericConstraints, NumericValue, RuleValue};

use crate::{
    BoolComponent, Comparison, ComparisonComponent, ConditionImpl, ConditionsComponent,
    EssentialState, EvalContext, FlagComponent, FormComponent, KeywordComponent, NumericComponent,
    PointComponent, PresetComponent, RandomRangeComponent, RuleComponent, StateScope,
    StateScopeComponent, TextComponent,
};

// ============================================================================
// MULTI CONDITIONS
// ============================================================================

/// True iff every nested condition is true
#[derive(Debug)]
pub struct AndCondition {
    pub conditions: ConditionsComponent,
}

impl AndCondition {
    pub fn new() -> Self {
        AndCondition {
            conditions: ConditionsComponent::new("conditions"),
        }
    }
}

impl Default for AndCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for AndCondition {
    fn kind_name(&self) -> &str {
        "AND"
    }

    fn description(&self) -> &str {
        "All nested conditions must be true"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.conditions.evaluate_all(ctx)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.conditions]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.conditions]
    }
}

/// True if any enabled nested condition is true
#[derive(Debug)]
pub struct OrCondition {
    pub conditions: ConditionsComponent,
}

impl OrCondition {
    pub fn new() -> Self {
        OrCondition {
            conditions: ConditionsComponent::new("conditions"),
        }
    }
}

impl Default for OrCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for OrCondition {
    fn kind_name(&self) -> &str {
        "OR"
    }

    fn description(&self) -> &str {
        "At least one nested condition must be true"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.conditions.evaluate_any(ctx)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.conditions]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.conditions]
    }
}

/// Evaluates a named preset
#[derive(Debug)]
pub struct PresetCondition {
    pub preset: PresetComponent,
}

impl PresetCondition {
    pub fn new() -> Self {
        PresetCondition {
            preset: PresetComponent::new("preset"),
        }
    }
}

impl Default for PresetCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for PresetCondition {
    fn kind_name(&self) -> &str {
        "PRESET"
    }

    fn description(&self) -> &str {
        "All conditions of the referenced preset must be true"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.preset.evaluate(ctx)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.preset]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.preset]
    }
}

// ============================================================================
// LEAF CONDITIONS
// ============================================================================

/// Compares two numeric values
#[derive(Debug)]
pub struct CompareValuesCondition {
    pub value_a: NumericComponent,
    pub comparison: ComparisonComponent,
    pub value_b: NumericComponent,
}

impl CompareValuesCondition {
    pub fn new() -> Self {
        CompareValuesCondition {
            value_a: NumericComponent::new("valueA"),
            comparison: ComparisonComponent::new("comparison"),
            value_b: NumericComponent::new("valueB"),
        }
    }

    pub fn with(a: NumericValue, op: Comparison, b: NumericValue) -> Self {
        let mut c = Self::new();
        c.value_a.value = a;
        c.comparison.op = op;
        c.value_b.value = b;
        c
    }
}

impl Default for CompareValuesCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for CompareValuesCondition {
    fn kind_name(&self) -> &str {
        "CompareValues"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        let a = self.value_a.get(ctx);
        let b = self.value_b.get(ctx);
        self.comparison.op.compare(a, b)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.value_a, &self.comparison, &self.value_b]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.value_a, &mut self.comparison, &mut self.value_b]
    }
}

#[derive(Debug)]
pub struct HasFlagCondition {
    pub flag: FlagComponent,
}

impl HasFlagCondition {
    pub fn new() -> Self {
        HasFlagCondition {
            flag: FlagComponent::new("flag"),
        }
    }

    pub fn with_flag(flag: impl Into<String>) -> Self {
        HasFlagCondition {
            flag: FlagComponent::new("flag").with_flag(flag),
        }
    }
}

impl Default for HasFlagCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for HasFlagCondition {
    fn kind_name(&self) -> &str {
        "HasFlag"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.flag.flag.get_value(ctx.subject, ctx.world)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.flag]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.flag]
    }
}

#[derive(Debug)]
pub struct HasKeywordCondition {
    pub keywords: KeywordComponent,
}

impl HasKeywordCondition {
    pub fn new() -> Self {
        HasKeywordCondition {
            keywords: KeywordComponent::new("keywords"),
        }
    }
}

impl Default for HasKeywordCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for HasKeywordCondition {
    fn kind_name(&self) -> &str {
        "HasKeyword"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.keywords.keywords.get_value(ctx.subject, ctx.world)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.keywords]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.keywords]
    }
}

#[derive(Debug)]
pub struct HasFormCondition {
    pub form: FormComponent,
}

impl HasFormCondition {
    pub fn new() -> Self {
        HasFormCondition {
            form: FormComponent::new("form"),
        }
    }
}

impl Default for HasFormCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for HasFormCondition {
    fn kind_name(&self) -> &str {
        "HasForm"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        match &self.form.form {
            Some(form) => ctx.subject.has_form(form),
            None => false,
        }
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.form]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.form]
    }
}

/// Subject position within a radius of a point
#[derive(Debug)]
pub struct IsWithinDistanceCondition {
    pub target: PointComponent,
    pub radius: NumericComponent,
}

impl IsWithinDistanceCondition {
    pub fn new() -> Self {
        IsWithinDistanceCondition {
            target: PointComponent::new("target"),
            radius: NumericComponent::new("radius")
                .with_constraints(NumericConstraints::none().with_range(0.0, f32::MAX)),
        }
    }
}

impl Default for IsWithinDistanceCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for IsWithinDistanceCondition {
    fn kind_name(&self) -> &str {
        "IsWithinDistance"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        let radius = self.radius.get(ctx);
        ctx.subject.position().distance(&self.target.point) <= radius
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.target, &self.radius]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.target, &mut self.radius]
    }
}

/// Named text property of the subject equals a value
#[derive(Debug)]
pub struct TextEqualsCondition {
    pub property: TextComponent,
    pub value: TextComponent,
}

impl TextEqualsCondition {
    pub fn new() -> Self {
        TextEqualsCondition {
            property: TextComponent::new("property"),
            value: TextComponent::new("value").optional(),
        }
    }
}

impl Default for TextEqualsCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for TextEqualsCondition {
    fn kind_name(&self) -> &str {
        "TextEquals"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        ctx.subject
            .text_equals(self.property.as_str(), self.value.as_str())
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.property, &self.value]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.property, &mut self.value]
    }
}

/// Uniform random draw compared against a value
#[derive(Debug)]
pub struct RandomCondition {
    pub range: RandomRangeComponent,
    pub comparison: ComparisonComponent,
    pub value: NumericComponent,
    pub scope: StateScopeComponent,
}

impl RandomCondition {
    pub fn new() -> Self {
        RandomCondition {
            range: RandomRangeComponent::new("range"),
            comparison: ComparisonComponent::new("comparison").with_op(Comparison::Less),
            value: NumericComponent::new("value"),
            scope: StateScopeComponent::new("scope"),
        }
    }

    /// `draw in [min, max) < chance`
    pub fn chance(min: f32, max: f32, chance: f32) -> Self {
        let mut c = Self::new();
        c.range = c.range.with_range(min, max);
        c.value.value = NumericValue::constant(chance);
        c
    }
}

impl Default for RandomCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionImpl for RandomCondition {
    fn kind_name(&self) -> &str {
        "Random"
    }

    fn evaluate_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        let (min, max) = (self.range.min, self.range.max);
        let drawn = match (self.scope.scope, ctx.node_key()) {
            (StateScope::Instance, Some(key)) => ctx.cached_draw(key, min, max),
            _ => ctx.draw(min, max),
        };
        match drawn {
            Some(drawn) => {
                let value = self.value.get(ctx);
                self.comparison.op.compare(drawn, value)
            }
            // no randomness source
            None => true,
        }
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.range, &self.comparison, &self.value, &self.scope]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![
            &mut self.range,
            &mut self.comparison,
            &mut self.value,
            &mut self.scope,
        ]
    }
}

/// Constant result, useful for authoring placeholders
#[derive(Debug)]
pub struct ConstantCondition {
    pub value: BoolComponent,
}

impl ConstantCondition {
    pub fn new(value: bool) -> Self {
        ConstantCondition {
            value: BoolComponent::new("value", value),
        }
    }
}

impl Default for ConstantCondition {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConditionImpl for ConstantCondition {
    fn kind_name(&self) -> &str {
        "Constant"
    }

    fn evaluate_impl(&self, _ctx: &mut EvalContext<'_>) -> bool {
        self.value.value
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.value]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.value]
    }
}

// ============================================================================
// INVALID
// ============================================================================

/// Placeholder for a condition that could not be built
///
/// Keeps the original input so saving the pack does not lose it.
#[derive(Debug)]
pub struct InvalidCondition {
    kind: String,
    pub reason: String,
    essential: EssentialState,
    raw: Value,
}

impl InvalidCondition {
    pub fn new(
        kind: impl Into<String>,
        reason: impl Into<String>,
        essential: EssentialState,
        raw: Value,
    ) -> Self {
        InvalidCondition {
            kind: kind.into(),
            reason: reason.into(),
            essential,
            raw,
        }
    }

    /// Kind name as authored
    pub fn original_kind(&self) -> &str {
        &self.kind
    }
}

impl ConditionImpl for InvalidCondition {
    fn kind_name(&self) -> &str {
        "Invalid"
    }

    fn description(&self) -> &str {
        &self.reason
    }

    fn evaluate_impl(&self, _ctx: &mut EvalContext<'_>) -> bool {
        self.essential == EssentialState::OptionalTrue
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        Vec::new()
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        Vec::new()
    }

    /// Optional placeholders are expected and count as valid
    fn is_valid(&self) -> bool {
        self.essential != EssentialState::Essential
    }

    fn argument_text(&self) -> String {
        format!("{} ({})", self.kind, self.reason)
    }

    fn raw_input(&self) -> Option<&Value> {
        Some(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    use reanim_core::{EmptyWorld, FormRef, Point3, Subject, SubjectId};

    use crate::{Condition, ConditionStateStore};

    struct Guard {
        position: Point3,
    }

    impl Subject for Guard {
        fn subject_id(&self) -> SubjectId {
            SubjectId::new(42)
        }
        fn variable(&self, name: &str) -> Option<f32> {
            (name == "Speed").then_some(250.0)
        }
        fn flag(&self, name: &str) -> bool {
            name == "IsSneaking"
        }
        fn has_keyword(&self, keyword: &str) -> bool {
            keyword == "ActorTypeNPC"
        }
        fn has_form(&self, form: &FormRef) -> bool {
            form.name == "IronSword"
        }
        fn position(&self) -> Point3 {
            self.position
        }
        fn text_equals(&self, name: &str, value: &str) -> bool {
            name == "Race" && value == "Nord"
        }
        fn attribute(&self, _: &str) -> Option<f32> {
            None
        }
    }

    fn guard() -> Guard {
        Guard {
            position: Point3::new(3.0, 4.0, 0.0),
        }
    }

    #[test]
    fn test_compare_values() {
        let subject = guard();
        let mut ctx = EvalContext::new(&subject, &EmptyWorld);
        let speed = reanim_core::ExternalVariableRef::subject("Speed");
        let fast = CompareValuesCondition::with(
            NumericValue::Variable(speed),
            Comparison::Greater,
            NumericValue::constant(200.0),
        );
        assert!(fast.evaluate_impl(&mut ctx));
        assert!(fast.is_valid());
    }

    #[test]
    fn test_within_distance() {
        let subject = guard();
        let mut ctx = EvalContext::new(&subject, &EmptyWorld);
        let mut c = IsWithinDistanceCondition::new();
        c.radius.value = NumericValue::constant(5.0);
        assert!(c.evaluate_impl(&mut ctx));
        c.radius.value = NumericValue::constant(4.9);
        assert!(!c.evaluate_impl(&mut ctx));
    }

    #[test]
    fn test_random_without_rng_passes() {
        let subject = guard();
        let mut ctx = EvalContext::new(&subject, &EmptyWorld);
        let c = RandomCondition::chance(0.0, 1.0, 0.0);
        assert!(c.evaluate_impl(&mut ctx));
    }

    #[test]
    fn test_random_instance_scope_is_cached() {
        let subject = guard();
        let mut rng = StdRng::seed_from_u64(11);
        let mut store = ConditionStateStore::new();
        let mut random = RandomCondition::chance(0.0, 1.0, 0.5);
        random.scope.scope = StateScope::Instance;
        let condition = Condition::new(Box::new(random));

        let mut ctx = EvalContext::new(&subject, &EmptyWorld)
            .with_rng(&mut rng)
            .with_state(&mut store);
        let first = condition.evaluate(&mut ctx);
        for _ in 0..20 {
            assert_eq!(condition.evaluate(&mut ctx), first);
        }
        drop(ctx);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_random_overflowing_range_rejected() {
        let factory = crate::RuleFactory::with_builtins();
        let catalog = reanim_core::HostCatalog::permissive();
        let mut parse = crate::ParseContext::new(&factory, &catalog);
        let input = json!({"condition": "Random", "range": {"min": -3.0e38, "max": 3.0e38}});
        let condition = factory.parse_condition(&input, &mut parse);
        assert!(!condition.is_valid());
        assert_eq!(parse.problems().len(), 1);

        // built directly it still evaluates without a fault
        let subject = guard();
        let mut rng = StdRng::seed_from_u64(2);
        let wide = RandomCondition::chance(-3.0e38, 3.0e38, 0.0);
        assert!(!wide.is_valid());
        let mut ctx = EvalContext::new(&subject, &EmptyWorld).with_rng(&mut rng);
        assert!(wide.evaluate_impl(&mut ctx));
    }

    #[test]
    fn test_invalid_essential_states() {
        let subject = guard();
        let mut ctx = EvalContext::new(&subject, &EmptyWorld);
        let raw = json!({"condition": "FromPlugin"});
        let essential = InvalidCondition::new("FromPlugin", "missing", EssentialState::Essential, raw.clone());
        let opt_true = InvalidCondition::new("FromPlugin", "missing", EssentialState::OptionalTrue, raw.clone());
        let opt_false = InvalidCondition::new("FromPlugin", "missing", EssentialState::OptionalFalse, raw);

        assert!(!essential.evaluate_impl(&mut ctx));
        assert!(!essential.is_valid());
        assert!(opt_true.evaluate_impl(&mut ctx));
        assert!(opt_true.is_valid());
        assert!(!opt_false.evaluate_impl(&mut ctx));
    }

    #[test]
    fn test_leaf_kinds() {
        let subject = guard();
        let mut ctx = EvalContext::new(&subject, &EmptyWorld);
        assert!(HasFlagCondition::with_flag("IsSneaking").evaluate_impl(&mut ctx));
        assert!(!HasFlagCondition::with_flag("IsSwimming").evaluate_impl(&mut ctx));

        let mut text = TextEqualsCondition::new();
        text.property.text = reanim_core::TextValue::new("Race");
        text.value.text = reanim_core::TextValue::new("Nord");
        assert!(text.evaluate_impl(&mut ctx));

        assert!(!HasFormCondition::new().evaluate_impl(&mut ctx));
        assert!(!HasFormCondition::new().is_valid());
    }

    proptest::proptest! {
        #[test]
        fn prop_random_full_range_evaluates(
            min in proptest::num::f32::ANY,
            max in proptest::num::f32::ANY,
            seed: u64,
        ) {
            let subject = guard();
            let mut rng = StdRng::seed_from_u64(seed);
            let condition = Condition::new(Box::new(RandomCondition::chance(min, max, 0.5)));
            let mut ctx = EvalContext::new(&subject, &EmptyWorld).with_rng(&mut rng);
            let _ = condition.evaluate(&mut ctx);
        }
    }
}
