//! Rule components - named, typed slots inside conditions and actions
//!
//! Each condition or action kind owns its components as plain fields. The
//! [`RuleComponent`] trait gives the generic machinery (parse, serialize,
//! validity, argument text) a uniform view over them.

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::{json, Value};

use reanim_core::{
    f32_field, str_field, FormRef, KeywordSet, NamedFlagRef, NumericConstraints, NumericValue,
    Point3, ProblemKind, ConfigProblem, ReanimError, ReanimResult, RuleValue, TextValue,
};

use crate::{
    ActionSet, ActionSetMode, ConditionPreset, ConditionSet, EvalContext, ParseContext,
};

/// Closed set of component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Numeric,
    Boolean,
    Form,
    Keyword,
    Flag,
    Text,
    Point,
    Conditions,
    Preset,
    Actions,
    Comparison,
    RandomRange,
    StateScope,
}

/// Uniform view over a typed slot
pub trait RuleComponent: Send + Sync + fmt::Debug {
    /// Key used in the persisted form
    fn name(&self) -> &'static str;

    fn kind(&self) -> ComponentKind;

    fn is_valid(&self) -> bool {
        true
    }

    /// Short text shown in traces and tooling
    fn argument_text(&self) -> String;

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()>;

    fn serialize(&self) -> Value;

    /// Nested condition set owned by this component
    fn conditions(&self) -> Option<&Arc<ConditionSet>> {
        None
    }

    /// Nested action set owned by this component
    fn actions(&self) -> Option<&Arc<ActionSet>> {
        None
    }
}

// ============================================================================
// NUMERIC
// ============================================================================

/// Numeric slot with optional author restrictions
#[derive(Debug, Clone)]
pub struct NumericComponent {
    name: &'static str,
    pub value: NumericValue,
    pub constraints: NumericConstraints,
}

impl NumericComponent {
    pub fn new(name: &'static str) -> Self {
        NumericComponent {
            name,
            value: NumericValue::default(),
            constraints: NumericConstraints::none(),
        }
    }

    pub fn with_constraints(mut self, constraints: NumericConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_value(mut self, value: NumericValue) -> Self {
        self.value = value;
        self
    }

    /// Set a value, enforcing the constraints
    pub fn set(&mut self, value: NumericValue) -> ReanimResult<()> {
        self.value = value.constrained(&self.constraints)?;
        Ok(())
    }

    #[inline]
    pub fn get(&self, ctx: &EvalContext<'_>) -> f32 {
        self.value.get_value(ctx.subject, ctx.world)
    }
}

impl RuleComponent for NumericComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Numeric
    }

    fn is_valid(&self) -> bool {
        self.value.is_valid()
    }

    fn argument_text(&self) -> String {
        self.value.describe()
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        let value = NumericValue::parse(input, ctx.catalog)?;
        self.set(value)
    }

    fn serialize(&self) -> Value {
        self.value.serialize()
    }
}

// ============================================================================
// BOOLEAN
// ============================================================================

#[derive(Debug, Clone)]
pub struct BoolComponent {
    name: &'static str,
    pub value: bool,
}

impl BoolComponent {
    pub fn new(name: &'static str, value: bool) -> Self {
        BoolComponent { name, value }
    }
}

impl RuleComponent for BoolComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Boolean
    }

    fn argument_text(&self) -> String {
        self.value.to_string()
    }

    fn parse(&mut self, input: &Value, _ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.value = input
            .as_bool()
            .ok_or_else(|| ReanimError::mismatch(self.name, "bool"))?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        Value::Bool(self.value)
    }
}

// ============================================================================
// FORM REFERENCE
// ============================================================================

#[derive(Debug, Clone)]
pub struct FormComponent {
    name: &'static str,
    pub form: Option<FormRef>,
}

impl FormComponent {
    pub fn new(name: &'static str) -> Self {
        FormComponent { name, form: None }
    }

    pub fn with_form(mut self, form: FormRef) -> Self {
        self.form = Some(form);
        self
    }
}

impl RuleComponent for FormComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Form
    }

    fn is_valid(&self) -> bool {
        self.form.as_ref().is_some_and(FormRef::is_resolved)
    }

    fn argument_text(&self) -> String {
        match &self.form {
            Some(form) => form.to_string(),
            None => "<none>".to_string(),
        }
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.form = Some(match input.as_str() {
            Some(name) => FormRef::new(name, ctx.catalog),
            None => FormRef::parse(input, ctx.catalog)?,
        });
        Ok(())
    }

    fn serialize(&self) -> Value {
        match &self.form {
            Some(form) => json!(form.name),
            None => Value::Null,
        }
    }
}

// ============================================================================
// KEYWORDS / FLAG / TEXT / POINT
// ============================================================================

#[derive(Debug, Clone)]
pub struct KeywordComponent {
    name: &'static str,
    pub keywords: KeywordSet,
}

impl KeywordComponent {
    pub fn new(name: &'static str) -> Self {
        KeywordComponent {
            name,
            keywords: KeywordSet::default(),
        }
    }

    pub fn with_keywords(mut self, keywords: KeywordSet) -> Self {
        self.keywords = keywords;
        self
    }
}

impl RuleComponent for KeywordComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Keyword
    }

    fn is_valid(&self) -> bool {
        self.keywords.is_valid()
    }

    fn argument_text(&self) -> String {
        self.keywords.describe()
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.keywords = if input.is_array() {
            KeywordSet::parse(&json!({ "keywords": input }), ctx.catalog)?
        } else {
            KeywordSet::parse(input, ctx.catalog)?
        };
        Ok(())
    }

    fn serialize(&self) -> Value {
        json!(self.keywords.names)
    }
}

#[derive(Debug, Clone)]
pub struct FlagComponent {
    name: &'static str,
    pub flag: NamedFlagRef,
}

impl FlagComponent {
    pub fn new(name: &'static str) -> Self {
        FlagComponent {
            name,
            flag: NamedFlagRef::new(""),
        }
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = NamedFlagRef::new(flag);
        self
    }
}

impl RuleComponent for FlagComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Flag
    }

    fn is_valid(&self) -> bool {
        self.flag.is_valid()
    }

    fn argument_text(&self) -> String {
        self.flag.describe()
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.flag = match input.as_str() {
            Some(name) => NamedFlagRef::new(name),
            None => NamedFlagRef::parse(input, ctx.catalog)?,
        };
        Ok(())
    }

    fn serialize(&self) -> Value {
        json!(self.flag.name)
    }
}

#[derive(Debug, Clone)]
pub struct TextComponent {
    name: &'static str,
    pub text: TextValue,
    /// Empty text counts as valid
    optional: bool,
}

impl TextComponent {
    pub fn new(name: &'static str) -> Self {
        TextComponent {
            name,
            text: TextValue::default(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = TextValue::new(text);
        self
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

impl RuleComponent for TextComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Text
    }

    fn is_valid(&self) -> bool {
        self.optional || self.text.is_valid()
    }

    fn argument_text(&self) -> String {
        self.text.describe()
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.text = match input.as_str() {
            Some(text) => TextValue::new(text),
            None => TextValue::parse(input, ctx.catalog)?,
        };
        Ok(())
    }

    fn serialize(&self) -> Value {
        json!(self.text.text)
    }
}

#[derive(Debug, Clone)]
pub struct PointComponent {
    name: &'static str,
    pub point: Point3,
}

impl PointComponent {
    pub fn new(name: &'static str) -> Self {
        PointComponent {
            name,
            point: Point3::zero(),
        }
    }

    pub fn with_point(mut self, point: Point3) -> Self {
        self.point = point;
        self
    }
}

impl RuleComponent for PointComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Point
    }

    fn is_valid(&self) -> bool {
        self.point.is_valid()
    }

    fn argument_text(&self) -> String {
        self.point.describe()
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.point = Point3::parse(input, ctx.catalog)?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        self.point.serialize()
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparison {
    #[default]
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Comparison {
    #[inline]
    pub fn compare(self, a: f32, b: f32) -> bool {
        match self {
            Comparison::Equal => a == b,
            Comparison::NotEqual => a != b,
            Comparison::Greater => a > b,
            Comparison::GreaterOrEqual => a >= b,
            Comparison::Less => a < b,
            Comparison::LessOrEqual => a <= b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "==" => Some(Comparison::Equal),
            "!=" => Some(Comparison::NotEqual),
            ">" => Some(Comparison::Greater),
            ">=" => Some(Comparison::GreaterOrEqual),
            "<" => Some(Comparison::Less),
            "<=" => Some(Comparison::LessOrEqual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonComponent {
    name: &'static str,
    pub op: Comparison,
}

impl ComparisonComponent {
    pub fn new(name: &'static str) -> Self {
        ComparisonComponent {
            name,
            op: Comparison::Equal,
        }
    }

    pub fn with_op(mut self, op: Comparison) -> Self {
        self.op = op;
        self
    }
}

impl RuleComponent for ComparisonComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Comparison
    }

    fn argument_text(&self) -> String {
        self.op.symbol().to_string()
    }

    fn parse(&mut self, input: &Value, _ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        let symbol = input
            .as_str()
            .ok_or_else(|| ReanimError::mismatch(self.name, "string"))?;
        self.op = Comparison::from_symbol(symbol)
            .ok_or_else(|| ReanimError::invalid(self.name, format!("unknown operator '{}'", symbol)))?;
        Ok(())
    }

    fn serialize(&self) -> Value {
        json!(self.op.symbol())
    }
}

// ============================================================================
// RANDOM RANGE / STATE SCOPE
// ============================================================================

#[derive(Debug, Clone)]
pub struct RandomRangeComponent {
    name: &'static str,
    pub min: f32,
    pub max: f32,
}

impl RandomRangeComponent {
    pub fn new(name: &'static str) -> Self {
        RandomRangeComponent {
            name,
            min: 0.0,
            max: 1.0,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

impl RuleComponent for RandomRangeComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::RandomRange
    }

    /// Width must stay finite so a uniform draw can be taken
    fn is_valid(&self) -> bool {
        self.min <= self.max && (self.max - self.min).is_finite()
    }

    fn argument_text(&self) -> String {
        format!("[{}, {})", self.min, self.max)
    }

    fn parse(&mut self, input: &Value, _ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.min = f32_field(input, "min")?;
        self.max = f32_field(input, "max")?;
        if !self.is_valid() {
            return Err(ReanimError::invalid(
                self.name,
                format!("[{}, {}) is not a drawable range", self.min, self.max),
            ));
        }
        Ok(())
    }

    fn serialize(&self) -> Value {
        json!({ "min": self.min, "max": self.max })
    }
}

/// How long a condition's drawn state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateScope {
    /// Fresh every evaluation
    #[default]
    Local,
    /// Kept by the playback instance until it deactivates
    Instance,
}

#[derive(Debug, Clone)]
pub struct StateScopeComponent {
    name: &'static str,
    pub scope: StateScope,
}

impl StateScopeComponent {
    pub fn new(name: &'static str) -> Self {
        StateScopeComponent {
            name,
            scope: StateScope::Local,
        }
    }

    pub fn with_scope(mut self, scope: StateScope) -> Self {
        self.scope = scope;
        self
    }
}

impl RuleComponent for StateScopeComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::StateScope
    }

    fn argument_text(&self) -> String {
        match self.scope {
            StateScope::Local => "local".to_string(),
            StateScope::Instance => "instance".to_string(),
        }
    }

    fn parse(&mut self, input: &Value, _ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        self.scope = match input.as_str() {
            Some("local") => StateScope::Local,
            Some("instance") => StateScope::Instance,
            _ => return Err(ReanimError::mismatch(self.name, "\"local\" or \"instance\"")),
        };
        Ok(())
    }

    fn serialize(&self) -> Value {
        json!(self.argument_text())
    }
}

// ============================================================================
// NESTED CONDITIONS
// ============================================================================

/// Owned nested condition set (AND / OR containers, action guards)
#[derive(Debug)]
pub struct ConditionsComponent {
    name: &'static str,
    pub set: Arc<ConditionSet>,
}

impl ConditionsComponent {
    pub fn new(name: &'static str) -> Self {
        ConditionsComponent {
            name,
            set: ConditionSet::new(),
        }
    }

    pub fn with_set(mut self, set: Arc<ConditionSet>) -> Self {
        self.set = set;
        self
    }

    pub fn evaluate_all(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.set.evaluate_all(ctx)
    }

    pub fn evaluate_any(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.set.evaluate_any(ctx)
    }
}

impl RuleComponent for ConditionsComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Conditions
    }

    fn is_valid(&self) -> bool {
        !self.set.has_invalid_conditions()
    }

    fn argument_text(&self) -> String {
        format!("{} conditions", self.set.len())
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        let conditions = ConditionSet::parse_nodes(input, ctx)?;
        self.set.replace_all(conditions);
        Ok(())
    }

    fn serialize(&self) -> Value {
        self.set.serialize()
    }

    fn conditions(&self) -> Option<&Arc<ConditionSet>> {
        Some(&self.set)
    }
}

// ============================================================================
// PRESET REFERENCE
// ============================================================================

/// Reference to an externally owned, named condition preset
///
/// Holds a `Weak`, so deleting the preset leaves the reference dangling
/// (invalid) instead of keeping the preset alive.
#[derive(Debug, Clone)]
pub struct PresetComponent {
    name: &'static str,
    preset_name: String,
    preset: Weak<ConditionPreset>,
}

impl PresetComponent {
    pub fn new(name: &'static str) -> Self {
        PresetComponent {
            name,
            preset_name: String::new(),
            preset: Weak::new(),
        }
    }

    pub fn with_preset(mut self, preset: &Arc<ConditionPreset>) -> Self {
        self.preset_name = preset.name();
        self.preset = Arc::downgrade(preset);
        self
    }

    pub fn preset(&self) -> Option<Arc<ConditionPreset>> {
        self.preset.upgrade()
    }

    /// Current preset name (follows renames while the preset is alive)
    pub fn preset_name(&self) -> String {
        match self.preset.upgrade() {
            Some(preset) => preset.name(),
            None => self.preset_name.clone(),
        }
    }

    pub fn evaluate(&self, ctx: &mut EvalContext<'_>) -> bool {
        match self.preset.upgrade() {
            Some(preset) => preset.conditions().evaluate_all(ctx),
            None => false,
        }
    }
}

impl RuleComponent for PresetComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Preset
    }

    fn is_valid(&self) -> bool {
        self.preset.strong_count() > 0
    }

    fn argument_text(&self) -> String {
        self.preset_name()
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        let name = match input.as_str() {
            Some(name) => name.to_string(),
            None => str_field(input, "preset")?.to_string(),
        };
        self.preset = Weak::new();
        if ctx.current_preset() == Some(name.as_str()) {
            let location = ctx.location.clone();
            ctx.report(ConfigProblem::error(
                ProblemKind::DanglingPreset,
                location,
                format!("preset '{}' references itself", name),
            ));
        } else {
            match ctx.presets.and_then(|p| p.get(&name)) {
                Some(preset) => self.preset = Arc::downgrade(&preset),
                None => {
                    let location = ctx.location.clone();
                    ctx.report(ConfigProblem::error(
                        ProblemKind::DanglingPreset,
                        location,
                        format!("preset '{}' not found", name),
                    ));
                }
            }
        }
        self.preset_name = name;
        Ok(())
    }

    fn serialize(&self) -> Value {
        json!(self.preset_name())
    }
}

// ============================================================================
// NESTED ACTIONS
// ============================================================================

/// Owned nested action set (run-if bodies, run-one-of / weighted children)
#[derive(Debug)]
pub struct ActionsComponent {
    name: &'static str,
    pub set: Arc<ActionSet>,
}

impl ActionsComponent {
    pub fn new(name: &'static str) -> Self {
        ActionsComponent {
            name,
            set: ActionSet::with_mode(ActionSetMode::Nested),
        }
    }

    pub fn with_set(mut self, set: Arc<ActionSet>) -> Self {
        self.set = set;
        self
    }
}

impl RuleComponent for ActionsComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Actions
    }

    fn is_valid(&self) -> bool {
        !self.set.has_invalid_actions()
    }

    fn argument_text(&self) -> String {
        format!("{} actions", self.set.len())
    }

    fn parse(&mut self, input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        let actions = ActionSet::parse_nodes(input, ctx)?;
        self.set.replace_all(actions);
        Ok(())
    }

    fn serialize(&self) -> Value {
        self.set.serialize()
    }

    fn actions(&self) -> Option<&Arc<ActionSet>> {
        Some(&self.set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reanim_core::{HostCatalog, NumericKind};

    use crate::RuleFactory;

    #[test]
    fn test_comparison_symbols() {
        for op in [
            Comparison::Equal,
            Comparison::NotEqual,
            Comparison::Greater,
            Comparison::GreaterOrEqual,
            Comparison::Less,
            Comparison::LessOrEqual,
        ] {
            assert_eq!(Comparison::from_symbol(op.symbol()), Some(op));
        }
        assert!(Comparison::GreaterOrEqual.compare(2.0, 2.0));
        assert!(!Comparison::Less.compare(2.0, 2.0));
    }

    #[test]
    fn test_numeric_component_forced_kind() {
        let factory = RuleFactory::with_builtins();
        let catalog = HostCatalog::permissive();
        let mut ctx = ParseContext::new(&factory, &catalog);

        let mut c = NumericComponent::new("Target")
            .with_constraints(NumericConstraints::forced(NumericKind::Variable));
        assert!(c.parse(&json!({"value": 3.0}), &mut ctx).is_err());
        assert!(c.parse(&json!({"variable": "Hunger"}), &mut ctx).is_ok());
    }

    #[test]
    fn test_numeric_component_clamped() {
        let factory = RuleFactory::with_builtins();
        let catalog = HostCatalog::permissive();
        let mut ctx = ParseContext::new(&factory, &catalog);

        let mut c = NumericComponent::new("Radius")
            .with_constraints(NumericConstraints::none().with_range(0.0, 100.0));
        c.parse(&json!({"value": -5.0}), &mut ctx).unwrap();
        assert_eq!(c.value, NumericValue::constant(0.0));
    }

    #[test]
    fn test_random_range_validity() {
        assert!(RandomRangeComponent::new("Range").with_range(0.0, 1.0).is_valid());
        assert!(!RandomRangeComponent::new("Range").with_range(2.0, 1.0).is_valid());
        assert!(!RandomRangeComponent::new("Range").with_range(-3.0e38, 3.0e38).is_valid());
        assert!(!RandomRangeComponent::new("Range").with_range(f32::NAN, 1.0).is_valid());
        assert!(RandomRangeComponent::new("Range").with_range(-1.0e38, 1.0e38).is_valid());
    }

    #[test]
    fn test_dangling_preset_reported() {
        let factory = RuleFactory::with_builtins();
        let catalog = HostCatalog::permissive();
        let mut ctx = ParseContext::new(&factory, &catalog).at("pack/candidate");

        let mut c = PresetComponent::new("Preset");
        c.parse(&json!("Missing"), &mut ctx).unwrap();
        assert!(!c.is_valid());
        assert_eq!(c.serialize(), json!("Missing"));
        assert_eq!(ctx.problems().len(), 1);
        assert_eq!(ctx.problems()[0].kind, ProblemKind::DanglingPreset);
    }
}
