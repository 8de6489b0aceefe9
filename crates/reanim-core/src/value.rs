//! Rule values - typed leaves of rule trees
//!
//! Every value kind has the same four capabilities: evaluation against live
//! state, a load-time validity check, a structured round trip and a
//! human-readable description for tooling.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{HostCatalog, ReanimError, ReanimResult, Subject, WorldState};

/// Shared contract of all rule value kinds
pub trait RuleValue: Sized {
    type Output;

    /// Evaluate against live state. Must not mutate anything observable.
    fn get_value(&self, subject: &dyn Subject, world: &dyn WorldState) -> Self::Output;

    /// Configuration-time well-formedness, independent of any live actor
    fn is_valid(&self) -> bool;

    /// Build from the persisted structured form
    fn parse(input: &Value, catalog: &HostCatalog) -> ReanimResult<Self>;

    /// Persisted structured form
    fn serialize(&self) -> Value;

    /// User-facing description
    fn describe(&self) -> String;
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Fetch a required object field
pub fn field<'a>(input: &'a Value, name: &str) -> ReanimResult<&'a Value> {
    input.get(name).ok_or_else(|| ReanimError::missing(name))
}

/// Fetch a required string field
pub fn str_field<'a>(input: &'a Value, name: &str) -> ReanimResult<&'a str> {
    field(input, name)?
        .as_str()
        .ok_or_else(|| ReanimError::mismatch(name, "string"))
}

/// Fetch a required numeric field
pub fn f32_field(input: &Value, name: &str) -> ReanimResult<f32> {
    field(input, name)?
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| ReanimError::mismatch(name, "number"))
}

/// Fetch an optional boolean field
pub fn bool_field_or(input: &Value, name: &str, default: bool) -> ReanimResult<bool> {
    match input.get(name) {
        None => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| ReanimError::mismatch(name, "bool")),
    }
}

// ============================================================================
// STATIC NUMBER
// ============================================================================

/// Constant number typed in by the author
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StaticNumber {
    pub value: f32,
}

impl StaticNumber {
    pub fn new(value: f32) -> Self {
        StaticNumber { value }
    }
}

impl RuleValue for StaticNumber {
    type Output = f32;

    #[inline]
    fn get_value(&self, _subject: &dyn Subject, _world: &dyn WorldState) -> f32 {
        self.value
    }

    fn is_valid(&self) -> bool {
        self.value.is_finite()
    }

    fn parse(input: &Value, _catalog: &HostCatalog) -> ReanimResult<Self> {
        Ok(StaticNumber::new(f32_field(input, "value")?))
    }

    fn serialize(&self) -> Value {
        json!({ "value": self.value })
    }

    fn describe(&self) -> String {
        format!("{}", self.value)
    }
}

// ============================================================================
// EXTERNAL VARIABLE
// ============================================================================

/// Where an external variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    /// Process-wide variable owned by the world
    #[default]
    Global,
    /// Variable on the evaluated subject
    Subject,
}

/// Reference to a named numeric variable read at evaluation time
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalVariableRef {
    pub name: String,
    pub scope: VariableScope,
    resolved: bool,
}

impl ExternalVariableRef {
    pub fn global(name: impl Into<String>) -> Self {
        let name = name.into();
        let resolved = !name.is_empty();
        ExternalVariableRef {
            name,
            scope: VariableScope::Global,
            resolved,
        }
    }

    pub fn subject(name: impl Into<String>) -> Self {
        let name = name.into();
        let resolved = !name.is_empty();
        ExternalVariableRef {
            name,
            scope: VariableScope::Subject,
            resolved,
        }
    }

    /// Re-resolve the name against a host catalog
    pub fn resolve(&mut self, catalog: &HostCatalog) {
        self.resolved = !self.name.is_empty()
            && match self.scope {
                VariableScope::Global => catalog.knows_global(&self.name),
                // subject variables only exist on live actors
                VariableScope::Subject => true,
            };
    }
}

impl RuleValue for ExternalVariableRef {
    type Output = f32;

    #[inline]
    fn get_value(&self, subject: &dyn Subject, world: &dyn WorldState) -> f32 {
        match self.scope {
            VariableScope::Global => world.global(&self.name),
            VariableScope::Subject => subject.variable(&self.name),
        }
        .unwrap_or(0.0)
    }

    fn is_valid(&self) -> bool {
        self.resolved
    }

    fn parse(input: &Value, catalog: &HostCatalog) -> ReanimResult<Self> {
        let name = str_field(input, "variable")?.to_string();
        let scope = match input.get("scope") {
            None => VariableScope::Global,
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| ReanimError::invalid("scope", e.to_string()))?,
        };
        let mut value = ExternalVariableRef {
            name,
            scope,
            resolved: false,
        };
        value.resolve(catalog);
        Ok(value)
    }

    fn serialize(&self) -> Value {
        json!({ "variable": self.name, "scope": self.scope })
    }

    fn describe(&self) -> String {
        match self.scope {
            VariableScope::Global => format!("global '{}'", self.name),
            VariableScope::Subject => format!("variable '{}'", self.name),
        }
    }
}

// ============================================================================
// NAMED FLAG
// ============================================================================

/// Reference to a named boolean flag on the subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFlagRef {
    #[serde(rename = "flag")]
    pub name: String,
}

impl NamedFlagRef {
    pub fn new(name: impl Into<String>) -> Self {
        NamedFlagRef { name: name.into() }
    }
}

impl RuleValue for NamedFlagRef {
    type Output = bool;

    #[inline]
    fn get_value(&self, subject: &dyn Subject, _world: &dyn WorldState) -> bool {
        subject.flag(&self.name)
    }

    fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    fn parse(input: &Value, _catalog: &HostCatalog) -> ReanimResult<Self> {
        Ok(NamedFlagRef::new(str_field(input, "flag")?))
    }

    fn serialize(&self) -> Value {
        json!({ "flag": self.name })
    }

    fn describe(&self) -> String {
        format!("flag '{}'", self.name)
    }
}

// ============================================================================
// POINT3
// ============================================================================

/// 3D point or offset in world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Linear interpolation
    pub fn lerp(&self, other: &Point3, t: f32) -> Point3 {
        Point3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    /// Distance to another point
    pub fn distance(&self, other: &Point3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl RuleValue for Point3 {
    type Output = Point3;

    #[inline]
    fn get_value(&self, _subject: &dyn Subject, _world: &dyn WorldState) -> Point3 {
        *self
    }

    fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    fn parse(input: &Value, _catalog: &HostCatalog) -> ReanimResult<Self> {
        Ok(Point3::new(
            f32_field(input, "x")?,
            f32_field(input, "y")?,
            f32_field(input, "z")?,
        ))
    }

    fn serialize(&self) -> Value {
        json!({ "x": self.x, "y": self.y, "z": self.z })
    }

    fn describe(&self) -> String {
        format!("({}, {}, {})", self.x, self.y, self.z)
    }
}

// ============================================================================
// TEXT
// ============================================================================

/// Free text (event names, property values)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
}

impl TextValue {
    pub fn new(text: impl Into<String>) -> Self {
        TextValue { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl RuleValue for TextValue {
    type Output = String;

    fn get_value(&self, _subject: &dyn Subject, _world: &dyn WorldState) -> String {
        self.text.clone()
    }

    fn is_valid(&self) -> bool {
        !self.text.is_empty()
    }

    fn parse(input: &Value, _catalog: &HostCatalog) -> ReanimResult<Self> {
        Ok(TextValue::new(str_field(input, "text")?))
    }

    fn serialize(&self) -> Value {
        json!({ "text": self.text })
    }

    fn describe(&self) -> String {
        format!("\"{}\"", self.text)
    }
}

// ============================================================================
// KEYWORD SET
// ============================================================================

/// Enumerated keyword set, resolved from literal names at load time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeywordSet {
    /// Names as authored
    pub names: Vec<String>,
    /// Names the host catalog recognised
    resolved: Vec<String>,
}

impl KeywordSet {
    pub fn new<I, S>(names: I, catalog: &HostCatalog) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = KeywordSet {
            names: names.into_iter().map(Into::into).collect(),
            resolved: Vec::new(),
        };
        set.resolve(catalog);
        set
    }

    pub fn resolve(&mut self, catalog: &HostCatalog) {
        self.resolved = self
            .names
            .iter()
            .filter(|n| catalog.knows_keyword(n))
            .cloned()
            .collect();
    }

    pub fn resolved(&self) -> &[String] {
        &self.resolved
    }
}

impl RuleValue for KeywordSet {
    /// True when the subject carries any resolved keyword
    type Output = bool;

    fn get_value(&self, subject: &dyn Subject, _world: &dyn WorldState) -> bool {
        self.resolved.iter().any(|k| subject.has_keyword(k))
    }

    fn is_valid(&self) -> bool {
        !self.resolved.is_empty()
    }

    fn parse(input: &Value, catalog: &HostCatalog) -> ReanimResult<Self> {
        let names = field(input, "keywords")?
            .as_array()
            .ok_or_else(|| ReanimError::mismatch("keywords", "array"))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ReanimError::mismatch("keywords", "string"))
            })
            .collect::<ReanimResult<Vec<_>>>()?;
        Ok(KeywordSet::new(names, catalog))
    }

    fn serialize(&self) -> Value {
        json!({ "keywords": self.names })
    }

    fn describe(&self) -> String {
        format!("[{}]", self.names.join(", "))
    }
}

// ============================================================================
// FORM REFERENCE
// ============================================================================

/// Reference to a host object by editor name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormRef {
    pub name: String,
    resolved: bool,
}

impl FormRef {
    pub fn new(name: impl Into<String>, catalog: &HostCatalog) -> Self {
        let name = name.into();
        let resolved = !name.is_empty() && catalog.knows_form(&name);
        FormRef { name, resolved }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn parse(input: &Value, catalog: &HostCatalog) -> ReanimResult<Self> {
        Ok(FormRef::new(str_field(input, "form")?, catalog))
    }

    pub fn serialize(&self) -> Value {
        json!({ "form": self.name })
    }
}

impl fmt::Display for FormRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ============================================================================
// NUMERIC VALUE
// ============================================================================

/// Source kind of a numeric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Static,
    Variable,
}

/// Author-facing restrictions on a numeric parameter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NumericConstraints {
    /// Only this kind may be configured
    pub forced: Option<NumericKind>,
    /// Inclusive range static values are clamped into
    pub range: Option<(f32, f32)>,
    pub integer_only: bool,
}

impl NumericConstraints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn forced(kind: NumericKind) -> Self {
        NumericConstraints {
            forced: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn integer(mut self) -> Self {
        self.integer_only = true;
        self
    }

    /// Clamp and round a raw number
    pub fn apply(&self, mut v: f32) -> f32 {
        if self.integer_only {
            v = v.round();
        }
        if let Some((min, max)) = self.range {
            v = v.clamp(min, max);
        }
        v
    }
}

/// Numeric source: a constant or an external variable
#[derive(Debug, Clone, PartialEq)]
pub enum NumericValue {
    Static(StaticNumber),
    Variable(ExternalVariableRef),
}

impl NumericValue {
    pub fn constant(value: f32) -> Self {
        NumericValue::Static(StaticNumber::new(value))
    }

    pub fn kind(&self) -> NumericKind {
        match self {
            NumericValue::Static(_) => NumericKind::Static,
            NumericValue::Variable(_) => NumericKind::Variable,
        }
    }

    /// Enforce constraints; statics are clamped, kind mismatches rejected
    pub fn constrained(self, constraints: &NumericConstraints) -> ReanimResult<Self> {
        if let Some(forced) = constraints.forced {
            if forced != self.kind() {
                return Err(ReanimError::invalid(
                    "numeric",
                    format!("must be {:?}, got {:?}", forced, self.kind()),
                ));
            }
        }
        Ok(match self {
            NumericValue::Static(n) => {
                NumericValue::Static(StaticNumber::new(constraints.apply(n.value)))
            }
            other => other,
        })
    }
}

impl Default for NumericValue {
    fn default() -> Self {
        NumericValue::constant(0.0)
    }
}

impl RuleValue for NumericValue {
    type Output = f32;

    #[inline]
    fn get_value(&self, subject: &dyn Subject, world: &dyn WorldState) -> f32 {
        match self {
            NumericValue::Static(n) => n.get_value(subject, world),
            NumericValue::Variable(v) => v.get_value(subject, world),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            NumericValue::Static(n) => n.is_valid(),
            NumericValue::Variable(v) => v.is_valid(),
        }
    }

    fn parse(input: &Value, catalog: &HostCatalog) -> ReanimResult<Self> {
        if input.get("variable").is_some() {
            Ok(NumericValue::Variable(ExternalVariableRef::parse(input, catalog)?))
        } else if input.get("value").is_some() {
            Ok(NumericValue::Static(StaticNumber::parse(input, catalog)?))
        } else if let Some(n) = input.as_f64() {
            // bare numbers are accepted as a shorthand
            Ok(NumericValue::constant(n as f32))
        } else {
            Err(ReanimError::mismatch("numeric", "number or variable"))
        }
    }

    fn serialize(&self) -> Value {
        match self {
            NumericValue::Static(n) => RuleValue::serialize(n),
            NumericValue::Variable(v) => v.serialize(),
        }
    }

    fn describe(&self) -> String {
        match self {
            NumericValue::Static(n) => n.describe(),
            NumericValue::Variable(v) => v.describe(),
        }
    }
}

/// Merge `extra` object fields into `base`
pub fn merge_objects(base: &mut Map<String, Value>, extra: Value) {
    if let Value::Object(map) = extra {
        base.extend(map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct NullSubject;

    impl Subject for NullSubject {
        fn subject_id(&self) -> crate::SubjectId {
            crate::SubjectId::new(1)
        }
        fn variable(&self, name: &str) -> Option<f32> {
            (name == "Speed").then_some(3.0)
        }
        fn flag(&self, name: &str) -> bool {
            name == "IsSneaking"
        }
        fn has_keyword(&self, keyword: &str) -> bool {
            keyword == "ActorTypeNPC"
        }
        fn has_form(&self, _form: &FormRef) -> bool {
            false
        }
        fn position(&self) -> Point3 {
            Point3::zero()
        }
        fn text_equals(&self, _name: &str, _value: &str) -> bool {
            false
        }
        fn attribute(&self, _name: &str) -> Option<f32> {
            None
        }
    }

    struct OneGlobal;

    impl WorldState for OneGlobal {
        fn global(&self, name: &str) -> Option<f32> {
            (name == "GameHour").then_some(13.0)
        }
    }

    #[test]
    fn test_external_variable_scopes() {
        let global = ExternalVariableRef::global("GameHour");
        let local = ExternalVariableRef::subject("Speed");
        let missing = ExternalVariableRef::global("Nope");

        assert_eq!(global.get_value(&NullSubject, &OneGlobal), 13.0);
        assert_eq!(local.get_value(&NullSubject, &OneGlobal), 3.0);
        assert_eq!(missing.get_value(&NullSubject, &OneGlobal), 0.0);
    }

    #[test]
    fn test_keyword_set_validity() {
        let catalog = HostCatalog::new().with_keywords(["ActorTypeNPC"]);
        let good = KeywordSet::new(["ActorTypeNPC", "Unknown"], &catalog);
        let bad = KeywordSet::new(["Unknown"], &catalog);

        assert!(good.is_valid());
        assert!(!bad.is_valid());
        assert!(good.get_value(&NullSubject, &OneGlobal));
    }

    #[test]
    fn test_global_resolution_against_catalog() {
        let catalog = HostCatalog::new().with_globals(["GameHour"]);
        let ok = ExternalVariableRef::parse(&json!({"variable": "GameHour"}), &catalog).unwrap();
        let bad = ExternalVariableRef::parse(&json!({"variable": "Missing"}), &catalog).unwrap();
        assert!(ok.is_valid());
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_numeric_constraints() {
        let c = NumericConstraints::none().with_range(0.0, 10.0).integer();
        let v = NumericValue::constant(12.7).constrained(&c).unwrap();
        assert_eq!(v, NumericValue::constant(10.0));

        let forced = NumericConstraints::forced(NumericKind::Variable);
        assert!(NumericValue::constant(1.0).constrained(&forced).is_err());
        assert!(NumericValue::Variable(ExternalVariableRef::global("X"))
            .constrained(&forced)
            .is_ok());
    }

    #[test]
    fn test_numeric_bare_number_shorthand() {
        let v = NumericValue::parse(&json!(2.5), &HostCatalog::permissive()).unwrap();
        assert_eq!(v, NumericValue::constant(2.5));
    }

    #[test]
    fn test_round_trip_every_kind() {
        let catalog = HostCatalog::permissive();

        let n = StaticNumber::new(4.25);
        assert_eq!(StaticNumber::parse(&RuleValue::serialize(&n), &catalog).unwrap(), n);

        let v = ExternalVariableRef::subject("Speed");
        assert_eq!(ExternalVariableRef::parse(&v.serialize(), &catalog).unwrap(), v);

        let f = NamedFlagRef::new("IsSneaking");
        assert_eq!(NamedFlagRef::parse(&RuleValue::serialize(&f), &catalog).unwrap(), f);

        let p = Point3::new(1.0, -2.0, 3.5);
        assert_eq!(Point3::parse(&RuleValue::serialize(&p), &catalog).unwrap(), p);

        let t = TextValue::new("weaponSwing");
        assert_eq!(TextValue::parse(&RuleValue::serialize(&t), &catalog).unwrap(), t);

        let k = KeywordSet::new(["A", "B"], &catalog);
        assert_eq!(KeywordSet::parse(&k.serialize(), &catalog).unwrap(), k);
    }

    proptest! {
        #[test]
        fn prop_static_number_round_trip(x in -1.0e6f32..1.0e6f32) {
            let catalog = HostCatalog::permissive();
            let v = NumericValue::constant(x);
            prop_assert_eq!(NumericValue::parse(&v.serialize(), &catalog).unwrap(), v);
        }

        #[test]
        fn prop_point_round_trip(x in -1.0e4f32..1.0e4f32, y in -1.0e4f32..1.0e4f32, z in -1.0e4f32..1.0e4f32) {
            let catalog = HostCatalog::permissive();
            let p = Point3::new(x, y, z);
            prop_assert_eq!(Point3::parse(&RuleValue::serialize(&p), &catalog).unwrap(), p);
        }
    }
}
