//! Rule factory - registry of condition and action kinds keyed by name
//!
//! Parsing through the factory never fails: anything that cannot be built
//! becomes an `Invalid` node and, if it matters, a recorded problem.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use reanim_core::{ConfigProblem, ProblemKind, ReanimError, ReanimResult};

use crate::action::TriggerFilter;
use crate::{
    Action, ActionImpl, AndCondition, CompareValuesCondition, Condition, ConditionImpl,
    ConstantCondition, EssentialState, HasFlagCondition, HasFormCondition, HasKeywordCondition,
    InvalidAction, InvalidCondition, IsWithinDistanceCondition, ModifyAttributeAction,
    OrCondition, ParseContext, PlaySoundAction, PresetCondition, RandomCondition, RunIfAction,
    RunOneOfAction, RunWeightedRandomAction, SendEventAction, SetVariableAction,
    SpawnEffectAction, TextEqualsCondition,
};

/// Semantic version of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ReanimError;

    /// Accepts `1`, `1.2` and `1.2.3`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for part in s.trim().split('.') {
            if count == 3 {
                return Err(ReanimError::invalid("version", s));
            }
            parts[count] = part
                .parse()
                .map_err(|_| ReanimError::invalid("version", s))?;
            count += 1;
        }
        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

/// An external registrant of rule kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    pub version: Version,
}

impl Provider {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Provider {
            name: name.into(),
            version,
        }
    }
}

type ConditionCtor = Box<dyn Fn() -> Box<dyn ConditionImpl> + Send + Sync>;
type ActionCtor = Box<dyn Fn() -> Box<dyn ActionImpl> + Send + Sync>;

struct Entry<C> {
    ctor: C,
    provider: Option<String>,
}

/// Registry of rule kinds
pub struct RuleFactory {
    conditions: HashMap<String, Entry<ConditionCtor>>,
    actions: HashMap<String, Entry<ActionCtor>>,
    providers: HashMap<String, Provider>,
}

impl RuleFactory {
    /// Empty registry
    pub fn new() -> Self {
        RuleFactory {
            conditions: HashMap::new(),
            actions: HashMap::new(),
            providers: HashMap::new(),
        }
    }

    /// Registry with every built-in kind
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();

        factory.register_condition("AND", || Box::new(AndCondition::new()));
        factory.register_condition("OR", || Box::new(OrCondition::new()));
        factory.register_condition("PRESET", || Box::new(PresetCondition::new()));
        factory.register_condition("CompareValues", || Box::new(CompareValuesCondition::new()));
        factory.register_condition("HasFlag", || Box::new(HasFlagCondition::new()));
        factory.register_condition("HasKeyword", || Box::new(HasKeywordCondition::new()));
        factory.register_condition("HasForm", || Box::new(HasFormCondition::new()));
        factory.register_condition("IsWithinDistance", || {
            Box::new(IsWithinDistanceCondition::new())
        });
        factory.register_condition("TextEquals", || Box::new(TextEqualsCondition::new()));
        factory.register_condition("Random", || Box::new(RandomCondition::new()));
        factory.register_condition("Constant", || Box::new(ConstantCondition::default()));

        factory.register_action("SetVariable", || Box::new(SetVariableAction::new()));
        factory.register_action("ModifyAttribute", || Box::new(ModifyAttributeAction::new()));
        factory.register_action("PlaySound", || Box::new(PlaySoundAction::new()));
        factory.register_action("SendEvent", || Box::new(SendEventAction::new()));
        factory.register_action("SpawnEffect", || Box::new(SpawnEffectAction::new()));
        factory.register_action("RunIf", || Box::new(RunIfAction::new()));
        factory.register_action("RunOneOf", || Box::new(RunOneOfAction::new()));
        factory.register_action("RunWeightedRandom", || {
            Box::new(RunWeightedRandomAction::new())
        });

        factory
    }

    pub fn register_condition<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn ConditionImpl> + Send + Sync + 'static,
    {
        self.conditions.insert(
            name.to_string(),
            Entry {
                ctor: Box::new(ctor),
                provider: None,
            },
        );
    }

    pub fn register_action<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn ActionImpl> + Send + Sync + 'static,
    {
        self.actions.insert(
            name.to_string(),
            Entry {
                ctor: Box::new(ctor),
                provider: None,
            },
        );
    }

    /// Register (or upgrade) an external provider
    pub fn register_provider(&mut self, provider: Provider) {
        tracing::info!(
            provider = %provider.name,
            version = %provider.version,
            "Registered rule provider"
        );
        self.providers.insert(provider.name.clone(), provider);
    }

    pub fn register_external_condition<F>(&mut self, provider: &Provider, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn ConditionImpl> + Send + Sync + 'static,
    {
        if !self.providers.contains_key(&provider.name) {
            self.register_provider(provider.clone());
        }
        self.conditions.insert(
            name.to_string(),
            Entry {
                ctor: Box::new(ctor),
                provider: Some(provider.name.clone()),
            },
        );
    }

    pub fn register_external_action<F>(&mut self, provider: &Provider, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn ActionImpl> + Send + Sync + 'static,
    {
        if !self.providers.contains_key(&provider.name) {
            self.register_provider(provider.clone());
        }
        self.actions.insert(
            name.to_string(),
            Entry {
                ctor: Box::new(ctor),
                provider: Some(provider.name.clone()),
            },
        );
    }

    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    pub fn condition_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.conditions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn action_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Fresh, default-configured condition of a kind
    pub fn create_condition(&self, kind: &str) -> ReanimResult<Condition> {
        let entry = self
            .conditions
            .get(kind)
            .ok_or_else(|| ReanimError::UnknownConditionKind(kind.to_string()))?;
        Ok(Condition::new((entry.ctor)()))
    }

    /// Fresh, default-configured action of a kind
    pub fn create_action(&self, kind: &str) -> ReanimResult<Action> {
        let entry = self
            .actions
            .get(kind)
            .ok_or_else(|| ReanimError::UnknownActionKind(kind.to_string()))?;
        Ok(Action::new((entry.ctor)()))
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Check a declared provider requirement against what is registered
    fn check_requirement(
        &self,
        input: &Value,
        entry_provider: Option<&str>,
    ) -> ReanimResult<Option<(String, Version)>> {
        let declared = input.get("requiredPlugin").and_then(Value::as_str);
        let Some(name) = declared.or(entry_provider) else {
            return Ok(None);
        };
        let required = match input.get("requiredVersion").and_then(Value::as_str) {
            Some(v) => v.parse()?,
            None => Version::default(),
        };
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| ReanimError::MissingDependency(name.to_string()))?;
        if provider.version < required {
            return Err(ReanimError::IncompatibleVersion {
                provider: name.to_string(),
                required: required.to_string(),
                found: provider.version.to_string(),
            });
        }
        Ok(declared.map(|n| (n.to_string(), required)))
    }

    /// Build a condition; failures degrade to an invalid node
    pub fn parse_condition(&self, input: &Value, ctx: &mut ParseContext<'_>) -> Condition {
        let kind = input
            .get("condition")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let essential = match input.get("essential") {
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
            None => EssentialState::Essential,
        };

        match self.try_parse_condition(&kind, input, essential, ctx) {
            Ok(condition) => condition,
            Err(error) => {
                let unresolved = matches!(
                    error,
                    ReanimError::UnknownConditionKind(_)
                        | ReanimError::MissingDependency(_)
                        | ReanimError::IncompatibleVersion { .. }
                );
                // optional only covers kinds that are absent, not broken input
                let essential = if unresolved {
                    essential
                } else {
                    EssentialState::Essential
                };
                if essential == EssentialState::Essential {
                    let location = ctx.location.clone();
                    ctx.report(ConfigProblem::error(
                        problem_kind(&error),
                        location,
                        format!("condition '{}': {}", kind, error),
                    ));
                } else {
                    tracing::debug!(kind = %kind, %error, "Optional condition unavailable");
                }
                let mut condition = Condition::new(Box::new(InvalidCondition::new(
                    kind,
                    error.to_string(),
                    essential,
                    input.clone(),
                )));
                condition.negated = flag(input, "negated");
                condition.disabled = flag(input, "disabled");
                condition.essential = essential;
                condition
            }
        }
    }

    fn try_parse_condition(
        &self,
        kind: &str,
        input: &Value,
        essential: EssentialState,
        ctx: &mut ParseContext<'_>,
    ) -> ReanimResult<Condition> {
        if !input.is_object() {
            return Err(ReanimError::mismatch("condition", "object"));
        }
        let entry = self
            .conditions
            .get(kind)
            .ok_or_else(|| ReanimError::UnknownConditionKind(kind.to_string()))?;
        let requirement = self.check_requirement(input, entry.provider.as_deref())?;

        let mut condition = Condition::new((entry.ctor)());
        condition.kind_mut().parse_components(input, ctx)?;
        condition.negated = flag(input, "negated");
        condition.disabled = flag(input, "disabled");
        condition.essential = essential;
        if let Some((provider, version)) = requirement {
            condition = condition.with_requirement(provider, version);
        }
        Ok(condition)
    }

    /// Build an action; failures degrade to an invalid node
    pub fn parse_action(&self, input: &Value, ctx: &mut ParseContext<'_>) -> Action {
        let kind = input
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match self.try_parse_action(&kind, input, ctx) {
            Ok(action) => action,
            Err(error) => {
                let location = ctx.location.clone();
                ctx.report(ConfigProblem::error(
                    problem_kind(&error),
                    location,
                    format!("action '{}': {}", kind, error),
                ));
                let mut action = Action::new(Box::new(InvalidAction::new(
                    kind,
                    error.to_string(),
                    input.clone(),
                )));
                action.disabled = flag(input, "disabled");
                action
            }
        }
    }

    fn try_parse_action(
        &self,
        kind: &str,
        input: &Value,
        ctx: &mut ParseContext<'_>,
    ) -> ReanimResult<Action> {
        if !input.is_object() {
            return Err(ReanimError::mismatch("action", "object"));
        }
        let entry = self
            .actions
            .get(kind)
            .ok_or_else(|| ReanimError::UnknownActionKind(kind.to_string()))?;
        let requirement = self.check_requirement(input, entry.provider.as_deref())?;

        let mut action = Action::new((entry.ctor)());
        action.kind_mut().parse_components(input, ctx)?;
        action.kind_mut().parse_extra(input)?;
        action.disabled = flag(input, "disabled");
        if let Some(trigger) = input.get("trigger") {
            action.trigger = Some(TriggerFilter::parse(trigger)?);
        }
        if let Some((provider, version)) = requirement {
            action = action.with_requirement(provider, version);
        }
        Ok(action)
    }
}

impl Default for RuleFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for RuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleFactory")
            .field("conditions", &self.condition_kinds())
            .field("actions", &self.action_kinds())
            .field("providers", &self.providers.len())
            .finish()
    }
}

fn flag(input: &Value, name: &str) -> bool {
    input.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn problem_kind(error: &ReanimError) -> ProblemKind {
    match error {
        ReanimError::UnknownConditionKind(_) | ReanimError::UnknownActionKind(_) => {
            ProblemKind::UnknownRuleKind
        }
        ReanimError::MissingDependency(_) => ProblemKind::MissingDependency,
        ReanimError::IncompatibleVersion { .. } => ProblemKind::IncompatibleVersion,
        _ => ProblemKind::MalformedInput,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use reanim_core::{EmptyWorld, FormRef, HostCatalog, Point3, Subject, SubjectId};

    use crate::{ConditionSet, EvalContext, PresetRegistry};

    struct Sneaker;

    impl Subject for Sneaker {
        fn subject_id(&self) -> SubjectId {
            SubjectId::new(5)
        }
        fn variable(&self, name: &str) -> Option<f32> {
            (name == "Speed").then_some(80.0)
        }
        fn flag(&self, name: &str) -> bool {
            name == "IsSneaking"
        }
        fn has_keyword(&self, keyword: &str) -> bool {
            keyword == "ActorTypeNPC"
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
    fn test_version_parse_and_order() {
        assert_eq!("1.2".parse::<Version>().unwrap(), Version::new(1, 2, 0));
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("x".parse::<Version>().is_err());
    }

    #[test]
    fn test_unknown_kind_essential_records_problem() {
        let factory = RuleFactory::with_builtins();
        let catalog = HostCatalog::permissive();
        let mut ctx = ParseContext::new(&factory, &catalog).at("pack");

        let input = json!({"condition": "IsDancing", "negated": true});
        let condition = factory.parse_condition(&input, &mut ctx);
        assert_eq!(condition.kind_name(), "Invalid");
        assert!(!condition.is_valid());
        assert_eq!(ctx.problems().len(), 1);
        assert_eq!(ctx.problems()[0].kind, ProblemKind::UnknownRuleKind);
        // persisted form survives untouched
        assert_eq!(condition.serialize(), input);
    }

    #[test]
    fn test_optional_unknown_kind() {
        let factory = RuleFactory::with_builtins();
        let catalog = HostCatalog::permissive();
        let mut ctx = ParseContext::new(&factory, &catalog);

        let input = json!({"condition": "IsDancing", "essential": "optionalTrue"});
        let condition = factory.parse_condition(&input, &mut ctx);
        assert!(condition.is_valid());
        assert!(ctx.problems().is_empty());

        let mut eval = EvalContext::new(&Sneaker, &EmptyWorld);
        assert!(condition.evaluate(&mut eval));
    }

    #[test]
    fn test_external_provider_versions() {
        let mut factory = RuleFactory::with_builtins();
        let provider = Provider::new("DanceKit", Version::new(1, 2, 0));
        factory.register_external_condition(&provider, "IsDancing", || {
            Box::new(HasFlagCondition::with_flag("IsDancing"))
        });
        let catalog = HostCatalog::permissive();
        let mut ctx = ParseContext::new(&factory, &catalog);

        let ok = json!({"condition": "IsDancing", "requiredPlugin": "DanceKit", "requiredVersion": "1.1"});
        assert!(factory.parse_condition(&ok, &mut ctx).is_valid());

        let newer = json!({"condition": "IsDancing", "requiredPlugin": "DanceKit", "requiredVersion": "2.0"});
        let condition = factory.parse_condition(&newer, &mut ctx);
        assert!(!condition.is_valid());
        assert_eq!(ctx.problems()[0].kind, ProblemKind::IncompatibleVersion);

        let missing = json!({"condition": "HasFlag", "requiredPlugin": "Nope"});
        factory.parse_condition(&missing, &mut ctx);
        assert_eq!(ctx.problems()[1].kind, ProblemKind::MissingDependency);
    }

    #[test]
    fn test_nested_round_trip_with_preset() {
        let factory = RuleFactory::with_builtins();
        let catalog = HostCatalog::permissive();
        let presets = PresetRegistry::new();
        let stealth = presets.create("Stealth").unwrap();
        stealth
            .conditions()
            .push(Condition::new(Box::new(HasFlagCondition::with_flag("IsSneaking"))));

        let input = json!([
            {
                "condition": "OR",
                "conditions": [
                    {
                        "condition": "AND",
                        "conditions": [
                            {"condition": "PRESET", "preset": "Stealth"},
                            {"condition": "HasKeyword", "keywords": ["ActorTypeNPC"], "negated": true}
                        ]
                    },
                    {
                        "condition": "CompareValues",
                        "valueA": {"variable": "Speed", "scope": "subject"},
                        "comparison": "<",
                        "valueB": {"value": 100.0}
                    }
                ]
            },
            {"condition": "Random", "disabled": true, "range": {"min": 0.0, "max": 1.0},
             "comparison": "<", "value": {"value": 0.5}, "scope": "instance"}
        ]);

        let mut ctx = ParseContext::new(&factory, &catalog).with_presets(&presets);
        let nodes = ConditionSet::parse_nodes(&input, &mut ctx).unwrap();
        assert!(ctx.problems().is_empty());
        let set = ConditionSet::from_nodes((), nodes);
        assert!(!set.has_invalid_conditions());

        let saved = set.serialize();
        let mut ctx = ParseContext::new(&factory, &catalog).with_presets(&presets);
        let reparsed = ConditionSet::from_nodes((), ConditionSet::parse_nodes(&saved, &mut ctx).unwrap());
        assert_eq!(reparsed.serialize(), saved);

        let mut eval = EvalContext::new(&Sneaker, &EmptyWorld);
        assert!(reparsed.evaluate_all(&mut eval));
    }

    #[test]
    fn test_action_parse() {
        let factory = RuleFactory::with_builtins();
        let catalog = HostCatalog::permissive();
        let mut ctx = ParseContext::new(&factory, &catalog);

        let input = json!({
            "action": "RunWeightedRandom",
            "actions": [
                {"action": "SendEvent", "event": "a"},
                {"action": "SendEvent", "event": "b", "trigger": {"event": "HitFrame"}}
            ],
            "weights": [2.0, 3.0]
        });
        let action = factory.parse_action(&input, &mut ctx);
        assert!(action.is_valid());
        let saved = action.serialize();
        assert_eq!(saved["weights"], json!([2.0, 3.0]));
        assert_eq!(saved["actions"][1]["trigger"]["event"], "HitFrame");

        let broken = factory.parse_action(&json!({"action": "Teleport"}), &mut ctx);
        assert!(!broken.is_valid());
        assert_eq!(ctx.problems().len(), 1);

        let overweight = json!({
            "action": "RunWeightedRandom",
            "actions": [
                {"action": "SendEvent", "event": "a"},
                {"action": "SendEvent", "event": "b"}
            ],
            "weights": [3.0e38, 3.0e38]
        });
        assert!(!factory.parse_action(&overweight, &mut ctx).is_valid());
        assert_eq!(ctx.problems().len(), 2);
    }
}
