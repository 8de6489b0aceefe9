//! Action - side-effecting node of a rule tree

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use reanim_core::{str_field, ReanimResult, RuleKey};

use crate::condition::write_flag;
use crate::{
    EvalContext, ParseContext, Requirement, RuleComponent, RuleContainer, RuleNode, TriggerEvent,
    Version,
};

/// When an action set runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionSetMode {
    /// Child set of another action
    #[default]
    Nested,
    /// When a replacement starts playing
    OnActivate,
    /// When a replacement stops playing
    OnDeactivate,
    /// On a named animation event, filtered per action
    OnTrigger,
}

/// Event filter of an action inside an on-trigger set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerFilter {
    pub event: String,
    /// `None` matches any payload
    pub payload: Option<String>,
}

impl TriggerFilter {
    pub fn new(event: impl Into<String>) -> Self {
        TriggerFilter {
            event: event.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn matches(&self, trigger: &TriggerEvent) -> bool {
        self.event.eq_ignore_ascii_case(&trigger.event)
            && match &self.payload {
                None => true,
                Some(p) => trigger.payload.as_deref() == Some(p.as_str()),
            }
    }

    pub(crate) fn parse(input: &Value) -> ReanimResult<Self> {
        let mut filter = TriggerFilter::new(str_field(input, "event")?);
        if let Some(payload) = input.get("payload").and_then(Value::as_str) {
            filter.payload = Some(payload.to_string());
        }
        Ok(filter)
    }

    pub(crate) fn serialize(&self) -> Value {
        match &self.payload {
            Some(payload) => json!({ "event": self.event, "payload": payload }),
            None => json!({ "event": self.event }),
        }
    }
}

/// Kind-specific behaviour of an action
pub trait ActionImpl: Send + Sync + fmt::Debug {
    fn kind_name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Perform the effect; true if it ran
    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool;

    fn components(&self) -> Vec<&dyn RuleComponent>;

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent>;

    fn is_valid(&self) -> bool {
        self.components().iter().all(|c| c.is_valid())
    }

    fn argument_text(&self) -> String {
        self.components()
            .iter()
            .filter(|c| c.conditions().is_none() && c.actions().is_none())
            .map(|c| c.argument_text())
            .collect::<Vec<_>>()
            .join(" ")
    }

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

    /// Kind-specific data beyond components, read after them
    fn parse_extra(&mut self, _input: &Value) -> ReanimResult<()> {
        Ok(())
    }

    fn serialize_extra(&self, _out: &mut Map<String, Value>) {}

    fn raw_input(&self) -> Option<&Value> {
        None
    }
}

/// An action: kind plus common flags
#[derive(Debug)]
pub struct Action {
    key: RuleKey,
    pub disabled: bool,
    pub trigger: Option<TriggerFilter>,
    pub requirement: Option<Requirement>,
    kind: Box<dyn ActionImpl>,
}

impl Action {
    pub fn new(kind: Box<dyn ActionImpl>) -> Self {
        Action {
            key: RuleKey::next(),
            disabled: false,
            trigger: None,
            requirement: None,
            kind,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn on_event(mut self, filter: TriggerFilter) -> Self {
        self.trigger = Some(filter);
        self
    }

    pub fn with_requirement(mut self, provider: impl Into<String>, version: Version) -> Self {
        self.requirement = Some(Requirement {
            provider: provider.into(),
            version,
        });
        self
    }

    pub fn key(&self) -> RuleKey {
        self.key
    }

    pub fn kind_name(&self) -> &str {
        self.kind.kind_name()
    }

    pub fn kind(&self) -> &dyn ActionImpl {
        self.kind.as_ref()
    }

    pub fn kind_mut(&mut self) -> &mut dyn ActionImpl {
        self.kind.as_mut()
    }

    pub fn is_valid(&self) -> bool {
        self.kind.is_valid()
    }

    /// Run the action; disabled actions do nothing and report false
    pub fn run(&self, ctx: &mut EvalContext<'_>) -> bool {
        if self.disabled {
            return false;
        }
        let previous = ctx.set_node(self.key);
        let ran = self.kind.run_impl(ctx);
        ctx.restore_node(previous);
        ran
    }

    /// Does this action respond to `trigger`?
    pub fn responds_to(&self, trigger: &TriggerEvent) -> bool {
        self.trigger.as_ref().is_some_and(|f| f.matches(trigger))
    }

    pub fn serialize(&self) -> Value {
        let mut map = match self.kind.raw_input() {
            Some(Value::Object(raw)) => raw.clone(),
            _ => {
                let mut map = Map::new();
                map.insert("action".into(), json!(self.kind.kind_name()));
                self.kind.serialize_components(&mut map);
                self.kind.serialize_extra(&mut map);
                map
            }
        };
        write_flag(&mut map, "disabled", self.disabled);
        match &self.trigger {
            Some(filter) => {
                map.insert("trigger".into(), filter.serialize());
            }
            None => {
                map.remove("trigger");
            }
        }
        if let Some(req) = &self.requirement {
            map.insert("requiredPlugin".into(), json!(req.provider));
            map.insert("requiredVersion".into(), json!(req.version.to_string()));
        }
        Value::Object(map)
    }
}

impl RuleNode for Action {
    type Mode = ActionSetMode;

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
