//! Built-in action kinds

use parking_lot::Mutex;
use rand::Rng;
use serde_json::{json, Map, Value};

use reanim_core::{
    NumericConstraints, NumericKind, NumericValue, ReanimError, ReanimResult, RuleKey,
    VariableScope,
};

use crate::{
    ActionImpl, ActionsComponent, ConditionsComponent, EvalContext, FormComponent,
    NumericComponent, PointComponent, RuleComponent, TextComponent,
};

// ============================================================================
// EFFECT ACTIONS
// ============================================================================

/// Write an external variable
#[derive(Debug)]
pub struct SetVariableAction {
    pub variable: NumericComponent,
    pub value: NumericComponent,
}

impl SetVariableAction {
    pub fn new() -> Self {
        SetVariableAction {
            variable: NumericComponent::new("variable")
                .with_constraints(NumericConstraints::forced(NumericKind::Variable)),
            value: NumericComponent::new("value"),
        }
    }
}

impl Default for SetVariableAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for SetVariableAction {
    fn kind_name(&self) -> &str {
        "SetVariable"
    }

    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        let NumericValue::Variable(target) = &self.variable.value else {
            return false;
        };
        let value = self.value.get(ctx);
        match target.scope {
            VariableScope::Global => ctx.world.set_global(&target.name, value),
            VariableScope::Subject => ctx.subject.set_variable(&target.name, value),
        }
    }

    /// The target must be a variable
    fn is_valid(&self) -> bool {
        self.variable.value.kind() == NumericKind::Variable
            && self.variable.is_valid()
            && self.value.is_valid()
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.variable, &self.value]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.variable, &mut self.value]
    }
}

/// Add a delta to a subject attribute
#[derive(Debug)]
pub struct ModifyAttributeAction {
    pub attribute: TextComponent,
    pub delta: NumericComponent,
}

impl ModifyAttributeAction {
    pub fn new() -> Self {
        ModifyAttributeAction {
            attribute: TextComponent::new("attribute"),
            delta: NumericComponent::new("delta"),
        }
    }
}

impl Default for ModifyAttributeAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for ModifyAttributeAction {
    fn kind_name(&self) -> &str {
        "ModifyAttribute"
    }

    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        let delta = self.delta.get(ctx);
        ctx.subject.modify_attribute(self.attribute.as_str(), delta)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.attribute, &self.delta]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.attribute, &mut self.delta]
    }
}

#[derive(Debug)]
pub struct PlaySoundAction {
    pub sound: FormComponent,
}

impl PlaySoundAction {
    pub fn new() -> Self {
        PlaySoundAction {
            sound: FormComponent::new("sound"),
        }
    }
}

impl Default for PlaySoundAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for PlaySoundAction {
    fn kind_name(&self) -> &str {
        "PlaySound"
    }

    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        match &self.sound.form {
            Some(sound) => ctx.subject.play_sound(sound),
            None => false,
        }
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.sound]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.sound]
    }
}

#[derive(Debug)]
pub struct SendEventAction {
    pub event: TextComponent,
    pub payload: TextComponent,
}

impl SendEventAction {
    pub fn new() -> Self {
        SendEventAction {
            event: TextComponent::new("event"),
            payload: TextComponent::new("payload").optional(),
        }
    }

    pub fn with_event(event: impl Into<String>) -> Self {
        SendEventAction {
            event: TextComponent::new("event").with_text(event),
            payload: TextComponent::new("payload").optional(),
        }
    }
}

impl Default for SendEventAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for SendEventAction {
    fn kind_name(&self) -> &str {
        "SendEvent"
    }

    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        let payload = Some(self.payload.as_str()).filter(|p| !p.is_empty());
        ctx.subject.send_event(self.event.as_str(), payload)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.event, &self.payload]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.event, &mut self.payload]
    }
}

#[derive(Debug)]
pub struct SpawnEffectAction {
    pub effect: FormComponent,
    pub offset: PointComponent,
}

impl SpawnEffectAction {
    pub fn new() -> Self {
        SpawnEffectAction {
            effect: FormComponent::new("effect"),
            offset: PointComponent::new("offset"),
        }
    }
}

impl Default for SpawnEffectAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for SpawnEffectAction {
    fn kind_name(&self) -> &str {
        "SpawnEffect"
    }

    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        match &self.effect.form {
            Some(effect) => ctx.subject.spawn_effect(effect, self.offset.point),
            None => false,
        }
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.effect, &self.offset]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.effect, &mut self.offset]
    }
}

// ============================================================================
// CONTROL ACTIONS
// ============================================================================

/// Run nested actions when nested conditions hold
#[derive(Debug)]
pub struct RunIfAction {
    pub conditions: ConditionsComponent,
    pub actions: ActionsComponent,
}

impl RunIfAction {
    pub fn new() -> Self {
        RunIfAction {
            conditions: ConditionsComponent::new("conditions"),
            actions: ActionsComponent::new("actions"),
        }
    }
}

impl Default for RunIfAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for RunIfAction {
    fn kind_name(&self) -> &str {
        "RunIf"
    }

    /// True when the guard passed, whether or not a child ran
    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        if !self.conditions.evaluate_all(ctx) {
            return false;
        }
        self.actions.set.run_all(ctx);
        true
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.conditions, &self.actions]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.conditions, &mut self.actions]
    }
}

/// Run the first child that succeeds
#[derive(Debug)]
pub struct RunOneOfAction {
    pub actions: ActionsComponent,
}

impl RunOneOfAction {
    pub fn new() -> Self {
        RunOneOfAction {
            actions: ActionsComponent::new("actions"),
        }
    }
}

impl Default for RunOneOfAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for RunOneOfAction {
    fn kind_name(&self) -> &str {
        "RunOneOf"
    }

    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        self.actions.set.run_first_success(ctx)
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.actions]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.actions]
    }
}

/// Weights keyed by child identity
#[derive(Debug, Clone, Default)]
pub struct WeightTable {
    revision: Option<u64>,
    entries: Vec<(RuleKey, f32)>,
}

impl WeightTable {
    /// Align with `keys`: new children get 1.0, removed ones are dropped
    pub fn sync(&mut self, keys: &[RuleKey], revision: u64) {
        if self.revision == Some(revision) && self.entries.len() == keys.len() {
            return;
        }
        let entries = keys
            .iter()
            .map(|k| (*k, self.weight(*k).unwrap_or(1.0)))
            .collect();
        self.entries = entries;
        self.revision = Some(revision);
    }

    pub fn weight(&self, key: RuleKey) -> Option<f32> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, w)| *w)
    }

    pub fn entries(&self) -> &[(RuleKey, f32)] {
        &self.entries
    }
}

/// Largest weight a child may carry
pub const MAX_WEIGHT: f32 = 1.0e6;

/// Run exactly one enabled child, picked by weight
#[derive(Debug)]
pub struct RunWeightedRandomAction {
    pub actions: ActionsComponent,
    weights: Mutex<WeightTable>,
}

impl RunWeightedRandomAction {
    pub fn new() -> Self {
        RunWeightedRandomAction {
            actions: ActionsComponent::new("actions"),
            weights: Mutex::new(WeightTable::default()),
        }
    }

    fn synced(&self) -> WeightTable {
        let keys = self.actions.set.keys();
        let revision = self.actions.set.revision();
        let mut table = self.weights.lock();
        table.sync(&keys, revision);
        table.clone()
    }

    /// Weight of a child, synced with the current child list
    pub fn weight(&self, key: RuleKey) -> Option<f32> {
        self.synced().weight(key)
    }

    pub fn set_weight(&self, key: RuleKey, weight: f32) -> ReanimResult<()> {
        if !(0.0..=MAX_WEIGHT).contains(&weight) {
            return Err(ReanimError::invalid("weight", format!("{} is not a valid weight", weight)));
        }
        let keys = self.actions.set.keys();
        let revision = self.actions.set.revision();
        let mut table = self.weights.lock();
        table.sync(&keys, revision);
        let entry = table
            .entries
            .iter_mut()
            .find(|(k, _)| *k == key)
            .ok_or(ReanimError::NodeNotFound)?;
        entry.1 = weight;
        Ok(())
    }

    /// Weights in child order
    pub fn weights(&self) -> Vec<f32> {
        self.synced().entries.iter().map(|(_, w)| *w).collect()
    }
}

impl Default for RunWeightedRandomAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionImpl for RunWeightedRandomAction {
    fn kind_name(&self) -> &str {
        "RunWeightedRandom"
    }

    fn run_impl(&self, ctx: &mut EvalContext<'_>) -> bool {
        let table = self.synced();
        let nodes = self.actions.set.read_recursive();
        let candidates: Vec<(usize, f32)> = nodes
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.disabled)
            .map(|(i, a)| (i, table.weight(a.key()).unwrap_or(1.0)))
            .filter(|(_, w)| *w > 0.0)
            .collect();
        if candidates.is_empty() {
            return false;
        }
        let total: f64 = candidates.iter().map(|(_, w)| f64::from(*w)).sum();

        let chosen = match ctx.rng() {
            Some(rng) if total.is_finite() && total > 0.0 => {
                let mut roll = rng.gen_range(0.0..total);
                let mut pick = candidates[candidates.len() - 1].0;
                for (index, weight) in &candidates {
                    let weight = f64::from(*weight);
                    if roll < weight {
                        pick = *index;
                        break;
                    }
                    roll -= weight;
                }
                pick
            }
            // deterministic without randomness
            _ => candidates[0].0,
        };

        if !ctx.enter() {
            return false;
        }
        let ran = nodes[chosen].run(ctx);
        ctx.leave();
        ran
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        vec![&self.actions]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        vec![&mut self.actions]
    }

    fn parse_extra(&mut self, input: &Value) -> ReanimResult<()> {
        let Some(weights) = input.get("weights") else {
            return Ok(());
        };
        let weights = weights
            .as_array()
            .ok_or_else(|| ReanimError::mismatch("weights", "array"))?;
        let keys = self.actions.set.keys();
        for (key, weight) in keys.iter().zip(weights) {
            let weight = weight
                .as_f64()
                .ok_or_else(|| ReanimError::mismatch("weights", "number"))?;
            self.set_weight(*key, weight as f32)?;
        }
        Ok(())
    }

    fn serialize_extra(&self, out: &mut Map<String, Value>) {
        out.insert("weights".into(), json!(self.weights()));
    }
}

// ============================================================================
// INVALID
// ============================================================================

/// Placeholder for an action that could not be built; does nothing
#[derive(Debug)]
pub struct InvalidAction {
    kind: String,
    pub reason: String,
    raw: Value,
}

impl InvalidAction {
    pub fn new(kind: impl Into<String>, reason: impl Into<String>, raw: Value) -> Self {
        InvalidAction {
            kind: kind.into(),
            reason: reason.into(),
            raw,
        }
    }

    pub fn original_kind(&self) -> &str {
        &self.kind
    }
}

impl ActionImpl for InvalidAction {
    fn kind_name(&self) -> &str {
        "Invalid"
    }

    fn description(&self) -> &str {
        &self.reason
    }

    fn run_impl(&self, _ctx: &mut EvalContext<'_>) -> bool {
        false
    }

    fn components(&self) -> Vec<&dyn RuleComponent> {
        Vec::new()
    }

    fn components_mut(&mut self) -> Vec<&mut dyn RuleComponent> {
        Vec::new()
    }

    fn is_valid(&self) -> bool {
        false
    }

    fn argument_text(&self) -> String {
        format!("{} ({})", self.kind, self.reason)
    }

    fn raw_input(&self) -> Option<&Value> {
        Some(&self.raw)
    }
}
