//! Replacement candidate - one substitute motion and the rules that pick it

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::RngCore;
use serde_json::{json, Map, Value};

use reanim_core::{
    bool_field_or, str_field, CandidateId, MotionId, MotionSlot, ReanimError, ReanimResult,
    RulePackId,
};
use reanim_rules::{
    ActionSet, ActionSetMode, ConditionSet, EvalContext, ParseContext, RuleContainer, SetOwner,
    TraceResult,
};

use crate::{CandidateFlags, VariantSet};

/// One substitute motion for an original slot
#[derive(Debug)]
pub struct ReplacementCandidate {
    id: CandidateId,
    pack: RulePackId,
    name: String,
    slot: MotionSlot,
    /// Index inside the owning pack
    local: u32,
    motion: MotionId,
    priority: AtomicI32,
    flags: AtomicU8,
    conditions: Arc<ConditionSet>,
    variants: RwLock<VariantSet>,
    on_activate: Arc<ActionSet>,
    on_deactivate: Arc<ActionSet>,
    on_trigger: Arc<ActionSet>,
}

impl ReplacementCandidate {
    pub fn new(
        pack: RulePackId,
        name: impl Into<String>,
        slot: MotionSlot,
        local: u32,
        motion: MotionId,
        priority: i32,
    ) -> Self {
        let id = CandidateId::next();
        let conditions = ConditionSet::new();
        conditions.set_owner(SetOwner::Candidate(id));
        let on_activate = ActionSet::with_mode(ActionSetMode::OnActivate);
        let on_deactivate = ActionSet::with_mode(ActionSetMode::OnDeactivate);
        let on_trigger = ActionSet::with_mode(ActionSetMode::OnTrigger);
        for set in [&on_activate, &on_deactivate, &on_trigger] {
            set.set_owner(SetOwner::Candidate(id));
        }
        ReplacementCandidate {
            id,
            pack,
            name: name.into(),
            slot,
            local,
            motion,
            priority: AtomicI32::new(priority),
            flags: AtomicU8::new(CandidateFlags::default().0),
            conditions,
            variants: RwLock::new(VariantSet::default()),
            on_activate,
            on_deactivate,
            on_trigger,
        }
    }

    pub fn with_flags(self, flags: CandidateFlags) -> Self {
        self.flags.store(flags.0, Ordering::Release);
        self
    }

    pub fn with_variants(self, variants: VariantSet) -> Self {
        *self.variants.write() = variants;
        self
    }

    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn pack(&self) -> RulePackId {
        self.pack
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Original slot this candidate replaces
    pub fn slot(&self) -> MotionSlot {
        self.slot
    }

    /// Default substitute motion
    pub fn motion(&self) -> MotionId {
        self.motion
    }

    pub fn local_motion(&self) -> u32 {
        self.local
    }

    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    /// Only the owning list may change priority, since it must re-sort
    pub(crate) fn store_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Release);
    }

    #[inline]
    pub fn flags(&self) -> CandidateFlags {
        CandidateFlags(self.flags.load(Ordering::Acquire))
    }

    pub fn set_flag(&self, bit: u8, value: bool) {
        if value {
            self.flags.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.flags.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.flags().is_disabled()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.set_flag(CandidateFlags::DISABLED, disabled);
    }

    pub fn conditions(&self) -> &Arc<ConditionSet> {
        &self.conditions
    }

    pub fn on_activate(&self) -> &Arc<ActionSet> {
        &self.on_activate
    }

    pub fn on_deactivate(&self) -> &Arc<ActionSet> {
        &self.on_deactivate
    }

    pub fn on_trigger(&self) -> &Arc<ActionSet> {
        &self.on_trigger
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.read().is_empty()
    }

    /// Replace the variant list
    pub fn set_variants(&self, variants: VariantSet) {
        *self.variants.write() = variants;
    }

    pub fn with_variant_set<R>(&self, f: impl FnOnce(&VariantSet) -> R) -> R {
        f(&self.variants.read())
    }

    /// Concrete motion to play: a variant if any is enabled, else the default
    pub fn choose_motion(
        &self,
        rng: Option<&mut (dyn RngCore + '_)>,
    ) -> (MotionId, Option<usize>) {
        let variants = self.variants.read();
        match variants.choose(rng) {
            Some(index) => match variants.get(index) {
                Some(variant) => (variant.motion, Some(index)),
                None => (self.motion, None),
            },
            None => (self.motion, None),
        }
    }

    /// Pack-local index of the default motion or of a variant
    pub fn local_index(&self, variant: Option<usize>) -> u32 {
        variant
            .and_then(|i| self.variants.read().get(i).map(|v| v.local))
            .unwrap_or(self.local)
    }

    /// Conditions hold; an empty set always holds. Ignores the disabled flag.
    pub fn evaluate(&self, ctx: &mut EvalContext<'_>) -> bool {
        if !ctx.is_tracing() {
            return self.conditions.evaluate_all(ctx);
        }
        let label = format!("{} [{}]", self.name, self.priority());
        let group = ctx.trace().map(|t| t.group(&label));
        let scope = match (ctx.trace(), group) {
            (Some(trace), Some(group)) => trace.enter(group),
            _ => None,
        };
        let result = self.conditions.evaluate_all(ctx);
        if let (Some(trace), Some(group)) = (ctx.trace(), group) {
            trace.exit(scope);
            trace.finish(group, result.into());
        }
        result
    }

    /// Record a disabled candidate in the trace without evaluating it
    pub(crate) fn trace_disabled(&self, ctx: &mut EvalContext<'_>) {
        if let Some(trace) = ctx.trace() {
            let label = format!("{} [{}]", self.name, self.priority());
            let group = trace.group(&label);
            trace.finish(group, TraceResult::Disabled);
        }
    }

    /// Build a candidate from its persisted form; `base` is the pack's motion offset.
    ///
    /// Only a malformed envelope fails; broken rules become invalid nodes and
    /// are reported through `ctx`.
    pub fn parse(
        input: &Value,
        pack: RulePackId,
        base: u32,
        ctx: &mut ParseContext<'_>,
    ) -> ReanimResult<Self> {
        let name = str_field(input, "name")?;
        let slot = input
            .get("slot")
            .and_then(Value::as_u64)
            .ok_or_else(|| ReanimError::missing("slot"))?;
        let slot = u32::try_from(slot).map_err(|_| ReanimError::mismatch("slot", "u32"))?;
        let local = input
            .get("motion")
            .and_then(Value::as_u64)
            .ok_or_else(|| ReanimError::missing("motion"))?;
        let local = u32::try_from(local).map_err(|_| ReanimError::mismatch("motion", "u32"))?;
        let priority = match input.get("priority") {
            Some(v) => v
                .as_i64()
                .ok_or_else(|| ReanimError::mismatch("priority", "integer"))?,
            None => 0,
        };

        let mut flags = CandidateFlags::default();
        for (field, bit) in CandidateFlags::FIELDS {
            flags.set(bit, bool_field_or(input, field, flags.contains(bit))?);
        }

        let candidate = ReplacementCandidate::new(
            pack,
            name,
            MotionSlot::new(slot),
            local,
            MotionId::from_offset(base, local)?,
            priority.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        )
        .with_flags(flags);

        let location = format!("{}/{}", ctx.location, name);
        let previous = std::mem::replace(&mut ctx.location, location);
        let result = candidate.parse_rules(input, base, ctx);
        ctx.location = previous;
        result?;
        Ok(candidate)
    }

    fn parse_rules(&self, input: &Value, base: u32, ctx: &mut ParseContext<'_>) -> ReanimResult<()> {
        if let Some(conditions) = input.get("conditions") {
            self.conditions
                .replace_all(ConditionSet::parse_nodes(conditions, ctx)?);
        }
        if let Some(variants) = input.get("variants") {
            self.set_variants(VariantSet::parse(variants, base)?);
        }
        for (field, set) in [
            ("onActivate", &self.on_activate),
            ("onDeactivate", &self.on_deactivate),
            ("onTrigger", &self.on_trigger),
        ] {
            if let Some(actions) = input.get(field) {
                set.replace_all(ActionSet::parse_nodes(actions, ctx)?);
            }
        }
        self.conditions.clear_dirty();
        Ok(())
    }

    /// Persisted structured form
    pub fn serialize(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), json!(self.name));
        map.insert("slot".into(), json!(self.slot.index()));
        map.insert("motion".into(), json!(self.local));
        map.insert("priority".into(), json!(self.priority()));
        let flags = self.flags();
        for (field, bit) in CandidateFlags::FIELDS {
            map.insert(field.into(), json!(flags.contains(bit)));
        }
        map.insert("conditions".into(), self.conditions.serialize());
        let variants = self.variants.read();
        if !variants.is_empty() {
            map.insert("variants".into(), variants.serialize());
        }
        for (field, set) in [
            ("onActivate", &self.on_activate),
            ("onDeactivate", &self.on_deactivate),
            ("onTrigger", &self.on_trigger),
        ] {
            if !set.is_empty() {
                map.insert(field.into(), set.serialize());
            }
        }
        Value::Object(map)
    }
}
