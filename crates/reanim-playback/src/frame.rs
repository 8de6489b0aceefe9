//! Per-callback inputs from the host

use rand::RngCore;

use reanim_core::{Subject, WorldState};
use reanim_rules::{ConditionStateStore, EvalContext, EvaluationTrace};

/// Live state handed to one playback callback
pub struct Frame<'a> {
    pub subject: &'a dyn Subject,
    pub world: &'a dyn WorldState,
    rng: Option<&'a mut dyn RngCore>,
    trace: Option<&'a mut EvaluationTrace>,
}

impl<'a> Frame<'a> {
    pub fn new(subject: &'a dyn Subject, world: &'a dyn WorldState) -> Self {
        Frame {
            subject,
            world,
            rng: None,
            trace: None,
        }
    }

    pub fn with_rng(mut self, rng: &'a mut dyn RngCore) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Record every selection made during this callback
    pub fn with_trace(mut self, trace: &'a mut EvaluationTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn rng(&mut self) -> Option<&mut (dyn RngCore + 'a)> {
        self.rng.as_deref_mut()
    }

    /// Evaluation context bound to one instance's condition state
    pub fn context<'s>(
        &'s mut self,
        state: &'s mut ConditionStateStore,
        max_depth: u32,
    ) -> EvalContext<'s> {
        let mut ctx = EvalContext::new(self.subject, self.world)
            .with_state(state)
            .with_max_depth(max_depth);
        if let Some(rng) = self.rng.as_deref_mut() {
            ctx = ctx.with_rng(rng);
        }
        if let Some(trace) = self.trace.as_deref_mut() {
            ctx = ctx.with_trace(trace);
        }
        ctx
    }
}
