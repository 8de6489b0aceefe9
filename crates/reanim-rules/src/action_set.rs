//! Action set execution, validity and persistence

use serde_json::Value;

use reanim_core::{ConfigProblem, ProblemKind, ReanimError, ReanimResult};

use crate::{Action, ActionSetMode, EvalContext, ParseContext, RuleSet};

/// Ordered collection of actions
pub type ActionSet = RuleSet<Action>;

impl RuleSet<Action> {
    /// Run according to the set's mode; true if anything ran
    pub fn run(&self, ctx: &mut EvalContext<'_>) -> bool {
        match self.mode() {
            ActionSetMode::OnTrigger => self.run_triggered(ctx),
            _ => self.run_all(ctx),
        }
    }

    /// Run every enabled action in order
    pub fn run_all(&self, ctx: &mut EvalContext<'_>) -> bool {
        if !ctx.enter() {
            return false;
        }
        let nodes = self.read_recursive();
        let mut any = false;
        for action in nodes.iter() {
            any |= action.run(ctx);
        }
        drop(nodes);
        ctx.leave();
        any
    }

    /// Run the actions whose filter matches the context's trigger
    pub fn run_triggered(&self, ctx: &mut EvalContext<'_>) -> bool {
        let Some(trigger) = ctx.trigger() else {
            return false;
        };
        if !ctx.enter() {
            return false;
        }
        let nodes = self.read_recursive();
        let mut any = false;
        for action in nodes.iter().filter(|a| a.responds_to(trigger)) {
            any |= action.run(ctx);
        }
        drop(nodes);
        ctx.leave();
        any
    }

    /// Run children until one reports success
    pub fn run_first_success(&self, ctx: &mut EvalContext<'_>) -> bool {
        if !ctx.enter() {
            return false;
        }
        let nodes = self.read_recursive();
        let ran = nodes.iter().any(|a| a.run(ctx));
        drop(nodes);
        ctx.leave();
        ran
    }

    /// True if this set or any nested set holds an invalid action
    pub fn has_invalid_actions(&self) -> bool {
        self.read().iter().any(|a| !a.is_valid())
    }

    /// Record every invalid action into `out`
    pub fn collect_problems(&self, location: &str, out: &mut Vec<ConfigProblem>) {
        let nodes = self.read();
        for action in nodes.iter() {
            let mut nested_invalid = false;
            for component in action.kind().components() {
                if let Some(set) = component.actions() {
                    nested_invalid |= set.has_invalid_actions();
                    set.collect_problems(location, out);
                }
                if let Some(set) = component.conditions() {
                    nested_invalid |= set.has_invalid_conditions();
                    set.collect_problems(location, out);
                }
            }
            if !action.is_valid() && !nested_invalid {
                out.push(ConfigProblem::error(
                    ProblemKind::InvalidAction,
                    location,
                    format!(
                        "invalid action '{}' {}",
                        action.kind_name(),
                        action.kind().argument_text()
                    ),
                ));
            }
        }
    }

    pub fn serialize(&self) -> Value {
        Value::Array(self.read().iter().map(Action::serialize).collect())
    }

    /// Build actions from an array; individual failures become invalid nodes
    pub fn parse_nodes(input: &Value, ctx: &mut ParseContext<'_>) -> ReanimResult<Vec<Action>> {
        let items = input
            .as_array()
            .ok_or_else(|| ReanimError::mismatch("actions", "array"))?;
        let factory = ctx.factory;
        Ok(items
            .iter()
            .map(|item| factory.parse_action(item, ctx))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use reanim_core::{EmptyWorld, FormRef, Point3, Subject, SubjectId};

    use crate::{SendEventAction, TriggerEvent, TriggerFilter};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Subject for Recorder {
        fn subject_id(&self) -> SubjectId {
            SubjectId::new(1)
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
        fn send_event(&self, event: &str, _payload: Option<&str>) -> bool {
            self.events.lock().push(event.to_string());
            true
        }
    }

    fn send(event: &str) -> Action {
        Action::new(Box::new(SendEventAction::with_event(event)))
    }

    #[test]
    fn test_run_all_skips_disabled() {
        let subject = Recorder::default();
        let set = ActionSet::with_mode(ActionSetMode::OnActivate);
        set.push(send("a"));
        set.push(send("b").disabled());
        set.push(send("c"));

        let mut ctx = EvalContext::new(&subject, &EmptyWorld);
        assert!(set.run(&mut ctx));
        assert_eq!(*subject.events.lock(), vec!["a", "c"]);
    }

    #[test]
    fn test_run_triggered_filters() {
        let subject = Recorder::default();
        let set: Arc<ActionSet> = ActionSet::with_mode(ActionSetMode::OnTrigger);
        set.push(send("swing").on_event(TriggerFilter::new("weaponSwing")));
        set.push(send("left").on_event(TriggerFilter::new("weaponSwing").with_payload("left")));
        set.push(send("untagged"));

        let trigger = TriggerEvent::new("weaponSwing");
        let mut ctx = EvalContext::new(&subject, &EmptyWorld).with_trigger(&trigger);
        assert!(set.run(&mut ctx));
        assert_eq!(*subject.events.lock(), vec!["swing"]);

        let mut no_trigger = EvalContext::new(&subject, &EmptyWorld);
        assert!(!set.run(&mut no_trigger));
    }
}
