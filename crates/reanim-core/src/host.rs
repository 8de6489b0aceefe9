//! Host interfaces - live world state the engine reads and writes
//!
//! The engine never owns world state. Everything it knows about an actor or
//! the world comes through these traits, implemented by the host adapter.
//! Reads must be side-effect free; writes are only issued by actions.

use crate::{FormRef, Point3, SubjectId};

/// The in-world entity a rule is evaluated against
pub trait Subject: Send + Sync {
    /// Stable identity of this subject
    fn subject_id(&self) -> SubjectId;

    /// Subject-scoped numeric variable (e.g. a graph variable)
    fn variable(&self, name: &str) -> Option<f32>;

    /// Named boolean flag on the subject
    fn flag(&self, name: &str) -> bool;

    /// Does the subject carry this keyword?
    fn has_keyword(&self, keyword: &str) -> bool;

    /// Does the subject hold / wear / reference this form?
    fn has_form(&self, form: &FormRef) -> bool;

    /// World-space position
    fn position(&self) -> Point3;

    /// Compare a named text property against a value
    fn text_equals(&self, name: &str, value: &str) -> bool;

    /// Numeric attribute (health, stamina, ...)
    fn attribute(&self, name: &str) -> Option<f32>;

    fn set_variable(&self, _name: &str, _value: f32) -> bool {
        false
    }

    fn modify_attribute(&self, _name: &str, _delta: f32) -> bool {
        false
    }

    fn play_sound(&self, _sound: &FormRef) -> bool {
        false
    }

    fn send_event(&self, _event: &str, _payload: Option<&str>) -> bool {
        false
    }

    fn spawn_effect(&self, _effect: &FormRef, _offset: Point3) -> bool {
        false
    }
}

/// Process-wide state shared by all subjects
pub trait WorldState: Send + Sync {
    /// Named external (global) numeric variable
    fn global(&self, name: &str) -> Option<f32>;

    /// Write a named external variable, returns false if it does not exist
    fn set_global(&self, _name: &str, _value: f32) -> bool {
        false
    }
}

/// World with no external variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyWorld;

impl WorldState for EmptyWorld {
    fn global(&self, _name: &str) -> Option<f32> {
        None
    }
}
