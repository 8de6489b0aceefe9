//! REANIM Rules - Condition and action trees
//!
//! This crate implements the rule engine evaluated on the real-time path:
//! - Typed components wrapping rule values and nested sets
//! - Conditions and condition sets with short-circuit evaluation and tracing
//! - Named condition presets shared between candidates
//! - Actions and action sets (activate / deactivate / trigger)
//! - A factory registry that turns structured input into rule trees

pub mod action;
pub mod action_set;
pub mod actions;
pub mod component;
pub mod condition;
pub mod condition_set;
pub mod conditions;
pub mod context;
pub mod factory;
pub mod preset;
pub mod rule_set;
pub mod trace;

pub use action::*;
pub use action_set::*;
pub use actions::*;
pub use component::*;
pub use condition::*;
pub use condition_set::*;
pub use conditions::*;
pub use context::*;
pub use factory::*;
pub use preset::*;
pub use rule_set::*;
pub use trace::*;
