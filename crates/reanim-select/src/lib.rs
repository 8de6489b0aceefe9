//! REANIM Select - Replacement candidates and their selection
//!
//! Every original motion slot owns a [`CandidateList`] sorted by priority.
//! Selection walks it top-down and returns the first enabled candidate whose
//! conditions hold. Candidates are grouped into [`RulePack`]s, each owning a
//! block of motion ids and its own condition presets.

pub mod candidate;
pub mod flags;
pub mod list;
pub mod pack;
pub mod variant;

pub use candidate::*;
pub use flags::*;
pub use list::*;
pub use pack::*;
pub use variant::*;
