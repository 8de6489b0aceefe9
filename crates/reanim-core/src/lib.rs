//! REANIM Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every layer of the replacement engine:
//! - Identifiers (MotionSlot, MotionId, PlaybackHandle, CandidateId, RuleKey)
//! - Error taxonomy and configuration problems
//! - Host interfaces (Subject, WorldState) and the host catalog
//! - Rule value primitives (numbers, variables, flags, points, text, keywords)

pub mod catalog;
pub mod error;
pub mod host;
pub mod id;
pub mod value;

pub use catalog::*;
pub use error::*;
pub use host::*;
pub use id::*;
pub use value::*;
