//! Error types for the replacement engine

use std::fmt;

use thiserror::Error;

use crate::{CandidateId, MotionSlot, PlaybackHandle, RulePackId};

/// Core REANIM errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReanimError {
    // Structured input errors
    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Type mismatch for {field}: expected {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    // Resolution errors
    #[error("Unknown condition kind: {0}")]
    UnknownConditionKind(String),

    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Incompatible version of {provider}: required {required}, found {found}")]
    IncompatibleVersion {
        provider: String,
        required: String,
        found: String,
    },

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    // Structural edit errors
    #[error("Index out of bounds: {index} (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Rule node not found in set")]
    NodeNotFound,

    // Registry errors
    #[error("Unknown motion slot: {0}")]
    UnknownSlot(MotionSlot),

    #[error("Unknown candidate: {0}")]
    UnknownCandidate(CandidateId),

    #[error("Unknown rule pack: {0}")]
    UnknownPack(RulePackId),

    #[error("Rule pack already loaded: {0}")]
    DuplicatePack(String),

    #[error("Unknown playback handle: {0}")]
    UnknownHandle(PlaybackHandle),

    #[error("Playback handle already active: {0}")]
    HandleAlreadyActive(PlaybackHandle),

    // Fatal
    #[error("Motion index space exhausted for {scope}: {requested} requested, {remaining} remaining")]
    CapacityExhausted {
        scope: String,
        requested: u32,
        remaining: u32,
    },
}

impl ReanimError {
    pub fn missing(field: impl Into<String>) -> Self {
        ReanimError::MissingField(field.into())
    }

    pub fn mismatch(field: impl Into<String>, expected: &'static str) -> Self {
        ReanimError::TypeMismatch {
            field: field.into(),
            expected,
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ReanimError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Only index-space exhaustion has no degraded mode
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReanimError::CapacityExhausted { .. })
    }
}

/// Result type for REANIM operations
pub type ReanimResult<T> = Result<T, ReanimError>;

/// Severity of a detected configuration problem
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Worth surfacing to the author, behaviour is well defined
    Warning,
    /// A rule could not be resolved and degrades to false / no-op
    Error,
}

/// Problem category for the detected-problems sweep
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    UnknownRuleKind,
    MissingDependency,
    IncompatibleVersion,
    InvalidCondition,
    InvalidAction,
    DanglingPreset,
    PriorityConflict,
    MalformedInput,
}

/// A configuration problem recorded instead of aborting a load
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigProblem {
    pub kind: ProblemKind,
    pub severity: Severity,
    /// Where the problem was found, e.g. `pack/candidate`
    pub location: String,
    pub message: String,
}

impl ConfigProblem {
    pub fn error(kind: ProblemKind, location: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigProblem {
            kind,
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn warning(
        kind: ProblemKind,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ConfigProblem {
            kind,
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.location, self.message)
    }
}
