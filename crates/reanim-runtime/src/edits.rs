//! Deferred edits - structural changes requested while a frame is running
//!
//! The editor queues them with [`ReplacerEngine::queue_edit`]; the host applies
//! the queue between frames with [`ReplacerEngine::apply_pending_edits`].

use std::fmt;

use reanim_core::{CandidateId, ReanimError, ReanimResult, RulePackId};

use crate::ReplacerEngine;

/// Arbitrary edit closure
pub type EditFn = Box<dyn FnOnce(&ReplacerEngine) -> ReanimResult<()> + Send>;

/// A queued structural change
pub enum DeferredEdit {
    SetPriority { candidate: CandidateId, priority: i32 },
    /// Set or clear one `CandidateFlags` bit
    SetFlag { candidate: CandidateId, bit: u8, value: bool },
    RemoveCandidate(CandidateId),
    UnloadPack(RulePackId),
    Custom(EditFn),
}

impl DeferredEdit {
    pub fn custom<F>(f: F) -> Self
    where
        F: FnOnce(&ReplacerEngine) -> ReanimResult<()> + Send + 'static,
    {
        DeferredEdit::Custom(Box::new(f))
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeferredEdit::SetPriority { .. } => "set_priority",
            DeferredEdit::SetFlag { .. } => "set_flag",
            DeferredEdit::RemoveCandidate(_) => "remove_candidate",
            DeferredEdit::UnloadPack(_) => "unload_pack",
            DeferredEdit::Custom(_) => "custom",
        }
    }

    pub fn apply(self, engine: &ReplacerEngine) -> ReanimResult<()> {
        match self {
            DeferredEdit::SetPriority {
                candidate,
                priority,
            } => engine.set_priority(candidate, priority),
            DeferredEdit::SetFlag {
                candidate,
                bit,
                value,
            } => {
                let target = engine
                    .candidate(candidate)
                    .ok_or(ReanimError::UnknownCandidate(candidate))?;
                target.set_flag(bit, value);
                Ok(())
            }
            DeferredEdit::RemoveCandidate(id) => engine.remove_candidate(id).map(|_| ()),
            DeferredEdit::UnloadPack(id) => engine.unload_pack(id),
            DeferredEdit::Custom(f) => f(engine),
        }
    }
}

impl fmt::Debug for DeferredEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredEdit::SetPriority {
                candidate,
                priority,
            } => f
                .debug_struct("SetPriority")
                .field("candidate", candidate)
                .field("priority", priority)
                .finish(),
            DeferredEdit::SetFlag {
                candidate,
                bit,
                value,
            } => f
                .debug_struct("SetFlag")
                .field("candidate", candidate)
                .field("bit", bit)
                .field("value", value)
                .finish(),
            DeferredEdit::RemoveCandidate(id) => f.debug_tuple("RemoveCandidate").field(id).finish(),
            DeferredEdit::UnloadPack(id) => f.debug_tuple("UnloadPack").field(id).finish(),
            DeferredEdit::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
