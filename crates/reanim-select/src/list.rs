//! Candidate list - every replacement for one original slot, priority sorted

use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use reanim_core::{CandidateId, MotionSlot, ReanimError, ReanimResult, RulePackId};
use reanim_rules::EvalContext;

use crate::ReplacementCandidate;

#[derive(Debug, Clone)]
struct Entry {
    /// Insertion sequence, breaks priority ties
    seq: u64,
    candidate: Arc<ReplacementCandidate>,
}

/// Several enabled candidates of one slot sharing a priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityConflict {
    pub slot: MotionSlot,
    pub priority: i32,
    pub candidates: Vec<CandidateId>,
}

/// Candidates of one slot, highest priority first, insertion order among equals
#[derive(Debug)]
pub struct CandidateList {
    slot: MotionSlot,
    entries: RwLock<Vec<Entry>>,
    next_seq: AtomicU64,
}

impl CandidateList {
    pub fn new(slot: MotionSlot) -> Self {
        CandidateList {
            slot,
            entries: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn slot(&self) -> MotionSlot {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Insert after every candidate of greater or equal priority
    pub fn add(&self, candidate: Arc<ReplacementCandidate>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let priority = candidate.priority();
        let mut entries = self.entries.write();
        let at = entries.partition_point(|e| e.candidate.priority() >= priority);
        entries.insert(at, Entry { seq, candidate });
    }

    pub fn remove(&self, id: CandidateId) -> ReanimResult<Arc<ReplacementCandidate>> {
        let mut entries = self.entries.write();
        let idx = entries
            .iter()
            .position(|e| e.candidate.id() == id)
            .ok_or(ReanimError::UnknownCandidate(id))?;
        Ok(entries.remove(idx).candidate)
    }

    /// Drop every candidate of a pack; returns how many went
    pub fn remove_pack(&self, pack: RulePackId) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.candidate.pack() != pack);
        before - entries.len()
    }

    /// Change a member's priority and restore the ordering
    pub fn set_priority(&self, id: CandidateId, priority: i32) -> ReanimResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter()
            .find(|e| e.candidate.id() == id)
            .ok_or(ReanimError::UnknownCandidate(id))?;
        entry.candidate.store_priority(priority);
        entries.sort_by_key(|e| (Reverse(e.candidate.priority()), e.seq));
        Ok(())
    }

    pub fn get(&self, id: CandidateId) -> Option<Arc<ReplacementCandidate>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.candidate.id() == id)
            .map(|e| e.candidate.clone())
    }

    /// Snapshot in evaluation order, disabled members included
    pub fn candidates(&self) -> Vec<Arc<ReplacementCandidate>> {
        self.entries
            .read()
            .iter()
            .map(|e| e.candidate.clone())
            .collect()
    }

    /// Priority non-increasing and insertion order among equals
    pub fn is_ordered(&self) -> bool {
        self.entries.read().windows(2).all(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            match a.candidate.priority().cmp(&b.candidate.priority()) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => a.seq < b.seq,
                std::cmp::Ordering::Less => false,
            }
        })
    }

    /// First enabled candidate whose conditions hold; `None` means the original plays
    pub fn select_replacement(
        &self,
        ctx: &mut EvalContext<'_>,
    ) -> Option<Arc<ReplacementCandidate>> {
        let entries = self.entries.read();
        for entry in entries.iter() {
            let candidate = &entry.candidate;
            if candidate.is_disabled() {
                candidate.trace_disabled(ctx);
                continue;
            }
            if candidate.evaluate(ctx) {
                trace!(slot = %self.slot, candidate = %candidate.id(), "replacement selected");
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Like `select_replacement` but never stops early; for inspection tools
    pub fn evaluate_each(&self, ctx: &mut EvalContext<'_>) -> Vec<(CandidateId, Option<bool>)> {
        let entries = self.entries.read();
        entries
            .iter()
            .map(|e| {
                let candidate = &e.candidate;
                if candidate.is_disabled() {
                    candidate.trace_disabled(ctx);
                    (candidate.id(), None)
                } else {
                    (candidate.id(), Some(candidate.evaluate(ctx)))
                }
            })
            .collect()
    }

    /// Groups of enabled candidates with equal priority
    pub fn conflicts(&self) -> Vec<PriorityConflict> {
        let entries = self.entries.read();
        let mut out: Vec<PriorityConflict> = Vec::new();
        for candidate in entries
            .iter()
            .map(|e| &e.candidate)
            .filter(|c| !c.is_disabled())
        {
            match out.last_mut() {
                Some(group) if group.priority == candidate.priority() => {
                    group.candidates.push(candidate.id())
                }
                _ => out.push(PriorityConflict {
                    slot: self.slot,
                    priority: candidate.priority(),
                    candidates: vec![candidate.id()],
                }),
            }
        }
        out.retain(|g| g.candidates.len() > 1);
        out
    }
}
