//! Index spaces - stable per-pack blocks of a bounded index range
//!
//! Used for the engine-wide motion ids and for synchronized playback
//! indices. A pack keeps its block for the lifetime of the space, so reloading
//! it yields the same offsets.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use reanim_core::{ReanimError, ReanimResult, RulePackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    offset: u32,
    len: u32,
}

#[derive(Debug, Default)]
struct Blocks {
    next: u32,
    by_pack: HashMap<RulePackId, Block>,
}

/// Bounded index range split into per-pack blocks
#[derive(Debug)]
pub struct IndexSpace {
    scope: &'static str,
    base: u32,
    capacity: u32,
    blocks: Mutex<Blocks>,
}

impl IndexSpace {
    /// Indices `base .. base + capacity`, capacity clamped to the u32 range
    pub fn new(scope: &'static str, base: u32, capacity: u32) -> Self {
        IndexSpace {
            scope,
            base,
            capacity: capacity.min(u32::MAX - base),
            blocks: Mutex::new(Blocks::default()),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn used(&self) -> u32 {
        self.blocks.lock().next
    }

    pub fn remaining(&self) -> u32 {
        self.capacity - self.used()
    }

    /// Reserve `len` indices for a pack and return the first one.
    ///
    /// A pack that already holds a block gets the same offset back. The block
    /// grows only while it is the most recent one.
    pub fn reserve(&self, pack: RulePackId, len: u32) -> ReanimResult<u32> {
        let mut blocks = self.blocks.lock();
        let remaining = self.capacity - blocks.next;

        if let Some(block) = blocks.by_pack.get(&pack).copied() {
            if len <= block.len {
                return Ok(self.base + block.offset);
            }
            let extra = len - block.len;
            if block.offset + block.len != blocks.next {
                return Err(ReanimError::invalid(
                    self.scope,
                    format!("block of pack {} cannot grow to {}", pack, len),
                ));
            }
            if extra > remaining {
                return Err(self.exhausted(extra, remaining));
            }
            blocks.next += extra;
            blocks.by_pack.insert(pack, Block { offset: block.offset, len });
            return Ok(self.base + block.offset);
        }

        if len > remaining {
            return Err(self.exhausted(len, remaining));
        }
        let offset = blocks.next;
        blocks.next += len;
        blocks.by_pack.insert(pack, Block { offset, len });
        debug!(scope = self.scope, %pack, offset, len, "index block reserved");
        Ok(self.base + offset)
    }

    /// First index of a pack's block
    pub fn offset(&self, pack: RulePackId) -> Option<u32> {
        self.blocks
            .lock()
            .by_pack
            .get(&pack)
            .map(|b| self.base + b.offset)
    }

    fn exhausted(&self, requested: u32, remaining: u32) -> ReanimError {
        ReanimError::CapacityExhausted {
            scope: self.scope.to_string(),
            requested,
            remaining,
        }
    }
}
