//! Rule set - ordered, lock-guarded collection of rule nodes
//!
//! Shared by condition sets and action sets. Readers (evaluation) take the
//! read lock for the whole walk; structural edits take the write lock only
//! for the change itself. Dirty marking runs after the lock is released and
//! walks parent links upward through atomics, so an edit to a nested set never
//! locks its ancestors.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use reanim_core::{CandidateId, ReanimError, ReanimResult, RuleKey};

/// A node that can live in a [`RuleSet`]
pub trait RuleNode: Send + Sync + Sized + 'static {
    /// Per-set metadata (e.g. when an action set runs)
    type Mode: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static;

    fn key(&self) -> RuleKey;

    /// Nested containers owned by this node
    fn containers(&self) -> Vec<Arc<dyn RuleContainer>>;
}

/// Type-erased view of a set, used for parent links and dirty propagation
pub trait RuleContainer: Send + Sync {
    fn owner(&self) -> SetOwner;
    fn set_owner(&self, owner: SetOwner);
    fn is_dirty(&self) -> bool;
    /// Set this set's flag and bump its revision
    fn mark_dirty_local(&self);
    /// Set the flag on this set and every nested set
    fn set_dirty_recursive(&self, dirty: bool);
    fn node_count(&self) -> usize;

    /// Mark this set and every ancestor dirty
    fn mark_dirty(&self) {
        self.mark_dirty_local();
        let mut parent = parent_of(&self.owner());
        while let Some(p) = parent {
            p.mark_dirty_local();
            parent = parent_of(&p.owner());
        }
    }
}

fn parent_of(owner: &SetOwner) -> Option<Arc<dyn RuleContainer>> {
    match owner {
        SetOwner::Parent(weak) => weak.upgrade(),
        _ => None,
    }
}

/// Non-owning back-reference of a set
#[derive(Clone, Default)]
pub enum SetOwner {
    #[default]
    Detached,
    Candidate(CandidateId),
    Preset(String),
    /// The set enclosing the node that nests this one
    Parent(Weak<dyn RuleContainer>),
}

impl std::fmt::Debug for SetOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetOwner::Detached => write!(f, "Detached"),
            SetOwner::Candidate(id) => write!(f, "Candidate({})", id),
            SetOwner::Preset(name) => write!(f, "Preset({})", name),
            SetOwner::Parent(p) => write!(f, "Parent(alive: {})", p.strong_count() > 0),
        }
    }
}

/// Ordered, lock-guarded collection of rule nodes
pub struct RuleSet<T: RuleNode> {
    nodes: RwLock<Vec<T>>,
    mode: T::Mode,
    dirty: AtomicBool,
    revision: AtomicU64,
    owner: Mutex<SetOwner>,
}

impl<T: RuleNode> RuleSet<T> {
    pub fn new() -> Arc<Self> {
        Self::with_mode(T::Mode::default())
    }

    pub fn with_mode(mode: T::Mode) -> Arc<Self> {
        Arc::new(RuleSet {
            nodes: RwLock::new(Vec::new()),
            mode,
            dirty: AtomicBool::new(false),
            revision: AtomicU64::new(0),
            owner: Mutex::new(SetOwner::Detached),
        })
    }

    /// Build a set from nodes, adopting their nested containers
    pub fn from_nodes(mode: T::Mode, nodes: Vec<T>) -> Arc<Self> {
        let set = Self::with_mode(mode);
        for node in &nodes {
            set.adopt(node);
        }
        *set.nodes.write() = nodes;
        set
    }

    pub fn mode(&self) -> T::Mode {
        self.mode
    }

    /// Read access for iteration and evaluation
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.nodes.read()
    }

    /// Read access that never queues behind a waiting writer
    ///
    /// Used by evaluation, which may re-enter the same set through a preset
    /// cycle before the depth limit cuts it off.
    pub(crate) fn read_recursive(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.nodes.read_recursive()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn keys(&self) -> Vec<RuleKey> {
        self.nodes.read().iter().map(RuleNode::key).collect()
    }

    pub fn index_of(&self, key: RuleKey) -> Option<usize> {
        self.nodes.read().iter().position(|n| n.key() == key)
    }

    /// Bumped on every structural or content change
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Parent set, if this set is nested
    pub fn parent(&self) -> Option<Arc<dyn RuleContainer>> {
        parent_of(&self.owner.lock())
    }

    pub fn owner_candidate(&self) -> Option<CandidateId> {
        match &*self.owner.lock() {
            SetOwner::Candidate(id) => Some(*id),
            _ => None,
        }
    }

    fn adopt(self: &Arc<Self>, node: &T) {
        let containers = node.containers();
        if containers.is_empty() {
            return;
        }
        let this: Arc<dyn RuleContainer> = self.clone();
        let parent: Weak<dyn RuleContainer> = Arc::downgrade(&this);
        for child in containers {
            child.set_owner(SetOwner::Parent(parent.clone()));
        }
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Append a node
    pub fn push(self: &Arc<Self>, node: T) {
        self.adopt(&node);
        self.nodes.write().push(node);
        self.mark_dirty();
    }

    /// Insert a node at `index`
    pub fn insert(self: &Arc<Self>, index: usize, node: T) -> ReanimResult<()> {
        self.adopt(&node);
        {
            let mut nodes = self.nodes.write();
            if index > nodes.len() {
                return Err(ReanimError::IndexOutOfBounds {
                    index,
                    len: nodes.len(),
                });
            }
            nodes.insert(index, node);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Remove and return the node at `index`
    pub fn remove(&self, index: usize) -> ReanimResult<T> {
        let node = {
            let mut nodes = self.nodes.write();
            if index >= nodes.len() {
                return Err(ReanimError::IndexOutOfBounds {
                    index,
                    len: nodes.len(),
                });
            }
            nodes.remove(index)
        };
        detach(&node);
        self.mark_dirty();
        Ok(node)
    }

    /// Remove the node with `key`
    pub fn remove_key(&self, key: RuleKey) -> ReanimResult<T> {
        let node = {
            let mut nodes = self.nodes.write();
            let index = nodes
                .iter()
                .position(|n| n.key() == key)
                .ok_or(ReanimError::NodeNotFound)?;
            nodes.remove(index)
        };
        detach(&node);
        self.mark_dirty();
        Ok(node)
    }

    /// Replace the node at `index`, returning the old one
    pub fn replace(self: &Arc<Self>, index: usize, node: T) -> ReanimResult<T> {
        self.adopt(&node);
        let old = {
            let mut nodes = self.nodes.write();
            let len = nodes.len();
            let slot = nodes
                .get_mut(index)
                .ok_or(ReanimError::IndexOutOfBounds { index, len })?;
            std::mem::replace(slot, node)
        };
        detach(&old);
        self.mark_dirty();
        Ok(old)
    }

    /// Replace the whole content
    pub fn replace_all(self: &Arc<Self>, nodes: Vec<T>) -> Vec<T> {
        for node in &nodes {
            self.adopt(node);
        }
        let old = std::mem::replace(&mut *self.nodes.write(), nodes);
        old.iter().for_each(detach);
        self.mark_dirty();
        old
    }

    /// Move a node within the set
    pub fn move_node(&self, from: usize, to: usize) -> ReanimResult<()> {
        {
            let mut nodes = self.nodes.write();
            let len = nodes.len();
            if from >= len || to >= len {
                return Err(ReanimError::IndexOutOfBounds {
                    index: from.max(to),
                    len,
                });
            }
            let node = nodes.remove(from);
            nodes.insert(to, node);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Move a node into another set (two separate lock scopes)
    pub fn move_to(&self, from: usize, target: &Arc<Self>, to: usize) -> ReanimResult<()> {
        let node = self.remove(from)?;
        let len = target.len();
        target.insert(to.min(len), node)
    }

    /// Reorder the set to match `order`, which must be a permutation of the keys
    pub fn reorder(&self, order: &[RuleKey]) -> ReanimResult<()> {
        {
            let mut nodes = self.nodes.write();
            if order.len() != nodes.len() {
                return Err(ReanimError::invalid(
                    "order",
                    format!("expected {} keys, got {}", nodes.len(), order.len()),
                ));
            }
            let mut rest: Vec<Option<T>> = nodes.drain(..).map(Some).collect();
            let mut sorted = Vec::with_capacity(rest.len());
            for key in order {
                let pos = rest
                    .iter()
                    .position(|n| n.as_ref().map(RuleNode::key) == Some(*key));
                match pos.and_then(|p| rest[p].take()) {
                    Some(node) => sorted.push(node),
                    None => {
                        // restore original content before bailing out
                        let mut restored: Vec<T> = sorted;
                        restored.extend(rest.into_iter().flatten());
                        *nodes = restored;
                        return Err(ReanimError::NodeNotFound);
                    }
                }
            }
            *nodes = sorted;
        }
        self.mark_dirty();
        Ok(())
    }

    /// Edit a node in place under the write lock
    pub fn with_node_mut<R>(
        self: &Arc<Self>,
        index: usize,
        f: impl FnOnce(&mut T) -> R,
    ) -> ReanimResult<R> {
        let result = {
            let mut nodes = self.nodes.write();
            let len = nodes.len();
            let node = nodes
                .get_mut(index)
                .ok_or(ReanimError::IndexOutOfBounds { index, len })?;
            let result = f(node);
            self.adopt(node);
            result
        };
        self.mark_dirty();
        Ok(result)
    }

    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.nodes.write());
        old.iter().for_each(detach);
        self.mark_dirty();
    }

    /// Clear the dirty flag of this set only
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

impl<T: RuleNode> std::fmt::Debug for RuleSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("mode", &self.mode)
            .field("len", &self.len())
            .field("revision", &self.revision())
            .finish()
    }
}

fn detach<T: RuleNode>(node: &T) {
    for child in node.containers() {
        child.set_owner(SetOwner::Detached);
    }
}

impl<T: RuleNode> RuleContainer for RuleSet<T> {
    fn owner(&self) -> SetOwner {
        self.owner.lock().clone()
    }

    fn set_owner(&self, owner: SetOwner) {
        *self.owner.lock() = owner;
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_dirty_local(&self) {
        self.dirty.store(true, Ordering::Release);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    fn set_dirty_recursive(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
        let children: Vec<_> = self
            .nodes
            .read()
            .iter()
            .flat_map(RuleNode::containers)
            .collect();
        for child in children {
            child.set_dirty_recursive(dirty);
        }
    }

    fn node_count(&self) -> usize {
        self.len()
    }
}
