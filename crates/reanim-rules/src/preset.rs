//! Condition presets - named condition sets shared between candidates

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use reanim_core::{ReanimError, ReanimResult};

use crate::{ConditionSet, RuleContainer, SetOwner};

/// Named, independently stored condition set
#[derive(Debug)]
pub struct ConditionPreset {
    name: RwLock<String>,
    conditions: Arc<ConditionSet>,
}

impl ConditionPreset {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let conditions = ConditionSet::new();
        conditions.set_owner(SetOwner::Preset(name.clone()));
        Arc::new(ConditionPreset {
            name: RwLock::new(name),
            conditions,
        })
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn conditions(&self) -> &Arc<ConditionSet> {
        &self.conditions
    }
}

/// Presets of one rule pack, keyed by name
#[derive(Debug, Default)]
pub struct PresetRegistry {
    presets: RwLock<BTreeMap<String, Arc<ConditionPreset>>>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ConditionPreset>> {
        self.presets.read().get(name).cloned()
    }

    /// Create an empty preset; fails if the name is taken
    pub fn create(&self, name: &str) -> ReanimResult<Arc<ConditionPreset>> {
        let mut presets = self.presets.write();
        if presets.contains_key(name) {
            return Err(ReanimError::invalid("preset", format!("'{}' already exists", name)));
        }
        let preset = ConditionPreset::new(name);
        presets.insert(name.to_string(), preset.clone());
        Ok(preset)
    }

    /// Remove a preset; references to it become dangling
    pub fn remove(&self, name: &str) -> ReanimResult<Arc<ConditionPreset>> {
        self.presets
            .write()
            .remove(name)
            .ok_or_else(|| ReanimError::PresetNotFound(name.to_string()))
    }

    /// Rename a preset; live references follow the new name
    pub fn rename(&self, from: &str, to: &str) -> ReanimResult<()> {
        let mut presets = self.presets.write();
        if presets.contains_key(to) {
            return Err(ReanimError::invalid("preset", format!("'{}' already exists", to)));
        }
        let preset = presets
            .remove(from)
            .ok_or_else(|| ReanimError::PresetNotFound(from.to_string()))?;
        *preset.name.write() = to.to_string();
        preset.conditions.set_owner(SetOwner::Preset(to.to_string()));
        presets.insert(to.to_string(), preset);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.presets.read().keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<ConditionPreset>> {
        self.presets.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.presets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.read().is_empty()
    }
}
