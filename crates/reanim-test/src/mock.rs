//! Mock Host - in-memory implementations of every host interface
//!
//! All mocks are `Send + Sync` and record the writes actions issue, so tests
//! can assert on side effects.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use reanim_core::{FormRef, PlaybackHandle, Point3, Subject, SubjectId, WorldState};
use reanim_playback::{JointTransform, MotionHost, MotionSource, Pose, Rotation, SyncHost};

// ============================================================================
// SUBJECT
// ============================================================================

/// Side effect recorded by [`MockSubject`]
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    SetVariable(String, f32),
    ModifyAttribute(String, f32),
    PlaySound(String),
    SendEvent(String, Option<String>),
    SpawnEffect(String, Point3),
}

/// Actor with mutable flags, variables and attributes
#[derive(Debug, Default)]
pub struct MockSubject {
    id: SubjectId,
    flags: RwLock<HashSet<String>>,
    keywords: RwLock<HashSet<String>>,
    forms: RwLock<HashSet<String>>,
    variables: RwLock<HashMap<String, f32>>,
    attributes: RwLock<HashMap<String, f32>>,
    texts: RwLock<HashMap<String, String>>,
    position: RwLock<Point3>,
    calls: Mutex<Vec<HostCall>>,
}

impl MockSubject {
    pub fn new(id: u64) -> Self {
        MockSubject {
            id: SubjectId::new(id),
            ..Default::default()
        }
    }

    pub fn with_flag(self, name: &str) -> Self {
        self.set_flag(name, true);
        self
    }

    pub fn with_keyword(self, keyword: &str) -> Self {
        self.keywords.write().insert(keyword.to_string());
        self
    }

    pub fn with_form(self, form: &str) -> Self {
        self.forms.write().insert(form.to_string());
        self
    }

    pub fn with_variable(self, name: &str, value: f32) -> Self {
        self.variables.write().insert(name.to_string(), value);
        self
    }

    pub fn with_attribute(self, name: &str, value: f32) -> Self {
        self.attributes.write().insert(name.to_string(), value);
        self
    }

    pub fn with_text(self, name: &str, value: &str) -> Self {
        self.texts.write().insert(name.to_string(), value.to_string());
        self
    }

    pub fn set_flag(&self, name: &str, on: bool) {
        let mut flags = self.flags.write();
        if on {
            flags.insert(name.to_string());
        } else {
            flags.remove(name);
        }
    }

    pub fn set_position(&self, position: Point3) {
        *self.position.write() = position;
    }

    /// Every write issued so far
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    /// Names of the events sent so far
    pub fn events(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HostCall::SendEvent(name, _) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl Subject for MockSubject {
    fn subject_id(&self) -> SubjectId {
        self.id
    }

    fn variable(&self, name: &str) -> Option<f32> {
        self.variables.read().get(name).copied()
    }

    fn flag(&self, name: &str) -> bool {
        self.flags.read().contains(name)
    }

    fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.read().contains(keyword)
    }

    fn has_form(&self, form: &FormRef) -> bool {
        self.forms.read().contains(&form.name)
    }

    fn position(&self) -> Point3 {
        *self.position.read()
    }

    fn text_equals(&self, name: &str, value: &str) -> bool {
        self.texts.read().get(name).is_some_and(|t| t == value)
    }

    fn attribute(&self, name: &str) -> Option<f32> {
        self.attributes.read().get(name).copied()
    }

    fn set_variable(&self, name: &str, value: f32) -> bool {
        self.variables.write().insert(name.to_string(), value);
        self.calls
            .lock()
            .push(HostCall::SetVariable(name.to_string(), value));
        true
    }

    fn modify_attribute(&self, name: &str, delta: f32) -> bool {
        let mut attributes = self.attributes.write();
        let Some(value) = attributes.get_mut(name) else {
            return false;
        };
        *value += delta;
        self.calls
            .lock()
            .push(HostCall::ModifyAttribute(name.to_string(), delta));
        true
    }

    fn play_sound(&self, sound: &FormRef) -> bool {
        self.calls.lock().push(HostCall::PlaySound(sound.name.clone()));
        true
    }

    fn send_event(&self, event: &str, payload: Option<&str>) -> bool {
        self.calls.lock().push(HostCall::SendEvent(
            event.to_string(),
            payload.map(str::to_string),
        ));
        true
    }

    fn spawn_effect(&self, effect: &FormRef, offset: Point3) -> bool {
        self.calls
            .lock()
            .push(HostCall::SpawnEffect(effect.name.clone(), offset));
        true
    }
}

// ============================================================================
// WORLD
// ============================================================================

/// Global variables only
#[derive(Debug, Default)]
pub struct MockWorld {
    globals: RwLock<HashMap<String, f32>>,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(self, name: &str, value: f32) -> Self {
        self.globals.write().insert(name.to_string(), value);
        self
    }
}

impl WorldState for MockWorld {
    fn global(&self, name: &str) -> Option<f32> {
        self.globals.read().get(name).copied()
    }

    fn set_global(&self, name: &str, value: f32) -> bool {
        match self.globals.write().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// MOTION HOST
// ============================================================================

/// Single-joint poses whose x translation encodes the sampled source.
///
/// Originals sample as `-slot`, replacements as the motion id. Motions listed
/// with [`MockMotionHost::unload`] sample as not resident.
#[derive(Debug, Default)]
pub struct MockMotionHost {
    missing: RwLock<HashSet<MotionSource>>,
    samples: AtomicU64,
}

impl MockMotionHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unload(&self, source: MotionSource) {
        self.missing.write().insert(source);
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// The x value a pose for `source` carries
    pub fn marker(source: MotionSource) -> f32 {
        match source {
            MotionSource::Original(slot) => -(slot.index() as f32),
            MotionSource::Replacement(motion) => motion.index() as f32,
        }
    }
}

impl MotionHost for MockMotionHost {
    fn sample(&self, source: MotionSource, time: f32) -> Option<Pose> {
        self.samples.fetch_add(1, Ordering::Relaxed);
        if self.missing.read().contains(&source) {
            return None;
        }
        let mut pose = Pose::new(vec![JointTransform::new(
            Point3::new(Self::marker(source), time, 0.0),
            Rotation::identity(),
        )]);
        pose.root_delta = Point3::new(0.0, 0.0, time);
        Some(pose)
    }
}

// ============================================================================
// SYNC HOST
// ============================================================================

/// Synchronized indices keyed by handle
#[derive(Debug, Default)]
pub struct MockSyncHost {
    indices: Mutex<HashMap<PlaybackHandle, u32>>,
    writes: AtomicU64,
}

impl MockSyncHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronized handle with the host's own index
    pub fn register(&self, handle: PlaybackHandle, index: u32) {
        self.indices.lock().insert(handle, index);
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl SyncHost for MockSyncHost {
    fn index(&self, handle: PlaybackHandle) -> Option<u32> {
        self.indices.lock().get(&handle).copied()
    }

    fn set_index(&self, handle: PlaybackHandle, index: u32) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.indices.lock().insert(handle, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reanim_core::{HostCatalog, MotionId, MotionSlot};

    #[test]
    fn test_subject_records_writes() {
        let subject = MockSubject::new(1).with_attribute("health", 10.0);
        assert!(subject.modify_attribute("health", -3.0));
        assert!(!subject.modify_attribute("stamina", 1.0));
        assert_eq!(subject.attribute("health"), Some(7.0));
        assert!(subject.send_event("hit", Some("left")));
        assert_eq!(subject.events(), vec!["hit"]);
        assert_eq!(subject.calls().len(), 2);

        let sword = FormRef::new("sword", &HostCatalog::permissive());
        assert!(!subject.has_form(&sword));
        let subject = subject.with_form("sword");
        assert!(subject.has_form(&sword));
    }

    #[test]
    fn test_world_globals() {
        let world = MockWorld::new().with_global("time_of_day", 12.0);
        assert!(world.set_global("time_of_day", 18.0));
        assert!(!world.set_global("weather", 1.0));
        assert_eq!(world.global("time_of_day"), Some(18.0));
    }

    #[test]
    fn test_motion_markers() {
        let host = MockMotionHost::new();
        let original = MotionSource::Original(MotionSlot::new(3));
        let replacement = MotionSource::Replacement(MotionId::new(70));
        host.unload(replacement);

        let pose = host.sample(original, 0.5).unwrap();
        assert_eq!(pose.joints[0].translation.x, -3.0);
        assert!(host.sample(replacement, 0.0).is_none());
        assert_eq!(host.samples(), 2);
    }
}
