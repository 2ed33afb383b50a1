//! Audio objects and the registry that owns them.
//!
//! Game code only holds an [`AudioObjectId`]; the state behind it lives here
//! and is mutated by the executor while it runs object requests. The state is
//! kept so that a freshly installed backend can be brought up to date.

use crate::error::{Result, SonarchError};
use crate::ids::{
    AudioObjectId, EnvironmentId, EventId, FileInstanceId, IdGenerator, RtpcId, SwitchId,
    SwitchStateId, TriggerId, TriggerInstanceId,
};
use crate::math::Transformation;
use crate::pool::PoolBlock;
use crate::ray::RayResults;
use std::collections::{HashMap, HashSet};

/// One execution of a trigger on an object.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerInstance {
    pub id: TriggerInstanceId,
    pub trigger: TriggerId,
    /// Backend events still running for this instance
    pub events: Vec<EventId>,
    pub removal_timeout_ms: f32,
}

/// A standalone file playing on an object.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayingFile {
    pub id: FileInstanceId,
    pub path: String,
    pub localized: bool,
    /// Trigger that is told when the file stops
    pub trigger: Option<TriggerId>,
}

/// Result of removing a finished event from its object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishedEvent {
    pub instance: TriggerInstanceId,
    pub trigger: TriggerId,
    /// The instance has no running events left and was removed
    pub instance_finished: bool,
}

#[derive(Debug, Clone)]
pub struct AudioObject {
    id: AudioObjectId,
    name: String,
    pub transformation: Transformation,
    pub volume: f32,
    pub rtpcs: HashMap<RtpcId, f32>,
    pub switches: HashMap<SwitchId, SwitchStateId>,
    pub environments: HashMap<EnvironmentId, f32>,
    pub rays: RayResults,
    trigger_instances: Vec<TriggerInstance>,
    files: Vec<PlayingFile>,
    virtualized: HashSet<EventId>,
    pool_block: Option<PoolBlock>,
}

impl AudioObject {
    fn new(id: AudioObjectId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            transformation: Transformation::identity(),
            volume: 1.0,
            rtpcs: HashMap::new(),
            switches: HashMap::new(),
            environments: HashMap::new(),
            rays: RayResults::default(),
            trigger_instances: Vec::new(),
            files: Vec::new(),
            virtualized: HashSet::new(),
            pool_block: None,
        }
    }

    /// Bytes charged to the memory pool for an object with this name.
    pub fn footprint(name: &str) -> usize {
        std::mem::size_of::<AudioObject>() + name.len()
    }

    pub fn id(&self) -> AudioObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_block(&self) -> Option<PoolBlock> {
        self.pool_block
    }

    pub(crate) fn set_pool_block(&mut self, block: Option<PoolBlock>) {
        self.pool_block = block;
    }

    pub fn trigger_instances(&self) -> &[TriggerInstance] {
        &self.trigger_instances
    }

    pub fn files(&self) -> &[PlayingFile] {
        &self.files
    }

    pub fn is_virtualized(&self, event: EventId) -> bool {
        self.virtualized.contains(&event)
    }

    pub fn is_playing(&self) -> bool {
        !self.trigger_instances.is_empty() || !self.files.is_empty()
    }

    pub(crate) fn add_instance(&mut self, instance: TriggerInstance) {
        self.trigger_instances.push(instance);
    }

    /// Removes `event` from the instance running it.
    pub(crate) fn finish_event(&mut self, event: EventId) -> Option<FinishedEvent> {
        self.virtualized.remove(&event);
        let index = self
            .trigger_instances
            .iter()
            .position(|instance| instance.events.contains(&event))?;

        let instance = &mut self.trigger_instances[index];
        instance.events.retain(|running| *running != event);
        let finished = FinishedEvent {
            instance: instance.id,
            trigger: instance.trigger,
            instance_finished: instance.events.is_empty(),
        };
        if finished.instance_finished {
            self.trigger_instances.remove(index);
        }
        Some(finished)
    }

    pub(crate) fn set_virtualized(&mut self, event: EventId, virtualized: bool) {
        if virtualized {
            self.virtualized.insert(event);
        } else {
            self.virtualized.remove(&event);
        }
    }

    pub(crate) fn take_instances_of(&mut self, trigger: TriggerId) -> Vec<TriggerInstance> {
        let (taken, kept) = std::mem::take(&mut self.trigger_instances)
            .into_iter()
            .partition(|instance| instance.trigger == trigger);
        self.trigger_instances = kept;
        taken
    }

    pub(crate) fn take_all_instances(&mut self) -> Vec<TriggerInstance> {
        self.virtualized.clear();
        std::mem::take(&mut self.trigger_instances)
    }

    pub(crate) fn remove_instance(&mut self, id: TriggerInstanceId) -> Option<TriggerInstance> {
        let index = self.trigger_instances.iter().position(|i| i.id == id)?;
        Some(self.trigger_instances.remove(index))
    }

    pub(crate) fn add_file(&mut self, file: PlayingFile) {
        self.files.push(file);
    }

    pub(crate) fn remove_file(&mut self, id: FileInstanceId) -> Option<PlayingFile> {
        let index = self.files.iter().position(|file| file.id == id)?;
        Some(self.files.remove(index))
    }

    pub(crate) fn file_by_path(&self, path: &str) -> Option<&PlayingFile> {
        self.files.iter().find(|file| file.path == path)
    }

    pub(crate) fn take_all_files(&mut self) -> Vec<PlayingFile> {
        std::mem::take(&mut self.files)
    }
}

/// Owner of every audio object, including the global one.
#[derive(Debug)]
pub struct ObjectRegistry {
    objects: HashMap<AudioObjectId, AudioObject>,
    ids: IdGenerator,
}

impl ObjectRegistry {
    pub const GLOBAL_OBJECT_NAME: &'static str = "global";

    pub fn new() -> Self {
        let mut objects = HashMap::new();
        objects.insert(
            AudioObjectId::GLOBAL,
            AudioObject::new(AudioObjectId::GLOBAL, Self::GLOBAL_OBJECT_NAME),
        );
        Self {
            objects,
            ids: IdGenerator::starting_at(AudioObjectId::GLOBAL.value() + 1),
        }
    }

    /// Creates a new object and returns its ID.
    pub fn reserve(&mut self, name: &str, pool_block: Option<PoolBlock>) -> AudioObjectId {
        let id = AudioObjectId(self.ids.next());
        let mut object = AudioObject::new(id, name);
        object.set_pool_block(pool_block);
        self.objects.insert(id, object);
        log::debug!("Reserved {} '{}'", id, name);
        id
    }

    /// Removes an object. The global object cannot be released.
    pub fn release(&mut self, id: AudioObjectId) -> Result<AudioObject> {
        if id == AudioObjectId::GLOBAL {
            return Err(SonarchError::UnknownObject(
                "the global audio object cannot be released".into(),
            ));
        }
        self.objects
            .remove(&id)
            .ok_or_else(|| SonarchError::UnknownObject(id.to_string()))
    }

    pub fn get(&self, id: AudioObjectId) -> Option<&AudioObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: AudioObjectId) -> Option<&mut AudioObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: AudioObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// IDs in creation order.
    pub fn ids(&self) -> Vec<AudioObjectId> {
        let mut ids: Vec<AudioObjectId> = self.objects.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioObject> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AudioObject> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
