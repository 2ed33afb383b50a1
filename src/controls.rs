//! Controls and preload data.
//!
//! The audio system does not know how controls are stored on disk. A
//! [`ControlsDataSource`] turns a folder and a [`DataScope`] into plain
//! definitions, and the [`ControlsRegistry`] keeps them keyed by their
//! name-derived IDs so name lookups stay O(1).

use crate::error::SonarchError;
use crate::ids::{EnvironmentId, PreloadRequestId, RtpcId, SwitchId, SwitchStateId, TriggerId};
use crate::request::DataScope;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SwitchDefinition {
    pub name: String,
    pub states: Vec<String>,
}

impl SwitchDefinition {
    pub fn new(name: &str, states: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            states: states.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Controls parsed from one folder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlsData {
    pub triggers: Vec<String>,
    pub rtpcs: Vec<String>,
    pub switches: Vec<SwitchDefinition>,
    pub environments: Vec<String>,
}

impl ControlsData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(mut self, name: &str) -> Self {
        self.triggers.push(name.to_string());
        self
    }

    pub fn rtpc(mut self, name: &str) -> Self {
        self.rtpcs.push(name.to_string());
        self
    }

    pub fn switch(mut self, name: &str, states: &[&str]) -> Self {
        self.switches.push(SwitchDefinition::new(name, states));
        self
    }

    pub fn environment(mut self, name: &str) -> Self {
        self.environments.push(name.to_string());
        self
    }
}

/// A named bundle of audio data that is loaded and unloaded as a unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreloadDefinition {
    pub name: String,
    /// Loaded by `PreloadSingleRequest` calls with `auto_load_only` set
    pub auto_load: bool,
    /// Implementation-specific data entries (sound banks, ...)
    pub entries: Vec<String>,
}

impl PreloadDefinition {
    pub fn new(name: &str, auto_load: bool) -> Self {
        Self {
            name: name.to_string(),
            auto_load,
            entries: Vec::new(),
        }
    }

    pub fn entry(mut self, entry: &str) -> Self {
        self.entries.push(entry.to_string());
        self
    }

    pub fn id(&self) -> PreloadRequestId {
        PreloadRequestId::from_name(&self.name)
    }
}

/// Produces controls and preload definitions for a folder.
pub trait ControlsDataSource: Send + Sync {
    fn load_controls(&self, folder: &Path, scope: DataScope) -> anyhow::Result<ControlsData>;

    fn load_preloads(
        &self,
        folder: &Path,
        scope: DataScope,
    ) -> anyhow::Result<Vec<PreloadDefinition>>;
}

/// In-memory data source keyed by folder.
#[derive(Debug, Clone, Default)]
pub struct StaticControlsSource {
    folders: HashMap<PathBuf, (ControlsData, Vec<PreloadDefinition>)>,
}

impl StaticControlsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(
        mut self,
        folder: impl Into<PathBuf>,
        controls: ControlsData,
        preloads: Vec<PreloadDefinition>,
    ) -> Self {
        self.folders.insert(folder.into(), (controls, preloads));
        self
    }
}

impl ControlsDataSource for StaticControlsSource {
    fn load_controls(&self, folder: &Path, _scope: DataScope) -> anyhow::Result<ControlsData> {
        let (controls, _) = self.folders.get(folder).ok_or_else(|| {
            SonarchError::ControlsData(format!("no controls data in {}", folder.display()))
        })?;
        Ok(controls.clone())
    }

    fn load_preloads(
        &self,
        folder: &Path,
        _scope: DataScope,
    ) -> anyhow::Result<Vec<PreloadDefinition>> {
        let (_, preloads) = self.folders.get(folder).ok_or_else(|| {
            SonarchError::ControlsData(format!("no preloads data in {}", folder.display()))
        })?;
        Ok(preloads.clone())
    }
}

#[derive(Debug, Clone)]
struct NamedEntry {
    name: String,
    scope: DataScope,
}

#[derive(Debug, Clone)]
struct SwitchEntry {
    name: String,
    scope: DataScope,
    states: HashMap<SwitchStateId, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct PreloadEntry {
    pub definition: PreloadDefinition,
    pub scope: DataScope,
    pub loaded: bool,
}

/// Parsed controls, keyed by ID.
#[derive(Debug, Default)]
pub struct ControlsRegistry {
    triggers: HashMap<TriggerId, NamedEntry>,
    rtpcs: HashMap<RtpcId, NamedEntry>,
    switches: HashMap<SwitchId, SwitchEntry>,
    environments: HashMap<EnvironmentId, NamedEntry>,
    preloads: HashMap<PreloadRequestId, PreloadEntry>,
}

impl ControlsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the controls of one folder. Returns the number of controls added.
    pub fn insert_controls(&mut self, data: &ControlsData, scope: DataScope) -> usize {
        let mut added = 0;

        for name in &data.triggers {
            added += insert_named(&mut self.triggers, TriggerId::from_name(name), name, scope);
        }
        for name in &data.rtpcs {
            added += insert_named(&mut self.rtpcs, RtpcId::from_name(name), name, scope);
        }
        for name in &data.environments {
            added += insert_named(
                &mut self.environments,
                EnvironmentId::from_name(name),
                name,
                scope,
            );
        }
        for switch in &data.switches {
            let id = SwitchId::from_name(&switch.name);
            if self.switches.contains_key(&id) {
                log::warn!("Switch '{}' is already defined, ignoring", switch.name);
                continue;
            }
            let states = switch
                .states
                .iter()
                .map(|state| (SwitchStateId::from_name(state), state.clone()))
                .collect();
            self.switches.insert(
                id,
                SwitchEntry {
                    name: switch.name.clone(),
                    scope,
                    states,
                },
            );
            added += 1;
        }

        added
    }

    pub fn insert_preloads(&mut self, preloads: &[PreloadDefinition], scope: DataScope) -> usize {
        let mut added = 0;
        for definition in preloads {
            let id = definition.id();
            if self.preloads.contains_key(&id) {
                log::warn!(
                    "Preload request '{}' is already defined, ignoring",
                    definition.name
                );
                continue;
            }
            self.preloads.insert(
                id,
                PreloadEntry {
                    definition: definition.clone(),
                    scope,
                    loaded: false,
                },
            );
            added += 1;
        }
        added
    }

    /// Forgets every control of the scope.
    pub fn clear_controls(&mut self, scope: DataScope) {
        self.triggers.retain(|_, entry| !scope.covers(entry.scope));
        self.rtpcs.retain(|_, entry| !scope.covers(entry.scope));
        self.environments.retain(|_, entry| !scope.covers(entry.scope));
        self.switches.retain(|_, entry| !scope.covers(entry.scope));
    }

    /// Forgets every preload definition of the scope and returns the ones that were loaded.
    pub(crate) fn clear_preloads(&mut self, scope: DataScope) -> Vec<(PreloadRequestId, PreloadEntry)> {
        let removed: Vec<PreloadRequestId> = self
            .preloads
            .iter()
            .filter(|(_, entry)| scope.covers(entry.scope))
            .map(|(id, _)| *id)
            .collect();

        removed
            .into_iter()
            .filter_map(|id| self.preloads.remove(&id).map(|entry| (id, entry)))
            .filter(|(_, entry)| entry.loaded)
            .collect()
    }

    pub(crate) fn preload(&self, id: PreloadRequestId) -> Option<&PreloadEntry> {
        self.preloads.get(&id)
    }

    pub(crate) fn set_preload_loaded(&mut self, id: PreloadRequestId, loaded: bool) {
        if let Some(entry) = self.preloads.get_mut(&id) {
            entry.loaded = loaded;
        }
    }

    /// IDs of the loaded preloads of a scope.
    pub(crate) fn loaded_preloads(&self, scope: DataScope) -> Vec<PreloadRequestId> {
        self.preloads
            .iter()
            .filter(|(_, entry)| entry.loaded && scope.covers(entry.scope))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn trigger_id(&self, name: &str) -> Option<TriggerId> {
        let id = TriggerId::from_name(name);
        self.triggers.contains_key(&id).then_some(id)
    }

    pub fn rtpc_id(&self, name: &str) -> Option<RtpcId> {
        let id = RtpcId::from_name(name);
        self.rtpcs.contains_key(&id).then_some(id)
    }

    pub fn switch_id(&self, name: &str) -> Option<SwitchId> {
        let id = SwitchId::from_name(name);
        self.switches.contains_key(&id).then_some(id)
    }

    pub fn switch_state_id(&self, switch: SwitchId, state_name: &str) -> Option<SwitchStateId> {
        let id = SwitchStateId::from_name(state_name);
        self.switches
            .get(&switch)
            .filter(|entry| entry.states.contains_key(&id))
            .map(|_| id)
    }

    pub fn preload_request_id(&self, name: &str) -> Option<PreloadRequestId> {
        let id = PreloadRequestId::from_name(name);
        self.preloads.contains_key(&id).then_some(id)
    }

    pub fn environment_id(&self, name: &str) -> Option<EnvironmentId> {
        let id = EnvironmentId::from_name(name);
        self.environments.contains_key(&id).then_some(id)
    }

    pub fn has_trigger(&self, id: TriggerId) -> bool {
        self.triggers.contains_key(&id)
    }

    pub fn has_rtpc(&self, id: RtpcId) -> bool {
        self.rtpcs.contains_key(&id)
    }

    pub fn has_environment(&self, id: EnvironmentId) -> bool {
        self.environments.contains_key(&id)
    }

    pub fn has_switch_state(&self, switch: SwitchId, state: SwitchStateId) -> bool {
        self.switches
            .get(&switch)
            .is_some_and(|entry| entry.states.contains_key(&state))
    }

    pub fn trigger_name(&self, id: TriggerId) -> Option<&str> {
        self.triggers.get(&id).map(|entry| entry.name.as_str())
    }

    pub fn switch_name(&self, id: SwitchId) -> Option<&str> {
        self.switches.get(&id).map(|entry| entry.name.as_str())
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn preload_count(&self) -> usize {
        self.preloads.len()
    }
}

fn insert_named<K>(map: &mut HashMap<K, NamedEntry>, id: K, name: &str, scope: DataScope) -> usize
where
    K: std::hash::Hash + Eq + std::fmt::Display,
{
    if let Some(existing) = map.get(&id) {
        if existing.name.eq_ignore_ascii_case(name) {
            log::warn!("Control '{}' is already defined, ignoring", name);
        } else {
            log::error!(
                "Control '{}' collides with '{}' ({}), ignoring",
                name,
                existing.name,
                id
            );
        }
        return 0;
    }
    map.insert(
        id,
        NamedEntry {
            name: name.to_string(),
            scope,
        },
    );
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_controls() -> ControlsData {
        ControlsData::new()
            .trigger("Play_Footstep")
            .rtpc("speed")
            .switch("surface", &["grass", "stone"])
            .environment("cave_reverb")
    }

    #[test]
    fn test_lookups_after_insert() {
        let mut registry = ControlsRegistry::new();
        assert_eq!(registry.insert_controls(&sample_controls(), DataScope::Global), 4);

        assert_eq!(
            registry.trigger_id("play_footstep"),
            Some(TriggerId::from_name("Play_Footstep"))
        );
        assert!(registry.rtpc_id("speed").is_some());
        assert!(registry.environment_id("cave_reverb").is_some());
        assert!(registry.trigger_id("missing").is_none());

        let surface = registry.switch_id("surface").unwrap();
        assert!(registry.switch_state_id(surface, "grass").is_some());
        assert!(registry.switch_state_id(surface, "water").is_none());
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut registry = ControlsRegistry::new();
        registry.insert_controls(&sample_controls(), DataScope::Global);
        assert_eq!(
            registry.insert_controls(&sample_controls(), DataScope::LevelSpecific),
            0
        );
    }

    #[test]
    fn test_clear_by_scope() {
        let mut registry = ControlsRegistry::new();
        registry.insert_controls(&sample_controls(), DataScope::Global);
        registry.insert_controls(
            &ControlsData::new().trigger("forest_ambience"),
            DataScope::LevelSpecific,
        );

        registry.clear_controls(DataScope::LevelSpecific);
        assert!(registry.trigger_id("forest_ambience").is_none());
        assert!(registry.trigger_id("play_footstep").is_some());

        registry.clear_controls(DataScope::All);
        assert_eq!(registry.trigger_count(), 0);
        assert!(registry.switch_id("surface").is_none());
    }

    #[test]
    fn test_clear_preloads_returns_loaded_ones() {
        let mut registry = ControlsRegistry::new();
        let global = PreloadDefinition::new("global_atl_preloads", true);
        let level = PreloadDefinition::new("forest", true);
        registry.insert_preloads(&[global.clone()], DataScope::Global);
        registry.insert_preloads(&[level.clone()], DataScope::LevelSpecific);
        registry.set_preload_loaded(level.id(), true);

        let unloaded = registry.clear_preloads(DataScope::LevelSpecific);
        assert_eq!(unloaded.len(), 1);
        assert_eq!(unloaded[0].0, level.id());
        assert!(registry.preload(global.id()).is_some());
        assert_eq!(registry.preload_count(), 1);
    }

    #[test]
    fn test_static_source_missing_folder() {
        let source =
            StaticControlsSource::new().with_folder("audio", sample_controls(), Vec::new());
        assert!(source.load_controls(Path::new("audio"), DataScope::Global).is_ok());
        assert!(
            source
                .load_controls(Path::new("audio/levels/x"), DataScope::LevelSpecific)
                .is_err()
        );
    }
}
