//! Execution of requests against the active backend.
//!
//! The executor owns every piece of state a request can touch: the backend
//! adapter, the audio objects and the listeners. It runs one request at a time
//! and turns the outcome into a [`RequestInfo`]. Requests that have to happen
//! as a consequence of another one (a trigger instance finishing after its
//! last event) are returned as follow-ups and pushed by the caller once the
//! executor lock is released.

use crate::adapter::BackendAdapter;
use crate::backend::{AudioBackend, BackendEnvironment};
use crate::config::SonarchSystemDesc;
use crate::controls::{ControlsDataSource, ControlsRegistry};
use crate::error::SonarchError;
use crate::host::is_loaded_level;
use crate::ids::{
    AudioObjectId, EventId, FileInstanceId, IdGenerator, ListenerId, PreloadRequestId, TriggerId,
    TriggerInstanceId,
};
use crate::listener::ListenerRegistry;
use crate::object::{AudioObject, ObjectRegistry, PlayingFile, TriggerInstance};
use crate::pool::AudioMemoryPool;
use crate::request::{
    AudioRequest, CallbackRequest, DataScope, ListenerRequest, ManagerRequest, ObjectRequest,
    RequestEcho, RequestInfo, RequestPayload, RequestStatus,
};
use crate::request_listener::RequestListenerRegistry;
use crate::sync::{lock, read, write};
use anyhow::{Context, anyhow, bail, ensure};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Outcome of one executed request.
#[derive(Debug)]
pub(crate) struct Execution {
    pub info: RequestInfo,
    pub follow_ups: Vec<AudioRequest>,
}

pub(crate) struct Executor {
    adapter: BackendAdapter,
    objects: ObjectRegistry,
    listeners: ListenerRegistry,
    controls: Arc<RwLock<ControlsRegistry>>,
    source: Arc<dyn ControlsDataSource>,
    request_listeners: Arc<RequestListenerRegistry>,
    pool: Arc<Mutex<AudioMemoryPool>>,
    env: BackendEnvironment,
    desc: SonarchSystemDesc,
    has_focus: bool,
    muted: bool,
    /// Object each running event belongs to
    events: HashMap<EventId, AudioObjectId>,
    event_ids: IdGenerator,
    instance_ids: IdGenerator,
    file_ids: IdGenerator,
}

impl Executor {
    pub fn new(
        desc: SonarchSystemDesc,
        env: BackendEnvironment,
        controls: Arc<RwLock<ControlsRegistry>>,
        source: Arc<dyn ControlsDataSource>,
        request_listeners: Arc<RequestListenerRegistry>,
        pool: Arc<Mutex<AudioMemoryPool>>,
    ) -> Self {
        Self {
            adapter: BackendAdapter::new(),
            objects: ObjectRegistry::new(),
            listeners: ListenerRegistry::new(),
            controls,
            source,
            request_listeners,
            pool,
            env,
            desc,
            has_focus: true,
            muted: false,
            events: HashMap::new(),
            event_ids: IdGenerator::starting_at(1),
            instance_ids: IdGenerator::starting_at(1),
            file_ids: IdGenerator::starting_at(1),
        }
    }

    pub fn execute(&mut self, request: &AudioRequest) -> Execution {
        let kind = request.kind();
        let mut follow_ups = Vec::new();

        let (object, result) = match &request.payload {
            RequestPayload::Manager(manager) => {
                (None, self.execute_manager(manager, &mut follow_ups))
            }
            RequestPayload::Callback(callback) => {
                let object = self.callback_object(callback, request.object);
                (object, self.execute_callback(callback, object, &mut follow_ups))
            }
            RequestPayload::Object(object_request) => {
                let target = request.object.unwrap_or(AudioObjectId::GLOBAL);
                (
                    Some(target),
                    self.execute_object(target, object_request, &mut follow_ups),
                )
            }
            RequestPayload::Listener(listener) => (None, self.execute_listener(listener)),
        };

        let info = RequestInfo::new(kind, request.flags, object);
        let info = match result {
            Ok(echo) => info.with_echo(echo),
            Err(e) => {
                log::warn!("{} request failed: {:#}", kind.name, e);
                info.with_status(RequestStatus::Failure)
            }
        };

        Execution { info, follow_ups }
    }

    fn execute_manager(
        &mut self,
        request: &ManagerRequest,
        follow_ups: &mut Vec<AudioRequest>,
    ) -> anyhow::Result<RequestEcho> {
        match request {
            ManagerRequest::SetImplementation(slot) => self.set_implementation(slot.take()),
            ManagerRequest::ReleaseImplementation => {
                self.release_implementation_data();
                self.adapter.release();
                Ok(RequestEcho::Implementation(self.adapter.name().to_string()))
            }
            ManagerRequest::ParseControlsData { folder, scope } => {
                self.parse_controls(folder, *scope)?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::ParsePreloadsData { folder, scope } => {
                self.parse_preloads(folder, *scope)?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::PreloadSingleRequest { id, auto_load_only } => {
                self.load_preload(*id, *auto_load_only)
            }
            ManagerRequest::UnloadSingleRequest { id } => self.unload_preload(*id),
            ManagerRequest::ReserveObjectId { name } => self.reserve_object(name),
            ManagerRequest::AddRequestListener(registration) => {
                self.request_listeners.add(registration.clone());
                Ok(RequestEcho::None)
            }
            ManagerRequest::RemoveRequestListener(handle) => {
                ensure!(
                    self.request_listeners.remove_without_waiting(*handle),
                    "{} is not registered",
                    handle
                );
                Ok(RequestEcho::None)
            }
            ManagerRequest::RefreshAudioSystem { level_name } => {
                self.refresh(level_name.as_deref(), follow_ups)?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::ChangeLanguage { language } => {
                self.env.language = language.clone();
                self.adapter.backend_mut().set_language(language)?;
                log::info!("Audio language set to '{}'", language);
                Ok(RequestEcho::None)
            }
            ManagerRequest::RetriggerAudioControls => {
                self.retrigger()?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::LoseFocus => {
                self.lose_focus()?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::GetFocus => {
                self.get_focus()?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::MuteAll => {
                self.muted = true;
                self.adapter.backend_mut().mute_all()?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::UnmuteAll => {
                self.muted = false;
                // Focus loss keeps the output muted until focus returns.
                if self.has_focus || !self.desc.mute_on_focus_loss {
                    self.adapter.backend_mut().unmute_all()?;
                }
                Ok(RequestEcho::None)
            }
            ManagerRequest::StopAllSounds => {
                self.stop_all_sounds(follow_ups)?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::ClearControlsData { scope } => {
                write(&self.controls).clear_controls(*scope);
                Ok(RequestEcho::None)
            }
            ManagerRequest::ClearPreloadsData { scope } => {
                self.clear_preloads(*scope);
                Ok(RequestEcho::None)
            }
            ManagerRequest::ReloadControlsData { folder, level_name } => {
                self.reload_controls(folder, level_name.as_deref())?;
                Ok(RequestEcho::None)
            }
            ManagerRequest::UnloadDataByScope { scope } => {
                let loaded = read(&self.controls).loaded_preloads(*scope);
                for id in loaded {
                    self.unload_preload(id)?;
                }
                Ok(RequestEcho::None)
            }
        }
    }

    fn set_implementation(
        &mut self,
        next: Option<Box<dyn AudioBackend>>,
    ) -> anyhow::Result<RequestEcho> {
        let requested = next.as_ref().map(|backend| backend.name().to_string());

        self.release_implementation_data();
        let installed = self.adapter.install(next, &self.env);
        self.register_state_with_backend();

        let active = self.adapter.name().to_string();
        if !installed {
            bail!(
                "audio implementation '{}' could not be initialized, '{}' is active",
                requested.as_deref().unwrap_or_default(),
                active
            );
        }
        log::info!("Active audio implementation: '{}'", active);
        Ok(RequestEcho::Implementation(active))
    }

    /// Drops everything that was parsed or loaded for the current backend.
    fn release_implementation_data(&mut self) {
        self.clear_preloads(DataScope::All);
        write(&self.controls).clear_controls(DataScope::All);
    }

    /// Tells a freshly installed backend about the objects and listeners that exist.
    fn register_state_with_backend(&mut self) {
        let backend = self.adapter.backend_mut();

        for (id, listener) in self.listeners.iter() {
            let result = backend
                .register_listener(id)
                .and_then(|()| backend.set_listener_transformation(id, &listener.transformation));
            if let Err(e) = result {
                log::warn!("Failed to register {} with the backend: {:#}", id, e);
            }
        }

        for id in self.objects.ids() {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            if let Err(e) = backend.register_object(id, object.name()) {
                log::warn!("Failed to register {} with the backend: {:#}", id, e);
            }
        }
    }

    fn parse_controls(&mut self, folder: &Path, scope: DataScope) -> anyhow::Result<()> {
        let data = self
            .source
            .load_controls(folder, scope)
            .with_context(|| format!("parsing controls data in {}", folder.display()))?;
        let added = write(&self.controls).insert_controls(&data, scope);
        log::info!(
            "Parsed {} controls from {} ({:?})",
            added,
            folder.display(),
            scope
        );
        Ok(())
    }

    fn parse_preloads(&mut self, folder: &Path, scope: DataScope) -> anyhow::Result<()> {
        let preloads = self
            .source
            .load_preloads(folder, scope)
            .with_context(|| format!("parsing preloads data in {}", folder.display()))?;
        let added = write(&self.controls).insert_preloads(&preloads, scope);
        log::info!(
            "Parsed {} preload requests from {} ({:?})",
            added,
            folder.display(),
            scope
        );
        Ok(())
    }

    fn load_preload(
        &mut self,
        id: PreloadRequestId,
        auto_load_only: bool,
    ) -> anyhow::Result<RequestEcho> {
        let definition = {
            let controls = read(&self.controls);
            let entry = controls
                .preload(id)
                .ok_or_else(|| anyhow!("unknown preload request {}", id))?;
            if entry.loaded {
                return Ok(RequestEcho::Preload(id));
            }
            if auto_load_only && !entry.definition.auto_load {
                log::debug!(
                    "Skipping preload request '{}': not marked for auto-loading",
                    entry.definition.name
                );
                return Ok(RequestEcho::Preload(id));
            }
            entry.definition.clone()
        };

        self.adapter
            .backend_mut()
            .load_preload(id, &definition)
            .with_context(|| format!("loading preload request '{}'", definition.name))?;
        write(&self.controls).set_preload_loaded(id, true);
        log::debug!("Loaded preload request '{}'", definition.name);
        Ok(RequestEcho::Preload(id))
    }

    fn unload_preload(&mut self, id: PreloadRequestId) -> anyhow::Result<RequestEcho> {
        let definition = {
            let controls = read(&self.controls);
            let entry = controls
                .preload(id)
                .ok_or_else(|| anyhow!("unknown preload request {}", id))?;
            if !entry.loaded {
                return Ok(RequestEcho::Preload(id));
            }
            entry.definition.clone()
        };

        self.adapter
            .backend_mut()
            .unload_preload(id, &definition)
            .with_context(|| format!("unloading preload request '{}'", definition.name))?;
        write(&self.controls).set_preload_loaded(id, false);
        Ok(RequestEcho::Preload(id))
    }

    /// Unloads and forgets the preload requests of a scope.
    fn clear_preloads(&mut self, scope: DataScope) {
        let removed = write(&self.controls).clear_preloads(scope);
        let backend = self.adapter.backend_mut();
        for (id, entry) in removed {
            if let Err(e) = backend.unload_preload(id, &entry.definition) {
                log::warn!(
                    "Failed to unload preload request '{}': {:#}",
                    entry.definition.name,
                    e
                );
            }
        }
    }

    fn reserve_object(&mut self, name: &str) -> anyhow::Result<RequestEcho> {
        let block = lock(&self.pool).allocate(AudioObject::footprint(name))?;
        let id = self.objects.reserve(name, Some(block));

        if let Err(e) = self.adapter.backend_mut().register_object(id, name) {
            // The pool block stays charged until the next cleanup.
            let _ = self.objects.release(id);
            return Err(e.context(format!("registering audio object '{}'", name)));
        }
        Ok(RequestEcho::ObjectReserved(id))
    }

    fn refresh(
        &mut self,
        level_name: Option<&str>,
        follow_ups: &mut Vec<AudioRequest>,
    ) -> anyhow::Result<()> {
        log::info!("Refreshing audio system data");

        self.stop_all_sounds(follow_ups)?;
        self.release_implementation_data();

        let config_path = self.desc.config_path.clone();
        self.parse_controls(&config_path, DataScope::Global)?;
        self.parse_preloads(&config_path, DataScope::Global)?;
        self.load_preload(PreloadRequestId::global(), false)?;

        if let Some(level) = level_name.filter(|name| is_loaded_level(name)) {
            let level_path = self.desc.level_path(level);
            self.parse_controls(&level_path, DataScope::LevelSpecific)?;
            self.parse_preloads(&level_path, DataScope::LevelSpecific)?;

            let level_preload = read(&self.controls).preload_request_id(level);
            if let Some(id) = level_preload {
                self.load_preload(id, true)?;
            }
        }
        Ok(())
    }

    fn reload_controls(&mut self, folder: &Path, level_name: Option<&str>) -> anyhow::Result<()> {
        write(&self.controls).clear_controls(DataScope::All);
        self.parse_controls(folder, DataScope::Global)?;

        if let Some(level) = level_name.filter(|name| is_loaded_level(name)) {
            let level_path = folder.join("levels").join(level);
            self.parse_controls(&level_path, DataScope::LevelSpecific)?;
        }
        self.retrigger()
    }

    /// Brings the backend up to date with the state of every object and
    /// restarts the trigger instances that were running.
    fn retrigger(&mut self) -> anyhow::Result<()> {
        let backend = self.adapter.backend_mut();
        let controls = read(&self.controls);
        let mut failures = 0usize;

        for id in self.objects.ids() {
            let Some(object) = self.objects.get_mut(id) else {
                continue;
            };

            let mut results = vec![
                backend.set_object_transformation(id, &object.transformation),
                backend.set_volume(id, object.volume),
            ];
            for (rtpc, value) in &object.rtpcs {
                results.push(backend.set_rtpc(id, *rtpc, *value));
            }
            for (switch, state) in &object.switches {
                results.push(backend.set_switch_state(id, *switch, *state));
            }
            for (environment, amount) in &object.environments {
                results.push(backend.set_environment(id, *environment, *amount));
            }

            for instance in object.trigger_instances().to_vec() {
                if !controls.has_trigger(instance.trigger) {
                    log::warn!(
                        "Dropping instance of {} on {}: trigger no longer defined",
                        instance.trigger,
                        id
                    );
                    object.remove_instance(instance.id);
                    for event in &instance.events {
                        self.events.remove(event);
                    }
                    continue;
                }
                for event in &instance.events {
                    results.push(backend.activate_trigger(id, &instance, *event));
                }
            }

            for result in results {
                if let Err(e) = result {
                    log::warn!("Failed to retrigger state of {}: {:#}", id, e);
                    failures += 1;
                }
            }
        }

        ensure!(failures == 0, "{} operations failed while retriggering", failures);
        Ok(())
    }

    fn lose_focus(&mut self) -> anyhow::Result<()> {
        if !self.has_focus {
            return Ok(());
        }
        self.has_focus = false;

        let backend = self.adapter.backend_mut();
        backend.on_lose_focus()?;
        if self.desc.mute_on_focus_loss {
            backend.mute_all()?;
        }
        Ok(())
    }

    fn get_focus(&mut self) -> anyhow::Result<()> {
        if self.has_focus {
            return Ok(());
        }
        self.has_focus = true;

        let backend = self.adapter.backend_mut();
        if self.desc.mute_on_focus_loss && !self.muted {
            backend.unmute_all()?;
        }
        backend.on_get_focus()?;
        Ok(())
    }

    fn stop_all_sounds(&mut self, follow_ups: &mut Vec<AudioRequest>) -> anyhow::Result<()> {
        self.adapter.backend_mut().stop_all_sounds()?;

        for object in self.objects.iter_mut() {
            let id = object.id();
            for instance in object.take_all_instances() {
                for event in &instance.events {
                    self.events.remove(event);
                }
                follow_ups.push(finished_instance(id, instance.trigger));
            }
            for file in object.take_all_files() {
                follow_ups.push(stopped_file(id, &file));
            }
        }
        Ok(())
    }

    fn execute_object(
        &mut self,
        target: AudioObjectId,
        request: &ObjectRequest,
        follow_ups: &mut Vec<AudioRequest>,
    ) -> anyhow::Result<RequestEcho> {
        let backend = self.adapter.backend_mut();
        let controls = read(&self.controls);
        let object = self
            .objects
            .get_mut(target)
            .ok_or_else(|| SonarchError::UnknownObject(target.to_string()))?;

        match request {
            ObjectRequest::PrepareTrigger { trigger } => {
                ensure!(controls.has_trigger(*trigger), "unknown trigger {}", trigger);
                backend.prepare_trigger(target, *trigger)?;
                Ok(RequestEcho::None)
            }
            ObjectRequest::UnprepareTrigger { trigger } => {
                ensure!(controls.has_trigger(*trigger), "unknown trigger {}", trigger);
                backend.unprepare_trigger(target, *trigger)?;
                Ok(RequestEcho::None)
            }
            ObjectRequest::ExecuteTrigger {
                trigger,
                removal_timeout_ms,
            } => {
                ensure!(controls.has_trigger(*trigger), "unknown trigger {}", trigger);
                let event = EventId(self.event_ids.next());
                let instance = TriggerInstance {
                    id: TriggerInstanceId(self.instance_ids.next()),
                    trigger: *trigger,
                    events: vec![event],
                    removal_timeout_ms: *removal_timeout_ms,
                };

                backend.activate_trigger(target, &instance, event)?;
                let instance_id = instance.id;
                object.add_instance(instance);
                self.events.insert(event, target);

                Ok(RequestEcho::TriggerExecuted {
                    trigger: *trigger,
                    instance: instance_id,
                    event,
                })
            }
            ObjectRequest::StopTrigger { trigger } => {
                let instances = object.take_instances_of(*trigger);
                let failures =
                    stop_instances(backend, &mut self.events, target, instances, follow_ups);
                ensure!(
                    failures == 0,
                    "{} events of {} could not be stopped on {}",
                    failures,
                    trigger,
                    target
                );
                Ok(RequestEcho::None)
            }
            ObjectRequest::StopAllTriggers => {
                let instances = object.take_all_instances();
                let failures =
                    stop_instances(backend, &mut self.events, target, instances, follow_ups);
                ensure!(
                    failures == 0,
                    "{} events could not be stopped on {}",
                    failures,
                    target
                );
                Ok(RequestEcho::None)
            }
            ObjectRequest::PlayFile {
                path,
                localized,
                trigger,
            } => {
                let file = FileInstanceId(self.file_ids.next());
                backend.play_file(target, file, path, *localized)?;
                object.add_file(PlayingFile {
                    id: file,
                    path: path.clone(),
                    localized: *localized,
                    trigger: *trigger,
                });
                Ok(RequestEcho::FileStarted {
                    file,
                    path: path.clone(),
                })
            }
            ObjectRequest::StopFile { path } => {
                let file = object
                    .file_by_path(path)
                    .map(|file| file.id)
                    .ok_or_else(|| anyhow!("'{}' is not playing on {}", path, target))?;
                backend.stop_file(target, file)?;
                object.remove_file(file);
                Ok(RequestEcho::FileStopped {
                    file,
                    path: path.clone(),
                })
            }
            ObjectRequest::SetTransformation(transformation) => {
                object.transformation = *transformation;
                backend.set_object_transformation(target, transformation)?;
                Ok(RequestEcho::None)
            }
            ObjectRequest::SetRtpcValue { rtpc, value } => {
                ensure!(controls.has_rtpc(*rtpc), "unknown RTPC {}", rtpc);
                object.rtpcs.insert(*rtpc, *value);
                backend.set_rtpc(target, *rtpc, *value)?;
                Ok(RequestEcho::None)
            }
            ObjectRequest::SetSwitchState { switch, state } => {
                ensure!(
                    controls.has_switch_state(*switch, *state),
                    "unknown state {} of {}",
                    state,
                    switch
                );
                object.switches.insert(*switch, *state);
                backend.set_switch_state(target, *switch, *state)?;
                Ok(RequestEcho::None)
            }
            ObjectRequest::SetVolume { volume } => {
                object.volume = *volume;
                backend.set_volume(target, *volume)?;
                Ok(RequestEcho::None)
            }
            ObjectRequest::SetEnvironmentAmount {
                environment,
                amount,
            } => {
                ensure!(
                    controls.has_environment(*environment),
                    "unknown environment {}",
                    environment
                );
                let amount = amount.clamp(0.0, 1.0);
                if amount > 0.0 {
                    object.environments.insert(*environment, amount);
                } else {
                    object.environments.remove(environment);
                }
                backend.set_environment(target, *environment, amount)?;
                Ok(RequestEcho::None)
            }
            ObjectRequest::ResetEnvironments => {
                for (environment, _) in object.environments.drain() {
                    backend.set_environment(target, environment, 0.0)?;
                }
                Ok(RequestEcho::None)
            }
            ObjectRequest::ReleaseObject => {
                ensure!(
                    target != AudioObjectId::GLOBAL,
                    "the global audio object cannot be released"
                );
                let instances = object.take_all_instances();
                let mut failures =
                    stop_instances(backend, &mut self.events, target, instances, follow_ups);
                for file in object.take_all_files() {
                    if let Err(e) = backend.stop_file(target, file.id) {
                        log::warn!("Failed to stop '{}' on {}: {:#}", file.path, target, e);
                        failures += 1;
                    }
                    follow_ups.push(stopped_file(target, &file));
                }
                if let Err(e) = backend.unregister_object(target) {
                    log::warn!("Failed to unregister {} from the backend: {:#}", target, e);
                    failures += 1;
                }

                // The object goes away either way; its pool charge stays until the next cleanup.
                self.objects.release(target)?;
                ensure!(
                    failures == 0,
                    "{} backend calls failed while releasing {}",
                    failures,
                    target
                );
                Ok(RequestEcho::None)
            }
            ObjectRequest::ProcessPhysicsRay(ray) => {
                object.rays.record(ray);
                backend.set_obstruction_occlusion(target, object.rays.values())?;
                Ok(RequestEcho::None)
            }
        }
    }

    /// Object a callback request is about.
    fn callback_object(
        &self,
        request: &CallbackRequest,
        addressed: Option<AudioObjectId>,
    ) -> Option<AudioObjectId> {
        match request {
            CallbackRequest::ReportStartedEvent { event }
            | CallbackRequest::ReportFinishedEvent { event, .. }
            | CallbackRequest::ReportVirtualizedEvent { event }
            | CallbackRequest::ReportPhysicalizedEvent { event } => {
                self.events.get(event).copied().or(addressed)
            }
            CallbackRequest::ReportStartedFile { file, .. }
            | CallbackRequest::ReportStoppedFile { file, .. } => {
                addressed.or_else(|| self.file_owner(*file))
            }
            CallbackRequest::ReportFinishedTriggerInstance { .. } => addressed,
        }
    }

    fn file_owner(&self, file: FileInstanceId) -> Option<AudioObjectId> {
        self.objects
            .iter()
            .find(|object| object.files().iter().any(|playing| playing.id == file))
            .map(AudioObject::id)
    }

    fn execute_callback(
        &mut self,
        request: &CallbackRequest,
        object: Option<AudioObjectId>,
        follow_ups: &mut Vec<AudioRequest>,
    ) -> anyhow::Result<RequestEcho> {
        match request {
            CallbackRequest::ReportStartedEvent { event } => {
                ensure!(self.events.contains_key(event), "unknown {}", event);
                Ok(RequestEcho::Event(*event))
            }
            CallbackRequest::ReportFinishedEvent { event, success } => {
                if !success {
                    log::debug!("{} finished unsuccessfully", event);
                }
                let Some(owner) = self.events.remove(event) else {
                    // Stopping a trigger forgets its events before the backend reports them.
                    log::debug!("Ignoring finish report of unknown {}", event);
                    return Ok(RequestEcho::Event(*event));
                };
                let finished = self
                    .objects
                    .get_mut(owner)
                    .and_then(|object| object.finish_event(*event));
                if let Some(finished) = finished.filter(|f| f.instance_finished) {
                    follow_ups.push(finished_instance(owner, finished.trigger));
                }
                Ok(RequestEcho::Event(*event))
            }
            CallbackRequest::ReportFinishedTriggerInstance { trigger } => {
                Ok(RequestEcho::TriggerFinished(*trigger))
            }
            CallbackRequest::ReportStartedFile {
                file,
                path,
                success,
            } => {
                if !success {
                    if let Some(object) = object.and_then(|id| self.objects.get_mut(id)) {
                        object.remove_file(*file);
                    }
                    bail!("'{}' failed to start", path);
                }
                Ok(RequestEcho::FileStarted {
                    file: *file,
                    path: path.clone(),
                })
            }
            CallbackRequest::ReportStoppedFile { file, path } => {
                let removed = object
                    .and_then(|id| self.objects.get_mut(id))
                    .and_then(|object| object.remove_file(*file));
                if let (Some(owner), Some(trigger)) =
                    (object, removed.and_then(|playing| playing.trigger))
                {
                    follow_ups.push(finished_instance(owner, trigger));
                }
                Ok(RequestEcho::FileStopped {
                    file: *file,
                    path: path.clone(),
                })
            }
            CallbackRequest::ReportVirtualizedEvent { event }
            | CallbackRequest::ReportPhysicalizedEvent { event } => {
                let virtualized = matches!(request, CallbackRequest::ReportVirtualizedEvent { .. });
                let object = object
                    .filter(|_| self.events.contains_key(event))
                    .and_then(|id| self.objects.get_mut(id))
                    .ok_or_else(|| anyhow!("unknown {}", event))?;
                object.set_virtualized(*event, virtualized);
                Ok(RequestEcho::Event(*event))
            }
        }
    }

    fn execute_listener(&mut self, request: &ListenerRequest) -> anyhow::Result<RequestEcho> {
        match request {
            ListenerRequest::SetTransformation {
                transformation,
                listener,
            } => {
                let id = listener.unwrap_or(ListenerId::DEFAULT);
                let state = self
                    .listeners
                    .get_mut(id)
                    .ok_or_else(|| SonarchError::UnknownListener(id.to_string()))?;
                state.transformation = *transformation;
                self.adapter
                    .backend_mut()
                    .set_listener_transformation(id, transformation)?;
                Ok(RequestEcho::Listener(id))
            }
        }
    }

    pub fn create_listener(&mut self) -> ListenerId {
        let id = self.listeners.create();
        if let Err(e) = self.adapter.backend_mut().register_listener(id) {
            log::warn!("Failed to register {} with the backend: {:#}", id, e);
        }
        id
    }

    pub fn release_listener(&mut self, id: ListenerId) -> crate::error::Result<()> {
        self.listeners.release(id)?;
        if let Err(e) = self.adapter.backend_mut().unregister_listener(id) {
            log::warn!("Failed to unregister {} from the backend: {:#}", id, e);
        }
        Ok(())
    }

    /// Charges every object to a freshly reset pool.
    pub fn recharge_objects(&mut self, pool: &mut AudioMemoryPool) {
        for object in self.objects.iter_mut() {
            match pool.allocate(AudioObject::footprint(object.name())) {
                Ok(block) => object.set_pool_block(Some(block)),
                Err(e) => {
                    log::error!("Could not re-charge {}: {}", object.id(), e);
                    object.set_pool_block(None);
                }
            }
        }
    }

    pub fn tick(&mut self, elapsed: Duration) {
        self.adapter.backend_mut().update(elapsed);
    }

    pub fn backend_name(&self) -> &str {
        self.adapter.name()
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus
    }

    pub fn shutdown(&mut self) {
        self.release_implementation_data();
        self.adapter.release();
    }
}

/// Stops the events of every instance and reports each instance finished,
/// whether the backend managed to stop it or not. Returns the number of
/// events the backend failed to stop.
fn stop_instances(
    backend: &mut dyn AudioBackend,
    events: &mut HashMap<EventId, AudioObjectId>,
    object: AudioObjectId,
    instances: Vec<TriggerInstance>,
    follow_ups: &mut Vec<AudioRequest>,
) -> usize {
    let mut failures = 0;
    for instance in instances {
        for event in &instance.events {
            events.remove(event);
            if let Err(e) = backend.stop_event(object, *event) {
                log::warn!(
                    "Failed to stop {} of {} on {}: {:#}",
                    event,
                    instance.trigger,
                    object,
                    e
                );
                failures += 1;
            }
        }
        follow_ups.push(finished_instance(object, instance.trigger));
    }
    failures
}

fn finished_instance(object: AudioObjectId, trigger: TriggerId) -> AudioRequest {
    AudioRequest::callback(CallbackRequest::ReportFinishedTriggerInstance { trigger })
        .on_object(object)
}

fn stopped_file(object: AudioObjectId, file: &PlayingFile) -> AudioRequest {
    AudioRequest::callback(CallbackRequest::ReportStoppedFile {
        file: file.id,
        path: file.path.clone(),
    })
    .on_object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendEnvironment, CallbackSink};
    use crate::controls::{ControlsData, PreloadDefinition, StaticControlsSource};
    use crate::ids::{RtpcId, SwitchId, SwitchStateId};
    use crate::math::{Transformation, Vec3};
    use crate::request::BackendSlot;

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
        fail_stops: bool,
    }

    impl AudioBackend for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn register_object(&mut self, object: AudioObjectId, name: &str) -> anyhow::Result<()> {
            lock(&self.calls).push(format!("register {} {}", object.value(), name));
            Ok(())
        }

        fn activate_trigger(
            &mut self,
            object: AudioObjectId,
            instance: &TriggerInstance,
            event: EventId,
        ) -> anyhow::Result<()> {
            lock(&self.calls).push(format!(
                "activate {} {} {} {}",
                object.value(),
                instance.trigger.value(),
                event.value(),
                instance.removal_timeout_ms
            ));
            Ok(())
        }

        fn stop_event(&mut self, _: AudioObjectId, event: EventId) -> anyhow::Result<()> {
            lock(&self.calls).push(format!("stop {}", event.value()));
            if self.fail_stops {
                bail!("device lost");
            }
            Ok(())
        }

        fn set_rtpc(&mut self, object: AudioObjectId, _: RtpcId, value: f32) -> anyhow::Result<()> {
            lock(&self.calls).push(format!("rtpc {} {}", object.value(), value));
            Ok(())
        }

        fn load_preload(
            &mut self,
            _: PreloadRequestId,
            definition: &PreloadDefinition,
        ) -> anyhow::Result<()> {
            lock(&self.calls).push(format!("preload {}", definition.name));
            Ok(())
        }
    }

    fn executor() -> Executor {
        let source = StaticControlsSource::new().with_folder(
            "audio",
            ControlsData::new()
                .trigger("play_music")
                .rtpc("speed")
                .switch("surface", &["grass", "stone"]),
            vec![PreloadDefinition::new("global_atl_preloads", true)],
        );
        Executor::new(
            SonarchSystemDesc::default(),
            BackendEnvironment::new("audio".into(), "english", CallbackSink::detached()),
            Arc::new(RwLock::new(ControlsRegistry::new())),
            Arc::new(source),
            Arc::new(RequestListenerRegistry::new()),
            Arc::new(Mutex::new(AudioMemoryPool::new("test", 64 * 1024).unwrap())),
        )
    }

    fn run(executor: &mut Executor, request: AudioRequest) -> Execution {
        executor.execute(&request)
    }

    fn parse_global(executor: &mut Executor) {
        let execution = run(
            executor,
            AudioRequest::manager(ManagerRequest::ParseControlsData {
                folder: "audio".into(),
                scope: DataScope::Global,
            }),
        );
        assert!(execution.info.status.is_success());
    }

    fn reserve(executor: &mut Executor, name: &str) -> AudioObjectId {
        run(
            executor,
            AudioRequest::manager(ManagerRequest::ReserveObjectId { name: name.into() }),
        )
        .info
        .reserved_object()
        .unwrap()
    }

    #[test]
    fn test_unknown_object_fails_without_panicking() {
        let mut executor = executor();
        let execution = run(
            &mut executor,
            AudioRequest::object(AudioObjectId(999), ObjectRequest::StopAllTriggers),
        );
        assert_eq!(execution.info.status, RequestStatus::Failure);
        assert_eq!(execution.info.object, Some(AudioObjectId(999)));
    }

    #[test]
    fn test_execute_trigger_requires_known_control() {
        let mut executor = executor();
        let play = ObjectRequest::ExecuteTrigger {
            trigger: TriggerId::from_name("play_music"),
            removal_timeout_ms: 0.0,
        };

        let before = run(&mut executor, AudioRequest::global(play.clone()));
        assert_eq!(before.info.status, RequestStatus::Failure);

        parse_global(&mut executor);
        let after = run(&mut executor, AudioRequest::global(play));
        assert!(after.info.status.is_success());
        assert!(matches!(
            after.info.echo,
            RequestEcho::TriggerExecuted { .. }
        ));
        let global = executor.objects().get(AudioObjectId::GLOBAL).unwrap();
        assert_eq!(global.trigger_instances().len(), 1);
    }

    #[test]
    fn test_finished_event_queues_trigger_instance_report() {
        let mut executor = executor();
        parse_global(&mut executor);
        let object = reserve(&mut executor, "radio");

        let execution = run(
            &mut executor,
            AudioRequest::object(
                object,
                ObjectRequest::ExecuteTrigger {
                    trigger: TriggerId::from_name("play_music"),
                    removal_timeout_ms: 0.0,
                },
            ),
        );
        let RequestEcho::TriggerExecuted { event, .. } = execution.info.echo else {
            panic!("unexpected echo {:?}", execution.info.echo);
        };

        let finished = run(
            &mut executor,
            AudioRequest::callback(CallbackRequest::ReportFinishedEvent {
                event,
                success: true,
            }),
        );
        assert_eq!(finished.info.object, Some(object));
        assert_eq!(finished.follow_ups.len(), 1);
        assert_eq!(
            finished.follow_ups[0].kind().name,
            "ReportFinishedTriggerInstance"
        );
        assert_eq!(finished.follow_ups[0].object, Some(object));
        assert!(!executor.objects().get(object).unwrap().is_playing());
    }

    #[test]
    fn test_switch_state_validation() {
        let mut executor = executor();
        parse_global(&mut executor);
        let surface = SwitchId::from_name("surface");

        let valid = run(
            &mut executor,
            AudioRequest::global(ObjectRequest::SetSwitchState {
                switch: surface,
                state: SwitchStateId::from_name("grass"),
            }),
        );
        assert!(valid.info.status.is_success());

        let invalid = run(
            &mut executor,
            AudioRequest::global(ObjectRequest::SetSwitchState {
                switch: surface,
                state: SwitchStateId::from_name("water"),
            }),
        );
        assert_eq!(invalid.info.status, RequestStatus::Failure);
    }

    #[test]
    fn test_new_backend_gets_objects_and_retriggered_instances() {
        let mut executor = executor();
        parse_global(&mut executor);
        let object = reserve(&mut executor, "radio");
        run(
            &mut executor,
            AudioRequest::object(
                object,
                ObjectRequest::SetRtpcValue {
                    rtpc: RtpcId::from_name("speed"),
                    value: 0.5,
                },
            ),
        );
        let execution = run(
            &mut executor,
            AudioRequest::object(
                object,
                ObjectRequest::ExecuteTrigger {
                    trigger: TriggerId::from_name("play_music"),
                    removal_timeout_ms: 0.0,
                },
            ),
        );
        let RequestEcho::TriggerExecuted { event, .. } = execution.info.echo else {
            panic!("unexpected echo {:?}", execution.info.echo);
        };

        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        let installed = run(
            &mut executor,
            AudioRequest::manager(ManagerRequest::SetImplementation(BackendSlot::new(
                Box::new(recorder),
            ))),
        );
        assert!(installed.info.status.is_success());
        assert_eq!(executor.backend_name(), "recorder");
        // Swapping drops the controls of the previous implementation.
        assert_eq!(read(&executor.controls).trigger_count(), 0);

        parse_global(&mut executor);
        let retrigger = run(
            &mut executor,
            AudioRequest::manager(ManagerRequest::RetriggerAudioControls),
        );
        assert!(retrigger.info.status.is_success());

        let calls = lock(&calls).clone();
        assert!(calls.contains(&format!("register {} radio", object.value())));
        assert!(calls.contains(&format!("rtpc {} 0.5", object.value())));
        assert!(calls.contains(&format!(
            "activate {} {} {} 0",
            object.value(),
            TriggerId::from_name("play_music").value(),
            event.value()
        )));
    }

    fn install(executor: &mut Executor, recorder: Recorder) {
        let installed = run(
            executor,
            AudioRequest::manager(ManagerRequest::SetImplementation(BackendSlot::new(
                Box::new(recorder),
            ))),
        );
        assert!(installed.info.status.is_success());
    }

    fn execute_music(executor: &mut Executor, object: AudioObjectId, timeout: f32) -> EventId {
        let execution = run(
            executor,
            AudioRequest::object(
                object,
                ObjectRequest::ExecuteTrigger {
                    trigger: TriggerId::from_name("play_music"),
                    removal_timeout_ms: timeout,
                },
            ),
        );
        match execution.info.echo {
            RequestEcho::TriggerExecuted { event, .. } => event,
            other => panic!("unexpected echo {:?}", other),
        }
    }

    #[test]
    fn test_removal_timeout_reaches_the_backend_on_retrigger() {
        let mut executor = executor();
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        install(&mut executor, recorder);
        parse_global(&mut executor);

        let event = execute_music(&mut executor, AudioObjectId::GLOBAL, 250.0);
        let retrigger = run(
            &mut executor,
            AudioRequest::manager(ManagerRequest::RetriggerAudioControls),
        );
        assert!(retrigger.info.status.is_success());

        let expected = format!(
            "activate {} {} {} 250",
            AudioObjectId::GLOBAL.value(),
            TriggerId::from_name("play_music").value(),
            event.value()
        );
        let activations = lock(&calls).iter().filter(|call| **call == expected).count();
        assert_eq!(activations, 2);
    }

    #[test]
    fn test_failed_stop_still_stops_and_reports_every_instance() {
        let mut executor = executor();
        let recorder = Recorder {
            fail_stops: true,
            ..Recorder::default()
        };
        let calls = recorder.calls.clone();
        install(&mut executor, recorder);
        parse_global(&mut executor);

        let first = execute_music(&mut executor, AudioObjectId::GLOBAL, 0.0);
        let second = execute_music(&mut executor, AudioObjectId::GLOBAL, 0.0);
        let stop = run(
            &mut executor,
            AudioRequest::global(ObjectRequest::StopAllTriggers),
        );

        assert_eq!(stop.info.status, RequestStatus::Failure);
        let calls = lock(&calls).clone();
        assert!(calls.contains(&format!("stop {}", first.value())));
        assert!(calls.contains(&format!("stop {}", second.value())));
        assert_eq!(stop.follow_ups.len(), 2);
        assert!(
            stop.follow_ups
                .iter()
                .all(|follow_up| follow_up.kind().name == "ReportFinishedTriggerInstance")
        );
        let global = executor.objects().get(AudioObjectId::GLOBAL).unwrap();
        assert!(!global.is_playing());
    }

    #[test]
    fn test_failed_stop_on_release_still_releases() {
        let mut executor = executor();
        let recorder = Recorder {
            fail_stops: true,
            ..Recorder::default()
        };
        install(&mut executor, recorder);
        parse_global(&mut executor);
        let object = reserve(&mut executor, "radio");
        execute_music(&mut executor, object, 0.0);

        let released = run(
            &mut executor,
            AudioRequest::object(object, ObjectRequest::ReleaseObject),
        );
        assert_eq!(released.info.status, RequestStatus::Failure);
        assert!(!executor.objects().contains(object));
        assert_eq!(released.follow_ups.len(), 1);
        assert_eq!(released.follow_ups[0].object, Some(object));
    }

    #[test]
    fn test_preload_auto_load_only_and_refresh() {
        let mut executor = executor();
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        run(
            &mut executor,
            AudioRequest::manager(ManagerRequest::SetImplementation(BackendSlot::new(
                Box::new(recorder),
            ))),
        );

        let refresh = run(
            &mut executor,
            AudioRequest::manager(ManagerRequest::RefreshAudioSystem { level_name: None }),
        );
        assert!(refresh.info.status.is_success());
        assert!(lock(&calls).contains(&"preload global_atl_preloads".to_string()));
        assert_eq!(
            read(&executor.controls).loaded_preloads(DataScope::Global),
            vec![PreloadRequestId::global()]
        );

        let missing = run(
            &mut executor,
            AudioRequest::manager(ManagerRequest::PreloadSingleRequest {
                id: PreloadRequestId::from_name("nope"),
                auto_load_only: false,
            }),
        );
        assert_eq!(missing.info.status, RequestStatus::Failure);
    }

    #[test]
    fn test_release_object_and_global_refusal() {
        let mut executor = executor();
        let object = reserve(&mut executor, "door");
        let released = run(
            &mut executor,
            AudioRequest::object(object, ObjectRequest::ReleaseObject),
        );
        assert!(released.info.status.is_success());
        assert!(!executor.objects().contains(object));

        let global = run(&mut executor, AudioRequest::global(ObjectRequest::ReleaseObject));
        assert_eq!(global.info.status, RequestStatus::Failure);
    }

    #[test]
    fn test_listener_transformation() {
        let mut executor = executor();
        let transformation = Transformation::from_position(Vec3::new(0.0, 2.0, 0.0));
        let execution = run(
            &mut executor,
            AudioRequest::listener(ListenerRequest::SetTransformation {
                transformation,
                listener: None,
            }),
        );
        assert_eq!(execution.info.echo, RequestEcho::Listener(ListenerId::DEFAULT));
        assert_eq!(
            executor
                .listeners()
                .get(ListenerId::DEFAULT)
                .unwrap()
                .transformation,
            transformation
        );

        let unknown = run(
            &mut executor,
            AudioRequest::listener(ListenerRequest::SetTransformation {
                transformation,
                listener: Some(ListenerId(77)),
            }),
        );
        assert_eq!(unknown.info.status, RequestStatus::Failure);
    }

    #[test]
    fn test_focus_loss_is_idempotent() {
        let mut executor = executor();
        run(&mut executor, AudioRequest::manager(ManagerRequest::LoseFocus));
        run(&mut executor, AudioRequest::manager(ManagerRequest::LoseFocus));
        assert!(!executor.has_focus());
        run(&mut executor, AudioRequest::manager(ManagerRequest::GetFocus));
        assert!(executor.has_focus());
    }
}
