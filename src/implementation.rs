//! Runtime swapping of the audio implementation.
//!
//! A swap always goes through the null implementation: the running backend is
//! replaced by the null one and its module unloaded before the new module is
//! loaded. Once the new backend is up, the global and level data are parsed
//! and preloaded again, the listener is moved to the active view and every
//! running trigger is retriggered, so sounds continue on the new backend.

use crate::backend::BackendFactory;
use crate::config::{NULL_IMPLEMENTATION_NAME, normalize_implementation_name};
use crate::events::{SystemEvent, SystemEventDispatcher};
use crate::host::{HostEnvironment, is_loaded_level};
use crate::ids::PreloadRequestId;
use crate::request::{AudioRequest, BackendSlot, DataScope, ListenerRequest, ManagerRequest};
use crate::sync::lock;
use crate::system::SonarchSystem;
use std::sync::{Arc, Mutex};

/// Result of [`ImplementationSwitcher::set_implementation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The requested implementation was already active; nothing happened
    Unchanged,
    /// The requested implementation is active and its data was replayed
    Swapped { name: String },
    /// The requested implementation could not be loaded; the null one is active
    FellBack { requested: String },
}

impl SwapOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::FellBack { .. })
    }
}

pub struct ImplementationSwitcher {
    system: Arc<SonarchSystem>,
    factory: Arc<dyn BackendFactory>,
    host: Arc<dyn HostEnvironment>,
    events: Arc<SystemEventDispatcher>,
    /// Module currently loaded through the factory. Held for the whole swap.
    current: Mutex<Option<String>>,
}

impl ImplementationSwitcher {
    pub fn new(
        system: Arc<SonarchSystem>,
        factory: Arc<dyn BackendFactory>,
        host: Arc<dyn HostEnvironment>,
        events: Arc<SystemEventDispatcher>,
    ) -> Self {
        Self {
            system,
            factory,
            host,
            events,
            current: Mutex::new(None),
        }
    }

    /// Name of the loaded module, None while the null implementation runs.
    pub fn current(&self) -> Option<String> {
        lock(&self.current).clone()
    }

    /// Switches to the named implementation. `None`, `""` and `"null"` select
    /// the null implementation.
    pub fn set_implementation(&self, name: Option<&str>) -> SwapOutcome {
        let requested = normalize_implementation_name(name);
        let mut current = lock(&self.current);

        let unchanged = match (current.as_deref(), requested) {
            (None, None) => true,
            (Some(active), Some(requested)) => active.eq_ignore_ascii_case(requested),
            _ => false,
        };
        if unchanged {
            log::debug!(
                "Audio implementation '{}' is already active",
                requested.unwrap_or(NULL_IMPLEMENTATION_NAME)
            );
            return SwapOutcome::Unchanged;
        }

        let outcome = self.swap(&mut current, requested);
        drop(current);
        self.announce(&outcome, requested);
        outcome
    }

    /// Loads the first implementation. Unlike a swap this also runs when the
    /// null implementation is requested, so the global data gets parsed.
    pub(crate) fn load_initial(&self, name: Option<&str>) -> SwapOutcome {
        let requested = normalize_implementation_name(name);
        let mut current = lock(&self.current);
        let outcome = self.swap(&mut current, requested);
        drop(current);
        self.announce(&outcome, requested);
        outcome
    }

    /// Unloads the current module after the system released its backend.
    pub(crate) fn unload_current(&self) {
        if let Some(name) = lock(&self.current).take() {
            self.factory.unload(&name);
        }
    }

    fn swap(&self, current: &mut Option<String>, requested: Option<&str>) -> SwapOutcome {
        let target = requested.unwrap_or(NULL_IMPLEMENTATION_NAME);
        log::info!(
            "Switching audio implementation from '{}' to '{}'",
            current.as_deref().unwrap_or(NULL_IMPLEMENTATION_NAME),
            target
        );

        self.push(ManagerRequest::SetImplementation(BackendSlot::null()));
        if let Some(previous) = current.take() {
            self.factory.unload(&previous);
        }

        let loaded = match requested {
            None => true,
            Some(name) => self.load_module(name),
        };

        if !loaded {
            // Whether loading or initializing failed, end up on null with nothing loaded.
            self.push(ManagerRequest::SetImplementation(BackendSlot::null()));
            self.factory.unload(target);
            return SwapOutcome::FellBack {
                requested: target.to_string(),
            };
        }

        *current = requested.map(str::to_string);
        self.prepare_audio_system();
        SwapOutcome::Swapped {
            name: target.to_string(),
        }
    }

    fn load_module(&self, name: &str) -> bool {
        match self.factory.load(name) {
            Ok(backend) => self.push(ManagerRequest::SetImplementation(BackendSlot::new(backend))),
            Err(e) => {
                log::error!("Could not load audio implementation '{}': {:#}", name, e);
                false
            }
        }
    }

    /// Parses and preloads the global data, then the data of the loaded
    /// level, restores the listener and retriggers running controls.
    fn prepare_audio_system(&self) {
        let config_path = self.system.config_path().to_path_buf();
        self.push(ManagerRequest::ParseControlsData {
            folder: config_path.clone(),
            scope: DataScope::Global,
        });
        self.push(ManagerRequest::ParsePreloadsData {
            folder: config_path,
            scope: DataScope::Global,
        });
        self.push(ManagerRequest::PreloadSingleRequest {
            id: PreloadRequestId::global(),
            auto_load_only: false,
        });

        let level = self.host.current_level_name();
        if is_loaded_level(&level) {
            let level_path = self.system.desc().level_path(&level);
            self.push(ManagerRequest::ParseControlsData {
                folder: level_path.clone(),
                scope: DataScope::LevelSpecific,
            });
            self.push(ManagerRequest::ParsePreloadsData {
                folder: level_path,
                scope: DataScope::LevelSpecific,
            });
            if let Some(id) = self.system.get_audio_preload_request_id(&level) {
                self.push(ManagerRequest::PreloadSingleRequest {
                    id,
                    auto_load_only: true,
                });
            }
        }

        if let Some(transformation) = self.host.active_view_transformation() {
            self.push_request(AudioRequest::listener(ListenerRequest::SetTransformation {
                transformation,
                listener: None,
            }));
        }

        self.push(ManagerRequest::RetriggerAudioControls);
    }

    fn announce(&self, outcome: &SwapOutcome, requested: Option<&str>) {
        let name = requested.unwrap_or(NULL_IMPLEMENTATION_NAME).to_string();
        self.events.dispatch(SystemEvent::AudioImplementationLoaded {
            name,
            success: outcome.is_success(),
        });
    }

    fn push(&self, request: ManagerRequest) -> bool {
        self.push_request(AudioRequest::manager(request))
    }

    /// Pushes a high priority blocking request. Returns true if it succeeded.
    fn push_request(&self, request: AudioRequest) -> bool {
        let name = request.kind().name;
        match self.system.push_blocking(request.high_priority()) {
            Ok(info) if info.status.is_success() => true,
            Ok(_) => {
                log::warn!("{} failed during the implementation swap", name);
                false
            }
            Err(e) => {
                log::error!("Could not push {} during the implementation swap: {}", name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AudioBackend, BackendEnvironment};
    use crate::config::SonarchSystemDesc;
    use crate::controls::{ControlsData, PreloadDefinition, StaticControlsSource};
    use crate::host::StaticHost;
    use crate::ids::{AudioObjectId, EventId, ListenerId};
    use crate::math::{Transformation, Vec3};
    use crate::object::TriggerInstance;
    use crate::request::ObjectRequest;

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingBackend {
        name: String,
        fail_init: bool,
        log: Log,
    }

    impl RecordingBackend {
        fn record(&self, entry: String) {
            lock(&self.log).push(entry);
        }
    }

    impl AudioBackend for RecordingBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn initialize(&mut self, _env: &BackendEnvironment) -> anyhow::Result<()> {
            self.record(format!("init {}", self.name));
            if self.fail_init {
                anyhow::bail!("no output device");
            }
            Ok(())
        }

        fn shutdown(&mut self) -> anyhow::Result<()> {
            self.record(format!("shutdown {}", self.name));
            Ok(())
        }

        fn load_preload(
            &mut self,
            _: PreloadRequestId,
            definition: &PreloadDefinition,
        ) -> anyhow::Result<()> {
            self.record(format!("{} preload {}", self.name, definition.name));
            Ok(())
        }

        fn set_listener_transformation(
            &mut self,
            _: ListenerId,
            transformation: &Transformation,
        ) -> anyhow::Result<()> {
            self.record(format!(
                "{} listener {}",
                self.name, transformation.position.x
            ));
            Ok(())
        }

        fn activate_trigger(
            &mut self,
            _: AudioObjectId,
            instance: &TriggerInstance,
            event: EventId,
        ) -> anyhow::Result<()> {
            self.record(format!(
                "{} activate {} {}",
                self.name,
                instance.trigger.value(),
                event.value()
            ));
            Ok(())
        }
    }

    struct RecordingFactory {
        log: Log,
    }

    impl BackendFactory for RecordingFactory {
        fn load(&self, name: &str) -> anyhow::Result<Box<dyn AudioBackend>> {
            lock(&self.log).push(format!("load {}", name));
            if name == "missing" {
                anyhow::bail!("module not found");
            }
            Ok(Box::new(RecordingBackend {
                name: name.to_string(),
                fail_init: name == "broken",
                log: self.log.clone(),
            }))
        }

        fn unload(&self, name: &str) {
            lock(&self.log).push(format!("unload {}", name));
        }
    }

    struct Fixture {
        system: Arc<SonarchSystem>,
        host: Arc<StaticHost>,
        events: Arc<SystemEventDispatcher>,
        switcher: ImplementationSwitcher,
        log: Log,
    }

    fn fixture() -> Fixture {
        let source = StaticControlsSource::new()
            .with_folder(
                "audio",
                ControlsData::new().trigger("ambience"),
                vec![PreloadDefinition::new("global_atl_preloads", true)],
            )
            .with_folder(
                "audio/levels/forest",
                ControlsData::new().trigger("birds"),
                vec![PreloadDefinition::new("forest", true)],
            );
        let system =
            Arc::new(SonarchSystem::new(SonarchSystemDesc::default(), Arc::new(source)).unwrap());
        let host = Arc::new(StaticHost::new());
        let events = Arc::new(SystemEventDispatcher::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let switcher = ImplementationSwitcher::new(
            system.clone(),
            Arc::new(RecordingFactory { log: log.clone() }),
            host.clone(),
            events.clone(),
        );
        Fixture {
            system,
            host,
            events,
            switcher,
            log,
        }
    }

    fn take_log(log: &Log) -> Vec<String> {
        std::mem::take(&mut *lock(log))
    }

    #[test]
    fn test_swap_replays_data_in_order() {
        let f = fixture();
        f.host.set_level_name("forest");
        f.host
            .set_view_transformation(Some(Transformation::from_position(Vec3::new(
                3.0, 0.0, 0.0,
            ))));

        assert_eq!(
            f.switcher.set_implementation(Some("alpha")),
            SwapOutcome::Swapped {
                name: "alpha".into()
            }
        );
        let ambience = f.system.get_audio_trigger_id("ambience").unwrap();
        f.system
            .push_blocking(AudioRequest::global(ObjectRequest::ExecuteTrigger {
                trigger: ambience,
                removal_timeout_ms: 0.0,
            }))
            .unwrap();
        take_log(&f.log);
        f.events.poll_events();

        let outcome = f.switcher.set_implementation(Some("beta"));
        assert_eq!(
            outcome,
            SwapOutcome::Swapped {
                name: "beta".into()
            }
        );
        assert_eq!(
            take_log(&f.log),
            vec![
                "shutdown alpha".to_string(),
                "unload alpha".to_string(),
                "load beta".to_string(),
                "init beta".to_string(),
                // Registration of the existing default listener.
                "beta listener 3".to_string(),
                "beta preload global_atl_preloads".to_string(),
                "beta preload forest".to_string(),
                "beta listener 3".to_string(),
                format!("beta activate {} 1", ambience.value()),
            ]
        );
        assert_eq!(
            f.events.poll_events(),
            vec![SystemEvent::AudioImplementationLoaded {
                name: "beta".into(),
                success: true
            }]
        );
        assert_eq!(f.system.active_backend_name(), "beta");
        assert!(f.system.get_audio_trigger_id("birds").is_some());
    }

    #[test]
    fn test_same_implementation_is_unchanged() {
        let f = fixture();
        f.switcher.set_implementation(Some("alpha"));
        f.events.poll_events();
        take_log(&f.log);

        assert_eq!(
            f.switcher.set_implementation(Some("ALPHA")),
            SwapOutcome::Unchanged
        );
        assert_eq!(f.switcher.set_implementation(Some("null")), SwapOutcome::Swapped {
            name: "null".into()
        });
        assert_eq!(f.switcher.set_implementation(None), SwapOutcome::Unchanged);
        assert_eq!(f.events.poll_events().len(), 1);
    }

    #[test]
    fn test_failed_load_falls_back_to_null() {
        let f = fixture();
        f.switcher.set_implementation(Some("alpha"));
        f.events.poll_events();
        take_log(&f.log);

        let outcome = f.switcher.set_implementation(Some("missing"));
        assert_eq!(
            outcome,
            SwapOutcome::FellBack {
                requested: "missing".into()
            }
        );
        assert_eq!(
            take_log(&f.log),
            vec![
                "shutdown alpha".to_string(),
                "unload alpha".to_string(),
                "load missing".to_string(),
                "unload missing".to_string(),
            ]
        );
        assert_eq!(f.system.active_backend_name(), "null");
        assert_eq!(f.switcher.current(), None);
        assert_eq!(
            f.events.poll_events(),
            vec![SystemEvent::AudioImplementationLoaded {
                name: "missing".into(),
                success: false
            }]
        );
    }

    #[test]
    fn test_failed_init_falls_back_to_null() {
        let f = fixture();
        let outcome = f.switcher.set_implementation(Some("broken"));
        assert!(!outcome.is_success());
        assert_eq!(f.system.active_backend_name(), "null");
        assert!(take_log(&f.log).contains(&"unload broken".to_string()));

        // Retrying is a real swap again, not a no-op.
        assert_ne!(
            f.switcher.set_implementation(Some("broken")),
            SwapOutcome::Unchanged
        );
    }
}
