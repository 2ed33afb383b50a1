use crate::backend::BackendFactory;
use crate::config::SonarchSystemDesc;
use crate::controls::ControlsDataSource;
use crate::error::Result;
use crate::events::{SystemEventDispatcher, SystemEventListenerHandle};
use crate::host::HostEnvironment;
use crate::implementation::{ImplementationSwitcher, SwapOutcome};
use crate::lifecycle::LifecycleBridge;
use crate::system::SonarchSystem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Entry point wiring the audio system into a host engine.
///
/// Owns the system, the implementation switcher and the lifecycle bridge
/// registration. Driving the queue is left to the caller, either through an
/// [`AudioThread`](crate::AudioThread) or [`SonarchSystem::external_update`].
pub struct SonarchModule {
    system: Arc<SonarchSystem>,
    switcher: ImplementationSwitcher,
    dispatcher: Arc<SystemEventDispatcher>,
    bridge: SystemEventListenerHandle,
    shut_down: AtomicBool,
}

impl SonarchModule {
    /// Creates the audio system and loads the configured implementation.
    ///
    /// # Arguments
    ///
    /// * `desc` - System configuration; a zero pool capacity is rejected
    /// * `factory` - Loads implementations by name
    /// * `controls` - Source of controls and preloads data
    /// * `host` - Level and view information of the engine
    /// * `dispatcher` - Engine event dispatcher the lifecycle bridge registers with
    ///
    /// # Returns
    ///
    /// The module with its implementation loaded. An implementation that fails
    /// to load leaves the null implementation active and is not an error.
    pub fn initialize(
        desc: SonarchSystemDesc,
        factory: Arc<dyn BackendFactory>,
        controls: Arc<dyn ControlsDataSource>,
        host: Arc<dyn HostEnvironment>,
        dispatcher: Arc<SystemEventDispatcher>,
    ) -> Result<Self> {
        desc.validate()?;
        let requested = desc.requested_implementation().map(str::to_string);

        let system = Arc::new(SonarchSystem::new(desc, controls)?);
        let switcher =
            ImplementationSwitcher::new(system.clone(), factory, host, dispatcher.clone());

        let outcome = switcher.load_initial(requested.as_deref());
        if !outcome.is_success() {
            log::error!(
                "Audio implementation '{}' could not be loaded, running the null implementation",
                requested.as_deref().unwrap_or_default()
            );
        }

        let bridge = dispatcher.register(Arc::new(LifecycleBridge::new(system.clone())));
        log::info!(
            "Audio system initialized with implementation '{}'",
            system.active_backend_name()
        );

        Ok(Self {
            system,
            switcher,
            dispatcher,
            bridge,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Called when the configured implementation name changes.
    pub fn on_implementation_changed(&self, name: Option<&str>) -> SwapOutcome {
        self.switcher.set_implementation(name)
    }

    pub fn system(&self) -> &Arc<SonarchSystem> {
        &self.system
    }

    pub fn dispatcher(&self) -> &Arc<SystemEventDispatcher> {
        &self.dispatcher
    }

    /// Name of the loaded implementation module, None for the null implementation.
    pub fn current_implementation(&self) -> Option<String> {
        self.switcher.current()
    }

    /// Unregisters the lifecycle bridge, shuts the system down and unloads the
    /// implementation module.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispatcher.unregister(self.bridge);
        self.system.shutdown();
        self.switcher.unload_current();
    }
}

impl Drop for SonarchModule {
    fn drop(&mut self) {
        self.shutdown();
    }
}
