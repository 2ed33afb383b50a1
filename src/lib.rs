//! Sonarch: audio request dispatch with hot-swappable audio implementations.
//!
//! Engine threads push [`AudioRequest`]s into a [`SonarchSystem`]; an
//! [`AudioThread`] (or the main thread through
//! [`SonarchSystem::external_update`]) executes them in priority order against
//! the active [`AudioBackend`]. The backend can be replaced at runtime through
//! [`SonarchModule::on_implementation_changed`], which replays controls,
//! preloads, the listener and running triggers on the new backend.

pub mod adapter;
pub mod audio_thread;
pub mod backend;
pub mod config;
pub mod controls;
pub mod error;
pub mod events;
mod executor;
pub mod host;
pub mod ids;
pub mod implementation;
pub mod lifecycle;
pub mod listener;
pub mod math;
pub mod module;
pub mod object;
pub mod pool;
pub mod queue;
pub mod ray;
pub mod request;
pub mod request_listener;
mod sync;
pub mod system;

pub use audio_thread::AudioThread;
pub use backend::{AudioBackend, BackendEnvironment, BackendFactory, BackendRegistry, NullBackend};
pub use config::SonarchSystemDesc;
pub use controls::{ControlsData, ControlsDataSource, PreloadDefinition, StaticControlsSource};
pub use error::{Result, SonarchError};
pub use events::{SystemEvent, SystemEventDispatcher, SystemEventListener};
pub use host::{HostEnvironment, StaticHost};
pub use ids::{
    AudioObjectId, EnvironmentId, EventId, ListenerId, PreloadRequestId, RtpcId, SwitchId,
    SwitchStateId, TriggerId,
};
pub use implementation::{ImplementationSwitcher, SwapOutcome};
pub use lifecycle::LifecycleBridge;
pub use math::Transformation;
pub use module::SonarchModule;
pub use request::{
    AudioRequest, CallbackRequest, DataScope, ListenerRequest, ManagerRequest, ObjectRequest,
    RequestFlags, RequestInfo, RequestStatus,
};
pub use request_listener::RequestFilter;
pub use system::{PushOutcome, SonarchSystem};
