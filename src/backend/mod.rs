//! Audio implementation contract.
//!
//! An [`AudioBackend`] is the middleware-specific part of the audio system.
//! Every operation has a default body that succeeds without doing anything,
//! so a backend only overrides what its middleware supports and the
//! [`NullBackend`] is a backend that overrides nothing.

mod factory;
mod null;

pub use factory::{BackendConstructor, BackendFactory, BackendRegistry};
pub use null::NullBackend;

use crate::controls::PreloadDefinition;
use crate::ids::{
    AudioObjectId, EnvironmentId, EventId, FileInstanceId, ListenerId, PreloadRequestId, RtpcId,
    SwitchId, SwitchStateId, TriggerId,
};
use crate::math::Transformation;
use crate::object::TriggerInstance;
use crate::ray::ObstructionOcclusion;
use crate::request::{AudioRequest, CallbackRequest};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::time::Duration;

/// Channel a backend uses to report its own events back to the audio system.
///
/// Reports are queued as callback requests and executed like any other
/// request on the next update.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    sender: Sender<AudioRequest>,
}

impl CallbackSink {
    pub(crate) fn new(sender: Sender<AudioRequest>) -> Self {
        Self { sender }
    }

    /// Sink whose reports go nowhere.
    pub fn detached() -> Self {
        let (sender, _) = crossbeam_channel::unbounded();
        Self { sender }
    }

    pub fn report(&self, request: CallbackRequest) {
        if self.sender.send(AudioRequest::callback(request)).is_err() {
            log::debug!("Dropping backend report: audio system is gone");
        }
    }

    /// Reports an event of a specific object.
    pub fn report_on(&self, object: AudioObjectId, request: CallbackRequest) {
        let request = AudioRequest::callback(request).on_object(object);
        if self.sender.send(request).is_err() {
            log::debug!("Dropping backend report: audio system is gone");
        }
    }
}

/// What a backend receives when it is initialized.
#[derive(Debug, Clone)]
pub struct BackendEnvironment {
    pub config_path: PathBuf,
    pub language: String,
    pub callbacks: CallbackSink,
}

impl BackendEnvironment {
    pub fn new(config_path: PathBuf, language: &str, callbacks: CallbackSink) -> Self {
        Self {
            config_path,
            language: language.to_string(),
            callbacks,
        }
    }
}

/// A concrete audio middleware driven by the audio system.
///
/// All methods are called from the thread executing requests, one at a time.
/// Errors are reported back as failed requests; they never abort the system.
#[allow(unused_variables)]
pub trait AudioBackend: Send {
    fn name(&self) -> &str;

    fn initialize(&mut self, env: &BackendEnvironment) -> anyhow::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per audio-thread update after the queue was drained.
    fn update(&mut self, elapsed: Duration) {}

    fn on_lose_focus(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_get_focus(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn mute_all(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn unmute_all(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop_all_sounds(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_language(&mut self, language: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn register_object(&mut self, object: AudioObjectId, name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn unregister_object(&mut self, object: AudioObjectId) -> anyhow::Result<()> {
        Ok(())
    }

    fn prepare_trigger(&mut self, object: AudioObjectId, trigger: TriggerId) -> anyhow::Result<()> {
        Ok(())
    }

    fn unprepare_trigger(
        &mut self,
        object: AudioObjectId,
        trigger: TriggerId,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Starts `event` for an execution of `instance.trigger`. The event stays
    /// active until the backend reports it finished through its
    /// [`CallbackSink`]. A positive `instance.removal_timeout_ms` asks the
    /// backend to end the event after that long; how it does so is up to it.
    ///
    /// Called again with the same instance and event when running controls
    /// are retriggered on a new backend.
    fn activate_trigger(
        &mut self,
        object: AudioObjectId,
        instance: &TriggerInstance,
        event: EventId,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop_event(&mut self, object: AudioObjectId, event: EventId) -> anyhow::Result<()> {
        Ok(())
    }

    fn play_file(
        &mut self,
        object: AudioObjectId,
        file: FileInstanceId,
        path: &str,
        localized: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop_file(&mut self, object: AudioObjectId, file: FileInstanceId) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_object_transformation(
        &mut self,
        object: AudioObjectId,
        transformation: &Transformation,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_rtpc(&mut self, object: AudioObjectId, rtpc: RtpcId, value: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_switch_state(
        &mut self,
        object: AudioObjectId,
        switch: SwitchId,
        state: SwitchStateId,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_volume(&mut self, object: AudioObjectId, volume: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_environment(
        &mut self,
        object: AudioObjectId,
        environment: EnvironmentId,
        amount: f32,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_obstruction_occlusion(
        &mut self,
        object: AudioObjectId,
        values: ObstructionOcclusion,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn register_listener(&mut self, listener: ListenerId) -> anyhow::Result<()> {
        Ok(())
    }

    fn unregister_listener(&mut self, listener: ListenerId) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_listener_transformation(
        &mut self,
        listener: ListenerId,
        transformation: &Transformation,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn load_preload(
        &mut self,
        id: PreloadRequestId,
        definition: &PreloadDefinition,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn unload_preload(
        &mut self,
        id: PreloadRequestId,
        definition: &PreloadDefinition,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
