use sonarch::backend::CallbackSink;
use sonarch::object::TriggerInstance;
use sonarch::request::CallbackRequest;
use sonarch::{
    AudioBackend, AudioObjectId, BackendEnvironment, EventId, ListenerId, RtpcId, Transformation,
};
use std::time::Duration;

/// Backend that logs every call and finishes each event after a fixed time,
/// or after the removal timeout of its trigger instance when that is shorter.
pub struct LoggingBackend {
    name: String,
    event_length: Duration,
    callbacks: Option<CallbackSink>,
    playing: Vec<(AudioObjectId, EventId, Duration)>,
}

impl LoggingBackend {
    pub fn new(name: &str, event_length: Duration) -> Self {
        Self {
            name: name.to_string(),
            event_length,
            callbacks: None,
            playing: Vec::new(),
        }
    }
}

impl AudioBackend for LoggingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, env: &BackendEnvironment) -> anyhow::Result<()> {
        log::info!(
            "[{}] initialize (config: {}, language: {})",
            self.name,
            env.config_path.display(),
            env.language
        );
        self.callbacks = Some(env.callbacks.clone());
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        log::info!("[{}] shutdown with {} events playing", self.name, self.playing.len());
        self.playing.clear();
        self.callbacks = None;
        Ok(())
    }

    fn update(&mut self, elapsed: Duration) {
        let Some(callbacks) = &self.callbacks else {
            return;
        };
        self.playing.retain_mut(|(object, event, remaining)| {
            *remaining = remaining.saturating_sub(elapsed);
            if !remaining.is_zero() {
                return true;
            }
            callbacks.report_on(
                *object,
                CallbackRequest::ReportFinishedEvent {
                    event: *event,
                    success: true,
                },
            );
            false
        });
    }

    fn on_lose_focus(&mut self) -> anyhow::Result<()> {
        log::info!("[{}] lost focus", self.name);
        Ok(())
    }

    fn on_get_focus(&mut self) -> anyhow::Result<()> {
        log::info!("[{}] got focus", self.name);
        Ok(())
    }

    fn register_object(&mut self, object: AudioObjectId, name: &str) -> anyhow::Result<()> {
        log::info!("[{}] register {} '{}'", self.name, object, name);
        Ok(())
    }

    fn activate_trigger(
        &mut self,
        object: AudioObjectId,
        instance: &TriggerInstance,
        event: EventId,
    ) -> anyhow::Result<()> {
        log::info!(
            "[{}] {} starts {} on {}",
            self.name,
            instance.trigger,
            event,
            object
        );
        let length = if instance.removal_timeout_ms > 0.0 {
            self.event_length
                .min(Duration::from_secs_f32(instance.removal_timeout_ms / 1000.0))
        } else {
            self.event_length
        };
        self.playing.push((object, event, length));
        Ok(())
    }

    fn stop_event(&mut self, _object: AudioObjectId, event: EventId) -> anyhow::Result<()> {
        self.playing.retain(|(_, playing, _)| *playing != event);
        Ok(())
    }

    fn stop_all_sounds(&mut self) -> anyhow::Result<()> {
        self.playing.clear();
        Ok(())
    }

    fn set_rtpc(&mut self, object: AudioObjectId, rtpc: RtpcId, value: f32) -> anyhow::Result<()> {
        log::info!("[{}] {} = {} on {}", self.name, rtpc, value, object);
        Ok(())
    }

    fn set_listener_transformation(
        &mut self,
        listener: ListenerId,
        transformation: &Transformation,
    ) -> anyhow::Result<()> {
        log::info!(
            "[{}] {} moved to {}",
            self.name,
            listener,
            transformation.position
        );
        Ok(())
    }
}
