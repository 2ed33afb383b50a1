use super::AudioBackend;
use crate::config::NULL_IMPLEMENTATION_NAME;

/// Backend that accepts every operation and produces no sound.
///
/// Installed whenever no other backend is, so the audio system always has
/// one to forward to. Triggers activated on it never report back, which
/// keeps their instances alive until a real backend retriggers them.
#[derive(Debug, Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        NULL_IMPLEMENTATION_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AudioObjectId, EventId, TriggerId, TriggerInstanceId};
    use crate::object::TriggerInstance;

    #[test]
    fn test_every_operation_succeeds() {
        let mut backend = NullBackend::new();
        assert_eq!(backend.name(), "null");
        assert!(backend.mute_all().is_ok());
        let instance = TriggerInstance {
            id: TriggerInstanceId(1),
            trigger: TriggerId(2),
            events: vec![EventId(3)],
            removal_timeout_ms: 0.0,
        };
        assert!(
            backend
                .activate_trigger(AudioObjectId(1), &instance, EventId(3))
                .is_ok()
        );
        assert!(backend.shutdown().is_ok());
    }
}
