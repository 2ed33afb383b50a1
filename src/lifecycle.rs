use crate::events::{SystemEvent, SystemEventListener};
use crate::request::{AudioRequest, ManagerRequest};
use crate::system::SonarchSystem;
use std::sync::Arc;

/// Reacts to engine events on behalf of the audio system.
///
/// Level boundaries clean up the audio memory pool and focus changes push
/// `LoseFocus`/`GetFocus` with high priority.
pub struct LifecycleBridge {
    system: Arc<SonarchSystem>,
    lose_focus: AudioRequest,
    get_focus: AudioRequest,
}

impl LifecycleBridge {
    pub fn new(system: Arc<SonarchSystem>) -> Self {
        Self {
            system,
            lose_focus: AudioRequest::manager(ManagerRequest::LoseFocus).high_priority(),
            get_focus: AudioRequest::manager(ManagerRequest::GetFocus).high_priority(),
        }
    }

    fn push_focus(&self, focused: bool) {
        let request = if focused {
            self.get_focus.clone()
        } else {
            self.lose_focus.clone()
        };
        if let Err(e) = self.system.push_request(request) {
            log::warn!("Could not push focus change: {}", e);
        }
    }
}

impl SystemEventListener for LifecycleBridge {
    fn on_system_event(&self, event: &SystemEvent) {
        if event.is_level_boundary() {
            log::debug!("{:?}: cleaning up the audio memory pool", event);
            self.system.cleanup_pool();
        } else if let Some(focused) = event.focus() {
            self.push_focus(focused);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SonarchSystemDesc;
    use crate::controls::StaticControlsSource;
    use crate::events::SystemEventDispatcher;

    fn bridge() -> (Arc<SonarchSystem>, SystemEventDispatcher) {
        let system = Arc::new(
            SonarchSystem::new(
                SonarchSystemDesc::default(),
                Arc::new(StaticControlsSource::new()),
            )
            .unwrap(),
        );
        let dispatcher = SystemEventDispatcher::new();
        dispatcher.register(Arc::new(LifecycleBridge::new(system.clone())));
        (system, dispatcher)
    }

    #[test]
    fn test_focus_events_toggle_focus() {
        let (system, dispatcher) = bridge();
        assert!(system.has_focus());

        dispatcher.dispatch(SystemEvent::Activate {
            active: true,
            minimized: true,
        });
        assert_eq!(system.pending_requests(), 1);
        system.update();
        assert!(!system.has_focus());

        dispatcher.dispatch(SystemEvent::ChangeFocus { focused: true });
        system.update();
        assert!(system.has_focus());
    }

    #[test]
    fn test_level_boundary_cleans_pool() {
        let (system, dispatcher) = bridge();
        let before = system.pool_stats().generation;

        dispatcher.dispatch(SystemEvent::LevelLoadStart);
        dispatcher.dispatch(SystemEvent::LevelPostUnload);
        dispatcher.dispatch(SystemEvent::ChangeFocus { focused: true });

        assert_eq!(system.pool_stats().generation, before + 2);
    }
}
