//! Engine-wide system events.

use crate::sync::lock;
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Number of dispatched events kept for [`SystemEventDispatcher::poll_events`].
const POLL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    LevelLoadStart,
    LevelPostUnload,
    /// The application window was (de)activated or minimized
    Activate {
        active: bool,
        minimized: bool,
    },
    ChangeFocus {
        focused: bool,
    },
    /// Sent once per implementation change, whether or not the implementation could be loaded
    AudioImplementationLoaded {
        name: String,
        success: bool,
    },
}

impl SystemEvent {
    /// Returns Some(has_focus) for events that change application focus.
    pub fn focus(&self) -> Option<bool> {
        match self {
            Self::Activate { active, minimized } => Some(*active && !*minimized),
            Self::ChangeFocus { focused } => Some(*focused),
            _ => None,
        }
    }

    pub fn is_level_boundary(&self) -> bool {
        matches!(self, Self::LevelLoadStart | Self::LevelPostUnload)
    }
}

pub trait SystemEventListener: Send + Sync {
    fn on_system_event(&self, event: &SystemEvent);
}

impl<F> SystemEventListener for F
where
    F: Fn(&SystemEvent) + Send + Sync,
{
    fn on_system_event(&self, event: &SystemEvent) {
        self(event)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SystemEventListenerHandle(Uuid);

impl std::fmt::Display for SystemEventListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SystemEventListener({})", self.0)
    }
}

/// Broadcasts system events to registered listeners.
pub struct SystemEventDispatcher {
    listeners: Mutex<Vec<(SystemEventListenerHandle, Arc<dyn SystemEventListener>)>>,
    event_sender: Sender<SystemEvent>,
    event_receiver: Receiver<SystemEvent>,
}

impl SystemEventDispatcher {
    pub fn new() -> Self {
        let (event_sender, event_receiver) = crossbeam_channel::bounded(POLL_CAPACITY);
        Self {
            listeners: Mutex::new(Vec::new()),
            event_sender,
            event_receiver,
        }
    }

    pub fn register(&self, listener: Arc<dyn SystemEventListener>) -> SystemEventListenerHandle {
        let handle = SystemEventListenerHandle(Uuid::new_v4());
        lock(&self.listeners).push((handle, listener));
        handle
    }

    pub fn unregister(&self, handle: SystemEventListenerHandle) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != handle);
        listeners.len() != before
    }

    /// Calls every listener with `event`, then records it for polling.
    pub fn dispatch(&self, event: SystemEvent) {
        log::debug!("System event: {:?}", event);
        let snapshot: Vec<Arc<dyn SystemEventListener>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            listener.on_system_event(&event);
        }

        if self.event_sender.try_send(event).is_err() {
            log::debug!("System event log is full, dropping the event for polling");
        }
    }

    /// Dispatched events not polled yet, oldest first.
    pub fn poll_events(&self) -> Vec<SystemEvent> {
        self.event_receiver.try_iter().collect()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

impl Default for SystemEventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_focus_of_events() {
        assert_eq!(
            SystemEvent::Activate {
                active: true,
                minimized: true
            }
            .focus(),
            Some(false)
        );
        assert_eq!(
            SystemEvent::Activate {
                active: true,
                minimized: false
            }
            .focus(),
            Some(true)
        );
        assert_eq!(SystemEvent::ChangeFocus { focused: false }.focus(), Some(false));
        assert_eq!(SystemEvent::LevelLoadStart.focus(), None);
        assert!(SystemEvent::LevelPostUnload.is_level_boundary());
    }

    #[test]
    fn test_dispatch_register_unregister_and_poll() {
        let dispatcher = SystemEventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handle = dispatcher.register(Arc::new(move |_: &SystemEvent| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.dispatch(SystemEvent::LevelLoadStart);
        assert!(dispatcher.unregister(handle));
        assert!(!dispatcher.unregister(handle));
        dispatcher.dispatch(SystemEvent::LevelPostUnload);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            dispatcher.poll_events(),
            vec![SystemEvent::LevelLoadStart, SystemEvent::LevelPostUnload]
        );
        assert!(dispatcher.poll_events().is_empty());
    }
}
