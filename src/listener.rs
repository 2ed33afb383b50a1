use crate::error::{Result, SonarchError};
use crate::ids::{IdGenerator, ListenerId};
use crate::math::Transformation;
use std::collections::BTreeMap;

/// The "ears" of the audio system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioListener {
    pub transformation: Transformation,
}

/// Listeners known to the audio system. The default listener always exists.
#[derive(Debug)]
pub struct ListenerRegistry {
    listeners: BTreeMap<ListenerId, AudioListener>,
    ids: IdGenerator,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        let mut listeners = BTreeMap::new();
        listeners.insert(ListenerId::DEFAULT, AudioListener::default());
        Self {
            listeners,
            ids: IdGenerator::starting_at(ListenerId::DEFAULT.value() + 1),
        }
    }

    pub fn create(&mut self) -> ListenerId {
        let id = ListenerId(self.ids.next());
        self.listeners.insert(id, AudioListener::default());
        id
    }

    pub fn release(&mut self, id: ListenerId) -> Result<()> {
        if id == ListenerId::DEFAULT {
            return Err(SonarchError::UnknownListener(
                "the default listener cannot be released".into(),
            ));
        }
        self.listeners
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SonarchError::UnknownListener(id.to_string()))
    }

    pub fn get(&self, id: ListenerId) -> Option<&AudioListener> {
        self.listeners.get(&id)
    }

    pub fn get_mut(&mut self, id: ListenerId) -> Option<&mut AudioListener> {
        self.listeners.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ListenerId, &AudioListener)> {
        self.listeners.iter().map(|(id, listener)| (*id, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_default_listener_cannot_be_released() {
        let mut registry = ListenerRegistry::new();
        assert!(registry.release(ListenerId::DEFAULT).is_err());
        assert!(registry.get(ListenerId::DEFAULT).is_some());
    }

    #[test]
    fn test_create_release() {
        let mut registry = ListenerRegistry::new();
        let id = registry.create();
        registry.get_mut(id).unwrap().transformation =
            Transformation::from_position(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(registry.len(), 2);
        registry.release(id).unwrap();
        assert!(registry.release(id).is_err());
        assert_eq!(registry.len(), 1);
    }
}
