use crate::math::Transformation;
use crate::sync::lock;
use std::sync::Mutex;

/// What the audio system needs to know about the engine hosting it.
pub trait HostEnvironment: Send + Sync {
    /// Name of the loaded level, empty when none is loaded.
    fn current_level_name(&self) -> String;

    /// World transformation of the entity the active view is linked to.
    fn active_view_transformation(&self) -> Option<Transformation>;
}

/// Host whose level and view are set from the outside.
#[derive(Debug, Default)]
pub struct StaticHost {
    level_name: Mutex<String>,
    view: Mutex<Option<Transformation>>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level_name(&self, name: &str) {
        *lock(&self.level_name) = name.to_string();
    }

    pub fn set_view_transformation(&self, transformation: Option<Transformation>) {
        *lock(&self.view) = transformation;
    }
}

impl HostEnvironment for StaticHost {
    fn current_level_name(&self) -> String {
        lock(&self.level_name).clone()
    }

    fn active_view_transformation(&self) -> Option<Transformation> {
        *lock(&self.view)
    }
}

/// True for level names that have level-specific audio data.
pub fn is_loaded_level(name: &str) -> bool {
    !name.is_empty() && !name.eq_ignore_ascii_case("untitled")
}
