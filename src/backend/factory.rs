use super::AudioBackend;
use crate::error::SonarchError;
use crate::sync::lock;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Loads and unloads backend modules by name.
pub trait BackendFactory: Send + Sync {
    fn load(&self, name: &str) -> anyhow::Result<Box<dyn AudioBackend>>;

    /// Releases whatever `load` acquired for the module. Unknown names are ignored.
    fn unload(&self, name: &str);
}

pub type BackendConstructor = dyn Fn() -> anyhow::Result<Box<dyn AudioBackend>> + Send + Sync;

/// Factory backed by a table of constructors.
#[derive(Default)]
pub struct BackendRegistry {
    constructors: HashMap<String, Box<BackendConstructor>>,
    loaded: Mutex<HashSet<String>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor. Names are matched case-insensitively.
    pub fn register<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn AudioBackend>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_ascii_lowercase(), Box::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_ascii_lowercase())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded_modules().contains(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    fn loaded_modules(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        lock(&self.loaded)
    }
}

impl BackendFactory for BackendRegistry {
    fn load(&self, name: &str) -> anyhow::Result<Box<dyn AudioBackend>> {
        let key = name.to_ascii_lowercase();
        let constructor = self.constructors.get(&key).ok_or_else(|| {
            SonarchError::Backend(format!("no audio implementation named '{}'", name))
        })?;

        let backend = constructor()?;
        self.loaded_modules().insert(key);
        log::info!("Loaded audio implementation module '{}'", name);
        Ok(backend)
    }

    fn unload(&self, name: &str) {
        if self.loaded_modules().remove(&name.to_ascii_lowercase()) {
            log::info!("Unloaded audio implementation module '{}'", name);
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("modules", &self.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn test_load_and_unload() {
        let registry = BackendRegistry::new()
            .register("Silent", || Ok(Box::new(NullBackend::new())))
            .register("broken", || Err(anyhow::anyhow!("device missing")));

        assert!(registry.load("silent").is_ok());
        assert!(registry.is_loaded("SILENT"));
        registry.unload("silent");
        assert!(!registry.is_loaded("silent"));

        assert!(registry.load("broken").is_err());
        assert!(!registry.is_loaded("broken"));
        assert!(registry.load("missing").is_err());
    }
}
