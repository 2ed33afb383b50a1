//! Holder of the active backend.

use crate::backend::{AudioBackend, BackendEnvironment, NullBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Nothing was installed yet; the null backend answers requests
    Uninitialized,
    Active,
    /// Between shutting down the previous backend and initializing the next one
    Swapping,
}

/// Owns exactly one backend at all times, falling back to [`NullBackend`].
pub struct BackendAdapter {
    state: AdapterState,
    backend: Box<dyn AudioBackend>,
    is_null: bool,
}

impl BackendAdapter {
    pub fn new() -> Self {
        Self {
            state: AdapterState::Uninitialized,
            backend: Box::new(NullBackend::new()),
            is_null: true,
        }
    }

    /// Replaces the active backend.
    ///
    /// The null backend is installed first and the previous backend shut
    /// down. `None` leaves the null backend in place. A backend that fails to
    /// initialize is dropped and the null backend stays; the return value is
    /// false in that case.
    pub fn install(
        &mut self,
        next: Option<Box<dyn AudioBackend>>,
        env: &BackendEnvironment,
    ) -> bool {
        self.state = AdapterState::Swapping;
        self.release_current();

        let Some(mut backend) = next else {
            self.state = AdapterState::Active;
            return true;
        };

        let name = backend.name().to_string();
        let installed = match backend.initialize(env) {
            Ok(()) => {
                log::info!("Audio implementation '{}' initialized", name);
                self.backend = backend;
                self.is_null = false;
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to initialize audio implementation '{}', using the null implementation: {:#}",
                    name,
                    e
                );
                false
            }
        };

        self.state = AdapterState::Active;
        installed
    }

    /// Shuts the active backend down and installs the null backend.
    pub fn release(&mut self) {
        self.release_current();
        if self.state == AdapterState::Swapping {
            self.state = AdapterState::Active;
        }
    }

    fn release_current(&mut self) {
        let mut previous = std::mem::replace(&mut self.backend, Box::new(NullBackend::new()));
        if self.is_null {
            return;
        }
        self.is_null = true;

        if let Err(e) = previous.shutdown() {
            log::error!(
                "Audio implementation '{}' failed to shut down: {:#}",
                previous.name(),
                e
            );
        } else {
            log::info!("Audio implementation '{}' shut down", previous.name());
        }
    }

    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn AudioBackend {
        self.backend.as_mut()
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }
}

impl Default for BackendAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackendAdapter {
    fn drop(&mut self) {
        self.release_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CallbackSink;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        fail_init: bool,
        shutdowns: Arc<AtomicUsize>,
    }

    impl AudioBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn initialize(&mut self, _env: &BackendEnvironment) -> anyhow::Result<()> {
            if self.fail_init {
                anyhow::bail!("no device");
            }
            Ok(())
        }

        fn shutdown(&mut self) -> anyhow::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn env() -> BackendEnvironment {
        BackendEnvironment::new("audio".into(), "english", CallbackSink::detached())
    }

    #[test]
    fn test_install_and_swap_back_to_null() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let mut adapter = BackendAdapter::new();
        assert_eq!(adapter.state(), AdapterState::Uninitialized);
        assert!(adapter.is_null());

        let installed = adapter.install(
            Some(Box::new(CountingBackend {
                fail_init: false,
                shutdowns: shutdowns.clone(),
            })),
            &env(),
        );
        assert!(installed);
        assert_eq!(adapter.name(), "counting");
        assert_eq!(adapter.state(), AdapterState::Active);

        assert!(adapter.install(None, &env()));
        assert!(adapter.is_null());
        assert_eq!(adapter.name(), "null");
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_init_falls_back_to_null() {
        let mut adapter = BackendAdapter::new();
        let installed = adapter.install(
            Some(Box::new(CountingBackend {
                fail_init: true,
                shutdowns: Arc::new(AtomicUsize::new(0)),
            })),
            &env(),
        );
        assert!(!installed);
        assert!(adapter.is_null());
        assert_eq!(adapter.state(), AdapterState::Active);
    }
}
