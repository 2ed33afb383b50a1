use crate::error::Result;
use crate::system::SonarchSystem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Name given to the thread draining the request queue.
pub const AUDIO_THREAD_NAME: &str = "sonarch-audio";

/// Dedicated thread that drives [`SonarchSystem::update`].
///
/// While it runs, it is the allowed thread of the system: blocking requests
/// pushed from other threads wait for it. Dropping the handle stops the thread
/// after a final drain.
pub struct AudioThread {
    system: Arc<SonarchSystem>,
    is_running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioThread {
    /// Starts the thread. It updates the system whenever a request is pushed
    /// and at least once per `interval`.
    pub fn spawn(system: Arc<SonarchSystem>, interval: Duration) -> Result<Self> {
        let is_running = Arc::new(AtomicBool::new(true));
        let (ready_sender, ready) = crossbeam_channel::bounded(1);

        let thread_system = system.clone();
        let thread_running = is_running.clone();
        let handle = thread::Builder::new()
            .name(AUDIO_THREAD_NAME.to_string())
            .spawn(move || {
                thread_system.attach_audio_thread();
                let _ = ready_sender.send(());
                log::debug!("Audio thread started");

                while thread_running.load(Ordering::Acquire) {
                    thread_system.update();
                    thread_system.wait_for_requests(interval);
                }

                thread_system.detach_audio_thread();
                thread_system.update();
                log::debug!("Audio thread stopped");
            })?;

        // Blocking pushes made after `spawn` returns must already see the thread.
        let _ = ready.recv();

        Ok(Self {
            system,
            is_running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn system(&self) -> &Arc<SonarchSystem> {
        &self.system
    }

    /// Stops the thread and waits for it to finish.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        self.system.wake();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Audio thread panicked");
            }
        }
    }
}

impl Drop for AudioThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SonarchSystemDesc;
    use crate::controls::StaticControlsSource;
    use crate::request::{AudioRequest, ManagerRequest, ObjectRequest};
    use crate::request_listener::RequestFilter;
    use std::sync::Mutex;

    fn system() -> Arc<SonarchSystem> {
        Arc::new(
            SonarchSystem::new(
                SonarchSystemDesc::default(),
                Arc::new(StaticControlsSource::new()),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_blocking_push_waits_for_audio_thread() {
        let system = system();
        let threads = Arc::new(Mutex::new(Vec::new()));
        let threads_clone = threads.clone();
        system.add_request_listener(RequestFilter::all(), move |_| {
            let name = thread::current().name().map(str::to_string);
            threads_clone.lock().unwrap().push(name);
        });

        let mut audio_thread = AudioThread::spawn(system.clone(), Duration::from_millis(5)).unwrap();
        assert!(system.is_audio_thread_running());
        assert_ne!(system.allowed_thread_id(), thread::current().id());

        let info = system
            .push_blocking(AudioRequest::manager(ManagerRequest::ReserveObjectId {
                name: "door".into(),
            }))
            .unwrap();
        assert!(info.reserved_object().is_some());
        assert_eq!(
            *threads.lock().unwrap(),
            vec![Some(AUDIO_THREAD_NAME.to_string())]
        );

        audio_thread.stop();
        assert!(!system.is_audio_thread_running());
        assert_eq!(system.allowed_thread_id(), thread::current().id());
    }

    #[test]
    fn test_stop_drains_pending_requests() {
        let system = system();
        let mut audio_thread = AudioThread::spawn(system.clone(), Duration::from_secs(60)).unwrap();
        for _ in 0..100 {
            system
                .push_request(AudioRequest::global(ObjectRequest::SetVolume { volume: 0.5 }))
                .unwrap();
        }
        audio_thread.stop();
        assert_eq!(system.pending_requests(), 0);
    }
}
