use crate::backend::{BackendEnvironment, CallbackSink};
use crate::config::SonarchSystemDesc;
use crate::controls::{ControlsDataSource, ControlsRegistry};
use crate::error::{Result, SonarchError};
use crate::executor::{Execution, Executor};
use crate::ids::{
    AudioObjectId, EnvironmentId, ListenerId, PreloadRequestId, RtpcId, SwitchId, SwitchStateId,
    TriggerId,
};
use crate::pool::{AudioMemoryPool, PoolStats};
use crate::queue::{QueuedRequest, RequestQueue};
use crate::request::{AudioRequest, ManagerRequest, RequestFlags, RequestInfo};
use crate::request_listener::{
    RequestFilter, RequestListenerHandle, RequestListenerRegistration, RequestListenerRegistry,
};
use crate::sync::{lock, read};
use crossbeam_channel::{Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Name of the pool every request and audio object is charged to.
pub const PRIMARY_POOL_NAME: &str = "Audio Primary Memory Pool";

/// What happened to a pushed request.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Waiting in the queue; listeners are told once it ran
    Queued,
    /// A blocking request that has been executed
    Completed(RequestInfo),
}

impl PushOutcome {
    pub fn info(&self) -> Option<&RequestInfo> {
        match self {
            Self::Queued => None,
            Self::Completed(info) => Some(info),
        }
    }
}

/// The audio system: request queue, executor and request listeners.
///
/// `SonarchSystem` is shared between threads behind an `Arc`. Any thread may
/// push requests; they are executed in priority order by whoever drives the
/// system, either an [`AudioThread`](crate::AudioThread) calling
/// [`update`](Self::update) or the main thread calling
/// [`external_update`](Self::external_update).
///
/// # Blocking requests
///
/// A request flagged [`EXECUTE_BLOCKING`](crate::RequestFlags::EXECUTE_BLOCKING) returns only after it
/// ran and its listeners were notified. It runs inline when the caller is the
/// allowed thread or when no audio thread is running; otherwise the caller
/// waits for the audio thread to reach it.
///
/// # Pool charges
///
/// A queued request is charged to the memory pool until it was executed.
/// Audio objects stay charged until [`cleanup_pool`](Self::cleanup_pool).
pub struct SonarchSystem {
    desc: SonarchSystemDesc,
    queue: RequestQueue,
    executor: Mutex<Executor>,
    request_listeners: Arc<RequestListenerRegistry>,
    pool: Arc<Mutex<AudioMemoryPool>>,
    controls: Arc<RwLock<ControlsRegistry>>,
    creator_thread: ThreadId,
    allowed_thread: Mutex<ThreadId>,
    audio_thread_running: AtomicBool,
    wake_sender: Sender<()>,
    wake_receiver: Receiver<()>,
    backend_reports: Receiver<AudioRequest>,
    deferred: Mutex<Vec<RequestInfo>>,
    last_update: Mutex<Instant>,
    shut_down: AtomicBool,
}

impl SonarchSystem {
    /// Creates the audio system with the null implementation active.
    ///
    /// # Arguments
    ///
    /// * `desc` - Configuration, validated before anything is allocated
    /// * `source` - Where controls and preload definitions are read from
    pub fn new(desc: SonarchSystemDesc, source: Arc<dyn ControlsDataSource>) -> Result<Self> {
        desc.validate()?;

        let pool = Arc::new(Mutex::new(AudioMemoryPool::new(
            PRIMARY_POOL_NAME,
            desc.pool_capacity,
        )?));
        let controls = Arc::new(RwLock::new(ControlsRegistry::new()));
        let request_listeners = Arc::new(RequestListenerRegistry::new());

        let (report_sender, backend_reports) = crossbeam_channel::unbounded();
        let env = BackendEnvironment::new(
            desc.config_path.clone(),
            &desc.language,
            CallbackSink::new(report_sender),
        );
        let mut executor = Executor::new(
            desc.clone(),
            env,
            controls.clone(),
            source,
            request_listeners.clone(),
            pool.clone(),
        );
        executor.recharge_objects(&mut lock(&pool));

        let (wake_sender, wake_receiver) = crossbeam_channel::bounded(1);
        let creator_thread = thread::current().id();

        log::info!(
            "Audio system created (pool {} KiB, config path {})",
            desc.pool_capacity / 1024,
            desc.config_path.display()
        );

        Ok(Self {
            queue: RequestQueue::new(desc.max_queue_depth, desc.backlog_warning_threshold),
            desc,
            executor: Mutex::new(executor),
            request_listeners,
            pool,
            controls,
            creator_thread,
            allowed_thread: Mutex::new(creator_thread),
            audio_thread_running: AtomicBool::new(false),
            wake_sender,
            wake_receiver,
            backend_reports,
            deferred: Mutex::new(Vec::new()),
            last_update: Mutex::new(Instant::now()),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Pushes a request from any thread. Requests pushed from a thread other
    /// than the creating one are tagged
    /// [`THREAD_SAFE_PUSH`](crate::RequestFlags::THREAD_SAFE_PUSH).
    ///
    /// # Returns
    ///
    /// [`PushOutcome::Queued`] for regular requests and
    /// [`PushOutcome::Completed`] with the execution result for blocking ones.
    /// Fails when the pool cannot hold the request, when its priority tier is
    /// full or after [`shutdown`](Self::shutdown).
    pub fn push_request(&self, mut request: AudioRequest) -> Result<PushOutcome> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(SonarchError::Disconnected("audio system is shut down".into()));
        }
        if thread::current().id() != self.creator_thread {
            request.flags |= RequestFlags::THREAD_SAFE_PUSH;
        }

        let blocking = request.flags.is_blocking();
        if blocking && self.can_execute_inline() {
            return Ok(PushOutcome::Completed(self.execute_inline(request)));
        }

        let block = lock(&self.pool).allocate(request.footprint())?;
        let mut queued = QueuedRequest::new(request);
        queued.pool_block = Some(block);

        if !blocking {
            self.enqueue(queued)?;
            return Ok(PushOutcome::Queued);
        }

        let (completion, done) = crossbeam_channel::bounded(1);
        queued.completion = Some(completion);
        self.enqueue(queued)?;
        // The audio thread may have stopped after the inline check.
        if !self.audio_thread_running.load(Ordering::Acquire) {
            self.process_requests();
        }

        let info = done
            .recv()
            .map_err(|_| SonarchError::Disconnected("blocking request was dropped".into()))?;
        if info.flags.has_sync_callback() {
            self.request_listeners.notify(&info);
        }
        Ok(PushOutcome::Completed(info))
    }

    /// Pushes `request` with the blocking flag set and returns its result.
    pub fn push_blocking(&self, request: AudioRequest) -> Result<RequestInfo> {
        match self.push_request(request.blocking())? {
            PushOutcome::Completed(info) => Ok(info),
            PushOutcome::Queued => Err(SonarchError::RequestFailed(
                "blocking request was queued without completing".into(),
            )),
        }
    }

    /// Registers a listener for executed requests.
    pub fn add_request_listener<F>(&self, filter: RequestFilter, callback: F) -> RequestListenerHandle
    where
        F: Fn(&RequestInfo) + Send + Sync + 'static,
    {
        self.request_listeners
            .add(RequestListenerRegistration::new(filter, callback))
    }

    /// Removes a listener. Once this returns, the listener is not called again
    /// and no call to it is still running on another thread.
    pub fn remove_request_listener(&self, handle: RequestListenerHandle) -> bool {
        self.request_listeners.remove(handle)
    }

    pub fn get_audio_trigger_id(&self, name: &str) -> Option<TriggerId> {
        read(&self.controls).trigger_id(name)
    }

    pub fn get_audio_rtpc_id(&self, name: &str) -> Option<RtpcId> {
        read(&self.controls).rtpc_id(name)
    }

    pub fn get_audio_switch_id(&self, name: &str) -> Option<SwitchId> {
        read(&self.controls).switch_id(name)
    }

    pub fn get_audio_switch_state_id(
        &self,
        switch: SwitchId,
        state_name: &str,
    ) -> Option<SwitchStateId> {
        read(&self.controls).switch_state_id(switch, state_name)
    }

    pub fn get_audio_preload_request_id(&self, name: &str) -> Option<PreloadRequestId> {
        read(&self.controls).preload_request_id(name)
    }

    pub fn get_audio_environment_id(&self, name: &str) -> Option<EnvironmentId> {
        read(&self.controls).environment_id(name)
    }

    pub fn create_audio_listener(&self) -> ListenerId {
        lock(&self.executor).create_listener()
    }

    pub fn release_audio_listener(&self, id: ListenerId) -> Result<()> {
        lock(&self.executor).release_listener(id)
    }

    /// Reserves an audio object and waits for its ID.
    pub fn reserve_audio_object(&self, name: &str) -> Result<AudioObjectId> {
        let info = self.push_blocking(AudioRequest::manager(ManagerRequest::ReserveObjectId {
            name: name.to_string(),
        }))?;
        info.reserved_object().ok_or_else(|| {
            SonarchError::RequestFailed(format!("could not reserve audio object '{}'", name))
        })
    }

    /// Main-thread update.
    ///
    /// Drives the queue when no audio thread is running and delivers the
    /// notifications of requests flagged
    /// [`SYNC_CALLBACK`](crate::RequestFlags::SYNC_CALLBACK).
    pub fn external_update(&self) {
        if !self.audio_thread_running.load(Ordering::Acquire) {
            self.update();
        }

        let deferred = std::mem::take(&mut *lock(&self.deferred));
        for info in &deferred {
            self.request_listeners.notify(info);
        }
    }

    /// Executes the requests pending at the time of the call, then updates the backend.
    ///
    /// Returns the number of requests executed.
    pub fn update(&self) -> usize {
        let processed = self.process_requests();

        let elapsed = {
            let mut last_update = lock(&self.last_update);
            let now = Instant::now();
            let elapsed = now.duration_since(*last_update);
            *last_update = now;
            elapsed
        };
        lock(&self.executor).tick(elapsed);

        processed
    }

    /// Sets the thread on which blocking requests run inline.
    pub fn set_allowed_thread_id(&self, id: ThreadId) {
        *lock(&self.allowed_thread) = id;
    }

    pub fn allowed_thread_id(&self) -> ThreadId {
        *lock(&self.allowed_thread)
    }

    pub fn config_path(&self) -> &Path {
        &self.desc.config_path
    }

    pub fn desc(&self) -> &SonarchSystemDesc {
        &self.desc
    }

    pub fn active_backend_name(&self) -> String {
        lock(&self.executor).backend_name().to_string()
    }

    /// Executes pending requests, resets the memory pool and charges the
    /// surviving audio objects to it again.
    pub fn cleanup_pool(&self) {
        self.process_requests();

        let mut executor = lock(&self.executor);
        let mut pool = lock(&self.pool);
        pool.cleanup();
        executor.recharge_objects(&mut pool);
        log::info!(
            "Cleaned up audio memory pool: {} bytes in use by {} audio objects",
            pool.used(),
            executor.objects().len()
        );
    }

    pub fn pool_stats(&self) -> PoolStats {
        lock(&self.pool).stats()
    }

    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    pub fn audio_object_count(&self) -> usize {
        lock(&self.executor).objects().len()
    }

    pub fn audio_listener_count(&self) -> usize {
        lock(&self.executor).listeners().len()
    }

    pub fn has_focus(&self) -> bool {
        lock(&self.executor).has_focus()
    }

    pub fn is_audio_thread_running(&self) -> bool {
        self.audio_thread_running.load(Ordering::Acquire)
    }

    /// Executes what is still queued and releases the active backend.
    ///
    /// Further pushes fail with [`SonarchError::Disconnected`].
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.process_requests();
        lock(&self.executor).shutdown();
        log::info!("Audio system shut down");
    }

    pub(crate) fn attach_audio_thread(&self) {
        self.set_allowed_thread_id(thread::current().id());
        self.audio_thread_running.store(true, Ordering::Release);
    }

    pub(crate) fn detach_audio_thread(&self) {
        self.audio_thread_running.store(false, Ordering::Release);
        self.set_allowed_thread_id(self.creator_thread);
    }

    /// Waits until a request was pushed or the timeout elapsed.
    pub(crate) fn wait_for_requests(&self, timeout: Duration) {
        let _ = self.wake_receiver.recv_timeout(timeout);
    }

    /// Wakes an audio thread blocked in `wait_for_requests`.
    pub(crate) fn wake(&self) {
        let _ = self.wake_sender.try_send(());
    }

    /// Queues a charged request, handing its pool block back if the tier is full.
    fn enqueue(&self, queued: QueuedRequest) -> Result<()> {
        let block = queued.pool_block;
        if let Err(e) = self.queue.push(queued) {
            if let Some(block) = block {
                lock(&self.pool).free(block);
            }
            return Err(e);
        }
        self.wake();
        Ok(())
    }

    fn can_execute_inline(&self) -> bool {
        !self.audio_thread_running.load(Ordering::Acquire)
            || thread::current().id() == self.allowed_thread_id()
    }

    fn execute_inline(&self, request: AudioRequest) -> RequestInfo {
        let execution = lock(&self.executor).execute(&request);
        self.complete(execution, None)
    }

    /// Drains the queue once. The budget is the number of requests pending
    /// when the drain starts, so requests pushed meanwhile wait for the next one.
    fn process_requests(&self) -> usize {
        self.forward_backend_reports();

        let budget = self.queue.len();
        let mut processed = 0;
        while processed < budget {
            let (execution, queued) = {
                let mut executor = lock(&self.executor);
                let Some(queued) = self.queue.pop() else {
                    break;
                };
                (executor.execute(&queued.request), queued)
            };
            // The info carries everything listeners see, so the charge goes back first.
            let QueuedRequest {
                pool_block,
                completion,
                ..
            } = queued;
            if let Some(block) = pool_block {
                lock(&self.pool).free(block);
            }
            self.complete(execution, completion);
            processed += 1;
        }
        processed
    }

    fn forward_backend_reports(&self) {
        while let Ok(report) = self.backend_reports.try_recv() {
            if let Err(e) = self.push_request(report) {
                log::error!("Dropping backend report: {}", e);
            }
        }
    }

    /// Queues follow-ups, notifies listeners and wakes a blocked pusher, in that order.
    ///
    /// A [`SYNC_CALLBACK`](crate::RequestFlags::SYNC_CALLBACK) request is
    /// delivered on the next `external_update`, unless it is blocking: then
    /// the pushing thread is notified before its push returns, either right
    /// here when it ran inline or by the waiting pusher itself.
    fn complete(&self, execution: Execution, completion: Option<Sender<RequestInfo>>) -> RequestInfo {
        let Execution { info, follow_ups } = execution;

        for follow_up in follow_ups {
            let name = follow_up.kind().name;
            if let Err(e) = self.push_request(follow_up) {
                log::warn!("Dropping follow-up {} request: {}", name, e);
            }
        }

        let sync_callback = info.flags.has_sync_callback();
        if !sync_callback || (info.flags.is_blocking() && completion.is_none()) {
            self.request_listeners.notify(&info);
        } else if !info.flags.is_blocking() {
            lock(&self.deferred).push(info.clone());
        }

        if let Some(completion) = completion {
            let _ = completion.send(info.clone());
        }
        info
    }
}

impl Drop for SonarchSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SonarchSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonarchSystem")
            .field("pending_requests", &self.queue.len())
            .field("audio_thread_running", &self.is_audio_thread_running())
            .finish_non_exhaustive()
    }
}
