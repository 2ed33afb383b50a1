//! Registry of request listeners.
//!
//! Listeners are notified with a [`RequestInfo`] after a request matching
//! their [`RequestFilter`] was executed. Notification runs over a snapshot of
//! the registry, so listeners may be added or removed at any time, including
//! from inside a callback. Every entry carries an alive flag that is checked
//! right before its callback runs, and `remove` waits for calls of the
//! listener still running on other threads: once it returns, the listener is
//! not running and is not called again. A listener removing itself from its
//! own callback does not wait for that call.

use crate::ids::AudioObjectId;
use crate::request::{CategorySet, RequestCategory, RequestInfo};
use crate::sync::lock;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use uuid::Uuid;

/// Callback invoked with the info of every matching executed request.
pub type RequestCallback = dyn Fn(&RequestInfo) + Send + Sync;

/// Handle returned on registration, used to remove the listener again.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestListenerHandle(Uuid);

impl std::fmt::Display for RequestListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestListener({})", self.0)
    }
}

/// Selects which executed requests a listener is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFilter {
    /// Only requests on this object; None accepts every object and non-object requests
    pub object: Option<AudioObjectId>,
    pub categories: CategorySet,
    /// Specific type bits accepted within the selected categories
    pub type_mask: u32,
}

impl RequestFilter {
    pub const ALL_TYPES: u32 = u32::MAX;

    /// Accepts every request.
    pub fn all() -> Self {
        Self {
            object: None,
            categories: CategorySet::all(),
            type_mask: Self::ALL_TYPES,
        }
    }

    pub fn category(category: RequestCategory) -> Self {
        Self {
            categories: CategorySet::only(category),
            ..Self::all()
        }
    }

    pub fn with_object(mut self, object: AudioObjectId) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_type_mask(mut self, mask: u32) -> Self {
        self.type_mask = mask;
        self
    }

    pub fn matches(&self, info: &RequestInfo) -> bool {
        if !self.categories.contains(info.kind.category) {
            return false;
        }
        if self.type_mask & info.kind.type_bit == 0 {
            return false;
        }
        match self.object {
            Some(object) => info.object == Some(object),
            None => true,
        }
    }
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// A listener ready to be registered, either directly or through an
/// `AddRequestListener` manager request.
#[derive(Clone)]
pub struct RequestListenerRegistration {
    handle: RequestListenerHandle,
    filter: RequestFilter,
    callback: Arc<RequestCallback>,
}

impl RequestListenerRegistration {
    pub fn new<F>(filter: RequestFilter, callback: F) -> Self
    where
        F: Fn(&RequestInfo) + Send + Sync + 'static,
    {
        Self {
            handle: RequestListenerHandle(Uuid::new_v4()),
            filter,
            callback: Arc::new(callback),
        }
    }

    pub fn handle(&self) -> RequestListenerHandle {
        self.handle
    }

    pub fn filter(&self) -> &RequestFilter {
        &self.filter
    }
}

impl std::fmt::Debug for RequestListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestListenerRegistration")
            .field("handle", &self.handle)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

struct ListenerEntry {
    registration: RequestListenerRegistration,
    state: Mutex<EntryState>,
    /// Signalled whenever a call finishes
    idle: Condvar,
}

struct EntryState {
    alive: bool,
    /// One element per call in progress
    running_on: Vec<ThreadId>,
}

impl ListenerEntry {
    fn new(registration: RequestListenerRegistration) -> Self {
        Self {
            registration,
            state: Mutex::new(EntryState {
                alive: true,
                running_on: Vec::new(),
            }),
            idle: Condvar::new(),
        }
    }

    /// Runs the callback unless the entry was retired. Returns true if it ran.
    fn call(&self, info: &RequestInfo) -> bool {
        let caller = thread::current().id();
        {
            let mut state = lock(&self.state);
            if !state.alive {
                return false;
            }
            state.running_on.push(caller);
        }

        let _running = RunningCall {
            entry: self,
            thread: caller,
        };
        (self.registration.callback)(info);
        true
    }

    /// Stops further calls and waits for the ones running on other threads.
    fn retire(&self) {
        let current = thread::current().id();
        let mut state = lock(&self.state);
        state.alive = false;
        while state.running_on.iter().any(|thread| *thread != current) {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Marks a call as finished when dropped, also when the callback panics.
struct RunningCall<'a> {
    entry: &'a ListenerEntry,
    thread: ThreadId,
}

impl Drop for RunningCall<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.entry.state);
        if let Some(index) = state.running_on.iter().position(|t| *t == self.thread) {
            state.running_on.swap_remove(index);
        }
        self.entry.idle.notify_all();
    }
}

#[derive(Default)]
pub struct RequestListenerRegistry {
    entries: Mutex<Vec<Arc<ListenerEntry>>>,
}

impl RequestListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, registration: RequestListenerRegistration) -> RequestListenerHandle {
        let handle = registration.handle;
        let mut entries = lock(&self.entries);
        if entries.iter().any(|entry| entry.registration.handle == handle) {
            log::warn!("{} is already registered", handle);
            return handle;
        }
        entries.push(Arc::new(ListenerEntry::new(registration)));
        log::debug!("Added {} ({} registered)", handle, entries.len());
        handle
    }

    /// Removes a listener. Returns false if the handle was not registered.
    ///
    /// Blocks while the listener runs on another thread, so it must not be
    /// called from a callback the removed listener is waiting for.
    pub fn remove(&self, handle: RequestListenerHandle) -> bool {
        match self.take(handle) {
            Some(entry) => {
                entry.retire();
                true
            }
            None => false,
        }
    }

    /// Removes a listener without waiting for calls in progress on other
    /// threads. For callers holding the executor lock.
    pub(crate) fn remove_without_waiting(&self, handle: RequestListenerHandle) -> bool {
        match self.take(handle) {
            Some(entry) => {
                lock(&entry.state).alive = false;
                true
            }
            None => false,
        }
    }

    fn take(&self, handle: RequestListenerHandle) -> Option<Arc<ListenerEntry>> {
        let mut entries = lock(&self.entries);
        let Some(index) = entries
            .iter()
            .position(|entry| entry.registration.handle == handle)
        else {
            log::warn!("Tried to remove unknown {}", handle);
            return None;
        };
        let entry = entries.remove(index);
        log::debug!("Removed {} ({} registered)", handle, entries.len());
        Some(entry)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every matching listener. Returns the number of callbacks run.
    pub fn notify(&self, info: &RequestInfo) -> usize {
        let snapshot: Vec<Arc<ListenerEntry>> = lock(&self.entries).clone();

        let mut delivered = 0;
        for entry in snapshot {
            if entry.registration.filter.matches(info) && entry.call(info) {
                delivered += 1;
            }
        }
        delivered
    }
}
