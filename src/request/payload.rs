use crate::backend::AudioBackend;
use crate::ids::{
    EnvironmentId, EventId, FileInstanceId, ListenerId, PreloadRequestId, RtpcId, SwitchId,
    SwitchStateId, TriggerId,
};
use crate::math::Transformation;
use crate::ray::RayInfo;
use crate::request_listener::{RequestListenerHandle, RequestListenerRegistration};
use crate::sync::lock;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Which part of the parsed data a request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataScope {
    Global,
    LevelSpecific,
    All,
}

impl DataScope {
    /// Returns true if data tagged with `tag` is affected by this scope.
    pub fn covers(self, tag: DataScope) -> bool {
        self == DataScope::All || self == tag
    }
}

/// Carrier for the backend handed over by a `SetImplementation` request.
///
/// The backend is moved out exactly once, by the executor. An empty slot
/// installs the null implementation.
#[derive(Clone, Default)]
pub struct BackendSlot {
    backend: Arc<Mutex<Option<Box<dyn AudioBackend>>>>,
}

impl BackendSlot {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(Some(backend))),
        }
    }

    /// Slot that installs the null implementation.
    pub fn null() -> Self {
        Self::default()
    }

    pub(crate) fn take(&self) -> Option<Box<dyn AudioBackend>> {
        lock(&self.backend).take()
    }
}

impl std::fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.backend.lock() {
            Ok(slot) => slot.as_ref().map(|b| b.name().to_string()),
            Err(_) => Some("<poisoned>".to_string()),
        };
        f.debug_tuple("BackendSlot").field(&name).finish()
    }
}

/// Requests addressed to the audio system as a whole.
#[derive(Debug, Clone)]
pub enum ManagerRequest {
    SetImplementation(BackendSlot),
    ReleaseImplementation,
    ParseControlsData {
        folder: PathBuf,
        scope: DataScope,
    },
    ParsePreloadsData {
        folder: PathBuf,
        scope: DataScope,
    },
    PreloadSingleRequest {
        id: PreloadRequestId,
        auto_load_only: bool,
    },
    UnloadSingleRequest {
        id: PreloadRequestId,
    },
    ReserveObjectId {
        name: String,
    },
    AddRequestListener(RequestListenerRegistration),
    RemoveRequestListener(RequestListenerHandle),
    RefreshAudioSystem {
        level_name: Option<String>,
    },
    ChangeLanguage {
        language: String,
    },
    RetriggerAudioControls,
    LoseFocus,
    GetFocus,
    MuteAll,
    UnmuteAll,
    StopAllSounds,
    ClearControlsData {
        scope: DataScope,
    },
    ClearPreloadsData {
        scope: DataScope,
    },
    ReloadControlsData {
        folder: PathBuf,
        level_name: Option<String>,
    },
    UnloadDataByScope {
        scope: DataScope,
    },
}

impl ManagerRequest {
    pub fn type_bit(&self) -> u32 {
        match self {
            Self::SetImplementation(_) => 1 << 0,
            Self::ReleaseImplementation => 1 << 1,
            Self::RefreshAudioSystem { .. } => 1 << 2,
            Self::ReserveObjectId { .. } => 1 << 3,
            Self::LoseFocus => 1 << 4,
            Self::GetFocus => 1 << 5,
            Self::MuteAll => 1 << 6,
            Self::UnmuteAll => 1 << 7,
            Self::StopAllSounds => 1 << 8,
            Self::ParseControlsData { .. } => 1 << 9,
            Self::ParsePreloadsData { .. } => 1 << 10,
            Self::ClearControlsData { .. } => 1 << 11,
            Self::ClearPreloadsData { .. } => 1 << 12,
            Self::PreloadSingleRequest { .. } => 1 << 13,
            Self::UnloadSingleRequest { .. } => 1 << 14,
            Self::UnloadDataByScope { .. } => 1 << 15,
            Self::AddRequestListener(_) => 1 << 17,
            Self::RemoveRequestListener(_) => 1 << 18,
            Self::ChangeLanguage { .. } => 1 << 19,
            Self::RetriggerAudioControls => 1 << 20,
            Self::ReloadControlsData { .. } => 1 << 22,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetImplementation(_) => "SetImplementation",
            Self::ReleaseImplementation => "ReleaseImplementation",
            Self::ParseControlsData { .. } => "ParseControlsData",
            Self::ParsePreloadsData { .. } => "ParsePreloadsData",
            Self::PreloadSingleRequest { .. } => "PreloadSingleRequest",
            Self::UnloadSingleRequest { .. } => "UnloadSingleRequest",
            Self::ReserveObjectId { .. } => "ReserveObjectId",
            Self::AddRequestListener(_) => "AddRequestListener",
            Self::RemoveRequestListener(_) => "RemoveRequestListener",
            Self::RefreshAudioSystem { .. } => "RefreshAudioSystem",
            Self::ChangeLanguage { .. } => "ChangeLanguage",
            Self::RetriggerAudioControls => "RetriggerAudioControls",
            Self::LoseFocus => "LoseFocus",
            Self::GetFocus => "GetFocus",
            Self::MuteAll => "MuteAll",
            Self::UnmuteAll => "UnmuteAll",
            Self::StopAllSounds => "StopAllSounds",
            Self::ClearControlsData { .. } => "ClearControlsData",
            Self::ClearPreloadsData { .. } => "ClearPreloadsData",
            Self::ReloadControlsData { .. } => "ReloadControlsData",
            Self::UnloadDataByScope { .. } => "UnloadDataByScope",
        }
    }

    pub(crate) fn heap_size(&self) -> usize {
        match self {
            Self::ParseControlsData { folder, .. }
            | Self::ParsePreloadsData { folder, .. } => folder.as_os_str().len(),
            Self::ReloadControlsData { folder, level_name } => {
                folder.as_os_str().len() + level_name.as_ref().map_or(0, String::len)
            }
            Self::ReserveObjectId { name } => name.len(),
            Self::RefreshAudioSystem { level_name } => level_name.as_ref().map_or(0, String::len),
            Self::ChangeLanguage { language } => language.len(),
            _ => 0,
        }
    }
}

/// Notifications raised by the implementation about its own events.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackRequest {
    ReportStartedEvent {
        event: EventId,
    },
    ReportFinishedEvent {
        event: EventId,
        success: bool,
    },
    ReportFinishedTriggerInstance {
        trigger: TriggerId,
    },
    ReportStartedFile {
        file: FileInstanceId,
        path: String,
        success: bool,
    },
    ReportStoppedFile {
        file: FileInstanceId,
        path: String,
    },
    ReportVirtualizedEvent {
        event: EventId,
    },
    ReportPhysicalizedEvent {
        event: EventId,
    },
}

impl CallbackRequest {
    pub fn type_bit(&self) -> u32 {
        match self {
            Self::ReportStartedEvent { .. } => 1 << 0,
            Self::ReportFinishedEvent { .. } => 1 << 1,
            Self::ReportFinishedTriggerInstance { .. } => 1 << 2,
            Self::ReportStartedFile { .. } => 1 << 3,
            Self::ReportStoppedFile { .. } => 1 << 4,
            Self::ReportVirtualizedEvent { .. } => 1 << 5,
            Self::ReportPhysicalizedEvent { .. } => 1 << 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReportStartedEvent { .. } => "ReportStartedEvent",
            Self::ReportFinishedEvent { .. } => "ReportFinishedEvent",
            Self::ReportFinishedTriggerInstance { .. } => "ReportFinishedTriggerInstance",
            Self::ReportStartedFile { .. } => "ReportStartedFile",
            Self::ReportStoppedFile { .. } => "ReportStoppedFile",
            Self::ReportVirtualizedEvent { .. } => "ReportVirtualizedEvent",
            Self::ReportPhysicalizedEvent { .. } => "ReportPhysicalizedEvent",
        }
    }

    pub(crate) fn heap_size(&self) -> usize {
        match self {
            Self::ReportStartedFile { path, .. } | Self::ReportStoppedFile { path, .. } => {
                path.len()
            }
            _ => 0,
        }
    }
}

/// Requests addressed to a single audio object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectRequest {
    PrepareTrigger {
        trigger: TriggerId,
    },
    UnprepareTrigger {
        trigger: TriggerId,
    },
    ExecuteTrigger {
        trigger: TriggerId,
        /// Expiry interpreted by the implementation; 0 keeps the instance until it finishes
        removal_timeout_ms: f32,
    },
    StopTrigger {
        trigger: TriggerId,
    },
    StopAllTriggers,
    PlayFile {
        path: String,
        localized: bool,
        trigger: Option<TriggerId>,
    },
    StopFile {
        path: String,
    },
    SetTransformation(Transformation),
    SetRtpcValue {
        rtpc: RtpcId,
        value: f32,
    },
    SetSwitchState {
        switch: SwitchId,
        state: SwitchStateId,
    },
    SetVolume {
        volume: f32,
    },
    SetEnvironmentAmount {
        environment: EnvironmentId,
        amount: f32,
    },
    ResetEnvironments,
    ReleaseObject,
    ProcessPhysicsRay(RayInfo),
}

impl ObjectRequest {
    pub fn type_bit(&self) -> u32 {
        match self {
            Self::PrepareTrigger { .. } => 1 << 0,
            Self::UnprepareTrigger { .. } => 1 << 1,
            Self::PlayFile { .. } => 1 << 2,
            Self::StopFile { .. } => 1 << 3,
            Self::ExecuteTrigger { .. } => 1 << 4,
            Self::StopTrigger { .. } => 1 << 5,
            Self::StopAllTriggers => 1 << 6,
            Self::SetTransformation(_) => 1 << 7,
            Self::SetRtpcValue { .. } => 1 << 8,
            Self::SetSwitchState { .. } => 1 << 9,
            Self::SetVolume { .. } => 1 << 10,
            Self::SetEnvironmentAmount { .. } => 1 << 11,
            Self::ResetEnvironments => 1 << 12,
            Self::ReleaseObject => 1 << 13,
            Self::ProcessPhysicsRay(_) => 1 << 14,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PrepareTrigger { .. } => "PrepareTrigger",
            Self::UnprepareTrigger { .. } => "UnprepareTrigger",
            Self::ExecuteTrigger { .. } => "ExecuteTrigger",
            Self::StopTrigger { .. } => "StopTrigger",
            Self::StopAllTriggers => "StopAllTriggers",
            Self::PlayFile { .. } => "PlayFile",
            Self::StopFile { .. } => "StopFile",
            Self::SetTransformation(_) => "SetTransformation",
            Self::SetRtpcValue { .. } => "SetRtpcValue",
            Self::SetSwitchState { .. } => "SetSwitchState",
            Self::SetVolume { .. } => "SetVolume",
            Self::SetEnvironmentAmount { .. } => "SetEnvironmentAmount",
            Self::ResetEnvironments => "ResetEnvironments",
            Self::ReleaseObject => "ReleaseObject",
            Self::ProcessPhysicsRay(_) => "ProcessPhysicsRay",
        }
    }

    pub(crate) fn heap_size(&self) -> usize {
        match self {
            Self::PlayFile { path, .. } | Self::StopFile { path } => path.len(),
            Self::ProcessPhysicsRay(ray) => {
                ray.hits.len() * std::mem::size_of::<crate::ray::RayHit>()
            }
            _ => 0,
        }
    }
}

/// Requests addressed to an audio listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerRequest {
    SetTransformation {
        transformation: Transformation,
        /// Target listener; None addresses the default listener
        listener: Option<ListenerId>,
    },
}

impl ListenerRequest {
    pub fn type_bit(&self) -> u32 {
        match self {
            Self::SetTransformation { .. } => 1 << 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTransformation { .. } => "SetListenerTransformation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_coverage() {
        assert!(DataScope::All.covers(DataScope::Global));
        assert!(DataScope::All.covers(DataScope::LevelSpecific));
        assert!(DataScope::Global.covers(DataScope::Global));
        assert!(!DataScope::Global.covers(DataScope::LevelSpecific));
    }

    #[test]
    fn test_null_slot_is_empty() {
        assert!(BackendSlot::null().take().is_none());
    }

    #[test]
    fn test_slot_hands_out_backend_once() {
        let slot = BackendSlot::new(Box::new(crate::backend::NullBackend::new()));
        let clone = slot.clone();
        assert!(clone.take().is_some());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_type_bits_are_unique_per_category() {
        let object_requests = [
            ObjectRequest::PrepareTrigger {
                trigger: TriggerId(1),
            },
            ObjectRequest::StopAllTriggers,
            ObjectRequest::ResetEnvironments,
            ObjectRequest::ReleaseObject,
            ObjectRequest::SetVolume { volume: 1.0 },
        ];
        let mut mask = 0;
        for request in &object_requests {
            assert_eq!(mask & request.type_bit(), 0, "{}", request.name());
            mask |= request.type_bit();
        }
    }
}
