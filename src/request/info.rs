use super::{RequestFlags, RequestKind};
use crate::ids::{
    AudioObjectId, EventId, FileInstanceId, ListenerId, PreloadRequestId, TriggerId,
    TriggerInstanceId,
};

/// Outcome of executing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    /// Dropped before execution or refused by the system or the implementation
    Failure,
}

impl RequestStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Operation-specific data echoed back to request listeners.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestEcho {
    #[default]
    None,
    ObjectReserved(AudioObjectId),
    TriggerExecuted {
        trigger: TriggerId,
        instance: TriggerInstanceId,
        event: EventId,
    },
    TriggerFinished(TriggerId),
    Event(EventId),
    FileStarted {
        file: FileInstanceId,
        path: String,
    },
    FileStopped {
        file: FileInstanceId,
        path: String,
    },
    Preload(PreloadRequestId),
    Listener(ListenerId),
    Implementation(String),
}

/// Notification delivered to request listeners once a request was executed.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInfo {
    pub kind: RequestKind,
    pub flags: RequestFlags,
    /// Target object, None for manager and listener requests
    pub object: Option<AudioObjectId>,
    pub status: RequestStatus,
    pub echo: RequestEcho,
}

impl RequestInfo {
    pub fn new(kind: RequestKind, flags: RequestFlags, object: Option<AudioObjectId>) -> Self {
        Self {
            kind,
            flags,
            object,
            status: RequestStatus::Success,
            echo: RequestEcho::None,
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_echo(mut self, echo: RequestEcho) -> Self {
        self.echo = echo;
        self
    }

    pub fn reserved_object(&self) -> Option<AudioObjectId> {
        match self.echo {
            RequestEcho::ObjectReserved(id) => Some(id),
            _ => None,
        }
    }
}
