//! Request data model.
//!
//! Every operation on the audio system is an [`AudioRequest`]: a set of
//! [`RequestFlags`] plus one variant of the closed [`RequestPayload`] family.
//! The payload is a plain sum type, so the executor matches on it
//! exhaustively and each variant only carries the fields its operation needs.
//!
//! - [`ManagerRequest`]: system-wide operations (implementation swap, data parsing, focus, ...)
//! - [`CallbackRequest`]: reports raised by the implementation about its own events
//! - [`ObjectRequest`]: operations on one audio object
//! - [`ListenerRequest`]: listener transformation updates

mod flags;
mod info;
mod payload;

pub use flags::RequestFlags;
pub use info::{RequestEcho, RequestInfo, RequestStatus};
pub use payload::{
    BackendSlot, CallbackRequest, DataScope, ListenerRequest, ManagerRequest, ObjectRequest,
};

use crate::ids::AudioObjectId;

/// Category of a request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCategory {
    Manager,
    Callback,
    Object,
    Listener,
}

impl RequestCategory {
    pub const ALL: [RequestCategory; 4] = [
        RequestCategory::Manager,
        RequestCategory::Callback,
        RequestCategory::Object,
        RequestCategory::Listener,
    ];

    fn index(self) -> usize {
        match self {
            Self::Manager => 0,
            Self::Callback => 1,
            Self::Object => 2,
            Self::Listener => 3,
        }
    }
}

/// Typed set of request categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategorySet([bool; 4]);

impl CategorySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self([true; 4])
    }

    pub fn only(category: RequestCategory) -> Self {
        Self::empty().with(category)
    }

    pub fn with(mut self, category: RequestCategory) -> Self {
        self.0[category.index()] = true;
        self
    }

    pub fn contains(&self, category: RequestCategory) -> bool {
        self.0[category.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|set| *set)
    }

    pub fn iter(&self) -> impl Iterator<Item = RequestCategory> + '_ {
        RequestCategory::ALL
            .into_iter()
            .filter(|category| self.contains(*category))
    }
}

impl FromIterator<RequestCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = RequestCategory>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// Discriminant of a request: its category and the bit of its specific type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKind {
    pub category: RequestCategory,
    pub type_bit: u32,
    pub name: &'static str,
}

/// Payload of a request.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    Manager(ManagerRequest),
    Callback(CallbackRequest),
    Object(ObjectRequest),
    Listener(ListenerRequest),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Manager(request) => RequestKind {
                category: RequestCategory::Manager,
                type_bit: request.type_bit(),
                name: request.name(),
            },
            Self::Callback(request) => RequestKind {
                category: RequestCategory::Callback,
                type_bit: request.type_bit(),
                name: request.name(),
            },
            Self::Object(request) => RequestKind {
                category: RequestCategory::Object,
                type_bit: request.type_bit(),
                name: request.name(),
            },
            Self::Listener(request) => RequestKind {
                category: RequestCategory::Listener,
                type_bit: request.type_bit(),
                name: request.name(),
            },
        }
    }

    fn heap_size(&self) -> usize {
        match self {
            Self::Manager(request) => request.heap_size(),
            Self::Callback(request) => request.heap_size(),
            Self::Object(request) => request.heap_size(),
            Self::Listener(_) => 0,
        }
    }
}

/// A request pushed into the audio system.
#[derive(Debug, Clone)]
pub struct AudioRequest {
    pub flags: RequestFlags,
    pub payload: RequestPayload,
    /// Target of object requests; None addresses the global object
    pub object: Option<AudioObjectId>,
}

impl AudioRequest {
    pub fn new(payload: RequestPayload) -> Self {
        Self {
            flags: RequestFlags::PRIORITY_NORMAL,
            payload,
            object: None,
        }
    }

    pub fn manager(request: ManagerRequest) -> Self {
        Self::new(RequestPayload::Manager(request))
    }

    pub fn callback(request: CallbackRequest) -> Self {
        Self::new(RequestPayload::Callback(request))
    }

    pub fn object(object: AudioObjectId, request: ObjectRequest) -> Self {
        Self::new(RequestPayload::Object(request)).on_object(object)
    }

    /// Object request addressed to the global object.
    pub fn global(request: ObjectRequest) -> Self {
        Self::new(RequestPayload::Object(request))
    }

    pub fn listener(request: ListenerRequest) -> Self {
        Self::new(RequestPayload::Listener(request))
    }

    pub fn with_flags(mut self, flags: RequestFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn high_priority(mut self) -> Self {
        self.flags |= RequestFlags::PRIORITY_HIGH;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.flags |= RequestFlags::EXECUTE_BLOCKING;
        self
    }

    pub fn sync_callback(mut self) -> Self {
        self.flags |= RequestFlags::SYNC_CALLBACK;
        self
    }

    pub fn on_object(mut self, object: AudioObjectId) -> Self {
        self.object = Some(object);
        self
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    /// Bytes charged to the audio memory pool while the request is queued.
    pub fn footprint(&self) -> usize {
        std::mem::size_of::<Self>() + self.payload.heap_size()
    }
}
