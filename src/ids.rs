//! Typed identifiers for controls, objects and runtime instances.
//!
//! Control identifiers (triggers, RTPCs, switches, states, preloads and
//! environments) are derived from their names, so parsing the same controls
//! data twice, or after an implementation swap, yields the same IDs.

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn value(self) -> $inner {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Playable trigger definition.
    TriggerId(u32)
);
define_id!(
    /// Real-time parameter control.
    RtpcId(u32)
);
define_id!(
    /// Switch control.
    SwitchId(u32)
);
define_id!(
    /// State of a switch. Only unique together with its [`SwitchId`].
    SwitchStateId(u32)
);
define_id!(
    /// Named bundle of audio data loaded and unloaded as a unit.
    PreloadRequestId(u32)
);
define_id!(
    /// Environment (reverb zone, bus send, ...) an object can be sent to.
    EnvironmentId(u32)
);
define_id!(
    /// Handle to an audio object owned by the object registry.
    AudioObjectId(u64)
);
define_id!(
    /// Handle to an audio listener.
    ListenerId(u64)
);
define_id!(
    /// One backend event spawned by a trigger execution.
    EventId(u64)
);
define_id!(
    /// One execution of a trigger on an object.
    TriggerInstanceId(u64)
);
define_id!(
    /// One standalone file playing on an object.
    FileInstanceId(u64)
);

impl AudioObjectId {
    /// The object used for requests that do not name one.
    pub const GLOBAL: AudioObjectId = AudioObjectId(1);
}

impl ListenerId {
    /// Listener that exists for the whole lifetime of the system.
    pub const DEFAULT: ListenerId = ListenerId(1);
}

/// Name of the preload request that holds the global data.
pub const GLOBAL_PRELOAD_REQUEST_NAME: &str = "global_atl_preloads";

/// Case-insensitive 32-bit FNV-1a hash of a control name.
pub fn name_to_id(name: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    name.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte.to_ascii_lowercase())).wrapping_mul(PRIME)
    })
}

impl TriggerId {
    pub fn from_name(name: &str) -> Self {
        Self(name_to_id(name))
    }
}

impl RtpcId {
    pub fn from_name(name: &str) -> Self {
        Self(name_to_id(name))
    }
}

impl SwitchId {
    pub fn from_name(name: &str) -> Self {
        Self(name_to_id(name))
    }
}

impl SwitchStateId {
    pub fn from_name(name: &str) -> Self {
        Self(name_to_id(name))
    }
}

impl PreloadRequestId {
    pub fn from_name(name: &str) -> Self {
        Self(name_to_id(name))
    }

    pub fn global() -> Self {
        Self::from_name(GLOBAL_PRELOAD_REQUEST_NAME)
    }
}

impl EnvironmentId {
    pub fn from_name(name: &str) -> Self {
        Self(name_to_id(name))
    }
}

/// Monotonic generator for runtime handles.
#[derive(Debug)]
pub(crate) struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub(crate) fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    pub(crate) fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_to_id_is_case_insensitive() {
        assert_eq!(name_to_id("Play_Music"), name_to_id("play_music"));
        assert_ne!(name_to_id("play_music"), name_to_id("stop_music"));
    }

    #[test]
    fn test_known_fnv_value() {
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(name_to_id(""), 0x811c_9dc5);
        assert_eq!(name_to_id("a"), 0xe40c_292c);
    }

    #[test]
    fn test_id_generator() {
        let mut ids = IdGenerator::starting_at(2);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }
}
