use std::ops::{BitOr, BitOrAssign};

/// Bitset of request execution flags.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct RequestFlags(u32);

impl RequestFlags {
    pub const NONE: RequestFlags = RequestFlags(0);
    /// Regular traffic; implied when `PRIORITY_HIGH` is absent.
    pub const PRIORITY_NORMAL: RequestFlags = RequestFlags(1 << 0);
    /// Drained before every pending normal request.
    pub const PRIORITY_HIGH: RequestFlags = RequestFlags(1 << 1);
    /// `push_request` returns only after execution and listener notification.
    pub const EXECUTE_BLOCKING: RequestFlags = RequestFlags(1 << 2);
    /// Listener notification is delivered from `external_update` on the main thread.
    pub const SYNC_CALLBACK: RequestFlags = RequestFlags(1 << 3);
    /// Pushed from a thread other than the main thread.
    pub const THREAD_SAFE_PUSH: RequestFlags = RequestFlags(1 << 4);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: RequestFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_high_priority(self) -> bool {
        self.contains(Self::PRIORITY_HIGH)
    }

    pub fn is_blocking(self) -> bool {
        self.contains(Self::EXECUTE_BLOCKING)
    }

    pub fn has_sync_callback(self) -> bool {
        self.contains(Self::SYNC_CALLBACK)
    }
}

impl BitOr for RequestFlags {
    type Output = RequestFlags;

    fn bitor(self, rhs: RequestFlags) -> RequestFlags {
        RequestFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RequestFlags {
    fn bitor_assign(&mut self, rhs: RequestFlags) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for RequestFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(RequestFlags, &str); 5] = [
            (RequestFlags::PRIORITY_NORMAL, "PRIORITY_NORMAL"),
            (RequestFlags::PRIORITY_HIGH, "PRIORITY_HIGH"),
            (RequestFlags::EXECUTE_BLOCKING, "EXECUTE_BLOCKING"),
            (RequestFlags::SYNC_CALLBACK, "SYNC_CALLBACK"),
            (RequestFlags::THREAD_SAFE_PUSH, "THREAD_SAFE_PUSH"),
        ];

        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "RequestFlags({})", set.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_composition() {
        let flags = RequestFlags::PRIORITY_HIGH | RequestFlags::EXECUTE_BLOCKING;
        assert!(flags.is_high_priority());
        assert!(flags.is_blocking());
        assert!(!flags.has_sync_callback());
        assert!(!RequestFlags::NONE.is_high_priority());
    }

    #[test]
    fn test_debug_lists_set_flags() {
        let flags = RequestFlags::PRIORITY_HIGH | RequestFlags::SYNC_CALLBACK;
        assert_eq!(
            format!("{:?}", flags),
            "RequestFlags(PRIORITY_HIGH | SYNC_CALLBACK)"
        );
    }
}
