//! Identifier types and the per-engine allocator
//!
//! Orbs, protons, reactions and movement sequence numbers all draw from one
//! counter, so ids are unique across entity kinds and strictly increasing in
//! allocation order.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identity of an orb
    OrbId,
    "orb#"
);
id_type!(
    /// Identity of a proton inside an orb
    ProtonId,
    "proton#"
);
id_type!(
    /// Identity of a reaction node, for tracing
    ReactionId,
    "reaction#"
);
id_type!(
    /// Merge tie-break tag; lower means the orb moved earlier
    MovementSeq,
    "move#"
);

/// Monotonic id source owned by one engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_raw(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn orb(&mut self) -> OrbId {
        OrbId(self.next_raw())
    }

    pub fn proton(&mut self) -> ProtonId {
        ProtonId(self.next_raw())
    }

    pub fn reaction(&mut self) -> ReactionId {
        ReactionId(self.next_raw())
    }

    pub fn movement(&mut self) -> MovementSeq {
        MovementSeq(self.next_raw())
    }

    /// Number of ids handed out so far
    pub fn allocated(&self) -> u64 {
        self.next
    }
}
