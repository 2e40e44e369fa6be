//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - One id allocator per engine, ids never reused
//! - Stable iteration order (orbs by id, cells by position)
//! - No timing, rendering or platform dependencies

pub mod engine;
pub mod error;
pub mod ids;
pub mod notation;
pub mod reaction;
pub mod state;

pub use engine::{Command, Engine, EngineConfig};
pub use error::{CommandError, ReplayError, SimError};
pub use ids::{IdAllocator, MovementSeq, OrbId, ProtonId, ReactionId};
pub use notation::{parse_layout, render_board};
pub use reaction::{Reaction, ReactionKind};
pub use state::{Orb, Placement, Position, Proton, Side, Slot, proton_slots};
