//! Engine and replay error types

use thiserror::Error;

use super::ids::{OrbId, ProtonId, ReactionId};
use super::state::Position;

/// Failures raised while computing a reaction tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Cell {0} is already occupied")]
    CellOccupied(Position),

    #[error("Cell {pos} is outside a {board_size}x{board_size} board")]
    OutOfBounds { pos: Position, board_size: usize },

    #[error("Invalid proton count: {0}")]
    InvalidCount(u8),

    #[error("Orb not found: {0}")]
    OrbNotFound(OrbId),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

/// A command failure together with the board it failed on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}\n{board}")]
pub struct CommandError {
    #[source]
    pub kind: SimError,
    /// Board snapshot in layout notation
    pub board: String,
}

/// Integrity failures found while replaying a tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Orb already exists: {0}")]
    OrbExists(OrbId),

    #[error("Orb not found: {0}")]
    OrbMissing(OrbId),

    #[error("Proton already exists: {proton} in {orb}")]
    ProtonExists { orb: OrbId, proton: ProtonId },

    #[error("Proton not found: {proton} in {orb}")]
    ProtonMissing { orb: OrbId, proton: ProtonId },

    #[error("No running leaf with id {0}")]
    UnknownLeaf(ReactionId),

    #[error("Sleep {0} completes on its own timer")]
    SleepNotCompletable(ReactionId),

    #[error("Replay stalled: nothing running and no timer pending")]
    Stalled,
}

pub type Result<T> = std::result::Result<T, SimError>;
