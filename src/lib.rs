//! Chain Reaction - a two-player orb placement game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (orbs, detonations, merges, reaction trees)
//! - `replay`: Reaction-tree scheduler and the board mirror it drives
//! - `session`: Game sessions, command admission and restart
//! - `settings`: Data-driven configuration
//! - `trace`: Log categories for debug output

pub mod replay;
pub mod session;
pub mod settings;
pub mod sim;
pub mod trace;

pub use session::{Admission, Rejection, Session, SessionCache, SessionError, SessionKey};
pub use settings::{LayoutPreset, Settings};

use glam::Vec2;

use sim::{Position, Slot};

/// Game configuration constants
pub mod consts {
    /// Maximum protons an orb can hold
    pub const CAPACITY: u8 = 4;
    /// An increment on an orb holding at least this many protons detonates it
    pub const PRE_DETONATION_THRESHOLD: u8 = CAPACITY - 1;
    /// Default board size (square)
    pub const DEFAULT_BOARD_SIZE: usize = 5;
    /// Safety cap on resolution rounds within one command
    pub const MAX_CASCADE_ROUNDS: usize = 10_000;

    /// Board geometry (pixels)
    pub const CELL_SIZE: f32 = 40.0;
    pub const CELL_GAP: f32 = 10.0;
    pub const BOARD_PADDING: f32 = 6.0;

    /// Orb geometry (pixels)
    pub const ORB_SIZE: f32 = 30.0;
    /// Orb diameter divided by proton diameter
    pub const PROTON_RATIO: f32 = 5.0;

    /// Animation durations handed to the renderer (ms)
    pub const PROTON_ANIMATION_MS: u32 = 300;
    pub const ORB_ANIMATION_MS: u32 = 600;
    /// Pause between cascade resolution rounds (ms)
    pub const CASCADE_DELAY_MS: u32 = 300;
}

use consts::*;

/// Screen coordinate of a cell index along one axis, centered on the board
#[inline]
pub fn orb_coordinate(index: usize, board_size: usize) -> f32 {
    let offset = index as f32 - (board_size / 2) as f32;
    offset * (CELL_SIZE + CELL_GAP) - ORB_SIZE / 2.0
}

/// Offset of a local 0..=2 slot coordinate inside an orb
#[inline]
pub fn proton_coordinate(slot: u8) -> f32 {
    let proton_size = ORB_SIZE / PROTON_RATIO;
    ORB_SIZE / 2.0 + proton_size * (slot as f32 - 1.5)
}

/// Top-left screen position of the orb sitting on `pos` (col → x, row → y)
#[inline]
pub fn cell_to_screen(pos: Position, board_size: usize) -> Vec2 {
    Vec2::new(
        orb_coordinate(pos.col, board_size),
        orb_coordinate(pos.row, board_size),
    )
}

/// Proton offset within its orb (col → x, row → y)
#[inline]
pub fn slot_to_offset(slot: Slot) -> Vec2 {
    Vec2::new(proton_coordinate(slot.col), proton_coordinate(slot.row))
}

/// Total board width/height in pixels
#[inline]
pub fn board_extent(board_size: usize) -> f32 {
    let n = board_size as f32;
    n * CELL_SIZE + CELL_GAP * (n - 1.0).max(0.0) + BOARD_PADDING * 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orb_coordinate_centered() {
        // Middle cell of a 5x5 board sits half an orb left of center
        assert_eq!(orb_coordinate(2, 5), -ORB_SIZE / 2.0);
        assert_eq!(orb_coordinate(0, 5), -2.0 * 50.0 - 15.0);
        assert_eq!(orb_coordinate(4, 5), 2.0 * 50.0 - 15.0);
    }

    #[test]
    fn test_proton_coordinate() {
        // Proton size is 6px; slot 1 is the middle column
        assert!((proton_coordinate(1) - 12.0).abs() < 1e-5);
        assert!((proton_coordinate(0) - 6.0).abs() < 1e-5);
        assert!((proton_coordinate(2) - 18.0).abs() < 1e-5);
    }

    #[test]
    fn test_cell_to_screen_axes() {
        let v = cell_to_screen(Position::new(0, 4), 5);
        assert_eq!(v.x, orb_coordinate(4, 5));
        assert_eq!(v.y, orb_coordinate(0, 5));
    }

    #[test]
    fn test_board_extent() {
        assert_eq!(board_extent(5), 5.0 * 40.0 + 4.0 * 10.0 + 12.0);
        assert_eq!(board_extent(1), 40.0 + 12.0);
    }

    #[test]
    fn test_threshold_below_capacity() {
        assert_eq!(PRE_DETONATION_THRESHOLD, 3);
    }
}
