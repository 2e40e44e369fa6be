//! Board entities and core simulation types
//!
//! Orbs and their protons are plain data owned by the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{IdAllocator, MovementSeq, OrbId, ProtonId};
use crate::consts::CAPACITY;

/// Board cell, 0-indexed
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(&self, board_size: usize) -> bool {
        self.row < board_size && self.col < board_size
    }

    /// In-bounds orthogonal neighbors: up, down, left, right
    pub fn neighbors(&self, board_size: usize) -> Vec<Position> {
        let mut out = Vec::with_capacity(4);
        if self.row > 0 {
            out.push(Position::new(self.row - 1, self.col));
        }
        if self.row + 1 < board_size {
            out.push(Position::new(self.row + 1, self.col));
        }
        if self.col > 0 {
            out.push(Position::new(self.row, self.col - 1));
        }
        if self.col + 1 < board_size {
            out.push(Position::new(self.row, self.col + 1));
        }
        out
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the two players
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }

    /// Board notation marker
    pub fn marker(self) -> char {
        match self {
            Side::One => '▲',
            Side::Two => '▼',
        }
    }

    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            '▲' => Some(Side::One),
            '▼' => Some(Side::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::One => write!(f, "side 1"),
            Side::Two => write!(f, "side 2"),
        }
    }
}

/// Position within an orb's local 3x3 grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub row: u8,
    pub col: u8,
}

impl Slot {
    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// Where new protons appear before moving to their slot
    pub const CENTER: Slot = Slot::new(1, 1);
}

const LAYOUT_1: [Slot; 1] = [Slot::new(1, 1)];
const LAYOUT_2: [Slot; 2] = [Slot::new(0, 1), Slot::new(2, 1)];
const LAYOUT_3: [Slot; 3] = [Slot::new(0, 0), Slot::new(2, 0), Slot::new(2, 2)];
const LAYOUT_4: [Slot; 4] = [
    Slot::new(0, 0),
    Slot::new(0, 2),
    Slot::new(2, 0),
    Slot::new(2, 2),
];

/// Slot layout for an orb holding `count` protons (None outside 1..=4)
pub fn proton_slots(count: u8) -> Option<&'static [Slot]> {
    match count {
        1 => Some(&LAYOUT_1),
        2 => Some(&LAYOUT_2),
        3 => Some(&LAYOUT_3),
        4 => Some(&LAYOUT_4),
        _ => None,
    }
}

/// Whether `count` is a legal orb size
pub fn valid_count(count: u8) -> bool {
    (1..=CAPACITY).contains(&count)
}

/// A sub-marker inside an orb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proton {
    pub id: ProtonId,
    pub slot: Slot,
}

/// A player-owned marker on one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orb {
    pub id: OrbId,
    pub pos: Position,
    pub side: Side,
    pub count: u8,
    pub protons: Vec<Proton>,
    /// Set on orbs produced by a detonation or rewritten by a merge
    #[serde(default)]
    pub movement: Option<MovementSeq>,
}

impl Orb {
    /// Build an orb with freshly allocated protons laid out for `count`.
    /// Returns None when `count` is not a legal orb size.
    pub fn spawn(
        ids: &mut IdAllocator,
        pos: Position,
        side: Side,
        count: u8,
        movement: Option<MovementSeq>,
    ) -> Option<Self> {
        let slots = proton_slots(count)?;
        let id = ids.orb();
        let protons = slots
            .iter()
            .map(|&slot| Proton {
                id: ids.proton(),
                slot,
            })
            .collect();
        Some(Self {
            id,
            pos,
            side,
            count,
            protons,
            movement,
        })
    }

    /// Re-lay out protons for `count`, reusing existing proton ids in order.
    /// Returns the ids of protons created by the resize, or None when `count`
    /// is not a legal orb size.
    pub fn relayout(&mut self, ids: &mut IdAllocator, count: u8) -> Option<Vec<ProtonId>> {
        let slots = proton_slots(count)?;
        let mut created = Vec::new();
        let protons = slots
            .iter()
            .enumerate()
            .map(|(i, &slot)| match self.protons.get(i) {
                Some(existing) => Proton {
                    id: existing.id,
                    slot,
                },
                None => {
                    let id = ids.proton();
                    created.push(id);
                    Proton { id, slot }
                }
            })
            .collect();
        self.protons = protons;
        self.count = count;
        Some(created)
    }

    /// Capacity invariant: count matches proton list and is a legal size
    pub fn is_consistent(&self) -> bool {
        valid_count(self.count) && self.protons.len() == self.count as usize
    }
}

/// One entry of an initial layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub pos: Position,
    pub count: u8,
    pub side: Side,
}

impl Placement {
    pub const fn new(pos: Position, count: u8, side: Side) -> Self {
        Self { pos, count, side }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_table() {
        assert_eq!(proton_slots(1).unwrap(), &[Slot::new(1, 1)]);
        assert_eq!(proton_slots(2).unwrap(), &[Slot::new(0, 1), Slot::new(2, 1)]);
        assert_eq!(
            proton_slots(3).unwrap(),
            &[Slot::new(0, 0), Slot::new(2, 0), Slot::new(2, 2)]
        );
        assert_eq!(proton_slots(4).unwrap().len(), 4);
        assert!(proton_slots(0).is_none());
        assert!(proton_slots(5).is_none());
    }

    #[test]
    fn test_neighbors_interior_edge_corner() {
        assert_eq!(Position::new(2, 2).neighbors(5).len(), 4);
        assert_eq!(Position::new(0, 2).neighbors(5).len(), 3);
        assert_eq!(
            Position::new(0, 0).neighbors(5),
            vec![Position::new(1, 0), Position::new(0, 1)]
        );
        assert!(Position::new(0, 0).neighbors(1).is_empty());
    }

    #[test]
    fn test_neighbor_order() {
        assert_eq!(
            Position::new(1, 1).neighbors(3),
            vec![
                Position::new(0, 1),
                Position::new(2, 1),
                Position::new(1, 0),
                Position::new(1, 2),
            ]
        );
    }

    #[test]
    fn test_spawn_lays_out_protons() {
        let mut ids = IdAllocator::new();
        let orb = Orb::spawn(&mut ids, Position::new(0, 0), Side::One, 3, None).unwrap();
        assert!(orb.is_consistent());
        assert_eq!(orb.protons[0].slot, Slot::new(0, 0));
        assert!(Orb::spawn(&mut ids, Position::new(0, 0), Side::One, 0, None).is_none());
    }

    #[test]
    fn test_relayout_reuses_ids() {
        let mut ids = IdAllocator::new();
        let mut orb = Orb::spawn(&mut ids, Position::new(1, 1), Side::Two, 1, None).unwrap();
        let first = orb.protons[0].id;
        let created = orb.relayout(&mut ids, 3).unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(orb.protons[0].id, first);
        assert_eq!(orb.protons[0].slot, Slot::new(0, 0));
        assert!(orb.is_consistent());
    }

    #[test]
    fn test_side_markers() {
        assert_eq!(Side::from_marker(Side::One.marker()), Some(Side::One));
        assert_eq!(Side::from_marker('x'), None);
        assert_eq!(Side::Two.opponent(), Side::One);
    }
}
