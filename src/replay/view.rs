//! Board mirror
//!
//! The state a renderer keeps while it plays reaction trees back. Applying a
//! leaf checks it against the mirror, so a tree that creates an orb twice or
//! moves a proton that does not exist is reported instead of skipped.

use glam::Vec2;

use crate::sim::{Orb, OrbId, Position, ProtonId, Reaction, ReactionKind, ReplayError, Side, Slot};
use crate::{cell_to_screen, slot_to_offset, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewProton {
    pub id: ProtonId,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOrb {
    pub id: OrbId,
    pub pos: Position,
    pub side: Side,
    pub protons: Vec<ViewProton>,
}

#[derive(Debug, Clone, Default)]
pub struct BoardView {
    board_size: usize,
    /// Orbs in creation order
    orbs: Vec<ViewOrb>,
    winner: Option<Side>,
}

impl BoardView {
    pub fn new(board_size: usize) -> Self {
        Self {
            board_size,
            orbs: Vec::new(),
            winner: None,
        }
    }

    pub fn board_size(&self) -> usize {
        self.board_size
    }

    pub fn orbs(&self) -> &[ViewOrb] {
        &self.orbs
    }

    pub fn orb(&self, id: OrbId) -> Option<&ViewOrb> {
        self.orbs.iter().find(|o| o.id == id)
    }

    pub fn orb_at(&self, pos: Position) -> Option<&ViewOrb> {
        self.orbs.iter().find(|o| o.pos == pos)
    }

    /// Set once a `FinishGame` leaf has been played
    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn clear(&mut self) {
        self.orbs.clear();
        self.winner = None;
    }

    fn orb_mut(&mut self, id: OrbId) -> Result<&mut ViewOrb, ReplayError> {
        self.orbs
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(ReplayError::OrbMissing(id))
    }

    /// Play one leaf. Composites and sleeps leave the mirror unchanged.
    pub fn apply(&mut self, reaction: &Reaction) -> Result<(), ReplayError> {
        log::trace!(target: trace::APPLY, "{} {}", reaction.id, reaction.name());
        match reaction.kind {
            ReactionKind::CreateOrb { orb, side, at } => {
                if self.orb(orb).is_some() {
                    return Err(ReplayError::OrbExists(orb));
                }
                self.orbs.push(ViewOrb {
                    id: orb,
                    pos: at,
                    side,
                    protons: Vec::new(),
                });
            }
            ReactionKind::MoveOrb { orb, to } => {
                self.orb_mut(orb)?.pos = to;
            }
            ReactionKind::DeleteOrb { orb, .. } => {
                let idx = self
                    .orbs
                    .iter()
                    .position(|o| o.id == orb)
                    .ok_or(ReplayError::OrbMissing(orb))?;
                self.orbs.remove(idx);
            }
            ReactionKind::CreateProton { orb, proton, slot } => {
                let view = self.orb_mut(orb)?;
                if view.protons.iter().any(|p| p.id == proton) {
                    return Err(ReplayError::ProtonExists { orb, proton });
                }
                view.protons.push(ViewProton { id: proton, slot });
            }
            ReactionKind::MoveProton { orb, proton, slot } => {
                let view = self.orb_mut(orb)?;
                let target = view
                    .protons
                    .iter_mut()
                    .find(|p| p.id == proton)
                    .ok_or(ReplayError::ProtonMissing { orb, proton })?;
                target.slot = slot;
            }
            ReactionKind::FinishGame { winner } => {
                self.winner = Some(winner);
            }
            ReactionKind::Sleep { .. } | ReactionKind::Sequence(_) | ReactionKind::Parallel(_) => {}
        }
        Ok(())
    }

    /// Screen position of an orb
    pub fn screen_position(&self, id: OrbId) -> Option<Vec2> {
        self.orb(id).map(|o| cell_to_screen(o.pos, self.board_size))
    }

    /// Screen position of a proton (orb position plus slot offset)
    pub fn proton_position(&self, orb: OrbId, proton: ProtonId) -> Option<Vec2> {
        let view = self.orb(orb)?;
        let p = view.protons.iter().find(|p| p.id == proton)?;
        Some(cell_to_screen(view.pos, self.board_size) + slot_to_offset(p.slot))
    }

    /// Whether the mirror shows exactly the engine's board
    pub fn matches(&self, orbs: &[Orb]) -> bool {
        if self.orbs.len() != orbs.len() {
            return false;
        }
        orbs.iter().all(|orb| {
            let Some(view) = self.orb(orb.id) else {
                return false;
            };
            let mut shown: Vec<(ProtonId, Slot)> =
                view.protons.iter().map(|p| (p.id, p.slot)).collect();
            let mut actual: Vec<(ProtonId, Slot)> =
                orb.protons.iter().map(|p| (p.id, p.slot)).collect();
            shown.sort_by_key(|(id, _)| *id);
            actual.sort_by_key(|(id, _)| *id);
            view.pos == orb.pos && view.side == orb.side && shown == actual
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::IdAllocator;

    fn leaf(ids: &mut IdAllocator, kind: ReactionKind) -> Reaction {
        Reaction::new(ids, kind)
    }

    #[test]
    fn test_create_move_delete() {
        let mut ids = IdAllocator::new();
        let mut view = BoardView::new(5);
        let orb = ids.orb();
        view.apply(&leaf(
            &mut ids,
            ReactionKind::CreateOrb {
                orb,
                side: Side::One,
                at: Position::new(2, 2),
            },
        ))
        .unwrap();
        view.apply(&leaf(
            &mut ids,
            ReactionKind::MoveOrb {
                orb,
                to: Position::new(2, 3),
            },
        ))
        .unwrap();
        assert_eq!(view.orb(orb).unwrap().pos, Position::new(2, 3));
        assert_eq!(
            view.screen_position(orb),
            Some(Vec2::new(35.0, -15.0))
        );

        view.apply(&leaf(
            &mut ids,
            ReactionKind::DeleteOrb {
                orb,
                at: Position::new(2, 3),
            },
        ))
        .unwrap();
        assert!(view.orbs().is_empty());
    }

    #[test]
    fn test_integrity_failures() {
        let mut ids = IdAllocator::new();
        let mut view = BoardView::new(3);
        let orb = ids.orb();
        let proton = ids.proton();
        let create = leaf(
            &mut ids,
            ReactionKind::CreateOrb {
                orb,
                side: Side::Two,
                at: Position::new(0, 0),
            },
        );
        view.apply(&create).unwrap();
        assert_eq!(view.apply(&create), Err(ReplayError::OrbExists(orb)));

        let add = leaf(
            &mut ids,
            ReactionKind::CreateProton {
                orb,
                proton,
                slot: Slot::CENTER,
            },
        );
        view.apply(&add).unwrap();
        assert_eq!(
            view.apply(&add),
            Err(ReplayError::ProtonExists { orb, proton })
        );

        let stray = ids.proton();
        let shift = leaf(
            &mut ids,
            ReactionKind::MoveProton {
                orb,
                proton: stray,
                slot: Slot::new(0, 0),
            },
        );
        assert_eq!(
            view.apply(&shift),
            Err(ReplayError::ProtonMissing { orb, proton: stray })
        );

        let ghost = ids.orb();
        let delete = leaf(
            &mut ids,
            ReactionKind::DeleteOrb {
                orb: ghost,
                at: Position::new(1, 1),
            },
        );
        assert_eq!(view.apply(&delete), Err(ReplayError::OrbMissing(ghost)));
    }

    #[test]
    fn test_proton_position_and_winner() {
        let mut ids = IdAllocator::new();
        let mut view = BoardView::new(5);
        let orb = ids.orb();
        let proton = ids.proton();
        view.apply(&leaf(
            &mut ids,
            ReactionKind::CreateOrb {
                orb,
                side: Side::One,
                at: Position::new(2, 2),
            },
        ))
        .unwrap();
        view.apply(&leaf(
            &mut ids,
            ReactionKind::CreateProton {
                orb,
                proton,
                slot: Slot::CENTER,
            },
        ))
        .unwrap();
        let pos = view.proton_position(orb, proton).unwrap();
        assert!((pos.x - (-15.0 + 12.0)).abs() < 1e-5);
        assert!((pos.y - (-15.0 + 12.0)).abs() < 1e-5);

        view.apply(&leaf(&mut ids, ReactionKind::FinishGame { winner: Side::One }))
            .unwrap();
        assert_eq!(view.winner(), Some(Side::One));
        view.clear();
        assert_eq!(view.winner(), None);
    }
}
