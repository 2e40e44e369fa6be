//! Reaction trees
//!
//! The engine describes every effect of a command as a tree of reactions.
//! Leaves are single effects on one orb or proton; `Sequence` runs its
//! children one after another and `Parallel` starts them together. The tree is
//! built once, handed to a runner by value and never mutated.

use serde::{Deserialize, Serialize};

use super::ids::{IdAllocator, OrbId, ProtonId, ReactionId};
use super::state::{Position, Side, Slot};

/// One node of a reaction tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: ReactionId,
    pub kind: ReactionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionKind {
    /// Orb appears at `at` with no protons
    CreateOrb { orb: OrbId, side: Side, at: Position },
    MoveOrb { orb: OrbId, to: Position },
    DeleteOrb { orb: OrbId, at: Position },
    CreateProton { orb: OrbId, proton: ProtonId, slot: Slot },
    MoveProton { orb: OrbId, proton: ProtonId, slot: Slot },
    FinishGame { winner: Side },
    /// Pause; completes once the duration has elapsed
    Sleep { duration_ms: u32 },
    Sequence(Vec<Reaction>),
    Parallel(Vec<Reaction>),
}

impl Reaction {
    pub fn new(ids: &mut IdAllocator, kind: ReactionKind) -> Self {
        Self {
            id: ids.reaction(),
            kind,
        }
    }

    pub fn sequence(ids: &mut IdAllocator, children: Vec<Reaction>) -> Self {
        Self::new(ids, ReactionKind::Sequence(children))
    }

    pub fn parallel(ids: &mut IdAllocator, children: Vec<Reaction>) -> Self {
        Self::new(ids, ReactionKind::Parallel(children))
    }

    pub fn sleep(ids: &mut IdAllocator, duration_ms: u32) -> Self {
        Self::new(ids, ReactionKind::Sleep { duration_ms })
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(
            self.kind,
            ReactionKind::Sequence(_) | ReactionKind::Parallel(_)
        )
    }

    /// Short tag for trace output
    pub fn name(&self) -> &'static str {
        match self.kind {
            ReactionKind::CreateOrb { .. } => "createOrb",
            ReactionKind::MoveOrb { .. } => "moveOrb",
            ReactionKind::DeleteOrb { .. } => "deleteOrb",
            ReactionKind::CreateProton { .. } => "createProton",
            ReactionKind::MoveProton { .. } => "moveProton",
            ReactionKind::FinishGame { .. } => "finishGame",
            ReactionKind::Sleep { .. } => "sleep",
            ReactionKind::Sequence(_) => "sequence",
            ReactionKind::Parallel(_) => "parallel",
        }
    }

    pub fn children(&self) -> &[Reaction] {
        match &self.kind {
            ReactionKind::Sequence(children) | ReactionKind::Parallel(children) => children,
            _ => &[],
        }
    }

    /// Leaves in depth-first order
    pub fn leaves(&self) -> Vec<&Reaction> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                out.push(node);
            } else {
                stack.extend(node.children().iter().rev());
            }
        }
        out
    }

    /// Ids of every node, composites included, in depth-first order
    pub fn ids(&self) -> Vec<ReactionId> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node.id);
            stack.extend(node.children().iter().rev());
        }
        out
    }

    /// Winner announced by a `FinishGame` leaf anywhere in the tree
    pub fn winner(&self) -> Option<Side> {
        self.leaves().into_iter().find_map(|leaf| match leaf.kind {
            ReactionKind::FinishGame { winner } => Some(winner),
            _ => None,
        })
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        1 + self.children().iter().map(Reaction::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_leaf() && self.children().is_empty()
    }
}
