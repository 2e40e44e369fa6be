//! Command processing
//!
//! The engine owns the board. Every command mutates it synchronously and
//! returns the complete reaction tree describing what happened, including
//! every cascade round of detonations and merges.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::error::{CommandError, Result, SimError};
use super::ids::{IdAllocator, OrbId};
use super::notation::render_board;
use super::reaction::{Reaction, ReactionKind};
use super::state::{Orb, Placement, Position, Side, Slot, valid_count};
use crate::consts::*;
use crate::trace;

/// Input commands (deterministic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Place a new orb on an empty cell
    Create { pos: Position, side: Side, count: u8 },
    /// Grow an orb, or detonate it once it is full. `to` is the count the UI
    /// expects next; the engine decides from its own count.
    Increment { orb: OrbId, to: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub board_size: usize,
    /// Pause inserted before each cascade resolution round
    pub cascade_delay_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            cascade_delay_ms: CASCADE_DELAY_MS,
        }
    }
}

/// How one colliding cell gets resolved, before spawns are applied
enum Resolution {
    Merged(Reaction),
    Detonated { deletes: Vec<Reaction>, at: Position },
}

/// Board state plus the id space it allocates from
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    ids: IdAllocator,
    /// Live orbs, sorted by id
    orbs: Vec<Orb>,
}

impl Engine {
    pub fn new(board_size: usize) -> Self {
        Self::with_config(EngineConfig {
            board_size,
            ..Default::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ids: IdAllocator::new(),
            orbs: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn board_size(&self) -> usize {
        self.config.board_size
    }

    pub fn orbs(&self) -> &[Orb] {
        &self.orbs
    }

    pub fn orb(&self, id: OrbId) -> Option<&Orb> {
        self.index_of(id).map(|i| &self.orbs[i])
    }

    pub fn orb_at(&self, pos: Position) -> Option<&Orb> {
        self.orbs.iter().find(|o| o.pos == pos)
    }

    /// Ids handed out by this engine so far
    pub fn ids_allocated(&self) -> u64 {
        self.ids.allocated()
    }

    /// The single side left on the board, if exactly one remains
    pub fn winner(&self) -> Option<Side> {
        let sides: BTreeSet<Side> = self.orbs.iter().map(|o| o.side).collect();
        match sides.len() {
            1 => sides.into_iter().next(),
            _ => None,
        }
    }

    /// True when exactly one side has orbs; an empty board is not finished
    pub fn is_game_finished(&self) -> bool {
        self.winner().is_some()
    }

    /// Board in layout notation
    pub fn snapshot(&self) -> String {
        render_board(&self.orbs, self.config.board_size)
    }

    /// Replace the board with `layout`. The board is left untouched when the
    /// layout is rejected.
    pub fn initialize(&mut self, layout: &[Placement]) -> std::result::Result<Reaction, CommandError> {
        self.validate_layout(layout)
            .map_err(|kind| self.fail(kind))?;

        self.orbs.clear();
        let mut appearances = Vec::with_capacity(layout.len());
        for placement in layout {
            let orb = Orb::spawn(
                &mut self.ids,
                placement.pos,
                placement.side,
                placement.count,
                None,
            )
            .ok_or(SimError::InvalidCount(placement.count))
            .map_err(|kind| self.fail(kind))?;
            appearances.push(appear(&mut self.ids, &orb));
            self.orbs.push(orb);
        }
        log::debug!(target: trace::STATE, "initialized:\n{}", self.snapshot());
        Ok(Reaction::parallel(&mut self.ids, appearances))
    }

    /// Apply one command on behalf of `acting` and describe its effects
    pub fn run_command(
        &mut self,
        command: &Command,
        acting: Side,
    ) -> std::result::Result<Reaction, CommandError> {
        log::debug!(target: trace::COMMAND, "{command:?} by {acting}");
        log::trace!(target: trace::STATE, "before:\n{}", self.snapshot());

        let result = match *command {
            Command::Create { pos, side, count } => self.create(pos, side, count),
            Command::Increment { orb, to } => self.increment(orb, to, acting),
        }
        .and_then(|reaction| {
            self.check_invariants()?;
            Ok(reaction)
        });

        match result {
            Ok(reaction) => {
                log::trace!(target: trace::STATE, "after:\n{}", self.snapshot());
                Ok(reaction)
            }
            Err(kind) => Err(self.fail(kind)),
        }
    }

    fn fail(&self, kind: SimError) -> CommandError {
        let board = self.snapshot();
        log::warn!(target: trace::STATE, "{kind}\n{board}");
        CommandError { kind, board }
    }

    fn index_of(&self, id: OrbId) -> Option<usize> {
        self.orbs.binary_search_by_key(&id, |o| o.id).ok()
    }

    fn check_bounds(&self, pos: Position) -> Result<()> {
        if pos.in_bounds(self.config.board_size) {
            Ok(())
        } else {
            Err(SimError::OutOfBounds {
                pos,
                board_size: self.config.board_size,
            })
        }
    }

    fn validate_layout(&self, layout: &[Placement]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for placement in layout {
            if !placement.pos.in_bounds(self.config.board_size) {
                return Err(SimError::InvalidLayout(format!(
                    "{} is off the board",
                    placement.pos
                )));
            }
            if !valid_count(placement.count) {
                return Err(SimError::InvalidLayout(format!(
                    "count {} at {}",
                    placement.count, placement.pos
                )));
            }
            if !seen.insert(placement.pos) {
                return Err(SimError::InvalidLayout(format!(
                    "{} listed twice",
                    placement.pos
                )));
            }
        }
        Ok(())
    }

    fn create(&mut self, pos: Position, side: Side, count: u8) -> Result<Reaction> {
        self.check_bounds(pos)?;
        if self.orb_at(pos).is_some() {
            return Err(SimError::CellOccupied(pos));
        }
        let orb = Orb::spawn(&mut self.ids, pos, side, count, None)
            .ok_or(SimError::InvalidCount(count))?;
        let reaction = appear(&mut self.ids, &orb);
        self.orbs.push(orb);
        Ok(reaction)
    }

    fn increment(&mut self, id: OrbId, to: u8, acting: Side) -> Result<Reaction> {
        let idx = self.index_of(id).ok_or(SimError::OrbNotFound(id))?;
        let count = self.orbs[idx].count;
        if to != count + 1 {
            log::debug!(
                target: trace::COMMAND,
                "{id}: ui expected {to}, engine has {count} protons"
            );
        }
        if count < PRE_DETONATION_THRESHOLD {
            self.grow(idx)
        } else {
            self.detonate(idx, acting)
        }
    }

    fn grow(&mut self, idx: usize) -> Result<Reaction> {
        let orb = &mut self.orbs[idx];
        let next = orb.count + 1;
        let created = orb
            .relayout(&mut self.ids, next)
            .ok_or(SimError::InvalidCount(next))?;

        let orb = &self.orbs[idx];
        let creates = created
            .iter()
            .map(|&proton| {
                Reaction::new(
                    &mut self.ids,
                    ReactionKind::CreateProton {
                        orb: orb.id,
                        proton,
                        slot: Slot::CENTER,
                    },
                )
            })
            .collect();
        let moves = orb
            .protons
            .iter()
            .map(|p| {
                Reaction::new(
                    &mut self.ids,
                    ReactionKind::MoveProton {
                        orb: orb.id,
                        proton: p.id,
                        slot: p.slot,
                    },
                )
            })
            .collect();
        let creates = Reaction::parallel(&mut self.ids, creates);
        let moves = Reaction::parallel(&mut self.ids, moves);
        Ok(Reaction::sequence(&mut self.ids, vec![creates, moves]))
    }

    fn detonate(&mut self, idx: usize, acting: Side) -> Result<Reaction> {
        let orb = self.orbs.remove(idx);
        log::debug!(target: trace::MERGE, "{} detonates at {}", orb.id, orb.pos);

        let mut steps = vec![
            Reaction::new(
                &mut self.ids,
                ReactionKind::DeleteOrb {
                    orb: orb.id,
                    at: orb.pos,
                },
            ),
            self.spawn_around(orb.pos, acting)?,
        ];

        // Resolve until every cell holds at most one orb; the game can only
        // be finished on a settled board
        let mut rounds = 0;
        loop {
            let round = self.resolve_round(acting)?;
            if round.is_empty() {
                if let Some(winner) = self.winner() {
                    log::debug!(target: trace::MERGE, "game finished, {winner} wins");
                    steps.push(Reaction::new(
                        &mut self.ids,
                        ReactionKind::FinishGame { winner },
                    ));
                }
                break;
            }
            rounds += 1;
            if rounds > MAX_CASCADE_ROUNDS {
                return Err(SimError::InvariantViolation(format!(
                    "cascade did not settle after {MAX_CASCADE_ROUNDS} rounds"
                )));
            }
            steps.push(Reaction::sleep(&mut self.ids, self.config.cascade_delay_ms));
            steps.push(Reaction::parallel(&mut self.ids, round));
        }
        log::debug!(target: trace::MERGE, "cascade settled after {rounds} rounds");

        Ok(Reaction::sequence(&mut self.ids, steps))
    }

    /// Seed a count-1 orb for `acting` on every neighbor of `origin`. The
    /// orbs appear on `origin` and then travel to their cell.
    fn spawn_around(&mut self, origin: Position, acting: Side) -> Result<Reaction> {
        let mut spawned = Vec::with_capacity(4);
        for target in origin.neighbors(self.config.board_size) {
            let mut orb = Orb::spawn(&mut self.ids, target, acting, 1, None)
                .ok_or(SimError::InvalidCount(1))?;
            orb.movement = Some(self.ids.movement());
            spawned.push(orb);
        }

        let creates = spawned
            .iter()
            .map(|o| {
                Reaction::new(
                    &mut self.ids,
                    ReactionKind::CreateOrb {
                        orb: o.id,
                        side: o.side,
                        at: origin,
                    },
                )
            })
            .collect();
        let protons = spawned
            .iter()
            .flat_map(|o| o.protons.iter().map(move |p| (o.id, p.id, p.slot)))
            .map(|(orb, proton, slot)| {
                Reaction::new(&mut self.ids, ReactionKind::CreateProton { orb, proton, slot })
            })
            .collect();
        let moves = spawned
            .iter()
            .map(|o| {
                Reaction::new(
                    &mut self.ids,
                    ReactionKind::MoveOrb {
                        orb: o.id,
                        to: o.pos,
                    },
                )
            })
            .collect();

        self.orbs.extend(spawned);

        let creates = Reaction::parallel(&mut self.ids, creates);
        let protons = Reaction::parallel(&mut self.ids, protons);
        let moves = Reaction::parallel(&mut self.ids, moves);
        Ok(Reaction::sequence(&mut self.ids, vec![creates, protons, moves]))
    }

    /// Resolve every cell holding more than one orb. Returns one reaction per
    /// resolved cell; empty when the board is stable.
    fn resolve_round(&mut self, acting: Side) -> Result<Vec<Reaction>> {
        let mut cells: BTreeMap<Position, Vec<&Orb>> = BTreeMap::new();
        for orb in &self.orbs {
            cells.entry(orb.pos).or_default().push(orb);
        }

        let mut removed = BTreeSet::new();
        let mut rewritten: BTreeMap<OrbId, Orb> = BTreeMap::new();
        let mut resolutions = Vec::new();

        for (pos, members) in cells.into_iter().filter(|(_, m)| m.len() >= 2) {
            let total: u32 = members.iter().map(|o| u32::from(o.count)).sum();

            if total >= u32::from(CAPACITY) {
                log::debug!(
                    target: trace::MERGE,
                    "{pos}: {} orbs, {total} protons, detonating",
                    members.len()
                );
                let deletes = members
                    .iter()
                    .map(|o| {
                        removed.insert(o.id);
                        delete(&mut self.ids, o)
                    })
                    .collect();
                resolutions.push(Resolution::Detonated { deletes, at: pos });
                continue;
            }

            let oldest = members
                .iter()
                .find(|o| o.movement.is_none())
                .or_else(|| members.iter().min_by_key(|o| o.movement))
                .copied()
                .ok_or_else(|| SimError::InvariantViolation(format!("{pos}: no oldest orb")))?;
            let survivor = members
                .iter()
                .filter(|o| o.id != oldest.id)
                .min_by_key(|o| o.count)
                .copied()
                .unwrap_or(oldest);
            log::debug!(
                target: trace::MERGE,
                "{pos}: merging {} orbs into {} ({total} protons), oldest {}",
                members.len(),
                survivor.id,
                oldest.id
            );

            let mut merged = survivor.clone();
            merged.movement = Some(self.ids.movement());
            let count = u8::try_from(total).map_err(|_| SimError::InvalidCount(u8::MAX))?;
            let created = merged
                .relayout(&mut self.ids, count)
                .ok_or(SimError::InvalidCount(count))?;

            let mut group: Vec<Reaction> = members
                .iter()
                .filter(|o| o.id != merged.id)
                .map(|o| {
                    removed.insert(o.id);
                    delete(&mut self.ids, o)
                })
                .collect();
            for proton in &merged.protons {
                let kind = if created.contains(&proton.id) {
                    ReactionKind::CreateProton {
                        orb: merged.id,
                        proton: proton.id,
                        slot: proton.slot,
                    }
                } else {
                    ReactionKind::MoveProton {
                        orb: merged.id,
                        proton: proton.id,
                        slot: proton.slot,
                    }
                };
                group.push(Reaction::new(&mut self.ids, kind));
            }
            resolutions.push(Resolution::Merged(Reaction::parallel(&mut self.ids, group)));
            rewritten.insert(merged.id, merged);
        }

        let orbs = std::mem::take(&mut self.orbs);
        self.orbs = orbs
            .into_iter()
            .filter(|o| !removed.contains(&o.id))
            .map(|o| rewritten.remove(&o.id).unwrap_or(o))
            .collect();

        resolutions
            .into_iter()
            .map(|resolution| match resolution {
                Resolution::Merged(reaction) => Ok(reaction),
                Resolution::Detonated { mut deletes, at } => {
                    deletes.push(self.spawn_around(at, acting)?);
                    Ok(Reaction::parallel(&mut self.ids, deletes))
                }
            })
            .collect()
    }

    /// Capacity and single occupancy
    fn check_invariants(&self) -> Result<()> {
        if let Some(orb) = self.orbs.iter().find(|o| !o.is_consistent()) {
            return Err(SimError::InvariantViolation(format!(
                "{} holds {} protons but count is {}",
                orb.id,
                orb.protons.len(),
                orb.count
            )));
        }
        let mut occupied = BTreeSet::new();
        for orb in &self.orbs {
            if !occupied.insert(orb.pos) {
                return Err(SimError::InvariantViolation(format!(
                    "{} shares {} with another orb",
                    orb.id, orb.pos
                )));
            }
        }
        Ok(())
    }
}

/// Orb appears, its protons pop out of the center and spread to their slots
fn appear(ids: &mut IdAllocator, orb: &Orb) -> Reaction {
    let create = Reaction::new(
        ids,
        ReactionKind::CreateOrb {
            orb: orb.id,
            side: orb.side,
            at: orb.pos,
        },
    );
    let protons = orb
        .protons
        .iter()
        .map(|p| {
            Reaction::new(
                ids,
                ReactionKind::CreateProton {
                    orb: orb.id,
                    proton: p.id,
                    slot: Slot::CENTER,
                },
            )
        })
        .collect();
    let moves = orb
        .protons
        .iter()
        .map(|p| {
            Reaction::new(
                ids,
                ReactionKind::MoveProton {
                    orb: orb.id,
                    proton: p.id,
                    slot: p.slot,
                },
            )
        })
        .collect();
    let protons = Reaction::parallel(ids, protons);
    let moves = Reaction::parallel(ids, moves);
    Reaction::sequence(ids, vec![create, protons, moves])
}

fn delete(ids: &mut IdAllocator, orb: &Orb) -> Reaction {
    Reaction::new(
        ids,
        ReactionKind::DeleteOrb {
            orb: orb.id,
            at: orb.pos,
        },
    )
}
