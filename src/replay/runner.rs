//! Reaction-tree scheduler
//!
//! The tree is flattened into an arena of nodes. A `Sequence` keeps a cursor
//! to its running child, a `Parallel` counts the children still running.
//! Leaves are handed to the caller to play; the caller reports each one back
//! with [`Runner::complete`]. Sleeps are timed by the runner itself against a
//! clock the caller moves with [`Runner::advance`].

use std::collections::{BTreeMap, VecDeque};

use super::view::BoardView;
use crate::sim::{Reaction, ReactionId, ReactionKind, ReplayError};
use crate::trace;

#[derive(Debug)]
enum Body {
    Leaf(Reaction),
    Sequence { children: Vec<usize>, cursor: usize },
    Parallel { children: Vec<usize>, pending: usize },
}

#[derive(Debug)]
struct Node {
    parent: Option<usize>,
    body: Body,
}

/// What a parent does after one of its children finished
enum Next {
    Activate(usize),
    Finish,
    Wait,
}

#[derive(Debug)]
pub struct Runner {
    nodes: Vec<Node>,
    /// Leaves waiting on the caller
    active: BTreeMap<ReactionId, usize>,
    /// Sleeps keyed by (deadline, id)
    sleeps: BTreeMap<(u64, ReactionId), usize>,
    clock_ms: u64,
    started: bool,
    finished: bool,
}

impl Runner {
    pub fn new(tree: Reaction) -> Self {
        let mut nodes = Vec::new();
        flatten(&mut nodes, tree, None);
        Self {
            nodes,
            active: BTreeMap::new(),
            sleeps: BTreeMap::new(),
            clock_ms: 0,
            started: false,
            finished: false,
        }
    }

    /// Begin playback. Returns the leaves the caller must now play.
    pub fn start(&mut self) -> Vec<ReactionId> {
        let mut started = Vec::new();
        if !self.started && !self.nodes.is_empty() {
            self.started = true;
            self.activate(0, &mut started);
        }
        started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Leaves currently waiting for a completion signal
    pub fn running(&self) -> Vec<ReactionId> {
        self.active.keys().copied().collect()
    }

    /// Deadline of the earliest pending sleep
    pub fn next_deadline(&self) -> Option<u64> {
        self.sleeps.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Look up a leaf that is running or sleeping
    pub fn leaf(&self, id: ReactionId) -> Option<&Reaction> {
        let idx = self
            .active
            .get(&id)
            .or_else(|| self.sleeps.iter().find(|((_, s), _)| *s == id).map(|(_, i)| i))?;
        match &self.nodes.get(*idx)?.body {
            Body::Leaf(reaction) => Some(reaction),
            _ => None,
        }
    }

    /// Signal that a running leaf is done. Returns the leaves started as a
    /// consequence.
    pub fn complete(&mut self, id: ReactionId) -> Result<Vec<ReactionId>, ReplayError> {
        if self.sleeps.keys().any(|&(_, s)| s == id) {
            return Err(ReplayError::SleepNotCompletable(id));
        }
        let idx = self
            .active
            .remove(&id)
            .ok_or(ReplayError::UnknownLeaf(id))?;
        let mut started = Vec::new();
        self.finish(idx, &mut started);
        Ok(started)
    }

    /// Move the clock forward, completing every sleep that became due
    pub fn advance(&mut self, elapsed_ms: u64) -> Vec<ReactionId> {
        self.clock_ms += elapsed_ms;
        let mut started = Vec::new();
        while let Some((&key, &idx)) = self.sleeps.first_key_value() {
            if key.0 > self.clock_ms {
                break;
            }
            self.sleeps.remove(&key);
            self.finish(idx, &mut started);
        }
        started
    }

    /// Play the rest of the tree onto `view` with every leaf completing
    /// immediately and sleeps fast-forwarded. Returns the simulated time spent
    /// sleeping.
    pub fn run_to_end(&mut self, view: &mut BoardView) -> Result<u64, ReplayError> {
        let began = self.clock_ms;
        let mut queue: VecDeque<(ReactionId, bool)> = if self.started {
            self.running().into_iter().map(|id| (id, false)).collect()
        } else {
            self.start().into_iter().map(|id| (id, true)).collect()
        };

        loop {
            while let Some((id, needs_apply)) = queue.pop_front() {
                if needs_apply {
                    if let Some(leaf) = self.leaf(id) {
                        view.apply(leaf)?;
                    }
                }
                queue.extend(self.complete(id)?.into_iter().map(|next| (next, true)));
            }
            if self.finished {
                break;
            }
            let deadline = self.next_deadline().ok_or(ReplayError::Stalled)?;
            let step = deadline.saturating_sub(self.clock_ms);
            queue.extend(self.advance(step).into_iter().map(|next| (next, true)));
        }
        Ok(self.clock_ms - began)
    }

    fn activate(&mut self, idx: usize, started: &mut Vec<ReactionId>) {
        match &self.nodes[idx].body {
            Body::Leaf(leaf) => {
                let id = leaf.id;
                log::trace!(target: trace::APPLY, "start {} {}", id, leaf.name());
                if let ReactionKind::Sleep { duration_ms } = leaf.kind {
                    let deadline = self.clock_ms + u64::from(duration_ms);
                    self.sleeps.insert((deadline, id), idx);
                } else {
                    self.active.insert(id, idx);
                    started.push(id);
                }
            }
            Body::Sequence { children, .. } => {
                let first = children.first().copied();
                match first {
                    Some(first) => self.activate(first, started),
                    None => self.finish(idx, started),
                }
            }
            Body::Parallel { children, .. } => {
                if children.is_empty() {
                    self.finish(idx, started);
                } else {
                    for child in children.clone() {
                        self.activate(child, started);
                    }
                }
            }
        }
    }

    fn finish(&mut self, idx: usize, started: &mut Vec<ReactionId>) {
        let Some(parent) = self.nodes[idx].parent else {
            log::trace!(target: trace::APPLY, "tree finished at {} ms", self.clock_ms);
            self.finished = true;
            return;
        };
        let next = match &mut self.nodes[parent].body {
            Body::Sequence { children, cursor } => {
                *cursor += 1;
                match children.get(*cursor) {
                    Some(&child) => Next::Activate(child),
                    None => Next::Finish,
                }
            }
            Body::Parallel { pending, .. } => {
                *pending = pending.saturating_sub(1);
                if *pending == 0 { Next::Finish } else { Next::Wait }
            }
            Body::Leaf(_) => Next::Wait,
        };
        match next {
            Next::Activate(child) => self.activate(child, started),
            Next::Finish => self.finish(parent, started),
            Next::Wait => {}
        }
    }
}

fn flatten(nodes: &mut Vec<Node>, reaction: Reaction, parent: Option<usize>) -> usize {
    let idx = nodes.len();
    let Reaction { id, kind } = reaction;
    match kind {
        ReactionKind::Sequence(children) => {
            nodes.push(Node {
                parent,
                body: Body::Sequence {
                    children: Vec::new(),
                    cursor: 0,
                },
            });
            let flat: Vec<usize> = children
                .into_iter()
                .map(|child| flatten(nodes, child, Some(idx)))
                .collect();
            if let Body::Sequence { children, .. } = &mut nodes[idx].body {
                *children = flat;
            }
        }
        ReactionKind::Parallel(children) => {
            nodes.push(Node {
                parent,
                body: Body::Parallel {
                    children: Vec::new(),
                    pending: children.len(),
                },
            });
            let flat: Vec<usize> = children
                .into_iter()
                .map(|child| flatten(nodes, child, Some(idx)))
                .collect();
            if let Body::Parallel { children, .. } = &mut nodes[idx].body {
                *children = flat;
            }
        }
        kind => nodes.push(Node {
            parent,
            body: Body::Leaf(Reaction { id, kind }),
        }),
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{IdAllocator, Position, Side};

    fn create(ids: &mut IdAllocator, row: usize) -> Reaction {
        let orb = ids.orb();
        Reaction::new(
            ids,
            ReactionKind::CreateOrb {
                orb,
                side: Side::One,
                at: Position::new(row, 0),
            },
        )
    }

    #[test]
    fn test_sequence_runs_in_order() {
        let mut ids = IdAllocator::new();
        let a = create(&mut ids, 0);
        let b = create(&mut ids, 1);
        let (a_id, b_id) = (a.id, b.id);
        let mut runner = Runner::new(Reaction::sequence(&mut ids, vec![a, b]));

        assert_eq!(runner.start(), vec![a_id]);
        assert_eq!(runner.complete(a_id).unwrap(), vec![b_id]);
        assert!(!runner.is_finished());
        assert!(runner.complete(b_id).unwrap().is_empty());
        assert!(runner.is_finished());
    }

    #[test]
    fn test_parallel_waits_for_all() {
        let mut ids = IdAllocator::new();
        let a = create(&mut ids, 0);
        let b = create(&mut ids, 1);
        let after = create(&mut ids, 2);
        let (a_id, b_id, after_id) = (a.id, b.id, after.id);
        let group = Reaction::parallel(&mut ids, vec![a, b]);
        let mut runner = Runner::new(Reaction::sequence(&mut ids, vec![group, after]));

        assert_eq!(runner.start(), vec![a_id, b_id]);
        assert!(runner.complete(b_id).unwrap().is_empty());
        assert_eq!(runner.complete(a_id).unwrap(), vec![after_id]);
        runner.complete(after_id).unwrap();
        assert!(runner.is_finished());
    }

    #[test]
    fn test_sleep_completes_on_clock() {
        let mut ids = IdAllocator::new();
        let nap = Reaction::sleep(&mut ids, 300);
        let nap_id = nap.id;
        let next = create(&mut ids, 0);
        let next_id = next.id;
        let mut runner = Runner::new(Reaction::sequence(&mut ids, vec![nap, next]));

        assert!(runner.start().is_empty());
        assert_eq!(runner.next_deadline(), Some(300));
        assert_eq!(
            runner.complete(nap_id),
            Err(ReplayError::SleepNotCompletable(nap_id))
        );
        assert!(runner.advance(299).is_empty());
        assert_eq!(runner.advance(1), vec![next_id]);
        assert_eq!(runner.clock_ms(), 300);
    }

    #[test]
    fn test_empty_composites_finish_immediately() {
        let mut ids = IdAllocator::new();
        let empty = Reaction::parallel(&mut ids, Vec::new());
        let mut runner = Runner::new(empty);
        assert!(runner.start().is_empty());
        assert!(runner.is_finished());

        let inner = Reaction::sequence(&mut ids, Vec::new());
        let leaf = create(&mut ids, 0);
        let leaf_id = leaf.id;
        let mut runner = Runner::new(Reaction::parallel(&mut ids, vec![inner, leaf]));
        assert_eq!(runner.start(), vec![leaf_id]);
        runner.complete(leaf_id).unwrap();
        assert!(runner.is_finished());
    }

    #[test]
    fn test_unknown_and_double_completion() {
        let mut ids = IdAllocator::new();
        let a = create(&mut ids, 0);
        let a_id = a.id;
        let mut runner = Runner::new(a);
        runner.start();
        runner.complete(a_id).unwrap();
        assert_eq!(runner.complete(a_id), Err(ReplayError::UnknownLeaf(a_id)));
    }

    #[test]
    fn test_run_to_end_applies_everything() {
        let mut ids = IdAllocator::new();
        let a = create(&mut ids, 0);
        let nap = Reaction::sleep(&mut ids, 120);
        let b = create(&mut ids, 1);
        let tree = Reaction::sequence(&mut ids, vec![a, nap, b]);
        let mut view = BoardView::new(3);
        let mut runner = Runner::new(tree);

        assert_eq!(runner.run_to_end(&mut view).unwrap(), 120);
        assert!(runner.is_finished());
        assert_eq!(view.orbs().len(), 2);
    }

    #[test]
    fn test_run_to_end_after_partial_playback() {
        let mut ids = IdAllocator::new();
        let a = create(&mut ids, 0);
        let b = create(&mut ids, 1);
        let tree = Reaction::sequence(&mut ids, vec![a, b]);
        let mut view = BoardView::new(3);
        let mut runner = Runner::new(tree);

        // The caller played the first leaf already
        for id in runner.start() {
            view.apply(runner.leaf(id).unwrap()).unwrap();
        }
        runner.run_to_end(&mut view).unwrap();
        assert_eq!(view.orbs().len(), 2);
    }
}
