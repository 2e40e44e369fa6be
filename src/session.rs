//! Game sessions
//!
//! A session couples one engine (looked up in a cache keyed by board size and
//! generation) with the replay of the tree its last command produced. Only one
//! command may be in flight: presses are rejected until the replay finished.

use std::collections::HashMap;

use thiserror::Error;

use crate::replay::{BoardView, Runner};
use crate::settings::Settings;
use crate::sim::{
    Command, CommandError, Engine, EngineConfig, Position, ReactionId, ReplayError, Side, SimError,
};
use crate::trace;

/// Identifies one engine instance. Restart bumps the generation so the new
/// game starts from a clean board and id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub board_size: usize,
    pub generation: u64,
}

/// Engines by session key
#[derive(Debug, Default)]
pub struct SessionCache {
    engines: HashMap<SessionKey, Engine>,
    /// Configuration for new engines; the board size comes from the key
    config: EngineConfig,
}

impl SessionCache {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engines: HashMap::new(),
            config,
        }
    }

    /// Look up the engine for `key`, creating a fresh one on first use
    pub fn get_or_create(&mut self, key: SessionKey) -> &mut Engine {
        let config = EngineConfig {
            board_size: key.board_size,
            ..self.config
        };
        self.engines.entry(key).or_insert_with(|| {
            log::debug!(
                "New engine: {}x{} generation {}",
                key.board_size,
                key.board_size,
                key.generation
            );
            Engine::with_config(config)
        })
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Engine> {
        self.engines.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Engine> {
        self.engines.get_mut(key)
    }

    /// Drop every engine older than `generation`
    pub fn evict_before(&mut self, generation: u64) {
        self.engines.retain(|key, _| key.generation >= generation);
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Why a press or command was not forwarded to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The previous tree is still replaying
    ReplayInFlight,
    /// A `FinishGame` has been emitted
    GameOver,
    /// Pressed an orb owned by the other side
    OpponentOrb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The command ran; these leaves are now playing
    Accepted { started: Vec<ReactionId> },
    Rejected(Rejection),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Starting layout: {0}")]
    Layout(#[from] SimError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// One game: engine, board mirror, and whose turn it is
#[derive(Debug)]
pub struct Session {
    settings: Settings,
    cache: SessionCache,
    generation: u64,
    side: Side,
    runner: Option<Runner>,
    view: BoardView,
    winner: Option<Side>,
}

impl Session {
    /// Start a session; the starting layout begins replaying immediately
    pub fn new(settings: Settings) -> Result<Self, SessionError> {
        let mut session = Self {
            cache: SessionCache::new(settings.engine_config()),
            view: BoardView::new(settings.board_size),
            settings,
            generation: 0,
            side: Side::One,
            runner: None,
            winner: None,
        };
        session.begin()?;
        Ok(session)
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            board_size: self.settings.board_size,
            generation: self.generation,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Side whose turn it is
    pub fn current_side(&self) -> Side {
        self.side
    }

    pub fn view(&self) -> &BoardView {
        &self.view
    }

    pub fn runner(&self) -> Option<&Runner> {
        self.runner.as_ref()
    }

    pub fn engine(&self) -> Option<&Engine> {
        self.cache.get(&self.key())
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    /// True while a tree is replaying
    pub fn is_busy(&self) -> bool {
        self.runner.is_some()
    }

    /// Board in layout notation
    pub fn snapshot(&self) -> String {
        self.engine().map(Engine::snapshot).unwrap_or_default()
    }

    /// Turn a tap on a cell into a command: grow an own orb, or place a new
    /// one on an empty cell
    pub fn press(&mut self, pos: Position) -> Result<Admission, SessionError> {
        if let Some(rejection) = self.gate() {
            return Ok(Admission::Rejected(rejection));
        }
        log::debug!(target: trace::COMMAND, "press {pos} by {}", self.side);

        let command = match self.view.orb_at(pos) {
            Some(orb) if orb.side != self.side => {
                log::debug!(target: trace::COMMAND, "{} belongs to {}", orb.id, orb.side);
                return Ok(Admission::Rejected(Rejection::OpponentOrb));
            }
            Some(orb) => Command::Increment {
                orb: orb.id,
                to: orb.protons.len() as u8 + 1,
            },
            None => Command::Create {
                pos,
                side: self.side,
                count: 1,
            },
        };
        self.submit(command)
    }

    /// Run a command for the current side and start replaying its tree
    pub fn submit(&mut self, command: Command) -> Result<Admission, SessionError> {
        if let Some(rejection) = self.gate() {
            return Ok(Admission::Rejected(rejection));
        }

        let key = self.key();
        let tree = self.cache.get_or_create(key).run_command(&command, self.side)?;
        if let Some(winner) = tree.winner() {
            log::info!("Game over: {winner} wins");
            self.winner = Some(winner);
        }
        self.side = self.side.opponent();

        let started = self.play(Runner::new(tree))?;
        Ok(Admission::Accepted { started })
    }

    /// Forward a completion signal for a playing leaf. Returns the leaves
    /// started as a consequence.
    pub fn complete(&mut self, id: ReactionId) -> Result<Vec<ReactionId>, SessionError> {
        let runner = self.runner.as_mut().ok_or(ReplayError::UnknownLeaf(id))?;
        let started = runner.complete(id)?;
        apply_started(runner, &mut self.view, &started)?;
        self.settle();
        Ok(started)
    }

    /// Move the replay clock forward
    pub fn advance(&mut self, elapsed_ms: u64) -> Result<Vec<ReactionId>, SessionError> {
        let Some(runner) = self.runner.as_mut() else {
            return Ok(Vec::new());
        };
        let started = runner.advance(elapsed_ms);
        apply_started(runner, &mut self.view, &started)?;
        self.settle();
        Ok(started)
    }

    /// Play the rest of the current tree instantly. Returns the time that
    /// would have been spent sleeping.
    pub fn finish_replay(&mut self) -> Result<u64, SessionError> {
        let Some(mut runner) = self.runner.take() else {
            return Ok(0);
        };
        Ok(runner.run_to_end(&mut self.view)?)
    }

    /// Abandon the current game and start the next generation
    pub fn restart(&mut self) -> Result<(), SessionError> {
        if self.runner.take().is_some() {
            log::debug!("Restart dropped an unfinished replay");
        }
        self.generation += 1;
        self.cache.evict_before(self.generation);
        self.side = Side::One;
        self.winner = None;
        self.view = BoardView::new(self.settings.board_size);
        log::info!("Restarted (generation {})", self.generation);
        self.begin()
    }

    /// Lay out the starting board and replay its appearance
    fn begin(&mut self) -> Result<(), SessionError> {
        let placements = self.settings.placements()?;
        let key = self.key();
        let tree = self.cache.get_or_create(key).initialize(&placements)?;
        self.play(Runner::new(tree))?;
        Ok(())
    }

    fn gate(&self) -> Option<Rejection> {
        if self.runner.is_some() {
            Some(Rejection::ReplayInFlight)
        } else if self.winner.is_some() {
            Some(Rejection::GameOver)
        } else {
            None
        }
    }

    fn play(&mut self, mut runner: Runner) -> Result<Vec<ReactionId>, ReplayError> {
        let started = runner.start();
        apply_started(&runner, &mut self.view, &started)?;
        self.runner = Some(runner);
        self.settle();
        Ok(started)
    }

    fn settle(&mut self) {
        if self.runner.as_ref().is_some_and(Runner::is_finished) {
            self.runner = None;
        }
    }
}

fn apply_started(
    runner: &Runner,
    view: &mut BoardView,
    started: &[ReactionId],
) -> Result<(), ReplayError> {
    for &id in started {
        if let Some(leaf) = runner.leaf(id) {
            view.apply(leaf)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LayoutPreset;
    use proptest::prelude::*;

    fn session(settings: Settings) -> Session {
        let mut session = Session::new(settings).unwrap();
        session.finish_replay().unwrap();
        session
    }

    fn custom(layout: &str, board_size: usize) -> Settings {
        Settings {
            board_size,
            custom_layout: Some(layout.into()),
            ..Settings::default()
        }
    }

    /// Drive the current replay leaf by leaf, the way a renderer would
    fn drive(session: &mut Session) {
        while let Some(runner) = session.runner() {
            let running = runner.running();
            if running.is_empty() {
                let step = runner.next_deadline().unwrap() - runner.clock_ms();
                session.advance(step).unwrap();
            } else {
                for id in running {
                    session.complete(id).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_starting_layout_replays() {
        let mut session = Session::new(Settings::from_preset(LayoutPreset::Thing)).unwrap();
        assert!(session.is_busy());
        assert_eq!(
            session.press(Position::new(0, 0)).unwrap(),
            Admission::Rejected(Rejection::ReplayInFlight)
        );

        session.finish_replay().unwrap();
        assert!(!session.is_busy());
        let engine = session.engine().unwrap();
        assert!(session.view().matches(engine.orbs()));
        assert_eq!(session.view().orbs().len(), 4);
        assert_eq!(engine.config(), &session.settings().engine_config());
    }

    #[test]
    fn test_press_alternates_sides() {
        let mut session = session(Settings::default());
        assert_eq!(session.current_side(), Side::One);

        let admission = session.press(Position::new(0, 0)).unwrap();
        assert!(matches!(admission, Admission::Accepted { .. }));
        assert_eq!(session.current_side(), Side::Two);
        session.finish_replay().unwrap();

        // Side two may not touch side one's orb
        assert_eq!(
            session.press(Position::new(0, 0)).unwrap(),
            Admission::Rejected(Rejection::OpponentOrb)
        );
        assert_eq!(session.current_side(), Side::Two);

        session.press(Position::new(4, 4)).unwrap();
        session.finish_replay().unwrap();
        session.press(Position::new(0, 0)).unwrap();
        session.finish_replay().unwrap();

        let grown = session.view().orb_at(Position::new(0, 0)).unwrap();
        assert_eq!(grown.protons.len(), 2);
        assert!(session.view().matches(session.engine().unwrap().orbs()));
    }

    #[test]
    fn test_engine_errors_do_not_switch_turns() {
        let mut session = session(Settings::default());
        let err = session.press(Position::new(9, 9)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Command(CommandError {
                kind: SimError::OutOfBounds { .. },
                ..
            })
        ));
        assert_eq!(session.current_side(), Side::One);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_bad_layout_is_reported() {
        let err = Session::new(custom("▲9|  ", 3)).unwrap_err();
        assert!(matches!(err, SessionError::Layout(SimError::InvalidLayout(_))));
    }

    #[test]
    fn test_manual_playback_of_detonation() {
        let mut session = session(custom(
            "▼1|  |  |  |  \n  |  |  |  |  \n  |  |▲3|  |  \n  |  |  |  |  \n  |  |  |  |  ",
            5,
        ));
        let admission = session.press(Position::new(2, 2)).unwrap();
        let Admission::Accepted { started } = admission else {
            panic!("press rejected: {admission:?}");
        };
        assert!(!started.is_empty());
        assert!(session.is_busy());

        drive(&mut session);
        assert!(!session.is_busy());
        assert_eq!(session.view().orbs().len(), 5);
        assert!(session.view().matches(session.engine().unwrap().orbs()));
        assert_eq!(session.winner(), None);
    }

    #[test]
    fn test_game_over_blocks_presses() {
        let mut session = session(custom("▲3|▼1\n  |  ", 2));
        session.press(Position::new(0, 0)).unwrap();
        session.finish_replay().unwrap();

        assert_eq!(session.winner(), Some(Side::One));
        assert_eq!(session.view().winner(), Some(Side::One));
        assert_eq!(
            session.press(Position::new(1, 1)).unwrap(),
            Admission::Rejected(Rejection::GameOver)
        );
    }

    #[test]
    fn test_restart_resets_board_and_ids() {
        let mut session = session(Settings::from_preset(LayoutPreset::Thing));
        let fresh_ids = session.engine().unwrap().ids_allocated();
        let fresh_board = session.snapshot();

        session.press(Position::new(2, 2)).unwrap();
        assert!(session.is_busy());
        // Restart abandons the replay in flight
        session.restart().unwrap();
        session.finish_replay().unwrap();

        assert_eq!(session.generation(), 1);
        assert_eq!(session.cache().len(), 1);
        assert_eq!(session.current_side(), Side::One);
        assert_eq!(session.engine().unwrap().ids_allocated(), fresh_ids);
        assert_eq!(session.snapshot(), fresh_board);
        assert!(session.view().matches(session.engine().unwrap().orbs()));
    }

    #[test]
    fn test_cache_lookup_and_eviction() {
        let mut cache = SessionCache::new(EngineConfig {
            board_size: 9,
            cascade_delay_ms: 120,
        });
        let first = SessionKey {
            board_size: 3,
            generation: 0,
        };
        let second = SessionKey {
            generation: 1,
            ..first
        };

        cache
            .get_or_create(first)
            .run_command(
                &Command::Create {
                    pos: Position::new(0, 0),
                    side: Side::One,
                    count: 1,
                },
                Side::One,
            )
            .unwrap();
        assert_eq!(cache.get_or_create(first).orbs().len(), 1);
        assert!(cache.get_or_create(second).orbs().is_empty());
        // Board size follows the key, everything else the cache's config
        assert_eq!(
            *cache.get_or_create(second).config(),
            EngineConfig {
                board_size: 3,
                cascade_delay_ms: 120,
            }
        );
        assert_eq!(cache.len(), 2);

        cache.evict_before(1);
        assert!(cache.get(&first).is_none());
        assert!(cache.get_mut(&second).is_some());
        assert_eq!(cache.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_replay_matches_engine(
            board_size in 2usize..5,
            taps in prop::collection::vec((0usize..5, 0usize..5), 1..40),
        ) {
            let mut session = session(Settings { board_size, ..Settings::default() });
            for (row, col) in taps {
                let pos = Position::new(row % board_size, col % board_size);
                session
                    .press(pos)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                session.finish_replay().unwrap();
                let engine = session.engine().unwrap();
                prop_assert!(session.view().matches(engine.orbs()));
                if session.winner().is_some() {
                    break;
                }
            }
        }
    }
}
