//! Chain Reaction entry point
//!
//! Plays a seeded self-play game headlessly: both sides tap random cells,
//! every reaction tree is replayed instantly onto the board mirror.
//!
//! Usage: `chain-reaction [seed] [settings.json]`

use std::path::Path;
use std::process::ExitCode;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use chain_reaction::sim::Position;
use chain_reaction::{Admission, Session, SessionError, Settings, trace};

/// Moves before the driver gives up on a game
const MAX_MOVES: usize = 500;
/// Random taps tried per move before giving up on finding a legal one
const MAX_TAPS: usize = 1_000;

struct SelfPlay {
    session: Session,
    rng: Pcg32,
    moves: usize,
    replay_ms: u64,
}

impl SelfPlay {
    fn new(settings: Settings, seed: u64) -> Result<Self, SessionError> {
        let mut session = Session::new(settings)?;
        let replay_ms = session.finish_replay()?;
        Ok(Self {
            session,
            rng: Pcg32::seed_from_u64(seed),
            moves: 0,
            replay_ms,
        })
    }

    /// Tap random cells until one is accepted. Returns false when no legal
    /// tap was found.
    fn play_move(&mut self) -> Result<bool, SessionError> {
        let size = self.session.settings().board_size;
        let side = self.session.current_side();
        for _ in 0..MAX_TAPS {
            let pos = Position::new(self.rng.random_range(0..size), self.rng.random_range(0..size));
            match self.session.press(pos)? {
                Admission::Accepted { .. } => {
                    self.replay_ms += self.session.finish_replay()?;
                    self.moves += 1;
                    log::info!("Move {}: {side} taps {pos}", self.moves);
                    log::debug!(target: trace::STATE, "\n{}", self.session.snapshot());
                    return Ok(true);
                }
                Admission::Rejected(reason) => {
                    log::trace!(target: trace::COMMAND, "{pos} rejected: {reason:?}");
                }
            }
        }
        Ok(false)
    }

    fn run(&mut self) -> Result<(), SessionError> {
        while self.moves < MAX_MOVES && self.session.winner().is_none() {
            if !self.play_move()? {
                log::warn!("{} found no legal tap", self.session.current_side());
                break;
            }
        }

        match self.session.winner() {
            Some(winner) => log::info!("{winner} wins after {} moves", self.moves),
            None => log::info!("No winner after {} moves", self.moves),
        }
        log::info!(
            "Replay would have taken {:.1}s of cascade pauses",
            self.replay_ms as f64 / 1000.0
        );
        println!("{}", self.session.snapshot());
        Ok(())
    }
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let seed = args
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
    let settings = match args.next() {
        Some(path) => Settings::load(Path::new(&path)),
        None => Settings::default(),
    };

    if let Err(e) = trace::logger_for(&settings.trace).try_init() {
        eprintln!("Logger already initialized: {e}");
    }
    log::info!("Chain Reaction self-play starting (seed {seed})");

    match SelfPlay::new(settings, seed).and_then(|mut game| game.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
