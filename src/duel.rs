//! Round state machine.
//!
//! ```text
//!   NoRound ──start_round──▶ AwaitingGuess ──guess──▶ Revealed
//!      ▲                          ▲                      │
//!      └──── supply short ────────┴── countdown / advance┘
//! ```
//!
//! The controller is single-owner; the presentation layer calls intents on
//! it and reads accessors back. Timer ticks arrive as [`Tick`] messages and
//! are checked against the currently armed [`Ticker`] before they count.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace};

use crate::config::{MissPenalty, PairingStrategy, RoundConfig, TieBreak};
use crate::error::{DuelError, GuessRejection, Result};
use crate::models::HackerNewsItem;
use crate::supply::SupplyBuffer;
use crate::timer::{Countdown, CountdownStep, Tick, Ticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    NoRound,
    AwaitingGuess,
    Revealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reveal {
    selected: usize,
    correct: usize,
}

#[derive(Debug, Clone)]
struct Round {
    pair: [HackerNewsItem; 2],
    // Selected and correct slot are set together
    reveal: Option<Reveal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scoreboard {
    pub score: i64,
    pub streak: u32,
    pub longest_streak: u32,
    pub correct: u32,
    pub incorrect: u32,
}

impl Scoreboard {
    pub fn record(&mut self, correct: bool, penalty: MissPenalty) {
        if correct {
            self.score += 1;
            self.streak += 1;
            self.longest_streak = self.longest_streak.max(self.streak);
            self.correct += 1;
        } else {
            self.streak = 0;
            self.incorrect += 1;
            match penalty {
                MissPenalty::Subtract => self.score -= 1,
                MissPenalty::SubtractFloorZero => self.score = (self.score - 1).max(0),
                MissPenalty::None => {}
            }
        }
    }

    /// New game within the same session. The session best survives.
    pub fn reset(&mut self) {
        *self = Scoreboard {
            longest_streak: self.longest_streak,
            ..Scoreboard::default()
        };
    }

    pub fn accuracy(&self) -> Option<f64> {
        let total = self.correct + self.incorrect;
        (total > 0).then(|| f64::from(self.correct) / f64::from(total))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessOutcome {
    pub selected: usize,
    pub correct_index: usize,
    pub correct: bool,
    pub score: i64,
    pub streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not counting down (no reveal, or a stale tick).
    Idle,
    Paused,
    Counting(u32),
    Advanced,
    /// Countdown ran out and no new pair could be drawn.
    Exhausted,
}

/// Slot holding the higher score from the point of view of `guess`.
pub fn winning_slot(pair: &[HackerNewsItem; 2], guess: usize, tie_break: TieBreak) -> usize {
    let other = 1 - guess;
    let (mine, theirs) = (pair[guess].score, pair[other].score);
    let guess_wins = match tie_break {
        TieBreak::Guessed => mine >= theirs,
        TieBreak::Opponent => mine > theirs,
    };
    if guess_wins {
        guess
    } else {
        other
    }
}

pub struct DuelController {
    supply: SupplyBuffer,
    config: RoundConfig,
    round: Option<Round>,
    countdown: Countdown,
    scoreboard: Scoreboard,
    rounds_started: u64,
    ticks: Option<UnboundedSender<Tick>>,
    ticker: Option<Ticker>,
}

impl DuelController {
    pub fn new(supply: SupplyBuffer, config: RoundConfig) -> Self {
        let countdown = Countdown::new(config.countdown_secs);
        Self {
            supply,
            config,
            round: None,
            countdown,
            scoreboard: Scoreboard::default(),
            rounds_started: 0,
            ticks: None,
            ticker: None,
        }
    }

    /// Arm a real timer after each reveal, delivering ticks on `tx`.
    /// Without this the owner drives `tick` itself.
    pub fn with_ticks(mut self, tx: UnboundedSender<Tick>) -> Self {
        self.ticks = Some(tx);
        self
    }

    pub fn phase(&self) -> RoundPhase {
        match &self.round {
            None => RoundPhase::NoRound,
            Some(Round { reveal: None, .. }) => RoundPhase::AwaitingGuess,
            Some(Round { reveal: Some(_), .. }) => RoundPhase::Revealed,
        }
    }

    pub fn current_pair(&self) -> Option<&[HackerNewsItem; 2]> {
        self.round.as_ref().map(|round| &round.pair)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.reveal().map(|reveal| reveal.selected)
    }

    pub fn correct_index(&self) -> Option<usize> {
        self.reveal().map(|reveal| reveal.correct)
    }

    fn reveal(&self) -> Option<Reveal> {
        self.round.as_ref().and_then(|round| round.reveal)
    }

    pub fn score(&self) -> i64 {
        self.scoreboard.score
    }

    pub fn streak(&self) -> u32 {
        self.scoreboard.streak
    }

    pub fn longest_streak(&self) -> u32 {
        self.scoreboard.longest_streak
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn countdown(&self) -> u32 {
        self.countdown.remaining()
    }

    pub fn is_paused(&self) -> bool {
        self.countdown.is_paused()
    }

    /// Rounds started so far this session.
    pub fn round_number(&self) -> u64 {
        self.rounds_started
    }

    pub fn armed_timer(&self) -> Option<u64> {
        self.ticker.as_ref().map(Ticker::id)
    }

    pub fn supply(&self) -> &SupplyBuffer {
        &self.supply
    }

    fn arm_timer(&mut self) {
        if let Some(tx) = &self.ticks {
            // Replacing a previous ticker drops and aborts it
            self.ticker = Some(Ticker::spawn(self.config.tick_interval(), tx.clone()));
        }
    }

    fn disarm_timer(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            trace!(timer = ticker.id(), "timer cancelled");
        }
    }

    /// Draw a new pair. With fewer than two stories available the controller
    /// ends up in `NoRound` and any lone story goes back to the buffer.
    pub async fn start_round(&mut self) -> Result<()> {
        self.disarm_timer();
        self.countdown.reset();

        let drawn = match self.config.pairing {
            PairingStrategy::Sequential => self.supply.take(2).await,
            PairingStrategy::Random => self.supply.take_random(2).await,
        };
        let pair: [HackerNewsItem; 2] = match drawn.try_into() {
            Ok(pair) => pair,
            Err(partial) => {
                let available = partial.len();
                self.supply.put_back(partial);
                self.round = None;
                info!(available, "no round possible");
                return Err(DuelError::InsufficientSupply { available });
            }
        };

        self.rounds_started += 1;
        info!(
            round = self.rounds_started,
            left = pair[0].id,
            right = pair[1].id,
            "round started"
        );
        self.round = Some(Round { pair, reveal: None });
        Ok(())
    }

    /// Score a guess, or explain why it doesn't count.
    pub fn try_guess(&mut self, index: usize) -> Result<GuessOutcome> {
        let round = self
            .round
            .as_mut()
            .ok_or(DuelError::InvalidGuess(GuessRejection::NoActiveRound))?;
        if round.reveal.is_some() {
            return Err(DuelError::InvalidGuess(GuessRejection::AlreadyRevealed));
        }
        if index > 1 {
            return Err(DuelError::InvalidGuess(GuessRejection::OutOfRange(index)));
        }

        let correct_index = winning_slot(&round.pair, index, self.config.tie_break);
        round.reveal = Some(Reveal {
            selected: index,
            correct: correct_index,
        });
        let correct = correct_index == index;
        self.scoreboard.record(correct, self.config.miss_penalty);

        self.countdown.reset();
        self.arm_timer();

        info!(
            round = self.rounds_started,
            selected = index,
            correct,
            score = self.scoreboard.score,
            streak = self.scoreboard.streak,
            "guess scored"
        );
        Ok(GuessOutcome {
            selected: index,
            correct_index,
            correct,
            score: self.scoreboard.score,
            streak: self.scoreboard.streak,
        })
    }

    /// Guess intent from the UI. Late, duplicate or out-of-range guesses are
    /// dropped silently.
    pub fn guess(&mut self, index: usize) -> Option<GuessOutcome> {
        match self.try_guess(index) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                debug!(error = %err, "ignoring guess");
                None
            }
        }
    }

    /// Pause or resume the countdown. Only meaningful after a reveal;
    /// returns the new paused state.
    pub fn pause_toggle(&mut self) -> Option<bool> {
        if self.phase() != RoundPhase::Revealed {
            debug!(phase = ?self.phase(), "ignoring pause outside reveal");
            return None;
        }
        let paused = self.countdown.toggle_pause();
        if paused {
            self.disarm_timer();
        } else {
            self.arm_timer();
        }
        debug!(paused, remaining = self.countdown.remaining(), "pause toggled");
        Some(paused)
    }

    /// "Next": move on from a revealed round, or retry after running out.
    /// Skipping an unanswered pair is not allowed.
    pub async fn advance(&mut self) -> Result<()> {
        match self.phase() {
            RoundPhase::AwaitingGuess => {
                debug!("ignoring advance before a guess");
                Ok(())
            }
            RoundPhase::Revealed | RoundPhase::NoRound => self.start_round().await,
        }
    }

    /// Start over: zero the score and streak, keep the session's best streak.
    pub async fn restart(&mut self) -> Result<()> {
        info!(score = self.scoreboard.score, "restarting");
        self.scoreboard.reset();
        self.start_round().await
    }

    /// One elapsed second of countdown.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.phase() != RoundPhase::Revealed {
            return TickOutcome::Idle;
        }
        match self.countdown.tick() {
            CountdownStep::Paused => TickOutcome::Paused,
            CountdownStep::Running(remaining) => TickOutcome::Counting(remaining),
            CountdownStep::Expired => match self.start_round().await {
                Ok(()) => TickOutcome::Advanced,
                Err(_) => TickOutcome::Exhausted,
            },
        }
    }

    /// Apply a tick from a ticker, ignoring ones from cancelled timers.
    pub async fn handle_tick(&mut self, tick: Tick) -> TickOutcome {
        if self.armed_timer() != Some(tick.timer) {
            trace!(timer = tick.timer, "stale tick");
            return TickOutcome::Idle;
        }
        self.tick().await
    }
}
