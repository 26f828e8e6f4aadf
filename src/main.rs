use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use hn_duel::config::{DuelConfig, Feed, LogFormat};
use hn_duel::logging::init_logging;
use hn_duel::models::now_unix;
use hn_duel::{
    DuelController, HackerNewsClient, HackerNewsItem, RoundPhase, SupplyBuffer, TickOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "hn-duel", version, about = "Guess which Hacker News story got more points")]
struct Cli {
    /// TOML config file
    #[arg(long, env = "HN_DUEL_CONFIG")]
    config: Option<PathBuf>,

    /// Story list to draw from (top, new, best)
    #[arg(long)]
    feed: Option<Feed>,

    /// Seed for shuffling and random pairing
    #[arg(long)]
    seed: Option<u64>,

    /// Minimum points for a story to be played
    #[arg(long)]
    min_score: Option<u32>,

    /// Seconds before the next pair after a guess
    #[arg(long)]
    countdown: Option<u32>,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, config: &mut DuelConfig) {
        if let Some(feed) = self.feed {
            config.source.feed = feed;
        }
        if let Some(seed) = self.seed {
            config.supply.seed = Some(seed);
        }
        if let Some(min_score) = self.min_score {
            config.supply.min_score = min_score;
        }
        if let Some(countdown) = self.countdown {
            config.round.countdown_secs = countdown;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Guess(usize),
    Pause,
    Next,
    OpenArticle(usize),
    OpenDiscussion(usize),
    Restart,
    Help,
    Quit,
}

// Slots are shown to the player as 1 and 2
fn parse_slot(text: &str) -> Option<usize> {
    match text.trim() {
        "1" => Some(0),
        "2" => Some(1),
        _ => None,
    }
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim().to_ascii_lowercase();
    if let Some(slot) = parse_slot(&line) {
        return Some(Command::Guess(slot));
    }
    match line.as_str() {
        "p" | "pause" | "resume" => return Some(Command::Pause),
        "n" | "next" | "" => return Some(Command::Next),
        "r" | "restart" => return Some(Command::Restart),
        "h" | "help" | "?" => return Some(Command::Help),
        "q" | "quit" | "exit" => return Some(Command::Quit),
        _ => {}
    }
    if let Some(rest) = line.strip_prefix('o') {
        return parse_slot(rest).map(Command::OpenArticle);
    }
    if let Some(rest) = line.strip_prefix('c') {
        return parse_slot(rest).map(Command::OpenDiscussion);
    }
    None
}

struct DuelApp {
    duel: DuelController,
}

impl DuelApp {
    fn new(duel: DuelController) -> Self {
        Self { duel }
    }

    /// Returns false when the player wants out.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Guess(slot) => {
                if self.duel.guess(slot).is_none() && self.duel.phase() == RoundPhase::Revealed {
                    println!("Already guessed. [n] for the next pair.");
                }
            }
            Command::Pause => {
                if self.duel.pause_toggle().is_none() {
                    println!("Nothing to pause yet.");
                }
            }
            Command::Next => {
                if let Err(e) = self.duel.advance().await {
                    info!(error = %e, "advance found no pair");
                }
            }
            Command::OpenArticle(slot) => self.open_slot(slot, HackerNewsItem::link),
            Command::OpenDiscussion(slot) => self.open_slot(slot, HackerNewsItem::discussion_url),
            Command::Restart => {
                if let Err(e) = self.duel.restart().await {
                    info!(error = %e, "restart found no pair");
                }
            }
            Command::Help => print_help(),
            Command::Quit => return false,
        }
        true
    }

    // Links stay hidden until the scores are revealed
    fn open_slot(&self, slot: usize, url_of: fn(&HackerNewsItem) -> String) {
        if self.duel.phase() != RoundPhase::Revealed {
            println!("Make your guess first.");
            return;
        }
        if let Some(pair) = self.duel.current_pair() {
            self.open_link(&url_of(&pair[slot]));
        }
    }

    fn open_link(&self, url: &str) {
        if let Err(e) = open::that(url) {
            warn!(url, error = %e, "failed to open URL");
        }
    }

    fn render(&self) {
        println!();
        println!("=== hacker news duel === round {}", self.duel.round_number());
        println!(
            "Score: {}   Current Streak: {}   Longest Streak: {}",
            self.duel.score(),
            self.duel.streak(),
            self.duel.longest_streak()
        );

        let Some(pair) = self.duel.current_pair() else {
            println!();
            println!("Game over: no more stories to compare.");
            println!("[r] play again   [q] quit");
            return;
        };

        let revealed = self.duel.phase() == RoundPhase::Revealed;
        let now = now_unix();
        println!("Can you predict which post got more points?");
        for (slot, item) in pair.iter().enumerate() {
            let mark = match (self.duel.selected_index(), self.duel.correct_index()) {
                (Some(selected), Some(correct)) if selected == slot && slot == correct => " ✔",
                (Some(selected), _) if selected == slot => " ✘",
                (_, Some(correct)) if correct == slot => " ★",
                _ => "",
            };
            let domain = item.domain();
            let domain = if domain.is_empty() { String::new() } else { format!(" ({})", domain) };
            println!();
            println!("  [{}] {}{}{}", slot + 1, item.title, domain, mark);
            if revealed {
                println!(
                    "      {} points by {} {} | {} comments",
                    item.score,
                    item.by,
                    item.age_label(now),
                    item.comments_count
                );
            } else {
                println!("      ??? points by {} {} | ?? comments", item.by, item.age_label(now));
            }
        }
        println!();

        if revealed {
            self.render_countdown();
            println!("[p] pause/resume   [n] next   [o1/o2] open story   [c1/c2] open comments");
        } else {
            println!("[1] or [2] to guess   [h] help   [q] quit");
        }
    }

    fn render_countdown(&self) {
        if self.duel.is_paused() {
            println!("Paused at {} seconds", self.duel.countdown());
        } else {
            println!("New posts in {} seconds", self.duel.countdown());
        }
    }
}

fn print_help() {
    println!("1, 2     guess the story with more points");
    println!("p        pause or resume the countdown");
    println!("n        next pair (after guessing)");
    println!("o1, o2   open a story's link (after guessing)");
    println!("c1, c2   open a story's comments (after guessing)");
    println!("r        restart the score");
    println!("q        quit");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DuelConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DuelConfig::default(),
    };
    cli.apply(&mut config);
    config.validate().context("invalid settings")?;

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let client = HackerNewsClient::new(&config.source).context("creating HTTP client")?;
    let supply = SupplyBuffer::new(Arc::new(client), config.supply.clone());

    println!("Loading {:?} stories...", config.source.feed);
    match supply.refill_now().await {
        Ok(admitted) => info!(admitted, "initial load complete"),
        Err(e) => warn!(error = %e, "initial load failed"),
    }

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
    let duel = DuelController::new(supply, config.round.clone()).with_ticks(tick_tx);
    let mut app = DuelApp::new(duel);
    if let Err(e) = app.duel.start_round().await {
        info!(error = %e, "no opening round");
    }
    app.render();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match parse_command(&line) {
                    Some(command) => {
                        if !app.handle(command).await {
                            break;
                        }
                    }
                    None => println!("Unknown command '{}'. [h] for help.", line.trim()),
                }
                app.render();
            }
            Some(tick) = tick_rx.recv() => {
                match app.duel.handle_tick(tick).await {
                    TickOutcome::Counting(_) => app.render_countdown(),
                    TickOutcome::Advanced | TickOutcome::Exhausted => app.render(),
                    TickOutcome::Idle | TickOutcome::Paused => {}
                }
            }
        }
    }

    let board = app.duel.scoreboard();
    println!(
        "Final score {} (longest streak {}, {} right / {} wrong)",
        board.score, board.longest_streak, board.correct, board.incorrect
    );
    Ok(())
}
