//! Hacker News Duel: guess which of two recent stories scored higher.
//!
//! The engine is three layers, leaves first:
//!
//! - [`hn_client`]: the upstream listing/detail API behind the [`ItemSource`] trait
//! - [`supply`]: a deduplicated, self-refilling buffer of eligible stories
//! - [`duel`]: the round state machine with countdown, pause and scoring
//!
//! Presentation (the terminal front-end in `main.rs`) only reads controller
//! state and sends intents.

pub mod config;
pub mod duel;
pub mod error;
pub mod hn_client;
pub mod logging;
pub mod models;
pub mod supply;
pub mod timer;

#[cfg(test)]
mod test_support;

pub use config::DuelConfig;
pub use duel::{DuelController, GuessOutcome, RoundPhase, Scoreboard, TickOutcome};
pub use error::{DuelError, GuessRejection};
pub use hn_client::{HackerNewsClient, ItemSource};
pub use models::HackerNewsItem;
pub use supply::SupplyBuffer;
pub use timer::{Tick, Ticker};
