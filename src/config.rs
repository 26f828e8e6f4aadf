//! Session configuration.
//!
//! Every knob has a default, so an empty (or missing) TOML file yields a
//! playable game. Sections mirror the engine's components:
//!
//! ```toml
//! [source]
//! feed = "best"
//!
//! [supply]
//! min_score = 8
//! max_age_days = 30
//! low_water_mark = 10
//!
//! [round]
//! countdown_secs = 5
//! miss_penalty = "subtract"
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DuelError, Result};
use crate::logging::LogConfig;

pub const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

/// Which upstream ranking supplies candidate ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    Top,
    New,
    #[default]
    Best,
}

impl Feed {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Feed::Top => "topstories",
            Feed::New => "newstories",
            Feed::Best => "beststories",
        }
    }
}

impl FromStr for Feed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(Feed::Top),
            "new" => Ok(Feed::New),
            "best" => Ok(Feed::Best),
            other => Err(format!("unknown feed '{}' (expected top, new or best)", other)),
        }
    }
}

/// Order in which a refill appends its admitted stories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefillOrder {
    /// Shuffle so pairs don't follow the upstream ranking.
    #[default]
    Shuffled,
    Arrival,
}

/// How the controller draws a pair from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingStrategy {
    #[default]
    Sequential,
    Random,
}

/// Who wins when both stories have the same score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    #[default]
    Guessed,
    Opponent,
}

/// What a wrong guess costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPenalty {
    #[default]
    Subtract,
    SubtractFloorZero,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}' (expected pretty or json)", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub feed: Feed,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            feed: Feed::default(),
            timeout_secs: 30,
            user_agent: concat!("hn-duel/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupplyConfig {
    /// Upper bound on candidate ids requested per refill.
    pub batch_size: usize,
    pub min_score: u32,
    pub max_age_days: u32,
    /// Also reject stories without an external link.
    pub require_url: bool,
    pub low_water_mark: usize,
    pub staleness_secs: u64,
    pub max_concurrent_fetches: usize,
    pub order: RefillOrder,
    /// Fixed RNG seed; random when unset.
    pub seed: Option<u64>,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            min_score: 8,
            max_age_days: 30,
            require_url: false,
            low_water_mark: 10,
            staleness_secs: 300,
            max_concurrent_fetches: 16,
            order: RefillOrder::default(),
            seed: None,
        }
    }
}

impl SupplyConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn max_age_secs(&self) -> i64 {
        i64::from(self.max_age_days) * 86_400
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    pub countdown_secs: u32,
    pub tick_interval_ms: u64,
    pub pairing: PairingStrategy,
    pub tie_break: TieBreak,
    pub miss_penalty: MissPenalty,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 5,
            tick_interval_ms: 1_000,
            pairing: PairingStrategy::default(),
            tie_break: TieBreak::default(),
            miss_penalty: MissPenalty::default(),
        }
    }
}

impl RoundConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    pub source: SourceConfig,
    pub supply: SupplyConfig,
    pub round: RoundConfig,
    pub logging: LogConfig,
}

impl DuelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DuelError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DuelConfig =
            toml::from_str(text).map_err(|e| DuelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.supply.batch_size == 0 {
            return Err(DuelError::Config("supply.batch_size must be at least 1".into()));
        }
        if self.supply.max_concurrent_fetches == 0 {
            return Err(DuelError::Config(
                "supply.max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if self.round.countdown_secs == 0 {
            return Err(DuelError::Config("round.countdown_secs must be at least 1".into()));
        }
        if self.round.tick_interval_ms == 0 {
            return Err(DuelError::Config("round.tick_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
