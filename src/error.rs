use std::fmt;

/// Why a guess was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessRejection {
    NoActiveRound,
    AlreadyRevealed,
    OutOfRange(usize),
}

impl fmt::Display for GuessRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuessRejection::NoActiveRound => write!(f, "no active round"),
            GuessRejection::AlreadyRevealed => write!(f, "round already revealed"),
            GuessRejection::OutOfRange(index) => write!(f, "slot {} is not 0 or 1", index),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    /// Network or parse failure talking to the item API. Never fatal: the
    /// buffer stays as it was and the next take/refill tries again.
    #[error("item source unavailable ({endpoint}): {reason}")]
    SourceUnavailable { endpoint: String, reason: String },

    #[error("not enough eligible stories for a round ({available} available, 2 needed)")]
    InsufficientSupply { available: usize },

    #[error("guess ignored: {0}")]
    InvalidGuess(GuessRejection),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DuelError {
    pub(crate) fn source_unavailable(endpoint: impl Into<String>, reason: impl fmt::Display) -> Self {
        DuelError::SourceUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DuelError>;
