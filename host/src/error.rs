use mines_core::{GameError, RejectReason};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("No active round")]
    NoActiveRound,
    #[error("A round is already in progress")]
    RoundInProgress,
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },
    #[error("Bet must be between {min} and {max}")]
    BetOutOfRange { min: u64, max: u64 },
    #[error("Amount must be positive and fit the balance")]
    InvalidAmount,
    #[error("Move {sent} was already superseded, round is at move {committed}")]
    StaleSequence { sent: u32, committed: u32 },
    #[error("Move {sent} is ahead of the round, which is at move {committed}")]
    SequenceGap { sent: u32, committed: u32 },
    #[error("Move rejected: {0}")]
    Rejected(RejectReason),
    #[error("Could not gather entropy: {0}")]
    Entropy(String),
    #[error("Internal state lock was poisoned")]
    Poisoned,
    #[error(transparent)]
    Game(#[from] GameError),
}

pub type Result<T> = core::result::Result<T, HostError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(&'static str),
}
