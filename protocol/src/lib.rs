//! JSON messages exchanged between a mines client and the host running its rounds.
//!
//! Field names are `camelCase`. Bomb positions only ever appear in responses about a round that
//! already ended.

use chrono::{DateTime, Utc};
use mines_core::{RevealOutcome, Round, Settlement};
use serde::{Deserialize, Serialize};

pub use mines_core::{Cell, CellCount, GameId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub bet_amount: u64,
    pub bomb_count: CellCount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_seed: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub game_id: GameId,
    pub balance: u64,
    pub bomb_count: CellCount,
    /// Percentage of the grid covered by bombs.
    pub house_edge: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_seed_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRequest {
    pub tile_number: Cell,
    /// Moves already committed on the round when the client sent this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevealStatus {
    Continue,
    GameOver,
    Cleared,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealResponse {
    pub status: RevealStatus,
    pub revealed_tiles: Vec<Cell>,
    pub current_multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mines_positions: Option<Vec<Cell>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<String>,
}

impl RevealResponse {
    pub fn from_outcome(round: &Round, outcome: RevealOutcome) -> Self {
        let (status, payout, reason) = match outcome {
            RevealOutcome::Safe { .. } => (RevealStatus::Continue, None, None),
            RevealOutcome::HitBomb { .. } => (RevealStatus::GameOver, None, None),
            RevealOutcome::Cleared { settlement, .. } => {
                (RevealStatus::Cleared, Some(settlement.payout), None)
            }
            RevealOutcome::Rejected(reason) => {
                (RevealStatus::Rejected, None, Some(reason.code().to_owned()))
            }
        };

        Self {
            status,
            revealed_tiles: round.revealed().to_vec(),
            current_multiplier: round.multiplier(),
            mines_positions: round.disclosed_bombs(),
            payout,
            balance: None,
            reason,
            server_seed: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RevealStatus::GameOver | RevealStatus::Cleared)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutResponse {
    pub payout: u64,
    pub multiplier: f64,
    pub balance: u64,
    pub mines_positions: Vec<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<String>,
}

impl CashoutResponse {
    pub fn new(round: &Round, settlement: Settlement, payout: u64, balance: u64) -> Self {
        Self {
            payout,
            multiplier: settlement.multiplier,
            balance,
            mines_positions: round.disclosed_bombs().unwrap_or_default(),
            server_seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance: u64,
}

/// Public view of a round that is still being played.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGame {
    pub game_id: GameId,
    pub bomb_count: CellCount,
    pub bet_amount: u64,
    pub revealed_tiles: Vec<Cell>,
    pub current_multiplier: f64,
    pub sequence: u32,
}

impl From<&Round> for ActiveGame {
    fn from(round: &Round) -> Self {
        Self {
            game_id: round.game_id(),
            bomb_count: round.config().bomb_count(),
            bet_amount: round.stake(),
            revealed_tiles: round.revealed().to_vec(),
            current_multiplier: round.multiplier(),
            sequence: round.sequence(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub balance: u64,
    #[serde(default)]
    pub active_game: Option<ActiveGame>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Start(StartRequest),
    Reveal(RevealRequest),
    Cashout,
    Deposit(DepositRequest),
    Me,
}

impl Request {
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Started(StartResponse),
    Revealed(RevealResponse),
    CashedOut(CashoutResponse),
    Balance(BalanceResponse),
    Me(MeResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
