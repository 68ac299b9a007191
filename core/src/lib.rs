use core::fmt;
use core::ops::{Index, RangeInclusive};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::*;
pub use generator::*;
pub use payout::*;
pub use round::*;
pub use types::*;

mod error;
mod generator;
mod payout;
mod round;
mod types;

/// Validated board parameters: a grid of `grid_size` cells hiding `bomb_count` bombs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGameConfig")]
pub struct GameConfig {
    grid_size: CellCount,
    bomb_count: CellCount,
}

#[derive(Deserialize)]
struct RawGameConfig {
    grid_size: CellCount,
    bomb_count: CellCount,
}

impl TryFrom<RawGameConfig> for GameConfig {
    type Error = GameError;

    fn try_from(raw: RawGameConfig) -> Result<Self> {
        Self::new(raw.grid_size, raw.bomb_count)
    }
}

impl GameConfig {
    /// At least one bomb and at least one safe cell are required.
    pub fn new(grid_size: CellCount, bomb_count: CellCount) -> Result<Self> {
        if grid_size < 2 || bomb_count < 1 || bomb_count >= grid_size {
            return Err(GameError::InvalidConfiguration {
                grid: grid_size,
                bombs: bomb_count,
            });
        }
        Ok(Self {
            grid_size,
            bomb_count,
        })
    }

    /// Configuration on the classic 25 cell grid.
    pub fn classic(bomb_count: CellCount) -> Result<Self> {
        Self::new(DEFAULT_GRID_SIZE, bomb_count)
    }

    pub const fn grid_size(&self) -> CellCount {
        self.grid_size
    }

    pub const fn bomb_count(&self) -> CellCount {
        self.bomb_count
    }

    pub const fn safe_cells(&self) -> CellCount {
        self.grid_size - self.bomb_count
    }

    /// Fraction of the grid covered by bombs.
    pub fn house_edge(&self) -> f64 {
        f64::from(self.bomb_count) / f64::from(self.grid_size)
    }

    pub fn house_edge_percent(&self) -> f64 {
        self.house_edge() * 100.0
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells().contains(&cell)
    }

    pub fn cells(&self) -> RangeInclusive<Cell> {
        1..=self.grid_size
    }

    pub fn validate_cell(&self, cell: Cell) -> Result<Cell> {
        if self.contains(cell) {
            Ok(cell)
        } else {
            Err(GameError::InvalidCell(cell))
        }
    }
}

/// Hidden bomb layout for a single round.
///
/// The layout is meant to stay with whoever runs the round. `Debug` output never shows it, and a
/// [`Round`] only discloses it once finished.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoard")]
pub struct Board {
    config: GameConfig,
    bomb_mask: Vec<bool>,
    game_id: GameId,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawBoard {
    config: GameConfig,
    bomb_mask: Vec<bool>,
    game_id: GameId,
    created_at: DateTime<Utc>,
}

impl TryFrom<RawBoard> for Board {
    type Error = GameError;

    fn try_from(raw: RawBoard) -> Result<Self> {
        if raw.bomb_mask.len() != usize::from(raw.config.grid_size()) {
            return Err(GameError::InvalidState("bomb mask does not cover the grid"));
        }
        let bombs = raw.bomb_mask.iter().filter(|&&is_bomb| is_bomb).count();
        if bombs != usize::from(raw.config.bomb_count()) {
            return Err(GameError::InvalidState("bomb mask disagrees with the bomb count"));
        }
        Ok(Self {
            config: raw.config,
            bomb_mask: raw.bomb_mask,
            game_id: raw.game_id,
            created_at: raw.created_at,
        })
    }
}

impl Board {
    pub(crate) fn from_mask(config: GameConfig, bomb_mask: Vec<bool>) -> Self {
        debug_assert_eq!(bomb_mask.len(), usize::from(config.grid_size()));
        Self {
            config,
            bomb_mask,
            game_id: GameId::mint(),
            created_at: utc_now(),
        }
    }

    /// Builds a board from a known layout, repeated cells count once.
    pub fn from_bomb_cells(grid_size: CellCount, bomb_cells: &[Cell]) -> Result<Self> {
        let mut bomb_mask = vec![false; usize::from(grid_size)];
        for &cell in bomb_cells {
            if cell == 0 || cell > grid_size {
                return Err(GameError::InvalidCell(cell));
            }
            bomb_mask[usize::from(cell - 1)] = true;
        }

        let bomb_count = bomb_mask
            .iter()
            .filter(|&&is_bomb| is_bomb)
            .count()
            .try_into()
            .unwrap_or(CellCount::MAX);
        let config = GameConfig::new(grid_size, bomb_count)?;

        Ok(Self::from_mask(config, bomb_mask))
    }

    pub fn config(&self) -> GameConfig {
        self.config
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn house_edge(&self) -> f64 {
        self.config.house_edge()
    }

    pub fn contains_bomb(&self, cell: Cell) -> bool {
        self.config.contains(cell) && self[cell]
    }

    /// Bomb cells in ascending order.
    pub fn bomb_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.config
            .cells()
            .filter(|&cell| self.bomb_mask[usize::from(cell - 1)])
    }
}

impl Index<Cell> for Board {
    type Output = bool;

    fn index(&self, cell: Cell) -> &Self::Output {
        &self.bomb_mask[usize::from(cell - 1)]
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("config", &self.config)
            .field("game_id", &self.game_id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Why a move was refused. The round is left untouched.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    NotActive,
    OutOfRange,
    AlreadyRevealed,
}

impl RejectReason {
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotActive => "ROUND_NOT_ACTIVE",
            Self::OutOfRange => "CELL_OUT_OF_RANGE",
            Self::AlreadyRevealed => "CELL_ALREADY_REVEALED",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotActive => "round is not active",
            Self::OutOfRange => "cell is outside the grid",
            Self::AlreadyRevealed => "cell was already revealed",
        })
    }
}

/// Frozen result of a paid round.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub stake: u64,
    pub multiplier: f64,
    pub payout: u64,
}

impl Settlement {
    /// Fractions of a unit are rounded down.
    pub fn new(stake: u64, multiplier: f64) -> Self {
        Self {
            stake,
            multiplier,
            payout: floor_payout(stake, multiplier),
        }
    }

    /// Settlement after `revealed_safe` safe reveals, with the payout computed exactly.
    pub fn after(config: GameConfig, stake: u64, revealed_safe: CellCount) -> Result<Self> {
        Ok(Self {
            stake,
            multiplier: config.multiplier_after(revealed_safe)?,
            payout: config.payout_after(stake, revealed_safe)?,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RevealOutcome {
    Rejected(RejectReason),
    Safe { cell: Cell, multiplier: f64 },
    HitBomb { cell: Cell },
    /// Last safe cell found, the round was paid out at the maximum multiplier.
    Cleared { cell: Cell, settlement: Settlement },
}

impl RevealOutcome {
    pub const fn has_update(self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::HitBomb { .. } | Self::Cleared { .. })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CashoutOutcome {
    Paid(Settlement),
    Rejected(RejectReason),
}

impl CashoutOutcome {
    pub const fn settlement(self) -> Option<Settlement> {
        match self {
            Self::Paid(settlement) => Some(settlement),
            Self::Rejected(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_out_of_range_bomb_counts() {
        assert!(GameConfig::new(25, 0).is_err());
        assert!(GameConfig::new(25, 25).is_err());
        assert!(GameConfig::new(1, 1).is_err());
        assert_eq!(
            GameConfig::new(25, 30),
            Err(GameError::InvalidConfiguration {
                grid: 25,
                bombs: 30
            })
        );
        assert_eq!(GameConfig::new(25, 24).unwrap().safe_cells(), 1);
    }

    #[test]
    fn house_edge_is_bomb_fraction() {
        let config = GameConfig::classic(5).unwrap();

        assert!((config.house_edge() - 0.2).abs() < 1e-12);
        assert!((config.house_edge_percent() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn config_deserialization_is_validated() {
        let ok: GameConfig = serde_json::from_str(r#"{"grid_size":25,"bomb_count":3}"#).unwrap();
        assert_eq!(ok.bomb_count(), 3);

        let bad = serde_json::from_str::<GameConfig>(r#"{"grid_size":25,"bomb_count":0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn board_from_cells_counts_distinct_bombs() {
        let board = Board::from_bomb_cells(25, &[3, 7, 7, 25]).unwrap();

        assert_eq!(board.config().bomb_count(), 3);
        assert_eq!(board.bomb_cells().collect::<Vec<_>>(), vec![3, 7, 25]);
        assert!(board.contains_bomb(25));
        assert!(!board.contains_bomb(1));
        assert!(!board.contains_bomb(0));
        assert!(!board.contains_bomb(26));
    }

    #[test]
    fn board_from_cells_rejects_cells_outside_grid() {
        assert_eq!(
            Board::from_bomb_cells(25, &[0]).unwrap_err(),
            GameError::InvalidCell(0)
        );
        assert_eq!(
            Board::from_bomb_cells(25, &[26]).unwrap_err(),
            GameError::InvalidCell(26)
        );
    }

    #[test]
    fn board_debug_hides_layout() {
        let board = Board::from_bomb_cells(4, &[2]).unwrap();
        let printed = format!("{board:?}");

        assert!(printed.contains("Board"));
        assert!(!printed.contains("bomb_mask"));
    }

    #[test]
    fn settlement_rounds_payout_down() {
        let settlement = Settlement::new(100, 25.0 / 22.0);

        assert_eq!(settlement.payout, 113);
    }

    #[test]
    fn settlement_after_reveals_is_exact() {
        let config = GameConfig::classic(1).unwrap();
        let settlement = Settlement::after(config, 100, 20).unwrap();

        assert_eq!(settlement.payout, 500);
        assert_eq!(settlement.multiplier, config.multiplier_after(20).unwrap());
    }

    #[test]
    fn board_survives_serialization() {
        let board = Board::from_bomb_cells(9, &[2, 5]).unwrap();

        let json = serde_json::to_string(&board).unwrap();
        let restored: Board = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, board);
    }

    #[test]
    fn tampered_board_is_refused() {
        let board = Board::from_bomb_cells(9, &[2, 5]).unwrap();
        let mut value = serde_json::to_value(&board).unwrap();

        value["bomb_mask"] = serde_json::json!([true, false]);
        assert!(serde_json::from_value::<Board>(value.clone()).is_err());

        value["bomb_mask"] =
            serde_json::json!([true, true, true, false, false, false, false, false, false]);
        assert!(serde_json::from_value::<Board>(value).is_err());
    }
}
