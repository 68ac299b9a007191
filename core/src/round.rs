use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Active,
    /// Every safe cell was found and the round paid out on its own.
    Won,
    CashedOut,
    Lost,
}

impl RoundState {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub const fn is_finished(self) -> bool {
        !self.is_active()
    }

    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Won | Self::CashedOut)
    }
}

impl Default for RoundState {
    fn default() -> Self {
        Self::Active
    }
}

/// One bet played against one board.
///
/// Every mutation goes through [`Round::reveal`] or [`Round::cashout`]; callers sharing a round
/// between threads must serialize those calls themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRound")]
pub struct Round {
    board: Board,
    revealed: Vec<Cell>,
    state: RoundState,
    stake: u64,
    multiplier: f64,
    settlement: Option<Settlement>,
    sequence: u32,
}

/// Persisted form of a [`Round`]. The multiplier is derived again from the reveals.
#[derive(Deserialize)]
struct RawRound {
    board: Board,
    revealed: Vec<Cell>,
    state: RoundState,
    stake: u64,
    settlement: Option<Settlement>,
    sequence: u32,
}

impl TryFrom<RawRound> for Round {
    type Error = GameError;

    fn try_from(raw: RawRound) -> Result<Self> {
        let mut round = Self::new(raw.board, raw.stake)?;
        for &cell in &raw.revealed {
            match round.check_reveal(cell) {
                None if !round.board.contains_bomb(cell) => round.revealed.push(cell),
                _ => {
                    return Err(GameError::InvalidState(
                        "revealed cells are not distinct safe cells",
                    ));
                }
            }
        }
        round.multiplier = round.config().multiplier_after(round.revealed_count())?;

        let cleared = round.revealed_count() == round.config().safe_cells();
        let consistent = match (raw.state, raw.settlement) {
            (RoundState::Active | RoundState::Lost, None) => !cleared,
            (RoundState::Won, Some(settlement)) => cleared && settlement.stake == raw.stake,
            (RoundState::CashedOut, Some(settlement)) => settlement.stake == raw.stake,
            _ => false,
        };
        if !consistent || raw.sequence < u32::from(round.revealed_count()) {
            return Err(GameError::InvalidState("state, settlement and reveals disagree"));
        }

        round.state = raw.state;
        round.settlement = raw.settlement;
        round.sequence = raw.sequence;
        Ok(round)
    }
}

impl Round {
    pub fn new(board: Board, stake: u64) -> Result<Self> {
        if stake == 0 {
            return Err(GameError::InvalidStake);
        }
        Ok(Self {
            board,
            revealed: Vec::new(),
            state: Default::default(),
            stake,
            multiplier: 1.0,
            settlement: None,
            sequence: 0,
        })
    }

    /// Generates a fresh board and starts a round on it.
    pub fn start<S: CellSource + ?Sized>(
        config: GameConfig,
        stake: u64,
        source: &mut S,
    ) -> Result<Self> {
        Self::new(generate_board(config, source), stake)
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn game_id(&self) -> GameId {
        self.board.game_id()
    }

    pub fn config(&self) -> GameConfig {
        self.board.config()
    }

    /// When the board of this round was generated.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.board.created_at()
    }

    pub fn stake(&self) -> u64 {
        self.stake
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Safe cells in the order they were revealed.
    pub fn revealed(&self) -> &[Cell] {
        &self.revealed
    }

    pub fn revealed_count(&self) -> CellCount {
        self.revealed.len().try_into().unwrap_or(CellCount::MAX)
    }

    /// Number of committed moves, rejected moves are not counted.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.settlement
    }

    /// What a cashout would pay right now.
    pub fn potential_payout(&self) -> u64 {
        self.current_settlement().payout
    }

    /// Multiplier after one more safe reveal, `None` once nothing is left to reveal.
    pub fn next_multiplier(&self) -> Option<f64> {
        if !self.state.is_active() {
            return None;
        }
        self.config()
            .multiplier_after(self.revealed_count() + 1)
            .ok()
    }

    /// Bomb layout, only available after the round ended.
    pub fn disclosed_bombs(&self) -> Option<Vec<Cell>> {
        self.is_finished()
            .then(|| self.board.bomb_cells().collect())
    }

    pub fn reveal(&mut self, cell: Cell) -> Result<RevealOutcome> {
        use RevealOutcome::*;

        if let Some(reason) = self.check_reveal(cell) {
            return Ok(Rejected(reason));
        }

        if self.board.contains_bomb(cell) {
            self.state = RoundState::Lost;
            self.sequence += 1;
            return Ok(HitBomb { cell });
        }

        // nothing is committed unless the new multiplier is valid
        let revealed_count = self.revealed_count() + 1;
        let multiplier = self.config().multiplier_after(revealed_count)?;

        self.revealed.push(cell);
        self.multiplier = multiplier;
        self.sequence += 1;

        if revealed_count == self.config().safe_cells() {
            let settlement = self.settle(RoundState::Won);
            Ok(Cleared { cell, settlement })
        } else {
            Ok(Safe { cell, multiplier })
        }
    }

    /// Allowed at any point while active, with no reveals the stake comes back unchanged.
    pub fn cashout(&mut self) -> CashoutOutcome {
        if !self.state.is_active() {
            return CashoutOutcome::Rejected(RejectReason::NotActive);
        }
        let settlement = self.settle(RoundState::CashedOut);
        self.sequence += 1;
        CashoutOutcome::Paid(settlement)
    }

    fn check_reveal(&self, cell: Cell) -> Option<RejectReason> {
        if !self.state.is_active() {
            Some(RejectReason::NotActive)
        } else if !self.config().contains(cell) {
            Some(RejectReason::OutOfRange)
        } else if self.revealed.contains(&cell) {
            Some(RejectReason::AlreadyRevealed)
        } else {
            None
        }
    }

    fn current_settlement(&self) -> Settlement {
        // reveals never outnumber safe cells, so the exact path always applies
        Settlement::after(self.config(), self.stake, self.revealed_count())
            .unwrap_or_else(|_| Settlement::new(self.stake, self.multiplier))
    }

    fn settle(&mut self, state: RoundState) -> Settlement {
        debug_assert!(state.is_paid());
        let settlement = self.current_settlement();
        self.state = state;
        self.settlement = Some(settlement);
        settlement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(grid: CellCount, bombs: &[Cell], stake: u64) -> Round {
        Round::new(Board::from_bomb_cells(grid, bombs).unwrap(), stake).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn zero_stake_is_rejected() {
        let board = Board::from_bomb_cells(25, &[1]).unwrap();

        assert_eq!(Round::new(board, 0).unwrap_err(), GameError::InvalidStake);
    }

    #[test]
    fn safe_reveal_appends_and_updates_multiplier() {
        let mut round = round(25, &[1, 2, 3], 100);

        let outcome = round.reveal(10).unwrap();

        assert_eq!(
            outcome,
            RevealOutcome::Safe {
                cell: 10,
                multiplier: 25.0 / 22.0
            }
        );
        assert_eq!(round.revealed(), &[10]);
        assert!(approx(round.multiplier(), 25.0 / 22.0));
        assert_eq!(round.state(), RoundState::Active);
        assert_eq!(round.sequence(), 1);

        round.reveal(4).unwrap();
        assert_eq!(round.revealed(), &[10, 4]);
        assert!(approx(round.multiplier(), multiplier(2, 3, 25).unwrap()));
    }

    #[test]
    fn bomb_reveal_loses_without_recording_cell() {
        let mut round = round(25, &[1, 2, 3], 100);
        round.reveal(7).unwrap();

        let outcome = round.reveal(2).unwrap();

        assert_eq!(outcome, RevealOutcome::HitBomb { cell: 2 });
        assert!(outcome.is_terminal());
        assert_eq!(round.state(), RoundState::Lost);
        assert_eq!(round.revealed(), &[7]);
        assert_eq!(round.settlement(), None);
    }

    #[test]
    fn rejected_moves_leave_state_untouched() {
        let mut round = round(25, &[1, 2, 3], 100);
        round.reveal(5).unwrap();
        let before = round.clone();

        assert_eq!(
            round.reveal(5).unwrap(),
            RevealOutcome::Rejected(RejectReason::AlreadyRevealed)
        );
        assert_eq!(
            round.reveal(0).unwrap(),
            RevealOutcome::Rejected(RejectReason::OutOfRange)
        );
        assert_eq!(
            round.reveal(26).unwrap(),
            RevealOutcome::Rejected(RejectReason::OutOfRange)
        );
        assert_eq!(round, before);
    }

    #[test]
    fn terminal_rounds_reject_everything() {
        let mut lost = round(25, &[1], 100);
        lost.reveal(1).unwrap();
        let snapshot = lost.clone();

        assert_eq!(
            lost.reveal(2).unwrap(),
            RevealOutcome::Rejected(RejectReason::NotActive)
        );
        assert_eq!(
            lost.cashout(),
            CashoutOutcome::Rejected(RejectReason::NotActive)
        );
        assert_eq!(lost, snapshot);
    }

    #[test]
    fn cashout_freezes_payout() {
        let mut round = round(25, &[1, 2, 3], 1_000);
        round.reveal(10).unwrap();
        round.reveal(11).unwrap();

        let settlement = round.cashout().settlement().unwrap();

        assert_eq!(settlement.stake, 1_000);
        assert!(approx(settlement.multiplier, (25.0 * 24.0) / (22.0 * 21.0)));
        assert_eq!(settlement.payout, 1_298);
        assert_eq!(round.state(), RoundState::CashedOut);
        assert_eq!(round.settlement(), Some(settlement));

        assert_eq!(
            round.reveal(12).unwrap(),
            RevealOutcome::Rejected(RejectReason::NotActive)
        );
        assert_eq!(
            round.cashout(),
            CashoutOutcome::Rejected(RejectReason::NotActive)
        );
        assert_eq!(round.settlement(), Some(settlement));
    }

    #[test]
    fn cashout_without_reveals_returns_stake() {
        let mut round = round(25, &[1, 2, 3], 250);

        let settlement = round.cashout().settlement().unwrap();

        assert_eq!(settlement.payout, 250);
        assert_eq!(settlement.multiplier, 1.0);
    }

    #[test]
    fn last_safe_cell_wins_at_max_multiplier() {
        let bombs: Vec<Cell> = (2..=25).collect();
        let mut round = round(25, &bombs, 10);

        let outcome = round.reveal(1).unwrap();

        let RevealOutcome::Cleared { cell, settlement } = outcome else {
            panic!("expected a cleared board, got {outcome:?}");
        };
        assert_eq!(cell, 1);
        assert!(approx(settlement.multiplier, 25.0));
        assert_eq!(settlement.payout, 250);
        assert_eq!(round.state(), RoundState::Won);
        assert_eq!(round.next_multiplier(), None);
        assert_eq!(
            round.cashout(),
            CashoutOutcome::Rejected(RejectReason::NotActive)
        );
    }

    #[test]
    fn clearing_a_small_board_in_order() {
        let mut round = round(4, &[4], 9);

        assert!(matches!(round.reveal(1).unwrap(), RevealOutcome::Safe { .. }));
        assert!(matches!(round.reveal(2).unwrap(), RevealOutcome::Safe { .. }));
        let outcome = round.reveal(3).unwrap();

        assert!(matches!(outcome, RevealOutcome::Cleared { cell: 3, .. }));
        assert_eq!(round.revealed(), &[1, 2, 3]);
        assert!(approx(round.multiplier(), 4.0));
        assert_eq!(round.settlement().unwrap().payout, 36);
    }

    #[test]
    fn bombs_disclosed_only_after_round_ends() {
        let mut round = round(25, &[4, 8], 100);
        assert_eq!(round.disclosed_bombs(), None);

        round.reveal(8).unwrap();

        assert_eq!(round.disclosed_bombs(), Some(vec![4, 8]));
    }

    #[test]
    fn previews_follow_the_table() {
        let mut round = round(25, &[1, 2, 3], 100);
        let table = round.config().multiplier_table();

        assert_eq!(round.next_multiplier(), Some(table[1]));
        round.reveal(9).unwrap();
        assert_eq!(round.next_multiplier(), Some(table[2]));
        assert_eq!(round.potential_payout(), 113);
    }

    #[test]
    fn sequence_counts_committed_moves_only() {
        let mut round = round(25, &[1], 100);

        round.reveal(2).unwrap();
        round.reveal(2).unwrap();
        round.reveal(3).unwrap();
        round.cashout();
        round.cashout();

        assert_eq!(round.sequence(), 3);
    }

    #[test]
    fn start_generates_board() {
        let config = GameConfig::classic(3).unwrap();

        let round = Round::start(config, 50, &mut SeededCellSource::new(1)).unwrap();

        assert_eq!(round.config(), config);
        assert_eq!(round.multiplier(), 1.0);
        assert!(round.revealed().is_empty());
        assert_eq!(
            Round::start(config, 0, &mut SeededCellSource::new(1)).unwrap_err(),
            GameError::InvalidStake
        );
    }

    #[test]
    fn whole_number_payout_is_paid_in_full() {
        let mut round = round(25, &[25], 100);
        for cell in 1..=20 {
            round.reveal(cell).unwrap();
        }

        assert_eq!(round.potential_payout(), 500);
        let settlement = round.cashout().settlement().unwrap();
        assert_eq!(settlement.payout, 500);
    }

    #[test]
    fn created_at_comes_from_the_board() {
        let board = Board::from_bomb_cells(25, &[1]).unwrap();
        let created_at = board.created_at();

        assert_eq!(Round::new(board, 10).unwrap().created_at(), created_at);
    }

    #[test]
    fn round_survives_serialization() {
        // two of four cells safe keeps the multiplier exactly representable
        let mut round = round(4, &[3, 4], 100);
        round.reveal(1).unwrap();
        assert_eq!(round.multiplier(), 2.0);

        let json = serde_json::to_string(&round).unwrap();
        let restored: Round = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, round);
    }

    #[test]
    fn finished_round_survives_serialization() {
        let mut round = round(4, &[3, 4], 100);
        round.reveal(1).unwrap();
        round.cashout();

        let json = serde_json::to_string(&round).unwrap();
        let restored: Round = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.state(), RoundState::CashedOut);
        assert_eq!(restored.settlement().unwrap().payout, 200);
        assert_eq!(restored.sequence(), 2);
    }

    #[test]
    fn tampered_round_is_refused() {
        let mut round = round(25, &[1, 2, 3], 100);
        round.reveal(10).unwrap();
        let value = serde_json::to_value(&round).unwrap();

        let mut short_mask = value.clone();
        short_mask["board"]["bomb_mask"] = serde_json::json!([true, false]);
        assert!(serde_json::from_value::<Round>(short_mask).is_err());

        let mut bomb_revealed = value.clone();
        bomb_revealed["revealed"] = serde_json::json!([10, 2]);
        assert!(serde_json::from_value::<Round>(bomb_revealed).is_err());

        let mut repeated = value.clone();
        repeated["revealed"] = serde_json::json!([10, 10]);
        assert!(serde_json::from_value::<Round>(repeated).is_err());

        let mut unpaid_win = value.clone();
        unpaid_win["state"] = serde_json::json!("CashedOut");
        assert!(serde_json::from_value::<Round>(unpaid_win).is_err());

        assert!(serde_json::from_value::<Round>(value).is_ok());
    }
}
