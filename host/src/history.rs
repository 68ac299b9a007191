use std::collections::VecDeque;

use mines_core::{Cell, CellCount, FairSeeds, GameId, Round, RoundState};
use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// Running totals over every round the table has seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    pub total_games: u64,
    pub total_wagered: u64,
    pub total_paid_out: u64,
    pub house_profit: i64,
}

/// Audit record of a finished round, including what is needed to verify its layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub game_id: GameId,
    pub player: PlayerId,
    pub grid_size: CellCount,
    pub bomb_count: CellCount,
    pub bet_amount: u64,
    pub state: RoundState,
    pub revealed: Vec<Cell>,
    pub mines_positions: Vec<Cell>,
    pub payout: u64,
    pub seeds: Option<FairSeeds>,
}

impl RoundSummary {
    pub(crate) fn new(player: PlayerId, round: &Round, payout: u64, seeds: Option<FairSeeds>) -> Self {
        let config = round.config();
        Self {
            game_id: round.game_id(),
            player,
            grid_size: config.grid_size(),
            bomb_count: config.bomb_count(),
            bet_amount: round.stake(),
            state: round.state(),
            revealed: round.revealed().to_vec(),
            mines_positions: round.disclosed_bombs().unwrap_or_default(),
            payout,
            seeds,
        }
    }
}

#[derive(Debug)]
pub(crate) struct History {
    stats: GameStats,
    archive: VecDeque<RoundSummary>,
    limit: usize,
}

impl History {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            stats: GameStats::default(),
            archive: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    pub(crate) fn record_start(&mut self, stake: u64) {
        self.stats.total_games += 1;
        self.stats.total_wagered = self.stats.total_wagered.saturating_add(stake);
        self.stats.house_profit = self.stats.house_profit.saturating_add_unsigned(stake);
    }

    pub(crate) fn record_finish(&mut self, summary: RoundSummary) {
        self.stats.total_paid_out = self.stats.total_paid_out.saturating_add(summary.payout);
        self.stats.house_profit = self
            .stats
            .house_profit
            .saturating_sub_unsigned(summary.payout);

        if self.limit == 0 {
            return;
        }
        while self.archive.len() >= self.limit {
            self.archive.pop_front();
        }
        self.archive.push_back(summary);
    }

    pub(crate) fn stats(&self) -> GameStats {
        self.stats.clone()
    }

    /// Newest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<RoundSummary> {
        self.archive.iter().rev().take(limit).cloned().collect()
    }
}
