use serde::{Deserialize, Serialize};

use crate::*;

/// Fair multiplier after `revealed_safe` safe reveals on a grid of `grid_size` cells hiding
/// `bomb_count` bombs.
///
/// This is the reciprocal of the probability that the first `revealed_safe` picks all avoided
/// the bombs, so it carries no house margin. See [`PayoutPolicy`] for that.
pub fn multiplier(
    revealed_safe: CellCount,
    bomb_count: CellCount,
    grid_size: CellCount,
) -> Result<f64> {
    GameConfig::new(grid_size, bomb_count)?.multiplier_after(revealed_safe)
}

impl GameConfig {
    pub fn multiplier_after(&self, revealed_safe: CellCount) -> Result<f64> {
        let safe = self.safe_cells();
        if revealed_safe > safe {
            return Err(GameError::DomainError {
                revealed: revealed_safe,
                safe,
            });
        }

        // incremental product keeps the intermediate values small
        let total = f64::from(self.grid_size());
        let safe = f64::from(safe);
        Ok((0..revealed_safe)
            .map(f64::from)
            .fold(1.0, |acc, i| acc * ((total - i) / (safe - i))))
    }

    /// `floor(stake * multiplier_after(revealed_safe))`, exact whenever the product is a whole
    /// number.
    pub fn payout_after(&self, stake: u64, revealed_safe: CellCount) -> Result<u64> {
        let multiplier = self.multiplier_after(revealed_safe)?;
        Ok(self
            .exact_payout(stake, revealed_safe)
            .unwrap_or_else(|| floor_payout(stake, multiplier)))
    }

    /// Same product on integers, `None` when the intermediate fraction leaves `u128`.
    fn exact_payout(&self, stake: u64, revealed_safe: CellCount) -> Option<u64> {
        let total = u128::from(self.grid_size());
        let safe = u128::from(self.safe_cells());
        let mut num = u128::from(stake);
        let mut den: u128 = 1;

        // num/den stays in lowest terms as long as each factor is reduced before multiplying
        for i in (0..revealed_safe).map(u128::from) {
            let (mut a, mut b) = (total - i, safe - i);
            let g = gcd(a, b);
            (a, b) = (a / g, b / g);
            let g = gcd(a, den);
            (a, den) = (a / g, den / g);
            let g = gcd(b, num);
            (b, num) = (b / g, num / g);
            num = num.checked_mul(a)?;
            den = den.checked_mul(b)?;
        }
        (num / den).try_into().ok()
    }

    /// Multiplier once every safe cell has been found.
    pub fn max_multiplier(&self) -> f64 {
        self.multiplier_table().last().copied().unwrap_or(1.0)
    }

    /// Entry `k` holds the multiplier after `k` safe reveals, from `0` up to all safe cells.
    pub fn multiplier_table(&self) -> Vec<f64> {
        let total = f64::from(self.grid_size());
        let safe = f64::from(self.safe_cells());
        let mut table = Vec::with_capacity(usize::from(self.safe_cells()) + 1);
        let mut acc = 1.0;
        table.push(acc);
        for i in (0..self.safe_cells()).map(f64::from) {
            acc *= (total - i) / (safe - i);
            table.push(acc);
        }
        table
    }
}

/// Floors `stake * multiplier`, snapping products within float error of a whole number onto it.
pub(crate) fn floor_payout(stake: u64, multiplier: f64) -> u64 {
    let gross = stake as f64 * multiplier;
    let nearest = gross.round();
    if (gross - nearest).abs() <= nearest.abs() * 1e-12 {
        nearest as u64
    } else {
        gross.floor() as u64
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

/// How the host turns a fair payout into the amount it actually credits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PayoutPolicy {
    #[default]
    Fair,
    /// Keeps `basis_points / 10000` of every gross payout.
    Margin { basis_points: u16 },
}

impl PayoutPolicy {
    pub const MAX_BASIS_POINTS: u16 = 10_000;

    pub fn margin(basis_points: u16) -> Self {
        Self::Margin {
            basis_points: basis_points.min(Self::MAX_BASIS_POINTS),
        }
    }

    pub fn apply(self, gross: u64) -> u64 {
        match self {
            Self::Fair => gross,
            Self::Margin { basis_points } => {
                let bps = u128::from(basis_points.min(Self::MAX_BASIS_POINTS));
                let kept = u128::from(gross) * bps / u128::from(Self::MAX_BASIS_POINTS);
                gross.saturating_sub(kept.try_into().unwrap_or(u64::MAX))
            }
        }
    }
}
