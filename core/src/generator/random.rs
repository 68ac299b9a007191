use rand::prelude::*;
use rand::rngs::SmallRng;

use super::*;

/// Plain pseudo-random cell source, good for offline play and simulations.
///
/// Not suitable when players wager real money: the layout cannot be audited afterwards. Use
/// [`FairCellSource`] for that.
#[derive(Clone, Debug)]
pub struct SeededCellSource {
    rng: SmallRng,
}

impl SeededCellSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl CellSource for SeededCellSource {
    fn draw_cell(&mut self, grid_size: CellCount) -> Cell {
        self.rng.random_range(1..=grid_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_board() {
        let first = create_board(25, 5, &mut SeededCellSource::new(7)).unwrap();
        let second = create_board(25, 5, &mut SeededCellSource::new(7)).unwrap();

        assert_eq!(
            first.bomb_cells().collect::<Vec<_>>(),
            second.bomb_cells().collect::<Vec<_>>()
        );
    }

    #[test]
    fn draws_stay_in_range() {
        let mut source = SeededCellSource::new(99);

        for _ in 0..1_000 {
            assert!((1..=25).contains(&source.draw_cell(25)));
        }
        assert_eq!(source.draw_cell(1), 1);
    }
}
