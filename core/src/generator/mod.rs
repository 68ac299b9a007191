use crate::*;
pub use fair::*;
pub use random::*;

mod fair;
mod random;

/// Source of bomb positions. Swap implementations to change how a board's randomness is
/// produced without touching the rest of the engine.
pub trait CellSource {
    /// Draws a cell uniformly from `1..=grid_size`.
    fn draw_cell(&mut self, grid_size: CellCount) -> Cell;
}

impl<S: CellSource + ?Sized> CellSource for &mut S {
    fn draw_cell(&mut self, grid_size: CellCount) -> Cell {
        (**self).draw_cell(grid_size)
    }
}

/// Creates a board with `bomb_count` bombs spread uniformly over `grid_size` cells.
pub fn create_board<S: CellSource + ?Sized>(
    grid_size: CellCount,
    bomb_count: CellCount,
    source: &mut S,
) -> Result<Board> {
    let config = GameConfig::new(grid_size, bomb_count)?;
    Ok(generate_board(config, source))
}

/// Rejection sampling: keep drawing cells until enough distinct ones were hit.
pub fn generate_board<S: CellSource + ?Sized>(config: GameConfig, source: &mut S) -> Board {
    let grid_size = config.grid_size();
    let mut bomb_mask = vec![false; usize::from(grid_size)];
    let mut placed: CellCount = 0;
    let mut draws: u32 = 0;

    while placed < config.bomb_count() {
        let cell = source.draw_cell(grid_size);
        draws = draws.saturating_add(1);
        if !config.contains(cell) {
            log::warn!("Cell source drew {cell} outside of 1..={grid_size}, ignored");
            continue;
        }
        let slot = &mut bomb_mask[usize::from(cell - 1)];
        if !*slot {
            *slot = true;
            placed += 1;
        }
    }

    log::trace!(
        "Placed {} bombs on {} cells in {} draws",
        placed,
        grid_size,
        draws
    );
    Board::from_mask(config, bomb_mask)
}
