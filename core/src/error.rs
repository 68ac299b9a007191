use thiserror::Error;

use crate::{Cell, CellCount};

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Invalid configuration: {bombs} bombs on a grid of {grid} cells")]
    InvalidConfiguration { grid: CellCount, bombs: CellCount },
    #[error("Stake must be greater than zero")]
    InvalidStake,
    #[error("Cell {0} is outside the grid")]
    InvalidCell(Cell),
    #[error("Multiplier requested after {revealed} reveals but only {safe} safe cells exist")]
    DomainError { revealed: CellCount, safe: CellCount },
    #[error("Inconsistent round data: {0}")]
    InvalidState(&'static str),
}

pub type Result<T> = core::result::Result<T, GameError>;
