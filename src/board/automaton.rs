//! Two-color Game of Life rule.
//!
//! Survival is judged against neighbors of the cell's own color; birth needs
//! exactly three live neighbors of any color and takes the majority color.
//! The grid edge is closed: cells outside the 64x64 board never count.

use super::types::{BOARD_SIDE, Board, Cell};
use tracing::instrument;

/// Live neighbor counts around one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborCounts {
    /// Red neighbors.
    pub red: u8,
    /// Blue neighbors.
    pub blue: u8,
}

impl NeighborCounts {
    /// Total live neighbors.
    pub fn alive(&self) -> u8 {
        self.red + self.blue
    }
}

/// Counts the red and blue neighbors of `(x, y)` without wrapping.
///
/// Coordinates outside the grid have no neighbors.
pub fn count_neighbors(board: &Board, x: usize, y: usize) -> NeighborCounts {
    let mut counts = NeighborCounts::default();
    if x >= BOARD_SIDE || y >= BOARD_SIDE {
        return counts;
    }
    let cells = board.cells();

    for ny in y.saturating_sub(1)..=(y + 1).min(BOARD_SIDE - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(BOARD_SIDE - 1) {
            if nx == x && ny == y {
                continue;
            }
            match cells[Board::index(nx, ny)] {
                Cell::Red => counts.red += 1,
                Cell::Blue => counts.blue += 1,
                Cell::Empty => {}
            }
        }
    }

    counts
}

/// Next state of a single cell given its neighborhood.
pub fn next_cell(cell: Cell, counts: NeighborCounts) -> Cell {
    match cell {
        Cell::Red if matches!(counts.red, 2 | 3) => Cell::Red,
        Cell::Blue if matches!(counts.blue, 2 | 3) => Cell::Blue,
        Cell::Red | Cell::Blue => Cell::Empty,
        Cell::Empty if counts.alive() == 3 => {
            if counts.red > counts.blue {
                Cell::Red
            } else if counts.blue > counts.red {
                Cell::Blue
            } else {
                Cell::Empty
            }
        }
        Cell::Empty => Cell::Empty,
    }
}

/// Advances the board by one generation.
///
/// Every cell is computed from the untouched input, so the result depends on
/// nothing but `board`.
#[instrument(skip(board))]
pub fn advance(board: &Board) -> Board {
    let cells = (0..BOARD_SIDE)
        .flat_map(|y| (0..BOARD_SIDE).map(move |x| (x, y)))
        .map(|(x, y)| next_cell(board.cells()[Board::index(x, y)], count_neighbors(board, x, y)))
        .collect();

    Board::from_full_grid(cells)
}
