//! Territory scoring.
//!
//! Red starts in the top half (`y < 32`) and Blue in the bottom half. A team
//! scores one point for every cell it holds in the opposing half.

use super::types::{BOARD_SIDE, Board, Cell, Winner};
use tracing::{debug, instrument};

/// Invasion counts for both teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Invasion {
    /// Red cells with `y >= 32`.
    pub red: usize,
    /// Blue cells with `y < 32`.
    pub blue: usize,
}

/// Counts cells sitting in the opposing half.
pub fn invasion(board: &Board) -> Invasion {
    let half = BOARD_SIDE / 2;
    board
        .cells()
        .iter()
        .enumerate()
        .fold(Invasion::default(), |mut acc, (index, cell)| {
            let y = index / BOARD_SIDE;
            match cell {
                Cell::Red if y >= half => acc.red += 1,
                Cell::Blue if y < half => acc.blue += 1,
                _ => {}
            }
            acc
        })
}

/// Decides the winner of a final board.
#[instrument(skip(board))]
pub fn compute_winner(board: &Board) -> Winner {
    let counts = invasion(board);
    let winner = if counts.red > counts.blue {
        Winner::Red
    } else if counts.blue > counts.red {
        Winner::Blue
    } else {
        Winner::Tie
    };
    debug!(red = counts.red, blue = counts.blue, %winner, "Scored board");
    winner
}
