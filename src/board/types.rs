//! Core domain types for the 64x64 battle board.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Width and height of the board.
pub const BOARD_SIDE: usize = 64;

/// Total number of cells on the board.
pub const BOARD_CELLS: usize = BOARD_SIDE * BOARD_SIDE;

/// Board error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Board error: {} at {}:{}", message, file, line)]
pub struct BoardError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl BoardError {
    /// Creates a new board error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// State of a single cell.
///
/// The discriminants are the ternary digits used on the ledger and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Cell {
    /// Unoccupied.
    #[default]
    Empty = 0,
    /// Occupied by the red team.
    Red = 1,
    /// Occupied by the blue team.
    Blue = 2,
}

impl Cell {
    /// Returns the ternary digit for this cell.
    pub fn digit(self) -> u8 {
        self as u8
    }

    /// Returns true for red or blue cells.
    pub fn is_alive(self) -> bool {
        self != Cell::Empty
    }
}

impl TryFrom<u8> for Cell {
    type Error = BoardError;

    #[track_caller]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Cell::Empty),
            1 => Ok(Cell::Red),
            2 => Ok(Cell::Blue),
            other => Err(BoardError::new(format!("Invalid cell value: {}", other))),
        }
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        cell.digit()
    }
}

/// Team membership as reported by the ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Team {
    /// Account has not picked a team.
    Unassigned,
    /// Red team (ledger team id 1, "team A").
    Red,
    /// Blue team (ledger team id 2, "team B").
    Blue,
}

impl Team {
    /// Maps the ledger's numeric team id.
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Team::Red,
            2 => Team::Blue,
            _ => Team::Unassigned,
        }
    }

    /// Returns the ledger's numeric team id.
    pub fn id(self) -> u8 {
        match self {
            Team::Unassigned => 0,
            Team::Red => 1,
            Team::Blue => 2,
        }
    }
}

/// Outcome of a finished game.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Winner {
    /// Red invaded more of the blue half.
    Red,
    /// Blue invaded more of the red half.
    Blue,
    /// Equal invasion counts.
    Tie,
}

/// Immutable 64x64 board in row-major order (`index = y * 64 + x`).
///
/// Boards are never edited in place. [`Board::with_cell`] consumes the board
/// and returns the edited copy, which is how seeds and test fixtures are built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Cell>", into = "Vec<Cell>")]
pub struct Board {
    cells: Vec<Cell>,
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self {
            cells: vec![Cell::Empty; BOARD_CELLS],
        }
    }

    /// Builds a board from exactly [`BOARD_CELLS`] cells.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError`] if the length is wrong.
    #[track_caller]
    pub fn from_cells(cells: Vec<Cell>) -> Result<Self, BoardError> {
        if cells.len() != BOARD_CELLS {
            return Err(BoardError::new(format!(
                "Board must have {} cells, got {}",
                BOARD_CELLS,
                cells.len()
            )));
        }
        Ok(Self { cells })
    }

    /// Wraps cells produced by this crate's own full-board loops.
    pub(crate) fn from_full_grid(cells: Vec<Cell>) -> Self {
        debug_assert_eq!(cells.len(), BOARD_CELLS);
        Self { cells }
    }

    /// Converts grid coordinates to a cell index.
    pub fn index(x: usize, y: usize) -> usize {
        y * BOARD_SIDE + x
    }

    /// Returns the cell at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        if x >= BOARD_SIDE || y >= BOARD_SIDE {
            return None;
        }
        self.cells.get(Self::index(x, y)).copied()
    }

    /// Returns a copy of this board with `(x, y)` set to `cell`.
    ///
    /// Coordinates outside the grid leave the board unchanged.
    #[instrument(skip(self))]
    pub fn with_cell(mut self, x: usize, y: usize, cell: Cell) -> Self {
        if x < BOARD_SIDE && y < BOARD_SIDE {
            self.cells[Self::index(x, y)] = cell;
        }
        self
    }

    /// Returns all cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Counts cells of the given kind.
    pub fn count(&self, kind: Cell) -> usize {
        self.cells.iter().filter(|cell| **cell == kind).count()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<Cell>> for Board {
    type Error = BoardError;

    #[track_caller]
    fn try_from(cells: Vec<Cell>) -> Result<Self, Self::Error> {
        Self::from_cells(cells)
    }
}

impl From<Board> for Vec<Cell> {
    fn from(board: Board) -> Self {
        board.cells
    }
}
