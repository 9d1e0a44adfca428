//! Board model, automaton rule, ledger codec and scoring.

mod automaton;
mod codec;
mod scoring;
mod types;

pub use automaton::{NeighborCounts, advance, count_neighbors, next_cell};
pub use codec::{CELLS_PER_CHUNK, CHUNK_COUNT, Word, WordParseError, pack, unpack};
pub use scoring::{Invasion, compute_winner, invasion};
pub use types::{BOARD_CELLS, BOARD_SIDE, Board, BoardError, Cell, Team, Winner};
