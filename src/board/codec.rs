//! Base-3 packing of boards into 256-bit ledger words.
//!
//! Ledger storage is billed per word, so the 4096 ternary cells are stored as
//! 26 words of 161 base-3 digits each (3^161 < 2^256). Cell `c * 161 + i`
//! is digit `i` of chunk `c`, least significant first. The 90 positions past
//! the end of the board are always zero.

use super::types::{BOARD_CELLS, Board, Cell};
use derive_more::{Display, Error};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Base-3 digits stored per ledger word.
pub const CELLS_PER_CHUNK: usize = 161;

/// Number of ledger words holding one board.
pub const CHUNK_COUNT: usize = 26;

/// Error parsing a [`Word`] from text.
#[derive(Debug, Clone, Display, Error)]
#[display("Invalid ledger word '{}': {}", input, reason)]
pub struct WordParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl WordParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Unsigned 256-bit ledger word, four little-endian 64-bit limbs.
///
/// Only the arithmetic the codec needs is provided: multiply-add and
/// division by a small divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Word([u64; 4]);

impl Word {
    /// The zero word.
    pub const ZERO: Word = Word([0; 4]);

    /// Creates a word from its little-endian limbs.
    pub fn from_limbs(limbs: [u64; 4]) -> Self {
        Self(limbs)
    }

    /// Returns the little-endian limbs.
    pub fn limbs(&self) -> [u64; 4] {
        self.0
    }

    /// Returns true if the word is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Computes `self * mul + add`, returning the result and the carry out
    /// of the top limb (non-zero means overflow).
    fn mul_add_small(self, mul: u64, add: u64) -> (Self, u64) {
        let mut out = [0u64; 4];
        let mut carry = add as u128;
        for (slot, limb) in out.iter_mut().zip(self.0) {
            let wide = limb as u128 * mul as u128 + carry;
            *slot = wide as u64;
            carry = wide >> 64;
        }
        (Self(out), carry as u64)
    }

    /// Computes `(self / div, self % div)`.
    fn div_rem_small(self, div: u64) -> (Self, u64) {
        let mut out = [0u64; 4];
        let mut rem = 0u128;
        for i in (0..4).rev() {
            let cur = (rem << 64) | self.0[i] as u128;
            out[i] = (cur / div as u128) as u64;
            rem = cur % div as u128;
        }
        (Self(out), rem as u64)
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self([value, 0, 0, 0])
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let top = self.0.iter().rposition(|limb| *limb != 0);
        match top {
            None => write!(f, "0x0"),
            Some(top) => {
                write!(f, "0x{:x}", self.0[top])?;
                for i in (0..top).rev() {
                    write!(f, "{:016x}", self.0[i])?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Word {
    type Err = WordParseError;

    /// Accepts `0x`-prefixed hex or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            parse_hex(s, hex)
        } else {
            parse_decimal(s, trimmed)
        }
    }
}

fn parse_hex(input: &str, hex: &str) -> Result<Word, WordParseError> {
    if hex.is_empty() {
        return Err(WordParseError::new(input, "no hex digits"));
    }
    let digits = hex.trim_start_matches('0');
    if digits.len() > 64 {
        return Err(WordParseError::new(input, "exceeds 256 bits"));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WordParseError::new(input, "invalid hex digit"));
    }

    let mut limbs = [0u64; 4];
    let mut end = digits.len();
    for limb in limbs.iter_mut() {
        if end == 0 {
            break;
        }
        let start = end.saturating_sub(16);
        *limb = u64::from_str_radix(&digits[start..end], 16)
            .map_err(|_| WordParseError::new(input, "invalid hex digit"))?;
        end = start;
    }
    Ok(Word(limbs))
}

fn parse_decimal(input: &str, digits: &str) -> Result<Word, WordParseError> {
    if digits.is_empty() {
        return Err(WordParseError::new(input, "empty"));
    }
    digits.bytes().try_fold(Word::ZERO, |acc, b| {
        if !b.is_ascii_digit() {
            return Err(WordParseError::new(input, "invalid decimal digit"));
        }
        let (next, carry) = acc.mul_add_small(10, (b - b'0') as u64);
        if carry != 0 {
            return Err(WordParseError::new(input, "exceeds 256 bits"));
        }
        Ok(next)
    })
}

impl Serialize for Word {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Packs a board into [`CHUNK_COUNT`] ledger words.
#[instrument(skip(board))]
pub fn pack(board: &Board) -> Vec<Word> {
    let cells = board.cells();
    let chunks: Vec<Word> = (0..CHUNK_COUNT)
        .map(|chunk| {
            let start = chunk * CELLS_PER_CHUNK;
            // Horner's rule from the most significant digit down.
            (0..CELLS_PER_CHUNK).rev().fold(Word::ZERO, |acc, i| {
                let digit = cells.get(start + i).map_or(0, |cell| cell.digit() as u64);
                let (next, carry) = acc.mul_add_small(3, digit);
                debug_assert_eq!(carry, 0, "161 base-3 digits fit in 256 bits");
                next
            })
        })
        .collect();
    debug!(chunks = chunks.len(), "Packed board");
    chunks
}

/// Unpacks ledger words into a board.
///
/// Digits are read least significant first until 4096 cells have been
/// produced. Missing chunks leave their cells empty and extra chunks are
/// ignored.
#[instrument(skip(chunks), fields(chunks = chunks.len()))]
pub fn unpack(chunks: &[Word]) -> Board {
    let mut cells = Vec::with_capacity(BOARD_CELLS);

    'chunks: for chunk in chunks {
        let mut value = *chunk;
        for _ in 0..CELLS_PER_CHUNK {
            if cells.len() == BOARD_CELLS {
                break 'chunks;
            }
            let (rest, digit) = value.div_rem_small(3);
            cells.push(match digit {
                1 => Cell::Red,
                2 => Cell::Blue,
                _ => Cell::Empty,
            });
            value = rest;
        }
    }
    cells.resize(BOARD_CELLS, Cell::Empty);

    Board::from_full_grid(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::types::BOARD_SIDE;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_layout_covers_board() {
        assert!(CELLS_PER_CHUNK * CHUNK_COUNT >= BOARD_CELLS);
        assert!(CELLS_PER_CHUNK * (CHUNK_COUNT - 1) < BOARD_CELLS);
    }

    #[test]
    fn test_empty_board_packs_to_zero() {
        let chunks = pack(&Board::new());
        assert_eq!(chunks.len(), CHUNK_COUNT);
        assert!(chunks.iter().all(Word::is_zero));
    }

    #[test]
    fn test_digit_positions() {
        let board = Board::new()
            .with_cell(0, 0, Cell::Red)
            .with_cell(1, 0, Cell::Blue)
            .with_cell(161 - 128, 2, Cell::Red);
        let chunks = pack(&board);
        // 1 * 3^0 + 2 * 3^1
        assert_eq!(chunks[0], Word::from(7));
        // cell 161 is digit 0 of chunk 1
        assert_eq!(chunks[1], Word::from(1));
    }

    #[test]
    fn test_last_cell_lands_in_last_chunk() {
        let board = Board::new().with_cell(BOARD_SIDE - 1, BOARD_SIDE - 1, Cell::Blue);
        let chunks = pack(&board);
        assert!(chunks[..CHUNK_COUNT - 1].iter().all(Word::is_zero));
        assert!(!chunks[CHUNK_COUNT - 1].is_zero());
        assert_eq!(unpack(&chunks), board);
    }

    #[test]
    fn test_full_blue_chunk_fits_in_word() {
        let board = Board::from_cells(vec![Cell::Blue; BOARD_CELLS]).expect("board");
        let chunks = pack(&board);
        assert_eq!(unpack(&chunks), board);
        // 3^161 - 1 uses the top limb.
        assert_ne!(chunks[0].limbs()[3], 0);
    }

    #[test]
    fn test_short_input_pads_with_empty() {
        let board = Board::new().with_cell(5, 0, Cell::Red);
        let chunks = pack(&board);
        assert_eq!(unpack(&chunks[..1]), board);
        assert_eq!(unpack(&[]), Board::new());
    }

    #[test]
    fn test_extra_chunks_are_ignored() {
        let board = Board::new().with_cell(63, 63, Cell::Blue);
        let mut chunks = pack(&board);
        chunks.extend([Word::from(7), Word::from(u64::MAX)]);
        let back = unpack(&chunks);
        assert_eq!(back.cells().len(), BOARD_CELLS);
        assert_eq!(back, board);
    }

    #[test]
    fn test_word_text_forms() {
        let word = Word::from_limbs([0x1234, 0, 1, 0]);
        let text = word.to_string();
        assert_eq!(text, "0x100000000000000000000000000001234");
        assert_eq!(text.parse::<Word>().expect("hex"), word);
        assert_eq!("42".parse::<Word>().expect("dec"), Word::from(42));
        assert_eq!(Word::ZERO.to_string(), "0x0");
        assert!("0x".parse::<Word>().is_err());
        assert!("12a".parse::<Word>().is_err());
        let too_big = format!("0x1{}", "0".repeat(64));
        assert!(too_big.parse::<Word>().is_err());
    }

    #[test]
    fn test_word_json_is_hex_string() {
        let json = serde_json::to_string(&Word::from(255)).expect("serialize");
        assert_eq!(json, "\"0xff\"");
        let back: Word = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Word::from(255));
    }

    proptest! {
        #[test]
        fn prop_unpack_inverts_pack(digits in proptest::collection::vec(0u8..3, BOARD_CELLS)) {
            let cells = digits
                .into_iter()
                .map(|d| Cell::try_from(d).expect("digit in range"))
                .collect();
            let board = Board::from_cells(cells).expect("board");
            prop_assert_eq!(unpack(&pack(&board)), board);
        }
    }
}
