//! Ledger mutations and their results.

use crate::board::Word;
use crate::game::GamePhase;
use derive_new::new;
use serde::{Deserialize, Serialize};

/// A state-changing ledger call. Every one of these goes through the
/// transaction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum LedgerCall {
    /// `setPhase(enum)`.
    SetPhase(GamePhase),
    /// `serverOverwriteBoard(packedChunks)`.
    ServerOverwriteBoard(Vec<Word>),
    /// `newGame(id)`.
    NewGame(u64),
    /// `endGame()`.
    EndGame,
}

impl LedgerCall {
    /// Contract method name, for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::SetPhase(_) => "setPhase",
            Self::ServerOverwriteBoard(_) => "serverOverwriteBoard",
            Self::NewGame(_) => "newGame",
            Self::EndGame => "endGame",
        }
    }
}

/// A sent but not yet confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct TxHandle {
    /// Transaction hash.
    pub hash: String,
    /// Sequence number it was sent with.
    pub nonce: u64,
}

/// Confirmation of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Receipt {
    /// Transaction hash.
    pub hash: String,
    /// Sequence number it was sent with.
    pub nonce: u64,
}

/// Team sizes as reported by `teamACount()` and `teamBCount()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, new)]
pub struct TeamCounts {
    /// Team A (red) size.
    #[serde(rename = "teamA")]
    pub red: u64,
    /// Team B (blue) size.
    #[serde(rename = "teamB")]
    pub blue: u64,
}
