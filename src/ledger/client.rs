//! Ledger access trait.

use super::{LedgerCall, LedgerError, Receipt, TeamCounts, TxHandle};
use crate::board::{Team, Word};

/// Asynchronous access to the external ledger.
///
/// Mutations are split into `send` and `confirm` so the transaction pipeline
/// controls sequence numbers and waits for inclusion itself. Reads are plain
/// queries and may be called from anywhere.
#[async_trait::async_trait]
pub trait Ledger: std::fmt::Debug + Send + Sync {
    /// Next sequence number for the server account, counting pending
    /// transactions.
    async fn pending_nonce(&self) -> Result<u64, LedgerError>;

    /// Dispatches `call` with the given sequence number.
    async fn send(&self, call: &LedgerCall, nonce: u64) -> Result<TxHandle, LedgerError>;

    /// Waits until `tx` is included, or fails with the ledger's error.
    async fn confirm(&self, tx: &TxHandle) -> Result<Receipt, LedgerError>;

    /// `getBoard()`: the packed board.
    async fn board(&self) -> Result<Vec<Word>, LedgerError>;

    /// `teamACount()` and `teamBCount()`.
    async fn team_counts(&self) -> Result<TeamCounts, LedgerError>;

    /// `getTeam(account)`.
    async fn team_of(&self, account: &str) -> Result<Team, LedgerError>;
}
