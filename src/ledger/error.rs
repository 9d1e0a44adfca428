//! Ledger error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// Cause of a ledger failure, used by callers to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LedgerErrorKind {
    /// Network or provider failure.
    Transport,
    /// The sequence number was already used or skipped ahead.
    StaleNonce,
    /// The ledger says the current game has already ended.
    GameConcluded,
    /// The ledger rejected the call for another reason.
    Reverted,
    /// Confirmation did not arrive in time.
    Timeout,
    /// A response could not be decoded.
    Decode,
    /// The transaction pipeline has shut down.
    PipelineClosed,
}

/// Ledger error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Ledger error ({}): {} at {}:{}", kind, message, file, line)]
pub struct LedgerError {
    /// What went wrong.
    pub kind: LedgerErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl LedgerError {
    /// Creates a new ledger error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: LedgerErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// True when a refetched nonce may fix the call.
    pub fn is_stale_nonce(&self) -> bool {
        self.kind == LedgerErrorKind::StaleNonce
    }

    /// True when the game has already ended on the ledger.
    pub fn is_game_concluded(&self) -> bool {
        self.kind == LedgerErrorKind::GameConcluded
    }
}

impl From<reqwest::Error> for LedgerError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            LedgerErrorKind::Timeout
        } else if err.is_decode() {
            LedgerErrorKind::Decode
        } else {
            LedgerErrorKind::Transport
        };
        Self::new(kind, format!("HTTP error: {}", err))
    }
}
