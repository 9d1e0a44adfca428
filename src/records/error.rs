//! Record store error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// Cause of a record store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RecordErrorKind {
    /// No record with the requested game id.
    NotFound,
    /// Game ids must be appended in ascending order.
    OutOfOrder,
    /// Reading or writing the record file failed.
    Io,
    /// Encoding the record file failed.
    Encode,
}

/// Record store error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Record error ({}): {} at {}:{}", kind, message, file, line)]
pub struct RecordError {
    /// What went wrong.
    pub kind: RecordErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RecordError {
    /// Creates a new record error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: RecordErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for a missing game id.
    #[track_caller]
    pub fn not_found(game_id: u64) -> Self {
        Self::new(RecordErrorKind::NotFound, format!("No record for game {}", game_id))
    }
}

impl From<std::io::Error> for RecordError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::new(RecordErrorKind::Io, format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for RecordError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(RecordErrorKind::Encode, format!("JSON error: {}", err))
    }
}
