//! Crash-recovery snapshot of the scheduler.

use super::phase::{GamePhase, PhaseState};
use crate::board::Board;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Snapshot error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Snapshot error: {} at {}:{}", message, file, line)]
pub struct SnapshotError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SnapshotError {
    /// Creates a new snapshot error with caller location tracking.
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

/// Snapshot contents as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Active phase.
    pub phase: GamePhase,
    /// Seconds left in the phase.
    pub time_left: u32,
    /// Completed cycles.
    pub cycle_count: u32,
    /// Game in progress. Older snapshots lack it.
    #[serde(default)]
    pub game_id: Option<u64>,
    /// Boards of the game in progress.
    pub board_history: Vec<Board>,
}

impl PersistedState {
    /// Phase part of the snapshot.
    pub fn phase_state(&self) -> PhaseState {
        PhaseState {
            phase: self.phase,
            time_left: self.time_left,
            cycle_count: self.cycle_count,
        }
    }
}

/// Borrowed form written every tick, so the history is not cloned.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStateRef<'a> {
    phase: GamePhase,
    time_left: u32,
    cycle_count: u32,
    game_id: u64,
    board_history: &'a [Board],
}

/// Location of the snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Uses the snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Reads the snapshot. A missing or unreadable file yields `None`.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Option<PersistedState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot found");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read snapshot, starting fresh");
                return None;
            }
        };

        match serde_json::from_slice::<PersistedState>(&bytes) {
            Ok(state) => {
                info!(
                    phase = %state.phase,
                    time_left = state.time_left,
                    cycle_count = state.cycle_count,
                    game_id = ?state.game_id,
                    history = state.board_history.len(),
                    "Snapshot restored"
                );
                Some(state)
            }
            Err(e) => {
                warn!(error = %e, "Corrupt snapshot, starting fresh");
                None
            }
        }
    }

    /// Writes the snapshot through a temp file and rename.
    #[instrument(skip(self, phase, history), fields(path = %self.path.display()))]
    pub async fn save(
        &self,
        phase: &PhaseState,
        game_id: u64,
        history: &[Board],
    ) -> Result<(), SnapshotError> {
        let view = PersistedStateRef {
            phase: phase.phase,
            time_left: phase.time_left,
            cycle_count: phase.cycle_count,
            game_id,
            board_history: history,
        };
        let bytes = serde_json::to_vec(&view)
            .map_err(|e| SnapshotError::new(format!("Failed to encode snapshot: {}", e)))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| SnapshotError::new(format!("Failed to write {}: {}", temp.display(), e)))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| SnapshotError::new(format!("Failed to replace snapshot: {}", e)))?;

        debug!(bytes = bytes.len(), "Snapshot saved");
        Ok(())
    }

    /// Deletes the snapshot. A missing file is not an error.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn remove(&self) -> Result<(), SnapshotError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Snapshot removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SnapshotError::new(format!("Failed to remove snapshot: {}", e))),
        }
    }
}
