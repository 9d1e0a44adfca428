//! Append-only store of finished games, kept in a JSON file.

use super::{GameRecord, RecordError, RecordErrorKind};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Record store backed by one JSON array ordered by ascending game id.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: RwLock<Vec<GameRecord>>,
}

impl RecordStore {
    /// Opens the store at `path`. A missing or corrupt file yields an empty
    /// store; the file is replaced on the next append.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<GameRecord>>(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Corrupt record file, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No record file yet");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read record file, starting empty");
                Vec::new()
            }
        };
        records.sort_by_key(|r| *r.game_id());
        records.dedup_by_key(|r| *r.game_id());

        info!(count = records.len(), "Record store opened");
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    /// Appends a record and rewrites the file.
    ///
    /// # Errors
    ///
    /// [`RecordErrorKind::OutOfOrder`] if the game id is not above every
    /// stored id; [`RecordErrorKind::Io`] or [`RecordErrorKind::Encode`] if
    /// the file cannot be written, in which case the store is unchanged.
    #[instrument(skip(self, record), fields(game_id = record.game_id(), winner = %record.winner()))]
    pub async fn append(&self, record: GameRecord) -> Result<(), RecordError> {
        let mut records = self.records.write().await;

        if let Some(last) = records.last()
            && record.game_id() <= last.game_id()
        {
            warn!(last_id = last.game_id(), "Rejected out-of-order record");
            return Err(RecordError::new(
                RecordErrorKind::OutOfOrder,
                format!(
                    "Game {} is not after stored game {}",
                    record.game_id(),
                    last.game_id()
                ),
            ));
        }

        records.push(record);
        if let Err(e) = self.write_file(&records).await {
            records.pop();
            return Err(e);
        }

        info!(count = records.len(), "Game record appended");
        Ok(())
    }

    async fn write_file(&self, records: &[GameRecord]) -> Result<(), RecordError> {
        let bytes = serde_json::to_vec(records)?;
        let mut temp = self.path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(bytes = bytes.len(), "Record file written");
        Ok(())
    }

    /// All records, most recent game first.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Vec<GameRecord> {
        let records = self.records.read().await;
        records.iter().rev().cloned().collect()
    }

    /// Records the account took part in, most recent game first.
    #[instrument(skip(self))]
    pub async fn list_by_participant(&self, account: &str) -> Vec<GameRecord> {
        let records = self.records.read().await;
        let found: Vec<_> = records
            .iter()
            .rev()
            .filter(|r| r.has_participant(account))
            .cloned()
            .collect();
        debug!(count = found.len(), "Participant records loaded");
        found
    }

    /// Fetches one record.
    ///
    /// # Errors
    ///
    /// [`RecordErrorKind::NotFound`] if no record has that id.
    #[instrument(skip(self))]
    pub async fn get(&self, game_id: u64) -> Result<GameRecord, RecordError> {
        let records = self.records.read().await;
        records
            .binary_search_by_key(&game_id, |r| *r.game_id())
            .map(|index| records[index].clone())
            .map_err(|_| RecordError::not_found(game_id))
    }

    /// Id for the game after the last stored one; 1 for an empty store.
    pub async fn next_game_id(&self) -> u64 {
        self.records
            .read()
            .await
            .last()
            .map_or(1, |r| r.game_id() + 1)
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when no game has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
