//! Finished-game records.

use crate::board::{Board, Winner};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::instrument;

/// Immutable result of one finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    game_id: u64,
    winner: Winner,
    timestamp: DateTime<Utc>,
    team_red_count: u64,
    team_blue_count: u64,
    board_history: Vec<Board>,
    participants: BTreeSet<String>,
    thumbnail: Option<String>,
}

impl GameRecord {
    /// True if `account` took part. Account ids compare case-insensitively,
    /// since hex addresses arrive in mixed case.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub fn has_participant(&self, account: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.eq_ignore_ascii_case(account))
    }

    /// Last board of the game, if any was captured.
    pub fn final_board(&self) -> Option<&Board> {
        self.board_history.last()
    }
}

/// Builds the thumbnail reference for a game from the renderer's base URL.
pub fn thumbnail_ref(base_url: Option<&str>, game_id: u64) -> Option<String> {
    base_url.map(|base| format!("{}/game_{}.png", base.trim_end_matches('/'), game_id))
}
