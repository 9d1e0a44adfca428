//! Game of Death library - orchestrator for a two-team Game of Life battle
//!
//! Two teams place Red and Blue cells on a 64x64 board held by a ledger.
//! The orchestrator drives the game through timed phases, runs the two-color
//! automaton, writes the result back, scores it and keeps a history of
//! finished games.
//!
//! # Architecture
//!
//! - **Board**: immutable board model, automaton rule, ledger codec, scoring
//! - **Ledger**: client trait, in-memory and HTTP backends, transaction pipeline
//! - **Game**: phase state, the once-per-second scheduler, crash recovery
//! - **Records**: append-only store of finished games
//! - **Server**: HTTP query surface and WebSocket event stream
//!
//! # Example
//!
//! ```no_run
//! use game_of_death::{
//!     EventBus, GameConfig, PhaseScheduler, RecordStore, SchedulerParts, SnapshotFile, TxPipeline,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GameConfig::default();
//! let ledger = config.ledger().connect();
//! let scheduler = PhaseScheduler::restore(SchedulerParts {
//!     timing: config.timing().clone(),
//!     ledger: Arc::clone(&ledger),
//!     pipeline: TxPipeline::spawn(ledger),
//!     records: Arc::new(RecordStore::open("game_records.json").await),
//!     events: EventBus::default(),
//!     snapshot: SnapshotFile::new("game_state.json"),
//!     thumbnail_base_url: None,
//! })
//! .await;
//! scheduler.tick().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod board;
mod config;
mod events;
mod game;
mod ledger;
mod records;
mod server;

// Crate-level exports - Board model and rules
pub use board::{
    BOARD_CELLS, BOARD_SIDE, Board, BoardError, CELLS_PER_CHUNK, CHUNK_COUNT, Cell, Invasion,
    NeighborCounts, Team, Winner, Word, WordParseError, advance, compute_winner, count_neighbors,
    invasion, next_cell, pack, unpack,
};

// Crate-level exports - Configuration
pub use config::{
    ConfigError, GameConfig, LedgerBackend, LedgerConfig, ServerConfig, StorageConfig,
    TimingConfig,
};

// Crate-level exports - Events
pub use events::{EventBus, GameEvent, PhaseUpdate, WinnerUpdate};

// Crate-level exports - Game lifecycle
pub use game::{
    GamePhase, PersistedState, PhaseScheduler, PhaseState, SchedulerParts, SnapshotError,
    SnapshotFile, TickOutcome,
};

// Crate-level exports - Ledger
pub use ledger::{
    HttpLedger, Ledger, LedgerCall, LedgerError, LedgerErrorKind, MemoryLedger, Receipt,
    TeamCounts, TxHandle, TxPipeline,
};

// Crate-level exports - Records
pub use records::{GameRecord, RecordError, RecordErrorKind, RecordStore, thumbnail_ref};

// Crate-level exports - Server
pub use server::{
    ApiError, AppState, BoardResponse, HistoryResponse, JoinRequest, PhaseResponse,
    RecordsResponse, TeamResponse, router,
};
