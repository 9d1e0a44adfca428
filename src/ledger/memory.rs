//! In-process ledger for development runs and tests.

use super::{Ledger, LedgerCall, LedgerError, LedgerErrorKind, Receipt, TeamCounts, TxHandle};
use crate::board::{Board, Cell, Team, Word, pack, unpack};
use crate::game::GamePhase;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
struct MemoryState {
    nonce: u64,
    phase: GamePhase,
    board: Vec<Word>,
    game_id: u64,
    concluded: bool,
    teams: HashMap<String, Team>,
    applied: Vec<LedgerCall>,
    failures: VecDeque<LedgerErrorKind>,
    targeted: Vec<(LedgerCall, LedgerErrorKind)>,
}

/// Ledger kept in memory.
///
/// Mirrors the contract rules the orchestrator depends on: sequence numbers
/// must match exactly, and after `endGame` every `setPhase` and `endGame`
/// fails with [`LedgerErrorKind::GameConcluded`] until `newGame`.
#[derive(Debug)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    /// Creates a ledger with an empty board at game 1.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory ledger");
        Self {
            state: Mutex::new(MemoryState {
                nonce: 0,
                phase: GamePhase::Picking,
                board: pack(&Board::new()),
                game_id: 1,
                concluded: false,
                teams: HashMap::new(),
                applied: Vec::new(),
                failures: VecDeque::new(),
                targeted: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the stored board, as players placing squares would.
    #[instrument(skip(self, board))]
    pub fn set_board(&self, board: &Board) {
        self.lock().board = pack(board);
    }

    /// Places a single square.
    #[instrument(skip(self))]
    pub fn place(&self, x: usize, y: usize, cell: Cell) {
        let mut state = self.lock();
        let board = unpack(&state.board).with_cell(x, y, cell);
        state.board = pack(&board);
    }

    /// Records an account's team choice.
    #[instrument(skip(self))]
    pub fn join_team(&self, account: &str, team: Team) {
        self.lock().teams.insert(account.to_string(), team);
    }

    /// Ends the current game from outside the orchestrator.
    #[instrument(skip(self))]
    pub fn conclude(&self) {
        self.lock().concluded = true;
    }

    /// Makes the next `send` fail with `kind` before any validation.
    #[instrument(skip(self))]
    pub fn fail_next_send(&self, kind: LedgerErrorKind) {
        self.lock().failures.push_back(kind);
    }

    /// Makes the next `send` of exactly `call` fail with `kind`.
    #[instrument(skip(self, call), fields(method = call.method()))]
    pub fn fail_next_call(&self, call: LedgerCall, kind: LedgerErrorKind) {
        self.lock().targeted.push((call, kind));
    }

    /// Successfully applied calls, oldest first.
    pub fn applied(&self) -> Vec<LedgerCall> {
        self.lock().applied.clone()
    }

    /// Current contract phase.
    pub fn phase(&self) -> GamePhase {
        self.lock().phase
    }

    /// Current contract game id.
    pub fn game_id(&self) -> u64 {
        self.lock().game_id
    }

    /// Next expected sequence number.
    pub fn nonce(&self) -> u64 {
        self.lock().nonce
    }

    /// Decoded board currently stored.
    pub fn current_board(&self) -> Board {
        unpack(&self.lock().board)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    fn apply(&mut self, call: &LedgerCall) -> Result<(), LedgerError> {
        match call {
            LedgerCall::SetPhase(phase) => {
                if self.concluded {
                    return Err(LedgerError::new(
                        LedgerErrorKind::GameConcluded,
                        "Game already concluded",
                    ));
                }
                self.phase = *phase;
            }
            LedgerCall::ServerOverwriteBoard(chunks) => {
                self.board = chunks.clone();
            }
            LedgerCall::NewGame(id) => {
                self.game_id = *id;
                self.concluded = false;
                self.phase = GamePhase::Picking;
                self.board = pack(&Board::new());
                self.teams.clear();
            }
            LedgerCall::EndGame => {
                if self.concluded {
                    return Err(LedgerError::new(
                        LedgerErrorKind::GameConcluded,
                        "Game already concluded",
                    ));
                }
                self.concluded = true;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn pending_nonce(&self) -> Result<u64, LedgerError> {
        Ok(self.lock().nonce)
    }

    #[instrument(skip(self, call), fields(method = call.method()))]
    async fn send(&self, call: &LedgerCall, nonce: u64) -> Result<TxHandle, LedgerError> {
        let mut state = self.lock();

        if let Some(kind) = state.failures.pop_front() {
            warn!(%kind, "Injected ledger failure");
            return Err(LedgerError::new(kind, "Injected failure"));
        }
        if let Some(index) = state.targeted.iter().position(|(target, _)| target == call) {
            let (_, kind) = state.targeted.remove(index);
            warn!(%kind, "Injected ledger failure for call");
            return Err(LedgerError::new(kind, "Injected failure"));
        }

        if nonce != state.nonce {
            return Err(LedgerError::new(
                LedgerErrorKind::StaleNonce,
                format!("Expected nonce {}, got {}", state.nonce, nonce),
            ));
        }

        state.apply(call)?;
        state.nonce += 1;
        state.applied.push(call.clone());
        debug!(nonce, "Applied ledger call");

        Ok(TxHandle::new(format!("0x{:064x}", nonce + 1), nonce))
    }

    async fn confirm(&self, tx: &TxHandle) -> Result<Receipt, LedgerError> {
        Ok(Receipt::new(tx.hash.clone(), tx.nonce))
    }

    async fn board(&self) -> Result<Vec<Word>, LedgerError> {
        Ok(self.lock().board.clone())
    }

    async fn team_counts(&self) -> Result<TeamCounts, LedgerError> {
        let state = self.lock();
        let count = |team: Team| state.teams.values().filter(|t| **t == team).count() as u64;
        Ok(TeamCounts::new(count(Team::Red), count(Team::Blue)))
    }

    async fn team_of(&self, account: &str) -> Result<Team, LedgerError> {
        Ok(self
            .lock()
            .teams
            .get(account)
            .copied()
            .unwrap_or(Team::Unassigned))
    }
}
