//! Phase scheduler: the once-per-second state machine driving a game.
//!
//! Each tick decrements the phase timer and, when the phase is due, runs its
//! transition. Transitions talk to the ledger and may take longer than a
//! tick, so only one runs at a time (guarded by a latch) and the state lock
//! is released around every ledger await. Ticks that arrive while a
//! transition is in flight keep the timer at zero, broadcast, and persist.

use super::phase::{GamePhase, PhaseState};
use super::snapshot::SnapshotFile;
use crate::board::{Board, Team, Winner, advance, compute_winner, pack, unpack};
use crate::config::TimingConfig;
use crate::events::{EventBus, GameEvent, PhaseUpdate, WinnerUpdate};
use crate::ledger::{Ledger, LedgerCall, LedgerError, TeamCounts, TxPipeline};
use crate::records::{GameRecord, RecordError, RecordStore, thumbnail_ref};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

/// Collaborators a scheduler is assembled from.
#[derive(Debug, Clone)]
pub struct SchedulerParts {
    /// Phase durations and generation counts.
    pub timing: TimingConfig,
    /// Read access to the ledger.
    pub ledger: Arc<dyn Ledger>,
    /// Write access to the ledger.
    pub pipeline: TxPipeline,
    /// Finished games.
    pub records: Arc<RecordStore>,
    /// Observer fan-out.
    pub events: EventBus,
    /// Crash-recovery file.
    pub snapshot: SnapshotFile,
    /// Base URL thumbnails are rendered under.
    pub thumbnail_base_url: Option<String>,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer moved; nothing was due.
    Idle,
    /// A transition was due but another tick is running one.
    Busy,
    /// A transition completed into the given phase.
    Advanced(GamePhase),
    /// The game was reset to a fresh Picking phase.
    Reset,
    /// The transition failed and will be retried on the next tick.
    Retrying,
}

/// Progress of the simulation within the current Simulating phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimulationStage {
    /// Generations not yet run.
    Pending,
    /// Generations run; the last one still has to be pushed.
    Ran,
    /// Last generation written back to the ledger.
    Pushed,
}

#[derive(Debug)]
struct GameState {
    phase: PhaseState,
    history: Vec<Board>,
    board: Board,
    participants: BTreeSet<String>,
    game_id: u64,
    stage: SimulationStage,
}

/// Holds the latch for the duration of one transition.
struct TransitionGuard<'a>(&'a AtomicBool);

impl<'a> TransitionGuard<'a> {
    fn try_acquire(latch: &'a AtomicBool) -> Option<Self> {
        latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(latch))
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives phases, simulation, scoring, recording and resets.
#[derive(Debug)]
pub struct PhaseScheduler {
    timing: TimingConfig,
    ledger: Arc<dyn Ledger>,
    pipeline: TxPipeline,
    records: Arc<RecordStore>,
    events: EventBus,
    snapshot: SnapshotFile,
    thumbnail_base_url: Option<String>,
    state: Mutex<GameState>,
    transitioning: AtomicBool,
}

impl PhaseScheduler {
    /// Builds a scheduler, resuming from the snapshot when one is readable.
    ///
    /// The game id comes from the snapshot. Without one it continues after
    /// the last recorded game.
    #[instrument(skip(parts), fields(snapshot = %parts.snapshot.path().display()))]
    pub async fn restore(parts: SchedulerParts) -> Self {
        let SchedulerParts {
            timing,
            ledger,
            pipeline,
            records,
            events,
            snapshot,
            thumbnail_base_url,
        } = parts;

        let (phase, saved_id, history) = match snapshot.load().await {
            Some(persisted) => (
                persisted.phase_state(),
                persisted.game_id,
                persisted.board_history,
            ),
            None => (PhaseState::start(&timing), None, Vec::new()),
        };
        let board = history.last().cloned().unwrap_or_default();
        let game_id = match saved_id {
            Some(id) => id,
            None => records.next_game_id().await,
        };

        info!(
            game_id,
            phase = %phase.phase,
            time_left = phase.time_left,
            cycle_count = phase.cycle_count,
            "Scheduler ready"
        );

        Self {
            timing,
            ledger,
            pipeline,
            records,
            events,
            snapshot,
            thumbnail_base_url,
            state: Mutex::new(GameState {
                phase,
                history,
                board,
                participants: BTreeSet::new(),
                game_id,
                stage: SimulationStage::Pending,
            }),
            transitioning: AtomicBool::new(false),
        }
    }

    /// Spawns the once-per-second driver. Each tick runs as its own task so
    /// a slow transition never delays the clock.
    pub fn run_ticks(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            info!("Tick driver started");
            loop {
                interval.tick().await;
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    scheduler.tick().await;
                });
            }
        })
    }

    /// Advances the game by one second.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickOutcome {
        let due = {
            let mut state = self.state.lock().await;
            let due = state.phase.tick();
            self.publish_phase(&state.phase);
            due
        };

        let outcome = if !due {
            TickOutcome::Idle
        } else {
            match TransitionGuard::try_acquire(&self.transitioning) {
                Some(_guard) => self.transition().await,
                None => {
                    debug!("Transition in flight, holding timer");
                    TickOutcome::Busy
                }
            }
        };

        if outcome != TickOutcome::Reset {
            self.persist().await;
        }
        outcome
    }

    async fn transition(&self) -> TickOutcome {
        // Another tick may have finished the transition between this tick's
        // countdown and taking the latch.
        let phase = {
            let state = self.state.lock().await;
            if !state.phase.is_due() {
                debug!(phase = %state.phase.phase, "Transition already done");
                return TickOutcome::Idle;
            }
            state.phase.phase
        };
        let result = match phase {
            GamePhase::Picking => self.begin_placing().await,
            GamePhase::Placing => self.begin_simulating().await,
            GamePhase::Simulating => self.finish_simulation().await,
            GamePhase::Final => self.end_game().await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_game_concluded() => {
                info!(from = %phase, "Ledger reports game concluded, resetting");
                match self.reset().await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, "Reset failed, will retry");
                        TickOutcome::Retrying
                    }
                }
            }
            Err(e) => {
                warn!(from = %phase, error = %e, "Transition failed, will retry");
                TickOutcome::Retrying
            }
        }
    }

    async fn begin_placing(&self) -> Result<TickOutcome, LedgerError> {
        self.pipeline
            .submit(LedgerCall::SetPhase(GamePhase::Placing))
            .await?;
        self.enter(GamePhase::Placing, *self.timing.placing_secs())
            .await;
        Ok(TickOutcome::Advanced(GamePhase::Placing))
    }

    async fn begin_simulating(&self) -> Result<TickOutcome, LedgerError> {
        self.pipeline
            .submit(LedgerCall::SetPhase(GamePhase::Simulating))
            .await?;
        {
            let mut state = self.state.lock().await;
            state.stage = SimulationStage::Pending;
        }
        self.enter(GamePhase::Simulating, 0).await;
        self.finish_simulation().await
    }

    /// Runs whatever part of the simulation is still outstanding, then
    /// leaves Simulating.
    async fn finish_simulation(&self) -> Result<TickOutcome, LedgerError> {
        let (stage, final_cycle) = {
            let state = self.state.lock().await;
            (
                state.stage,
                state.phase.is_final_cycle(*self.timing.max_cycles()),
            )
        };

        if stage == SimulationStage::Pending {
            let generations = if final_cycle {
                *self.timing.final_generations()
            } else {
                *self.timing.cycle_generations()
            };
            self.run_generations(generations).await?;
            self.state.lock().await.stage = SimulationStage::Ran;
        }

        let last = self.state.lock().await.board.clone();
        if stage != SimulationStage::Pushed {
            self.pipeline
                .submit(LedgerCall::ServerOverwriteBoard(pack(&last)))
                .await?;
            self.state.lock().await.stage = SimulationStage::Pushed;
            debug!("Final generation pushed to ledger");
        }

        if final_cycle {
            return Ok(self.conclude_game(&last).await);
        }

        self.pipeline
            .submit(LedgerCall::SetPhase(GamePhase::Picking))
            .await?;
        {
            let mut state = self.state.lock().await;
            state.phase.cycle_count += 1;
            state.stage = SimulationStage::Pending;
        }
        self.enter(GamePhase::Picking, *self.timing.picking_secs())
            .await;
        Ok(TickOutcome::Advanced(GamePhase::Picking))
    }

    /// Fetches the ledger board and runs `generations` steps from it,
    /// appending and broadcasting every board.
    #[instrument(skip(self))]
    async fn run_generations(&self, generations: u32) -> Result<Board, LedgerError> {
        let chunks = self.ledger.board().await?;
        let mut board = unpack(&chunks);
        self.push_board(board.clone()).await;

        let pause = self.timing.generation_interval();
        for generation in 1..=generations {
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            board = advance(&board);
            debug!(generation, "Generation computed");
            self.push_board(board.clone()).await;
        }

        info!(generations, "Simulation complete");
        Ok(board)
    }

    async fn push_board(&self, board: Board) {
        let mut state = self.state.lock().await;
        state.history.push(board.clone());
        state.board = board.clone();
        self.events.publish(GameEvent::BoardUpdated(board));
    }

    async fn conclude_game(&self, board: &Board) -> TickOutcome {
        let winner = compute_winner(board);
        info!(%winner, "Game decided");
        self.events
            .publish(GameEvent::Winner(WinnerUpdate { winner }));

        if let Err(e) = self.record_game(winner).await {
            warn!(error = %e, "Failed to record game");
        }

        self.enter(GamePhase::Final, *self.timing.final_secs()).await;
        TickOutcome::Advanced(GamePhase::Final)
    }

    async fn end_game(&self) -> Result<TickOutcome, LedgerError> {
        self.pipeline.submit(LedgerCall::EndGame).await?;
        self.reset().await
    }

    /// Starts the next game on the ledger and clears local game state.
    #[instrument(skip(self))]
    async fn reset(&self) -> Result<TickOutcome, LedgerError> {
        let next_id = self.state.lock().await.game_id + 1;
        self.pipeline.submit(LedgerCall::NewGame(next_id)).await?;

        let mut state = self.state.lock().await;
        state.game_id = next_id;
        state.phase = PhaseState::start(&self.timing);
        state.history.clear();
        state.participants.clear();
        state.stage = SimulationStage::Pending;
        state.board = Board::new();
        if let Err(e) = self.snapshot.remove().await {
            warn!(error = %e, "Failed to remove snapshot");
        }

        self.publish_phase(&state.phase);
        self.events
            .publish(GameEvent::BoardUpdated(state.board.clone()));
        info!(game_id = next_id, "New game started");
        Ok(TickOutcome::Reset)
    }

    /// Stores the finished game and clears the participant set.
    ///
    /// Team sizes that cannot be read are recorded as zero.
    #[instrument(skip(self))]
    pub async fn record_game(&self, winner: Winner) -> Result<GameRecord, RecordError> {
        let counts = match self.ledger.team_counts().await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Failed to read team counts, recording zero");
                TeamCounts::default()
            }
        };

        let record = {
            let state = self.state.lock().await;
            GameRecord::new(
                state.game_id,
                winner,
                Utc::now(),
                counts.red,
                counts.blue,
                state.history.clone(),
                state.participants.clone(),
                thumbnail_ref(self.thumbnail_base_url.as_deref(), state.game_id),
            )
        };

        let appended = self.records.append(record.clone()).await;
        self.state.lock().await.participants.clear();
        appended?;

        info!(game_id = record.game_id(), "Game recorded");
        Ok(record)
    }

    /// Registers `account` as a participant if the ledger has it on a team.
    #[instrument(skip(self))]
    pub async fn join(&self, account: &str) -> Result<Team, LedgerError> {
        let team = self.ledger.team_of(account).await?;
        match team {
            Team::Red | Team::Blue => {
                let added = self
                    .state
                    .lock()
                    .await
                    .participants
                    .insert(account.to_ascii_lowercase());
                if added {
                    info!(%team, "Participant joined");
                }
            }
            Team::Unassigned => debug!("Account has no team yet"),
        }
        Ok(team)
    }

    async fn enter(&self, phase: GamePhase, time_left: u32) {
        let mut state = self.state.lock().await;
        state.phase.enter(phase, time_left);
        self.publish_phase(&state.phase);
        info!(%phase, time_left = state.phase.time_left, "Phase entered");
    }

    fn publish_phase(&self, phase: &PhaseState) {
        self.events.publish(GameEvent::PhaseUpdated(PhaseUpdate {
            phase: phase.phase,
            time_left: phase.time_left,
        }));
    }

    async fn persist(&self) {
        let state = self.state.lock().await;
        if let Err(e) = self
            .snapshot
            .save(&state.phase, state.game_id, &state.history).await {
            warn!(error = %e, "Failed to persist snapshot");
        }
    }

    /// Current phase, timer and cycle.
    pub async fn phase_state(&self) -> PhaseState {
        self.state.lock().await.phase
    }

    /// Id of the game in progress.
    pub async fn game_id(&self) -> u64 {
        self.state.lock().await.game_id
    }

    /// Last board seen by the scheduler.
    pub async fn board(&self) -> Board {
        self.state.lock().await.board.clone()
    }

    /// Boards of the game in progress.
    pub async fn history(&self) -> Vec<Board> {
        self.state.lock().await.history.clone()
    }

    /// Accounts that joined the game in progress.
    pub async fn participants(&self) -> BTreeSet<String> {
        self.state.lock().await.participants.clone()
    }

    /// Board as the ledger has it now, or the last known board if the
    /// ledger cannot be read.
    #[instrument(skip(self))]
    pub async fn live_board(&self) -> Board {
        match self.ledger.board().await {
            Ok(chunks) => unpack(&chunks),
            Err(e) => {
                warn!(error = %e, "Ledger board unavailable, serving cached board");
                self.board().await
            }
        }
    }

    /// True while a transition is running.
    pub fn is_transitioning(&self) -> bool {
        self.transitioning.load(Ordering::Acquire)
    }
}
