//! Tests for the phase scheduler against the in-memory ledger.

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;

use game_of_death::{
    Board, Cell, EventBus, GameEvent, GamePhase, LedgerCall, LedgerErrorKind, MemoryLedger,
    PhaseScheduler, PhaseState, RecordStore, SchedulerParts, SnapshotFile, Team, TickOutcome,
    TimingConfig, TxPipeline, Winner,
};

struct Harness {
    _dir: TempDir,
    ledger: Arc<MemoryLedger>,
    records: Arc<RecordStore>,
    snapshot_path: PathBuf,
    events: EventBus,
    scheduler: Arc<PhaseScheduler>,
}

/// One-second phases, a few generations, no pause between them.
fn fast_timing(max_cycles: u32) -> TimingConfig {
    TimingConfig::default()
        .with_picking_secs(1)
        .with_placing_secs(1)
        .with_final_secs(1)
        .with_max_cycles(max_cycles)
        .with_cycle_generations(2)
        .with_final_generations(3)
        .with_generation_interval_ms(0)
}

async fn setup(timing: TimingConfig) -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    setup_in(dir, timing).await
}

async fn setup_in(dir: TempDir, timing: TimingConfig) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let records = Arc::new(RecordStore::open(dir.path().join("records.json")).await);
    let snapshot_path = dir.path().join("state.json");
    let events = EventBus::new(1024);

    let scheduler = PhaseScheduler::restore(SchedulerParts {
        timing,
        ledger: ledger.clone(),
        pipeline: TxPipeline::spawn(ledger.clone()),
        records: records.clone(),
        events: events.clone(),
        snapshot: SnapshotFile::new(snapshot_path.clone()),
        thumbnail_base_url: Some("https://thumbs.example/".to_string()),
    })
    .await;

    Harness {
        _dir: dir,
        ledger,
        records,
        snapshot_path,
        events,
        scheduler: Arc::new(scheduler),
    }
}

/// A red block (still life) sitting in the blue half.
fn red_invasion_board() -> Board {
    Board::new()
        .with_cell(10, 40, Cell::Red)
        .with_cell(11, 40, Cell::Red)
        .with_cell(10, 41, Cell::Red)
        .with_cell(11, 41, Cell::Red)
}

fn drain(rx: &mut broadcast::Receiver<GameEvent>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn phases_seen(events: &[GameEvent]) -> Vec<GamePhase> {
    let mut phases: Vec<GamePhase> = Vec::new();
    for event in events {
        if let GameEvent::PhaseUpdated(update) = event
            && phases.last() != Some(&update.phase)
        {
            phases.push(update.phase);
        }
    }
    phases
}

#[tokio::test]
async fn test_single_cycle_game_walk() {
    let h = setup(fast_timing(1)).await;
    let mut rx = h.events.subscribe();
    h.ledger.set_board(&red_invasion_board());
    h.ledger.join_team("0xRedPlayer", Team::Red);
    assert_eq!(
        h.scheduler.join("0xRedPlayer").await.expect("Join failed"),
        Team::Red
    );

    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Placing)
    );
    assert_eq!(h.ledger.phase(), GamePhase::Placing);

    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Final)
    );
    let state = h.scheduler.phase_state().await;
    assert_eq!(state.phase, GamePhase::Final);
    assert_eq!(state.time_left, 1);
    // Fetched board plus one per final generation.
    assert_eq!(h.scheduler.history().await.len(), 4);
    assert_eq!(h.ledger.current_board(), red_invasion_board());
    assert!(h.snapshot_path.exists());

    let record = h.records.get(1).await.expect("Game should be recorded");
    assert_eq!(*record.winner(), Winner::Red);
    assert_eq!(*record.team_red_count(), 1);
    assert_eq!(*record.team_blue_count(), 0);
    assert_eq!(record.board_history().len(), 4);
    assert!(record.has_participant("0xredplayer"));
    assert_eq!(
        record.thumbnail().as_deref(),
        Some("https://thumbs.example/game_1.png")
    );
    assert!(h.scheduler.participants().await.is_empty());

    let events = drain(&mut rx);
    assert!(events.contains(&GameEvent::Winner(game_of_death::WinnerUpdate {
        winner: Winner::Red
    })));
    assert_eq!(
        phases_seen(&events),
        vec![
            GamePhase::Picking,
            GamePhase::Placing,
            GamePhase::Simulating,
            GamePhase::Final
        ]
    );

    assert_eq!(h.scheduler.tick().await, TickOutcome::Reset);
    assert_eq!(
        h.ledger.applied(),
        vec![
            LedgerCall::SetPhase(GamePhase::Placing),
            LedgerCall::SetPhase(GamePhase::Simulating),
            LedgerCall::ServerOverwriteBoard(game_of_death::pack(&red_invasion_board())),
            LedgerCall::EndGame,
            LedgerCall::NewGame(2),
        ]
    );
}

#[tokio::test]
async fn test_reset_starts_fresh_game() {
    let h = setup(fast_timing(1)).await;
    h.scheduler.tick().await;
    h.scheduler.tick().await;
    assert_eq!(h.scheduler.game_id().await, 1);

    assert_eq!(h.scheduler.tick().await, TickOutcome::Reset);
    assert_eq!(h.scheduler.game_id().await, 2);
    assert_eq!(h.ledger.game_id(), 2);
    assert_eq!(
        h.scheduler.phase_state().await,
        PhaseState {
            phase: GamePhase::Picking,
            time_left: 1,
            cycle_count: 0,
        }
    );
    assert!(h.scheduler.history().await.is_empty());
    assert!(!h.snapshot_path.exists());

    // The next tick persists the new game again.
    h.scheduler.tick().await;
    assert!(h.snapshot_path.exists());
}

#[tokio::test]
async fn test_empty_board_is_a_tie() {
    let h = setup(fast_timing(1)).await;
    h.scheduler.tick().await;
    h.scheduler.tick().await;
    let record = h.records.get(1).await.expect("Game should be recorded");
    assert_eq!(*record.winner(), Winner::Tie);
}

#[tokio::test]
async fn test_two_cycle_game_returns_to_picking() {
    let h = setup(fast_timing(2)).await;
    h.ledger.set_board(&red_invasion_board());

    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Placing)
    );
    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Picking)
    );

    let state = h.scheduler.phase_state().await;
    assert_eq!(state.cycle_count, 1);
    assert_eq!(state.time_left, 1);
    assert_eq!(h.scheduler.history().await.len(), 3);
    assert!(h.records.is_empty().await);
    assert_eq!(
        h.ledger.applied(),
        vec![
            LedgerCall::SetPhase(GamePhase::Placing),
            LedgerCall::SetPhase(GamePhase::Simulating),
            LedgerCall::ServerOverwriteBoard(game_of_death::pack(&red_invasion_board())),
            LedgerCall::SetPhase(GamePhase::Picking),
        ]
    );

    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Placing)
    );
    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Final)
    );
    // History keeps both stints: 1 + 2, then 1 + 3.
    assert_eq!(h.scheduler.history().await.len(), 7);
    assert_eq!(h.records.len().await, 1);
}

#[tokio::test]
async fn test_timer_counts_down_before_transition() {
    let h = setup(fast_timing(1).with_picking_secs(3)).await;
    assert_eq!(h.scheduler.tick().await, TickOutcome::Idle);
    assert_eq!(h.scheduler.phase_state().await.time_left, 2);
    assert_eq!(h.scheduler.tick().await, TickOutcome::Idle);
    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Placing)
    );
}

#[tokio::test]
async fn test_concluded_game_triggers_reset() {
    let h = setup(fast_timing(1)).await;
    h.ledger.conclude();

    assert_eq!(h.scheduler.tick().await, TickOutcome::Reset);
    assert_eq!(h.scheduler.game_id().await, 2);
    assert_eq!(h.ledger.applied(), vec![LedgerCall::NewGame(2)]);
    assert_eq!(h.ledger.phase(), GamePhase::Picking);
}

#[tokio::test]
async fn test_concluded_during_cycle_end_triggers_reset() {
    let h = setup(fast_timing(2)).await;
    h.scheduler.tick().await;

    h.ledger.fail_next_call(
        LedgerCall::SetPhase(GamePhase::Picking),
        LedgerErrorKind::GameConcluded,
    );
    assert_eq!(h.scheduler.tick().await, TickOutcome::Reset);
    assert_eq!(h.scheduler.phase_state().await.cycle_count, 0);
    assert!(h.scheduler.history().await.is_empty());
}

#[tokio::test]
async fn test_transient_failure_retries_next_tick() {
    let h = setup(fast_timing(1)).await;
    h.ledger.fail_next_send(LedgerErrorKind::Transport);

    assert_eq!(h.scheduler.tick().await, TickOutcome::Retrying);
    let state = h.scheduler.phase_state().await;
    assert_eq!(state.phase, GamePhase::Picking);
    assert_eq!(state.time_left, 0);
    assert_eq!(h.ledger.phase(), GamePhase::Picking);

    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Placing)
    );
}

#[tokio::test]
async fn test_failed_push_resumes_without_rerunning() {
    let h = setup(fast_timing(1)).await;
    h.ledger.set_board(&red_invasion_board());
    h.scheduler.tick().await;

    h.ledger.fail_next_call(
        LedgerCall::ServerOverwriteBoard(game_of_death::pack(&red_invasion_board())),
        LedgerErrorKind::Reverted,
    );
    assert_eq!(h.scheduler.tick().await, TickOutcome::Retrying);
    assert_eq!(h.scheduler.phase_state().await.phase, GamePhase::Simulating);
    assert_eq!(h.scheduler.history().await.len(), 4);

    // A rerun would start from this board; the push must use the computed one.
    h.ledger.set_board(&Board::new());
    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Final)
    );
    assert_eq!(h.scheduler.history().await.len(), 4);
    assert_eq!(h.ledger.current_board(), red_invasion_board());
    let record = h.records.get(1).await.expect("Game should be recorded");
    assert_eq!(*record.winner(), Winner::Red);
}

#[tokio::test]
async fn test_busy_tick_holds_timer_during_transition() {
    let timing = fast_timing(1)
        .with_final_generations(3)
        .with_generation_interval_ms(100);
    let h = setup(timing).await;
    h.scheduler.tick().await;

    let running = tokio::spawn({
        let scheduler = h.scheduler.clone();
        async move { scheduler.tick().await }
    });
    while !h.scheduler.is_transitioning() {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.scheduler.tick().await, TickOutcome::Busy);
    assert_eq!(h.scheduler.phase_state().await.time_left, 0);

    assert_eq!(
        running.await.expect("Tick task panicked"),
        TickOutcome::Advanced(GamePhase::Final)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ticks_transition_once() {
    let h = setup(fast_timing(1).with_placing_secs(30)).await;

    let ticks: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        })
        .collect();
    let mut outcomes = Vec::new();
    for tick in ticks {
        outcomes.push(tick.await.expect("Tick task panicked"));
    }

    let advanced = outcomes
        .iter()
        .filter(|o| **o == TickOutcome::Advanced(GamePhase::Placing))
        .count();
    assert_eq!(advanced, 1);
    assert!(outcomes.iter().all(|o| matches!(
        o,
        TickOutcome::Advanced(GamePhase::Placing) | TickOutcome::Busy | TickOutcome::Idle
    )));
    assert_eq!(
        h.ledger.applied(),
        vec![LedgerCall::SetPhase(GamePhase::Placing)]
    );
    assert_eq!(h.scheduler.phase_state().await.phase, GamePhase::Placing);
}

#[tokio::test]
async fn test_restore_resumes_from_snapshot() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let snapshot = SnapshotFile::new(dir.path().join("state.json"));
    let saved = PhaseState {
        phase: GamePhase::Placing,
        time_left: 5,
        cycle_count: 0,
    };
    snapshot
        .save(&saved, 1, &[red_invasion_board()])
        .await
        .expect("Save failed");

    let h = setup_in(dir, fast_timing(1)).await;
    assert_eq!(h.scheduler.phase_state().await, saved);
    assert_eq!(h.scheduler.history().await, vec![red_invasion_board()]);
    assert_eq!(h.scheduler.board().await, red_invasion_board());
}

#[tokio::test]
async fn test_restore_into_simulating_reruns_simulation() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let snapshot = SnapshotFile::new(dir.path().join("state.json"));
    let saved = PhaseState {
        phase: GamePhase::Simulating,
        time_left: 0,
        cycle_count: 0,
    };
    snapshot.save(&saved, 1, &[]).await.expect("Save failed");

    let h = setup_in(dir, fast_timing(1)).await;
    h.ledger.set_board(&red_invasion_board());
    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Final)
    );
    assert_eq!(
        h.ledger.applied(),
        vec![LedgerCall::ServerOverwriteBoard(game_of_death::pack(
            &red_invasion_board()
        ))]
    );
}

#[tokio::test]
async fn test_restart_in_final_keeps_game_id() {
    let h = setup(fast_timing(1)).await;
    h.scheduler.tick().await;
    assert_eq!(
        h.scheduler.tick().await,
        TickOutcome::Advanced(GamePhase::Final)
    );
    assert!(h.records.get(1).await.is_ok());

    let Harness { _dir: dir, .. } = h;
    let h = setup_in(dir, fast_timing(1)).await;
    assert_eq!(h.scheduler.game_id().await, 1);
    assert_eq!(h.scheduler.phase_state().await.phase, GamePhase::Final);

    assert_eq!(h.scheduler.tick().await, TickOutcome::Reset);
    assert_eq!(
        h.ledger.applied(),
        vec![LedgerCall::EndGame, LedgerCall::NewGame(2)]
    );
    assert_eq!(h.scheduler.game_id().await, 2);
    assert_eq!(h.records.len().await, 1);
}

#[tokio::test]
async fn test_unassigned_account_does_not_join() {
    let h = setup(fast_timing(1)).await;
    let team = h.scheduler.join("0xnobody").await.expect("Join failed");
    assert_eq!(team, Team::Unassigned);
    assert!(h.scheduler.participants().await.is_empty());
}

#[tokio::test]
async fn test_live_board_reads_ledger() {
    let h = setup(fast_timing(1)).await;
    h.ledger.set_board(&red_invasion_board());
    assert_eq!(h.scheduler.live_board().await, red_invasion_board());
    assert_eq!(h.scheduler.board().await, Board::new());
}
