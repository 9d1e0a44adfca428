//! HTTP query surface and WebSocket event stream.

use crate::board::{Board, Team};
use crate::events::{EventBus, GameEvent, PhaseUpdate};
use crate::game::{GamePhase, PhaseScheduler};
use crate::ledger::{Ledger, LedgerError, TeamCounts};
use crate::records::{GameRecord, RecordError, RecordErrorKind, RecordStore};
use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

/// Shared handles every route reads from.
#[derive(Debug, Clone)]
pub struct AppState {
    scheduler: Arc<PhaseScheduler>,
    records: Arc<RecordStore>,
    ledger: Arc<dyn Ledger>,
    events: EventBus,
}

impl AppState {
    /// Bundles the handles for the router.
    pub fn new(
        scheduler: Arc<PhaseScheduler>,
        records: Arc<RecordStore>,
        ledger: Arc<dyn Ledger>,
        events: EventBus,
    ) -> Self {
        Self {
            scheduler,
            records,
            ledger,
            events,
        }
    }
}

/// Error body returned by every failing route: `{"error": "..."}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        let status = match err.kind {
            RecordErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        warn!(error = %err, "Ledger read failed");
        Self::new(StatusCode::BAD_GATEWAY, err.message)
    }
}

/// `GET /api/board` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct BoardResponse {
    /// Current board.
    pub board: Board,
}

/// `GET /api/phase` response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResponse {
    /// Active phase.
    pub phase: GamePhase,
    /// Seconds left in the phase.
    pub time_left: u32,
    /// Completed cycles.
    pub cycle_count: u32,
    /// Game in progress.
    pub game_id: u64,
}

/// `GET /api/history` response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Boards of the game in progress.
    pub board_history: Vec<Board>,
}

/// Record list response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordsResponse {
    /// Records, most recent first.
    pub records: Vec<GameRecord>,
}

/// `GET /api/get-team` response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamResponse {
    /// Team name.
    pub team: Team,
    /// Ledger team id.
    pub team_id: u8,
}

impl From<Team> for TeamResponse {
    fn from(team: Team) -> Self {
        Self {
            team,
            team_id: team.id(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TeamQuery {
    address: Option<String>,
}

/// `POST /api/join` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Account joining the game.
    pub address: String,
}

/// Builds the router with request logging.
#[instrument(skip(state))]
pub fn router(state: AppState) -> Router {
    info!("Building HTTP router");
    Router::new()
        .route("/api/board", get(board))
        .route("/api/phase", get(phase))
        .route("/timer", get(phase))
        .route("/api/history", get(history))
        .route("/api/allRecords", get(all_records))
        .route("/api/records/{address}", get(participant_records))
        .route("/api/record/{game_id}", get(record))
        .route("/api/team-counts", get(team_counts))
        .route("/api/get-team", get(get_team))
        .route("/api/join", post(join))
        .route("/ws", get(ws_upgrade))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            debug!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(state)
}

async fn board(State(state): State<AppState>) -> Json<BoardResponse> {
    Json(BoardResponse {
        board: state.scheduler.live_board().await,
    })
}

async fn phase(State(state): State<AppState>) -> Json<PhaseResponse> {
    let current = state.scheduler.phase_state().await;
    Json(PhaseResponse {
        phase: current.phase,
        time_left: current.time_left,
        cycle_count: current.cycle_count,
        game_id: state.scheduler.game_id().await,
    })
}

async fn history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        board_history: state.scheduler.history().await,
    })
}

async fn all_records(State(state): State<AppState>) -> Json<RecordsResponse> {
    Json(RecordsResponse {
        records: state.records.list_all().await,
    })
}

async fn participant_records(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Json<RecordsResponse> {
    Json(RecordsResponse {
        records: state.records.list_by_participant(&address).await,
    })
}

async fn record(
    State(state): State<AppState>,
    Path(game_id): Path<u64>,
) -> Result<Json<GameRecord>, ApiError> {
    Ok(Json(state.records.get(game_id).await?))
}

async fn team_counts(State(state): State<AppState>) -> Result<Json<TeamCounts>, ApiError> {
    Ok(Json(state.ledger.team_counts().await?))
}

async fn get_team(
    State(state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<TeamResponse>, ApiError> {
    let address = query
        .address
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "Missing address parameter"))?;
    let team = state.ledger.team_of(&address).await?;
    Ok(Json(team.into()))
}

async fn join(
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<TeamResponse>, ApiError> {
    if request.address.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing address"));
    }
    let team = state.scheduler.join(&request.address).await?;
    Ok(Json(team.into()))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

/// Sends the current phase and board, then forwards every broadcast event
/// until either side goes away.
#[instrument(skip_all)]
async fn stream_events(mut socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();
    info!("WebSocket observer connected");

    let current = state.scheduler.phase_state().await;
    let greeting = [
        GameEvent::PhaseUpdated(PhaseUpdate {
            phase: current.phase,
            time_left: current.time_left,
        }),
        GameEvent::BoardUpdated(state.scheduler.board().await),
    ];
    for event in &greeting {
        if !send_event(&mut socket, event).await {
            return;
        }
    }

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if !send_event(&mut socket, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Observer lagged, skipping events");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("WebSocket observer disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &GameEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode event");
            return true;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}
