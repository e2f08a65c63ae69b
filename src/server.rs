use axum::{
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, sync::Notify};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::config::{now_ms, resolve_repo_path, AppConfig};
use crate::error::GameError;
use crate::game::{GameState, PublicState, RegisterPlayer, StartRoundOptions};
use crate::types::*;

#[derive(Clone)]
pub struct AppState {
    pub game: SharedGame,
    /// Poked after every mutation so the round driver re-reads its deadline.
    pub wake: Arc<Notify>,
}

impl AppState {
    pub fn new(game: GameState) -> Self {
        AppState {
            game: Arc::new(Mutex::new(game)),
            wake: Arc::new(Notify::new()),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────────

pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::Precondition(_) => StatusCode::CONFLICT,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ── Request bodies ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RegisterBody {
    name: String,
    role: Option<String>,
    is_bot: bool,
    bot_strategy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MoveBody {
    #[serde(rename = "move")]
    selection: Option<String>,
    stage: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StartBody {
    admin_id: Option<String>,
}

// ── Router ─────────────────────────────────────────────────────────────

pub fn api_router(state: AppState, public_dir: PathBuf) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/players", post(register_player))
        .route("/api/players/:player_id/move", post(submit_move))
        .route("/api/game/start", post(start_round))
        .route("/api/game/reset", post(reset_game))
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}

async fn get_state(AxumState(state): AxumState<AppState>) -> Json<PublicState> {
    let guard = state.game.lock().unwrap_or_else(|e| e.into_inner());
    Json(guard.public_state(now_ms()))
}

async fn register_player(
    AxumState(state): AxumState<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let role = body.role.as_deref().unwrap_or_default().parse::<Role>()?;
    let bot_strategy = match body.bot_strategy.as_deref() {
        Some(raw) if body.is_bot => Some(raw.parse::<BotStrategy>()?),
        _ => None,
    };
    let request = RegisterPlayer {
        name: body.name,
        role,
        is_bot: body.is_bot,
        bot_strategy,
    };
    let player = {
        let mut guard = state.game.lock().unwrap_or_else(|e| e.into_inner());
        guard.register_player(request, now_ms())?
    };
    state.wake.notify_one();
    let message = match player.role {
        Role::Admin => format!("{} is the admin for this game.", player.name),
        Role::Player => format!("Welcome, {}!", player.name),
    };
    Ok((StatusCode::CREATED, Json(json!({ "player": player, "message": message }))))
}

async fn submit_move(
    AxumState(state): AxumState<AppState>,
    Path(player_id): Path<String>,
    Json(body): Json<MoveBody>,
) -> Result<Json<Value>, ApiError> {
    let player = {
        let mut guard = state.game.lock().unwrap_or_else(|e| e.into_inner());
        guard.set_player_move(&player_id, body.selection.as_deref(), body.stage, now_ms())?
    };
    let message = match player.current_move {
        Some(mv) => format!("{} locked in {mv}.", player.name),
        None => format!("{} has no move for stage {}.", player.name, player.layer),
    };
    Ok(Json(json!({ "player": player, "message": message })))
}

async fn start_round(
    AxumState(state): AxumState<AppState>,
    Json(body): Json<StartBody>,
) -> Result<Json<Value>, ApiError> {
    let options = StartRoundOptions {
        admin_id: body.admin_id,
        ..StartRoundOptions::default()
    };
    let payload = {
        let mut guard = state.game.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_ms();
        let start = guard.start_round(options, now)?;
        json!({
            "pending": start.pending,
            "outcome": start.outcome,
            "state": guard.public_state(now),
        })
    };
    state.wake.notify_one();
    Ok(Json(payload))
}

async fn reset_game(AxumState(state): AxumState<AppState>) -> Json<Value> {
    let payload = {
        let mut guard = state.game.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_ms();
        guard.reset_game(now);
        json!({ "message": "Game reset.", "state": guard.public_state(now) })
    };
    state.wake.notify_one();
    Json(payload)
}

// ── Round driver ───────────────────────────────────────────────────────

/// Owns the one pending timer: sleeps until the next phase or automatic
/// round is due, or until an API call changes the schedule.
pub async fn drive_rounds(game: SharedGame, wake: Arc<Notify>) {
    loop {
        let deadline = {
            let mut guard = game.lock().unwrap_or_else(|e| e.into_inner());
            guard.advance(now_ms());
            guard.next_deadline_ms()
        };
        match deadline {
            Some(at) => {
                let wait = Duration::from_millis(at.saturating_sub(now_ms()));
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = wake.notified() => {}
                }
            }
            None => wake.notified().await,
        }
    }
}

pub async fn start_server(config: AppConfig) -> Result<(), String> {
    let game = GameState::new(config.engine.clone(), now_ms())?;
    let state = AppState::new(game);
    tokio::spawn(drive_rounds(state.game.clone(), state.wake.clone()));

    let app = api_router(state, resolve_repo_path(&config.server.public_dir));
    let addr = config.server.listen_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            return Err(format!("bind {addr}: {e}"));
        }
    };
    info!("rps-stages listening at http://{addr}/");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server error: {e}"))
}
