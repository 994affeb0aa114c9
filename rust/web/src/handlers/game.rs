use crate::errors::IntoErrorResponse;
use crate::orchestrator::AiOrchestrator;
use crate::session::{CreateGameParams, SessionId, SessionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub player_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub player_id: String,
    pub player_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTurnRequest {
    pub player_id: String,
    pub player_token: String,
    /// Optimistic ordering check: must equal the number of committed turns.
    pub turn_number: usize,
    pub turn_data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct TurnAcceptedResponse {
    pub success: bool,
    pub turn_number: usize,
}

#[derive(Debug, Serialize)]
pub struct RetryAcceptedResponse {
    pub success: bool,
    pub turn_number: usize,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub cleaned_count: usize,
}

/// Creates a game session.
///
/// `POST /api/games` with an optional `game_type` (`ai` or `multiplayer`,
/// default multiplayer), `canvas`, and `max_players`. Returns 201 with the
/// initial snapshot. The content site calls this when a visitor starts a
/// game; players join afterwards with the returned `session_id`.
pub async fn create_game(store: Arc<SessionStore>, params: CreateGameParams) -> Response {
    match store.create(params) {
        Ok(snapshot) => reply::with_status(reply::json(&snapshot), StatusCode::CREATED).into_response(),
        Err(err) => err.into_http_response(),
    }
}

/// Returns the current session snapshot. Read-only: no state transition and
/// no activity refresh, so polling does not keep an abandoned game alive.
pub async fn get_game(store: Arc<SessionStore>, session_id: SessionId) -> Response {
    match store.snapshot(&session_id) {
        Ok(snapshot) => reply::json(&snapshot).into_response(),
        Err(err) => err.into_http_response(),
    }
}

/// Adds a player to a session.
///
/// `POST /api/games/{id}/join` with `{player_name}`. Returns the player's
/// id and secret token; the token authorizes every later request for that
/// player and is never shown to anyone else. 404 when the session is
/// missing, 400 when the session is full.
pub async fn join_game(
    store: Arc<SessionStore>,
    session_id: SessionId,
    request: JoinRequest,
) -> Response {
    match store.join(&session_id, &request.player_name) {
        Ok(joined) => reply::json(&joined).into_response(),
        Err(err) => err.into_http_response(),
    }
}

/// Removes a player from a session. This is the only membership-removal
/// path; closing a tab merely drops liveness. Clients send this from a page
/// unload beacon.
pub async fn leave_game(
    store: Arc<SessionStore>,
    session_id: SessionId,
    request: LeaveRequest,
) -> Response {
    match store.leave(&session_id, &request.player_id, &request.player_token) {
        Ok(()) => reply::json(&SuccessResponse { success: true }).into_response(),
        Err(err) => err.into_http_response(),
    }
}

/// Submits a drawing turn.
///
/// `POST /api/games/{id}/turns`. 403 `not_your_turn` for a non-current
/// player, 409 `invalid_turn_number` for a stale or duplicate submission.
/// When the committed turn hands the rotation to the AI seat, generation is
/// triggered as a side effect and its progress arrives on the event stream.
pub async fn submit_turn(
    store: Arc<SessionStore>,
    orchestrator: Arc<AiOrchestrator>,
    session_id: SessionId,
    request: SubmitTurnRequest,
) -> Response {
    match store.submit_turn(
        &session_id,
        &request.player_id,
        &request.player_token,
        request.turn_data,
        request.turn_number,
    ) {
        Ok(committed) => {
            if committed.next_seat_is_ai {
                orchestrator.trigger(&session_id);
            }
            reply::with_status(
                reply::json(&TurnAcceptedResponse {
                    success: true,
                    turn_number: committed.number,
                }),
                StatusCode::ACCEPTED,
            )
            .into_response()
        }
        Err(err) => err.into_http_response(),
    }
}

/// Manually re-triggers AI generation after a failure.
///
/// `GET /api/games/{id}/retry-ai`. Goes through the same progress guard as
/// every other trigger: 409 when a generation is already in flight, 400
/// when the game has no AI or the rotation is not on the AI seat.
pub async fn retry_ai_turn(orchestrator: Arc<AiOrchestrator>, session_id: SessionId) -> Response {
    match orchestrator.begin(&session_id) {
        Ok(turn_number) => reply::with_status(
            reply::json(&RetryAcceptedResponse {
                success: true,
                turn_number,
            }),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(err) => err.into_http_response(),
    }
}

/// Operational sweep endpoint: reaps idle, unwatched sessions and reports
/// how many were removed.
pub async fn cleanup(store: Arc<SessionStore>) -> Response {
    let cleaned_count = store.sweep();
    reply::json(&CleanupResponse { cleaned_count }).into_response()
}
