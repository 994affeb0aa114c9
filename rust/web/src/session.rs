use crate::errors::ErrorSeverity;
use crate::events::{EventBus, GameEvent, GameEventKind};
use crate::settings::EngineSettings;
use cadavre_engine::code::CodeGenerator;
use cadavre_engine::errors::GameError;
use cadavre_engine::game::{
    Canvas, CommittedTurn, GameConfig, GameState, GameType, NewPlayer, SessionStatus,
};
use cadavre_engine::player::Seat;
use cadavre_engine::turn::Turn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

pub type SessionId = String;
pub type ConnectionToken = String;

const CODE_ALLOCATION_ATTEMPTS: usize = 32;

/// One live game session. All mutable state sits behind a single mutex, so
/// every transaction is a per-session single-writer step: lock, validate,
/// mutate, unlock. Events are published only after the lock is released.
#[derive(Debug)]
pub struct GameSession {
    id: SessionId,
    state: Mutex<GameState>,
}

impl GameSession {
    fn new(id: SessionId, config: GameConfig) -> Result<Self, GameError> {
        let state = GameState::new(id.clone(), config)?;
        Ok(Self {
            id,
            state: Mutex::new(state),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

/// Parameters for creating a session. The content site calls this with just
/// a game type; canvas and capacity fall back to engine defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateGameParams {
    pub game_type: Option<GameType>,
    pub canvas: Option<Canvas>,
    pub max_players: Option<usize>,
}

/// Credentials returned by a join. The token is shown once, to its owner;
/// it never appears in snapshots or events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedPlayer {
    pub player_id: String,
    pub player_token: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: String,
    pub name: String,
    pub is_active: bool,
    pub connection_count: usize,
    pub joined_at: String,
}

/// Read-only view of a session, safe to hand to any client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub game_type: GameType,
    pub canvas: Canvas,
    pub status: SessionStatus,
    pub players: Vec<PlayerView>,
    pub player_order: Vec<Seat>,
    pub current_seat_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player_id: Option<String>,
    pub current_seat_is_ai: bool,
    pub ai_turn_in_progress: bool,
    pub turns: Vec<Turn>,
    pub created_at: String,
    pub idle_secs: u64,
}

/// Authoritative store for every live session.
///
/// The outer map lock is held only for handle lookup, insert and removal;
/// per-session work happens under that session's own mutex. The cleanup
/// sweep therefore locks one session at a time and a slow session cannot
/// stall transactions on any other.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<GameSession>>>,
    event_bus: Arc<EventBus>,
    settings: EngineSettings,
    codes: Mutex<CodeGenerator>,
}

impl SessionStore {
    pub fn new(event_bus: Arc<EventBus>, settings: EngineSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            event_bus,
            settings,
            codes: Mutex::new(CodeGenerator::new()),
        }
    }

    /// Deterministic session codes, for tests.
    pub fn with_code_seed(event_bus: Arc<EventBus>, settings: EngineSettings, seed: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            event_bus,
            settings,
            codes: Mutex::new(CodeGenerator::with_seed(seed)),
        }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn create(&self, params: CreateGameParams) -> Result<SessionSnapshot, SessionError> {
        let config = GameConfig {
            game_type: params.game_type.unwrap_or(GameType::Multiplayer),
            canvas: params.canvas.unwrap_or_default(),
            max_players: params
                .max_players
                .unwrap_or(self.settings.default_max_players),
        };
        config.validate()?;

        for _ in 0..CODE_ALLOCATION_ATTEMPTS {
            let code = self
                .codes
                .lock()
                .map_err(|_| SessionError::StoragePoisoned)?
                .next_code();

            let mut guard = self
                .sessions
                .write()
                .map_err(|_| SessionError::StoragePoisoned)?;
            if guard.contains_key(&code) {
                continue;
            }
            let session = Arc::new(GameSession::new(code.clone(), config)?);
            guard.insert(code.clone(), Arc::clone(&session));
            drop(guard);

            tracing::info!(
                session_id = %code,
                game_type = ?config.game_type,
                max_players = config.max_players,
                "created game session"
            );
            return self.snapshot(&code);
        }

        Err(SessionError::StoragePoisoned)
    }

    pub fn join(&self, id: &SessionId, player_name: &str) -> Result<JoinedPlayer, SessionError> {
        let player_id = Uuid::new_v4().to_string();
        let player_token = Uuid::new_v4().to_string();

        let player_count = self.transact(id, |state| {
            state.join(NewPlayer {
                id: player_id.clone(),
                name: player_name.to_string(),
                token: player_token.clone(),
            })?;
            Ok(state.players().len())
        })?;

        tracing::info!(session_id = %id, player_id = %player_id, "player joined");
        self.publish(
            id,
            GameEventKind::PlayerJoined {
                player_id: player_id.clone(),
                name: player_name.trim().to_string(),
                player_count,
            },
        );

        Ok(JoinedPlayer {
            player_id,
            player_token,
            // Liveness starts at zero connections; the streaming gateway
            // flips it on connect.
            is_active: false,
        })
    }

    pub fn leave(
        &self,
        id: &SessionId,
        player_id: &str,
        player_token: &str,
    ) -> Result<(), SessionError> {
        let outcome = self.transact(id, |state| state.leave(player_id, player_token))?;

        tracing::info!(session_id = %id, player_id = %player_id, "player left");
        self.publish(
            id,
            GameEventKind::PlayerLeft {
                player_id: player_id.to_string(),
                player_count: outcome.remaining_players,
            },
        );

        if outcome.now_empty {
            self.reap(id, "empty");
        }
        Ok(())
    }

    pub fn connect(
        &self,
        id: &SessionId,
        player_id: &str,
        player_token: &str,
    ) -> Result<ConnectionToken, SessionError> {
        let connection_token = Uuid::new_v4().to_string();
        let connection_count = self.transact(id, |state| {
            state.connect(player_id, player_token, connection_token.clone())
        })?;

        self.publish(
            id,
            GameEventKind::PlayerConnected {
                player_id: player_id.to_string(),
                connection_count,
            },
        );
        Ok(connection_token)
    }

    /// Liveness decrement. Idempotent end to end: a second call with the
    /// same token, a token for a player who already left, or a session that
    /// was already reaped are all quiet no-ops, because gateway teardown
    /// must never fail.
    pub fn disconnect(
        &self,
        id: &SessionId,
        player_id: &str,
        connection_token: &str,
    ) -> Result<(), SessionError> {
        let session = match self.get_session(id) {
            Ok(session) => session,
            Err(SessionError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let removed = {
            let mut state = session
                .state
                .lock()
                .map_err(|_| SessionError::StoragePoisoned)?;
            state.disconnect(player_id, connection_token)
        };

        if let Some(connection_count) = removed {
            self.publish(
                id,
                GameEventKind::PlayerDisconnected {
                    player_id: player_id.to_string(),
                    connection_count,
                },
            );
        }
        Ok(())
    }

    pub fn submit_turn(
        &self,
        id: &SessionId,
        player_id: &str,
        player_token: &str,
        data: serde_json::Value,
        expected_number: usize,
    ) -> Result<CommittedTurn, SessionError> {
        let committed = self.transact(id, |state| {
            state.add_turn(player_id, player_token, data, expected_number)
        })?;

        tracing::debug!(
            session_id = %id,
            player_id = %player_id,
            turn_number = committed.number,
            "turn committed"
        );
        self.publish(
            id,
            GameEventKind::TurnSubmitted {
                turn_number: committed.number,
                author: committed.author.clone(),
            },
        );
        Ok(committed)
    }

    /// Acquires the AI progress guard; the orchestrator calls this before
    /// touching the generation service. Exactly one concurrent caller wins.
    pub fn start_ai_turn(&self, id: &SessionId) -> Result<usize, SessionError> {
        let ceiling = self.settings.ai_stale_ceiling();
        let turn_number =
            self.transact(id, |state| state.start_ai_turn(Instant::now(), ceiling))?;

        self.publish(id, GameEventKind::AiTurnStarted { turn_number });
        Ok(turn_number)
    }

    pub fn commit_ai_turn(
        &self,
        id: &SessionId,
        data: serde_json::Value,
        interpretation: Option<String>,
        reasoning: Option<String>,
    ) -> Result<CommittedTurn, SessionError> {
        let committed =
            self.transact(id, |state| state.commit_ai_turn(data, interpretation, reasoning))?;

        tracing::debug!(session_id = %id, turn_number = committed.number, "ai turn committed");
        self.publish(
            id,
            GameEventKind::TurnSubmitted {
                turn_number: committed.number,
                author: committed.author.clone(),
            },
        );
        Ok(committed)
    }

    /// Clears the AI progress guard without advancing the rotation. The
    /// session stays retryable.
    pub fn fail_ai_turn(&self, id: &SessionId, reason: &str) -> Result<(), SessionError> {
        self.transact(id, |state| {
            state.fail_ai_turn();
            Ok(())
        })?;

        tracing::warn!(session_id = %id, reason = %reason, "ai turn failed");
        self.publish(
            id,
            GameEventKind::AiTurnFailed {
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    /// Read-only view; not a transaction and does not refresh activity.
    pub fn snapshot(&self, id: &SessionId) -> Result<SessionSnapshot, SessionError> {
        let session = self.get_session(id)?;
        let state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;

        let players = state
            .players()
            .iter()
            .map(|player| PlayerView {
                player_id: player.id().clone(),
                name: player.name().to_string(),
                is_active: player.is_active(),
                connection_count: player.connection_count(),
                joined_at: player.joined_at().to_string(),
            })
            .collect();

        Ok(SessionSnapshot {
            session_id: session.id.clone(),
            game_type: state.game_type(),
            canvas: state.canvas(),
            status: state.status(),
            players,
            player_order: state.seats().to_vec(),
            current_seat_index: state.current_seat_index(),
            current_player_id: state.current_player_id().cloned(),
            current_seat_is_ai: state.current_seat_is_ai(),
            ai_turn_in_progress: state.ai_turn_in_progress(),
            turns: state.turns().to_vec(),
            created_at: state.created_at().to_string(),
            idle_secs: state.idle_for().as_secs(),
        })
    }

    /// Cleanup sweep: reaps every session idle past the TTL with no live
    /// connections. A failure on one session never aborts the scan.
    pub fn sweep(&self) -> usize {
        let ttl = self.settings.session_ttl();
        let candidates: Vec<(SessionId, Arc<GameSession>)> = match self.sessions.read() {
            Ok(guard) => guard
                .iter()
                .map(|(id, session)| (id.clone(), Arc::clone(session)))
                .collect(),
            Err(_) => return 0,
        };

        let mut reaped = 0;
        for (id, session) in candidates {
            let abandoned = match session.state.lock() {
                Ok(mut state) => {
                    if state.is_reapable(ttl) {
                        state.set_abandoned();
                        true
                    } else {
                        false
                    }
                }
                Err(_) => {
                    tracing::error!(session_id = %id, "skipping poisoned session in sweep");
                    false
                }
            };

            if abandoned {
                self.reap(&id, "abandoned");
                reaped += 1;
            }
        }

        if reaped > 0 {
            tracing::info!(reaped, "cleanup sweep reaped idle sessions");
        }
        reaped
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        match self.sessions.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn get_session(&self, id: &SessionId) -> Result<Arc<GameSession>, SessionError> {
        let guard = self
            .sessions
            .read()
            .map_err(|_| SessionError::StoragePoisoned)?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// Runs one verb under the session's mutex. The closure sees the state
    /// exclusively; anything it returns is computed before the lock drops.
    fn transact<T>(
        &self,
        id: &SessionId,
        verb: impl FnOnce(&mut GameState) -> Result<T, GameError>,
    ) -> Result<T, SessionError> {
        let session = self.get_session(id)?;
        let mut state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        verb(&mut state).map_err(SessionError::from)
    }

    fn publish(&self, id: &SessionId, kind: GameEventKind) {
        self.event_bus.broadcast(GameEvent::now(id.clone(), kind));
    }

    fn reap(&self, id: &SessionId, reason: &str) {
        if let Ok(mut guard) = self.sessions.write() {
            guard.remove(id);
        }
        tracing::info!(session_id = %id, reason = %reason, "session removed");
        self.publish(
            id,
            GameEventKind::SessionEnded {
                reason: reason.to_string(),
            },
        );
        self.event_bus.drop_session(id);
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Game session not found: {0}")]
    NotFound(SessionId),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("Session storage poisoned")]
    StoragePoisoned,
}

impl crate::errors::IntoErrorResponse for SessionError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Game(err) => match err {
                GameError::NotYourTurn { .. } => StatusCode::FORBIDDEN,
                GameError::InvalidTurnNumber { .. } => StatusCode::CONFLICT,
                GameError::AiTurnInProgress => StatusCode::CONFLICT,
                GameError::PlayersNotFound => StatusCode::NOT_FOUND,
                GameError::Abandoned => StatusCode::NOT_FOUND,
                GameError::CapacityExceeded { .. }
                | GameError::NotAiTurn
                | GameError::InvalidPlayerName(_)
                | GameError::InvalidTurnData(_)
                | GameError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            },
            SessionError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "game_not_found",
            SessionError::Game(err) => match err {
                GameError::NotYourTurn { .. } => "not_your_turn",
                GameError::InvalidTurnNumber { .. } => "invalid_turn_number",
                GameError::AiTurnInProgress => "ai_turn_in_progress",
                GameError::PlayersNotFound => "players_not_found",
                GameError::Abandoned => "game_not_found",
                GameError::CapacityExceeded { .. } => "capacity_exceeded",
                GameError::NotAiTurn => "not_ai_turn",
                GameError::InvalidPlayerName(_) => "invalid_player_name",
                GameError::InvalidTurnData(_) => "invalid_turn_data",
                GameError::InvalidConfig(_) => "invalid_config",
            },
            SessionError::StoragePoisoned => "session_storage_error",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            SessionError::NotFound(id) => Some(serde_json::json!({ "session_id": id })),
            SessionError::Game(GameError::InvalidTurnNumber { expected, got }) => {
                Some(serde_json::json!({ "expected": expected, "got": got }))
            }
            SessionError::Game(GameError::CapacityExceeded { max }) => {
                Some(serde_json::json!({ "max_players": max }))
            }
            _ => None,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            SessionError::StoragePoisoned => ErrorSeverity::Critical,
            _ => ErrorSeverity::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GameEventKind;
    use serde_json::json;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    fn store() -> SessionStore {
        SessionStore::with_code_seed(Arc::new(EventBus::new()), EngineSettings::default(), 7)
    }

    fn fragment() -> serde_json::Value {
        json!({"points": [[1, 2], [3, 4]]})
    }

    fn create_multiplayer(store: &SessionStore) -> SessionId {
        store
            .create(CreateGameParams {
                game_type: Some(GameType::Multiplayer),
                ..CreateGameParams::default()
            })
            .expect("create session")
            .session_id
    }

    #[test]
    fn create_join_and_submit_publishes_events() {
        let store = store();
        let id = create_multiplayer(&store);
        let mut sub = store.event_bus().subscribe(id.clone());

        let alice = store.join(&id, "alice").expect("join");
        assert!(!alice.is_active);
        let bob = store.join(&id, "bob").expect("join");

        store
            .submit_turn(&id, &alice.player_id, &alice.player_token, fragment(), 0)
            .expect("submit turn");

        let kinds: Vec<GameEventKind> = std::iter::from_fn(|| sub.try_recv().map(|e| e.kind)).collect();
        assert!(matches!(kinds[0], GameEventKind::PlayerJoined { .. }));
        assert!(matches!(kinds[1], GameEventKind::PlayerJoined { .. }));
        assert!(
            matches!(&kinds[2], GameEventKind::TurnSubmitted { turn_number: 0, .. }),
            "unexpected event {:?}",
            kinds[2]
        );

        let snapshot = store.snapshot(&id).expect("snapshot");
        assert_eq!(snapshot.turns.len(), 1);
        assert_eq!(snapshot.current_player_id.as_deref(), Some(bob.player_id.as_str()));
    }

    #[test]
    fn rejected_transactions_publish_nothing() {
        let store = store();
        let id = create_multiplayer(&store);
        let alice = store.join(&id, "alice").unwrap();
        let bob = store.join(&id, "bob").unwrap();
        let mut sub = store.event_bus().subscribe(id.clone());

        let err = store
            .submit_turn(&id, &bob.player_id, &bob.player_token, fragment(), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Game(GameError::NotYourTurn { .. })
        ));
        assert!(sub.try_recv().is_none());

        // The failed submission left the state untouched.
        let snapshot = store.snapshot(&id).unwrap();
        assert!(snapshot.turns.is_empty());
        assert_eq!(
            snapshot.current_player_id.as_deref(),
            Some(alice.player_id.as_str())
        );
    }

    #[test]
    fn unknown_session_is_not_found() {
        let store = store();
        assert!(matches!(
            store.join(&"ZZZZZ".to_string(), "ghost"),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn leaving_last_player_removes_the_session() {
        let store = store();
        let id = create_multiplayer(&store);
        let alice = store.join(&id, "alice").unwrap();
        let mut sub = store.event_bus().subscribe(id.clone());

        store
            .leave(&id, &alice.player_id, &alice.player_token)
            .unwrap();

        assert!(matches!(
            store.snapshot(&id),
            Err(SessionError::NotFound(_))
        ));
        let kinds: Vec<GameEventKind> = std::iter::from_fn(|| sub.try_recv().map(|e| e.kind)).collect();
        assert!(kinds.iter().any(|k| matches!(k, GameEventKind::SessionEnded { reason } if reason == "empty")));
    }

    #[test]
    fn disconnect_is_idempotent_even_after_reap() {
        let store = store();
        let id = create_multiplayer(&store);
        let alice = store.join(&id, "alice").unwrap();
        let token = store
            .connect(&id, &alice.player_id, &alice.player_token)
            .unwrap();

        store.disconnect(&id, &alice.player_id, &token).unwrap();
        store.disconnect(&id, &alice.player_id, &token).unwrap();

        store
            .leave(&id, &alice.player_id, &alice.player_token)
            .unwrap();
        // Session is gone; teardown still succeeds.
        store.disconnect(&id, &alice.player_id, &token).unwrap();
    }

    #[test]
    fn sweep_reaps_only_idle_disconnected_sessions() {
        let settings = EngineSettings {
            session_ttl_secs: 1,
            ..EngineSettings::default()
        };
        let store = SessionStore::with_code_seed(Arc::new(EventBus::new()), settings, 7);

        let idle = create_multiplayer(&store);
        let watched = create_multiplayer(&store);
        let watcher = store.join(&watched, "watcher").unwrap();
        store
            .connect(&watched, &watcher.player_id, &watcher.player_token)
            .unwrap();

        thread::sleep(Duration::from_millis(1100));
        let reaped = store.sweep();

        assert_eq!(reaped, 1);
        assert!(matches!(store.snapshot(&idle), Err(SessionError::NotFound(_))));
        // A session with a live connection survives any amount of idleness.
        assert!(store.snapshot(&watched).is_ok());
    }

    #[test]
    fn concurrent_creation_yields_unique_codes() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                (0..16)
                    .map(|_| create_multiplayer(&store))
                    .collect::<Vec<_>>()
            }));
        }

        let mut unique = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("join thread") {
                assert!(unique.insert(id));
            }
        }
        assert_eq!(store.active_sessions().len(), unique.len());
    }
}
