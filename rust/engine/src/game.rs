use crate::errors::GameError;
use crate::player::{normalize_name, Player, PlayerId, Seat};
use crate::rotation;
use crate::turn::{validate_turn_data, Turn, TurnAuthor};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const MIN_PLAYER_CAP: usize = 2;
pub const MAX_PLAYER_CAP: usize = 6;
pub const DEFAULT_PLAYER_CAP: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// One or more humans alternating with an AI agent.
    Ai,
    /// Humans only.
    Multiplayer,
}

/// Drawing surface dimensions, handed to the AI generator unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_type: GameType,
    pub canvas: Canvas,
    pub max_players: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_type: GameType::Multiplayer,
            canvas: Canvas::default(),
            max_players: DEFAULT_PLAYER_CAP,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), GameError> {
        if self.max_players < MIN_PLAYER_CAP || self.max_players > MAX_PLAYER_CAP {
            return Err(GameError::InvalidConfig(format!(
                "max_players must be between {MIN_PLAYER_CAP} and {MAX_PLAYER_CAP}"
            )));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(GameError::InvalidConfig(
                "canvas dimensions must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Identity material for a joining player, allocated by the caller.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub id: PlayerId,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub remaining_players: usize,
    pub now_empty: bool,
}

/// Summary of a committed turn, returned by the mutating verbs so callers
/// can publish events and trigger AI generation without re-reading state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTurn {
    pub number: usize,
    pub author: TurnAuthor,
    pub next_seat_is_ai: bool,
}

/// Authoritative state of one game session.
///
/// Every method is a complete validate-then-mutate step: preconditions are
/// checked first and the state is only touched once all of them hold, so a
/// caller serializing access (one lock per session) gets atomic transactions
/// for free. No method partially applies.
#[derive(Debug)]
pub struct GameState {
    code: String,
    config: GameConfig,
    players: Vec<Player>,
    seats: Vec<Seat>,
    current_seat: usize,
    turns: Vec<Turn>,
    ai_turn_started: Option<Instant>,
    status: SessionStatus,
    created_at: String,
    last_activity: Instant,
}

impl GameState {
    pub fn new(code: String, config: GameConfig) -> Result<Self, GameError> {
        config.validate()?;
        Ok(Self {
            code,
            config,
            players: Vec::new(),
            seats: Vec::new(),
            current_seat: 0,
            turns: Vec::new(),
            ai_turn_started: None,
            status: SessionStatus::Active,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_activity: Instant::now(),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn game_type(&self) -> GameType {
        self.config.game_type
    }

    pub fn canvas(&self) -> Canvas {
        self.config.canvas
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn current_seat_index(&self) -> usize {
        self.current_seat
    }

    pub fn current_seat(&self) -> Option<&Seat> {
        self.seats.get(self.current_seat)
    }

    pub fn current_player_id(&self) -> Option<&PlayerId> {
        self.current_seat().and_then(Seat::player_id)
    }

    pub fn current_seat_is_ai(&self) -> bool {
        self.current_seat().map(Seat::is_ai).unwrap_or(false)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn ai_turn_in_progress(&self) -> bool {
        self.ai_turn_started.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn total_connections(&self) -> usize {
        self.players.iter().map(Player::connection_count).sum()
    }

    pub fn join(&mut self, new_player: NewPlayer) -> Result<&Player, GameError> {
        self.ensure_active()?;
        let name = normalize_name(&new_player.name)?;
        if self.players.len() >= self.config.max_players {
            return Err(GameError::CapacityExceeded {
                max: self.config.max_players,
            });
        }

        let player = Player::new(new_player.id.clone(), name, new_player.token);
        self.players.push(player);
        self.seats.push(Seat::Human {
            player_id: new_player.id,
        });
        // In hybrid games the AI takes the seat right after each player,
        // so AI turns alternate with that player's.
        if self.config.game_type == GameType::Ai {
            self.seats.push(Seat::Ai);
        }
        self.touch();
        Ok(self.players.last().expect("player just pushed"))
    }

    pub fn leave(&mut self, player_id: &str, token: &str) -> Result<LeaveOutcome, GameError> {
        self.ensure_active()?;
        let idx = self.authed_player_index(player_id, token)?;
        self.players.remove(idx);

        if let Some(pos) = self
            .seats
            .iter()
            .position(|seat| seat.player_id().map(String::as_str) == Some(player_id))
        {
            self.remove_seat(pos);
            // The paired AI seat sits directly after the player it follows.
            if self.config.game_type == GameType::Ai
                && self.seats.get(pos).map(Seat::is_ai).unwrap_or(false)
            {
                self.remove_seat(pos);
            }
        }

        self.touch();
        Ok(LeaveOutcome {
            remaining_players: self.players.len(),
            now_empty: self.players.is_empty(),
        })
    }

    pub fn connect(
        &mut self,
        player_id: &str,
        token: &str,
        connection_token: String,
    ) -> Result<usize, GameError> {
        self.ensure_active()?;
        let idx = self.authed_player_index(player_id, token)?;
        self.players[idx].add_connection(connection_token);
        self.touch();
        Ok(self.players[idx].connection_count())
    }

    /// Removes one live connection. Idempotent: an unknown connection token,
    /// or a player that already left, is a no-op rather than an error.
    pub fn disconnect(&mut self, player_id: &str, connection_token: &str) -> Option<usize> {
        let player = self.players.iter_mut().find(|p| p.id() == player_id)?;
        if !player.remove_connection(connection_token) {
            return None;
        }
        let remaining = player.connection_count();
        self.touch();
        Some(remaining)
    }

    pub fn add_turn(
        &mut self,
        player_id: &str,
        token: &str,
        data: serde_json::Value,
        expected_number: usize,
    ) -> Result<CommittedTurn, GameError> {
        self.ensure_active()?;
        self.authed_player_index(player_id, token)?;
        // Stale turn numbers are reported as such even when the rotation has
        // already moved on, so a retried submit sees "duplicate", not
        // "not your turn".
        rotation::validate_turn_number(self.turns.len(), expected_number)?;
        let id = player_id.to_string();
        if !rotation::is_players_turn(&self.seats, self.current_seat, &id) {
            return Err(GameError::NotYourTurn { player_id: id });
        }
        validate_turn_data(&data)?;

        let turn = Turn::by_user(self.turns.len(), id, data);
        let author = turn.author.clone();
        let number = turn.number;
        self.turns.push(turn);
        self.current_seat = rotation::next_seat_index(self.seats.len(), self.current_seat);
        self.touch();
        Ok(CommittedTurn {
            number,
            author,
            next_seat_is_ai: self.current_seat_is_ai(),
        })
    }

    /// Acquires the AI progress guard. At most one caller wins; the rest see
    /// `AiTurnInProgress`. A guard older than `stale_after` is treated as a
    /// failed generation and taken over, so a crashed worker cannot wedge
    /// the session forever.
    pub fn start_ai_turn(
        &mut self,
        now: Instant,
        stale_after: Duration,
    ) -> Result<usize, GameError> {
        self.ensure_active()?;
        if self.config.game_type != GameType::Ai || !self.current_seat_is_ai() {
            return Err(GameError::NotAiTurn);
        }
        if let Some(started) = self.ai_turn_started {
            if now.saturating_duration_since(started) < stale_after {
                return Err(GameError::AiTurnInProgress);
            }
        }
        self.ai_turn_started = Some(now);
        self.touch();
        Ok(self.turns.len())
    }

    pub fn commit_ai_turn(
        &mut self,
        data: serde_json::Value,
        interpretation: Option<String>,
        reasoning: Option<String>,
    ) -> Result<CommittedTurn, GameError> {
        self.ensure_active()?;
        // Players may have left while the generation ran; only commit if the
        // rotation still points at the AI.
        if !self.current_seat_is_ai() {
            return Err(GameError::NotAiTurn);
        }
        validate_turn_data(&data)?;

        let turn = Turn::by_ai(self.turns.len(), data, interpretation, reasoning);
        let number = turn.number;
        self.turns.push(turn);
        self.current_seat = rotation::next_seat_index(self.seats.len(), self.current_seat);
        self.ai_turn_started = None;
        self.touch();
        Ok(CommittedTurn {
            number,
            author: TurnAuthor::Ai,
            next_seat_is_ai: self.current_seat_is_ai(),
        })
    }

    /// Clears the AI progress guard without advancing the rotation, leaving
    /// the session retryable.
    pub fn fail_ai_turn(&mut self) {
        self.ai_turn_started = None;
        self.touch();
    }

    /// A session is reapable when it has been idle past the TTL and nobody
    /// is connected. Never true while any player holds a live connection.
    pub fn is_reapable(&self, ttl: Duration) -> bool {
        self.total_connections() == 0 && self.idle_for() >= ttl
    }

    pub fn set_abandoned(&mut self) {
        self.status = SessionStatus::Abandoned;
    }

    fn ensure_active(&self) -> Result<(), GameError> {
        match self.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Abandoned => Err(GameError::Abandoned),
        }
    }

    fn authed_player_index(&self, player_id: &str, token: &str) -> Result<usize, GameError> {
        self.players
            .iter()
            .position(|p| p.id() == player_id && p.token_matches(token))
            .ok_or(GameError::PlayersNotFound)
    }

    fn remove_seat(&mut self, pos: usize) {
        let len_before = self.seats.len();
        self.seats.remove(pos);
        self.current_seat = rotation::seat_index_after_removal(len_before, pos, self.current_seat);
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

#[cfg(test)]
impl GameState {
    pub fn force_last_activity(&mut self, instant: Instant) {
        self.last_activity = instant;
    }
}
