use crate::errors::GameError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type PlayerId = String;

/// Maximum accepted length of a display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// One slot in the turn rotation. AI seats have no backing player record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Seat {
    Human { player_id: PlayerId },
    Ai,
}

impl Seat {
    pub fn is_ai(&self) -> bool {
        matches!(self, Seat::Ai)
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        match self {
            Seat::Human { player_id } => Some(player_id),
            Seat::Ai => None,
        }
    }
}

/// A participant in a game session.
///
/// The token authorizes leave/connect/turn submission for this player and is
/// never serialized; snapshots expose only the public fields via views built
/// by the caller.
#[derive(Debug, Clone)]
pub struct Player {
    id: PlayerId,
    name: String,
    token: String,
    joined_at: String,
    connections: HashSet<String>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, token: String) -> Self {
        Self {
            id,
            name,
            token,
            joined_at: chrono::Utc::now().to_rfc3339(),
            connections: HashSet::new(),
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joined_at(&self) -> &str {
        &self.joined_at
    }

    pub fn token_matches(&self, token: &str) -> bool {
        self.token == token
    }

    /// Liveness is derived from open streaming connections, never stored.
    pub fn is_active(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn add_connection(&mut self, connection_token: String) {
        self.connections.insert(connection_token);
    }

    /// Returns true if the token was present. Repeated removal of the same
    /// token is a no-op, which makes disconnect idempotent.
    pub(crate) fn remove_connection(&mut self, connection_token: &str) -> bool {
        self.connections.remove(connection_token)
    }
}

/// Validate and normalize a client-supplied display name.
pub fn normalize_name(raw: &str) -> Result<String, GameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GameError::InvalidPlayerName("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(GameError::InvalidPlayerName(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}
