use crate::errors::GameError;
use crate::player::PlayerId;
use serde::{Deserialize, Serialize};

/// Upper bound on the serialized size of a turn payload.
pub const MAX_TURN_DATA_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnAuthor {
    User { player_id: PlayerId },
    Ai,
}

/// One committed contribution. Immutable once appended; the engine never
/// edits or removes turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub number: usize,
    pub author: TurnAuthor,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub committed_at: String,
}

impl Turn {
    pub fn by_user(number: usize, player_id: PlayerId, data: serde_json::Value) -> Self {
        Self {
            number,
            author: TurnAuthor::User { player_id },
            data,
            interpretation: None,
            reasoning: None,
            committed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn by_ai(
        number: usize,
        data: serde_json::Value,
        interpretation: Option<String>,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            number,
            author: TurnAuthor::Ai,
            data,
            interpretation,
            reasoning,
            committed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Schema check for the opaque drawing payload. The engine never interprets
/// the fragment beyond this: it must be a JSON object of bounded size.
pub fn validate_turn_data(data: &serde_json::Value) -> Result<(), GameError> {
    let object = data
        .as_object()
        .ok_or_else(|| GameError::InvalidTurnData("payload must be a JSON object".into()))?;
    if object.is_empty() {
        return Err(GameError::InvalidTurnData("payload must not be empty".into()));
    }
    let size = serde_json::to_vec(data)
        .map_err(|err| GameError::InvalidTurnData(err.to_string()))?
        .len();
    if size > MAX_TURN_DATA_BYTES {
        return Err(GameError::InvalidTurnData(format!(
            "payload is {size} bytes, limit is {MAX_TURN_DATA_BYTES}"
        )));
    }
    Ok(())
}
