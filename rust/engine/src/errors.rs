use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("It's not player {player_id}'s turn")]
    NotYourTurn { player_id: String },
    #[error("Invalid turn number: expected {expected}, got {got}")]
    InvalidTurnNumber { expected: usize, got: usize },
    #[error("Session is full ({max} players)")]
    CapacityExceeded { max: usize },
    #[error("Player not found or token mismatch")]
    PlayersNotFound,
    #[error("An AI turn is already in progress")]
    AiTurnInProgress,
    #[error("Current turn does not belong to the AI")]
    NotAiTurn,
    #[error("Session has been abandoned")]
    Abandoned,
    #[error("Invalid player name: {0}")]
    InvalidPlayerName(String),
    #[error("Invalid turn data: {0}")]
    InvalidTurnData(String),
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),
}
