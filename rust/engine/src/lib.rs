//! # cadavre-engine: Exquisite Corpse Session Core
//!
//! Pure state machine for a turn-based collaborative drawing game. Holds
//! authoritative session state (players, seat rotation, committed turns, the
//! AI progress guard) and validates every mutation, leaving concurrency,
//! transport and AI generation to the crates above it.
//!
//! ## Core Modules
//!
//! - [`game`] - Session state and one validate-then-mutate method per verb
//! - [`rotation`] - Pure seat-rotation and turn-ordering functions
//! - [`player`] - Player records, seats, liveness tracking
//! - [`turn`] - Committed turns and opaque payload validation
//! - [`code`] - Short shareable session-code generation
//! - [`errors`] - Typed failures for every rejected transaction
//!
//! ## Quick Start
//!
//! ```rust
//! use cadavre_engine::game::{GameConfig, GameState, NewPlayer};
//! use serde_json::json;
//!
//! let mut state = GameState::new("QF3ZM".into(), GameConfig::default()).unwrap();
//! state
//!     .join(NewPlayer {
//!         id: "p1".into(),
//!         name: "Maud".into(),
//!         token: "secret".into(),
//!     })
//!     .unwrap();
//!
//! let committed = state
//!     .add_turn("p1", "secret", json!({"points": [[0, 0], [4, 9]]}), 0)
//!     .unwrap();
//! assert_eq!(committed.number, 0);
//! ```
//!
//! Every method checks its preconditions before touching state, so a caller
//! that serializes access per session gets the atomic-transaction guarantee
//! the game depends on: no duplicate turns, no skipped turns, at most one
//! outstanding AI generation.

pub mod code;
pub mod errors;
pub mod game;
pub mod player;
pub mod rotation;
pub mod turn;

pub use code::{CodeGenerator, CODE_ALPHABET, CODE_LEN};
pub use errors::GameError;
pub use game::{
    Canvas, CommittedTurn, GameConfig, GameState, GameType, LeaveOutcome, NewPlayer,
    SessionStatus, DEFAULT_PLAYER_CAP, MAX_PLAYER_CAP, MIN_PLAYER_CAP,
};
pub use player::{normalize_name, Player, PlayerId, Seat, MAX_NAME_LEN};
pub use turn::{validate_turn_data, Turn, TurnAuthor, MAX_TURN_DATA_BYTES};
