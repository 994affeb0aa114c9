//! Web layer of the Exquisite Corpse session engine.
//!
//! Wires the pure game state from `cadavre-engine` into a running service:
//! a session store with atomic per-session transactions, a per-session
//! event bus, the AI turn orchestrator, an SSE streaming gateway and the
//! HTTP surface the drawing clients talk to.

pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod settings;

pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use events::{EventBus, EventSubscription, GameEvent, GameEventKind};
pub use logging::{init_logging, init_test_logging, LogEntry, TestLogSubscriber};
pub use orchestrator::{AiOrchestrator, AiTurnOutcome};
pub use server::{AppContext, ServerConfig, ServerError, ServerHandle, WebServer};
pub use session::{
    ConnectionToken, CreateGameParams, GameSession, JoinedPlayer, PlayerView, SessionError,
    SessionId, SessionSnapshot, SessionStore,
};
pub use settings::{EngineSettings, SettingsError};
