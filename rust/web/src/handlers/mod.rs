pub mod game;
pub mod health;
pub mod sse;

pub use game::{
    cleanup, create_game, get_game, join_game, leave_game, retry_ai_turn, submit_turn,
    CleanupResponse, JoinRequest, LeaveRequest, RetryAcceptedResponse, SubmitTurnRequest,
    SuccessResponse, TurnAcceptedResponse,
};
pub use health::health;
pub use sse::{stream_events, StreamQuery};
