//! Drives AI turn generation.
//!
//! The state machine per attempt is `Starting -> AwaitingGeneration ->
//! {Committing | Failed}`. `Starting` goes through the session's progress
//! guard, so any number of concurrent triggers (a committed turn landing on
//! the AI seat, manual retries, duplicated tabs) collapse into at most one
//! outstanding generation. No session lock is held while the generation
//! service runs; the guard alone owns the logical turn.

use crate::session::{SessionError, SessionId, SessionStore};
use cadavre_ai::{GenerationRequest, TurnGenerator};
use cadavre_engine::errors::GameError;
use std::sync::Arc;
use std::time::Duration;

/// Result of one orchestration attempt, mostly for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiTurnOutcome {
    /// Another caller already owns the in-flight generation.
    AlreadyRunning,
    /// The session vanished or the rotation moved off the AI seat.
    NotApplicable,
    Committed { turn_number: usize },
    Failed { reason: String },
}

/// Cheap to clone: every attempt that moves to a background task carries
/// its own handle.
#[derive(Clone)]
pub struct AiOrchestrator {
    store: Arc<SessionStore>,
    generator: Arc<dyn TurnGenerator>,
    generation_timeout: Duration,
}

impl AiOrchestrator {
    pub fn new(store: Arc<SessionStore>, generator: Arc<dyn TurnGenerator>) -> Self {
        let generation_timeout = store.settings().ai_timeout();
        Self {
            store,
            generator,
            generation_timeout,
        }
    }

    /// Fire-and-forget trigger, used when a committed turn lands on the AI
    /// seat. Runs the whole attempt on a spawned task.
    pub fn trigger(&self, session_id: &SessionId) {
        let orchestrator = self.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.run(session_id.clone()).await;
            tracing::debug!(session_id = %session_id, outcome = ?outcome, "ai turn attempt finished");
        });
    }

    /// Synchronous guard acquisition for the retry endpoint: the caller
    /// learns immediately whether the attempt was accepted, and generation
    /// continues in the background.
    pub fn begin(&self, session_id: &SessionId) -> Result<usize, SessionError> {
        let turn_number = self.store.start_ai_turn(session_id)?;
        let orchestrator = self.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.generate_and_commit(&session_id).await;
            tracing::debug!(session_id = %session_id, outcome = ?outcome, "ai turn attempt finished");
        });
        Ok(turn_number)
    }

    /// One full attempt: acquire the guard, generate, commit or fail.
    pub async fn run(&self, session_id: SessionId) -> AiTurnOutcome {
        match self.store.start_ai_turn(&session_id) {
            Ok(_) => {}
            Err(SessionError::Game(GameError::AiTurnInProgress)) => {
                // Someone else owns the generation; this is the guard doing
                // its job, not an error.
                return AiTurnOutcome::AlreadyRunning;
            }
            Err(err) => {
                tracing::debug!(session_id = %session_id, error = %err, "ai turn not started");
                return AiTurnOutcome::NotApplicable;
            }
        }
        self.generate_and_commit(&session_id).await
    }

    async fn generate_and_commit(&self, session_id: &SessionId) -> AiTurnOutcome {
        let request = match self.build_request(session_id) {
            Ok(request) => request,
            Err(err) => {
                // Session disappeared between guard and snapshot; nothing
                // left to clean up.
                tracing::debug!(session_id = %session_id, error = %err, "session gone before generation");
                return AiTurnOutcome::NotApplicable;
            }
        };
        let turn_number = request.turn_number;

        tracing::info!(
            session_id = %session_id,
            turn_number,
            generator = self.generator.name(),
            "requesting ai turn"
        );

        let generated =
            match tokio::time::timeout(self.generation_timeout, self.generator.generate(request))
                .await
            {
                Ok(Ok(generated)) => generated,
                Ok(Err(err)) => return self.fail(session_id, err.to_string()),
                Err(_) => {
                    return self.fail(
                        session_id,
                        format!(
                            "generation timed out after {}s",
                            self.generation_timeout.as_secs()
                        ),
                    )
                }
            };

        match self.store.commit_ai_turn(
            session_id,
            generated.data,
            generated.interpretation,
            generated.reasoning,
        ) {
            Ok(committed) => {
                if committed.next_seat_is_ai {
                    // Rotation can land on another AI seat; keep going
                    // through the same guarded path.
                    self.trigger(session_id);
                }
                AiTurnOutcome::Committed {
                    turn_number: committed.number,
                }
            }
            Err(err) => self.fail(session_id, format!("commit rejected: {err}")),
        }
    }

    fn build_request(&self, session_id: &SessionId) -> Result<GenerationRequest, SessionError> {
        let snapshot = self.store.snapshot(session_id)?;
        Ok(GenerationRequest {
            session_id: session_id.clone(),
            canvas: snapshot.canvas,
            turn_number: snapshot.turns.len(),
            turns: snapshot.turns,
        })
    }

    fn fail(&self, session_id: &SessionId, reason: String) -> AiTurnOutcome {
        if let Err(err) = self.store.fail_ai_turn(session_id, &reason) {
            tracing::debug!(session_id = %session_id, error = %err, "could not record ai failure");
        }
        AiTurnOutcome::Failed { reason }
    }
}
