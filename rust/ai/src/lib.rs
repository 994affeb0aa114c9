//! # cadavre-ai: AI Turn Generation for Exquisite Corpse
//!
//! Defines the collaborator surface the session engine calls when the
//! rotation reaches an AI seat, plus a baseline generator used as the
//! black-box stand-in for the real model service.
//!
//! ## Core Components
//!
//! - [`TurnGenerator`] - Async trait for producing the next drawing fragment
//! - [`scribble`] - Baseline generator drawing random polylines
//! - [`create_generator`] - Factory function for generators by name
//!
//! The generation call is the one long-latency operation in the system: it
//! may take seconds and may fail or time out, which is why it is async and
//! why callers guard it with the session's progress flag rather than a lock.

use cadavre_engine::game::Canvas;
use cadavre_engine::turn::Turn;
use std::sync::Arc;
use thiserror::Error;

pub mod scribble;

pub use scribble::ScribbleGenerator;

/// Everything the generator gets to see: the full committed history and the
/// canvas it must stay inside.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub session_id: String,
    pub canvas: Canvas,
    pub turns: Vec<Turn>,
    pub turn_number: usize,
}

/// A generated contribution, ready to be committed with author `ai`.
#[derive(Debug, Clone)]
pub struct GeneratedTurn {
    pub data: serde_json::Value,
    pub interpretation: Option<String>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service failed: {0}")]
    ServiceFailure(String),
    #[error("generation produced invalid turn data: {0}")]
    InvalidOutput(String),
}

/// Interface for AI turn generation.
///
/// Implementations must be safe to share behind an `Arc` across request
/// handlers and spawned tasks. The engine treats the output as an opaque
/// drawing fragment; it is validated but never interpreted.
#[async_trait::async_trait]
pub trait TurnGenerator: Send + Sync {
    /// Produce the next drawing fragment for the session described by
    /// `request`. May take seconds; callers are expected to apply their own
    /// timeout.
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedTurn, GenerationError>;

    /// Identifier of this generator implementation.
    fn name(&self) -> &str;
}

/// Factory for generators by name. Unknown names fall back to the scribble
/// baseline rather than panicking, mirroring how unknown strategies degrade
/// elsewhere in the stack.
pub fn create_generator(name: &str) -> Arc<dyn TurnGenerator> {
    match name {
        "scribble" | "" => Arc::new(ScribbleGenerator::new()),
        _ => Arc::new(ScribbleGenerator::new()),
    }
}
