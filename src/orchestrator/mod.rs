//! Per-recording turn pipeline: transcribe, read the emotion, reply, narrate, persist.

mod engine;
mod strategy;

pub mod config;
pub mod error;
pub mod history;
pub mod types;

pub use config::{EmotionStrategy, TurnConfig};
pub use engine::TurnOrchestrator;
pub use error::TurnError;
pub use types::{CompletedTurn, ResponseMode, TurnOutcome, TurnRequest};

#[cfg(test)]
mod tests;
