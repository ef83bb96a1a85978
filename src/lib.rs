//! InnerSight Core Library
//!
//! Recording, turn orchestration over hosted AI collaborators, conversation
//! reconciliation and journal history for the InnerSight voice journal.

pub mod audio;
pub mod collaborators;
pub mod dirs_compat;
pub mod orchestrator;
pub mod persistence;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use audio::{AudioPayload, Recorder, RecorderConfig};
pub use collaborators::{Emotion, HistoryEntry, Role};
pub use orchestrator::{
    CompletedTurn, EmotionStrategy, ResponseMode, TurnConfig, TurnError, TurnOrchestrator,
    TurnOutcome, TurnRequest,
};
pub use persistence::{MemoryStore, SessionStore, Snapshot, Subscription};
pub use session::{ClientSettings, ConversationView, JournalSession, Summarizer, Turn, TurnId};
