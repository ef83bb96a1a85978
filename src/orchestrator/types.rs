use serde::{Deserialize, Serialize};

use super::error::TurnError;
use crate::audio::AudioPayload;
use crate::collaborators::HistoryEntry;
use crate::session::Turn;

/// Whether the reply is also narrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Voice,
    Text,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Voice => "voice",
            ResponseMode::Text => "text",
        }
    }

    /// Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "voice" => Some(ResponseMode::Voice),
            "text" => Some(ResponseMode::Text),
            _ => None,
        }
    }

    pub fn wants_narration(&self) -> bool {
        matches!(self, ResponseMode::Voice)
    }
}

/// Input of one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub owner_id: String,
    pub audio: Option<AudioPayload>,
    pub language: String,
    pub response_mode: ResponseMode,
    /// Prior turns, oldest first.
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone)]
pub struct CompletedTurn {
    /// Carries a client-local id and timestamp for immediate display.
    pub turn: Turn,
    /// Set when narration was requested but failed.
    pub narration_error: Option<TurnError>,
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed(CompletedTurn),
    /// No speech was detected; nothing was persisted.
    Silent,
}

impl TurnOutcome {
    pub fn is_silent(&self) -> bool {
        matches!(self, TurnOutcome::Silent)
    }

    pub fn completed(&self) -> Option<&CompletedTurn> {
        match self {
            TurnOutcome::Completed(turn) => Some(turn),
            TurnOutcome::Silent => None,
        }
    }
}
