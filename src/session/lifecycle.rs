//! Turn lifecycle broadcasts and user-facing notices.

use std::time::SystemTime;

use serde::Serialize;

use super::turn::TurnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnLifecyclePhase {
    Idle,
    Processing,
    Completed,
    Silent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TurnLifecycleUpdate {
    pub owner: String,
    pub turn_id: Option<TurnId>,
    pub phase: TurnLifecyclePhase,
    pub issued_at: SystemTime,
    pub error: Option<String>,
}

impl TurnLifecycleUpdate {
    pub fn new<S: Into<String>>(owner: S, turn_id: Option<TurnId>, phase: TurnLifecyclePhase) -> Self {
        Self {
            owner: owner.into(),
            turn_id,
            phase,
            issued_at: SystemTime::now(),
            error: None,
        }
    }

    pub fn processing<S: Into<String>>(owner: S, placeholder_id: TurnId) -> Self {
        Self::new(owner, Some(placeholder_id), TurnLifecyclePhase::Processing)
    }

    pub fn completed<S: Into<String>>(owner: S, turn_id: TurnId) -> Self {
        Self::new(owner, Some(turn_id), TurnLifecyclePhase::Completed)
    }

    pub fn silent<S: Into<String>>(owner: S, placeholder_id: TurnId) -> Self {
        Self::new(owner, Some(placeholder_id), TurnLifecyclePhase::Silent)
    }

    pub fn failed<S: Into<String>>(
        owner: S,
        placeholder_id: Option<TurnId>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(owner, placeholder_id, TurnLifecyclePhase::Failed)
        }
    }

    pub fn idle<S: Into<String>>(owner: S) -> Self {
        Self::new(owner, None, TurnLifecyclePhase::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// Toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionNotice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl SessionNotice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn silent_turn() -> Self {
        Self::new(
            NoticeLevel::Info,
            "I didn't hear anything, beta.",
            "Please try speaking a little louder.",
        )
    }

    pub fn turn_failed() -> Self {
        Self::new(
            NoticeLevel::Error,
            "Something went wrong",
            "I couldn't process that recording. Please try again.",
        )
    }

    pub fn busy() -> Self {
        Self::new(
            NoticeLevel::Warn,
            "Still thinking",
            "Please wait for the current reply before recording again.",
        )
    }

    pub fn missing_identity() -> Self {
        Self::new(
            NoticeLevel::Error,
            "Not signed in",
            "This device has no journal identity yet.",
        )
    }

    pub fn narration_failed() -> Self {
        Self::new(
            NoticeLevel::Warn,
            "Voice Generation Failed",
            "Could not generate audio for the response. Showing text instead.",
        )
    }

    pub fn connection_error() -> Self {
        Self::new(
            NoticeLevel::Error,
            "Connection Error",
            "Could not load your journal entries.",
        )
    }

    pub fn summary_failed() -> Self {
        Self::new(
            NoticeLevel::Error,
            "Summary Failed",
            "Could not summarize the conversation. Please try again.",
        )
    }
}
