use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::collaborators::Emotion;
use crate::persistence::StoredTurn;

/// Shown in the user bubble while a recording is being processed.
pub const PLACEHOLDER_TEXT: &str = "...";

const LOCAL_ID_PREFIX: &str = "local-";
const LOCAL_ID_LEN: usize = 12;

/// Identity of a turn as displayed. Local ids are never written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TurnId {
    Local(String),
    Stored(String),
}

impl TurnId {
    pub fn local() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(LOCAL_ID_LEN)
            .map(char::from)
            .collect();
        TurnId::Local(format!("{LOCAL_ID_PREFIX}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        match self {
            TurnId::Local(id) | TurnId::Stored(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, TurnId::Local(_))
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: TurnId,
    pub owner: String,
    pub created_at_ms: i64,
    pub user_text: String,
    pub emotion: Emotion,
    pub reply_text: String,
    #[serde(default)]
    pub reply_audio_ref: Option<String>,
}

impl Turn {
    /// Optimistic entry inserted before the pipeline runs.
    pub fn placeholder<S: Into<String>>(owner: S, created_at_ms: i64) -> Self {
        Self {
            id: TurnId::local(),
            owner: owner.into(),
            created_at_ms,
            user_text: PLACEHOLDER_TEXT.to_string(),
            emotion: Emotion::Pending,
            reply_text: String::new(),
            reply_audio_ref: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.emotion.is_pending()
    }

    pub fn has_audio(&self) -> bool {
        self.reply_audio_ref
            .as_deref()
            .map(|reference| !reference.is_empty())
            .unwrap_or(false)
    }
}

impl From<StoredTurn> for Turn {
    fn from(stored: StoredTurn) -> Self {
        Self {
            id: TurnId::Stored(stored.id),
            owner: stored.owner,
            created_at_ms: stored.created_at_ms,
            user_text: stored.transcript,
            emotion: stored.emotion,
            reply_text: stored.reply_text,
            reply_audio_ref: stored.reply_audio_ref,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_pending_and_local() {
        let turn = Turn::placeholder("owner", 42);
        assert!(turn.is_pending());
        assert!(turn.id.is_local());
        assert!(turn.id.as_str().starts_with("local-"));
        assert_eq!(turn.user_text, PLACEHOLDER_TEXT);
        assert_eq!(turn.emotion.as_str(), "thinking");
        assert!(!turn.has_audio());
    }

    #[test]
    fn local_ids_do_not_repeat() {
        assert_ne!(TurnId::local(), TurnId::local());
    }

    #[test]
    fn stored_turns_keep_their_permanent_id() {
        let stored = StoredTurn {
            id: "abc".into(),
            seq: 3,
            owner: "owner".into(),
            created_at_ms: 10,
            transcript: "hello".into(),
            emotion: Emotion::Joy,
            reply_text: "hi beta".into(),
            reply_audio_ref: Some("data:audio/wav;base64,AAA=".into()),
        };
        let turn = Turn::from(stored);
        assert_eq!(turn.id, TurnId::Stored("abc".into()));
        assert_eq!(turn.user_text, "hello");
        assert!(turn.has_audio());
        assert!(!turn.is_pending());
    }
}
