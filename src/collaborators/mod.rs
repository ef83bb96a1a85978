//! Seams to the hosted AI services a turn depends on.

mod emotion;
pub mod gemini;
pub mod prompts;

pub use emotion::Emotion;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::AudioPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One role-tagged line of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// Input for reply generation.
#[derive(Debug, Clone)]
pub struct ResponseRequest {
    pub transcript: String,
    /// Absent when the emotion is requested in the same call.
    pub emotion: Option<Emotion>,
    pub history: Vec<HistoryEntry>,
    /// Pre-rendered `user: …` / `model: …` transcript of `history`.
    pub formatted_history: String,
    pub language: String,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Returns an empty string when no speech was detected.
    async fn transcribe(&self, audio: &AudioPayload, language: &str) -> Result<String>;
}

/// Classifies the emotion of one transcript.
#[async_trait]
pub trait EmotionDetector: Send + Sync {
    async fn detect(&self, transcript: &str) -> Result<Emotion>;
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn respond(&self, request: &ResponseRequest) -> Result<String>;

    /// Detects the emotion and drafts the reply in one call.
    async fn respond_with_emotion(&self, request: &ResponseRequest) -> Result<(Emotion, String)>;
}

/// Speaks the reply text.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, text: &str) -> Result<AudioPayload>;
}

#[async_trait]
pub trait ConversationSummarizer: Send + Sync {
    async fn summarize(&self, entries: &[HistoryEntry]) -> Result<String>;
}
