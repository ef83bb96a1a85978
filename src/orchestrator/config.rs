use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where emotion detection happens relative to reply generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionStrategy {
    /// Separate emotion call, then a reply call that receives the label.
    DetectThenRespond,
    /// A single reply call that also returns the label.
    RespondWithEmotion,
}

impl EmotionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionStrategy::DetectThenRespond => "detect_then_respond",
            EmotionStrategy::RespondWithEmotion => "respond_with_emotion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "detect_then_respond" | "detect" | "separate" => Some(Self::DetectThenRespond),
            "respond_with_emotion" | "combined" | "fused" => Some(Self::RespondWithEmotion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    pub emotion_strategy: EmotionStrategy,
    /// Upper bound for any single collaborator call.
    pub collaborator_timeout: Duration,
    /// Used when a request arrives without a language tag.
    pub default_language: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            emotion_strategy: EmotionStrategy::DetectThenRespond,
            collaborator_timeout: Duration::from_secs(30),
            default_language: "en-US".to_string(),
        }
    }
}

impl TurnConfig {
    /// Overrides defaults from `INNERSIGHT_EMOTION_STRATEGY`,
    /// `INNERSIGHT_COLLABORATOR_TIMEOUT_SECS` and `INNERSIGHT_DEFAULT_LANGUAGE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("INNERSIGHT_EMOTION_STRATEGY") {
            config.emotion_strategy = EmotionStrategy::parse(&value)
                .ok_or_else(|| anyhow!("unknown INNERSIGHT_EMOTION_STRATEGY: {value}"))?;
        }

        if let Ok(value) = std::env::var("INNERSIGHT_COLLABORATOR_TIMEOUT_SECS") {
            let secs: u64 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid INNERSIGHT_COLLABORATOR_TIMEOUT_SECS: {value}"))?;
            config.collaborator_timeout = Duration::from_secs(secs.max(1));
        }

        if let Ok(value) = std::env::var("INNERSIGHT_DEFAULT_LANGUAGE") {
            if !value.trim().is_empty() {
                config.default_language = value.trim().to_string();
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_aliases_resolve() {
        assert_eq!(
            EmotionStrategy::parse("Combined"),
            Some(EmotionStrategy::RespondWithEmotion)
        );
        assert_eq!(
            EmotionStrategy::parse("detect_then_respond"),
            Some(EmotionStrategy::DetectThenRespond)
        );
        assert_eq!(EmotionStrategy::parse("parallel"), None);
    }

    #[test]
    fn strategy_serializes_as_snake_case() {
        let json = serde_json::to_string(&EmotionStrategy::RespondWithEmotion).expect("encode");
        assert_eq!(json, "\"respond_with_emotion\"");
    }
}
