use thiserror::Error;

/// Reasons a turn did not complete. Every variant except `NarrationFailed`
/// aborts the turn; narration failures only ever travel as the soft error on a
/// completed turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("owner identity is missing")]
    MissingIdentity,
    #[error("audio data is missing")]
    MissingAudio,
    #[error("a turn is already being processed")]
    Busy,
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("emotion detection failed: {0}")]
    EmotionDetectionFailed(String),
    #[error("response generation failed: {0}")]
    ResponseGenerationFailed(String),
    #[error("narration failed: {0}")]
    NarrationFailed(String),
}

impl TurnError {
    /// Stable identifier used in telemetry.
    pub fn code(&self) -> &'static str {
        match self {
            TurnError::MissingIdentity => "missing_identity",
            TurnError::MissingAudio => "missing_audio",
            TurnError::Busy => "busy",
            TurnError::TranscriptionFailed(_) => "transcription_failed",
            TurnError::EmotionDetectionFailed(_) => "emotion_detection_failed",
            TurnError::ResponseGenerationFailed(_) => "response_generation_failed",
            TurnError::NarrationFailed(_) => "narration_failed",
        }
    }

    /// The turn still completed despite this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TurnError::NarrationFailed(_))
    }

    /// Input errors are rejected before any collaborator is called.
    pub fn is_input_error(&self) -> bool {
        matches!(self, TurnError::MissingIdentity | TurnError::MissingAudio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_narration_is_recoverable() {
        assert!(TurnError::NarrationFailed("tts".into()).is_recoverable());
        assert!(!TurnError::ResponseGenerationFailed("llm".into()).is_recoverable());
        assert!(!TurnError::MissingAudio.is_recoverable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(TurnError::MissingIdentity.code(), "missing_identity");
        assert_eq!(
            TurnError::EmotionDetectionFailed(String::new()).code(),
            "emotion_detection_failed"
        );
    }
}
