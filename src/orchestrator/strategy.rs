use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::time::timeout;

use super::config::EmotionStrategy;
use super::error::TurnError;
use crate::collaborators::{Emotion, EmotionDetector, ResponseGenerator, ResponseRequest};
use crate::telemetry::events::record_turn_step;

pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("collaborator call timed out after {limit:?}")),
    }
}

/// Produces the emotion label and reply text for a transcript.
#[async_trait]
pub(crate) trait ReplyDrafter: Send + Sync {
    fn strategy(&self) -> EmotionStrategy;

    async fn draft(
        &self,
        owner: &str,
        request: ResponseRequest,
        limit: Duration,
    ) -> Result<(Emotion, String), TurnError>;
}

pub(crate) fn build_drafter(
    strategy: EmotionStrategy,
    detector: Arc<dyn EmotionDetector>,
    responder: Arc<dyn ResponseGenerator>,
) -> Arc<dyn ReplyDrafter> {
    match strategy {
        EmotionStrategy::DetectThenRespond => Arc::new(DetectThenRespond {
            detector,
            responder,
        }),
        EmotionStrategy::RespondWithEmotion => Arc::new(RespondWithEmotion { responder }),
    }
}

struct DetectThenRespond {
    detector: Arc<dyn EmotionDetector>,
    responder: Arc<dyn ResponseGenerator>,
}

#[async_trait]
impl ReplyDrafter for DetectThenRespond {
    fn strategy(&self) -> EmotionStrategy {
        EmotionStrategy::DetectThenRespond
    }

    async fn draft(
        &self,
        owner: &str,
        mut request: ResponseRequest,
        limit: Duration,
    ) -> Result<(Emotion, String), TurnError> {
        let started = Instant::now();
        let emotion = bounded(limit, self.detector.detect(&request.transcript))
            .await
            .and_then(|emotion| {
                if emotion.is_pending() || emotion.as_str().trim().is_empty() {
                    Err(anyhow!("emotion detector returned no usable label"))
                } else {
                    Ok(emotion)
                }
            });
        record_turn_step(owner, "emotion", started.elapsed(), emotion.is_ok());
        let emotion = emotion.map_err(|err| TurnError::EmotionDetectionFailed(err.to_string()))?;

        request.emotion = Some(emotion.clone());
        let started = Instant::now();
        let reply = bounded(limit, self.responder.respond(&request))
            .await
            .and_then(non_empty_reply);
        record_turn_step(owner, "response", started.elapsed(), reply.is_ok());
        let reply = reply.map_err(|err| TurnError::ResponseGenerationFailed(err.to_string()))?;

        Ok((emotion, reply))
    }
}

struct RespondWithEmotion {
    responder: Arc<dyn ResponseGenerator>,
}

#[async_trait]
impl ReplyDrafter for RespondWithEmotion {
    fn strategy(&self) -> EmotionStrategy {
        EmotionStrategy::RespondWithEmotion
    }

    async fn draft(
        &self,
        owner: &str,
        request: ResponseRequest,
        limit: Duration,
    ) -> Result<(Emotion, String), TurnError> {
        let started = Instant::now();
        let result = bounded(limit, self.responder.respond_with_emotion(&request)).await;
        record_turn_step(owner, "response_with_emotion", started.elapsed(), result.is_ok());

        // A failed fused call is reported as a response failure.
        let (emotion, reply) =
            result.map_err(|err| TurnError::ResponseGenerationFailed(err.to_string()))?;
        if emotion.is_pending() || emotion.as_str().trim().is_empty() {
            return Err(TurnError::EmotionDetectionFailed(
                "combined response carried no usable emotion".to_string(),
            ));
        }
        let reply =
            non_empty_reply(reply).map_err(|err| TurnError::ResponseGenerationFailed(err.to_string()))?;

        Ok((emotion, reply))
    }
}

fn non_empty_reply(reply: String) -> Result<String> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        Err(anyhow!("reply generator returned empty text"))
    } else {
        Ok(trimmed.to_string())
    }
}
