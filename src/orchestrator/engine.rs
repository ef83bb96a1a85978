use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::anyhow;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{EmotionStrategy, TurnConfig};
use super::error::TurnError;
use super::history::format_history;
use super::strategy::{bounded, build_drafter, ReplyDrafter};
use super::types::{CompletedTurn, TurnOutcome, TurnRequest};
use crate::audio::AudioPayload;
use crate::collaborators::gemini::GeminiClient;
use crate::collaborators::{EmotionDetector, Narrator, ResponseGenerator, ResponseRequest, Transcriber};
use crate::persistence::{now_ms, NewTurnRecord, SessionStore};
use crate::session::{Turn, TurnId};
use crate::telemetry::events::{
    record_narration_degraded, record_persist_failed, record_turn_completed, record_turn_failed,
    record_turn_silent, record_turn_step,
};

/// Runs one recording through transcription, emotion, reply and narration,
/// strictly in that order, then hands the finished turn to the store without
/// waiting for the write.
pub struct TurnOrchestrator {
    config: TurnConfig,
    transcriber: Arc<dyn Transcriber>,
    drafter: Arc<dyn ReplyDrafter>,
    narrator: Option<Arc<dyn Narrator>>,
    store: Arc<dyn SessionStore>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl TurnOrchestrator {
    /// Builds an orchestrator from individual collaborators. The emotion
    /// strategy in `config` decides which detector calls are made.
    pub fn with_components(
        config: TurnConfig,
        transcriber: Arc<dyn Transcriber>,
        emotion_detector: Arc<dyn EmotionDetector>,
        responder: Arc<dyn ResponseGenerator>,
        narrator: Option<Arc<dyn Narrator>>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let drafter = build_drafter(config.emotion_strategy, emotion_detector, responder);
        Self {
            config,
            transcriber,
            drafter,
            narrator,
            store,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    /// Wires every collaborator role to one Gemini client.
    pub fn with_gemini(config: TurnConfig, client: GeminiClient, store: Arc<dyn SessionStore>) -> Self {
        let client = Arc::new(client);
        Self::with_components(
            config,
            client.clone(),
            client.clone(),
            client.clone(),
            Some(client),
            store,
        )
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn strategy(&self) -> EmotionStrategy {
        self.drafter.strategy()
    }

    /// Turns one recording into a reply, narrated when the mode asks for
    /// audio. Silence returns [`TurnOutcome::Silent`] without a write.
    ///
    /// A completed turn is returned before its record is stored; the write
    /// runs in the background and never fails the turn. Narration failure is
    /// carried on the completed turn instead of being returned as an error.
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let started = Instant::now();
        let owner = request.owner_id.trim().to_string();

        let result = self.run(&owner, request, started).await;
        if let Err(err) = &result {
            record_turn_failed(&owner, err.code(), &err.to_string());
        }
        result
    }

    async fn run(
        &self,
        owner: &str,
        request: TurnRequest,
        started: Instant,
    ) -> Result<TurnOutcome, TurnError> {
        if owner.is_empty() {
            return Err(TurnError::MissingIdentity);
        }
        let audio = match request.audio {
            Some(audio) if !audio.is_empty() => audio,
            _ => return Err(TurnError::MissingAudio),
        };
        let language = if request.language.trim().is_empty() {
            self.config.default_language.clone()
        } else {
            request.language.trim().to_string()
        };

        let transcript = self.transcribe(owner, &audio, &language).await?;
        if transcript.is_empty() {
            record_turn_silent(owner, started.elapsed());
            return Ok(TurnOutcome::Silent);
        }

        let formatted_history = format_history(&request.history);
        let reply_request = ResponseRequest {
            transcript: transcript.clone(),
            emotion: None,
            history: request.history,
            formatted_history,
            language,
        };
        let (emotion, reply_text) = self
            .drafter
            .draft(owner, reply_request, self.config.collaborator_timeout)
            .await?;

        let (reply_audio_ref, narration_error) = if request.response_mode.wants_narration() {
            match self.narrate(owner, &reply_text).await {
                Ok(audio) => (Some(audio.as_data_uri()), None),
                Err(err) => {
                    record_narration_degraded(owner, &err.to_string());
                    (None, Some(err))
                }
            }
        } else {
            (None, None)
        };

        self.persist_in_background(NewTurnRecord {
            owner: owner.to_string(),
            transcript: transcript.clone(),
            emotion: emotion.clone(),
            reply_text: reply_text.clone(),
            reply_audio_ref: reply_audio_ref.clone(),
        });

        record_turn_completed(
            owner,
            emotion.as_str(),
            self.drafter.strategy().as_str(),
            reply_audio_ref.is_some(),
            narration_error.is_some(),
            started.elapsed(),
        );

        Ok(TurnOutcome::Completed(CompletedTurn {
            turn: Turn {
                id: TurnId::local(),
                owner: owner.to_string(),
                created_at_ms: now_ms(),
                user_text: transcript,
                emotion,
                reply_text,
                reply_audio_ref,
            },
            narration_error,
        }))
    }

    async fn transcribe(
        &self,
        owner: &str,
        audio: &AudioPayload,
        language: &str,
    ) -> Result<String, TurnError> {
        let started = Instant::now();
        let result = bounded(
            self.config.collaborator_timeout,
            self.transcriber.transcribe(audio, language),
        )
        .await;
        record_turn_step(owner, "transcription", started.elapsed(), result.is_ok());

        result
            .map(|text| text.trim().to_string())
            .map_err(|err| TurnError::TranscriptionFailed(err.to_string()))
    }

    async fn narrate(&self, owner: &str, text: &str) -> Result<AudioPayload, TurnError> {
        let Some(narrator) = &self.narrator else {
            return Err(TurnError::NarrationFailed(
                "no narrator is configured".to_string(),
            ));
        };

        let started = Instant::now();
        let result = bounded(self.config.collaborator_timeout, narrator.narrate(text))
            .await
            .and_then(|audio| {
                if audio.is_empty() {
                    Err(anyhow!("narrator returned empty audio"))
                } else {
                    Ok(audio)
                }
            });
        record_turn_step(owner, "narration", started.elapsed(), result.is_ok());

        result.map_err(|err| TurnError::NarrationFailed(err.to_string()))
    }

    fn persist_in_background(&self, record: NewTurnRecord) {
        let store = Arc::clone(&self.store);
        let handle = tokio::spawn(async move {
            let owner = record.owner.clone();
            match store.append(record).await {
                Ok(stored) => debug!(
                    target: "turn_orchestrator",
                    id = %stored.id,
                    %owner,
                    "turn persisted"
                ),
                Err(err) => record_persist_failed(&owner, &format!("{err:#}")),
            }
        });

        match self.pending_writes.lock() {
            Ok(mut writes) => {
                writes.retain(|write| !write.is_finished());
                writes.push(handle);
            }
            Err(err) => warn!(
                target: "turn_orchestrator",
                %err,
                "pending write registry poisoned; write left untracked"
            ),
        }
    }

    /// Waits for every background write started so far.
    pub async fn flush_writes(&self) {
        let writes = match self.pending_writes.lock() {
            Ok(mut writes) => std::mem::take(&mut *writes),
            Err(_) => return,
        };
        let count = writes.len();
        for write in writes {
            if let Err(err) = write.await {
                warn!(target: "turn_orchestrator", %err, "background write task aborted");
            }
        }
        if count > 0 {
            info!(target: "turn_orchestrator", count, "flushed background writes");
        }
    }
}
