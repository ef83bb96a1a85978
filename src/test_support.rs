//! Scripted collaborators shared by the orchestrator and session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::audio::{AudioPayload, WAV_MIME};
use crate::collaborators::{
    ConversationSummarizer, Emotion, EmotionDetector, HistoryEntry, Narrator, ResponseGenerator,
    ResponseRequest, Transcriber,
};
use crate::orchestrator::{TurnConfig, TurnOrchestrator};
use crate::persistence::{MemoryStore, SessionStore};

/// Queue of canned results; once drained every call gets the fallback.
pub(crate) struct Script<T> {
    queue: Mutex<VecDeque<Result<T, String>>>,
    fallback: Result<T, String>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl<T: Clone + Send> Script<T> {
    pub fn always(value: T) -> Self {
        Self::with_fallback(Ok(value))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_fallback(Err(message.to_string()))
    }

    fn with_fallback(fallback: Result<T, String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    pub fn push(&self, next: Result<T, String>) {
        self.queue.lock().expect("script lock").push_back(next);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn next(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.queue.lock().expect("script lock").pop_front();
        scripted
            .unwrap_or_else(|| self.fallback.clone())
            .map_err(|message| anyhow!(message))
    }
}

pub(crate) struct MockTranscriber {
    pub script: Script<String>,
    pub languages: Mutex<Vec<String>>,
}

impl MockTranscriber {
    pub fn new(script: Script<String>) -> Self {
        Self {
            script,
            languages: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &AudioPayload, language: &str) -> Result<String> {
        self.languages
            .lock()
            .expect("languages lock")
            .push(language.to_string());
        self.script.next().await
    }
}

pub(crate) struct MockEmotion {
    pub script: Script<Emotion>,
}

#[async_trait]
impl EmotionDetector for MockEmotion {
    async fn detect(&self, _transcript: &str) -> Result<Emotion> {
        self.script.next().await
    }
}

pub(crate) struct MockResponder {
    pub replies: Script<String>,
    pub fused: Script<(Emotion, String)>,
    pub requests: Mutex<Vec<ResponseRequest>>,
}

impl MockResponder {
    pub fn new(replies: Script<String>, fused: Script<(Emotion, String)>) -> Self {
        Self {
            replies,
            fused,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<ResponseRequest> {
        self.requests.lock().expect("requests lock").last().cloned()
    }
}

#[async_trait]
impl ResponseGenerator for MockResponder {
    async fn respond(&self, request: &ResponseRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies.next().await
    }

    async fn respond_with_emotion(&self, request: &ResponseRequest) -> Result<(Emotion, String)> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.fused.next().await
    }
}

pub(crate) struct MockNarrator {
    pub script: Script<AudioPayload>,
}

#[async_trait]
impl Narrator for MockNarrator {
    async fn narrate(&self, _text: &str) -> Result<AudioPayload> {
        self.script.next().await
    }
}

pub(crate) struct MockSummarizer {
    pub script: Script<String>,
}

#[async_trait]
impl ConversationSummarizer for MockSummarizer {
    async fn summarize(&self, _entries: &[HistoryEntry]) -> Result<String> {
        self.script.next().await
    }
}

pub(crate) fn recording() -> AudioPayload {
    AudioPayload::new(WAV_MIME, vec![0x52u8, 0x49, 0x46, 0x46, 0x01, 0x02])
}

pub(crate) fn narration() -> AudioPayload {
    AudioPayload::new(WAV_MIME, vec![0x52u8, 0x49, 0x46, 0x46, 0x0a, 0x0b])
}

/// Every collaborator plus the store, each reachable for assertions.
pub(crate) struct Harness {
    pub transcriber: Arc<MockTranscriber>,
    pub emotion: Arc<MockEmotion>,
    pub responder: Arc<MockResponder>,
    pub narrator: Arc<MockNarrator>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    /// Happy path: "I had a rough day", sadness, a reply, and narration.
    pub fn new() -> Self {
        Self {
            transcriber: Arc::new(MockTranscriber::new(Script::always(
                "I had a rough day".to_string(),
            ))),
            emotion: Arc::new(MockEmotion {
                script: Script::always(Emotion::Sadness),
            }),
            responder: Arc::new(MockResponder::new(
                Script::always("Arre beta, come sit with me.".to_string()),
                Script::always((Emotion::Sadness, "Arre beta, come sit with me.".to_string())),
            )),
            narrator: Arc::new(MockNarrator {
                script: Script::always(narration()),
            }),
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn orchestrator(&self, config: TurnConfig) -> TurnOrchestrator {
        let store: Arc<dyn SessionStore> = self.store.clone();
        let narrator: Arc<dyn Narrator> = self.narrator.clone();
        TurnOrchestrator::with_components(
            config,
            self.transcriber.clone(),
            self.emotion.clone(),
            self.responder.clone(),
            Some(narrator),
            store,
        )
    }

    /// Number of collaborator calls made so far, across every role.
    pub fn collaborator_calls(&self) -> usize {
        self.transcriber.script.calls()
            + self.emotion.script.calls()
            + self.responder.replies.calls()
            + self.responder.fused.calls()
            + self.narrator.script.calls()
    }
}
