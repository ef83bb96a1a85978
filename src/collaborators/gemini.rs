//! Google Generative Language (`generateContent`) backed collaborators.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::prompts;
use super::{
    ConversationSummarizer, Emotion, EmotionDetector, HistoryEntry, Narrator, ResponseGenerator,
    ResponseRequest, Transcriber,
};
use crate::audio::AudioPayload;

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_TTS_VOICE: &str = "Algenib";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PCM_RATE_HZ: u32 = 24_000;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Reads `GEMINI_API_KEY` (required) plus optional `GEMINI_API_URL`,
    /// `GEMINI_MODEL`, `GEMINI_TTS_MODEL`, `GEMINI_TTS_VOICE` and
    /// `GEMINI_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| anyhow!("GEMINI_API_KEY or GOOGLE_API_KEY must be set"))?;
        let timeout_secs = match std::env::var("GEMINI_HTTP_TIMEOUT_SECS") {
            Ok(value) => value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid GEMINI_HTTP_TIMEOUT_SECS: {value}"))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url: env_or("GEMINI_API_URL", DEFAULT_API_URL),
            api_key,
            model: env_or("GEMINI_MODEL", DEFAULT_MODEL),
            tts_model: env_or("GEMINI_TTS_MODEL", DEFAULT_TTS_MODEL),
            tts_voice: env_or("GEMINI_TTS_VOICE", DEFAULT_TTS_VOICE),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// One client serving every collaborator role.
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    agent: ureq::Agent,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GeminiConfig::from_env()?))
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Value> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            model
        );
        let agent = self.agent.clone();
        let api_key = self.config.api_key.clone();
        let encoded = serde_json::to_string(&body).context("failed to encode gemini request")?;

        debug!(target: "gemini", %model, bytes = encoded.len(), "sending generateContent request");

        tokio::task::spawn_blocking(move || -> Result<Value> {
            let response = agent
                .post(&url)
                .set("Content-Type", "application/json")
                .set("x-goog-api-key", &api_key)
                .send_string(&encoded);

            match response {
                Ok(response) => serde_json::from_reader(response.into_reader())
                    .context("failed to decode gemini response"),
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    Err(anyhow!("gemini returned HTTP status {status}: {body}"))
                }
                Err(err) => Err(anyhow!("gemini request failed: {err}")),
            }
        })
        .await
        .context("gemini request task panicked")?
    }

    async fn generate_text(&self, prompt: String, json_output: bool) -> Result<String> {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        if json_output {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }

        let response = self.generate(&self.config.model, body).await?;
        extract_text(&response).ok_or_else(|| anyhow!("gemini response carried no text"))
    }
}

#[async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(&self, audio: &AudioPayload, language: &str) -> Result<String> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompts::transcription_prompt(language) },
                    { "inlineData": { "mimeType": audio.mime_type(), "data": audio.to_base64() } },
                ],
            }],
        });

        let response = self.generate(&self.config.model, body).await?;
        // A response without text parts means nothing was heard.
        Ok(extract_text(&response).unwrap_or_default().trim().to_string())
    }
}

#[async_trait]
impl EmotionDetector for GeminiClient {
    async fn detect(&self, transcript: &str) -> Result<Emotion> {
        let text = self
            .generate_text(prompts::emotion_prompt(transcript), false)
            .await?;
        Emotion::parse(&text).ok_or_else(|| anyhow!("gemini returned an empty emotion label"))
    }
}

#[async_trait]
impl ResponseGenerator for GeminiClient {
    async fn respond(&self, request: &ResponseRequest) -> Result<String> {
        let emotion = request.emotion.clone().unwrap_or(Emotion::Neutral);
        let prompt = prompts::response_prompt(
            &emotion,
            &request.formatted_history,
            &request.transcript,
            &request.language,
        );
        let reply = self.generate_text(prompt, false).await?;
        Ok(reply.trim().to_string())
    }

    async fn respond_with_emotion(&self, request: &ResponseRequest) -> Result<(Emotion, String)> {
        let prompt = prompts::combined_prompt(
            &request.formatted_history,
            &request.transcript,
            &request.language,
        );
        let text = self.generate_text(prompt, true).await?;
        parse_combined(&text)
    }
}

#[async_trait]
impl Narrator for GeminiClient {
    async fn narrate(&self, text: &str) -> Result<AudioPayload> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompts::narration_prompt(text) }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.config.tts_voice },
                    },
                },
            },
        });

        let response = self.generate(&self.config.tts_model, body).await?;
        let (mime_type, data) = extract_inline_data(&response)
            .ok_or_else(|| anyhow!("gemini narration response carried no audio"))?;
        let bytes = STANDARD
            .decode(data.as_bytes())
            .context("gemini narration audio is not valid base64")?;

        if mime_type.starts_with("audio/L16") || mime_type.starts_with("audio/pcm") {
            AudioPayload::from_pcm16_le(&bytes, pcm_rate(&mime_type))
        } else {
            Ok(AudioPayload::new(mime_type, bytes))
        }
    }
}

#[async_trait]
impl ConversationSummarizer for GeminiClient {
    async fn summarize(&self, entries: &[HistoryEntry]) -> Result<String> {
        let summary = self
            .generate_text(prompts::summary_prompt(entries), false)
            .await?;
        Ok(summary.trim().to_string())
    }
}

fn candidate_parts(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn extract_text(response: &Value) -> Option<String> {
    let text: String = candidate_parts(response)
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_inline_data(response: &Value) -> Option<(String, String)> {
    candidate_parts(response).find_map(|part| {
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
        let mime = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)?;
        let data = inline.get("data").and_then(Value::as_str)?;
        Some((mime.to_string(), data.to_string()))
    })
}

fn pcm_rate(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
        .unwrap_or(DEFAULT_PCM_RATE_HZ)
}

#[derive(Debug, Deserialize)]
struct CombinedReply {
    emotion: String,
    reply: String,
}

fn parse_combined(text: &str) -> Result<(Emotion, String)> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    let parsed: CombinedReply =
        serde_json::from_str(body.trim()).context("combined reply is not the expected json")?;
    // An empty label is left for the caller to report as an emotion failure.
    let emotion = Emotion::parse(&parsed.emotion).unwrap_or_else(|| {
        warn!(target: "gemini", "combined reply carried an empty emotion");
        Emotion::Other(String::new())
    });
    let reply = parsed.reply.trim().to_string();
    if reply.is_empty() {
        warn!(target: "gemini", "combined reply carried empty reply text");
    }
    Ok((emotion, reply))
}
