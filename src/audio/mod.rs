//! Microphone chunk buffering and audio payload packaging.

mod payload;

pub use payload::{AudioPayload, PayloadError, WAV_MIME};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub max_duration: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
            max_duration: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recorder is already capturing")]
    AlreadyRecording,
    #[error("recorder is not capturing")]
    NotRecording,
    #[error("failed to package recording: {0}")]
    Encode(String),
}

#[derive(Clone, Debug)]
pub struct LevelFrame {
    pub rms: f32,
    pub captured: Duration,
}

/// Buffers captured chunks between `start` and `stop` and turns them into a
/// single WAV payload.
pub struct Recorder {
    config: RecorderConfig,
    state: RecorderState,
    samples: Vec<f32>,
    dropped_chunks: usize,
    level_tx: broadcast::Sender<LevelFrame>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        let (level_tx, _) = broadcast::channel(32);
        Self {
            config,
            state: RecorderState::Idle,
            samples: Vec::new(),
            dropped_chunks: 0,
            level_tx,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn subscribe_levels(&self) -> broadcast::Receiver<LevelFrame> {
        self.level_tx.subscribe()
    }

    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.state == RecorderState::Recording {
            return Err(RecorderError::AlreadyRecording);
        }
        self.samples.clear();
        self.dropped_chunks = 0;
        self.state = RecorderState::Recording;
        info!(
            target: "recorder",
            sample_rate_hz = self.config.sample_rate_hz,
            channels = self.config.channels,
            "recording started"
        );
        Ok(())
    }

    pub fn push_chunk(&mut self, chunk: &[f32]) -> Result<(), RecorderError> {
        if self.state != RecorderState::Recording {
            return Err(RecorderError::NotRecording);
        }
        if chunk.is_empty() {
            return Ok(());
        }

        if self.samples.len() + chunk.len() > self.max_samples() {
            self.dropped_chunks += 1;
            if self.dropped_chunks == 1 {
                warn!(
                    target: "recorder",
                    max = ?self.config.max_duration,
                    "recording exceeded maximum duration, dropping further audio"
                );
            }
            return Ok(());
        }

        self.samples.extend_from_slice(chunk);
        // No receivers is fine: level meters are optional.
        let _ = self.level_tx.send(LevelFrame {
            rms: chunk_rms(chunk),
            captured: self.captured(),
        });
        Ok(())
    }

    /// Ends the capture. Returns `None` when nothing was recorded.
    pub fn stop(&mut self) -> Result<Option<AudioPayload>, RecorderError> {
        if self.state != RecorderState::Recording {
            return Err(RecorderError::NotRecording);
        }
        self.state = RecorderState::Idle;

        let samples = std::mem::take(&mut self.samples);
        debug!(
            target: "recorder",
            samples = samples.len(),
            dropped_chunks = self.dropped_chunks,
            "recording stopped"
        );
        if samples.is_empty() {
            return Ok(None);
        }

        AudioPayload::from_samples(&samples, self.config.sample_rate_hz, self.config.channels)
            .map(Some)
            .map_err(|err| RecorderError::Encode(err.to_string()))
    }

    pub fn captured(&self) -> Duration {
        let per_second = self.config.sample_rate_hz as f64 * self.config.channels.max(1) as f64;
        if per_second == 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / per_second)
    }

    fn max_samples(&self) -> usize {
        (self.config.max_duration.as_secs_f64()
            * self.config.sample_rate_hz as f64
            * self.config.channels.max(1) as f64) as usize
    }
}

fn chunk_rms(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }

    let energy: f32 = chunk.iter().map(|sample| sample * sample).sum();
    (energy / chunk.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_without_audio_yields_nothing() {
        let mut recorder = Recorder::new(RecorderConfig::default());
        recorder.start().expect("start");
        assert!(recorder.stop().expect("stop").is_none());
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn chunks_are_concatenated_into_one_payload() {
        let mut recorder = Recorder::new(RecorderConfig::default());
        let mut levels = recorder.subscribe_levels();
        recorder.start().expect("start");
        recorder.push_chunk(&[0.1; 160]).expect("chunk");
        recorder.push_chunk(&[0.2; 160]).expect("chunk");
        assert_eq!(recorder.captured(), Duration::from_millis(20));

        let payload = recorder.stop().expect("stop").expect("payload");
        assert_eq!(payload.mime_type(), WAV_MIME);
        assert_eq!(payload.bytes().len(), 44 + 320 * 2);
        assert!(payload.as_data_uri().starts_with("data:audio/wav;base64,"));

        let first = levels.try_recv().expect("level frame");
        assert!((first.rms - 0.1).abs() < 1e-4);
    }

    #[test]
    fn rejects_misordered_calls() {
        let mut recorder = Recorder::new(RecorderConfig::default());
        assert!(matches!(
            recorder.push_chunk(&[0.0]),
            Err(RecorderError::NotRecording)
        ));
        assert!(matches!(recorder.stop(), Err(RecorderError::NotRecording)));
        recorder.start().expect("start");
        assert!(matches!(
            recorder.start(),
            Err(RecorderError::AlreadyRecording)
        ));
    }

    #[test]
    fn drops_audio_past_maximum_duration() {
        let mut recorder = Recorder::new(RecorderConfig {
            sample_rate_hz: 100,
            channels: 1,
            max_duration: Duration::from_secs(1),
        });
        recorder.start().expect("start");
        recorder.push_chunk(&[0.1; 80]).expect("chunk");
        recorder.push_chunk(&[0.1; 80]).expect("chunk over limit");
        let payload = recorder.stop().expect("stop").expect("payload");
        assert_eq!(payload.bytes().len(), 44 + 80 * 2);
    }
}
