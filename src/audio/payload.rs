use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use thiserror::Error;

pub const WAV_MIME: &str = "audio/wav";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("audio payload is not a data uri")]
    NotDataUri,
    #[error("audio payload is not base64 encoded")]
    NotBase64,
    #[error("audio payload has invalid base64 data: {0}")]
    InvalidBase64(String),
}

/// A self-contained audio clip carried as bytes plus mime type; travels between
/// collaborators as a `data:<mime>;base64,<data>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    mime_type: String,
    data: Bytes,
}

impl AudioPayload {
    pub fn new<S: Into<String>>(mime_type: S, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Parses a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self, PayloadError> {
        let rest = uri.trim().strip_prefix("data:").ok_or(PayloadError::NotDataUri)?;
        let (header, encoded) = rest.split_once(',').ok_or(PayloadError::NotDataUri)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(PayloadError::NotBase64)?;
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|err| PayloadError::InvalidBase64(err.to_string()))?;

        Ok(Self::new(mime_type, data))
    }

    /// Packs float samples in `[-1, 1]` into a 16-bit PCM WAV clip.
    pub fn from_samples(samples: &[f32], sample_rate_hz: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: sample_rate_hz,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("failed to open wav writer")?;
            for sample in samples {
                let clamped = sample.clamp(-1.0, 1.0);
                writer
                    .write_sample((clamped * i16::MAX as f32).round() as i16)
                    .context("failed to write wav sample")?;
            }
            writer.finalize().context("failed to finalize wav clip")?;
        }

        Ok(Self::new(WAV_MIME, cursor.into_inner()))
    }

    /// Wraps raw little-endian 16-bit mono PCM, as returned by speech
    /// synthesis endpoints, into a WAV clip.
    pub fn from_pcm16_le(pcm: &[u8], sample_rate_hz: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: sample_rate_hz,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("failed to open wav writer")?;
            for chunk in pcm.chunks_exact(2) {
                writer
                    .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                    .context("failed to write wav sample")?;
            }
            writer.finalize().context("failed to finalize wav clip")?;
        }

        Ok(Self::new(WAV_MIME, cursor.into_inner()))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Inverse of [`AudioPayload::from_data_uri`].
    pub fn as_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}
