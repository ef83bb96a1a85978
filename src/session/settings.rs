//! Client-side preferences kept next to the journal database.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::dirs_compat;
use crate::orchestrator::ResponseMode;
use crate::persistence::now_ms;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Language tags offered to the user, with their display names.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en-US", "English"),
    ("es-ES", "Español"),
    ("fr-FR", "Français"),
    ("de-DE", "Deutsch"),
    ("it-IT", "Italiano"),
    ("pt-BR", "Português"),
    ("ja-JP", "日本語"),
    ("ko-KR", "한국어"),
    ("zh-CN", "中文"),
    ("kn-IN", "ಕನ್ನಡ"),
    ("ta-IN", "தமிழ்"),
    ("hi-IN", "हिन्दी"),
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no data directory available for settings")]
    NoDataDir,
    #[error("failed to read settings: {0}")]
    Read(#[source] std::io::Error),
    /// The file exists but is not JSON. It is left untouched so the device
    /// identity inside can be recovered by hand.
    #[error("settings file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to prepare settings directory: {0}")]
    Directory(#[source] std::io::Error),
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist settings: {0}")]
    Write(#[source] std::io::Error),
}

/// Preferences of this client. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// BCP-47 tag for transcription and replies.
    pub language: String,
    pub response_mode: ResponseMode,
    /// Owner identity the journal is partitioned by.
    pub device_id: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            response_mode: ResponseMode::default(),
            device_id: String::new(),
        }
    }
}

impl ClientSettings {
    /// `settings.json` inside the data directory.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs_compat::data_dir()
            .map(|dir| dir.join(SETTINGS_FILE))
            .ok_or(SettingsError::NoDataDir)
    }

    /// Reads the settings at `path`, or defaults when there is no file yet.
    /// Fields that fail to decode fall back one by one; a file that is not
    /// JSON at all is an error and is never overwritten. A device id is
    /// generated and saved only when the file carries none.
    pub fn load_or_init(path: &Path) -> Result<Self, SettingsError> {
        let mut settings = match fs::read(path) {
            Ok(raw) => Self::decode(path, &raw)?,
            Err(err) if err.kind() == ErrorKind::NotFound => ClientSettings::default(),
            Err(err) => return Err(SettingsError::Read(err)),
        };

        if settings.language.trim().is_empty() {
            settings.language = DEFAULT_LANGUAGE.to_string();
        }
        if settings.device_id.trim().is_empty() {
            settings.device_id = generate_device_id();
            info!(target: "journal_session", device_id = %settings.device_id, "generated device identity");
            settings.save(path)?;
        }
        Ok(settings)
    }

    fn decode(path: &Path, raw: &[u8]) -> Result<Self, SettingsError> {
        let strict_err = match serde_json::from_slice::<ClientSettings>(raw) {
            Ok(settings) => return Ok(settings),
            Err(err) => err,
        };
        let value: Value = serde_json::from_slice(raw).map_err(|source| SettingsError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        let Some(fields) = value.as_object() else {
            return Err(SettingsError::Corrupt {
                path: path.to_path_buf(),
                source: strict_err,
            });
        };

        warn!(
            target: "journal_session",
            path = %path.display(),
            err = %strict_err,
            "settings partly unreadable; keeping the fields that decode"
        );
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
        let defaults = ClientSettings::default();
        Ok(ClientSettings {
            language: text("language").unwrap_or(defaults.language),
            response_mode: text("responseMode")
                .and_then(|mode| ResponseMode::parse(&mode))
                .unwrap_or(defaults.response_mode),
            device_id: text("deviceId").unwrap_or_default(),
        })
    }

    /// Writes the settings next to `path` and renames them into place, so a
    /// reader sees either the old file or the new one.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Directory)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        let staging = staging_path(path);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&staging)
            .map_err(SettingsError::Write)?;
        #[cfg(unix)]
        {
            let perm = fs::Permissions::from_mode(0o600);
            file.set_permissions(perm).map_err(SettingsError::Write)?;
        }
        file.write_all(&bytes).map_err(SettingsError::Write)?;
        file.sync_all().map_err(SettingsError::Write)?;
        drop(file);
        fs::rename(&staging, path).map_err(SettingsError::Write)?;
        Ok(())
    }

    /// Whether `tag` is one of [`SUPPORTED_LANGUAGES`].
    pub fn is_supported_language(tag: &str) -> bool {
        SUPPORTED_LANGUAGES.iter().any(|(code, _)| *code == tag)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| SETTINGS_FILE.to_string());
    path.with_file_name(format!("{name}.tmp"))
}

/// Millisecond timestamp followed by random hex.
fn generate_device_id() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("{:x}-{:016x}", now_ms(), suffix)
}
