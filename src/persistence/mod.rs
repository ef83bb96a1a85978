//! Append-only journal store with an owner-scoped snapshot feed.

mod memory;
#[cfg(any(feature = "sqlite-persistence", feature = "sqlcipher-persistence"))]
pub mod sqlite;
mod subscription;

pub use memory::MemoryStore;
pub use subscription::{Snapshot, Subscription, SubscriptionCanceller};

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::collaborators::Emotion;

const RECORD_ID_LEN: usize = 20;

/// Fields of a completed turn, as handed to the store. The store assigns the
/// permanent id and the write timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTurnRecord {
    pub owner: String,
    pub transcript: String,
    pub emotion: Emotion,
    pub reply_text: String,
    #[serde(default)]
    pub reply_audio_ref: Option<String>,
}

impl NewTurnRecord {
    /// Rejects records with a blank field or an undetected emotion.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            bail!("turn record owner cannot be empty");
        }
        if self.transcript.trim().is_empty() {
            bail!("turn record transcript cannot be empty");
        }
        if self.emotion.is_pending() || self.emotion.as_str().trim().is_empty() {
            bail!("turn record emotion must be a detected label");
        }
        if self.reply_text.trim().is_empty() {
            bail!("turn record reply cannot be empty");
        }
        Ok(())
    }
}

/// A durably written turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTurn {
    pub id: String,
    /// Arrival order at the store; breaks `created_at_ms` ties.
    pub seq: i64,
    pub owner: String,
    pub created_at_ms: i64,
    pub transcript: String,
    pub emotion: Emotion,
    pub reply_text: String,
    #[serde(default)]
    pub reply_audio_ref: Option<String>,
}

/// Append-only journal partitioned by owner.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, record: NewTurnRecord) -> Result<StoredTurn>;

    /// All turns of `owner`, ordered by `(created_at_ms, seq)`.
    async fn list(&self, owner: &str) -> Result<Vec<StoredTurn>>;

    /// Version counter bumped after every successful write.
    fn changes(&self) -> watch::Receiver<u64>;
}

pub(crate) fn new_record_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RECORD_ID_LEN)
        .map(char::from)
        .collect()
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

pub(crate) fn sort_turns(turns: &mut [StoredTurn]) {
    turns.sort_by_key(|turn| (turn.created_at_ms, turn.seq));
}
