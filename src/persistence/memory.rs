use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::{new_record_id, now_ms, sort_turns, NewTurnRecord, SessionStore, StoredTurn};

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// In-process store. Also used by tests, which can inject a clock and
/// make reads or writes fail.
pub struct MemoryStore {
    records: Mutex<Vec<StoredTurn>>,
    changes: watch::Sender<u64>,
    clock: Clock,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_attempts: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(now_ms))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `clock` for `created_at_ms` instead of the system time.
    pub fn with_clock(clock: Clock) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            records: Mutex::new(Vec::new()),
            changes,
            clock,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            write_attempts: AtomicUsize::new(0),
        }
    }

    /// While set, `append` fails without storing anything.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `append` calls, successful or not.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn append(&self, record: NewTurnRecord) -> Result<StoredTurn> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store rejected write"));
        }
        record.validate()?;

        let stored = {
            let mut records = self
                .records
                .lock()
                .map_err(|_| anyhow!("memory store lock poisoned"))?;
            let stored = StoredTurn {
                id: new_record_id(),
                seq: records.len() as i64 + 1,
                owner: record.owner,
                created_at_ms: (self.clock)(),
                transcript: record.transcript,
                emotion: record.emotion,
                reply_text: record.reply_text,
                reply_audio_ref: record.reply_audio_ref,
            };
            records.push(stored.clone());
            stored
        };

        debug!(target: "session_store", id = %stored.id, owner = %stored.owner, "turn appended");
        self.changes.send_modify(|version| *version += 1);
        Ok(stored)
    }

    async fn list(&self, owner: &str) -> Result<Vec<StoredTurn>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store rejected read"));
        }
        let mut turns: Vec<StoredTurn> = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .iter()
            .filter(|turn| turn.owner == owner)
            .cloned()
            .collect();
        sort_turns(&mut turns);
        Ok(turns)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
