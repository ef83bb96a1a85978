use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags, Row};
use tokio::sync::watch;
use tracing::{debug, info};

use super::{new_record_id, now_ms, NewTurnRecord, SessionStore, StoredTurn};
use crate::collaborators::Emotion;

/// Provides SQLCipher key material for the journal database.
pub trait KeyResolver: Send + Sync {
    fn resolve_key(&self) -> Result<Option<String>>;
}

/// Key resolver that reads the key material from the `INNERSIGHT_SQLCIPHER_KEY` env variable.
#[derive(Default)]
pub struct EnvKeyResolver;

impl KeyResolver for EnvKeyResolver {
    fn resolve_key(&self) -> Result<Option<String>> {
        Ok(std::env::var("INNERSIGHT_SQLCIPHER_KEY")
            .ok()
            .filter(|key| !key.is_empty()))
    }
}

/// Where the journal database lives.
#[derive(Debug, Clone)]
pub enum SqlitePath {
    File(PathBuf),
    Memory,
}

impl SqlitePath {
    fn to_manager(&self) -> SqliteConnectionManager {
        match self {
            SqlitePath::File(path) => {
                SqliteConnectionManager::file(path).with_flags(Self::open_flags())
            }
            SqlitePath::Memory => SqliteConnectionManager::memory().with_flags(Self::open_flags()),
        }
    }

    fn open_flags() -> OpenFlags {
        OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX
    }

    fn as_path(&self) -> Option<&Path> {
        match self {
            SqlitePath::File(path) => Some(path.as_path()),
            SqlitePath::Memory => None,
        }
    }
}

/// Pool and encryption settings for [`SqliteStore`].
#[derive(Clone)]
pub struct SqliteConfig {
    pub path: SqlitePath,
    pub pool_size: u32,
    pub busy_timeout: Duration,
    pub key_resolver: Arc<dyn KeyResolver>,
}

impl SqliteConfig {
    /// Private in-memory database with a single pooled connection.
    pub fn memory() -> Self {
        Self {
            path: SqlitePath::Memory,
            pool_size: 1,
            busy_timeout: Duration::from_millis(250),
            key_resolver: Arc::new(EnvKeyResolver),
        }
    }

    /// Database file at `path`, created on first open.
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: SqlitePath::File(path.into()),
            pool_size: 4,
            busy_timeout: Duration::from_millis(250),
            key_resolver: Arc::new(EnvKeyResolver),
        }
    }
}

/// Journal store on a (optionally SQLCipher encrypted) SQLite file. Blocking
/// work runs on the tokio blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    db_path: Option<PathBuf>,
    changes: Arc<watch::Sender<u64>>,
}

impl SqliteStore {
    /// Opens the pool and runs the migrations.
    pub fn bootstrap(config: SqliteConfig) -> Result<Self> {
        let key_material = config.key_resolver.resolve_key()?;
        let key_for_init = key_material.clone();
        let busy_timeout = config.busy_timeout;
        let manager = config.path.to_manager().with_init(move |conn| {
            Self::configure_connection(conn, busy_timeout, key_for_init.as_deref())
        });

        // Every in-memory connection is its own database.
        let pool_size = match config.path {
            SqlitePath::Memory => 1,
            SqlitePath::File(_) => config.pool_size.max(1),
        };
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .context("failed to create journal connection pool")?;

        {
            let mut conn = pool
                .get()
                .context("failed to acquire journal bootstrap connection")?;
            Self::verify_encryption(&mut conn, key_material.as_deref())?;
            Self::run_migrations(&mut conn)?;
        }

        let (changes, _) = watch::channel(0);
        let db_path = config.path.as_path().map(Path::to_path_buf);
        info!(
            target: "session_store",
            path = ?db_path,
            encrypted = key_material.is_some(),
            "journal store ready"
        );

        Ok(Self {
            pool,
            db_path,
            changes: Arc::new(changes),
        })
    }

    /// Borrows a pooled connection, already keyed and configured.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|err| anyhow!("failed to obtain journal connection: {err}"))
    }

    fn configure_connection(
        conn: &mut Connection,
        busy_timeout: Duration,
        key: Option<&str>,
    ) -> rusqlite::Result<()> {
        if let Some(value) = key {
            conn.pragma_update(None, "key", value)?;
        }
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        Ok(())
    }

    fn verify_encryption(conn: &mut Connection, key: Option<&str>) -> Result<()> {
        if key.is_none() {
            return Ok(());
        }

        let cipher_version: String = conn
            .pragma_query_value(None, "cipher_version", |row| row.get(0))
            .context("cipher_version pragma unsupported; SQLCipher missing")?;

        if cipher_version.trim().is_empty() {
            return Err(anyhow!("SQLCipher cipher_version returned empty value"));
        }
        Ok(())
    }

    fn run_migrations(conn: &mut Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                owner TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                transcript TEXT NOT NULL CHECK (length(trim(transcript)) > 0),
                emotion TEXT NOT NULL,
                reply_text TEXT NOT NULL,
                reply_audio_ref TEXT
            );

            CREATE INDEX IF NOT EXISTS turns_owner_created
                ON turns(owner, created_at_ms, seq);
            "#,
        )
        .context("failed to run journal migrations")?;
        Ok(())
    }

    /// Validates and inserts one record in its own transaction. The store
    /// assigns the id, the timestamp and the arrival sequence.
    pub fn insert_turn(&self, record: &NewTurnRecord) -> Result<StoredTurn> {
        record.validate()?;

        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .context("failed to open transaction for turn insert")?;

        let id = new_record_id();
        let created_at_ms = now_ms();
        tx.execute(
            "INSERT INTO turns (id, owner, created_at_ms, transcript, emotion, reply_text, reply_audio_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                record.owner,
                created_at_ms,
                record.transcript,
                record.emotion.as_str(),
                record.reply_text,
                record.reply_audio_ref.as_deref(),
            ],
        )
        .context("failed to insert turn record")?;
        let seq = tx.last_insert_rowid();
        tx.commit().context("failed to commit turn insert")?;

        Ok(StoredTurn {
            id,
            seq,
            owner: record.owner.clone(),
            created_at_ms,
            transcript: record.transcript.clone(),
            emotion: record.emotion.clone(),
            reply_text: record.reply_text.clone(),
            reply_audio_ref: record.reply_audio_ref.clone(),
        })
    }

    /// All turns of `owner`, oldest first.
    pub fn list_turns(&self, owner: &str) -> Result<Vec<StoredTurn>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, owner, created_at_ms, transcript, emotion, reply_text, reply_audio_ref
             FROM turns WHERE owner = ?1 ORDER BY created_at_ms ASC, seq ASC",
        )?;
        let mut rows = stmt.query(params![owner])?;
        let mut turns = Vec::new();
        while let Some(row) = rows.next()? {
            turns.push(Self::read_turn(row)?);
        }
        Ok(turns)
    }

    fn read_turn(row: &Row) -> rusqlite::Result<StoredTurn> {
        let emotion: String = row.get("emotion")?;
        Ok(StoredTurn {
            seq: row.get("seq")?,
            id: row.get("id")?,
            owner: row.get("owner")?,
            created_at_ms: row.get("created_at_ms")?,
            transcript: row.get("transcript")?,
            emotion: Emotion::parse(&emotion).unwrap_or(Emotion::Neutral),
            reply_text: row.get("reply_text")?,
            reply_audio_ref: row.get("reply_audio_ref")?,
        })
    }

    /// `None` for in-memory databases.
    pub fn database_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn append(&self, record: NewTurnRecord) -> Result<StoredTurn> {
        let store = self.clone();
        let stored = tokio::task::spawn_blocking(move || store.insert_turn(&record))
            .await
            .context("journal insert task panicked")??;
        debug!(target: "session_store", id = %stored.id, owner = %stored.owner, "turn appended");
        self.changes.send_modify(|version| *version += 1);
        Ok(stored)
    }

    async fn list(&self, owner: &str) -> Result<Vec<StoredTurn>> {
        let store = self.clone();
        let owner = owner.to_string();
        tokio::task::spawn_blocking(move || store.list_turns(&owner))
            .await
            .context("journal query task panicked")?
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
impl SqliteStore {
    pub fn run_migrations_for_tests(conn: &mut Connection) -> Result<()> {
        Self::run_migrations(conn)
    }
}
