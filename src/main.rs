use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use innersight_core::collaborators::gemini::GeminiClient;
use innersight_core::dirs_compat;
use innersight_core::persistence::MemoryStore;
use innersight_core::session::{ClientSettings, SUPPORTED_LANGUAGES};
use innersight_core::telemetry::init_tracing;
use innersight_core::{
    AudioPayload, JournalSession, Recorder, RecorderConfig, ResponseMode, SessionStore,
    Summarizer, TurnConfig, TurnOrchestrator, TurnOutcome,
};
use tracing::{info, warn};

const USAGE: &str = "usage: innersight <record FILE.wav...|history|summarize|settings [language TAG|mode voice|text]>";
const CHUNK_FRAMES: usize = 1_600;
const FEED_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!(USAGE);
    };

    let settings_path = ClientSettings::default_path()?;
    let settings = ClientSettings::load_or_init(&settings_path)?;

    if command == "settings" {
        return update_settings(settings, &settings_path, rest);
    }

    let store = open_store()?;
    if command == "history" {
        return history(store.as_ref(), &settings.device_id).await;
    }

    let client = GeminiClient::from_env()?;
    let orchestrator = Arc::new(TurnOrchestrator::with_gemini(
        TurnConfig::from_env()?,
        client.clone(),
        Arc::clone(&store),
    ));
    let session = JournalSession::new(
        orchestrator,
        Arc::clone(&store),
        Summarizer::new(Arc::new(client)),
        settings,
    )
    .with_settings_path(settings_path);

    let result = match command.as_str() {
        "record" => record(&session, rest).await,
        "summarize" => summarize(&session).await,
        other => Err(anyhow!("unknown command {other}\n{USAGE}")),
    };
    session.shutdown().await;
    result
}

fn open_store() -> Result<Arc<dyn SessionStore>> {
    if std::env::var("INNERSIGHT_STORE").as_deref() == Ok("memory") {
        return Ok(Arc::new(MemoryStore::new()));
    }
    open_file_store()
}

#[cfg(any(feature = "sqlite-persistence", feature = "sqlcipher-persistence"))]
fn open_file_store() -> Result<Arc<dyn SessionStore>> {
    use innersight_core::persistence::sqlite::{SqliteConfig, SqliteStore};

    let dir = dirs_compat::data_dir().ok_or_else(|| anyhow!("no data directory available"))?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    let store = SqliteStore::bootstrap(SqliteConfig::file(dir.join("journal.db")))?;
    Ok(Arc::new(store))
}

#[cfg(not(any(feature = "sqlite-persistence", feature = "sqlcipher-persistence")))]
fn open_file_store() -> Result<Arc<dyn SessionStore>> {
    warn!(target: "journal_session", "built without sqlite support; journal is kept in memory");
    Ok(Arc::new(MemoryStore::new()))
}

async fn record(session: &JournalSession, files: &[String]) -> Result<()> {
    if files.is_empty() {
        bail!("record needs at least one WAV file");
    }
    session.start().await;
    let mut notices = session.subscribe_notices();

    for file in files {
        let payload = capture_file(Path::new(file))?;
        match session.submit_recording(payload).await {
            Ok(TurnOutcome::Completed(completed)) => {
                let turn = completed.turn;
                println!("you ({}): {}", turn.emotion, turn.user_text);
                println!("chacha: {}", turn.reply_text);
                if turn.has_audio() {
                    println!("(voice reply attached)");
                }
            }
            Ok(TurnOutcome::Silent) => {}
            Err(err) => warn!(target: "journal_session", file = %file, %err, "turn failed"),
        }
        while let Ok(notice) = notices.try_recv() {
            eprintln!("{}: {}", notice.title, notice.message);
        }
    }
    Ok(())
}

/// Replays a WAV file through the recorder as if it were captured live.
fn capture_file(path: &Path) -> Result<Option<AudioPayload>> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("failed to read integer samples")?
        }
    };

    let mut recorder = Recorder::new(RecorderConfig {
        sample_rate_hz: spec.sample_rate,
        channels: spec.channels,
        ..RecorderConfig::default()
    });
    recorder.start()?;
    for chunk in samples.chunks(CHUNK_FRAMES * spec.channels.max(1) as usize) {
        recorder.push_chunk(chunk)?;
    }
    info!(target: "recorder", file = %path.display(), captured = ?recorder.captured(), "file captured");
    Ok(recorder.stop()?)
}

async fn history(store: &dyn SessionStore, owner: &str) -> Result<()> {
    for turn in store.list(owner).await? {
        println!("[{}] you ({}): {}", turn.created_at_ms, turn.emotion, turn.transcript);
        println!("[{}] chacha: {}", turn.created_at_ms, turn.reply_text);
    }
    Ok(())
}

async fn summarize(session: &JournalSession) -> Result<()> {
    let mut turns = session.watch_turns();
    session.start().await;
    if tokio::time::timeout(FEED_WAIT, turns.changed()).await.is_err() {
        warn!(target: "journal_session", "journal feed slow; summarizing what is loaded");
    }
    println!("{}", session.summarize().await?);
    Ok(())
}

fn update_settings(mut settings: ClientSettings, path: &Path, args: &[String]) -> Result<()> {
    match args {
        [] => {}
        [key, value] if key == "language" => {
            if !ClientSettings::is_supported_language(value) {
                let known: Vec<&str> = SUPPORTED_LANGUAGES.iter().map(|(tag, _)| *tag).collect();
                bail!("unsupported language {value}; expected one of {}", known.join(", "));
            }
            settings.language = value.clone();
            settings.save(path)?;
        }
        [key, value] if key == "mode" => {
            settings.response_mode = ResponseMode::parse(value)
                .ok_or_else(|| anyhow!("unknown response mode {value}; expected voice or text"))?;
            settings.save(path)?;
        }
        _ => bail!(USAGE),
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
