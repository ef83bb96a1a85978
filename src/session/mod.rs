//! Journal session: one owner's conversation, the recordings submitted to it,
//! and the store feed that keeps it current.

pub mod lifecycle;
pub mod settings;
mod summary;
mod turn;
mod view;

pub use lifecycle::{NoticeLevel, SessionNotice, TurnLifecyclePhase, TurnLifecycleUpdate};
pub use settings::{ClientSettings, SettingsError, SUPPORTED_LANGUAGES};
pub use summary::{Summarizer, SummaryError, NOTHING_TO_SUMMARIZE};
pub use turn::{Turn, TurnId, PLACEHOLDER_TEXT};
pub use view::{ConversationView, ViewError};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::AudioPayload;
use crate::orchestrator::{ResponseMode, TurnError, TurnOrchestrator, TurnOutcome, TurnRequest};
use crate::persistence::{now_ms, SessionStore, Subscription, SubscriptionCanceller};

const NOTICE_CHANNEL_CAPACITY: usize = 32;
const LIFECYCLE_CHANNEL_CAPACITY: usize = 32;

struct FeedTask {
    owner: String,
    canceller: SubscriptionCanceller,
    handle: JoinHandle<()>,
}

/// Clears the in-flight flag however the turn ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Client-side journal for the current owner. Keeps the visible
/// conversation in step with the store; at most one turn is in flight.
pub struct JournalSession {
    orchestrator: Arc<TurnOrchestrator>,
    store: Arc<dyn SessionStore>,
    summarizer: Summarizer,
    settings: Mutex<ClientSettings>,
    settings_path: Option<PathBuf>,
    view: Arc<Mutex<ConversationView>>,
    processing: AtomicBool,
    notice_tx: broadcast::Sender<SessionNotice>,
    lifecycle_tx: broadcast::Sender<TurnLifecycleUpdate>,
    turns_tx: Arc<watch::Sender<Vec<Turn>>>,
    feed: Mutex<Option<FeedTask>>,
}

impl JournalSession {
    /// The snapshot feed is not started until [`JournalSession::start`].
    pub fn new(
        orchestrator: Arc<TurnOrchestrator>,
        store: Arc<dyn SessionStore>,
        summarizer: Summarizer,
        settings: ClientSettings,
    ) -> Self {
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        let (turns_tx, _) = watch::channel(Vec::new());
        let view = ConversationView::new(settings.device_id.clone());
        Self {
            orchestrator,
            store,
            summarizer,
            settings: Mutex::new(settings),
            settings_path: None,
            view: Arc::new(Mutex::new(view)),
            processing: AtomicBool::new(false),
            notice_tx,
            lifecycle_tx,
            turns_tx: Arc::new(turns_tx),
            feed: Mutex::new(None),
        }
    }

    /// Settings changes are written back to `path`.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notice_tx.subscribe()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<TurnLifecycleUpdate> {
        self.lifecycle_tx.subscribe()
    }

    /// Latest visible conversation, placeholder included.
    pub fn watch_turns(&self) -> watch::Receiver<Vec<Turn>> {
        self.turns_tx.subscribe()
    }

    pub async fn turns(&self) -> Vec<Turn> {
        self.view.lock().await.turns()
    }

    pub async fn settings(&self) -> ClientSettings {
        self.settings.lock().await.clone()
    }

    /// True while a recording is being turned into a reply.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Opens the store feed for the current owner. Calling it again while a
    /// feed for the same owner runs is a no-op.
    pub async fn start(&self) {
        let owner = self.settings.lock().await.device_id.trim().to_string();
        if owner.is_empty() {
            warn!(target: "journal_session", "no owner identity; journal feed not started");
            return;
        }

        let mut feed = self.feed.lock().await;
        if let Some(task) = feed.as_ref() {
            if task.owner == owner && !task.handle.is_finished() {
                return;
            }
        }
        if let Some(task) = feed.take() {
            Self::stop_feed(task).await;
        }

        {
            let mut view = self.view.lock().await;
            if view.owner() != Some(owner.as_str()) {
                view.reset(owner.clone());
                self.turns_tx.send_replace(view.turns());
            }
        }

        let subscription = Subscription::open(Arc::clone(&self.store), owner.clone());
        let canceller = subscription.canceller();
        let handle = tokio::spawn(run_feed(
            subscription,
            Arc::clone(&self.view),
            Arc::clone(&self.turns_tx),
            self.notice_tx.clone(),
        ));
        info!(target: "journal_session", %owner, "journal feed started");
        *feed = Some(FeedTask {
            owner,
            canceller,
            handle,
        });
    }

    /// Switches the journal to another owner identity.
    pub async fn set_owner<S: Into<String>>(&self, owner: S) -> Result<(), SettingsError> {
        let owner = owner.into();
        self.update_settings(|settings| settings.device_id = owner.clone())
            .await?;
        if let Some(task) = self.feed.lock().await.take() {
            Self::stop_feed(task).await;
        }
        {
            let mut view = self.view.lock().await;
            view.reset(owner.clone());
            self.turns_tx.send_replace(view.turns());
        }
        self.start().await;
        Ok(())
    }

    /// Updates the language and saves the settings when a path is set.
    pub async fn set_language<S: Into<String>>(&self, language: S) -> Result<(), SettingsError> {
        let language = language.into();
        self.update_settings(|settings| settings.language = language)
            .await
    }

    pub async fn set_response_mode(&self, mode: ResponseMode) -> Result<(), SettingsError> {
        self.update_settings(|settings| settings.response_mode = mode)
            .await
    }

    async fn update_settings<F>(&self, apply: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut ClientSettings),
    {
        let mut settings = self.settings.lock().await;
        apply(&mut settings);
        if let Some(path) = &self.settings_path {
            settings.save(path)?;
        }
        Ok(())
    }

    /// Stops the feed and waits for background writes to land.
    pub async fn shutdown(&self) {
        if let Some(task) = self.feed.lock().await.take() {
            Self::stop_feed(task).await;
        }
        self.orchestrator.flush_writes().await;
        let owner = self.settings.lock().await.device_id.clone();
        let _ = self.lifecycle_tx.send(TurnLifecycleUpdate::idle(owner));
        info!(target: "journal_session", "journal session shut down");
    }

    async fn stop_feed(task: FeedTask) {
        task.canceller.cancel();
        if let Err(err) = task.handle.await {
            warn!(target: "journal_session", owner = %task.owner, %err, "journal feed task aborted");
        }
        debug!(target: "journal_session", owner = %task.owner, "journal feed stopped");
    }

    /// Runs one finished recording through the orchestrator. Only one
    /// recording is processed at a time; a second one is rejected with
    /// [`TurnError::Busy`].
    pub async fn submit_recording(
        &self,
        audio: Option<AudioPayload>,
    ) -> Result<TurnOutcome, TurnError> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.notify(SessionNotice::busy());
            return Err(TurnError::Busy);
        }
        let _guard = ProcessingGuard(&self.processing);

        let settings = self.settings.lock().await.clone();
        let owner = settings.device_id.trim().to_string();
        if owner.is_empty() {
            self.notify(SessionNotice::missing_identity());
            self.publish_lifecycle(TurnLifecycleUpdate::failed(
                owner,
                None,
                TurnError::MissingIdentity.to_string(),
            ));
            return Err(TurnError::MissingIdentity);
        }
        let audio = match audio {
            Some(audio) if !audio.is_empty() => audio,
            _ => {
                self.notify(SessionNotice::turn_failed());
                self.publish_lifecycle(TurnLifecycleUpdate::failed(
                    owner,
                    None,
                    TurnError::MissingAudio.to_string(),
                ));
                return Err(TurnError::MissingAudio);
            }
        };

        let (placeholder_id, history) = {
            let mut view = self.view.lock().await;
            let placeholder_id = view
                .begin_pending(&owner, now_ms())
                .map_err(|_| TurnError::Busy)?;
            self.turns_tx.send_replace(view.turns());
            (placeholder_id, view.history())
        };
        self.publish_lifecycle(TurnLifecycleUpdate::processing(
            owner.clone(),
            placeholder_id.clone(),
        ));

        let request = TurnRequest {
            owner_id: owner.clone(),
            audio: Some(audio),
            language: settings.language.clone(),
            response_mode: settings.response_mode,
            history,
        };
        let result = self.orchestrator.process_turn(request).await;

        let mut view = self.view.lock().await;
        let reconciled = match &result {
            Ok(TurnOutcome::Completed(completed)) => {
                let turn_id = completed.turn.id.clone();
                let resolved = view.resolve_success(&placeholder_id, completed.turn.clone());
                if completed.narration_error.is_some() {
                    self.notify(SessionNotice::narration_failed());
                }
                self.publish_lifecycle(TurnLifecycleUpdate::completed(owner.clone(), turn_id));
                resolved
            }
            Ok(TurnOutcome::Silent) => {
                self.notify(SessionNotice::silent_turn());
                self.publish_lifecycle(TurnLifecycleUpdate::silent(
                    owner.clone(),
                    placeholder_id.clone(),
                ));
                view.discard_pending(&placeholder_id)
            }
            Err(err) => {
                self.notify(SessionNotice::turn_failed());
                self.publish_lifecycle(TurnLifecycleUpdate::failed(
                    owner.clone(),
                    Some(placeholder_id.clone()),
                    err.to_string(),
                ));
                view.discard_pending(&placeholder_id)
            }
        };
        if let Err(err) = reconciled {
            // The owner changed while the turn was in flight.
            debug!(target: "journal_session", %owner, %err, "placeholder no longer in view");
        }
        self.turns_tx.send_replace(view.turns());

        result
    }

    /// Summarizes the conversation currently in view.
    pub async fn summarize(&self) -> Result<String, SummaryError> {
        let turns = self.view.lock().await.turns();
        let result = self.summarizer.summarize(&turns).await;
        if result.is_err() {
            self.notify(SessionNotice::summary_failed());
        }
        result
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notice_tx.send(notice);
    }

    fn publish_lifecycle(&self, update: TurnLifecycleUpdate) {
        let _ = self.lifecycle_tx.send(update);
    }
}

async fn run_feed(
    mut subscription: Subscription,
    view: Arc<Mutex<ConversationView>>,
    turns_tx: Arc<watch::Sender<Vec<Turn>>>,
    notice_tx: broadcast::Sender<SessionNotice>,
) {
    while let Some(snapshot) = subscription.next().await {
        match snapshot {
            Ok(stored) => {
                let count = stored.len();
                let mut view = view.lock().await;
                if view.owner() != Some(subscription.owner()) {
                    break;
                }
                view.apply_snapshot(stored.into_iter().map(Turn::from).collect());
                turns_tx.send_replace(view.turns());
                debug!(target: "journal_session", owner = %subscription.owner(), count, "snapshot applied");
            }
            Err(err) => {
                warn!(target: "journal_session", owner = %subscription.owner(), error = %format!("{err:#}"), "journal snapshot failed");
                let _ = notice_tx.send(SessionNotice::connection_error());
            }
        }
    }
}
