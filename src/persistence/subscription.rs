use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::debug;

use super::{SessionStore, StoredTurn};

/// The full ordered set of an owner's turns at one point in time.
pub type Snapshot = Vec<StoredTurn>;

/// Lazy feed of full snapshots for one owner. Nothing is queried until the
/// first `next`; afterwards every store change yields a fresh snapshot.
pub struct Subscription {
    store: Arc<dyn SessionStore>,
    owner: String,
    changes: watch::Receiver<u64>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    primed: bool,
}

/// Ends a subscription from another task.
#[derive(Clone)]
pub struct SubscriptionCanceller {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl SubscriptionCanceller {
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// True once the subscription was cancelled or dropped.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl Subscription {
    /// Opens a feed for `owner`. No snapshot is read yet.
    pub fn open<S: Into<String>>(store: Arc<dyn SessionStore>, owner: S) -> Self {
        let changes = store.changes();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            store,
            owner: owner.into(),
            changes,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            primed: false,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Handle that can end this feed from another task.
    pub fn canceller(&self) -> SubscriptionCanceller {
        SubscriptionCanceller {
            cancel_tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Ends the feed. A pending `next` resolves to `None`.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// True after `cancel`, after any canceller fired, or once dropped.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Makes the next call redeliver the current snapshot without waiting for
    /// a change.
    pub fn restart(&mut self) {
        self.primed = false;
    }

    /// Returns `None` once cancelled or when the store goes away.
    pub async fn next(&mut self) -> Option<Result<Snapshot>> {
        if self.is_cancelled() {
            return None;
        }

        if self.primed {
            let closed = tokio::select! {
                changed = self.changes.changed() => changed.is_err(),
                _ = self.cancel_rx.changed() => true,
            };
            if closed || self.is_cancelled() {
                debug!(target: "session_store", owner = %self.owner, "snapshot feed ended");
                return None;
            }
        } else {
            let _ = self.changes.borrow_and_update();
            self.primed = true;
        }

        Some(self.store.list(&self.owner).await)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
    }
}
