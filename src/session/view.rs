//! Ordered projection of one owner's journal: the confirmed store snapshot
//! followed by turns the store has not confirmed yet.

use std::collections::HashSet;

use thiserror::Error;

use super::turn::{Turn, TurnId};
use crate::collaborators::HistoryEntry;
use crate::orchestrator::history::entries_from_turns;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("a turn is already being processed")]
    TurnInFlight,
    #[error("no local turn with id {0}")]
    UnknownPlaceholder(String),
}

#[derive(Debug, Clone)]
enum LocalState {
    Pending(Turn),
    Resolved(Turn),
}

#[derive(Debug, Clone)]
struct LocalEntry {
    placeholder_id: TurnId,
    /// Permanent ids already confirmed when the placeholder was inserted.
    baseline: HashSet<String>,
    state: LocalState,
}

impl LocalEntry {
    fn turn(&self) -> &Turn {
        match &self.state {
            LocalState::Pending(turn) | LocalState::Resolved(turn) => turn,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self.state, LocalState::Pending(_))
    }
}

/// The conversation as shown: confirmed turns from the latest snapshot
/// followed by local turns that no snapshot has carried yet.
#[derive(Debug, Default)]
pub struct ConversationView {
    owner: Option<String>,
    confirmed: Vec<Turn>,
    locals: Vec<LocalEntry>,
    /// Permanent ids that have taken over a local turn.
    claimed: HashSet<String>,
}

impl ConversationView {
    pub fn new<S: Into<String>>(owner: S) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Drops everything and starts over for `owner`.
    pub fn reset<S: Into<String>>(&mut self, owner: S) {
        *self = Self::new(owner);
    }

    /// Id of the placeholder waiting for a reply, if any.
    pub fn pending_id(&self) -> Option<&TurnId> {
        self.locals
            .iter()
            .find(|entry| entry.is_pending())
            .map(|entry| &entry.placeholder_id)
    }

    pub fn has_pending(&self) -> bool {
        self.pending_id().is_some()
    }

    /// Appends the optimistic placeholder and returns its temporary id.
    pub fn begin_pending(&mut self, owner: &str, now_ms: i64) -> Result<TurnId, ViewError> {
        if self.has_pending() {
            return Err(ViewError::TurnInFlight);
        }
        if self.owner.as_deref() != Some(owner) {
            self.reset(owner);
        }

        let placeholder = Turn::placeholder(owner, now_ms);
        let placeholder_id = placeholder.id.clone();
        self.locals.push(LocalEntry {
            placeholder_id: placeholder_id.clone(),
            baseline: self.confirmed_ids(),
            state: LocalState::Pending(placeholder),
        });
        Ok(placeholder_id)
    }

    /// Replaces the placeholder with the completed turn. The turn stays
    /// visible until a snapshot carries the stored copy.
    pub fn resolve_success(&mut self, placeholder_id: &TurnId, turn: Turn) -> Result<(), ViewError> {
        let index = self.pending_index(placeholder_id)?;
        self.locals[index].state = LocalState::Resolved(turn);
        self.supersede_confirmed();
        Ok(())
    }

    /// Removes the placeholder after a silent or failed turn.
    pub fn discard_pending(&mut self, placeholder_id: &TurnId) -> Result<(), ViewError> {
        let index = self.pending_index(placeholder_id)?;
        self.locals.remove(index);
        Ok(())
    }

    /// Replaces the confirmed list with a full store snapshot.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Turn>) {
        let owner = self.owner.clone();
        let mut seen = HashSet::new();
        let mut confirmed: Vec<Turn> = snapshot
            .into_iter()
            .filter(|turn| !turn.is_pending() && !turn.id.is_local())
            .filter(|turn| owner.as_deref().map_or(true, |owner| turn.owner == owner))
            .filter(|turn| seen.insert(turn.id.as_str().to_string()))
            .collect();
        // Stable: snapshot order already breaks timestamp ties by arrival.
        confirmed.sort_by_key(|turn| turn.created_at_ms);
        self.confirmed = confirmed;
        self.supersede_confirmed();
    }

    /// Confirmed turns first, then local ones in submission order.
    pub fn turns(&self) -> Vec<Turn> {
        self.confirmed
            .iter()
            .chain(self.locals.iter().map(LocalEntry::turn))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed turns as collaborator history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        entries_from_turns(
            self.confirmed
                .iter()
                .chain(self.locals.iter().map(LocalEntry::turn)),
        )
    }

    fn pending_index(&self, placeholder_id: &TurnId) -> Result<usize, ViewError> {
        self.locals
            .iter()
            .position(|entry| entry.is_pending() && &entry.placeholder_id == placeholder_id)
            .ok_or_else(|| ViewError::UnknownPlaceholder(placeholder_id.to_string()))
    }

    fn confirmed_ids(&self) -> HashSet<String> {
        self.confirmed
            .iter()
            .map(|turn| turn.id.as_str().to_string())
            .collect()
    }

    fn supersede_confirmed(&mut self) {
        let confirmed = &self.confirmed;
        let claimed = &mut self.claimed;
        self.locals.retain(|entry| {
            let LocalState::Resolved(local) = &entry.state else {
                return true;
            };
            let stored = confirmed.iter().find(|candidate| {
                let id = candidate.id.as_str();
                !entry.baseline.contains(id)
                    && !claimed.contains(id)
                    && candidate.owner == local.owner
                    && candidate.user_text == local.user_text
                    && candidate.reply_text == local.reply_text
            });
            match stored {
                Some(stored) => {
                    claimed.insert(stored.id.as_str().to_string());
                    false
                }
                None => true,
            }
        });
    }
}
