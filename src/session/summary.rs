use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

use super::turn::Turn;
use crate::collaborators::ConversationSummarizer;
use crate::orchestrator::history::entries_from_turns;
use crate::telemetry::events::record_summary_generated;

pub const NOTHING_TO_SUMMARIZE: &str =
    "There's nothing to summarize yet. Start a conversation first.";

const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryError {
    #[error("summary generation failed: {0}")]
    Failed(String),
    #[error("summary generation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Reduces a whole conversation to one narrative summary. Nothing is cached;
/// every call goes back to the collaborator.
pub struct Summarizer {
    collaborator: Arc<dyn ConversationSummarizer>,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(collaborator: Arc<dyn ConversationSummarizer>) -> Self {
        Self::with_timeout(collaborator, DEFAULT_SUMMARY_TIMEOUT)
    }

    pub fn with_timeout(collaborator: Arc<dyn ConversationSummarizer>, timeout: Duration) -> Self {
        Self {
            collaborator,
            timeout,
        }
    }

    pub async fn summarize(&self, turns: &[Turn]) -> Result<String, SummaryError> {
        let entries = entries_from_turns(turns);
        if entries.is_empty() {
            return Ok(NOTHING_TO_SUMMARIZE.to_string());
        }

        let started = Instant::now();
        let summary = tokio::time::timeout(self.timeout, self.collaborator.summarize(&entries))
            .await
            .map_err(|_| SummaryError::TimedOut(self.timeout))?
            .map_err(|err| {
                warn!(target: "journal_session", %err, "summary collaborator failed");
                SummaryError::Failed(err.to_string())
            })?;
        record_summary_generated(entries.len(), started.elapsed());
        Ok(summary.trim().to_string())
    }
}
