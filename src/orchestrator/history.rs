//! Conversation history as handed to the reply and summary collaborators.

use crate::collaborators::HistoryEntry;
use crate::session::Turn;

/// Flattens turns into alternating user/model entries, oldest first. Pending
/// placeholders and empty contents are skipped.
pub fn entries_from_turns<'a, I>(turns: I) -> Vec<HistoryEntry>
where
    I: IntoIterator<Item = &'a Turn>,
{
    turns
        .into_iter()
        .filter(|turn| !turn.is_pending())
        .flat_map(|turn| {
            [
                HistoryEntry::user(turn.user_text.clone()),
                HistoryEntry::model(turn.reply_text.clone()),
            ]
        })
        .filter(|entry| !entry.content.trim().is_empty())
        .collect()
}

/// Renders entries as `user: …` / `model: …` lines.
pub fn format_history(entries: &[HistoryEntry]) -> String {
    entries
        .iter()
        .filter(|entry| !entry.content.trim().is_empty())
        .map(|entry| format!("{}: {}", entry.role.as_str(), entry.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
