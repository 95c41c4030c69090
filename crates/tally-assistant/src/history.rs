//! Bounded conversation context for follow-up requests.

use tally_ai::HistoryItem;

use crate::conversation::ConversationMessage;

/// How many trailing messages are considered as context
pub const HISTORY_WINDOW: usize = 12;

/// Project the last `window` messages into history items.
///
/// Only the trailing `window` entries are scanned; messages with empty
/// content are then dropped, so fewer than `window` items may come back.
pub fn build_history(messages: &[ConversationMessage], window: usize) -> Vec<HistoryItem> {
    let start = messages.len().saturating_sub(window);
    messages[start..]
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| HistoryItem::new(m.role, m.content.clone()))
        .collect()
}
