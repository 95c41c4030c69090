//! Incremental terminal output for an assistant reply

use std::io::{self, Write};

use tally_ai::ReferencedTransaction;
use tally_assistant::{ConversationMessage, Snapshot};
use uuid::Uuid;

use crate::utils::truncate_chars;

/// Prints the newest assistant message as it grows.
///
/// Only the unseen suffix is written on each update. If the text is
/// replaced rather than extended, the full text is printed on a new line.
#[derive(Default)]
pub struct ReplyPrinter {
    message_id: Option<Uuid>,
    content: String,
    thinking: String,
    show_thinking: bool,
}

impl ReplyPrinter {
    pub fn new(show_thinking: bool) -> Self {
        Self {
            show_thinking,
            ..Default::default()
        }
    }

    /// Treat the last message of `snapshot` as already on screen
    pub fn mark_seen(&mut self, snapshot: &Snapshot) {
        if let Some(message) = snapshot.messages.last() {
            self.message_id = Some(message.id);
            self.content = message.content.clone();
            self.thinking = message.thinking.clone().unwrap_or_default();
        }
    }

    /// Render whatever changed in the last message of `snapshot`
    pub fn update(&mut self, snapshot: &Snapshot, out: &mut impl Write) -> io::Result<()> {
        let Some(message) = snapshot.messages.last().filter(|m| !m.is_user()) else {
            return Ok(());
        };

        if self.message_id != Some(message.id) {
            self.message_id = Some(message.id);
            self.content.clear();
            self.thinking.clear();
        }

        if self.show_thinking && self.content.is_empty() {
            let thinking = message.thinking.as_deref().unwrap_or("");
            write_suffix(out, thinking, &mut self.thinking)?;
        }

        if !message.content.is_empty() && self.content.is_empty() && !self.thinking.is_empty() {
            writeln!(out)?;
            writeln!(out)?;
        }
        write_suffix(out, &message.content, &mut self.content)?;
        out.flush()
    }

    /// Finish the reply: newline plus any cited transactions
    pub fn finish(&mut self, message: &ConversationMessage, out: &mut impl Write) -> io::Result<()> {
        if self.message_id != Some(message.id) {
            writeln!(out, "{}", message.content)?;
        } else {
            writeln!(out)?;
        }
        if let Some(references) = message.references.as_deref().filter(|r| !r.is_empty()) {
            writeln!(out)?;
            writeln!(out, "Referenced transactions:")?;
            for reference in references {
                writeln!(out, "  {}", format_reference(reference))?;
            }
        }
        out.flush()
    }
}

fn write_suffix(out: &mut impl Write, text: &str, printed: &mut String) -> io::Result<()> {
    if text == printed.as_str() {
        return Ok(());
    }
    match text.strip_prefix(printed.as_str()) {
        Some(suffix) => write!(out, "{}", suffix)?,
        None => write!(out, "\n{}", text)?,
    }
    *printed = text.to_string();
    Ok(())
}

/// One-line description of a cited transaction
pub fn format_reference(reference: &ReferencedTransaction) -> String {
    let when = reference
        .time_text
        .clone()
        .or_else(|| {
            chrono::DateTime::from_timestamp(reference.time, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        })
        .unwrap_or_default();

    let mut line = format!(
        "{} {} {}",
        when,
        reference.transaction_type.label(),
        reference.amount_text()
    );
    if let Some(category) = reference.category_name.as_deref() {
        line.push_str(&format!(" [{}]", category));
    }
    match (
        reference.source_account_name.as_deref(),
        reference.destination_account_name.as_deref(),
    ) {
        (Some(from), Some(to)) => line.push_str(&format!(" {} -> {}", from, to)),
        (Some(account), None) | (None, Some(account)) => line.push_str(&format!(" {}", account)),
        (None, None) => {}
    }
    if let Some(comment) = reference.comment.as_deref().filter(|c| !c.is_empty()) {
        line.push_str(&format!(" \"{}\"", truncate_chars(comment, 40)));
    }
    line
}
