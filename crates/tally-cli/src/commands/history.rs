//! /history command - list the conversation so far

use super::CommandResult;
use crate::utils::truncate_chars;
use tally_assistant::Assistant;

pub struct HistoryCommand;

impl HistoryCommand {
    /// List every message, or only the last `n` when given a number
    pub fn execute(args: &str, assistant: &Assistant) -> CommandResult {
        let messages = assistant.messages();
        if messages.is_empty() {
            return CommandResult::Message("No messages yet.".to_string());
        }

        let skip = if args.is_empty() {
            0
        } else {
            match args.parse::<usize>() {
                Ok(n) => messages.len().saturating_sub(n),
                Err(_) => {
                    return CommandResult::Message(format!(
                        "Invalid count '{}'. Use a number or no argument.",
                        args
                    ));
                }
            }
        };

        let mut output = String::from("Messages in conversation:\n");
        for (i, message) in messages.iter().enumerate().skip(skip) {
            let text = if message.content.is_empty() {
                "(no reply)".to_string()
            } else {
                truncate_chars(&message.content.replace('\n', " "), 60)
            };
            output.push_str(&format!("  {}: [{}] {}", i, message.role.as_str(), text));
            if let Some(references) = message.references.as_ref().filter(|r| !r.is_empty()) {
                output.push_str(&format!(" ({} referenced)", references.len()));
            }
            output.push('\n');
        }
        output.push_str(&format!(
            "\n{} of the last {} messages are sent as context.",
            assistant.history().len(),
            assistant.config().history_window
        ));
        CommandResult::Message(output)
    }
}
