//! Slash commands for interactive mode

mod history;
mod stream;

pub use history::HistoryCommand;
pub use stream::StreamCommand;

use tally_assistant::Assistant;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Clear the conversation
    Clear,
    /// Ask for a summary of the conversation
    Summary,
    /// Turn streaming on or off
    SetStreaming(bool),
    /// Show a message to the user (not sent to the assistant)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, assistant: &Assistant) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "summary" | "sum" => CommandResult::Summary,

        "history" | "hist" => HistoryCommand::execute(args, assistant),

        "stream" => StreamCommand::execute(args, assistant.config().streaming),

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /summary, /sum         Summarize the conversation so far
  /history, /hist [n]    List messages (only the last n if given)
  /stream [on|off]       Show or switch reply streaming
  /clear, /c             Clear conversation history
  /quit, /exit, /q       Exit tally

Press Ctrl-C while a reply is arriving to cancel it."#
        .to_string()
}
