//! /stream command - show or switch reply streaming

use super::CommandResult;

pub struct StreamCommand;

impl StreamCommand {
    pub fn execute(args: &str, current: bool) -> CommandResult {
        if args.is_empty() {
            let state = if current { "on" } else { "off" };
            return CommandResult::Message(format!(
                "Streaming is {}.\nSet with: /stream on|off",
                state
            ));
        }
        match parse_switch(args) {
            Some(on) => CommandResult::SetStreaming(on),
            None => CommandResult::Message(format!(
                "Unknown value: '{}'\nValid values: on, off",
                args
            )),
        }
    }
}

fn parse_switch(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
