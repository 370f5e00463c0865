//! Slash command parsing for the chat application.
//!
//! Lines starting with `/` control the session and are never sent to the
//! API.

use crate::export::ExportFormat;
use crate::models::ReasoningEffort;

/// Messages shown by `/history` when no count is given.
pub const DEFAULT_HISTORY_COUNT: usize = 5;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Show the last `n` messages.
    History(usize),

    /// Search the conversation for a term.
    Search(String),

    /// Display conversation statistics.
    Stats,

    /// Show the current configuration.
    ShowConfig,

    /// Export the conversation.
    Export(ExportFormat),

    /// Clear the conversation history.
    Clear,

    /// List files available for `{name}` inclusion.
    Files,

    /// Show everything known about the agent.
    Info,

    /// Set and persist the reasoning effort.
    Effort(ReasoningEffort),

    /// Set and persist the sampling temperature.
    Temperature(f64),

    /// Turn streaming on or off and persist it.
    Stream(bool),

    /// Set or clear the system prompt.
    /// `None` clears the current system prompt.
    System(Option<String>),

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a message.
///
/// # Examples
///
/// ```
/// # use agentchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/export md").is_some());
/// assert!(parse_command("Summarize {notes.txt}").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "help" | "?" => ChatCommand::Help,
        "history" => match argument {
            Some(arg) => match arg.parse::<usize>() {
                Ok(n) => ChatCommand::History(n),
                Err(_) => ChatCommand::Invalid("/history expects a number".to_string()),
            },
            None => ChatCommand::History(DEFAULT_HISTORY_COUNT),
        },
        "search" => match argument {
            Some(term) => ChatCommand::Search(term.to_string()),
            None => ChatCommand::Invalid("Usage: /search <term>".to_string()),
        },
        "stats" => ChatCommand::Stats,
        "config" => ChatCommand::ShowConfig,
        "export" => match argument {
            Some(arg) => match arg.parse::<ExportFormat>() {
                Ok(format) => ChatCommand::Export(format),
                Err(_) => ChatCommand::Invalid(
                    "Invalid format. Use: json, txt, md, or html".to_string(),
                ),
            },
            None => ChatCommand::Invalid("Usage: /export <json|txt|md|html>".to_string()),
        },
        "clear" => ChatCommand::Clear,
        "files" => ChatCommand::Files,
        "info" => ChatCommand::Info,
        "effort" => match argument {
            Some(arg) => match arg.parse::<ReasoningEffort>() {
                Ok(effort) => ChatCommand::Effort(effort),
                Err(_) => ChatCommand::Invalid("/effort expects low, medium, or high".to_string()),
            },
            None => ChatCommand::Invalid("/effort requires a value".to_string()),
        },
        "temperature" => match argument {
            Some(arg) => match parse_f64_in_range(arg, 0.0, 2.0) {
                Ok(value) => ChatCommand::Temperature(value),
                Err(err) => ChatCommand::Invalid(format!("/temperature {err}")),
            },
            None => ChatCommand::Invalid("/temperature requires a value".to_string()),
        },
        "stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Stream(value),
            None => ChatCommand::Invalid("/stream expects 'on' or 'off'".to_string()),
        },
        "system" => ChatCommand::System(argument.map(|s| s.to_string())),
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_f64_in_range(value: &str, min: f64, max: f64) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /help                  Show this help message
  /history [n]           Show the last n messages (default 5)
  /search <term>         Search conversation history
  /stats                 Show conversation statistics
  /config                Show current configuration
  /export <fmt>          Export conversation (json, txt, md, html)
  /clear                 Clear conversation history
  /files                 List files available for inclusion
  /info                  Show agent information
  /effort <level>        Set reasoning effort (low, medium, high)
  /temperature <v>       Set temperature 0.0-2.0
  /stream on|off         Turn streaming on or off
  /system [prompt]       Set system prompt (no argument clears it)
  /quit                  Exit the chat

Use {filename} in a message to include that file's contents."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_history() {
        assert_eq!(parse_command("/history"), Some(ChatCommand::History(5)));
        assert_eq!(parse_command("/history 12"), Some(ChatCommand::History(12)));
        assert!(matches!(
            parse_command("/history lots"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("number")
        ));
    }

    #[test]
    fn parse_search_keeps_spaces() {
        assert_eq!(
            parse_command("/search rate limit"),
            Some(ChatCommand::Search("rate limit".to_string()))
        );
        assert!(matches!(
            parse_command("/search"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("Usage")
        ));
    }

    #[test]
    fn parse_export() {
        assert_eq!(
            parse_command("/export HTML"),
            Some(ChatCommand::Export(ExportFormat::Html))
        );
        assert!(matches!(
            parse_command("/export pdf"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("Invalid format")
        ));
        assert!(matches!(
            parse_command("/export"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_effort() {
        assert_eq!(
            parse_command("/effort high"),
            Some(ChatCommand::Effort(ReasoningEffort::High))
        );
        assert!(matches!(
            parse_command("/effort extreme"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_temperature() {
        assert_eq!(
            parse_command("/temperature 1.5"),
            Some(ChatCommand::Temperature(1.5))
        );
        assert!(matches!(
            parse_command("/temperature 2.5"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("between")
        ));
        assert!(matches!(
            parse_command("/temperature"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn parse_stream_toggle() {
        assert_eq!(parse_command("/stream on"), Some(ChatCommand::Stream(true)));
        assert_eq!(parse_command("/stream off"), Some(ChatCommand::Stream(false)));
        assert!(matches!(
            parse_command("/stream maybe"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
    }

    #[test]
    fn parse_system() {
        assert_eq!(
            parse_command("/system You are a careful reviewer"),
            Some(ChatCommand::System(Some(
                "You are a careful reviewer".to_string()
            )))
        );
        assert_eq!(parse_command("/system"), Some(ChatCommand::System(None)));
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/config"), Some(ChatCommand::ShowConfig));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/files"), Some(ChatCommand::Files));
        assert_eq!(parse_command("/info"), Some(ChatCommand::Info));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model gpt-5"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello there"), None);
        assert_eq!(parse_command("Explain {main.rs}"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/export"));
        assert!(help.contains("{filename}"));
    }
}
