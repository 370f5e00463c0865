//! The interactive surface of agentchat.
//!
//! - [`config`]: command-line arguments and the action they select
//! - [`commands`]: slash command parsing
//! - [`render`]: terminal output, with or without ANSI styling

mod commands;
mod config;
mod render;

pub use commands::{ChatCommand, DEFAULT_HISTORY_COUNT, help_text, parse_command};
pub use config::{ChatAction, ChatArgs};
pub use render::{PlainTextRenderer, Renderer};
