//! Command-line arguments for the chat application.
//!
//! Arguments are parsed with `arrrg` and resolved into a [`ChatAction`]
//! plus the per-run [`ConfigOverrides`] applied to every turn.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::config::ConfigOverrides;
use crate::error::{Error, Result};
use crate::export::ExportFormat;
use crate::models::{self, ReasoningEffort};

/// Command-line arguments for the agentchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// The agent to chat with.
    #[arrrg(optional, "Agent ID for the chat session", "ID")]
    pub agent_id: Option<String>,

    /// Model to use; replaces the agent's configured model.
    #[arrrg(optional, "Model to use (gpt-5, gpt-5-mini, gpt-5-nano)", "MODEL")]
    pub model: Option<String>,

    /// Directory holding `agents/`.
    #[arrrg(optional, "Workspace directory (default: .)", "DIR")]
    pub workspace: Option<String>,

    /// List every agent and exit.
    #[arrrg(flag, "List all available agents")]
    pub list: bool,

    /// Show one agent and exit.
    #[arrrg(optional, "Show detailed information for agent", "ID")]
    pub info: Option<String>,

    /// Run the configuration wizard and exit.
    #[arrrg(flag, "Configure agent interactively")]
    pub config: bool,

    /// Reasoning effort for this run.
    #[arrrg(optional, "Override reasoning effort (low, medium, high)", "LEVEL")]
    pub effort: Option<String>,

    /// Temperature for this run.
    #[arrrg(optional, "Override temperature (0.0-2.0)", "TEMP")]
    pub temperature: Option<String>,

    /// Disable streaming for this run.
    #[arrrg(flag, "Disable streaming")]
    pub no_stream: bool,

    /// Export the conversation and exit.
    #[arrrg(optional, "Export conversation (json, txt, md, html)", "FORMAT")]
    pub export: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// What a single invocation does.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    /// Print the agent listing.
    List,
    /// Print one agent's details.
    Info(String),
    /// Run the config wizard for an agent.
    Configure(String),
    /// Export an agent's conversation.
    Export(String, ExportFormat),
    /// Chat interactively with an agent.
    Chat(String),
}

impl ChatArgs {
    /// The workspace directory, defaulting to the current directory.
    pub fn workspace(&self) -> PathBuf {
        PathBuf::from(self.workspace.as_deref().unwrap_or("."))
    }

    /// Whether to style output.
    pub fn use_color(&self) -> bool {
        !self.no_color
    }

    /// Resolve the arguments into an action.
    ///
    /// `--list` wins over `--info`, which wins over anything needing an
    /// agent id.
    pub fn action(&self) -> Result<ChatAction> {
        if self.list {
            return Ok(ChatAction::List);
        }
        if let Some(id) = &self.info {
            return Ok(ChatAction::Info(id.clone()));
        }
        let Some(id) = self.agent_id.clone() else {
            return Err(Error::validation(
                "--agent-id is required for chat operations",
                Some("agent_id".to_string()),
            ));
        };
        if let Some(model) = &self.model {
            models::lookup(model)?;
        }
        if self.config {
            return Ok(ChatAction::Configure(id));
        }
        if let Some(format) = &self.export {
            return Ok(ChatAction::Export(id, format.parse()?));
        }
        Ok(ChatAction::Chat(id))
    }

    /// The per-run overrides named on the command line.
    pub fn overrides(&self) -> Result<ConfigOverrides> {
        let mut overrides = ConfigOverrides::default();
        if let Some(effort) = &self.effort {
            overrides = overrides.with_reasoning_effort(effort.parse::<ReasoningEffort>()?);
        }
        if let Some(temperature) = &self.temperature {
            let value = temperature.trim().parse::<f64>().map_err(|_| {
                Error::validation(
                    format!("invalid temperature: {temperature}"),
                    Some("temperature".to_string()),
                )
            })?;
            overrides = overrides.with_temperature(value);
        }
        if self.no_stream {
            overrides = overrides.with_stream(false);
        }
        overrides.validate()?;
        Ok(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(agent_id: &str) -> ChatArgs {
        ChatArgs {
            agent_id: Some(agent_id.to_string()),
            ..ChatArgs::default()
        }
    }

    #[test]
    fn defaults() {
        let args = ChatArgs::default();
        assert_eq!(args.workspace(), PathBuf::from("."));
        assert!(args.use_color());
        assert!(args.overrides().unwrap().is_empty());
    }

    #[test]
    fn chat_requires_agent_id() {
        let err = ChatArgs::default().action().unwrap_err();
        assert!(err.to_string().contains("--agent-id"));
        assert_eq!(args("a").action().unwrap(), ChatAction::Chat("a".to_string()));
    }

    #[test]
    fn list_and_info_need_no_agent() {
        let list = ChatArgs {
            list: true,
            info: Some("x".to_string()),
            ..ChatArgs::default()
        };
        assert_eq!(list.action().unwrap(), ChatAction::List);
        let info = ChatArgs {
            info: Some("x".to_string()),
            ..ChatArgs::default()
        };
        assert_eq!(info.action().unwrap(), ChatAction::Info("x".to_string()));
    }

    #[test]
    fn config_and_export_actions() {
        let configure = ChatArgs {
            config: true,
            ..args("a")
        };
        assert_eq!(
            configure.action().unwrap(),
            ChatAction::Configure("a".to_string())
        );
        let export = ChatArgs {
            export: Some("md".to_string()),
            ..args("a")
        };
        assert_eq!(
            export.action().unwrap(),
            ChatAction::Export("a".to_string(), ExportFormat::Md)
        );
        let bad = ChatArgs {
            export: Some("pdf".to_string()),
            ..args("a")
        };
        assert!(bad.action().is_err());
    }

    #[test]
    fn unsupported_model_is_rejected() {
        let args = ChatArgs {
            model: Some("gpt-4".to_string()),
            ..args("a")
        };
        assert!(args.action().is_err());
    }

    #[test]
    fn overrides_from_flags() {
        let args = ChatArgs {
            effort: Some("high".to_string()),
            temperature: Some("0.3".to_string()),
            no_stream: true,
            ..args("a")
        };
        let overrides = args.overrides().unwrap();
        assert_eq!(overrides.reasoning_effort, Some(ReasoningEffort::High));
        assert_eq!(overrides.temperature, Some(0.3));
        assert_eq!(overrides.stream, Some(false));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let args = ChatArgs {
            temperature: Some("3.0".to_string()),
            ..args("a")
        };
        assert!(args.overrides().is_err());
        let garbled = ChatArgs {
            temperature: Some("warm".to_string()),
            ..self::args("a")
        };
        assert!(garbled.overrides().unwrap_err().is_configuration());
    }
}
