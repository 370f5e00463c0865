//! Per-agent configuration, persisted as YAML.
//!
//! An [`AgentConfig`] is created with defaults on first use, written after
//! every mutation, and read before every request.  [`ConfigOverrides`] carry
//! one-shot changes that replace config fields for a single request.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::models::{self, ReasoningEffort};
use crate::observability::PERSIST_ERRORS;
use crate::utils::time::now;

/// Neutral value for temperature and top_p; values equal to it are not sent.
pub const NEUTRAL_SAMPLING: f64 = 1.0;

/// Default number of messages kept in history.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Answer verbosity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Terse answers.
    Low,
    /// The provider default.
    #[default]
    Medium,
    /// Long answers.
    High,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::Low => write!(f, "low"),
            Verbosity::Medium => write!(f, "medium"),
            Verbosity::High => write!(f, "high"),
        }
    }
}

impl FromStr for Verbosity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Verbosity::Low),
            "medium" => Ok(Verbosity::Medium),
            "high" => Ok(Verbosity::High),
            _ => Err(Error::validation(
                format!("invalid verbosity: {s} (expected low, medium, or high)"),
                Some("text_verbosity".to_string()),
            )),
        }
    }
}

/// How reasoning summaries are requested.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    /// Let the provider decide.
    #[default]
    Auto,
    /// Ask for detailed summaries.
    Detailed,
    /// No summaries.
    None,
}

impl fmt::Display for ReasoningSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningSummary::Auto => write!(f, "auto"),
            ReasoningSummary::Detailed => write!(f, "detailed"),
            ReasoningSummary::None => write!(f, "none"),
        }
    }
}

impl FromStr for ReasoningSummary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ReasoningSummary::Auto),
            "detailed" => Ok(ReasoningSummary::Detailed),
            "none" => Ok(ReasoningSummary::None),
            _ => Err(Error::validation(
                format!("invalid reasoning summary: {s} (expected auto, detailed, or none)"),
                Some("reasoning_summary".to_string()),
            )),
        }
    }
}

/// Configuration for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// The model identifier.
    pub model: String,
    /// Sampling temperature in [0, 2].
    pub temperature: f64,
    /// Reasoning effort; also selects the request timeout.
    pub reasoning_effort: ReasoningEffort,
    /// Reasoning summary mode.
    pub reasoning_summary: ReasoningSummary,
    /// Cap on completion tokens.
    pub max_output_tokens: Option<u32>,
    /// Number of messages kept in history.
    pub max_history_size: usize,
    /// Whether replies are streamed.
    pub stream: bool,
    /// Instructions sent ahead of the conversation.
    pub system_prompt: Option<String>,
    /// Whether the provider may store completions.
    pub store: bool,
    /// Response text format.
    pub text_format: String,
    /// Answer verbosity.
    pub text_verbosity: Verbosity,
    /// Nucleus sampling in [0, 1].
    pub top_p: f64,
    /// Tool-call policy: allow parallel calls.
    pub parallel_tool_calls: bool,
    /// Tool-call policy: tool choice mode.
    pub tool_choice: String,
    /// When the config was first created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
    /// When the config was last written.
    #[serde(with = "crate::utils::time")]
    pub updated_at: OffsetDateTime,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let created = now();
        Self {
            model: models::DEFAULT_MODEL.to_string(),
            temperature: NEUTRAL_SAMPLING,
            reasoning_effort: ReasoningEffort::Medium,
            reasoning_summary: ReasoningSummary::Auto,
            max_output_tokens: None,
            max_history_size: DEFAULT_MAX_HISTORY,
            stream: true,
            system_prompt: None,
            store: true,
            text_format: "text".to_string(),
            text_verbosity: Verbosity::Medium,
            top_p: NEUTRAL_SAMPLING,
            parallel_tool_calls: true,
            tool_choice: "auto".to_string(),
            created_at: created,
            updated_at: created,
        }
    }
}

impl AgentConfig {
    /// A default configuration for `model`.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Check every field that has a constrained range.
    pub fn validate(&self) -> Result<()> {
        models::lookup(&self.model)?;
        check_temperature(self.temperature)?;
        check_top_p(self.top_p)?;
        if self.max_history_size == 0 {
            return Err(Error::validation(
                "max_history_size must be at least 1",
                Some("max_history_size".to_string()),
            ));
        }
        Ok(())
    }

    /// Reset out-of-range numeric fields to their defaults.
    ///
    /// Each reset is logged.  Returns true when anything changed.
    pub fn repair(&mut self) -> bool {
        let mut repaired = false;
        if check_temperature(self.temperature).is_err() {
            warn!(value = self.temperature, "temperature out of range, using default");
            self.temperature = NEUTRAL_SAMPLING;
            repaired = true;
        }
        if check_top_p(self.top_p).is_err() {
            warn!(value = self.top_p, "top_p out of range, using default");
            self.top_p = NEUTRAL_SAMPLING;
            repaired = true;
        }
        if self.max_history_size == 0 {
            warn!("max_history_size is 0, using {DEFAULT_MAX_HISTORY}");
            self.max_history_size = DEFAULT_MAX_HISTORY;
            repaired = true;
        }
        repaired
    }

    /// Return a copy with `overrides` applied; an override that is set wins.
    pub fn merged(&self, overrides: &ConfigOverrides) -> AgentConfig {
        let mut merged = self.clone();
        if let Some(model) = &overrides.model {
            merged.model = model.clone();
        }
        if let Some(temperature) = overrides.temperature {
            merged.temperature = temperature;
        }
        if let Some(effort) = overrides.reasoning_effort {
            merged.reasoning_effort = effort;
        }
        if let Some(stream) = overrides.stream {
            merged.stream = stream;
        }
        if let Some(max_output_tokens) = overrides.max_output_tokens {
            merged.max_output_tokens = Some(max_output_tokens);
        }
        if let Some(top_p) = overrides.top_p {
            merged.top_p = top_p;
        }
        if let Some(verbosity) = overrides.text_verbosity {
            merged.text_verbosity = verbosity;
        }
        merged
    }

    /// Load the config at `path`, creating and saving defaults when it is missing or unreadable.
    ///
    /// When `model` is given it replaces whatever model the file names.
    pub fn load_or_create(path: &Path, model: Option<&str>) -> AgentConfig {
        let requested = model.unwrap_or(models::DEFAULT_MODEL);
        if !path.exists() {
            let mut config = AgentConfig::for_model(requested);
            config.save(path);
            return config;
        }
        match Self::load(path) {
            Ok(mut config) => {
                if let Some(model) = model {
                    config.model = model.to_string();
                }
                config
            }
            Err(err) => {
                error!(path = %path.display(), "Error loading config: {err}");
                PERSIST_ERRORS.click();
                let mut config = AgentConfig::for_model(requested);
                config.save(path);
                config
            }
        }
    }

    /// Read and parse the config at `path`.
    pub fn load(path: &Path) -> Result<AgentConfig> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Refresh `updated_at` and write the config to `path`; failures are logged.
    pub fn save(&mut self, path: &Path) {
        self.updated_at = now();
        if let Err(err) = self.write(path) {
            error!(path = %path.display(), "Error saving config: {err}");
            PERSIST_ERRORS.click();
        } else {
            info!(path = %path.display(), "saved agent config");
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self)?;
        fs::write(path, text)
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))
    }
}

/// One-shot changes applied on top of an [`AgentConfig`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigOverrides {
    /// Replacement model.
    pub model: Option<String>,
    /// Replacement temperature.
    pub temperature: Option<f64>,
    /// Replacement reasoning effort.
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Replacement stream flag.
    pub stream: Option<bool>,
    /// Replacement completion token cap.
    pub max_output_tokens: Option<u32>,
    /// Replacement top_p.
    pub top_p: Option<f64>,
    /// Replacement verbosity.
    pub text_verbosity: Option<Verbosity>,
}

impl ConfigOverrides {
    /// True when no field is overridden.
    pub fn is_empty(&self) -> bool {
        *self == ConfigOverrides::default()
    }

    /// Sets the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the temperature override.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the reasoning effort override.
    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Sets the stream override.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Sets the completion token cap override.
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the top_p override.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Reject out-of-range or unknown values.
    pub fn validate(&self) -> Result<()> {
        if let Some(model) = &self.model {
            models::lookup(model)?;
        }
        if let Some(temperature) = self.temperature {
            check_temperature(temperature)?;
        }
        if let Some(top_p) = self.top_p {
            check_top_p(top_p)?;
        }
        Ok(())
    }
}

fn check_temperature(value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=2.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::validation(
            format!("temperature must be between 0.0 and 2.0, got {value}"),
            Some("temperature".to_string()),
        ))
    }
}

fn check_top_p(value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::validation(
            format!("top_p must be between 0.0 and 1.0, got {value}"),
            Some("top_p".to_string()),
        ))
    }
}
