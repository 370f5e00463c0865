//! Agent directories: layout, listing, and inspection.
//!
//! Every agent lives in `agents/<id>/` below the workspace:
//!
//! ```text
//! agents/<id>/
//!     config.yaml
//!     history.json
//!     secrets.json
//!     backups/  logs/  exports/  uploads/
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::history::{self, Statistics};
use crate::models::ReasoningEffort;

/// Directory below the workspace holding every agent.
pub const AGENTS_DIR: &str = "agents";

/// Every path belonging to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPaths {
    /// The agent id.
    pub id: String,
    /// `agents/<id>`.
    pub root: PathBuf,
    /// Rolling history backups.
    pub backups: PathBuf,
    /// Daily log files.
    pub logs: PathBuf,
    /// Conversation exports.
    pub exports: PathBuf,
    /// Files available for `{name}` inclusion.
    pub uploads: PathBuf,
    /// The YAML config.
    pub config: PathBuf,
    /// The JSON history.
    pub history: PathBuf,
    /// Stored API keys.
    pub secrets: PathBuf,
}

impl AgentPaths {
    /// Paths for agent `id` under `workspace`.
    pub fn new(workspace: &Path, id: &str) -> Self {
        let root = workspace.join(AGENTS_DIR).join(id);
        Self {
            id: id.to_string(),
            backups: root.join("backups"),
            logs: root.join("logs"),
            exports: root.join("exports"),
            uploads: root.join("uploads"),
            config: root.join("config.yaml"),
            history: root.join("history.json"),
            secrets: root.join("secrets.json"),
            root,
        }
    }

    /// Create the agent directory and its subdirectories.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.backups,
            &self.logs,
            &self.exports,
            &self.uploads,
        ] {
            fs::create_dir_all(dir)
                .map_err(|err| Error::io(format!("failed to create {}", dir.display()), err))?;
        }
        Ok(())
    }

    /// True when the agent directory exists.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }
}

/// Reject ids that would escape the agents directory.
pub fn validate_agent_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(Error::validation(
            format!("invalid agent id: {id:?}"),
            Some("agent_id".to_string()),
        ))
    }
}

/// One row of the agent listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSummary {
    /// The agent id.
    pub id: String,
    /// The configured model.
    pub model: String,
    /// When the config was created, if known.
    pub created_at: Option<OffsetDateTime>,
    /// When the config was last written, if known.
    pub updated_at: Option<OffsetDateTime>,
    /// The configured temperature.
    pub temperature: f64,
    /// The configured reasoning effort.
    pub reasoning_effort: ReasoningEffort,
    /// Messages in the history file.
    pub message_count: usize,
    /// Size of the history file in bytes.
    pub history_size: u64,
}

/// Summaries of every agent under `workspace`, most recently updated first.
///
/// Agents whose files cannot be read are listed with default values.
pub fn list_agents(workspace: &Path) -> Result<Vec<AgentSummary>> {
    let dir = workspace.join(AGENTS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries =
        fs::read_dir(&dir).map_err(|err| Error::io(format!("failed to read {}", dir.display()), err))?;
    let mut agents = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().into_owned();
        agents.push(summarize(&AgentPaths::new(workspace, &id)));
    }
    agents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
    Ok(agents)
}

fn summarize(paths: &AgentPaths) -> AgentSummary {
    let config = read_config(paths);
    let message_count = history::read_messages(&paths.history)
        .map(|messages| messages.len())
        .unwrap_or(0);
    let defaults = AgentConfig::default();
    AgentSummary {
        id: paths.id.clone(),
        model: config
            .as_ref()
            .map(|c| c.model.clone())
            .unwrap_or(defaults.model),
        created_at: config.as_ref().map(|c| c.created_at),
        updated_at: config.as_ref().map(|c| c.updated_at),
        temperature: config
            .as_ref()
            .map(|c| c.temperature)
            .unwrap_or(defaults.temperature),
        reasoning_effort: config
            .as_ref()
            .map(|c| c.reasoning_effort)
            .unwrap_or(defaults.reasoning_effort),
        message_count,
        history_size: file_size(&paths.history),
    }
}

fn read_config(paths: &AgentPaths) -> Option<AgentConfig> {
    if !paths.config.exists() {
        return None;
    }
    match AgentConfig::load(&paths.config) {
        Ok(config) => Some(config),
        Err(err) => {
            warn!(agent = %paths.id, "Error loading config: {err}");
            None
        }
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Everything known about one agent.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    /// The agent's paths.
    pub paths: AgentPaths,
    /// The config, when it exists and parses.
    pub config: Option<AgentConfig>,
    /// Statistics of the stored history.
    pub statistics: Statistics,
    /// Size of the history file in bytes.
    pub history_size: u64,
    /// Every file under the agent directory, relative to it, with its size.
    pub files: Vec<(PathBuf, u64)>,
}

/// Inspect agent `id`; a missing agent is [`Error::NotFound`].
pub fn agent_info(workspace: &Path, id: &str) -> Result<AgentInfo> {
    validate_agent_id(id)?;
    let paths = AgentPaths::new(workspace, id);
    if !paths.exists() {
        return Err(Error::not_found(format!("Agent '{id}' not found")));
    }
    let config = read_config(&paths);
    let messages = if paths.history.exists() {
        history::read_messages(&paths.history).unwrap_or_else(|err| {
            warn!(agent = %id, "Error loading history: {err}");
            Vec::new()
        })
    } else {
        Vec::new()
    };
    let mut files: Vec<(PathBuf, u64)> = WalkDir::new(&paths.root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let size = e.metadata().ok()?.len();
            let relative = e.path().strip_prefix(&paths.root).ok()?.to_path_buf();
            Some((relative, size))
        })
        .collect();
    files.sort();
    Ok(AgentInfo {
        statistics: history::statistics(&messages),
        history_size: file_size(&paths.history),
        config,
        files,
        paths,
    })
}
