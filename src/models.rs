//! The table of supported models and their reasoning timeouts.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timeout used when a model or effort is missing from the table.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// How hard the model should think before answering.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Fastest answers.
    Low,
    /// The provider default.
    #[default]
    Medium,
    /// Slowest, most thorough answers.
    High,
}

impl ReasoningEffort {
    /// All effort levels in ascending order.
    pub const ALL: [ReasoningEffort; 3] = [
        ReasoningEffort::Low,
        ReasoningEffort::Medium,
        ReasoningEffort::High,
    ];

    /// The wire name of this effort level.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            _ => Err(Error::validation(
                format!("invalid reasoning effort: {s} (expected low, medium, or high)"),
                Some("reasoning_effort".to_string()),
            )),
        }
    }
}

/// A static description of one supported model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// The API identifier.
    pub id: &'static str,
    /// The human readable name.
    pub name: &'static str,
    /// A one-line description.
    pub description: &'static str,
    /// Seconds to wait for a reply at each effort level.
    pub reasoning_timeouts: &'static [(ReasoningEffort, u64)],
}

impl ModelDescriptor {
    /// The request timeout for `effort`, or [`FALLBACK_TIMEOUT`] when the table has no entry.
    pub fn timeout(&self, effort: ReasoningEffort) -> Duration {
        self.reasoning_timeouts
            .iter()
            .find(|(e, _)| *e == effort)
            .map(|(_, secs)| Duration::from_secs(*secs))
            .unwrap_or(FALLBACK_TIMEOUT)
    }
}

static MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "gpt-5",
        name: "GPT-5",
        description: "Full-featured GPT-5 model with advanced reasoning capabilities",
        reasoning_timeouts: &[
            (ReasoningEffort::Low, 180),
            (ReasoningEffort::Medium, 360),
            (ReasoningEffort::High, 720),
        ],
    },
    ModelDescriptor {
        id: "gpt-5-mini",
        name: "GPT-5 Mini",
        description: "Compact GPT-5 model balancing performance and efficiency",
        reasoning_timeouts: &[
            (ReasoningEffort::Low, 90),
            (ReasoningEffort::Medium, 180),
            (ReasoningEffort::High, 360),
        ],
    },
    ModelDescriptor {
        id: "gpt-5-nano",
        name: "GPT-5 Nano",
        description: "Lightweight GPT-5 model optimized for speed",
        reasoning_timeouts: &[
            (ReasoningEffort::Low, 60),
            (ReasoningEffort::Medium, 120),
            (ReasoningEffort::High, 240),
        ],
    },
];

/// The model used when none is requested.
pub const DEFAULT_MODEL: &str = "gpt-5";

/// Every supported model, in table order.
pub fn supported_models() -> &'static [ModelDescriptor] {
    MODELS
}

/// The ids of every supported model, in table order.
pub fn supported_ids() -> Vec<String> {
    MODELS.iter().map(|m| m.id.to_string()).collect()
}

/// Find the descriptor for `model_id`.
pub fn lookup(model_id: &str) -> Result<&'static ModelDescriptor> {
    MODELS
        .iter()
        .find(|m| m.id == model_id)
        .ok_or_else(|| Error::unsupported_model(model_id, supported_ids()))
}

/// The request timeout for `model_id` at `effort`.
pub fn timeout_for(model_id: &str, effort: ReasoningEffort) -> Duration {
    lookup(model_id)
        .map(|m| m.timeout(effort))
        .unwrap_or(FALLBACK_TIMEOUT)
}

/// The display name for `model_id`, or the id itself when unknown.
pub fn display_name(model_id: &str) -> &str {
    match lookup(model_id) {
        Ok(m) => m.name,
        Err(_) => model_id,
    }
}
