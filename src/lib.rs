//! Persistent, per-agent conversations with the OpenAI chat completions API.
//!
//! Each agent keeps its own config, history, backups, logs, exports, and
//! uploads under `agents/<id>/`.  A [`Session`] opens one agent and runs
//! turns: it builds the request, retries transient failures, and commits the
//! reply to history whether it arrives streamed or buffered.

// Public modules
pub mod agents;
pub mod backup;
pub mod chat;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod export;
pub mod history;
pub mod include;
pub mod logging;
pub mod models;
pub mod payload;
pub mod reconcile;
pub mod retry;
pub mod session;
pub mod sse;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use client::{HttpResponse, HttpTransport, Transport};
pub use config::{AgentConfig, ConfigOverrides};
pub use error::{Error, Result};
pub use history::{History, SearchHit, Statistics};
pub use observability::register_biometrics;
pub use retry::{RequestExecutor, RetryPolicy, Sleeper};
pub use session::{Session, TextStream};
pub use types::*;
