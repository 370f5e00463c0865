//! Durable, bounded conversation history.
//!
//! The history is a JSON array of [`Message`]s rewritten in full after every
//! change.  Before each rewrite the previous file is copied through
//! [`BackupRotation`].  Persistence failures are logged and never surface:
//! the in-memory history stays authoritative so a turn is never lost to a
//! full disk.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use serde_json::{from_reader, to_writer_pretty};
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

use crate::backup::BackupRotation;
use crate::error::{Error, Result};
use crate::observability::{HISTORY_EVICTIONS, PERSIST_ERRORS};
use crate::types::{Message, Role};
use crate::utils::time as time_fmt;

/// Number of characters shown in a search preview.
pub const PREVIEW_CHARS: usize = 100;

/// Matches returned by a search when the caller has no preference.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// A single search match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Position of the message in the history.
    pub index: usize,
    /// The matching message.
    pub message: Message,
    /// The first [`PREVIEW_CHARS`] characters, with `...` when truncated.
    pub preview: String,
}

/// Aggregate numbers about a history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    /// Number of messages.
    pub total_messages: usize,
    /// Number of user messages.
    pub user_messages: usize,
    /// Number of assistant messages.
    pub assistant_messages: usize,
    /// Characters across every message.
    pub total_characters: usize,
    /// Integer mean of characters per message.
    pub average_message_length: usize,
    /// Timestamp of the oldest message.
    #[serde(serialize_with = "display_time")]
    pub first_message: Option<OffsetDateTime>,
    /// Timestamp of the newest message.
    #[serde(serialize_with = "display_time")]
    pub last_message: Option<OffsetDateTime>,
    /// Time between the first and last message.
    #[serde(rename = "conversation_duration", serialize_with = "display_elapsed")]
    pub duration: Option<Duration>,
}

fn display_time<S>(value: &Option<OffsetDateTime>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(at) => serializer.serialize_str(&time_fmt::display(at)),
        None => serializer.serialize_none(),
    }
}

fn display_elapsed<S>(value: &Option<Duration>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(span) => serializer.serialize_str(&time_fmt::elapsed(*span)),
        None => serializer.serialize_none(),
    }
}

/// The ordered, capped message log of one agent.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    backups: BackupRotation,
    messages: Vec<Message>,
    cap: usize,
}

impl History {
    /// Load the history stored at `path`.
    ///
    /// A missing file yields an empty history.  An unreadable or corrupt file
    /// is logged and also yields an empty history; the file is left as is
    /// until the next write replaces it.
    pub fn load(path: impl Into<PathBuf>, backups: BackupRotation, cap: usize) -> Self {
        let path = path.into();
        let messages = if path.exists() {
            match read_messages(&path) {
                Ok(messages) => messages,
                Err(err) => {
                    error!(path = %path.display(), "Error loading history: {err}");
                    PERSIST_ERRORS.click();
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        Self {
            path,
            backups,
            messages,
            cap,
        }
    }

    /// The file backing this history.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The maximum number of retained messages.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Change the cap; it takes effect on the next append.
    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap;
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Borrow the messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// An owned copy of the messages, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Append `message`, evict the oldest beyond the cap, and persist.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > self.cap {
            let excess = self.messages.len() - self.cap;
            self.messages.drain(..excess);
            HISTORY_EVICTIONS.count(excess as u64);
            info!("Truncated history: removed {excess} old messages");
        }
        self.persist();
    }

    /// Back up the current state, then empty and persist.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.persist();
        info!("Conversation history cleared");
    }

    /// Case-insensitive substring search returning at most `limit` hits, oldest first.
    pub fn search(&self, term: &str, limit: usize) -> Vec<SearchHit> {
        let needle = term.to_lowercase();
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.content.to_lowercase().contains(&needle))
            .take(limit)
            .map(|(index, message)| SearchHit {
                index,
                message: message.clone(),
                preview: preview(&message.content),
            })
            .collect()
    }

    /// Counts, sizes, and time span of the history.
    pub fn statistics(&self) -> Statistics {
        statistics(&self.messages)
    }

    fn persist(&self) {
        if let Err(err) = self.backups.create(&self.path) {
            error!(path = %self.path.display(), "Error creating backup: {err}");
            PERSIST_ERRORS.click();
        }
        if let Err(err) = write_messages(&self.path, &self.messages) {
            error!(path = %self.path.display(), "Error saving history: {err}");
            PERSIST_ERRORS.click();
        }
    }
}

/// Counts, sizes, and time span of `messages`.
pub fn statistics(messages: &[Message]) -> Statistics {
    let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
        return Statistics::default();
    };
    let count_role = |role: Role| messages.iter().filter(|m| m.role == role).count();
    let total_characters: usize = messages.iter().map(Message::char_count).sum();
    Statistics {
        total_messages: messages.len(),
        user_messages: count_role(Role::User),
        assistant_messages: count_role(Role::Assistant),
        total_characters,
        average_message_length: total_characters / messages.len(),
        first_message: Some(first.timestamp),
        last_message: Some(last.timestamp),
        duration: Some((last.timestamp - first.timestamp).max(Duration::ZERO)),
    }
}

/// Read a history file without constructing a [`History`].
pub fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let file = File::open(path)
        .map_err(|err| Error::io(format!("failed to open {}", path.display()), err))?;
    let reader = BufReader::new(file);
    from_reader(reader).map_err(|err| {
        Error::serialization(
            format!("failed to parse {}", path.display()),
            Some(Box::new(err)),
        )
    })
}

fn write_messages(path: &Path, messages: &[Message]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::io(format!("failed to create {}", parent.display()), err))?;
    }
    let file = File::create(path)
        .map_err(|err| Error::io(format!("failed to create {}", path.display()), err))?;
    let writer = BufWriter::new(file);
    to_writer_pretty(writer, messages).map_err(|err| {
        Error::serialization("failed to serialize history", Some(Box::new(err)))
    })
}

/// The first [`PREVIEW_CHARS`] characters of `content`, with `...` when truncated.
pub fn preview(content: &str) -> String {
    let mut chars = content.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((cut, _)) => {
            let mut short = content[..cut].to_string();
            short.push_str("...");
            short
        }
        None => content.to_string(),
    }
}
