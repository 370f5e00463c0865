use serde::{Deserialize, Serialize};

/// A whole (non-streamed) chat completion response.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// The choices; only the first is used.
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

/// A completed choice.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    /// The assistant message.
    #[serde(default)]
    pub message: CompletionMessage,
}

/// The assistant message of a completed choice.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionMessage {
    /// The content, in either of the shapes the API returns.
    #[serde(default)]
    pub content: Option<CompletionContent>,
}

/// Message content: a plain string or a list of typed segments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CompletionContent {
    /// A plain string.
    Text(String),

    /// A list of segments; only the first segment's text is used.
    Segments(Vec<ContentSegment>),
}

/// One segment of structured content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentSegment {
    /// The segment type, usually `text`.
    #[serde(rename = "type", default)]
    pub segment_type: Option<String>,

    /// The segment text.
    #[serde(default)]
    pub text: String,
}

impl ChatCompletion {
    /// The text of the first choice, or `None` when there is nothing usable.
    pub fn text(&self) -> Option<&str> {
        let content = self.choices.first()?.message.content.as_ref()?;
        let text = match content {
            CompletionContent::Text(text) => text.as_str(),
            CompletionContent::Segments(segments) => segments.first()?.text.as_str(),
        };
        if text.is_empty() { None } else { Some(text) }
    }
}
