use serde::{Deserialize, Serialize};

/// One decoded `data:` event of a streamed chat completion.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    /// The choices carried by this event; only the first is used.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A streamed choice.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    /// The incremental change.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Set on the final event of the choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The incremental part of a streamed choice.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkDelta {
    /// A text fragment, if any.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// The text fragment of the first choice, when non-empty.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// The finish reason of the first choice, when present.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delta() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap();
        assert_eq!(chunk.text(), Some("Hi"));
        assert_eq!(chunk.finish_reason(), None);
    }

    #[test]
    fn parse_finish_without_content() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.text(), None);
        assert_eq!(chunk.finish_reason(), Some("stop"));
    }

    #[test]
    fn parse_empty_choices() {
        let chunk: ChatCompletionChunk = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(chunk.text(), None);
        let chunk: ChatCompletionChunk = serde_json::from_str(r#"{}"#).unwrap();
        assert!(chunk.choices.is_empty());
    }
}
