use serde::{Deserialize, Serialize};

use crate::config::Verbosity;
use crate::models::ReasoningEffort;
use crate::types::Role;

/// One piece of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// A message as sent to the chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestMessage {
    /// The author of the message.
    pub role: Role,

    /// The content parts of the message.
    pub content: Vec<ContentPart>,
}

impl RequestMessage {
    /// Create a message with a single text part.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }
}

/// The requested response format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseFormat {
    /// The format type; always `text` for this client.
    #[serde(rename = "type")]
    pub format_type: String,
}

impl Default for ResponseFormat {
    fn default() -> Self {
        Self {
            format_type: "text".to_string(),
        }
    }
}

/// The body of a chat completions request.
///
/// Optional fields are omitted from the serialized body when unset so that
/// provider defaults apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The model identifier.
    pub model: String,

    /// The conversation context, oldest first.
    pub messages: Vec<RequestMessage>,

    /// The response format marker.
    pub response_format: ResponseFormat,

    /// How verbose the answer should be.
    pub verbosity: Verbosity,

    /// How hard the model should reason.
    pub reasoning_effort: ReasoningEffort,

    /// Present and `true` only when streaming is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Cap on completion tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,

    /// Sampling temperature, present only when it differs from 1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Nucleus sampling, present only when it differs from 1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl ChatRequest {
    /// True when the response should be consumed as a server-sent event stream.
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn minimal_request_omits_optional_fields() {
        let request = ChatRequest {
            model: "gpt-5".to_string(),
            messages: vec![RequestMessage::text(Role::User, "hi")],
            response_format: ResponseFormat::default(),
            verbosity: Verbosity::Medium,
            reasoning_effort: ReasoningEffort::Low,
            stream: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
        };
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "gpt-5",
                "messages": [
                    {"role": "user", "content": [{"type": "text", "text": "hi"}]}
                ],
                "response_format": {"type": "text"},
                "verbosity": "medium",
                "reasoning_effort": "low"
            })
        );
        assert!(!request.is_streaming());
    }
}
