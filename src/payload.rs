//! Assemble the chat completions request body for one turn.

use crate::config::{AgentConfig, ConfigOverrides, NEUTRAL_SAMPLING};
use crate::include::FileIncluder;
use crate::types::{ChatRequest, Message, RequestMessage, ResponseFormat, Role};

/// Build the request for `text` given the history as it stood before `text` was appended.
///
/// Inclusion tokens in `text` are resolved; stored messages are sent as
/// written.  The system prompt, when configured, leads as a developer message.
pub fn build(
    text: &str,
    snapshot: &[Message],
    config: &AgentConfig,
    overrides: &ConfigOverrides,
    includer: &FileIncluder,
) -> ChatRequest {
    let resolved = includer.resolve(text);
    let effective = config.merged(overrides);

    let mut messages = Vec::with_capacity(snapshot.len() + 2);
    if let Some(prompt) = effective.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        messages.push(RequestMessage::text(Role::Developer, prompt));
    }
    messages.extend(
        snapshot
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| RequestMessage::text(m.role, m.content.as_str())),
    );
    messages.push(RequestMessage::text(Role::User, resolved));

    ChatRequest {
        model: effective.model,
        messages,
        response_format: ResponseFormat::default(),
        verbosity: effective.text_verbosity,
        reasoning_effort: effective.reasoning_effort,
        stream: effective.stream.then_some(true),
        max_completion_tokens: effective.max_output_tokens,
        temperature: non_neutral(effective.temperature),
        top_p: non_neutral(effective.top_p),
    }
}

fn non_neutral(value: f64) -> Option<f64> {
    if (value - NEUTRAL_SAMPLING).abs() > f64::EPSILON {
        Some(value)
    } else {
        None
    }
}
