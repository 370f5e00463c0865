//! Turn a successful response into user-visible text and a committed
//! assistant message.

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use tracing::{error, info, warn};

use crate::client::HttpResponse;
use crate::history::History;
use crate::observability::{STREAM_ERRORS, STREAM_EVENTS};
use crate::sse::{SseEvent, process_sse};
use crate::types::{ChatCompletion, Message};

/// Returned when a buffered response carries no text.
pub const NO_CONTENT: &str = "No response content received";

/// Prefix of the notice yielded when a stream breaks off early.
pub const TRUNCATED: &str = "Response truncated";

type EventStream<'a> = Pin<Box<dyn Stream<Item = crate::Result<SseEvent>> + Send + 'a>>;

/// A streamed reply, pulled one text fragment at a time.
///
/// The reply ends on `[DONE]`, on the first chunk with a finish reason, when
/// the body ends, or on a transport error.  At that point the accumulated
/// text, unless blank, is appended to the history exactly once.  A transport
/// error also yields one last `[Response truncated: ...]` notice, which is
/// not committed.  A reply that is dropped before it ends commits nothing.
pub struct StreamingReply<'a> {
    events: EventStream<'a>,
    history: &'a mut History,
    accumulated: String,
    finished: bool,
    truncated: bool,
}

impl<'a> StreamingReply<'a> {
    /// Start reading `response` as an event stream.
    pub fn new(response: HttpResponse, history: &'a mut History) -> Self {
        Self {
            events: Box::pin(process_sse(response.into_body())),
            history,
            accumulated: String::new(),
            finished: false,
            truncated: false,
        }
    }

    /// The text received so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// True once the reply has ended and been committed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True when the reply ended on a transport error.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The next non-empty fragment, or `None` when the reply has ended.
    pub async fn next_chunk(&mut self) -> Option<String> {
        while !self.finished {
            match self.events.next().await {
                None | Some(Ok(SseEvent::Done)) => self.finish(),
                Some(Ok(SseEvent::Chunk(chunk))) => {
                    STREAM_EVENTS.click();
                    let text = chunk.text().map(str::to_string);
                    if let Some(text) = &text {
                        self.accumulated.push_str(text);
                    }
                    if let Some(reason) = chunk.finish_reason() {
                        info!(reason, "stream finished");
                        self.finish();
                    }
                    if text.is_some() {
                        return text;
                    }
                }
                Some(Err(err)) if err.is_streaming() => {
                    STREAM_ERRORS.click();
                    error!("Error parsing streaming response: {err}");
                    self.truncated = true;
                    self.finish();
                    return Some(format!("\n[{TRUNCATED}: {err}]"));
                }
                Some(Err(err)) => {
                    STREAM_ERRORS.click();
                    warn!("skipping malformed stream event: {err}");
                }
            }
        }
        None
    }

    /// Expose the reply as a stream of fragments.
    pub fn into_stream(self) -> impl Stream<Item = String> + Send + 'a {
        stream::unfold(self, |mut reply| async move {
            let chunk = reply.next_chunk().await?;
            Some((chunk, reply))
        })
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.accumulated.trim().is_empty() {
            warn!("stream ended without content");
            return;
        }
        self.history.append(Message::assistant(self.accumulated.clone()));
    }
}

/// Read a non-streamed response and commit its text.
pub async fn buffered_reply(response: HttpResponse, history: &mut History) -> String {
    match response.text().await {
        Ok(body) => reconcile_body(&body, history),
        Err(err) => {
            error!("Error reading response: {err}");
            format!("Error parsing response: {err}")
        }
    }
}

/// Extract the reply from a complete response body and commit it.
///
/// Empty or missing content yields [`NO_CONTENT`] and commits nothing.
pub fn reconcile_body(body: &str, history: &mut History) -> String {
    match serde_json::from_str::<ChatCompletion>(body) {
        Ok(completion) => match completion.text() {
            Some(text) => {
                let text = text.to_string();
                history.append(Message::assistant(text.clone()));
                text
            }
            None => {
                warn!("{NO_CONTENT}");
                NO_CONTENT.to_string()
            }
        },
        Err(err) => {
            error!("Error parsing response: {err}");
            format!("Error parsing response: {err}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupRotation;
    use crate::client::idle_timeout;
    use crate::types::Role;
    use bytes::Bytes;

    fn history(dir: &std::path::Path) -> History {
        History::load(
            dir.join("history.json"),
            BackupRotation::new(dir.join("backups")),
            100,
        )
    }

    fn sse(lines: Vec<String>) -> HttpResponse {
        HttpResponse::from_chunks(
            200,
            lines
                .into_iter()
                .map(|l| Bytes::from(format!("{l}\n\n")))
                .collect(),
        )
    }

    fn delta(text: &str) -> String {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": text}}]});
        format!("data: {chunk}")
    }

    fn done() -> String {
        "data: [DONE]".to_string()
    }

    #[tokio::test]
    async fn forwards_fragments_and_commits_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let response = sse(vec![delta("Hi"), delta(" there"), done()]);
        let chunks: Vec<String> = StreamingReply::new(response, &mut history)
            .into_stream()
            .collect()
            .await;
        assert_eq!(chunks, vec!["Hi", " there"]);
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::Assistant);
        assert_eq!(history.messages()[0].content, "Hi there");
    }

    #[tokio::test]
    async fn finish_reason_ends_the_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let last = serde_json::json!({
            "choices": [{"delta": {"content": "!"}, "finish_reason": "stop"}]
        });
        let response = sse(vec![delta("Done"), format!("data: {last}"), delta("ignored")]);
        let mut reply = StreamingReply::new(response, &mut history);
        assert_eq!(reply.next_chunk().await.as_deref(), Some("Done"));
        assert_eq!(reply.next_chunk().await.as_deref(), Some("!"));
        assert!(reply.is_finished());
        assert_eq!(reply.next_chunk().await, None);
        drop(reply);
        assert_eq!(history.messages()[0].content, "Done!");
    }

    #[tokio::test]
    async fn malformed_events_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let response = sse(vec!["data: {oops".to_string(), delta("ok"), done()]);
        let chunks: Vec<String> = StreamingReply::new(response, &mut history)
            .into_stream()
            .collect()
            .await;
        assert_eq!(chunks, vec!["ok"]);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn blank_stream_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let response = sse(vec![delta("  "), done()]);
        let chunks: Vec<String> = StreamingReply::new(response, &mut history)
            .into_stream()
            .collect()
            .await;
        assert_eq!(chunks, vec!["  "]);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn transport_error_ends_and_commits_partial_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let body: crate::client::ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from(format!("{}\n", delta("partial")))),
            Err(crate::Error::streaming("reset", None)),
            Ok(Bytes::from(format!("{}\n", delta("lost")))),
        ]));
        let mut reply = StreamingReply::new(HttpResponse::new(200, body), &mut history);
        assert_eq!(reply.next_chunk().await.as_deref(), Some("partial"));
        let notice = reply.next_chunk().await.unwrap();
        assert!(notice.starts_with("\n[Response truncated: "));
        assert!(notice.contains("reset"));
        assert!(reply.is_truncated());
        assert_eq!(reply.accumulated(), "partial");
        assert_eq!(reply.next_chunk().await, None);
        drop(reply);
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].content, "partial");
    }

    #[tokio::test]
    async fn steady_stream_is_not_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let lines: Vec<String> = (0..6)
            .map(|i| delta(&format!("w{i} ")))
            .chain(std::iter::once(done()))
            .collect();
        let chunks = futures::stream::iter(lines).then(|line| async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            Ok::<_, crate::Error>(Bytes::from(format!("{line}\n\n")))
        });
        let body = idle_timeout(Box::pin(chunks), std::time::Duration::from_millis(120));
        let mut reply = StreamingReply::new(HttpResponse::new(200, body), &mut history);
        let mut received = Vec::new();
        while let Some(chunk) = reply.next_chunk().await {
            received.push(chunk);
        }
        assert!(!reply.is_truncated());
        drop(reply);
        assert_eq!(received.len(), 6);
        assert_eq!(history.messages()[0].content, "w0 w1 w2 w3 w4 w5 ");
    }

    #[tokio::test]
    async fn stalled_stream_reports_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let chunks = futures::stream::iter(vec![Ok::<_, crate::Error>(Bytes::from(format!(
            "{}\n\n",
            delta("half")
        )))])
        .chain(futures::stream::pending());
        let body = idle_timeout(Box::pin(chunks), std::time::Duration::from_millis(50));
        let chunks: Vec<String> = StreamingReply::new(HttpResponse::new(200, body), &mut history)
            .into_stream()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].contains(TRUNCATED));
        assert_eq!(history.messages()[0].content, "half");
    }

    #[tokio::test]
    async fn abandoned_reply_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let response = sse(vec![delta("Hi"), done()]);
        let mut reply = StreamingReply::new(response, &mut history);
        assert_eq!(reply.next_chunk().await.as_deref(), Some("Hi"));
        drop(reply);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn buffered_text_is_committed() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let body = r#"{"choices":[{"message":{"content":"ok"}}]}"#;
        let text = buffered_reply(HttpResponse::from_bytes(200, body), &mut history).await;
        assert_eq!(text, "ok");
        assert_eq!(history.messages()[0].content, "ok");
    }

    #[test]
    fn segment_list_uses_first_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let body = r#"{"choices":[{"message":{"content":[{"type":"text","text":"seg"}]}}]}"#;
        assert_eq!(reconcile_body(body, &mut history), "seg");
    }

    #[test]
    fn empty_or_missing_content_is_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        assert_eq!(reconcile_body(r#"{"choices":[]}"#, &mut history), NO_CONTENT);
        assert_eq!(
            reconcile_body(r#"{"choices":[{"message":{"content":""}}]}"#, &mut history),
            NO_CONTENT
        );
        assert_eq!(
            reconcile_body(r#"{"choices":[{"message":{}}]}"#, &mut history),
            NO_CONTENT
        );
        assert!(history.is_empty());
    }

    #[test]
    fn unparseable_body_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history(dir.path());
        let text = reconcile_body("<html>", &mut history);
        assert!(text.starts_with("Error parsing response: "));
        assert!(history.is_empty());
    }
}
