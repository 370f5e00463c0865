//! Server-Sent Events (SSE) processing for streamed chat completions.
//!
//! The endpoint sends one `data: {json}` line per chunk and finishes with
//! `data: [DONE]`.  Lines are split on raw bytes so that a multi-byte
//! character divided between two network reads is reassembled before
//! decoding.

use bytes::{Buf, BytesMut};
use futures::stream::{self, Stream, StreamExt};

use crate::client::ByteStream;
use crate::observability::STREAM_BYTES;
use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

const DONE_SENTINEL: &str = "[DONE]";

/// One meaningful event of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A completion chunk.
    Chunk(ChatCompletionChunk),
    /// The `[DONE]` sentinel.
    Done,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Blank lines and lines other than `data:` are skipped.  A payload that is
/// not a valid chunk yields a serialization error item and parsing continues;
/// a transport failure is passed through as-is.
pub fn process_sse(byte_stream: ByteStream) -> impl Stream<Item = Result<SseEvent>> + Send {
    stream::unfold(
        (byte_stream, BytesMut::new(), false),
        |(mut stream, mut buffer, mut exhausted)| async move {
            loop {
                // First check if we have a complete line in the buffer
                if let Some(line) = next_line(&mut buffer, exhausted) {
                    match parse_line(&line) {
                        Some(event) => return Some((event, (stream, buffer, exhausted))),
                        None => continue,
                    }
                }
                if exhausted {
                    return None;
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, exhausted))),
                    None => exhausted = true,
                }
            }
        },
    )
}

/// Remove and return the next complete line.  Once the byte stream is
/// exhausted, a trailing unterminated line counts as complete.
fn next_line(buffer: &mut BytesMut, exhausted: bool) -> Option<Vec<u8>> {
    if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line = buffer.split_to(pos).to_vec();
        buffer.advance(1);
        return Some(line);
    }
    if exhausted && !buffer.is_empty() {
        let line = buffer.split().to_vec();
        return Some(line);
    }
    None
}

fn parse_line(raw: &[u8]) -> Option<Result<SseEvent>> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim_end_matches('\r'),
        Err(e) => {
            return Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == DONE_SENTINEL {
        return Some(Ok(SseEvent::Done));
    }
    Some(
        serde_json::from_str::<ChatCompletionChunk>(data)
            .map(SseEvent::Chunk)
            .map_err(|e| {
                Error::serialization(
                    format!("Failed to parse SSE event: {e}"),
                    Some(Box::new(e)),
                )
            }),
    )
}
