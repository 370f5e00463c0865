// Public modules
pub mod chat_chunk;
pub mod chat_completion;
pub mod chat_request;
pub mod message;

// Re-exports
pub use chat_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion::{ChatCompletion, CompletionChoice, CompletionContent, CompletionMessage, ContentSegment};
pub use chat_request::{ChatRequest, ContentPart, RequestMessage, ResponseFormat};
pub use message::{Message, Role};
