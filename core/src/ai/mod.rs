//! AI provider access.
//!
//! ```text
//! ChatRequest ──► AiServiceClient ──► POST {base_url}/chat/completions
//!                   │  RetryPolicy (429 / transport faults)
//!                   │  ResponseCache (blocking calls, optional)
//!                   ├─► complete() ─► String
//!                   └─► stream()   ─► ChatStream ─► StreamChunk::Delta.. Done
//! ```

pub mod cache;
pub mod client;
pub mod retry;
pub mod stream;
pub mod types;

pub use cache::ResponseCache;
pub use client::{AiServiceClient, ChatCompletion};
pub use retry::RetryPolicy;
pub use stream::{ChatStream, SseDecoder};
pub use types::{ChatMessage, ChatRequest, ModelInfo, Role, StreamChunk};
