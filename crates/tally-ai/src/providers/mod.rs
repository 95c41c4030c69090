//! Assistant transport implementations

pub mod http;

use crate::{CancelHandle, ChatRequest, ChatResponse, ChunkStream, Result};
use async_trait::async_trait;

/// The network collaborator that actually talks to the assistant.
///
/// Both calls receive the handle minted for the request; once it is
/// cancelled the call must fail with [`crate::Error::Aborted`].
#[async_trait]
pub trait AssistantTransport: Send + Sync {
    /// Single-shot request/response
    async fn chat(&self, request: &ChatRequest, cancel: &CancelHandle) -> Result<ChatResponse>;

    /// Streaming request; the stream ends after one `done` chunk
    async fn chat_stream(&self, request: &ChatRequest, cancel: &CancelHandle)
    -> Result<ChunkStream>;

    /// Abort the call correlated with `handle`
    fn cancel(&self, handle: &CancelHandle) {
        handle.cancel();
    }
}

/// Join a base URL and an endpoint path with exactly one slash between them
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
