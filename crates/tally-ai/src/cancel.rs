//! Cancellation handles correlating a cancel request with one in-flight call

use async_stream::stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Error;
use crate::stream::ChunkStream;

/// Opaque token issued when a request starts.
///
/// Cloning is cheap; every clone observes the same cancellation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: Uuid,
    token: CancellationToken,
}

impl CancelHandle {
    /// Mint a fresh handle
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The underlying token, for transports that select on it
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CancelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CancelHandle {}

/// Wrap a chunk stream so that cancelling `handle` ends it with [`Error::Aborted`].
///
/// Nothing further is yielded once the handle fires, even if the inner stream
/// still has buffered chunks.
pub fn abortable(mut inner: ChunkStream, handle: &CancelHandle) -> ChunkStream {
    let token = handle.token().clone();
    Box::pin(stream! {
        loop {
            if token.is_cancelled() {
                yield Err(Error::Aborted);
                return;
            }
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = inner.next() => Some(item),
            };
            match next {
                None => {
                    yield Err(Error::Aborted);
                    return;
                }
                Some(Some(item)) => yield item,
                Some(None) => return,
            }
        }
    })
}
