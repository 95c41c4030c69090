//! Streaming chunk types and utilities

use crate::error::Result;
use crate::types::{AssistantMode, ReferencedTransaction};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Chunks emitted by a streaming assistant request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Incremental reasoning text
    ThinkingDelta { delta: String },
    /// Incremental reply text
    ReplyDelta { delta: String },
    /// Transactions cited by the reply
    References {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        references: Option<Vec<ReferencedTransaction>>,
    },
    /// End of stream, optionally carrying the full reply and thinking
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<AssistantMode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
    },
}

impl StreamChunk {
    /// Tags this client understands
    pub const KINDS: [&'static str; 4] = ["thinking_delta", "reply_delta", "references", "done"];

    pub fn thinking_delta(delta: impl Into<String>) -> Self {
        Self::ThinkingDelta {
            delta: delta.into(),
        }
    }

    pub fn reply_delta(delta: impl Into<String>) -> Self {
        Self::ReplyDelta {
            delta: delta.into(),
        }
    }

    pub fn references(references: Vec<ReferencedTransaction>) -> Self {
        Self::References {
            references: Some(references),
        }
    }

    /// A `done` chunk with no final text
    pub fn done() -> Self {
        Self::Done {
            mode: None,
            reply: None,
            thinking: None,
        }
    }

    /// A `done` chunk carrying the full reply
    pub fn done_with_reply(reply: impl Into<String>) -> Self {
        Self::Done {
            mode: None,
            reply: Some(reply.into()),
            thinking: None,
        }
    }

    /// Check if this is the terminal chunk
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done { .. })
    }

    /// Decode one chunk object.
    ///
    /// Returns `Ok(None)` for chunk kinds this client does not know, so a newer
    /// server can add kinds without breaking the stream.
    pub fn decode(value: serde_json::Value) -> Result<Option<Self>> {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default();

        if !Self::KINDS.contains(&kind) {
            tracing::debug!("Skipping stream chunk with unknown type '{}'", kind);
            return Ok(None);
        }

        Ok(Some(serde_json::from_value(value)?))
    }
}

/// A stream of assistant chunks; an `Err` item ends the stream
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;
