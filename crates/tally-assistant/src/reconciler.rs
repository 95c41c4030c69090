//! Folds streamed chunks into a single assistant message.
//!
//! A reply is built up in two accumulators, one for reasoning and one for
//! visible text. Every chunk patches the target message so subscribers see
//! text appear as it arrives. A `done` chunk may carry the authoritative
//! final text; when it does, it replaces whatever was accumulated.

use futures::StreamExt;
use tally_ai::{ChunkStream, StreamChunk};
use uuid::Uuid;

use crate::conversation::{ConversationMessage, ConversationStore, MessagePatch};
use crate::coordinator::RequestGuard;

/// Whether more chunks are expected after the one just applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Continue,
    Finished,
}

/// Final state of a reconciled reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub message_id: Uuid,
    /// A `done` chunk was received
    pub finalized: bool,
    pub reply: String,
    pub thinking: String,
}

/// Accumulates chunks for one target message
#[derive(Debug)]
pub struct StreamReconciler {
    message_id: Uuid,
    reply: String,
    thinking: String,
    finalized: bool,
}

impl StreamReconciler {
    /// Append an empty assistant message to `store` and target it
    pub fn begin(store: &mut ConversationStore) -> Self {
        let message = ConversationMessage::assistant_pending();
        let message_id = message.id;
        store.append(message);
        Self {
            message_id,
            reply: String::new(),
            thinking: String::new(),
            finalized: false,
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    /// Apply one chunk to the accumulators and the target message
    pub fn apply(&mut self, chunk: StreamChunk, store: &mut ConversationStore) -> ChunkOutcome {
        if self.finalized {
            tracing::debug!("ignoring chunk after done for message {}", self.message_id);
            return ChunkOutcome::Finished;
        }

        let patch = match chunk {
            StreamChunk::ThinkingDelta { delta } => {
                self.thinking.push_str(&delta);
                MessagePatch::default().thinking(Some(self.thinking.clone()))
            }
            StreamChunk::ReplyDelta { delta } => {
                self.reply.push_str(&delta);
                MessagePatch::default().content(self.reply.clone())
            }
            StreamChunk::References { references } => {
                MessagePatch::default().references(references)
            }
            StreamChunk::Done {
                reply, thinking, ..
            } => {
                if let Some(reply) = reply.filter(|r| !r.is_empty()) {
                    self.reply = reply;
                }
                if let Some(thinking) = thinking.filter(|t| !t.is_empty()) {
                    self.thinking = thinking;
                }
                self.finalized = true;
                MessagePatch::default()
                    .content(self.reply.clone())
                    .thinking(Some(self.thinking.clone()))
            }
        };

        store.patch_by_id(self.message_id, patch);

        if self.finalized {
            ChunkOutcome::Finished
        } else {
            ChunkOutcome::Continue
        }
    }

    /// Settle the target message once the stream is over, however it ended
    pub fn finish(self, store: &mut ConversationStore) -> ReconcileReport {
        if self.reply.is_empty() {
            store.patch_by_id(self.message_id, MessagePatch::default().content(""));
        }
        if !self.finalized {
            tracing::warn!("stream for message {} ended without done", self.message_id);
        }
        ReconcileReport {
            message_id: self.message_id,
            finalized: self.finalized,
            reply: self.reply,
            thinking: self.thinking,
        }
    }
}

/// Drive `stream` into a new assistant message in `store`.
///
/// The guard's request moves to rendering once the target message exists.
/// On a transport error the partial message is settled and left in place
/// before the error is returned.
pub async fn reconcile(
    guard: &RequestGuard,
    mut stream: ChunkStream,
    store: &mut ConversationStore,
) -> tally_ai::Result<ReconcileReport> {
    let mut reconciler = StreamReconciler::begin(store);
    guard.start_rendering();

    let mut failure = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if reconciler.apply(chunk, store) == ChunkOutcome::Finished {
                    break;
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(stream);

    let report = reconciler.finish(store);
    match failure {
        Some(e) => Err(e),
        None => Ok(report),
    }
}
