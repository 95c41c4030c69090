//! tally-assistant: Conversation state and request orchestration
//!
//! This crate owns the message list for an assistant conversation, builds
//! the history sent with each request, serializes requests so only one is
//! in flight, and folds streamed chunks into the assistant's reply.

pub mod assistant;
pub mod conversation;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod handle;
pub mod history;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod testing;

pub use assistant::{Assistant, AssistantConfig};
pub use conversation::{ConversationMessage, ConversationStore, MessagePatch, Snapshot};
pub use coordinator::{RequestCoordinator, RequestGuard, RequestPhase};
pub use error::{Error, Result};
pub use events::AssistantEvent;
pub use handle::AssistantHandle;
pub use history::{HISTORY_WINDOW, build_history};
pub use reconciler::{ChunkOutcome, ReconcileReport, StreamReconciler, reconcile};
