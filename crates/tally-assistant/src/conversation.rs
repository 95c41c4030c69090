//! Conversation messages and the store that owns them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_ai::{ReferencedTransaction, Role};
use tokio::sync::watch;
use uuid::Uuid;

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    /// Reply text; accumulates while an assistant reply streams in
    pub content: String,
    /// Reasoning text, assistant only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<ReferencedTransaction>>,
}

impl ConversationMessage {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            thinking: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            references: None,
        }
    }

    /// A message typed by the user
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// An empty assistant message waiting for streamed text
    pub fn assistant_pending() -> Self {
        Self {
            thinking: Some(String::new()),
            ..Self::new(Role::Assistant, String::new())
        }
    }

    /// A complete assistant reply
    pub fn assistant_reply(
        reply: impl Into<String>,
        references: Option<Vec<ReferencedTransaction>>,
    ) -> Self {
        Self {
            references,
            ..Self::new(Role::Assistant, reply.into())
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Fields to replace on an existing message. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub thinking: Option<Option<String>>,
    pub references: Option<Option<Vec<ReferencedTransaction>>>,
}

impl MessagePatch {
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = Some(thinking);
        self
    }

    /// Replace the reference list wholesale; `None` clears it
    pub fn references(mut self, references: Option<Vec<ReferencedTransaction>>) -> Self {
        self.references = Some(references);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.thinking.is_none() && self.references.is_none()
    }

    fn apply(self, message: &mut ConversationMessage) {
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(thinking) = self.thinking {
            message.thinking = thinking;
        }
        if let Some(references) = self.references {
            message.references = references;
        }
    }
}

/// Immutable view of the conversation after some mutation
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Bumped once per mutation
    pub version: u64,
    pub messages: Arc<Vec<ConversationMessage>>,
}

/// Owns the ordered message list.
///
/// All writes go through `append`, `patch_by_id`, `clear` and `replace_all`.
/// The list is copy-on-write, so a [`Snapshot`] handed out earlier never
/// changes underneath its holder.
pub struct ConversationStore {
    messages: Arc<Vec<ConversationMessage>>,
    version: u64,
    tx: watch::Sender<Snapshot>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Snapshot::default());
        Self {
            messages: Arc::new(Vec::new()),
            version: 0,
            tx,
        }
    }

    /// Watch for new snapshots; the receiver starts at the current one
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            messages: Arc::clone(&self.messages),
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn get(&self, id: Uuid) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Add a message at the end
    pub fn append(&mut self, message: ConversationMessage) {
        debug_assert!(
            self.get(message.id).is_none(),
            "duplicate message id {}",
            message.id
        );
        Arc::make_mut(&mut self.messages).push(message);
        self.publish();
    }

    /// Replace the patched fields of the message with this id.
    ///
    /// Returns `false`, and publishes nothing, when no message matches.
    pub fn patch_by_id(&mut self, id: Uuid, patch: MessagePatch) -> bool {
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            tracing::debug!("patch for unknown message {} ignored", id);
            return false;
        };
        patch.apply(&mut Arc::make_mut(&mut self.messages)[index]);
        self.publish();
        true
    }

    /// Remove every message
    pub fn clear(&mut self) {
        self.messages = Arc::new(Vec::new());
        self.publish();
    }

    /// Swap in a whole transcript at once, e.g. when restoring a saved one
    pub fn replace_all(&mut self, messages: Vec<ConversationMessage>) {
        self.messages = Arc::new(messages);
        self.publish();
    }

    fn publish(&mut self) {
        self.version += 1;
        self.tx.send_replace(self.snapshot());
    }
}
