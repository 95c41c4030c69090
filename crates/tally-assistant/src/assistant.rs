//! The assistant session: conversation state plus request orchestration.

use std::sync::Arc;

use tally_ai::{AssistantTransport, ChatRequest, HistoryItem};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::conversation::{ConversationMessage, ConversationStore, Snapshot};
use crate::coordinator::{RequestCoordinator, RequestGuard, RequestPhase};
use crate::error::{Error, Result};
use crate::events::AssistantEvent;
use crate::handle::AssistantHandle;
use crate::history::{HISTORY_WINDOW, build_history};
use crate::reconciler::reconcile;

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Whether the assistant may send requests at all
    pub enabled: bool,
    /// Stream replies chunk by chunk instead of waiting for the whole reply
    pub streaming: bool,
    /// Trailing messages sent as history
    pub history_window: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            streaming: true,
            history_window: HISTORY_WINDOW,
        }
    }
}

/// One conversation with the bookkeeping assistant
pub struct Assistant {
    config: AssistantConfig,
    store: ConversationStore,
    coordinator: RequestCoordinator,
    event_tx: broadcast::Sender<AssistantEvent>,
}

impl Assistant {
    pub fn new(config: AssistantConfig, transport: Arc<dyn AssistantTransport>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let coordinator = RequestCoordinator::new(transport, event_tx.clone());
        Self {
            config,
            store: ConversationStore::new(),
            coordinator,
            event_tx,
        }
    }

    /// Watch conversation snapshots
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.store.subscribe()
    }

    /// Subscribe to lifecycle events
    pub fn events(&self) -> broadcast::Receiver<AssistantEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.config.streaming = streaming;
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        self.store.messages()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn phase(&self) -> RequestPhase {
        self.coordinator.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    /// Get a cloneable handle for canceling from another task
    pub fn handle(&self) -> AssistantHandle {
        AssistantHandle::new(self.coordinator.clone())
    }

    /// Abort the in-flight request, if any
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel()
    }

    /// Drop every message. An in-flight request is left running.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Replace the conversation, e.g. with a saved transcript
    pub fn restore(&mut self, messages: Vec<ConversationMessage>) {
        self.store.replace_all(messages);
    }

    /// History that would accompany the next request
    pub fn history(&self) -> Vec<HistoryItem> {
        build_history(self.store.messages(), self.config.history_window)
    }

    /// Whether `input` would be accepted by [`send_message`](Self::send_message)
    pub fn can_send(&self, input: &str) -> bool {
        self.config.enabled && !input.trim().is_empty() && !self.is_busy()
    }

    /// Send a user message and wait for the reply.
    ///
    /// The user message stays in the conversation even if the request fails.
    /// Returns the assistant message as it stands when the request ends.
    pub async fn send_message(&mut self, input: &str) -> Result<ConversationMessage> {
        if !self.config.enabled {
            return Err(Error::Disabled);
        }
        if self.is_busy() {
            return Err(Error::Busy);
        }
        let message = input.trim();
        if message.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let guard = self.coordinator.begin_request()?;
        let request = ChatRequest::chat(message, self.history());
        self.store.append(ConversationMessage::user(message));

        self.run(guard, request).await
    }

    /// Ask for a summary of the conversation so far
    pub async fn generate_summary(&mut self) -> Result<ConversationMessage> {
        if !self.config.enabled {
            return Err(Error::Disabled);
        }

        let guard = self.coordinator.begin_request()?;
        let request = ChatRequest::summary(self.history());

        self.run(guard, request).await
    }

    async fn run(&mut self, guard: RequestGuard, request: ChatRequest) -> Result<ConversationMessage> {
        tracing::debug!(
            "assistant request mode={} history={} streaming={}",
            request.mode.as_str(),
            request.history.as_ref().map_or(0, Vec::len),
            self.config.streaming
        );

        let result = if self.config.streaming {
            self.run_streaming(&guard, &request).await
        } else {
            self.run_direct(&guard, &request).await
        };
        drop(guard);

        match &result {
            Err(Error::Canceled) => {
                let _ = self.event_tx.send(AssistantEvent::RequestCanceled);
            }
            Err(e) => {
                if let Some(message) = e.user_message() {
                    let _ = self.event_tx.send(AssistantEvent::RequestFailed { message });
                }
            }
            Ok(_) => {}
        }
        result
    }

    async fn run_direct(
        &mut self,
        guard: &RequestGuard,
        request: &ChatRequest,
    ) -> Result<ConversationMessage> {
        let response = guard.chat(request).await?;
        let message = ConversationMessage::assistant_reply(response.reply, response.references);
        self.store.append(message.clone());
        Ok(message)
    }

    async fn run_streaming(
        &mut self,
        guard: &RequestGuard,
        request: &ChatRequest,
    ) -> Result<ConversationMessage> {
        let stream = guard.chat_stream(request).await?;
        let report = reconcile(guard, stream, &mut self.store)
            .await
            .map_err(RequestCoordinator::classify)?;

        let event = if report.finalized {
            AssistantEvent::ReplyFinalized {
                message_id: report.message_id,
            }
        } else {
            AssistantEvent::ReplyIncomplete {
                message_id: report.message_id,
            }
        };
        let _ = self.event_tx.send(event);

        self.message(report.message_id)
    }

    fn message(&self, id: Uuid) -> Result<ConversationMessage> {
        // The conversation may have been cleared while the reply streamed in
        self.store.get(id).cloned().ok_or(Error::Unknown)
    }
}
