//! One-request-at-a-time lifecycle with guaranteed cleanup.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tally_ai::{AssistantTransport, CancelHandle, ChatRequest, ChatResponse, ChunkStream};
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::AssistantEvent;

/// Where the coordinator is in a request's life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    /// Ready for a new request
    #[default]
    Idle,
    /// Waiting on a single-shot response or a stream handshake
    Requesting,
    /// Applying streamed chunks
    Rendering,
}

#[derive(Default)]
struct CoordinatorState {
    phase: RequestPhase,
    active: Option<CancelHandle>,
}

/// Serializes assistant requests.
///
/// Cloning is cheap and every clone sees the same state, so a clone can
/// cancel while another holds the request open.
#[derive(Clone)]
pub struct RequestCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    idle_notify: Arc<Notify>,
    transport: Arc<dyn AssistantTransport>,
    event_tx: broadcast::Sender<AssistantEvent>,
}

impl RequestCoordinator {
    pub fn new(
        transport: Arc<dyn AssistantTransport>,
        event_tx: broadcast::Sender<AssistantEvent>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            idle_notify: Arc::new(Notify::new()),
            transport,
            event_tx,
        }
    }

    pub fn phase(&self) -> RequestPhase {
        self.state.lock().phase
    }

    /// Whether a request is in flight
    pub fn is_busy(&self) -> bool {
        self.phase() != RequestPhase::Idle
    }

    /// Id of the active cancellation handle, if any
    pub fn active_handle_id(&self) -> Option<Uuid> {
        self.state.lock().active.as_ref().map(CancelHandle::id)
    }

    /// Wait until no request is in flight
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_busy() {
            return;
        }
        notified.await;
    }

    /// Start a request.
    ///
    /// Fails with [`Error::Busy`] while another request is requesting or
    /// rendering, leaving that request's handle alone. The returned guard
    /// ends the request when dropped.
    pub fn begin_request(&self) -> Result<RequestGuard> {
        let handle = {
            let mut state = self.state.lock();
            if state.phase != RequestPhase::Idle {
                return Err(Error::Busy);
            }
            let handle = CancelHandle::new();
            state.active = Some(handle.clone());
            state.phase = RequestPhase::Requesting;
            handle
        };

        tracing::debug!("request {} started", handle.id());
        self.emit_phase(RequestPhase::Requesting);

        Ok(RequestGuard {
            coordinator: self.clone(),
            handle,
        })
    }

    /// Ask the transport to abort the active request.
    ///
    /// Returns `false` if nothing was in flight.
    pub fn cancel(&self) -> bool {
        let active = self.state.lock().active.clone();
        match active {
            Some(handle) => {
                tracing::debug!("canceling request {}", handle.id());
                self.transport.cancel(&handle);
                true
            }
            None => false,
        }
    }

    /// Turn a transport failure into the error callers see.
    ///
    /// Cancellation and failures the transport already reported are passed
    /// on without logging; everything else is logged here.
    pub fn classify(error: tally_ai::Error) -> Error {
        match error {
            tally_ai::Error::Aborted => Error::Canceled,
            tally_ai::Error::Processed { message, .. } => Error::AlreadyProcessed(message),
            other => {
                tracing::error!("failed to request ai assistant: {}", other);
                match other.server_message() {
                    Some(message) => Error::ServerMessage(message.to_string()),
                    None => Error::Unknown,
                }
            }
        }
    }

    fn set_phase(&self, handle: &CancelHandle, phase: RequestPhase) {
        {
            let mut state = self.state.lock();
            if state.active.as_ref() != Some(handle) || state.phase == phase {
                return;
            }
            state.phase = phase;
        }
        self.emit_phase(phase);
    }

    fn end_request(&self, handle: &CancelHandle) {
        {
            let mut state = self.state.lock();
            if state.active.as_ref() != Some(handle) {
                return;
            }
            state.active = None;
            state.phase = RequestPhase::Idle;
        }
        tracing::debug!("request {} ended", handle.id());
        self.emit_phase(RequestPhase::Idle);
        self.idle_notify.notify_waiters();
    }

    fn emit_phase(&self, phase: RequestPhase) {
        let _ = self.event_tx.send(AssistantEvent::PhaseChanged { phase });
    }
}

/// Scoped ownership of the active request.
///
/// Dropping the guard clears the handle and returns the coordinator to
/// idle, whichever way the enclosing operation exits.
pub struct RequestGuard {
    coordinator: RequestCoordinator,
    handle: CancelHandle,
}

impl RequestGuard {
    pub fn handle(&self) -> &CancelHandle {
        &self.handle
    }

    /// Move from requesting to rendering once streamed chunks start flowing
    pub fn start_rendering(&self) {
        self.coordinator
            .set_phase(&self.handle, RequestPhase::Rendering);
    }

    /// Single-shot request through the transport
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.coordinator
            .transport
            .chat(request, &self.handle)
            .await
            .map_err(RequestCoordinator::classify)
    }

    /// Open a chunk stream through the transport
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        self.coordinator
            .transport
            .chat_stream(request, &self.handle)
            .await
            .map_err(RequestCoordinator::classify)
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.coordinator.end_request(&self.handle);
    }
}
