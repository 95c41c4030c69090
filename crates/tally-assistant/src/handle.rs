//! A cloneable handle for controlling the assistant from other tasks.

use std::time::Duration;

use crate::coordinator::{RequestCoordinator, RequestPhase};

/// Cloneable control surface for an [`Assistant`](crate::Assistant).
///
/// `send_message` borrows the assistant mutably for the whole request, so
/// cancellation from a signal handler or UI task goes through this handle.
#[derive(Clone)]
pub struct AssistantHandle {
    coordinator: RequestCoordinator,
}

impl AssistantHandle {
    pub(crate) fn new(coordinator: RequestCoordinator) -> Self {
        Self { coordinator }
    }

    /// Abort the in-flight request. Returns `false` if there was none.
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel()
    }

    pub fn phase(&self) -> RequestPhase {
        self.coordinator.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    /// Wait until the current request, if any, has ended.
    pub async fn wait_for_idle(&self) {
        self.coordinator.wait_for_idle().await;
    }

    /// Like [`wait_for_idle`](Self::wait_for_idle) but gives up after `timeout`.
    /// Returns `true` if idle was reached.
    pub async fn wait_for_idle_timeout(&self, timeout: Duration) -> bool {
        if !self.is_busy() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }
}
