//! Assistant event types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::RequestPhase;

/// Lifecycle events emitted while the assistant handles requests.
///
/// Message content changes are not events; watch the store snapshots for those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// The request coordinator moved to a new phase
    PhaseChanged { phase: RequestPhase },

    /// A streamed reply received its `done` chunk
    ReplyFinalized { message_id: Uuid },

    /// A stream closed before its `done` chunk arrived
    ReplyIncomplete { message_id: Uuid },

    /// The in-flight request was canceled by the user
    RequestCanceled,

    /// The request failed; `message` is meant for the user
    RequestFailed { message: String },
}

impl AssistantEvent {
    /// Check if this event ends a request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssistantEvent::PhaseChanged {
                phase: RequestPhase::Idle
            }
        )
    }
}
