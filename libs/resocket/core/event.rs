use crate::traits::WsMessage;
use serde::Serialize;

/// Discrete notification describing a connection state transition
///
/// Events are produced once per underlying transition and delivered in
/// the order the transport raised them. Across reconnects the stream is
/// continuous; physical sockets show up only as `Opened`/`Closed` pairs
/// and `Reconnecting` markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A connection finished opening
    Opened,
    /// A connection closed with the transport's code and reason
    Closed { code: u16, reason: String },
    /// The transport reported a fault
    Errored { reason: String },
    /// A payload arrived; also delivered on the message stream first
    MessageReceived { payload: WsMessage },
    /// Reconnection attempt `attempt` has been scheduled
    Reconnecting { attempt: u32 },
    /// Attempts are exhausted; no further reconnection will happen
    ReconnectFailed { attempt: u32 },
}

impl LifecycleEvent {
    /// Whether this event ends the lifetime of the connection for good
    ///
    /// `Closed` is terminal only when no reconnection follows, which the
    /// event alone cannot tell.
    pub fn is_reconnect_failure(&self) -> bool {
        matches!(self, LifecycleEvent::ReconnectFailed { .. })
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Opened => "opened",
            LifecycleEvent::Closed { .. } => "closed",
            LifecycleEvent::Errored { .. } => "errored",
            LifecycleEvent::MessageReceived { .. } => "message_received",
            LifecycleEvent::Reconnecting { .. } => "reconnecting",
            LifecycleEvent::ReconnectFailed { .. } => "reconnect_failed",
        }
    }
}
