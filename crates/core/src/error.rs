use crate::{channel::Leg, pair::LifecycleState};
use parley_types::CodecError;

/// Errors reported by a session, either returned from a call or delivered
/// to [`SessionHandler::on_error`](crate::SessionHandler::on_error).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An outbound send was attempted while the session was not open.
    #[error("session is not connected (state: {0})")]
    NotConnected(LifecycleState),
    #[error("transport error on {leg} channel: {message}")]
    Transport { leg: Leg, message: String },
    /// An inbound frame could not be decoded and was dropped.
    #[error("failed to decode inbound frame: {0}")]
    Decode(#[source] CodecError),
    #[error("protocol violation: unhandled message type `{kind}`")]
    ProtocolViolation { kind: String },
    /// A tool handler failed or returned a result that did not validate.
    #[error("tool handler for call `{tool_call_id}` failed: {reason}")]
    ToolHandler { tool_call_id: String, reason: String },
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] CodecError),
    #[error("connect requires an idle session (state: {0})")]
    InvalidState(LifecycleState),
    #[error("session closed before the connection opened")]
    ConnectAborted,
}
