//! Client side of a bidirectional streaming conversation session.
//!
//! A [`Session`] runs over two socket legs: an outbound one for client
//! events and an inbound one for server events. Decoded server events are
//! delivered to a [`SessionHandler`] in arrival order, `tool_call`s are
//! answered through a [`ToolCallHandler`], and everything the client sends
//! goes through [`SessionControl`].

pub mod channel;
pub mod config;
pub mod control;
mod dispatch;
pub mod error;
pub mod handlers;
mod pair;
pub mod session;
pub mod tool_call;

pub use channel::{ChannelEvent, CloseEvent, Connector, Frame, Leg, WsConnector};
pub use config::{DEFAULT_LEGACY_AUDIO_DELAY, SessionConfig};
pub use control::SessionControl;
pub use error::SessionError;
pub use handlers::{EventStream, NoopHandler, SessionEvent, SessionHandler};
pub use pair::LifecycleState;
pub use session::Session;
pub use tool_call::{
    PendingToolCall, ToolCallHandler, ToolCallResolution, ToolFailure, ToolOutcome, ToolResult,
    ToolResultBuilder,
};

pub use parley_types as types;
