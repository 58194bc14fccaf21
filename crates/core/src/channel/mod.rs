//! Channel abstraction: one socket leg of a session.
//!
//! A [`Connector`] opens a leg and hands back a [`ChannelHandle`]: a sink for
//! outgoing frames plus a stream of [`ChannelEvent`]s. Opening never blocks;
//! the `Open` event (or an `Error` followed by `Close`) arrives on the stream.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod ws;

use std::fmt;
use tokio::sync::mpsc;

/// Close code for a normal, requested shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// The two named legs of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    /// Carries client events to the server.
    Outbound,
    /// Carries server events to the client.
    Inbound,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Outbound => write!(f, "outbound"),
            Leg::Inbound => write!(f, "inbound"),
        }
    }
}

/// One complete websocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a leg closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    pub fn normal() -> Self {
        Self {
            code: NORMAL_CLOSURE,
            reason: String::new(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: reason.into(),
        }
    }
}

/// Lifecycle and data events reported by a leg.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Open,
    Message(Frame),
    Close(CloseEvent),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("{0} channel is closed")]
    Closed(Leg),
}

/// Write half of a leg.
///
/// `send` enqueues a whole frame and returns immediately, so frames from
/// concurrent callers are never interleaved.
pub trait ChannelSink: Send + Sync {
    fn send(&self, frame: Frame) -> Result<(), ChannelError>;
    fn close(&self);
}

/// An opened (or opening) leg.
pub struct ChannelHandle {
    pub sink: Box<dyn ChannelSink>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens legs against endpoint addresses.
pub trait Connector: Send + Sync {
    fn connect(&self, leg: Leg, endpoint: &str) -> ChannelHandle;
}

pub use ws::WsConnector;
