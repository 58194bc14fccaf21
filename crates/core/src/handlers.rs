//! Consumer-facing notifications.

use crate::{SessionError, channel::CloseEvent};
use parley_types::InboundMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Callbacks a session invokes as things happen.
///
/// The session reads its current handler at the moment of each
/// notification, so a handler swapped in with
/// [`Session::set_handler`](crate::Session::set_handler) takes effect for
/// the very next event. Callbacks run on the session's dispatch task and
/// should return quickly.
pub trait SessionHandler: Send + Sync {
    fn on_open(&self) {}
    fn on_message(&self, _message: InboundMessage) {}
    fn on_close(&self, _event: CloseEvent) {}
    fn on_error(&self, _error: SessionError) {}
}

/// Ignores everything. Installed until the consumer sets a handler.
pub struct NoopHandler;

impl SessionHandler for NoopHandler {}

/// A notification, as delivered by [`EventStream`].
#[derive(Debug)]
pub enum SessionEvent {
    Open,
    Message(InboundMessage),
    Close(CloseEvent),
    Error(SessionError),
}

/// Forwards every notification into an mpsc channel.
pub struct EventStream {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventStream {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl SessionHandler for EventStream {
    fn on_open(&self) {
        let _ = self.tx.send(SessionEvent::Open);
    }

    fn on_message(&self, message: InboundMessage) {
        let _ = self.tx.send(SessionEvent::Message(message));
    }

    fn on_close(&self, event: CloseEvent) {
        let _ = self.tx.send(SessionEvent::Close(event));
    }

    fn on_error(&self, error: SessionError) {
        let _ = self.tx.send(SessionEvent::Error(error));
    }
}
