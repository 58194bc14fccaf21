//! In-process legs for driving a session without a network.
//!
//! [`MemoryConnector`] records every leg it opens. The matching
//! [`MemoryPeer`] plays the server side: it injects events and exposes the
//! frames the client sent.

use super::{ChannelError, ChannelEvent, ChannelHandle, ChannelSink, CloseEvent, Connector, Frame, Leg};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::{Notify, mpsc};

#[derive(Default)]
pub struct MemoryConnector {
    peers: Mutex<HashMap<Leg, MemoryPeer>>,
    auto_open: bool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose legs report `Open` as soon as they are connected.
    pub fn auto_open() -> Self {
        Self {
            auto_open: true,
            ..Self::default()
        }
    }

    /// The server side of `leg`, once the leg has been opened.
    pub fn peer(&self, leg: Leg) -> Option<MemoryPeer> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&leg)
            .cloned()
    }

    /// Endpoint each leg was opened against.
    pub fn endpoint(&self, leg: Leg) -> Option<String> {
        self.peer(leg).map(|peer| peer.endpoint.clone())
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, leg: Leg, endpoint: &str) -> ChannelHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Wire::default());
        let peer = MemoryPeer {
            leg,
            endpoint: endpoint.to_string(),
            events: events_tx.clone(),
            wire: shared.clone(),
        };
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(leg, peer);
        if self.auto_open {
            let _ = events_tx.send(ChannelEvent::Open);
        }

        ChannelHandle {
            sink: Box::new(MemorySink {
                leg,
                events: events_tx,
                wire: shared,
            }),
            events: events_rx,
        }
    }
}

#[derive(Default)]
struct Wire {
    sent: Mutex<Vec<Frame>>,
    sent_notify: Notify,
    closed: AtomicBool,
}

struct MemorySink {
    leg: Leg,
    events: mpsc::UnboundedSender<ChannelEvent>,
    wire: Arc<Wire>,
}

impl ChannelSink for MemorySink {
    fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        if self.wire.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed(self.leg));
        }
        self.wire
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
        self.wire.sent_notify.notify_one();
        Ok(())
    }

    fn close(&self) {
        if !self.wire.closed.swap(true, Ordering::SeqCst) {
            // Mirror a real socket acknowledging the close.
            let _ = self.events.send(ChannelEvent::Close(CloseEvent::normal()));
        }
    }
}

/// Server side of one in-memory leg.
#[derive(Clone)]
pub struct MemoryPeer {
    leg: Leg,
    endpoint: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
    wire: Arc<Wire>,
}

impl MemoryPeer {
    pub fn leg(&self) -> Leg {
        self.leg
    }

    pub fn open(&self) {
        self.emit(ChannelEvent::Open);
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.emit(ChannelEvent::Message(Frame::Text(text.into())));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push_text(value.to_string());
    }

    pub fn push_binary(&self, data: impl Into<Vec<u8>>) {
        self.emit(ChannelEvent::Message(Frame::Binary(data.into())));
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.emit(ChannelEvent::Error(message.into()));
    }

    pub fn close(&self, event: CloseEvent) {
        self.wire.closed.store(true, Ordering::SeqCst);
        self.emit(ChannelEvent::Close(event));
    }

    pub fn is_closed(&self) -> bool {
        self.wire.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of every frame the client has sent on this leg.
    pub fn sent(&self) -> Vec<Frame> {
        self.wire
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text frames sent on this leg, parsed as JSON.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => serde_json::from_str(&text).ok(),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    /// Waits until at least `count` frames have been sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Frame> {
        loop {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            self.wire.sent_notify.notified().await;
        }
    }

    fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peer_sees_sent_frames() {
        let connector = MemoryConnector::new();
        let handle = connector.connect(Leg::Outbound, "mem://send");
        let peer = connector.peer(Leg::Outbound).unwrap();

        handle.sink.send(Frame::Text("{\"a\":1}".into())).unwrap();
        handle.sink.send(Frame::Binary(vec![9])).unwrap();

        let sent = peer.wait_for_sent(2).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(peer.sent_json(), vec![serde_json::json!({"a": 1})]);
        assert_eq!(connector.endpoint(Leg::Outbound).as_deref(), Some("mem://send"));
    }

    #[tokio::test]
    async fn test_closed_sink_rejects_frames_and_emits_one_close() {
        let connector = MemoryConnector::new();
        let mut handle = connector.connect(Leg::Inbound, "mem://recv");

        handle.sink.close();
        handle.sink.close();

        assert_eq!(
            handle.sink.send(Frame::Text("x".into())),
            Err(ChannelError::Closed(Leg::Inbound))
        );
        assert_eq!(
            handle.events.recv().await,
            Some(ChannelEvent::Close(CloseEvent::normal()))
        );
        assert!(handle.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_auto_open_reports_open_first() {
        let connector = MemoryConnector::auto_open();
        let mut handle = connector.connect(Leg::Outbound, "mem://send");
        connector.peer(Leg::Outbound).unwrap().push_text("hi");

        assert_eq!(handle.events.recv().await, Some(ChannelEvent::Open));
        assert_eq!(
            handle.events.recv().await,
            Some(ChannelEvent::Message(Frame::Text("hi".into())))
        );
    }
}
