//! Session lifecycle and the inbound dispatch loop.

use crate::{
    SessionError,
    channel::{ChannelEvent, Connector, Frame, Leg},
    config::SessionConfig,
    control::SessionControl,
    dispatch::{Action, DispatchRouter},
    handlers::{NoopHandler, SessionHandler},
    pair::{ChannelPair, LifecycleState, Transition},
    tool_call::{PendingToolCall, ToolCallCoordinator, ToolCallHandler},
};
use chrono::Utc;
use parley_types::{JsonCodec, MessageCodec};
use std::{
    collections::VecDeque,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

/// A client session over an outbound and an inbound leg.
///
/// Create one per conversation: once closed, a session stays closed.
/// Clones share the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    id: Uuid,
    config: SessionConfig,
    pair: Arc<ChannelPair>,
    control: SessionControl,
    codec: Arc<dyn MessageCodec>,
    router: DispatchRouter,
    tools: ToolCallCoordinator,
    handler: RwLock<Arc<dyn SessionHandler>>,
    tool_handler: RwLock<Option<Arc<dyn ToolCallHandler>>>,
    delivery: watch::Sender<Delivery>,
    span: Span,
}

/// Whether inbound frames may reach the handler yet. Frames that arrive
/// before the session opens are held and dispatched, in order, right
/// after `on_open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Held,
    Open,
    Closed,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_codec(config, Arc::new(JsonCodec))
    }

    pub fn with_codec(config: SessionConfig, codec: Arc<dyn MessageCodec>) -> Self {
        let id = Uuid::new_v4();
        let pair = Arc::new(ChannelPair::new(config.primary));
        let control = SessionControl::new(pair.clone(), codec.clone());
        let shared = Shared {
            id,
            router: DispatchRouter::new(config.legacy_audio_delay),
            tools: ToolCallCoordinator::new(config.tool_call_timeout),
            config,
            pair,
            control,
            codec,
            handler: RwLock::new(Arc::new(NoopHandler)),
            tool_handler: RwLock::new(None),
            delivery: watch::channel(Delivery::Held).0,
            span: info_span!("parley_session", session_id = %id),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.pair.state()
    }

    /// The outbound message API.
    pub fn control(&self) -> &SessionControl {
        &self.shared.control
    }

    /// Replaces the notification handler. Takes effect for the next event.
    pub fn set_handler(&self, handler: Arc<dyn SessionHandler>) {
        *self
            .shared
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Replaces the tool handler used for subsequent `tool_call`s.
    pub fn set_tool_handler(&self, handler: Arc<dyn ToolCallHandler>) {
        *self
            .shared
            .tool_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn clear_tool_handler(&self) {
        *self
            .shared
            .tool_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Tool calls whose handler has not finished yet, oldest first.
    pub fn pending_tool_calls(&self) -> Vec<PendingToolCall> {
        self.shared.tools.pending()
    }

    /// Opens both legs and waits for the primary leg to open.
    ///
    /// Fails with [`SessionError::Transport`] if the primary leg errors
    /// first, or [`SessionError::ConnectAborted`] if the session closes.
    pub async fn connect(&self, connector: &dyn Connector) -> Result<(), SessionError> {
        let shared = &self.shared;
        let waiter = shared.pair.begin_connect()?;
        info!(
            session_id = %shared.id,
            outbound = %shared.config.outbound_url,
            inbound = %shared.config.inbound_url,
            primary = %shared.config.primary,
            "Connecting session."
        );

        let outbound = connector.connect(Leg::Outbound, &shared.config.outbound_url);
        let inbound = connector.connect(Leg::Inbound, &shared.config.inbound_url);
        shared.pair.attach(outbound.sink, inbound.sink);

        tokio::spawn(
            run_leg_events(shared.clone(), Leg::Outbound, outbound.events)
                .instrument(shared.span.clone()),
        );
        tokio::spawn(
            run_leg_events(shared.clone(), Leg::Inbound, inbound.events)
                .instrument(shared.span.clone()),
        );

        waiter.await.unwrap_or(Err(SessionError::ConnectAborted))
    }

    /// Closes both legs. Safe to call repeatedly; only the first call
    /// notifies the handler.
    pub fn close(&self) {
        let transition = self.shared.pair.close();
        if matches!(transition, Transition::Closed(_)) {
            info!(session_id = %self.shared.id, "Session closed by client.");
        }
        self.shared.apply(transition);
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        let mut state = self.shared.pair.subscribe();
        let _ = state.wait_for(|s| *s == LifecycleState::Closed).await;
    }
}

impl Shared {
    fn handler(&self) -> Arc<dyn SessionHandler> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn tool_handler(&self) -> Option<Arc<dyn ToolCallHandler>> {
        self.tool_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_closed(&self) -> bool {
        self.pair.state() == LifecycleState::Closed
    }

    fn report(&self, error: SessionError) {
        if self.is_closed() {
            debug!(%error, "Session closed; error not reported.");
            return;
        }
        self.handler().on_error(error);
    }

    fn apply(&self, transition: Transition) {
        match transition {
            Transition::None => {}
            Transition::Opened => {
                self.handler().on_open();
                self.delivery.send_replace(Delivery::Open);
            }
            Transition::Closed(event) => {
                self.handler().on_close(event);
                self.delivery.send_replace(Delivery::Closed);
            }
        }
    }

    fn dispatch(self: &Arc<Self>, frame: Frame) {
        let decoded = match self.codec.decode(frame.as_bytes()) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, bytes = frame.len(), "Dropping undecodable frame.");
                self.report(SessionError::Decode(e));
                return;
            }
        };
        let received_at = Utc::now();

        for action in self.router.route(decoded, received_at) {
            self.execute(action);
        }
    }

    fn execute(self: &Arc<Self>, action: Action) {
        match action {
            Action::Deliver(message) => self.handler().on_message(message),
            Action::DeliverAfter(delay, message) => {
                let shared = Arc::clone(self);
                tokio::spawn(
                    async move {
                        tokio::time::sleep(delay).await;
                        if shared.is_closed() {
                            return;
                        }
                        shared.handler().on_message(message);
                    }
                    .instrument(self.span.clone()),
                );
            }
            Action::InvokeTool(call) => {
                let Some(handler) = self.tool_handler() else {
                    warn!(tool_call_id = %call.tool_call_id, name = %call.name, "No tool handler set; tool call left unanswered.");
                    self.report(SessionError::ToolHandler {
                        tool_call_id: call.tool_call_id,
                        reason: "no tool handler set".to_string(),
                    });
                    return;
                };
                let shared = Arc::clone(self);
                tokio::spawn(
                    async move {
                        shared
                            .tools
                            .run(call, handler, &shared.control, |e| shared.report(e))
                            .await;
                    }
                    .instrument(self.span.clone()),
                );
            }
            Action::Report(error) => {
                warn!(%error, "Inbound message rejected.");
                self.report(error);
            }
        }
    }
}

/// Applies one leg's events in arrival order until the leg closes.
async fn run_leg_events(
    shared: Arc<Shared>,
    leg: Leg,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    let mut gate = shared.delivery.subscribe();
    let mut held = VecDeque::new();

    loop {
        tokio::select! {
            biased;

            changed = gate.changed(), if !held.is_empty() => {
                if changed.is_err() {
                    break;
                }
                let delivery = *gate.borrow_and_update();
                match delivery {
                    Delivery::Held => {}
                    Delivery::Open => flush(&shared, &mut held),
                    Delivery::Closed => break,
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChannelEvent::Open => {
                        let transition = shared.pair.handle_open(leg);
                        shared.apply(transition);
                    }
                    ChannelEvent::Message(frame) => {
                        if shared.is_closed() {
                            break;
                        }
                        if leg == Leg::Outbound {
                            debug!(bytes = frame.len(), "Ignoring frame received on outbound leg.");
                            continue;
                        }
                        let delivery = *gate.borrow_and_update();
                        match delivery {
                            Delivery::Open => {
                                flush(&shared, &mut held);
                                shared.dispatch(frame);
                            }
                            Delivery::Held => {
                                debug!(bytes = frame.len(), "Holding frame until session opens.");
                                held.push_back(frame);
                            }
                            Delivery::Closed => break,
                        }
                    }
                    ChannelEvent::Close(event) => {
                        let delivery = *gate.borrow();
                        if delivery == Delivery::Open {
                            flush(&shared, &mut held);
                        }
                        let transition = shared.pair.handle_close(leg, event);
                        shared.apply(transition);
                        break;
                    }
                    ChannelEvent::Error(message) => {
                        warn!(%leg, %message, "Transport error.");
                        shared.report(SessionError::Transport {
                            leg,
                            message: message.clone(),
                        });
                        let transition = shared.pair.handle_error(leg, &message);
                        shared.apply(transition);
                    }
                }
            }
        }
    }
    if !held.is_empty() {
        debug!(%leg, dropped = held.len(), "Discarding frames held for a session that never opened.");
    }
    debug!(%leg, "Leg event loop finished.");
}

fn flush(shared: &Arc<Shared>, held: &mut VecDeque<Frame>) {
    while let Some(frame) = held.pop_front() {
        shared.dispatch(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{CloseEvent, memory::MemoryConnector},
        handlers::{EventStream, SessionEvent},
        tool_call::{MockToolCallHandler, ToolFailure, ToolResult, ToolResultBuilder},
    };
    use async_trait::async_trait;
    use parley_types::{InboundMessage, ServerEvent, ToolCallMessage};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::{
        Notify,
        mpsc::{UnboundedReceiver, error::TryRecvError},
    };

    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> SessionConfig {
        SessionConfig::new("mem://send", "mem://recv")
            .with_legacy_audio_delay(Duration::from_millis(50))
    }

    async fn open_session(
        config: SessionConfig,
    ) -> (Session, MemoryConnector, UnboundedReceiver<SessionEvent>) {
        let connector = MemoryConnector::auto_open();
        let session = Session::new(config);
        let (events, mut rx) = EventStream::channel();
        session.set_handler(events);

        session.connect(&connector).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, SessionEvent::Open));
        (session, connector, rx)
    }

    async fn next_event(rx: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event stream ended")
    }

    async fn next_message(rx: &mut UnboundedReceiver<SessionEvent>) -> InboundMessage {
        match next_event(rx).await {
            SessionEvent::Message(message) => message,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    async fn assert_quiet(rx: &mut UnboundedReceiver<SessionEvent>) {
        let result = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_err(), "unexpected event: {:?}", result);
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn tool_call_frame(id: &str, params: Value) -> Value {
        json!({
            "type": "tool_call",
            "toolCallId": id,
            "name": "lookup",
            "parameters": params.to_string()
        })
    }

    /// Answers according to the call's parameters: optional `delay_ms`,
    /// `fail` (an error level) or `reply` (success content).
    struct ScriptedTool;

    #[async_trait]
    impl ToolCallHandler for ScriptedTool {
        async fn handle(
            &self,
            call: ToolCallMessage,
            respond: ToolResultBuilder,
        ) -> anyhow::Result<ToolResult> {
            let params = call.parameters_json()?;
            if let Some(ms) = params["delay_ms"].as_u64() {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            match params["fail"].as_str() {
                Some(level) => Ok(respond.error(ToolFailure {
                    error: "bad input".to_string(),
                    code: "E1".to_string(),
                    level: level.to_string(),
                    content: String::new(),
                })),
                None => Ok(respond.success(params.get("reply").cloned().unwrap_or(json!({"ok": true})))),
            }
        }
    }

    /// Waits for a signal before answering.
    struct GatedTool {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ToolCallHandler for GatedTool {
        async fn handle(
            &self,
            _call: ToolCallMessage,
            respond: ToolResultBuilder,
        ) -> anyhow::Result<ToolResult> {
            self.gate.notified().await;
            Ok(respond.success(json!({"late": true})))
        }
    }

    #[tokio::test]
    async fn test_connect_resolves_when_primary_opens() {
        let (session, connector, _rx) = open_session(config()).await;

        assert_eq!(session.state(), LifecycleState::Open);
        assert_eq!(connector.endpoint(Leg::Outbound).as_deref(), Some("mem://send"));
        assert_eq!(connector.endpoint(Leg::Inbound).as_deref(), Some("mem://recv"));
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (session, connector, _rx) = open_session(config()).await;
        assert!(matches!(
            session.connect(&connector).await,
            Err(SessionError::InvalidState(LifecycleState::Open))
        ));
    }

    #[tokio::test]
    async fn test_connect_rejected_when_primary_fails_first() {
        let connector = Arc::new(MemoryConnector::new());
        let session = Session::new(config());
        let (events, mut rx) = EventStream::channel();
        session.set_handler(events);

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { session.connect(&*connector).await }
        });
        wait_until(|| connector.peer(Leg::Outbound).is_some()).await;
        connector.peer(Leg::Outbound).unwrap().fail("connection refused");

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(SessionError::Transport { leg: Leg::Outbound, .. })
        ));
        assert!(matches!(
            next_event(&mut rx).await,
            SessionEvent::Error(SessionError::Transport { .. })
        ));
        match next_event(&mut rx).await {
            SessionEvent::Close(close) => assert_eq!(close.code, 1006),
            other => panic!("expected close, got {:?}", other),
        }
        assert_eq!(session.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_secondary_leg_does_not_open_session() {
        let connector = Arc::new(MemoryConnector::new());
        let session = Session::new(config());

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { session.connect(&*connector).await }
        });
        wait_until(|| connector.peer(Leg::Inbound).is_some()).await;
        connector.peer(Leg::Inbound).unwrap().open();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.state(), LifecycleState::Connecting);
        assert!(!task.is_finished());

        connector.peer(Leg::Outbound).unwrap().open();
        task.await.unwrap().unwrap();
        assert_eq!(session.state(), LifecycleState::Open);
    }

    #[tokio::test]
    async fn test_messages_are_delivered_in_decode_order() {
        let (_session, connector, mut rx) = open_session(config()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();

        inbound.push_json(json!({"type": "chat_metadata", "chatId": "c1"}));
        inbound.push_json(json!({"type": "user_message", "message": {"role": "user", "content": "hi"}}));
        inbound.push_json(json!({"type": "assistant_message", "message": {"role": "assistant", "content": "hello"}}));
        inbound.push_json(json!({"type": "user_interruption"}));
        inbound.push_json(json!({"type": "assistant_end"}));

        let mut kinds = Vec::new();
        let mut last_stamp = None;
        for _ in 0..5 {
            let message = next_message(&mut rx).await;
            if let Some(previous) = last_stamp {
                assert!(message.received_at >= previous);
            }
            last_stamp = Some(message.received_at);
            kinds.push(message.kind());
        }
        assert_eq!(
            kinds,
            vec![
                "chat_metadata",
                "user_message",
                "assistant_message",
                "user_interruption",
                "assistant_end"
            ]
        );
    }

    #[tokio::test]
    async fn test_legacy_audio_follows_its_transcript() {
        let (_session, connector, mut rx) = open_session(config()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();

        inbound.push_json(json!({
            "type": "audio_output",
            "id": "a1",
            "data": "AAAA",
            "question": "How far is the moon?",
            "answer": "About 384,000 km."
        }));
        inbound.push_json(json!({"type": "assistant_end"}));

        let user = next_message(&mut rx).await;
        assert!(matches!(&user.event, ServerEvent::UserMessage(m) if m.content() == "How far is the moon?"));
        let assistant = next_message(&mut rx).await;
        assert!(matches!(&assistant.event, ServerEvent::AssistantMessage(m) if m.content() == "About 384,000 km."));
        // The delay holds back the audio only, not the frames behind it.
        assert_eq!(next_message(&mut rx).await.kind(), "assistant_end");
        let audio = next_message(&mut rx).await;
        assert_eq!(audio.kind(), "audio_output");
        assert_eq!(audio.received_at, user.received_at);
    }

    #[tokio::test]
    async fn test_current_audio_is_delivered_without_delay() {
        let (_session, connector, mut rx) = open_session(config()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();

        inbound.push_json(json!({"type": "audio_output", "id": "a1", "data": "AAAA"}));
        inbound.push_json(json!({"type": "assistant_end"}));

        assert_eq!(next_message(&mut rx).await.kind(), "audio_output");
        assert_eq!(next_message(&mut rx).await.kind(), "assistant_end");
    }

    #[tokio::test]
    async fn test_unknown_type_is_reported_and_dispatch_continues() {
        let (_session, connector, mut rx) = open_session(config()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();

        inbound.push_json(json!({"type": "assistant_prosody", "scores": {}}));
        inbound.push_json(json!({"type": "assistant_end"}));

        match next_event(&mut rx).await {
            SessionEvent::Error(SessionError::ProtocolViolation { kind }) => {
                assert_eq!(kind, "assistant_prosody")
            }
            other => panic!("expected protocol violation, got {:?}", other),
        }
        assert_eq!(next_message(&mut rx).await.kind(), "assistant_end");
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_dropped() {
        let (_session, connector, mut rx) = open_session(config()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();

        inbound.push_text("{not json");
        inbound.push_json(json!({"type": "user_interruption"}));

        assert!(matches!(
            next_event(&mut rx).await,
            SessionEvent::Error(SessionError::Decode(_))
        ));
        assert_eq!(next_message(&mut rx).await.kind(), "user_interruption");
    }

    #[tokio::test]
    async fn test_frames_on_outbound_leg_are_not_dispatched() {
        let (_session, connector, mut rx) = open_session(config()).await;

        connector
            .peer(Leg::Outbound)
            .unwrap()
            .push_json(json!({"type": "assistant_end"}));
        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(json!({"type": "user_interruption"}));

        assert_eq!(next_message(&mut rx).await.kind(), "user_interruption");
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_sends_before_connect_fail() {
        let session = Session::new(config());
        assert!(matches!(
            session.control().send_user_input("hello"),
            Err(SessionError::NotConnected(LifecycleState::Idle))
        ));
        assert!(matches!(
            session.control().send_audio(vec![0u8; 4]),
            Err(SessionError::NotConnected(LifecycleState::Idle))
        ));
    }

    #[tokio::test]
    async fn test_close_twice_notifies_once() {
        let (session, connector, mut rx) = open_session(config()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();

        session.close();
        session.close();

        match next_event(&mut rx).await {
            SessionEvent::Close(close) => assert_eq!(close, CloseEvent::normal()),
            other => panic!("expected close, got {:?}", other),
        }
        inbound.push_json(json!({"type": "assistant_end"}));
        assert_quiet(&mut rx).await;

        assert_eq!(session.state(), LifecycleState::Closed);
        assert!(connector.peer(Leg::Outbound).unwrap().is_closed());
        assert!(matches!(
            session.control().send_user_input("too late"),
            Err(SessionError::NotConnected(LifecycleState::Closed))
        ));
        tokio::time::timeout(WAIT, session.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_closes_session() {
        let (session, connector, mut rx) = open_session(config()).await;

        connector.peer(Leg::Inbound).unwrap().close(CloseEvent {
            code: 1011,
            reason: "internal error".to_string(),
        });

        match next_event(&mut rx).await {
            SessionEvent::Close(close) => assert_eq!(close.code, 1011),
            other => panic!("expected close, got {:?}", other),
        }
        assert_eq!(session.state(), LifecycleState::Closed);
        assert!(connector.peer(Leg::Outbound).unwrap().is_closed());

        session.close();
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_transport_error_after_open_keeps_session() {
        let (session, connector, mut rx) = open_session(config()).await;

        connector.peer(Leg::Inbound).unwrap().fail("glitch");

        assert!(matches!(
            next_event(&mut rx).await,
            SessionEvent::Error(SessionError::Transport { leg: Leg::Inbound, .. })
        ));
        assert_eq!(session.state(), LifecycleState::Open);
        session.control().send_user_input("still here").unwrap();
    }

    #[tokio::test]
    async fn test_replaced_handler_receives_next_event() {
        let (session, connector, mut first) = open_session(config()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();

        inbound.push_json(json!({"type": "assistant_end"}));
        assert_eq!(next_message(&mut first).await.kind(), "assistant_end");

        let (events, mut second) = EventStream::channel();
        session.set_handler(events);
        inbound.push_json(json!({"type": "user_interruption"}));

        assert_eq!(next_message(&mut second).await.kind(), "user_interruption");
        // The first stream's sender was dropped with the old handler.
        assert!(matches!(
            first.try_recv(),
            Err(TryRecvError::Disconnected | TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_tool_call_success_sends_one_response() {
        let (session, connector, mut rx) = open_session(config()).await;
        session.set_tool_handler(Arc::new(ScriptedTool));
        let outbound = connector.peer(Leg::Outbound).unwrap();

        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(tool_call_frame("abc123", json!({})));

        assert_eq!(next_message(&mut rx).await.kind(), "tool_call");
        tokio::time::timeout(WAIT, outbound.wait_for_sent(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            outbound.sent_json(),
            vec![json!({
                "type": "tool_response",
                "toolCallId": "abc123",
                "content": "{\"ok\":true}",
                "toolName": "lookup"
            })]
        );
        wait_until(|| session.pending_tool_calls().is_empty()).await;
    }

    #[tokio::test]
    async fn test_tool_call_error_sends_tool_error() {
        let (session, connector, _rx) = open_session(config()).await;
        session.set_tool_handler(Arc::new(ScriptedTool));
        let outbound = connector.peer(Leg::Outbound).unwrap();

        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(tool_call_frame("xyz", json!({"fail": "warn"})));

        tokio::time::timeout(WAIT, outbound.wait_for_sent(1)).await.unwrap();
        assert_eq!(
            outbound.sent_json(),
            vec![json!({
                "type": "tool_error",
                "toolCallId": "xyz",
                "error": "bad input",
                "code": "E1",
                "level": "warn"
            })]
        );
    }

    #[tokio::test]
    async fn test_invalid_level_is_a_handler_error() {
        let (session, connector, mut rx) = open_session(config()).await;
        session.set_tool_handler(Arc::new(ScriptedTool));

        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(tool_call_frame("lvl", json!({"fail": "fatal"})));

        assert_eq!(next_message(&mut rx).await.kind(), "tool_call");
        match next_event(&mut rx).await {
            SessionEvent::Error(SessionError::ToolHandler { tool_call_id, reason }) => {
                assert_eq!(tool_call_id, "lvl");
                assert!(reason.contains("fatal"));
            }
            other => panic!("expected tool handler error, got {:?}", other),
        }
        assert!(connector.peer(Leg::Outbound).unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn test_handler_without_result_sends_nothing() {
        let (session, connector, mut rx) = open_session(config()).await;
        let mut handler = MockToolCallHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("handler produced no result")));
        session.set_tool_handler(Arc::new(handler));

        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(tool_call_frame("m1", json!({})));

        assert_eq!(next_message(&mut rx).await.kind(), "tool_call");
        match next_event(&mut rx).await {
            SessionEvent::Error(SessionError::ToolHandler { tool_call_id, reason }) => {
                assert_eq!(tool_call_id, "m1");
                assert!(reason.contains("no result"));
            }
            other => panic!("expected tool handler error, got {:?}", other),
        }
        assert!(connector.peer(Leg::Outbound).unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_tool_calls_resolve_independently() {
        let (session, connector, _rx) = open_session(config()).await;
        session.set_tool_handler(Arc::new(ScriptedTool));
        let inbound = connector.peer(Leg::Inbound).unwrap();
        let outbound = connector.peer(Leg::Outbound).unwrap();

        inbound.push_json(tool_call_frame("first", json!({"delay_ms": 150, "reply": "first-done"})));
        inbound.push_json(tool_call_frame("second", json!({"delay_ms": 5, "reply": "second-done"})));

        tokio::time::timeout(WAIT, outbound.wait_for_sent(2)).await.unwrap();
        let sent = outbound.sent_json();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["toolCallId"], "second");
        assert_eq!(sent[0]["content"], "second-done");
        assert_eq!(sent[1]["toolCallId"], "first");
        assert_eq!(sent[1]["content"], "first-done");
    }

    #[tokio::test]
    async fn test_tool_result_after_close_is_suppressed() {
        let (session, connector, mut rx) = open_session(config()).await;
        let gate = Arc::new(Notify::new());
        session.set_tool_handler(Arc::new(GatedTool { gate: gate.clone() }));

        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(tool_call_frame("slow", json!({})));
        assert_eq!(next_message(&mut rx).await.kind(), "tool_call");
        wait_until(|| session.pending_tool_calls().len() == 1).await;
        assert_eq!(session.pending_tool_calls()[0].tool_call_id, "slow");

        session.close();
        assert!(matches!(next_event(&mut rx).await, SessionEvent::Close(_)));
        gate.notify_one();

        wait_until(|| session.pending_tool_calls().is_empty()).await;
        assert!(connector.peer(Leg::Outbound).unwrap().sent().is_empty());
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_tool_timeout_reports_handler_error() {
        let config = config().with_tool_call_timeout(Duration::from_millis(20));
        let (session, connector, mut rx) = open_session(config).await;
        session.set_tool_handler(Arc::new(ScriptedTool));

        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(tool_call_frame("t-slow", json!({"delay_ms": 500})));

        assert_eq!(next_message(&mut rx).await.kind(), "tool_call");
        match next_event(&mut rx).await {
            SessionEvent::Error(SessionError::ToolHandler { reason, .. }) => {
                assert!(reason.contains("did not resolve"))
            }
            other => panic!("expected timeout error, got {:?}", other),
        }
        assert!(connector.peer(Leg::Outbound).unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_without_handler_reports_error() {
        let (_session, connector, mut rx) = open_session(config()).await;

        connector
            .peer(Leg::Inbound)
            .unwrap()
            .push_json(tool_call_frame("orphan", json!({})));

        assert_eq!(next_message(&mut rx).await.kind(), "tool_call");
        match next_event(&mut rx).await {
            SessionEvent::Error(SessionError::ToolHandler { tool_call_id, reason }) => {
                assert_eq!(tool_call_id, "orphan");
                assert!(reason.contains("no tool handler"));
            }
            other => panic!("expected tool handler error, got {:?}", other),
        }
        assert_quiet(&mut rx).await;
        assert!(connector.peer(Leg::Outbound).unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn test_frames_before_open_are_held_until_open() {
        let connector = Arc::new(MemoryConnector::new());
        let session = Session::new(config());
        let (events, mut rx) = EventStream::channel();
        session.set_handler(events);
        session.set_tool_handler(Arc::new(ScriptedTool));

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { session.connect(&*connector).await }
        });
        wait_until(|| connector.peer(Leg::Inbound).is_some()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();
        inbound.open();
        inbound.push_json(tool_call_frame("early", json!({})));
        inbound.push_json(json!({"type": "assistant_end"}));

        assert_quiet(&mut rx).await;
        assert_eq!(session.state(), LifecycleState::Connecting);
        wait_until(|| connector.peer(Leg::Outbound).is_some()).await;
        let outbound = connector.peer(Leg::Outbound).unwrap();
        assert!(outbound.sent().is_empty());

        outbound.open();
        task.await.unwrap().unwrap();

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Open));
        assert_eq!(next_message(&mut rx).await.kind(), "tool_call");
        assert_eq!(next_message(&mut rx).await.kind(), "assistant_end");
        tokio::time::timeout(WAIT, outbound.wait_for_sent(1)).await.unwrap();
        let sent = outbound.sent_json();
        assert_eq!(sent[0]["type"], "tool_response");
        assert_eq!(sent[0]["toolCallId"], "early");
    }

    #[tokio::test]
    async fn test_held_frames_are_dropped_if_connect_fails() {
        let connector = Arc::new(MemoryConnector::new());
        let session = Session::new(config());
        let (events, mut rx) = EventStream::channel();
        session.set_handler(events);

        let task = tokio::spawn({
            let session = session.clone();
            let connector = connector.clone();
            async move { session.connect(&*connector).await }
        });
        wait_until(|| connector.peer(Leg::Outbound).is_some()).await;
        let inbound = connector.peer(Leg::Inbound).unwrap();
        inbound.open();
        inbound.push_json(json!({"type": "assistant_end"}));
        connector.peer(Leg::Outbound).unwrap().fail("connection refused");

        assert!(task.await.unwrap().is_err());
        assert!(matches!(
            next_event(&mut rx).await,
            SessionEvent::Error(SessionError::Transport { .. })
        ));
        assert!(matches!(next_event(&mut rx).await, SessionEvent::Close(_)));
        assert_quiet(&mut rx).await;
    }
}
