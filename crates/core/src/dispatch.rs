//! Classification of decoded inbound frames into delivery actions.

use crate::SessionError;
use chrono::{DateTime, Utc};
use parley_types::{
    AudioOutput, ChatMessageEvent, Decoded, InboundMessage, Role, ServerEvent, ToolCallMessage,
};
use std::time::Duration;
use tracing::debug;

/// What the session must do with one decoded frame.
#[derive(Debug)]
pub(crate) enum Action {
    Deliver(InboundMessage),
    /// Deliver once the delay elapses, without holding back later frames.
    DeliverAfter(Duration, InboundMessage),
    InvokeTool(ToolCallMessage),
    Report(SessionError),
}

pub(crate) struct DispatchRouter {
    legacy_audio_delay: Duration,
}

impl DispatchRouter {
    pub(crate) fn new(legacy_audio_delay: Duration) -> Self {
        Self { legacy_audio_delay }
    }

    /// Actions for one frame, in the order they must run.
    pub(crate) fn route(&self, decoded: Decoded, received_at: DateTime<Utc>) -> Vec<Action> {
        let event = match decoded {
            Decoded::Event(event) => event,
            Decoded::Unknown { kind, raw } => {
                debug!(%kind, %raw, "Unhandled inbound message type.");
                return vec![Action::Report(SessionError::ProtocolViolation { kind })];
            }
        };

        match event {
            ServerEvent::AudioOutput(audio) if audio.has_inline_transcript() => {
                self.route_legacy_audio(audio, received_at)
            }
            ServerEvent::ToolCall(call) => vec![
                Action::Deliver(InboundMessage::new(
                    ServerEvent::ToolCall(call.clone()),
                    received_at,
                )),
                Action::InvokeTool(call),
            ],
            event => vec![Action::Deliver(InboundMessage::new(event, received_at))],
        }
    }

    /// Transcript text first, the audio itself after the delay.
    fn route_legacy_audio(&self, audio: AudioOutput, received_at: DateTime<Utc>) -> Vec<Action> {
        let mut actions = Vec::with_capacity(3);
        if let Some(question) = &audio.question {
            let msg = ChatMessageEvent::synthesized(
                Role::User,
                question.clone(),
                audio.custom_session_id.clone(),
            );
            actions.push(Action::Deliver(InboundMessage::new(
                ServerEvent::UserMessage(msg),
                received_at,
            )));
        }
        if let Some(answer) = &audio.answer {
            let msg = ChatMessageEvent::synthesized(
                Role::Assistant,
                answer.clone(),
                audio.custom_session_id.clone(),
            );
            actions.push(Action::Deliver(InboundMessage::new(
                ServerEvent::AssistantMessage(msg),
                received_at,
            )));
        }
        actions.push(Action::DeliverAfter(
            self.legacy_audio_delay,
            InboundMessage::new(ServerEvent::AudioOutput(audio), received_at),
        ));
        actions
    }
}
