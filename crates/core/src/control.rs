//! Outbound message builders.
//!
//! Every send checks that the session is open before touching the codec or
//! the network, and fails with [`SessionError::NotConnected`] otherwise.

use crate::{
    SessionError,
    channel::Frame,
    pair::{ChannelPair, LifecycleState},
};
use parley_types::{
    AssistantInput, ClientEvent, MessageCodec, PauseAssistantMessage, ResumeAssistantMessage,
    SessionSettings, ToolErrorMessage, ToolResponseMessage, UserInput,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Cheap, cloneable handle for sending on a session's outbound leg.
#[derive(Clone)]
pub struct SessionControl {
    pair: Arc<ChannelPair>,
    codec: Arc<dyn MessageCodec>,
}

impl SessionControl {
    pub(crate) fn new(pair: Arc<ChannelPair>, codec: Arc<dyn MessageCodec>) -> Self {
        Self { pair, codec }
    }

    pub fn state(&self) -> LifecycleState {
        self.pair.state()
    }

    pub fn send_session_settings(&self, settings: SessionSettings) -> Result<(), SessionError> {
        self.send_event(ClientEvent::SessionSettings(settings))
    }

    pub fn send_user_input(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send_event(ClientEvent::UserInput(UserInput {
            text: text.into(),
            custom_session_id: None,
        }))
    }

    pub fn send_assistant_input(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send_event(ClientEvent::AssistantInput(AssistantInput {
            text: text.into(),
            custom_session_id: None,
        }))
    }

    pub fn pause_assistant(&self) -> Result<(), SessionError> {
        self.send_event(ClientEvent::PauseAssistantMessage(
            PauseAssistantMessage::default(),
        ))
    }

    pub fn resume_assistant(&self) -> Result<(), SessionError> {
        self.send_event(ClientEvent::ResumeAssistantMessage(
            ResumeAssistantMessage::default(),
        ))
    }

    pub fn send_tool_response_message(
        &self,
        message: ToolResponseMessage,
    ) -> Result<(), SessionError> {
        self.send_event(ClientEvent::ToolResponse(message))
    }

    pub fn send_tool_error_message(&self, message: ToolErrorMessage) -> Result<(), SessionError> {
        self.send_event(ClientEvent::ToolError(message))
    }

    /// Sends raw audio as a binary frame. Audio bypasses the envelope.
    pub fn send_audio(&self, data: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        self.pair.ensure_open()?;
        let data = data.into();
        trace!(bytes = data.len(), "Sending audio frame.");
        self.pair.send(Frame::Binary(data))
    }

    pub(crate) fn send_event(&self, event: ClientEvent) -> Result<(), SessionError> {
        self.pair.ensure_open()?;
        let kind = event.kind();
        let text = self.codec.encode(&event).map_err(SessionError::Encode)?;
        self.pair.send(Frame::Text(text))?;
        debug!(%kind, "Sent client event.");
        Ok(())
    }
}
