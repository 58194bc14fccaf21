//! Messages received from the server on the inbound channel.

use crate::{
    Extra,
    shared::{ChatMessage, Role},
    tool::{ToolCallMessage, ToolErrorMessage, ToolResponseMessage},
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every `type` discriminant this crate knows how to decode.
pub const KNOWN_KINDS: &[&str] = &[
    "assistant_message",
    "user_message",
    "user_interruption",
    "error",
    "chat_metadata",
    "assistant_end",
    "audio_output",
    "tool_call",
    "tool_response",
    "tool_error",
];

/// A server event, keyed on the envelope's `type` field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AssistantMessage(ChatMessageEvent),
    UserMessage(ChatMessageEvent),
    UserInterruption(UserInterruption),
    Error(ServerError),
    ChatMetadata(ChatMetadata),
    AssistantEnd(AssistantEnd),
    AudioOutput(AudioOutput),
    ToolCall(ToolCallMessage),
    ToolResponse(ToolResponseMessage),
    ToolError(ToolErrorMessage),
}

impl ServerEvent {
    /// The wire discriminant of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::AssistantMessage(_) => "assistant_message",
            ServerEvent::UserMessage(_) => "user_message",
            ServerEvent::UserInterruption(_) => "user_interruption",
            ServerEvent::Error(_) => "error",
            ServerEvent::ChatMetadata(_) => "chat_metadata",
            ServerEvent::AssistantEnd(_) => "assistant_end",
            ServerEvent::AudioOutput(_) => "audio_output",
            ServerEvent::ToolCall(_) => "tool_call",
            ServerEvent::ToolResponse(_) => "tool_response",
            ServerEvent::ToolError(_) => "tool_error",
        }
    }

    pub fn is_known_kind(kind: &str) -> bool {
        KNOWN_KINDS.contains(&kind)
    }
}

/// A decoded server event stamped with the instant it was decoded.
///
/// The stamp is assigned exactly once and never recomputed downstream.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl InboundMessage {
    pub fn new(event: ServerEvent, received_at: DateTime<Utc>) -> Self {
        Self { received_at, event }
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }
}

/// Payload of `user_message` and `assistant_message`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: ChatMessage,
    /// Set when the message was injected through `user_input`/`assistant_input`.
    #[serde(default)]
    pub from_text: bool,
    /// Set on provisional transcripts that may still change.
    #[serde(default)]
    pub interim: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ChatMessageEvent {
    /// Builds a message that did not arrive on the wire.
    pub fn synthesized(role: Role, content: impl Into<String>, custom_session_id: Option<String>) -> Self {
        Self {
            id: None,
            message: ChatMessage::new(role, content),
            from_text: false,
            interim: false,
            custom_session_id,
            extra: Extra::new(),
        }
    }

    pub fn content(&self) -> &str {
        self.message.content.as_deref().unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserInterruption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Error descriptor reported by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Identifiers of the chat the server attached this session to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssistantEnd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A chunk of synthesized speech.
///
/// Older server revisions also carry the matching transcript inline in
/// `question` (what the user said) and `answer` (what the assistant says).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutput {
    pub id: String,
    /// Base64-encoded audio bytes.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl AudioOutput {
    /// True for the legacy shape that carries `question` and/or `answer`.
    pub fn has_inline_transcript(&self) -> bool {
        self.question.is_some() || self.answer.is_some()
    }

    pub fn decode_audio(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}
