//! Messages the client sends on the outbound channel.
//!
//! Raw `audio_input` frames are not part of [`ClientEvent`]: they are sent
//! as binary frames without an envelope.

use crate::tool::{ToolErrorMessage, ToolResponseMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An enveloped client event, keyed on the `type` field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    SessionSettings(SessionSettings),
    UserInput(UserInput),
    AssistantInput(AssistantInput),
    PauseAssistantMessage(PauseAssistantMessage),
    ResumeAssistantMessage(ResumeAssistantMessage),
    ToolResponse(ToolResponseMessage),
    ToolError(ToolErrorMessage),
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionSettings(_) => "session_settings",
            ClientEvent::UserInput(_) => "user_input",
            ClientEvent::AssistantInput(_) => "assistant_input",
            ClientEvent::PauseAssistantMessage(_) => "pause_assistant_message",
            ClientEvent::ResumeAssistantMessage(_) => "resume_assistant_message",
            ClientEvent::ToolResponse(_) => "tool_response",
            ClientEvent::ToolError(_) => "tool_error",
        }
    }
}

/// Session configuration sent after the channels open.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSettings>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builtin_tools: Vec<BuiltinTool>,
}

/// Extra text injected into the conversation context.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Context {
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: ContextKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    /// Applies to every following turn.
    #[default]
    Persistent,
    /// Applies to the next turn only.
    Temporary,
    Editable,
}

/// Format of the raw `audio_input` frames.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            encoding: "linear16".to_string(),
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// A client-side tool the assistant may call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments, as a string.
    pub parameters: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_content: Option<String>,
}

/// A tool executed by the server itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_content: Option<String>,
}

/// Text to be handled as if the user had spoken it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
}

/// Text the assistant should speak verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssistantInput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PauseAssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResumeAssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
}
