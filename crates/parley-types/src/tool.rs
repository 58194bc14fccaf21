//! Tool invocation messages.
//!
//! `tool_call` only flows from the server to the client. `tool_response` and
//! `tool_error` are sent by the client and echoed back by the server, so the
//! same structs serve both directions.

use crate::{Extra, shared::ErrorLevel};
use serde::{Deserialize, Serialize};

/// A server request asking the client to run a tool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallMessage {
    /// Correlation key echoed in the eventual result.
    pub tool_call_id: String,
    pub name: String,
    /// Tool arguments as a JSON-encoded string.
    #[serde(default)]
    pub parameters: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(default = "default_response_required")]
    pub response_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_response_required() -> bool {
    true
}

impl ToolCallMessage {
    /// Parses `parameters` as JSON. An empty string yields `null`.
    pub fn parameters_json(&self) -> serde_json::Result<serde_json::Value> {
        if self.parameters.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&self.parameters)
    }
}

/// Successful tool result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMessage {
    pub tool_call_id: String,
    /// Serialized tool output.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Failed tool result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorMessage {
    pub tool_call_id: String,
    pub error: String,
    pub code: String,
    pub level: ErrorLevel,
    /// Optional text the assistant may speak in place of the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}
