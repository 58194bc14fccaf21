//! Tools the terminal client answers on the assistant's behalf.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use parley_core::{ToolCallHandler, ToolFailure, ToolResult, ToolResultBuilder};
use parley_types::{ToolCallMessage, ToolDefinition};
use serde_json::{Value, json};
use tracing::info;

pub struct DemoTools;

impl DemoTools {
    /// Declarations to advertise in the session settings.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "get_current_time".to_string(),
                description: Some("Current local time on the user's machine.".to_string()),
                parameters: json!({"type": "object", "properties": {}}).to_string(),
                fallback_content: Some("I couldn't read the clock just now.".to_string()),
            },
            ToolDefinition {
                name: "echo".to_string(),
                description: Some("Repeats the given text back.".to_string()),
                parameters: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                })
                .to_string(),
                fallback_content: None,
            },
        ]
    }
}

#[async_trait]
impl ToolCallHandler for DemoTools {
    async fn handle(
        &self,
        call: ToolCallMessage,
        respond: ToolResultBuilder,
    ) -> anyhow::Result<ToolResult> {
        info!(tool_call_id = %call.tool_call_id, name = %call.name, "Running demo tool.");
        match call.name.as_str() {
            "get_current_time" => Ok(respond.success(json!({ "time": Local::now().to_rfc3339() }))),
            "echo" => {
                let params = call
                    .parameters_json()
                    .context("echo parameters are not valid JSON")?;
                let text = match params.get("text") {
                    Some(Value::String(text)) => text.clone(),
                    _ => params.to_string(),
                };
                Ok(respond.success(text))
            }
            other => Ok(respond.error(ToolFailure {
                error: format!("unknown tool `{}`", other),
                code: "unknown_tool".to_string(),
                level: "warn".to_string(),
                content: String::new(),
            })),
        }
    }
}
