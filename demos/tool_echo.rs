//! Registers an `echo` tool and asks the assistant to use it.
//!
//! Every tool call is answered with its own parameters; calls to other tool
//! names get a `tool_error` at `warn` level.

use anyhow::Context;
use async_trait::async_trait;
use parley_core::{
    EventStream, Session, SessionConfig, SessionEvent, ToolCallHandler, ToolFailure, ToolResult,
    ToolResultBuilder, WsConnector,
};
use parley_types::{SessionSettings, ToolCallMessage, ToolDefinition};
use std::{sync::Arc, time::Duration};
use tracing::info;

struct Echo;

#[async_trait]
impl ToolCallHandler for Echo {
    async fn handle(
        &self,
        call: ToolCallMessage,
        respond: ToolResultBuilder,
    ) -> anyhow::Result<ToolResult> {
        info!(tool_call_id = %call.tool_call_id, name = %call.name, "Tool call received.");
        if call.name != "echo" {
            return Ok(respond.error(ToolFailure {
                error: format!("no tool named {}", call.name),
                code: "unknown_tool".to_string(),
                level: "warn".to_string(),
                content: String::new(),
            }));
        }
        Ok(respond.success(call.parameters_json()?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let send_url = std::env::var("PARLEY_SEND_URL").context("PARLEY_SEND_URL is not set")?;
    let recv_url = std::env::var("PARLEY_RECV_URL").context("PARLEY_RECV_URL is not set")?;

    let session = Session::new(
        SessionConfig::new(send_url, recv_url).with_tool_call_timeout(Duration::from_secs(10)),
    );
    let (events, mut rx) = EventStream::channel();
    session.set_handler(events);
    session.set_tool_handler(Arc::new(Echo));
    session.connect(&WsConnector).await?;

    session.control().send_session_settings(SessionSettings {
        tools: vec![ToolDefinition {
            name: "echo".to_string(),
            description: Some("Returns its arguments unchanged.".to_string()),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}}
            })
            .to_string(),
            fallback_content: None,
        }],
        ..Default::default()
    })?;
    session
        .control()
        .send_user_input("Please call the echo tool with the text 'marco'.")?;

    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Message(message) => {
                println!("{}", serde_json::to_string(&message)?);
                if message.kind() == "assistant_end" {
                    session.close();
                }
            }
            SessionEvent::Error(e) => eprintln!("error: {}", e),
            SessionEvent::Close(_) => break,
            SessionEvent::Open => {}
        }
    }
    Ok(())
}
