//! Tool call correlation.
//!
//! Every `tool_call` from the server is handed to the registered
//! [`ToolCallHandler`] on its own task. The handler answers through the
//! [`ToolResultBuilder`] it receives; the coordinator validates the answer
//! and sends exactly one `tool_response` or `tool_error` carrying the
//! original `toolCallId`. Calls are independent of each other, so several
//! can be in flight and finish in any order.

use crate::{SessionError, control::SessionControl, pair::LifecycleState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_types::{ClientEvent, ErrorLevel, ToolCallMessage, ToolErrorMessage, ToolResponseMessage};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Executes tool calls on behalf of a session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    /// Runs `call` and answers with `respond.success(..)` or `respond.error(..)`.
    ///
    /// Returning `Err` means the handler produced no result; nothing is sent
    /// and the session reports a tool handler error.
    async fn handle(
        &self,
        call: ToolCallMessage,
        respond: ToolResultBuilder,
    ) -> anyhow::Result<ToolResult>;
}

/// Builds results bound to one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultBuilder {
    tool_call_id: String,
}

impl ToolResultBuilder {
    pub fn new(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    /// A successful result. String content is sent as-is; anything else is
    /// serialized to JSON.
    pub fn success(&self, content: impl Into<Value>) -> ToolResult {
        ToolResult {
            tool_call_id: self.tool_call_id.clone(),
            outcome: ToolOutcome::Success(content.into()),
        }
    }

    pub fn error(&self, failure: ToolFailure) -> ToolResult {
        ToolResult {
            tool_call_id: self.tool_call_id.clone(),
            outcome: ToolOutcome::Error(failure),
        }
    }
}

/// The error shape a handler can answer with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolFailure {
    pub error: String,
    pub code: String,
    /// One of `info`, `warn`, `error`. Anything else fails validation.
    pub level: String,
    /// Text the assistant may say instead. Empty means none.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Error(ToolFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub outcome: ToolOutcome,
}

/// An in-flight tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub tool_call_id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

/// How a tool call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallResolution {
    /// A `tool_response` was sent.
    Responded,
    /// A `tool_error` was sent.
    Errored,
    /// The handler failed or its result did not validate. Nothing was sent.
    Rejected(String),
    /// The session closed before the result could be sent.
    Suppressed,
    /// The result was valid but the send failed.
    SendFailed,
}

pub(crate) struct ToolCallCoordinator {
    timeout: Option<Duration>,
    /// Keyed per invocation, so a reused `toolCallId` keeps both records.
    in_flight: Mutex<HashMap<u64, PendingToolCall>>,
    next_invocation: AtomicU64,
}

impl ToolCallCoordinator {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            in_flight: Mutex::new(HashMap::new()),
            next_invocation: AtomicU64::new(0),
        }
    }

    pub(crate) fn pending(&self) -> Vec<PendingToolCall> {
        let mut calls: Vec<_> = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        calls.sort_by_key(|call| call.started_at);
        calls
    }

    /// Runs one tool call to completion. `report` receives any error that
    /// should reach the consumer.
    pub(crate) async fn run(
        &self,
        call: ToolCallMessage,
        handler: Arc<dyn ToolCallHandler>,
        control: &SessionControl,
        report: impl Fn(SessionError),
    ) -> ToolCallResolution {
        let tool_call_id = call.tool_call_id.clone();
        let invocation = self.register(&call);
        let started = Instant::now();

        let outcome = self.invoke(&call, handler).await;
        let resolution = match outcome.and_then(|result| validate(&call, result)) {
            Err(reason) => {
                warn!(%tool_call_id, %reason, "Tool handler produced no valid result.");
                report(SessionError::ToolHandler {
                    tool_call_id: tool_call_id.clone(),
                    reason: reason.clone(),
                });
                ToolCallResolution::Rejected(reason)
            }
            Ok(_) if control.state() == LifecycleState::Closed => {
                info!(%tool_call_id, "Session closed; dropping tool result.");
                ToolCallResolution::Suppressed
            }
            Ok(event) => {
                let sent_error = matches!(event, ClientEvent::ToolError(_));
                match control.send_event(event) {
                    Ok(()) if sent_error => ToolCallResolution::Errored,
                    Ok(()) => ToolCallResolution::Responded,
                    Err(SessionError::NotConnected(LifecycleState::Closed)) => {
                        info!(%tool_call_id, "Session closed; dropping tool result.");
                        ToolCallResolution::Suppressed
                    }
                    Err(e) => {
                        warn!(%tool_call_id, error = %e, "Failed to send tool result.");
                        report(e);
                        ToolCallResolution::SendFailed
                    }
                }
            }
        };

        self.unregister(invocation);
        debug!(
            %tool_call_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?resolution,
            "Tool call resolved."
        );
        resolution
    }

    async fn invoke(
        &self,
        call: &ToolCallMessage,
        handler: Arc<dyn ToolCallHandler>,
    ) -> Result<ToolResult, String> {
        let respond = ToolResultBuilder::new(&call.tool_call_id);
        let pending = handler.handle(call.clone(), respond);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result,
                Err(_) => return Err(format!("handler did not resolve within {:?}", limit)),
            },
            None => pending.await,
        };
        result.map_err(|e| format!("{:#}", e))
    }

    fn register(&self, call: &ToolCallMessage) -> u64 {
        let invocation = self.next_invocation.fetch_add(1, Ordering::Relaxed);
        let record = PendingToolCall {
            tool_call_id: call.tool_call_id.clone(),
            name: call.name.clone(),
            started_at: Utc::now(),
        };
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .values()
            .any(|pending| pending.tool_call_id == call.tool_call_id)
        {
            warn!(tool_call_id = %call.tool_call_id, "Tool call id already in flight.");
        }
        in_flight.insert(invocation, record);
        drop(in_flight);

        info!(tool_call_id = %call.tool_call_id, name = %call.name, "Invoking tool handler.");
        invocation
    }

    fn unregister(&self, invocation: u64) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&invocation);
    }
}

/// Checks a handler's result against the call it answers and shapes the
/// outbound message.
pub(crate) fn validate(call: &ToolCallMessage, result: ToolResult) -> Result<ClientEvent, String> {
    if result.tool_call_id != call.tool_call_id {
        return Err(format!(
            "result is for tool call `{}`, expected `{}`",
            result.tool_call_id, call.tool_call_id
        ));
    }

    match result.outcome {
        ToolOutcome::Success(content) => {
            let content = match content {
                Value::String(text) => text,
                other => serde_json::to_string(&other)
                    .map_err(|e| format!("content is not serializable: {}", e))?,
            };
            Ok(ClientEvent::ToolResponse(ToolResponseMessage {
                tool_call_id: result.tool_call_id,
                content,
                tool_name: Some(call.name.clone()),
                tool_type: call.tool_type.clone(),
                custom_session_id: call.custom_session_id.clone(),
                extra: Default::default(),
            }))
        }
        ToolOutcome::Error(failure) => {
            if failure.error.trim().is_empty() {
                return Err("tool error has no error message".to_string());
            }
            if failure.code.trim().is_empty() {
                return Err("tool error has no code".to_string());
            }
            let level: ErrorLevel = failure.level.parse().map_err(|e| format!("{}", e))?;
            Ok(ClientEvent::ToolError(ToolErrorMessage {
                tool_call_id: result.tool_call_id,
                error: failure.error,
                code: failure.code,
                level,
                content: (!failure.content.is_empty()).then_some(failure.content),
                tool_type: call.tool_type.clone(),
                custom_session_id: call.custom_session_id.clone(),
                extra: Default::default(),
            }))
        }
    }
}
